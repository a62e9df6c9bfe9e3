//! ECB Reference Rate Feed
//!
//! Loads the daily euro foreign exchange reference rates published by the
//! European Central Bank and turns them into a [`RateTable`].

mod parser;

use std::time::{Duration, Instant};

use async_trait::async_trait;

pub use parser::parse_reference_feed;

use crate::application::ports::{FetchError, RateSource};
use crate::domain::rates::RateTable;
use crate::infrastructure::metrics;

/// Default daily feed location.
pub const DEFAULT_RATES_URL: &str = "https://www.ecb.europa.eu/stats/eurofxref/eurofxref-daily.xml";

/// HTTP adapter for the reference feed.
///
/// Implements [`RateSource`] with a single GET per load.
#[derive(Debug, Clone)]
pub struct EcbRateFeed {
    client: reqwest::Client,
    url: String,
}

impl EcbRateFeed {
    /// Create a feed client for `url` with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self { client, url })
    }

    /// Feed location.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_document(&self) -> Result<String, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        response.text().await.map_err(|e| self.transport_error(&e))
    }

    fn transport_error(&self, error: &reqwest::Error) -> FetchError {
        FetchError::Transport {
            url: self.url.clone(),
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl RateSource for EcbRateFeed {
    async fn load(&self) -> Result<RateTable, FetchError> {
        let started = Instant::now();
        let result = match self.fetch_document().await {
            Ok(document) => parse_reference_feed(&document),
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();
        metrics::record_feed_load_duration(elapsed, result.is_ok());

        match &result {
            Ok(table) => tracing::info!(
                url = %self.url,
                currencies = table.len(),
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "Loaded reference rates"
            ),
            Err(e) => tracing::error!(url = %self.url, error = %e, "Failed to load reference rates"),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const FEED: &str = r#"<gesmes:Envelope xmlns:gesmes="http://www.gesmes.org/xml/2002-08-01">
  <Cube>
    <Cube time="2024-01-05">
      <Cube currency="USD" rate="1.1"/>
      <Cube currency="INR" rate="90.0"/>
    </Cube>
  </Cube>
</gesmes:Envelope>"#;

    async fn serve(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/eurofxref-daily.xml"))
            .respond_with(template)
            .expect(1)
            .mount(&server)
            .await;
        server
    }

    fn feed_for(server: &MockServer) -> EcbRateFeed {
        EcbRateFeed::new(
            format!("{}/eurofxref-daily.xml", server.uri()),
            Duration::from_secs(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn loads_table_from_feed() {
        let server = serve(ResponseTemplate::new(200).set_body_string(FEED)).await;

        let table = feed_for(&server).load().await.unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.get("EUR").unwrap(), 1.0);
        assert!((table.cross_rate("USD", "INR").unwrap() - 81.818).abs() < 0.001);
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let server = serve(ResponseTemplate::new(503)).await;

        let err = feed_for(&server).load().await.unwrap_err();

        assert!(matches!(err, FetchError::Status(503)));
    }

    #[tokio::test]
    async fn malformed_body_is_reported() {
        let server = serve(ResponseTemplate::new(200).set_body_string("<Envelope><Cube>")).await;

        let err = feed_for(&server).load().await.unwrap_err();

        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn timeout_is_transport_error() {
        let server = serve(
            ResponseTemplate::new(200)
                .set_body_string(FEED)
                .set_delay(Duration::from_secs(5)),
        )
        .await;
        let feed = EcbRateFeed::new(
            format!("{}/eurofxref-daily.xml", server.uri()),
            Duration::from_millis(100),
        )
        .unwrap();

        let err = feed.load().await.unwrap_err();

        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_transport_error() {
        let feed = EcbRateFeed::new("http://127.0.0.1:1/rates.xml", Duration::from_secs(1)).unwrap();

        let err = feed.load().await.unwrap_err();

        assert!(matches!(err, FetchError::Transport { ref url, .. } if url.ends_with("rates.xml")));
    }
}
