//! gRPC Rate Server Implementation
//!
//! Implements the `CurrencyService` gRPC service.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use tokio_stream::Stream;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status, Streaming};

use super::convert;
use super::proto::currency::v1::{
    RateRequest, RateResponse, StreamingRateResponse, currency_service_server::CurrencyService,
};
use super::session::{SessionError, StreamSession, UpdateTrigger};
use crate::application::services::RateQueryService;
use crate::domain::subscription::SubscriptionRegistry;
use crate::infrastructure::broadcast::SharedRateUpdateHub;
use crate::infrastructure::config::DeliveryMode;
use crate::infrastructure::metrics::{self, QueryOutcome};

// =============================================================================
// Type Aliases
// =============================================================================

type StreamResult<T> = Result<Response<T>, Status>;
type BoxedStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the gRPC rate server.
#[derive(Debug, Clone)]
pub struct CurrencyServerConfig {
    /// Push trigger for every session.
    pub delivery_mode: DeliveryMode,
    /// Per-session interval in [`DeliveryMode::Poll`].
    pub poll_interval: Duration,
    /// Outbound messages buffered per session.
    pub session_buffer: usize,
}

impl Default for CurrencyServerConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Tick,
            poll_interval: Duration::from_secs(5),
            session_buffer: 256,
        }
    }
}

// =============================================================================
// Server Implementation
// =============================================================================

/// gRPC server for rate lookups and subscriptions.
pub struct CurrencyServer {
    config: CurrencyServerConfig,
    query: RateQueryService,
    registry: Arc<SubscriptionRegistry>,
    hub: SharedRateUpdateHub,
    cancel: CancellationToken,
    client_count: Arc<AtomicI32>,
}

impl CurrencyServer {
    /// Create a new gRPC rate server.
    #[must_use]
    pub fn new(
        config: CurrencyServerConfig,
        query: RateQueryService,
        registry: Arc<SubscriptionRegistry>,
        hub: SharedRateUpdateHub,
    ) -> Self {
        Self {
            config,
            query,
            registry,
            hub,
            cancel: CancellationToken::new(),
            client_count: Arc::new(AtomicI32::new(0)),
        }
    }

    /// End every session when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Number of streams currently open.
    #[must_use]
    pub fn client_count(&self) -> i32 {
        self.client_count.load(Ordering::Relaxed)
    }

    /// Shared handle to the open stream counter.
    #[must_use]
    pub fn client_counter(&self) -> Arc<AtomicI32> {
        Arc::clone(&self.client_count)
    }

    fn update_trigger(&self) -> UpdateTrigger {
        match self.config.delivery_mode {
            DeliveryMode::Tick => UpdateTrigger::Tick(self.hub.subscribe()),
            DeliveryMode::Poll => UpdateTrigger::Poll(self.config.poll_interval),
        }
    }
}

#[tonic::async_trait]
impl CurrencyService for CurrencyServer {
    type SubscribeRatesStream = BoxedStream<StreamingRateResponse>;

    async fn get_rate(&self, request: Request<RateRequest>) -> StreamResult<RateResponse> {
        let req = request.into_inner();

        let pair = match convert::request_to_pair(&req) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!(error = %e, "GetRate rejected");
                metrics::record_rate_query(QueryOutcome::InvalidArgument);
                return Err(convert::invalid_request_status(&e));
            }
        };

        match self.query.quote(&pair) {
            Ok(quote) => {
                tracing::debug!(
                    base = pair.base(),
                    destination = pair.destination(),
                    rate = quote.rate,
                    "GetRate"
                );
                metrics::record_rate_query(QueryOutcome::Ok);
                Ok(Response::new(convert::quote_to_response(req, quote)))
            }
            Err(e) => {
                tracing::debug!(
                    base = pair.base(),
                    destination = pair.destination(),
                    error = %e,
                    "GetRate failed"
                );
                metrics::record_rate_query(QueryOutcome::NotFound);
                Err(convert::rate_error_status(&e))
            }
        }
    }

    async fn subscribe_rates(
        &self,
        request: Request<Streaming<RateRequest>>,
    ) -> StreamResult<Self::SubscribeRatesStream> {
        let inbound = request.into_inner();

        let session_id = self.registry.open_session();
        let clients = self.client_count.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::set_active_sessions(f64::from(clients));
        tracing::info!(
            session_id,
            mode = self.config.delivery_mode.as_str(),
            clients,
            "Rate subscription opened"
        );

        let (tx, grpc_rx) = tokio::sync::mpsc::channel(self.config.session_buffer.max(1));
        let session = StreamSession::new(
            session_id,
            inbound,
            tx,
            Arc::clone(&self.registry),
            self.query.clone(),
            self.update_trigger(),
        );
        let cancel = self.cancel.child_token();
        let client_count = self.client_count.clone();

        tokio::spawn(async move {
            match session.run(cancel).await {
                Ok(()) => tracing::info!(session_id, "Rate subscription closed by client"),
                Err(SessionError::Cancelled) => {
                    tracing::debug!(session_id, "Rate subscription cancelled");
                }
                Err(e) => tracing::warn!(session_id, error = %e, "Rate subscription ended"),
            }
            let remaining = client_count.fetch_sub(1, Ordering::Relaxed) - 1;
            metrics::set_active_sessions(f64::from(remaining));
        });

        let stream = ReceiverStream::new(grpc_rx);
        Ok(Response::new(Box::pin(stream) as Self::SubscribeRatesStream))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use tonic::Code;

    use super::*;
    use crate::domain::rates::RateTable;
    use crate::infrastructure::broadcast::RateUpdateHub;
    use crate::infrastructure::grpc::proto::currency::v1::Currencies;

    fn server() -> CurrencyServer {
        let table =
            RateTable::from_rates([("USD".to_string(), 1.1), ("INR".to_string(), 90.0)]).unwrap();
        CurrencyServer::new(
            CurrencyServerConfig::default(),
            RateQueryService::new(Arc::new(table)),
            Arc::new(SubscriptionRegistry::new()),
            Arc::new(RateUpdateHub::with_defaults()),
        )
    }

    fn request(base: Currencies, destination: Currencies) -> Request<RateRequest> {
        Request::new(RateRequest {
            base: base.into(),
            destination: destination.into(),
        })
    }

    #[tokio::test]
    async fn get_rate_returns_cross_rate() {
        let response = server()
            .get_rate(request(Currencies::Usd, Currencies::Inr))
            .await
            .unwrap()
            .into_inner();

        assert_eq!(response.base, Currencies::Usd as i32);
        assert_eq!(response.destination, Currencies::Inr as i32);
        assert!((response.rate - 81.818).abs() < 0.001);
        assert!(response.updated_at.is_some());
    }

    #[tokio::test]
    async fn get_rate_same_currency_is_invalid_argument() {
        let status = server()
            .get_rate(request(Currencies::Usd, Currencies::Usd))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn get_rate_unknown_enum_is_invalid_argument() {
        let status = server()
            .get_rate(Request::new(RateRequest {
                base: 77,
                destination: Currencies::Usd.into(),
            }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn get_rate_missing_currency_is_not_found() {
        let status = server()
            .get_rate(request(Currencies::Rub, Currencies::Usd))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        assert!(status.message().contains("RUB"));
    }

    #[test]
    fn server_config_default() {
        let config = CurrencyServerConfig::default();
        assert_eq!(config.delivery_mode, DeliveryMode::Tick);
        assert_eq!(config.session_buffer, 256);
    }
}
