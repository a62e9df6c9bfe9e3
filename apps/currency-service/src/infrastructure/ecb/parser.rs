//! Reference feed document parsing.
//!
//! The feed nests three levels of `Cube` elements:
//!
//! ```text
//! <gesmes:Envelope>
//!   <Cube>
//!     <Cube time="2024-01-05">
//!       <Cube currency="USD" rate="1.0921"/>
//!       ...
//! ```
//!
//! Only the first dated cube is used; historical feeds list the most recent
//! day first.

use serde::Deserialize;

use crate::application::ports::FetchError;
use crate::domain::rates::{CurrencyCode, RateTable};

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "Cube", default)]
    cube: Option<OuterCube>,
}

#[derive(Debug, Deserialize)]
struct OuterCube {
    #[serde(rename = "Cube", default)]
    days: Vec<DayCube>,
}

#[derive(Debug, Deserialize)]
struct DayCube {
    #[serde(rename = "Cube", default)]
    rates: Vec<RateCube>,
}

#[derive(Debug, Deserialize)]
struct RateCube {
    #[serde(rename = "@currency")]
    currency: String,
    #[serde(rename = "@rate")]
    rate: String,
}

/// Parse a reference feed document into a fresh table.
///
/// The reference currency is inserted at 1.0.
///
/// # Errors
///
/// - [`FetchError::Malformed`] if the document is not the expected XML
/// - [`FetchError::InvalidRate`] if a rate is not a positive number
/// - [`FetchError::EmptyFeed`] if no currency entries are present
/// - [`FetchError::Rejected`] if the table refuses an entry
pub fn parse_reference_feed(document: &str) -> Result<RateTable, FetchError> {
    let envelope: Envelope =
        quick_xml::de::from_str(document).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let entries = envelope
        .cube
        .and_then(|outer| outer.days.into_iter().next())
        .map(|day| day.rates)
        .unwrap_or_default();

    if entries.is_empty() {
        return Err(FetchError::EmptyFeed);
    }

    let mut rates: Vec<(CurrencyCode, f64)> = Vec::with_capacity(entries.len());
    for entry in entries {
        let value = entry
            .rate
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .ok_or_else(|| FetchError::InvalidRate {
                currency: entry.currency.clone(),
                value: entry.rate.clone(),
            })?;
        rates.push((entry.currency, value));
    }

    Ok(RateTable::from_rates(rates)?)
}
