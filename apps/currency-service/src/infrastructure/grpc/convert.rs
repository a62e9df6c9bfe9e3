//! Conversions between wire messages and domain types.

use chrono::{DateTime, Utc};
use prost_types::Timestamp;
use tonic::{Code, Status};
use tonic_types::{ErrorDetails, StatusExt};

use super::proto::currency::v1::{
    Currencies, RateError as RateErrorMessage, RateRequest, RateResponse, StreamingRateResponse,
    streaming_rate_response,
};
use crate::application::services::RateQuote;
use crate::domain::rates::{InvalidRequest, RateError, RatePair};

/// Decode a wire request into a validated pair.
///
/// # Errors
///
/// Returns [`InvalidRequest::UnknownCurrency`] for an enum value outside
/// [`Currencies`] and [`InvalidRequest::SameCurrency`] when base and
/// destination are equal.
pub fn request_to_pair(request: &RateRequest) -> Result<RatePair, InvalidRequest> {
    let base = currency_code(request.base)?;
    let destination = currency_code(request.destination)?;
    RatePair::new(base, destination)
}

fn currency_code(value: i32) -> Result<&'static str, InvalidRequest> {
    Currencies::try_from(value)
        .map(|c| c.as_str_name())
        .map_err(|_| InvalidRequest::UnknownCurrency(value))
}

/// Build a wire response for a computed quote.
#[must_use]
pub fn quote_to_response(request: RateRequest, quote: RateQuote) -> RateResponse {
    RateResponse {
        base: request.base,
        destination: request.destination,
        rate: quote.rate,
        updated_at: Some(datetime_to_timestamp(quote.as_of)),
    }
}

/// Wrap a rate response for the subscription stream.
#[must_use]
pub fn streaming_rate(response: RateResponse) -> StreamingRateResponse {
    StreamingRateResponse {
        message: Some(streaming_rate_response::Message::RateResponse(response)),
    }
}

/// Wrap a per-request failure for the subscription stream.
#[must_use]
pub fn streaming_error(request: RateRequest, status: &Status) -> StreamingRateResponse {
    StreamingRateResponse {
        message: Some(streaming_rate_response::Message::Error(RateErrorMessage {
            request: Some(request),
            code: status.code() as i32,
            message: status.message().to_string(),
        })),
    }
}

/// `INVALID_ARGUMENT` with a bad-request violation naming the field.
#[must_use]
pub fn invalid_request_status(error: &InvalidRequest) -> Status {
    let field = match error {
        InvalidRequest::SameCurrency(_) => "destination",
        InvalidRequest::UnknownCurrency(_) => "base_or_destination",
    };

    let mut details = ErrorDetails::new();
    details.add_bad_request_violation(field, error.to_string());
    Status::with_error_details(Code::InvalidArgument, error.to_string(), details)
}

/// `NOT_FOUND` for a missing currency, `INTERNAL` for anything else.
#[must_use]
pub fn rate_error_status(error: &RateError) -> Status {
    match error {
        RateError::NotFound(_) => Status::not_found(error.to_string()),
        RateError::InvalidRate { .. } => Status::internal(error.to_string()),
    }
}

/// Convert a chrono timestamp to protobuf.
#[must_use]
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: dt.timestamp(),
        nanos: i32::try_from(dt.timestamp_subsec_nanos()).unwrap_or(i32::MAX),
    }
}
