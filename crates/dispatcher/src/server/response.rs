//! Turns a [`HandlerResult`] into the JSON wire response.
//!
//! Every response, including fallbacks and failures, has the same shape:
//! `Content-Type: application/json`, the (coerced) status code, and a JSON
//! object or array body.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use common::{DispatchError, HandlerResult};
use serde_json::{Map, Value};
use tracing::info;

/// Content type of every response the dispatcher writes.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// A fully coerced response, ready to be written.
#[derive(Debug, Clone, PartialEq)]
pub struct WireResponse {
    pub status: StatusCode,
    /// Serialized JSON body.
    pub body: String,
}

impl WireResponse {
    /// Coerce a handler result into a writable response.
    pub fn from_result(result: HandlerResult) -> Self {
        let status = coerce_status(&result.status_code);
        let payload = coerce_payload(result.payload);
        // Serialising a `Value` with string keys cannot fail.
        let body = serde_json::to_string(&payload).unwrap_or_else(|_| "{}".to_owned());
        Self { status, body }
    }
}

impl IntoResponse for WireResponse {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
            self.body,
        )
            .into_response()
    }
}

/// Status code to send for a handler-reported value.
///
/// Anything other than a whole number in `100..=999` becomes `200 OK`.
/// Whole-number floats such as `406.0` count.
pub fn coerce_status(value: &Value) -> StatusCode {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u16::MAX))
                .map(|f| f as u64)
        })
        .and_then(|n| u16::try_from(n).ok())
        .and_then(|n| StatusCode::from_u16(n).ok())
        .unwrap_or(StatusCode::OK)
}

/// Payload to send for a handler-reported value.
///
/// Objects and arrays pass through; anything else, including an absent
/// (`null`) payload, becomes `{}`.
pub fn coerce_payload(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => value,
        _ => Value::Object(Map::new()),
    }
}

/// Write the response for a completed handler and log the outcome.
pub fn respond(result: HandlerResult) -> Response {
    let wire = WireResponse::from_result(result);
    info!(
        status = wire.status.as_u16(),
        body = %wire.body,
        "returning response"
    );
    wire.into_response()
}

/// Write the response for a request that ended before a handler result.
pub fn respond_error(error: &DispatchError) -> Response {
    respond(HandlerResult::status(error.http_status()))
}
