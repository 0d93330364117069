//! Request and response types exchanged between the pipeline and handlers.
//!
//! Nothing in here knows about sockets or TLS: the same [`NormalizedRequest`]
//! is produced for plaintext and encrypted connections alike.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Normalized request
// ---------------------------------------------------------------------------

/// Value of a single request header.
///
/// A header that appears once is [`HeaderValue::Single`]; a header repeated
/// on the wire collects every value, in arrival order, in
/// [`HeaderValue::Multiple`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multiple(Vec<String>),
}

impl HeaderValue {
    /// Append another occurrence of the same header.
    pub fn push(&mut self, value: String) {
        match self {
            HeaderValue::Single(first) => {
                let first = std::mem::take(first);
                *self = HeaderValue::Multiple(vec![first, value]);
            }
            HeaderValue::Multiple(values) => values.push(value),
        }
    }

    /// The first value received for this header.
    pub fn first(&self) -> &str {
        match self {
            HeaderValue::Single(v) => v,
            HeaderValue::Multiple(values) => values.first().map(String::as_str).unwrap_or(""),
        }
    }
}

/// Canonical, transport-agnostic description of one inbound request.
///
/// Invariants upheld by the normalizer that builds it:
/// - `path` never starts or ends with `/` (inner empty segments are kept).
/// - `method` is lowercase.
/// - header names are lowercase.
///
/// Handlers receive it behind an `Arc` and cannot mutate it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRequest {
    /// Request path with leading and trailing slashes removed, e.g. `"a//b"`.
    pub path: String,
    /// Query parameters; the last occurrence of a repeated key wins.
    pub query_params: HashMap<String, String>,
    /// Lowercase request method, e.g. `"get"`.
    pub method: String,
    /// Request headers keyed by lowercase name.
    pub headers: HashMap<String, HeaderValue>,
    /// Request body decoded as UTF-8.
    pub raw_body: String,
}

impl NormalizedRequest {
    /// Look up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(&name.to_ascii_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Handler result
// ---------------------------------------------------------------------------

/// What a handler hands back through its completion handle.
///
/// Both fields are loosely typed JSON on purpose: a handler may report a
/// status code or payload the response writer cannot use, and the writer
/// substitutes `200` / `{}` instead of failing. `Value::Null` means "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Requested HTTP status code; anything but a valid integer status becomes 200.
    pub status_code: Value,
    /// Response payload; anything but an object or array becomes `{}`.
    pub payload: Value,
}

impl HandlerResult {
    /// Construct a result from arbitrary JSON status and payload values.
    pub fn new(status_code: impl Into<Value>, payload: impl Into<Value>) -> Self {
        Self {
            status_code: status_code.into(),
            payload: payload.into(),
        }
    }

    /// A result carrying only a status code; the payload defaults to `{}`.
    pub fn status(status_code: u16) -> Self {
        Self::new(status_code, Value::Null)
    }

    /// A result carrying a status code and a serializable payload.
    ///
    /// A payload that fails to serialize is treated as absent.
    pub fn json<T: Serialize>(status_code: u16, payload: &T) -> Self {
        Self::new(status_code, serde_json::to_value(payload).unwrap_or(Value::Null))
    }
}

// ---------------------------------------------------------------------------
// Bundled handler payloads
// ---------------------------------------------------------------------------

/// Payload returned by the `sample` route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResponse {
    /// Name of the handler that produced the response.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn header_value_collects_repeats() {
        let mut v = HeaderValue::Single("a".into());
        v.push("b".into());
        v.push("c".into());
        assert_eq!(v, HeaderValue::Multiple(vec!["a".into(), "b".into(), "c".into()]));
        assert_eq!(v.first(), "a");
    }

    #[test]
    fn header_value_serializes_untagged() {
        let single = serde_json::to_value(HeaderValue::Single("x".into())).unwrap();
        assert_eq!(single, json!("x"));
        let multiple =
            serde_json::to_value(HeaderValue::Multiple(vec!["x".into(), "y".into()])).unwrap();
        assert_eq!(multiple, json!(["x", "y"]));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let mut req = NormalizedRequest::default();
        req.headers
            .insert("content-type".into(), HeaderValue::Single("text/plain".into()));
        assert_eq!(req.header("Content-Type").map(HeaderValue::first), Some("text/plain"));
        assert!(req.header("accept").is_none());
    }

    #[test]
    fn status_only_result_has_null_payload() {
        let r = HandlerResult::status(404);
        assert_eq!(r.status_code, json!(404));
        assert!(r.payload.is_null());
    }

    #[test]
    fn json_result_serializes_payload() {
        let r = HandlerResult::json(
            406,
            &SampleResponse {
                name: "sample handler".into(),
            },
        );
        assert_eq!(r.payload, json!({"name": "sample handler"}));
    }
}
