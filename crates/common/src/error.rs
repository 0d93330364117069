//! Request-path error taxonomy.
//!
//! None of these reach the caller as a structured error body: the pipeline
//! turns each into an ordinary JSON response with an empty object payload.

use thiserror::Error;

/// Failures that can end a request before a handler result is written.
///
/// Variants map to HTTP status codes returned to callers:
/// - [`DispatchError::BodyTooLarge`] → 413
/// - [`DispatchError::BodyRead`] → 400
/// - [`DispatchError::HandlerDropped`] → 500
/// - [`DispatchError::HandlerTimeout`] → 504
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The request body grew past the configured maximum.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// The client stream failed while the body was being read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// The handler released its completion handle without completing.
    #[error("handler for '{path}' dropped its completion handle")]
    HandlerDropped { path: String },

    /// The handler did not complete within the configured timeout.
    #[error("handler for '{path}' did not complete within {timeout_secs}s")]
    HandlerTimeout { path: String, timeout_secs: u64 },
}

impl DispatchError {
    /// Returns the HTTP status code that should be sent for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            DispatchError::BodyTooLarge { .. } => 413,
            DispatchError::BodyRead(_) => 400,
            DispatchError::HandlerDropped { .. } => 500,
            DispatchError::HandlerTimeout { .. } => 504,
        }
    }
}
