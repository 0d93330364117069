//! Structured logging, with optional OpenTelemetry span export.
//!
//! The log sink is append-only: lines from concurrent connections interleave
//! in whatever order tasks reach the subscriber.
//!
//! Log level is configurable via `LOG_LEVEL` (default: `info`) or `RUST_LOG`.

pub mod init;

pub use init::init_telemetry;
