//! Configuration loading and validation for the dispatcher.
//!
//! All values are read from environment variables at startup. The process will
//! exit with a clear error message if any required variable is missing or invalid.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Validated dispatcher configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Address both listeners bind to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Port of the plaintext HTTP listener.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Port of the TLS listener.
    #[serde(default = "default_https_port")]
    pub https_port: u16,

    /// Filesystem path to the PEM-encoded TLS certificate chain. **Required.**
    pub tls_cert_path: String,

    /// Filesystem path to the PEM-encoded TLS private key. **Required.**
    pub tls_key_path: String,

    /// Largest request body accepted, in bytes. `0` disables the limit.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Seconds to wait for a handler to complete. `0` waits forever.
    #[serde(default)]
    pub handler_timeout_secs: u64,

    /// Optional OTLP endpoint for span export.
    #[serde(default)]
    pub otel_exporter_otlp_endpoint: Option<String>,

    /// Tracing log level (e.g. `"info"`, `"debug"`).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_http_port() -> u16 {
    3000
}
fn default_https_port() -> u16 {
    3001
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}
fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any required variable is absent or cannot be parsed.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .context("failed to build configuration from environment")?;

        let c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise configuration")?;

        c.validate()?;
        Ok(c)
    }

    /// Socket address of the plaintext listener.
    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }

    /// Socket address of the TLS listener.
    pub fn https_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.https_port)
    }

    /// Body limit, or `None` when unlimited.
    pub fn max_body(&self) -> Option<usize> {
        (self.max_body_bytes > 0).then_some(self.max_body_bytes)
    }

    /// Handler completion timeout, or `None` when handlers may take forever.
    pub fn handler_timeout(&self) -> Option<Duration> {
        (self.handler_timeout_secs > 0).then(|| Duration::from_secs(self.handler_timeout_secs))
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    fn validate(&self) -> Result<()> {
        ensure_non_empty(&self.tls_cert_path, "TLS_CERT_PATH")?;
        ensure_non_empty(&self.tls_key_path, "TLS_KEY_PATH")?;

        if self.http_port == 0 {
            anyhow::bail!("HTTP_PORT must be non-zero");
        }
        if self.https_port == 0 {
            anyhow::bail!("HTTPS_PORT must be non-zero");
        }
        if self.http_port == self.https_port {
            anyhow::bail!("HTTP_PORT and HTTPS_PORT must differ (both {})", self.http_port);
        }
        Ok(())
    }
}

fn ensure_non_empty(value: &str, name: &str) -> Result<()> {
    if value.trim().is_empty() {
        anyhow::bail!("{name} is required and must not be empty");
    }
    Ok(())
}
