//! `dispatcher` binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured logging (and OTLP export when configured).
//! 3. Build the route table and the shared pipeline.
//! 4. Load the TLS certificate and key.
//! 5. Bind the plaintext and TLS listeners and serve until interrupted.

mod config;
mod server;
mod telemetry;

use anyhow::Result;
use tracing::info;

use config::Config;
use server::listener::{self, Listener};
use server::pipeline::Pipeline;

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init_telemetry(cfg.otel_exporter_otlp_endpoint.as_deref(), &cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        http_port = cfg.http_port,
        https_port = cfg.https_port,
        "dispatcher starting"
    );

    // -----------------------------------------------------------------------
    // 3. Routes + pipeline
    // -----------------------------------------------------------------------
    let routes = server::handlers::default_routes();
    info!(routes = ?routes.paths(), "routes registered");
    let pipeline = Pipeline::new(routes)
        .with_max_body(cfg.max_body())
        .with_handler_timeout(cfg.handler_timeout());
    info!(
        routes = pipeline.routes().len(),
        max_body_bytes = cfg.max_body_bytes,
        handler_timeout_secs = cfg.handler_timeout_secs,
        "pipeline ready"
    );
    let app = server::pipeline::app(pipeline);

    // -----------------------------------------------------------------------
    // 4. TLS material
    // -----------------------------------------------------------------------
    let tls = server::tls::load_server_config(&cfg.tls_cert_path, &cfg.tls_key_path)?;

    // -----------------------------------------------------------------------
    // 5. Listeners
    // -----------------------------------------------------------------------
    let plaintext = Listener::bind_plaintext(cfg.http_addr()).await?;
    let secure = Listener::bind_tls(cfg.https_addr(), tls).await?;
    info!(
        http = %plaintext.local_addr(),
        https = %secure.local_addr(),
        "dispatcher ready"
    );

    tokio::select! {
        res = listener::run_dual(plaintext, secure, app) => res?,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    Ok(())
}
