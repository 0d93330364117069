//! TLS server configuration using rustls.
//!
//! The certificate chain and private key are read once at startup from the
//! configured PEM files. Any failure here is fatal to the process.

use anyhow::{Context, Result};
use rustls::ServerConfig;
use std::{path::Path, sync::Arc};

/// ALPN protocols offered to clients, most preferred first.
const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Read the PEM files at `cert_path` and `key_path` and build a server config.
///
/// # Errors
///
/// Returns an error if either file cannot be read or the PEM data is rejected.
pub fn load_server_config(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>> {
    let cert_path = cert_path.as_ref();
    let key_path = key_path.as_ref();
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("failed to read TLS certificate {}", cert_path.display()))?;
    let key_pem = std::fs::read(key_path)
        .with_context(|| format!("failed to read TLS private key {}", key_path.display()))?;
    build_server_config(&cert_pem, &key_pem)
}

/// Build a [`rustls::ServerConfig`] from PEM-encoded certificate and private key bytes.
///
/// # Errors
///
/// Returns an error if the certificate or key cannot be parsed, or if rustls
/// rejects the configuration.
pub fn build_server_config(cert_pem: &[u8], key_pem: &[u8]) -> Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut std::io::BufReader::new(cert_pem))
        .collect::<Result<Vec<_>, _>>()
        .context("failed to parse TLS certificate chain")?;
    if certs.is_empty() {
        anyhow::bail!("no certificate found in PEM data");
    }

    let key = rustls_pemfile::private_key(&mut std::io::BufReader::new(key_pem))
        .context("failed to read TLS private key")?
        .context("no private key found in PEM data")?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()
            .context("failed to select TLS protocol versions")?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .context("failed to build rustls ServerConfig")?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_CERT: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/localhost.crt"));
    pub(crate) const TEST_KEY: &[u8] =
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/testdata/localhost.key"));

    #[test]
    fn rejects_empty_cert_pem() {
        let result = build_server_config(b"", b"");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_garbage_pem() {
        let result = build_server_config(b"not a pem", b"also not a pem");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_key() {
        let result = build_server_config(TEST_CERT, b"");
        assert!(result.is_err());
    }

    #[test]
    fn accepts_valid_pair_and_offers_alpn() {
        let config = build_server_config(TEST_CERT, TEST_KEY).unwrap();
        assert_eq!(
            config.alpn_protocols,
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        );
    }

    #[test]
    fn missing_files_are_reported() {
        let err = load_server_config("/nonexistent/tls.crt", "/nonexistent/tls.key").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/tls.crt"));
    }

    #[test]
    fn loads_from_files() {
        let dir = concat!(env!("CARGO_MANIFEST_DIR"), "/testdata");
        let result = load_server_config(
            format!("{dir}/localhost.crt"),
            format!("{dir}/localhost.key"),
        );
        assert!(result.is_ok());
    }
}
