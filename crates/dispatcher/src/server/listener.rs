//! Plaintext and TLS listeners feeding one shared pipeline.
//!
//! Each accepted connection gets its own task. The TLS listener completes
//! the handshake first; after that both transports hand the stream to the
//! same [`serve_connection`], so nothing past the handshake depends on the
//! transport.

use std::{fmt, net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use rustls::ServerConfig;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};
use uuid::Uuid;

use super::pipeline::ConnectionState;

/// Transport a listener accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plaintext,
    Tls,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Plaintext => "http",
            Transport::Tls => "https",
        })
    }
}

/// A bound listening socket for one transport.
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    acceptor: Option<TlsAcceptor>,
}

impl Listener {
    /// Bind a plaintext listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind_plaintext(addr: SocketAddr) -> Result<Self> {
        Self::bind(addr, None).await
    }

    /// Bind a TLS listener on `addr` serving the given rustls configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind_tls(addr: SocketAddr, tls: Arc<ServerConfig>) -> Result<Self> {
        Self::bind(addr, Some(TlsAcceptor::from(tls))).await
    }

    async fn bind(addr: SocketAddr, acceptor: Option<TlsAcceptor>) -> Result<Self> {
        let transport = if acceptor.is_some() {
            Transport::Tls
        } else {
            Transport::Plaintext
        };
        let inner = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {transport} listener on {addr}"))?;
        let local_addr = inner
            .local_addr()
            .with_context(|| format!("failed to read {transport} listener address"))?;

        info!(
            transport = %transport,
            addr = %local_addr,
            port = local_addr.port(),
            "listening"
        );

        Ok(Self {
            inner,
            local_addr,
            acceptor,
        })
    }

    /// Transport this listener accepts.
    pub fn transport(&self) -> Transport {
        if self.acceptor.is_some() {
            Transport::Tls
        } else {
            Transport::Plaintext
        }
    }

    /// The address actually bound (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept loop: serve every connection with `app`.
    ///
    /// Runs until the process is stopped. Failures of a single connection,
    /// including failed TLS handshakes, are logged and do not stop the loop.
    pub async fn run(self, app: Router) -> Result<()> {
        let transport = self.transport();
        loop {
            let (stream, peer_addr) = match self.inner.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(transport = %transport, error = %e, "accept error");
                    continue;
                }
            };

            let span = info_span!(
                "connection",
                id = %Uuid::new_v4(),
                transport = %transport,
                peer = %peer_addr
            );
            let acceptor = self.acceptor.clone();
            let app = app.clone();
            tokio::spawn(
                async move {
                    trace!(state = %ConnectionState::Accepted);
                    handle_stream(stream, acceptor, app).await;
                    trace!(state = %ConnectionState::Closed);
                }
                .instrument(span),
            );
        }
    }
}

async fn handle_stream(stream: TcpStream, acceptor: Option<TlsAcceptor>, app: Router) {
    match acceptor {
        None => serve_connection(stream, app).await,
        Some(acceptor) => match acceptor.accept(stream).await {
            Ok(tls_stream) => serve_connection(tls_stream, app).await,
            Err(e) => warn!(error = %e, "TLS handshake failed"),
        },
    }
}

/// Serve HTTP/1.1 or HTTP/2 on an established stream until the peer is done.
pub async fn serve_connection<I>(io: I, app: Router)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let service = TowerToHyperService::new(app);
    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(io), service)
        .await
    {
        debug!(error = %e, "connection ended with error");
    }
}

/// Run the plaintext and TLS listeners side by side.
///
/// Returns only if one of them fails; the other is dropped with it.
pub async fn run_dual(plaintext: Listener, tls: Listener, app: Router) -> Result<()> {
    tokio::try_join!(plaintext.run(app.clone()), tls.run(app))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handlers::default_routes;
    use crate::server::pipeline::{app, Pipeline};
    use crate::server::tls::{
        build_server_config,
        tests::{TEST_CERT, TEST_KEY},
    };
    use std::net::{Ipv4Addr, SocketAddrV4};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use axum::body::Bytes;
    use http_body_util::{BodyExt, Full};
    use tokio_rustls::TlsConnector;

    fn loopback() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
    }

    /// Status, content type and body of a raw HTTP/1.1 response.
    #[derive(Debug, PartialEq)]
    struct RawResponse {
        status: u16,
        content_type: Option<String>,
        body: String,
    }

    fn parse_response(buf: &[u8]) -> Option<RawResponse> {
        let head_end = buf.windows(4).position(|w| w == b"\r\n\r\n")?;
        let head = std::str::from_utf8(&buf[..head_end]).ok()?;
        let mut lines = head.split("\r\n");
        let status = lines.next()?.split_whitespace().nth(1)?.parse().ok()?;

        let mut content_type = None;
        let mut content_length = 0usize;
        for line in lines {
            let (name, value) = line.split_once(':')?;
            match name.trim().to_ascii_lowercase().as_str() {
                "content-type" => content_type = Some(value.trim().to_owned()),
                "content-length" => content_length = value.trim().parse().ok()?,
                _ => {}
            }
        }

        let body = buf.get(head_end + 4..head_end + 4 + content_length)?;
        Some(RawResponse {
            status,
            content_type,
            body: String::from_utf8(body.to_vec()).ok()?,
        })
    }

    async fn exchange<S>(mut stream: S, request: &str) -> RawResponse
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream.write_all(request.as_bytes()).await.unwrap();
        stream.flush().await.unwrap();

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(resp) = parse_response(&buf) {
                return resp;
            }
            match stream.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
        parse_response(&buf).expect("incomplete HTTP response")
    }

    fn tls_connector(alpn: &[&[u8]]) -> TlsConnector {
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut std::io::BufReader::new(TEST_CERT)) {
            roots.add(cert.unwrap()).unwrap();
        }
        let mut config = rustls::ClientConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
        config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
        TlsConnector::from(Arc::new(config))
    }

    async fn start() -> (SocketAddr, SocketAddr) {
        let tls = build_server_config(TEST_CERT, TEST_KEY).unwrap();
        let plaintext = Listener::bind_plaintext(loopback()).await.unwrap();
        let secure = Listener::bind_tls(loopback(), tls).await.unwrap();
        let addrs = (plaintext.local_addr(), secure.local_addr());
        let router = app(Pipeline::new(default_routes()));
        tokio::spawn(run_dual(plaintext, secure, router));
        addrs
    }

    async fn over_plaintext(addr: SocketAddr, request: &str) -> RawResponse {
        let stream = TcpStream::connect(addr).await.unwrap();
        exchange(stream, request).await
    }

    async fn connect_tls(
        addr: SocketAddr,
        alpn: &[&[u8]],
    ) -> tokio_rustls::client::TlsStream<TcpStream> {
        let stream = TcpStream::connect(addr).await.unwrap();
        let domain = rustls::pki_types::ServerName::try_from("localhost").unwrap();
        tls_connector(alpn).connect(domain, stream).await.unwrap()
    }

    async fn over_tls(addr: SocketAddr, request: &str) -> RawResponse {
        exchange(connect_tls(addr, &[]).await, request).await
    }

    fn request(method: &str, target: &str, body: &str) -> String {
        format!(
            "{method} {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\
             Content-Length: {}\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn transport_display() {
        assert_eq!(Transport::Plaintext.to_string(), "http");
        assert_eq!(Transport::Tls.to_string(), "https");
    }

    #[tokio::test]
    async fn bind_reports_local_addr_and_transport() {
        let listener = Listener::bind_plaintext(loopback()).await.unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        assert_eq!(listener.transport(), Transport::Plaintext);
    }

    #[tokio::test]
    async fn bind_conflict_is_an_error() {
        let first = Listener::bind_plaintext(loopback()).await.unwrap();
        let taken = first.local_addr();
        assert!(Listener::bind_plaintext(taken).await.is_err());
    }

    #[tokio::test]
    async fn both_listeners_give_identical_outcomes() {
        let (http_addr, https_addr) = start().await;

        let cases = [
            request("GET", "/ping", ""),
            request("GET", "/sample/", ""),
            request("POST", "/sample?a=1&a=2", "body"),
            request("DELETE", "/missing", ""),
        ];
        let expected = [
            (200, "{}"),
            (406, r#"{"name":"sample handler"}"#),
            (406, r#"{"name":"sample handler"}"#),
            (404, "{}"),
        ];

        for (req, (status, body)) in cases.iter().zip(expected) {
            let plain = over_plaintext(http_addr, req).await;
            let secure = over_tls(https_addr, req).await;
            assert_eq!(plain, secure, "request {req:?}");
            assert_eq!(plain.status, status);
            assert_eq!(plain.body, body);
            assert_eq!(plain.content_type.as_deref(), Some("application/json"));
        }
    }

    #[tokio::test]
    async fn failed_handshake_does_not_stop_tls_listener() {
        let (_, https_addr) = start().await;

        // Speak plaintext HTTP to the TLS port; the handshake fails.
        let mut stream = TcpStream::connect(https_addr).await.unwrap();
        stream
            .write_all(request("GET", "/ping", "").as_bytes())
            .await
            .unwrap();
        let mut sink = Vec::new();
        let _ = stream.read_to_end(&mut sink).await;

        let resp = over_tls(https_addr, &request("GET", "/ping", "")).await;
        assert_eq!(resp.status, 200);
    }

    #[tokio::test]
    async fn tls_listener_serves_http2() {
        let (_, https_addr) = start().await;
        let stream = connect_tls(https_addr, &[&b"h2"[..]]).await;
        assert_eq!(stream.get_ref().1.alpn_protocol(), Some(&b"h2"[..]));

        let (mut sender, conn) =
            hyper::client::conn::http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
                .await
                .unwrap();
        tokio::spawn(conn);

        let req = hyper::Request::builder()
            .method("POST")
            .uri("https://localhost/sample/?a=1")
            .body(Full::new(Bytes::from_static(b"body")))
            .unwrap();
        let resp = sender.send_request(req).await.unwrap();
        assert_eq!(resp.version(), hyper::Version::HTTP_2);
        assert_eq!(resp.status(), 406);
        assert_eq!(
            resp.headers()[hyper::header::CONTENT_TYPE],
            "application/json"
        );
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], br#"{"name":"sample handler"}"#);
    }
}
