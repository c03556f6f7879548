//! rustls glue for the driver's TLS hooks

use super::tls::TlsConfig;
use rustls_pki_types::ServerName;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_postgres::tls::{ChannelBinding, TlsConnect, TlsStream};
use tokio_rustls::TlsConnector;

/// Upgrades a socket to TLS when the server answers `S` to SSLRequest.
///
/// A disabled connector is only valid with `sslmode=disable`, where the
/// driver never asks for an upgrade.
///
/// Clones share handshake state, so a clone kept before handing the
/// connector to the driver reports whether the upgrade completed.
#[derive(Clone)]
pub struct RustlsConnect {
    inner: Option<(TlsConnector, ServerName<'static>)>,
    established: Arc<AtomicBool>,
}

impl RustlsConnect {
    /// Connector presenting `server_name` for SNI and verification
    pub fn new(config: &TlsConfig, server_name: ServerName<'static>) -> Self {
        Self {
            inner: Some((TlsConnector::from(config.client_config()), server_name)),
            established: Arc::default(),
        }
    }

    /// Connector that refuses to upgrade
    pub fn disabled() -> Self {
        Self {
            inner: None,
            established: Arc::default(),
        }
    }

    /// Whether this connector will encrypt the session
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Whether a TLS handshake through this connector (or a clone) completed
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }
}

impl<S> TlsConnect<S> for RustlsConnect
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Stream = RustlsStream<S>;
    type Error = io::Error;
    type Future = Pin<Box<dyn Future<Output = io::Result<RustlsStream<S>>> + Send>>;

    fn connect(self, stream: S) -> Self::Future {
        Box::pin(async move {
            let (connector, server_name) = self.inner.ok_or_else(|| {
                io::Error::new(io::ErrorKind::Unsupported, "TLS is disabled for this connection")
            })?;
            let stream = connector.connect(server_name, stream).await?;
            self.established.store(true, Ordering::Release);
            tracing::debug!("TLS handshake complete");
            Ok(RustlsStream(stream))
        })
    }
}

/// TLS-encrypted stream handed back to the driver
pub struct RustlsStream<S>(tokio_rustls::client::TlsStream<S>);

impl<S> RustlsStream<S> {
    /// `tls-server-end-point` data: SHA-256 of the server's DER certificate
    fn server_end_point(&self) -> Option<Vec<u8>> {
        let (_, conn) = self.0.get_ref();
        conn.peer_certificates()
            .and_then(|certs| certs.first())
            .map(|cert| Sha256::digest(cert.as_ref()).to_vec())
    }
}

impl<S> TlsStream for RustlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn channel_binding(&self) -> ChannelBinding {
        match self.server_end_point() {
            Some(hash) => ChannelBinding::tls_server_end_point(hash),
            None => ChannelBinding::none(),
        }
    }
}

impl<S> AsyncRead for RustlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl<S> AsyncWrite for RustlsStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{parse_server_name, SslMode};
    use rustls_pki_types::CertificateDer;

    #[test]
    fn test_disabled_connector() {
        assert!(!RustlsConnect::disabled().is_enabled());
    }

    #[test]
    fn test_enabled_connector() {
        let tls = TlsConfig::builder()
            .sslmode(SslMode::Require)
            .build()
            .expect("tls config");
        let connector = RustlsConnect::new(&tls, parse_server_name("localhost").unwrap());
        assert!(connector.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_connector_refuses_upgrade() {
        let connector = RustlsConnect::disabled();
        let (client, _server) = tokio::io::duplex(64);
        let result = TlsConnect::connect(connector.clone(), client).await;
        let err = result.err().expect("upgrade must fail");
        assert_eq!(err.kind(), io::ErrorKind::Unsupported);
        assert!(!connector.is_established());
    }

    fn fixture(name: &str) -> String {
        format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn server_cert_der() -> CertificateDer<'static> {
        let pem = std::fs::read(fixture("server.pem")).unwrap();
        let cert = rustls_pemfile::certs(&mut pem.as_slice())
            .next()
            .unwrap()
            .unwrap();
        cert
    }

    fn acceptor() -> tokio_rustls::TlsAcceptor {
        let key_pem = std::fs::read(fixture("server.key")).unwrap();
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .unwrap()
            .unwrap();
        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![server_cert_der()], key)
            .unwrap();
        tokio_rustls::TlsAcceptor::from(Arc::new(config))
    }

    async fn handshake(
        tls: &TlsConfig,
        host: &str,
    ) -> (RustlsConnect, io::Result<RustlsStream<tokio::io::DuplexStream>>) {
        let connector = RustlsConnect::new(tls, parse_server_name(host).unwrap());
        let (client, server) = tokio::io::duplex(16 * 1024);
        let acceptor = acceptor();
        let server = tokio::spawn(async move {
            let _ = acceptor.accept(server).await;
        });

        let result = TlsConnect::connect(connector.clone(), client).await;
        drop(server);
        (connector, result)
    }

    #[tokio::test]
    async fn test_require_accepts_untrusted_certificate() {
        let tls = TlsConfig::builder()
            .sslmode(SslMode::Require)
            .build()
            .unwrap();
        let (connector, result) = handshake(&tls, "db.internal").await;
        let stream = result.expect("require skips certificate checks");
        assert!(connector.is_established());

        let expected = Sha256::digest(server_cert_der().as_ref()).to_vec();
        assert_eq!(stream.server_end_point(), Some(expected));
    }

    #[tokio::test]
    async fn test_verify_ca_ignores_hostname() {
        let tls = TlsConfig::builder()
            .sslmode(SslMode::VerifyCa)
            .ca_cert_path(fixture("ca.pem"))
            .build()
            .unwrap();
        let (connector, result) = handshake(&tls, "db.internal").await;
        assert!(result.is_ok());
        assert!(connector.is_established());
    }

    #[tokio::test]
    async fn test_verify_ca_rejects_unknown_issuer() {
        let tls = TlsConfig::builder()
            .sslmode(SslMode::VerifyCa)
            .ca_cert_path(fixture("other-ca.pem"))
            .build()
            .unwrap();
        let (connector, result) = handshake(&tls, "localhost").await;
        assert!(result.is_err());
        assert!(!connector.is_established());
    }

    #[tokio::test]
    async fn test_verify_full_checks_hostname() {
        let tls = TlsConfig::builder()
            .sslmode(SslMode::VerifyFull)
            .ca_cert_path(fixture("ca.pem"))
            .build()
            .unwrap();

        let (_, result) = handshake(&tls, "localhost").await;
        assert!(result.is_ok());

        let (connector, result) = handshake(&tls, "db.internal").await;
        assert!(result.is_err());
        assert!(!connector.is_established());
    }
}
