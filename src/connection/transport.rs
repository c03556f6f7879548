//! Transport abstraction (TCP vs Unix socket)
//!
//! TLS is layered on top by the driver after the SSLRequest exchange, so the
//! transport itself is always a raw socket.

use crate::config::{ConnectionInfo, TransportType};
use crate::ConnectionFailure;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpSocket, TcpStream, UnixStream};

/// Transport layer abstraction
#[derive(Debug)]
pub enum Transport {
    /// TCP socket
    Tcp(TcpStream),
    /// Unix domain socket
    Unix(UnixStream),
}

impl Transport {
    /// Open the socket described by resolved connection parameters
    pub async fn connect(info: &ConnectionInfo) -> Result<Self, ConnectionFailure> {
        match (info.transport, &info.host, &info.unix_socket) {
            (TransportType::Tcp, Some(host), _) => {
                Self::connect_tcp(host, info.port, info.bind_address, info.options.keepalives)
                    .await
            }
            (TransportType::Unix, _, Some(path)) => Self::connect_unix(path).await,
            _ => Err(ConnectionFailure::Unreachable {
                target: info.endpoint(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "no address to connect to"),
            }),
        }
    }

    /// Connect via TCP, trying each resolved address in turn
    pub async fn connect_tcp(
        host: &str,
        port: u16,
        bind_address: Option<IpAddr>,
        keepalive: bool,
    ) -> Result<Self, ConnectionFailure> {
        let target = if host.contains(':') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
        let unreachable = |source: io::Error| ConnectionFailure::Unreachable {
            target: target.clone(),
            source,
        };

        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(&unreachable)?;

        let mut last_err = None;
        for addr in addrs {
            // A bound local address pins the address family
            if let Some(local) = bind_address {
                if local.is_ipv4() != addr.is_ipv4() {
                    continue;
                }
            }

            match Self::connect_addr(addr, bind_address, keepalive).await {
                Ok(stream) => {
                    tracing::debug!(%addr, "tcp connected");
                    return Ok(Transport::Tcp(stream));
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "tcp connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(unreachable(last_err.unwrap_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no usable address for host",
            )
        })))
    }

    async fn connect_addr(
        addr: SocketAddr,
        bind_address: Option<IpAddr>,
        keepalive: bool,
    ) -> io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(local) = bind_address {
            socket.bind(SocketAddr::new(local, 0))?;
        }
        socket.set_keepalive(keepalive)?;

        let stream = socket.connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect via Unix socket
    pub async fn connect_unix(path: &Path) -> Result<Self, ConnectionFailure> {
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| ConnectionFailure::Unreachable {
                target: path.display().to_string(),
                source,
            })?;
        Ok(Transport::Unix(stream))
    }

    /// Local address of a TCP transport
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Transport::Tcp(stream) => stream.local_addr().ok(),
            Transport::Unix(_) => None,
        }
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Transport::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
