//! In-process PostgreSQL backend speaking just enough of the startup protocol

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;

const SSL_REQUEST_CODE: u32 = 80877103;

/// How the backend answers a startup message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// AuthenticationOk followed by ReadyForQuery
    Accept,
    /// FATAL 28P01 password authentication failed
    RejectPassword,
    /// Accept the socket and never answer
    Silent,
}

/// Path of a file under `tests/fixtures`.
///
/// `server.pem` is issued by `ca.pem` for `localhost` and `127.0.0.1`;
/// `other-ca.pem` is an unrelated authority.
pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

/// Start a plaintext backend on an ephemeral loopback port.
///
/// SSLRequest is answered with `N`.
pub async fn spawn_backend(behavior: Behavior) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve(stream, behavior));
        }
    });

    addr
}

/// Start a backend that only talks TLS, presenting `server.pem`
pub async fn spawn_tls_backend(behavior: Behavior) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let acceptor = tls_acceptor();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_tls(stream, acceptor.clone(), behavior));
        }
    });

    addr
}

/// A loopback port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    drop(listener);
    port
}

fn tls_acceptor() -> TlsAcceptor {
    let cert_pem = std::fs::read(fixture("server.pem")).expect("server.pem");
    let certs = rustls_pemfile::certs(&mut cert_pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .expect("server certificate");
    let key_pem = std::fs::read(fixture("server.key")).expect("server.key");
    let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
        .expect("server key")
        .expect("server key present");

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .expect("server config");
    TlsAcceptor::from(Arc::new(config))
}

async fn serve(mut stream: TcpStream, behavior: Behavior) {
    if behavior == Behavior::Silent {
        hold(stream).await;
        return;
    }

    loop {
        let Ok(code) = read_startup(&mut stream).await else {
            return;
        };
        if code != SSL_REQUEST_CODE {
            break;
        }
        if stream.write_all(b"N").await.is_err() {
            return;
        }
    }

    answer(stream, behavior).await;
}

async fn serve_tls(mut stream: TcpStream, acceptor: TlsAcceptor, behavior: Behavior) {
    if behavior == Behavior::Silent {
        hold(stream).await;
        return;
    }

    // Plaintext startup is not served
    match read_startup(&mut stream).await {
        Ok(SSL_REQUEST_CODE) => {}
        _ => return,
    }
    if stream.write_all(b"S").await.is_err() {
        return;
    }
    let Ok(mut tls) = acceptor.accept(stream).await else {
        return;
    };
    if read_startup(&mut tls).await.is_err() {
        return;
    }
    answer(tls, behavior).await;
}

async fn answer<S>(mut stream: S, behavior: Behavior)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = match behavior {
        Behavior::Accept => {
            let mut buf = message(b'R', &0i32.to_be_bytes());
            buf.extend(message(b'Z', b"I"));
            buf
        }
        Behavior::RejectPassword => error_response(
            "28P01",
            "password authentication failed for user \"bad\"",
        ),
        Behavior::Silent => return hold(stream).await,
    };
    if stream.write_all(&reply).await.is_err() || stream.flush().await.is_err() {
        return;
    }
    hold(stream).await;
}

async fn read_startup<S>(stream: &mut S) -> std::io::Result<u32>
where
    S: AsyncRead + Unpin,
{
    let len = stream.read_u32().await? as usize;
    let mut body = vec![0u8; len.saturating_sub(4)];
    stream.read_exact(&mut body).await?;
    let code = body
        .get(..4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .unwrap_or_default();
    Ok(code)
}

/// Keep the socket open until the client goes away
async fn hold<S>(mut stream: S)
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    while let Ok(n) = stream.read(&mut buf).await {
        if n == 0 {
            break;
        }
    }
}

fn message(tag: u8, body: &[u8]) -> Vec<u8> {
    let mut buf = vec![tag];
    buf.extend(((body.len() + 4) as i32).to_be_bytes());
    buf.extend(body);
    buf
}

fn error_response(code: &str, text: &str) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in [(b'S', "FATAL"), (b'V', "FATAL"), (b'C', code), (b'M', text)] {
        body.push(field);
        body.extend(value.as_bytes());
        body.push(0);
    }
    body.push(0);
    message(b'E', &body)
}
