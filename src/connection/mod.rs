//! Connection management
//!
//! This module handles:
//! * Transport abstraction (TCP vs Unix socket)
//! * TLS configuration and the rustls adapter used by the driver
//! * The handle returned to callers

mod handle;
mod tls;
mod tls_stream;
mod transport;

pub use handle::ConnectionHandle;
pub use tls::{parse_server_name, SslMode, TlsConfig, TlsConfigBuilder};
pub use tls_stream::{RustlsConnect, RustlsStream};
pub use transport::Transport;
