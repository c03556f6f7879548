//! Error types

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration is malformed or incomplete
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A required key is absent from the secrets store
    #[error("missing secret: {0}")]
    MissingSecret(String),

    /// The secrets store itself could not be read
    #[error("secrets store error: {0}")]
    Secrets(String),

    /// The server could not be reached, refused us, or the session could not be set up
    #[error(transparent)]
    Connection(#[from] ConnectionFailure),
}

impl Error {
    /// Whether this error is a connection failure (as opposed to a configuration fault)
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Operational failure while establishing a session.
///
/// This is the only error class [`crate::acquire_connection`] recovers from.
#[derive(Debug, Error)]
pub enum ConnectionFailure {
    /// Socket could not be opened (DNS failure, refused, unreachable network)
    #[error("could not connect to server at {target}: {source}")]
    Unreachable {
        /// Human-readable endpoint (`host:port` or socket path)
        target: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// The attempt did not finish within `connect_timeout`
    #[error("timeout expired after {}s", .0.as_secs())]
    Timeout(Duration),

    /// TLS was required but never established: the server refused the
    /// SSLRequest or the handshake failed
    #[error("{0}")]
    Tls(#[source] tokio_postgres::Error),

    /// Error reported by the driver during startup (auth rejection, protocol)
    #[error("{0}")]
    Server(#[from] tokio_postgres::Error),
}

impl ConnectionFailure {
    /// Whether the server rejected our credentials (SQLSTATE class 28)
    pub fn is_authentication(&self) -> bool {
        match self {
            ConnectionFailure::Server(err) => matches!(
                err.code(),
                Some(code) if *code == SqlState::INVALID_PASSWORD
                    || *code == SqlState::INVALID_AUTHORIZATION_SPECIFICATION
            ),
            _ => false,
        }
    }

    /// Short label identifying the failure class, used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionFailure::Unreachable { .. } => "unreachable",
            ConnectionFailure::Timeout(_) => "timeout",
            ConnectionFailure::Tls(_) => "tls",
            ConnectionFailure::Server(_) if self.is_authentication() => "authentication",
            ConnectionFailure::Server(_) => "server",
        }
    }
}
