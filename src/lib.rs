//! pgconnect: a configuration-driven PostgreSQL connection factory
//!
//! Reads connection parameters from a secrets store (or takes them directly),
//! opens exactly one TLS-encrypted, authenticated session and hands the
//! resulting [`ConnectionHandle`] to the caller. Connection failures are
//! reported through a [`DiagnosticReporter`] and come back as an explicit
//! absent result; every other fault propagates.
//!
//! ```no_run
//! # async fn example() -> pgconnect::Result<()> {
//! use pgconnect::{acquire_connection, ConnectionConfig, TracingReporter};
//! use pgconnect::secrets::EnvSecrets;
//!
//! let config = ConnectionConfig::from_secrets(&EnvSecrets::new())?;
//! if let Some(handle) = acquire_connection(&config, &TracingReporter).await? {
//!     let row = handle.client().query_one("SELECT 1", &[]).await;
//!     # let _ = row;
//!     handle.close().await;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod connection;
pub mod error;
pub mod factory;
pub mod metrics;
pub mod report;
pub mod secrets;

pub use config::{ConnectionConfig, ConnectionParams, ConnectionSettings, ConnectionTarget};
pub use connection::{ConnectionHandle, SslMode, TlsConfig};
pub use error::{ConnectionFailure, Error, Result};
pub use factory::{acquire_connection, try_connect};
pub use report::{DiagnosticReporter, MemoryReporter, StderrReporter, TracingReporter};
