//! Driver tuning options
//!
//! Keys follow libpq naming so the same spelling works in a DSN query string,
//! a key/value DSN, or the config options map.

use crate::{Error, Result};
use std::time::Duration;

/// Tuning knobs applied to a single connection attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Bound on the whole attempt: TCP connect, TLS handshake and authentication
    pub connect_timeout: Option<Duration>,
    /// Enable TCP keepalive on the socket (default: on)
    pub keepalives: bool,
    /// Application name reported to the server
    pub application_name: Option<String>,
    /// Raw server command-line options (`-c name=value ...`)
    pub options: Option<String>,
    /// Server-side statement timeout
    pub statement_timeout: Option<Duration>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            keepalives: true,
            application_name: None,
            options: None,
            statement_timeout: None,
        }
    }
}

impl ConnectionOptions {
    /// Set an option from its string form.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for unknown keys and values that do not parse.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "connect_timeout" => {
                let secs: i64 = value.trim().parse().map_err(|_| {
                    Error::Config(format!(
                        "invalid connect_timeout '{}': expected whole seconds",
                        value
                    ))
                })?;
                // libpq treats zero or negative as "wait forever"
                self.connect_timeout = if secs > 0 {
                    Some(Duration::from_secs(secs as u64))
                } else {
                    None
                };
            }
            "keepalives" => {
                self.keepalives = match value.trim() {
                    "1" | "true" | "on" => true,
                    "0" | "false" | "off" => false,
                    other => {
                        return Err(Error::Config(format!(
                            "invalid keepalives '{}': expected 0 or 1",
                            other
                        )))
                    }
                };
            }
            "application_name" => self.application_name = Some(value.to_string()),
            "options" => self.options = Some(value.to_string()),
            "statement_timeout" => {
                let millis: u64 = value.trim().parse().map_err(|_| {
                    Error::Config(format!(
                        "invalid statement_timeout '{}': expected milliseconds",
                        value
                    ))
                })?;
                self.statement_timeout = Some(Duration::from_millis(millis));
            }
            other => {
                return Err(Error::Config(format!(
                    "unrecognized connection option '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    /// Server options string sent in the startup packet, merging `statement_timeout`
    pub fn server_options(&self) -> Option<String> {
        let timeout = self
            .statement_timeout
            .map(|t| format!("-c statement_timeout={}", t.as_millis()));

        match (self.options.as_deref(), timeout) {
            (Some(opts), Some(t)) => Some(format!("{} {}", opts, t)),
            (Some(opts), None) => Some(opts.to_string()),
            (None, Some(t)) => Some(t),
            (None, None) => None,
        }
    }
}
