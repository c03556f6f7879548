//! Connection configuration
//!
//! A [`ConnectionConfig`] names its target either as an opaque DSN or as
//! discrete fields, never both. Loosely typed sources (TOML, secrets stores)
//! go through [`ConnectionSettings`], whose conversion enforces that rule.

mod connection_string;
mod options;

pub use connection_string::{ConnectionInfo, TransportType};
pub use options::ConnectionOptions;

use crate::connection::SslMode;
use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Port used when none is given
pub const DEFAULT_PORT: u16 = 5432;

/// Parse a port number, rejecting anything outside `1..=65535`
pub(crate) fn parse_port(value: &str) -> Result<u16> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(Error::Config(format!(
            "invalid port '{}': expected an integer between 1 and 65535",
            value
        ))),
    }
}

/// Discrete connection fields, all required
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Host name, IP address, or Unix socket directory (absolute path)
    pub host: String,
    /// Port
    pub port: u16,
    /// Username
    pub user: String,
    /// Password
    pub password: String,
    /// Database name
    pub dbname: String,
}

impl ConnectionParams {
    /// Create a new set of discrete connection fields
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
        dbname: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            dbname: dbname.into(),
        }
    }
}

impl std::fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .finish()
    }
}

/// Where to connect
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    /// Opaque connection string (URL or key/value form)
    Dsn(String),
    /// Discrete fields
    Params(ConnectionParams),
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // DSNs usually embed the password
            Self::Dsn(_) => f.write_str("Dsn(<redacted>)"),
            Self::Params(params) => f.debug_tuple("Params").field(params).finish(),
        }
    }
}

/// Connection configuration
///
/// Built explicitly and passed to the factory; nothing here reads process state.
///
/// # Examples
///
/// ```
/// use pgconnect::{ConnectionConfig, ConnectionParams, SslMode};
///
/// let config = ConnectionConfig::params(ConnectionParams::new(
///     "db.example.com", 5432, "app", "secret", "orders",
/// ))
/// .with_option("connect_timeout", "10")
/// .with_sslmode(SslMode::VerifyFull);
/// # let _ = config;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// DSN or discrete fields
    pub target: ConnectionTarget,
    /// Explicit TLS mode; overrides any `sslmode` in the DSN (default: require)
    pub sslmode: Option<SslMode>,
    /// Driver tuning options by libpq key (`connect_timeout`, `keepalives`, ...)
    pub options: BTreeMap<String, String>,
    /// Local address for outbound TCP connections
    pub bind_address: Option<IpAddr>,
}

impl ConnectionConfig {
    /// Configuration from a connection string
    pub fn dsn(dsn: impl Into<String>) -> Self {
        Self::new(ConnectionTarget::Dsn(dsn.into()))
    }

    /// Configuration from discrete fields
    pub fn params(params: ConnectionParams) -> Self {
        Self::new(ConnectionTarget::Params(params))
    }

    fn new(target: ConnectionTarget) -> Self {
        Self {
            target,
            sslmode: None,
            options: BTreeMap::new(),
            bind_address: None,
        }
    }

    /// Set the TLS mode
    pub fn with_sslmode(mut self, mode: SslMode) -> Self {
        self.sslmode = Some(mode);
        self
    }

    /// Add a tuning option
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Bind outbound TCP sockets to a local address
    pub fn with_bind_address(mut self, addr: IpAddr) -> Self {
        self.bind_address = Some(addr);
        self
    }

    /// Validate and resolve into concrete connection parameters.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for malformed DSNs, invalid ports, unknown
    /// options, and inconsistent TLS file settings.
    pub fn resolve(&self) -> Result<ConnectionInfo> {
        let mut info = match &self.target {
            ConnectionTarget::Dsn(dsn) => ConnectionInfo::parse(dsn)?,
            ConnectionTarget::Params(params) => ConnectionInfo::from_params(params)?,
        };

        for (key, value) in &self.options {
            info.apply_option(key, value)?;
        }

        if let Some(mode) = self.sslmode {
            if info.transport == TransportType::Tcp {
                info.sslmode = mode;
            } else if mode != SslMode::Disable {
                tracing::debug!(sslmode = %mode, "ignoring sslmode for Unix socket connection");
            }
        }

        if let Some(addr) = self.bind_address {
            if info.transport == TransportType::Unix {
                return Err(Error::Config(
                    "bind_address only applies to TCP connections".into(),
                ));
            }
            info.bind_address = Some(addr);
        }

        Ok(info)
    }
}

/// Scalar value as it appears in TOML or other loosely typed sources
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Integer literal
    Integer(i64),
    /// Boolean literal
    Boolean(bool),
    /// String literal
    Text(String),
}

impl std::fmt::Display for SettingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{}", n),
            Self::Boolean(true) => f.write_str("1"),
            Self::Boolean(false) => f.write_str("0"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Connection settings with every field optional.
///
/// Deserializable from TOML; convert with `ConnectionConfig::try_from`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Connection string
    #[serde(alias = "database_url", alias = "url")]
    pub dsn: Option<String>,
    /// Host
    pub host: Option<String>,
    /// Port
    pub port: Option<SettingValue>,
    /// Username
    pub user: Option<String>,
    /// Password
    pub password: Option<String>,
    /// Database name
    #[serde(alias = "database", alias = "name")]
    pub dbname: Option<String>,
    /// TLS mode
    pub sslmode: Option<String>,
    /// Tuning options
    pub options: BTreeMap<String, SettingValue>,
    /// Local bind address
    pub bind_address: Option<String>,
}

impl ConnectionSettings {
    fn has_discrete_fields(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.user.is_some()
            || self.password.is_some()
            || self.dbname.is_some()
    }
}

impl TryFrom<ConnectionSettings> for ConnectionConfig {
    type Error = Error;

    fn try_from(settings: ConnectionSettings) -> Result<Self> {
        let discrete = settings.has_discrete_fields();

        let mut config = match settings.dsn {
            Some(_) if discrete => {
                return Err(Error::Config(
                    "a DSN and discrete connection fields are mutually exclusive".into(),
                ))
            }
            Some(dsn) => ConnectionConfig::dsn(dsn),
            None if !discrete => {
                return Err(Error::Config(
                    "no connection target: provide a DSN or host, port, user, password and dbname"
                        .into(),
                ))
            }
            None => {
                let missing: Vec<&str> = [
                    ("host", settings.host.is_none()),
                    ("port", settings.port.is_none()),
                    ("user", settings.user.is_none()),
                    ("password", settings.password.is_none()),
                    ("dbname", settings.dbname.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();

                match (
                    settings.host,
                    settings.port,
                    settings.user,
                    settings.password,
                    settings.dbname,
                ) {
                    (Some(host), Some(port), Some(user), Some(password), Some(dbname)) => {
                        let port = match port {
                            SettingValue::Integer(n) => u16::try_from(n)
                                .ok()
                                .filter(|p| *p > 0)
                                .ok_or_else(|| {
                                    Error::Config(format!(
                                        "invalid port '{}': expected an integer between 1 and 65535",
                                        n
                                    ))
                                })?,
                            SettingValue::Text(s) => parse_port(&s)?,
                            SettingValue::Boolean(b) => {
                                return Err(Error::Config(format!("invalid port '{}'", b)))
                            }
                        };
                        ConnectionConfig::params(ConnectionParams::new(
                            host, port, user, password, dbname,
                        ))
                    }
                    _ => {
                        return Err(Error::Config(format!(
                            "incomplete connection fields, missing: {}",
                            missing.join(", ")
                        )))
                    }
                }
            }
        };

        if let Some(mode) = settings.sslmode {
            config.sslmode = Some(mode.parse()?);
        }
        for (key, value) in settings.options {
            config.options.insert(key, value.to_string());
        }
        if let Some(addr) = settings.bind_address {
            let addr = addr.trim().parse().map_err(|_| {
                Error::Config(format!("invalid bind_address '{}'", addr))
            })?;
            config.bind_address = Some(addr);
        }

        Ok(config)
    }
}
