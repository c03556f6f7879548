//! Connection string parsing
//!
//! Supports formats:
//! * postgres://[user[:password]@][host][:port][/database][?param=value&...]
//! * postgres:///database (Unix socket, local)
//! * postgres:///database?host=/path/to/socket (Unix socket, custom directory)
//! * host=localhost port=5432 user=app password='se cret' dbname=app (libpq key/value)

use super::options::ConnectionOptions;
use super::{parse_port, ConnectionParams, DEFAULT_PORT};
use crate::connection::{SslMode, TlsConfig};
use crate::{Error, Result};
use percent_encoding::percent_decode_str;
use std::iter::Peekable;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::Chars;
use url::{Host, Url};

/// Fully resolved connection parameters
#[derive(Clone)]
pub struct ConnectionInfo {
    /// Transport type
    pub transport: TransportType,
    /// Host (for TCP)
    pub host: Option<String>,
    /// Port (TCP port, or the suffix of the Unix socket file)
    pub port: u16,
    /// Unix socket path
    pub unix_socket: Option<PathBuf>,
    /// Database name
    pub database: String,
    /// Username
    pub user: String,
    /// Password
    pub password: Option<String>,
    /// SSL/TLS mode
    pub sslmode: SslMode,
    /// Path to custom CA certificate (from sslrootcert param)
    pub sslrootcert: Option<String>,
    /// Path to client certificate (from sslcert param, for mTLS)
    pub sslcert: Option<String>,
    /// Path to client private key (from sslkey param, for mTLS)
    pub sslkey: Option<String>,
    /// Driver tuning
    pub options: ConnectionOptions,
    /// Local address to bind outbound TCP sockets to
    pub bind_address: Option<IpAddr>,
}

impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("transport", &self.transport)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("unix_socket", &self.unix_socket)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("sslmode", &self.sslmode)
            .field("sslrootcert", &self.sslrootcert)
            .field("sslcert", &self.sslcert)
            .field("sslkey", &self.sslkey)
            .field("options", &self.options)
            .field("bind_address", &self.bind_address)
            .finish()
    }
}

/// Transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportType {
    /// TCP socket
    Tcp,
    /// Unix domain socket
    Unix,
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<String> {
    // Try standard locations in order (Linux convention)
    for dir in &["/run/postgresql", "/var/run/postgresql", "/tmp"] {
        if Path::new(dir).is_dir() {
            return Some(dir.to_string());
        }
    }
    None
}

/// Construct the full Unix socket path
fn construct_socket_path(socket_dir: &str, port: u16) -> PathBuf {
    PathBuf::from(format!("{}/.s.PGSQL.{}", socket_dir, port))
}

fn decode(component: &str, what: &str) -> Result<String> {
    percent_decode_str(component)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Error::Config(format!("{} is not valid UTF-8 once decoded", what)))
}

/// Fields collected while parsing, before defaults are applied
#[derive(Default)]
struct Pending {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    database: Option<String>,
    sslmode: Option<SslMode>,
    sslrootcert: Option<String>,
    sslcert: Option<String>,
    sslkey: Option<String>,
    options: ConnectionOptions,
}

impl Pending {
    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "host" => self.host = Some(value.to_string()),
            "port" => self.port = Some(parse_port(value)?),
            "user" => self.user = Some(value.to_string()),
            "password" => self.password = Some(value.to_string()),
            "dbname" => self.database = Some(value.to_string()),
            "sslmode" => self.sslmode = Some(value.parse()?),
            "sslrootcert" => self.sslrootcert = Some(value.to_string()),
            "sslcert" => self.sslcert = Some(value.to_string()),
            "sslkey" => self.sslkey = Some(value.to_string()),
            _ => self.options.set(key, value)?,
        }
        Ok(())
    }

    fn finish(self) -> Result<ConnectionInfo> {
        let port = self.port.unwrap_or(DEFAULT_PORT);
        if port == 0 {
            return Err(Error::Config("invalid port: 0".into()));
        }

        let user = self
            .user
            .filter(|u| !u.is_empty())
            .unwrap_or_else(whoami::username);
        let database = self
            .database
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| user.clone());

        let (transport, host, unix_socket) = match self.host.filter(|h| !h.is_empty()) {
            Some(dir) if dir.starts_with('/') => (
                TransportType::Unix,
                None,
                Some(construct_socket_path(&dir, port)),
            ),
            Some(host) => (TransportType::Tcp, Some(host), None),
            None => {
                let dir = resolve_default_socket_dir().ok_or_else(|| {
                    Error::Config(
                        "could not locate Unix socket directory. Set host explicitly.".into(),
                    )
                })?;
                (
                    TransportType::Unix,
                    None,
                    Some(construct_socket_path(&dir, port)),
                )
            }
        };

        // TLS is never negotiated over a local socket
        let sslmode = match transport {
            TransportType::Unix => SslMode::Disable,
            TransportType::Tcp => self.sslmode.unwrap_or_default(),
        };

        Ok(ConnectionInfo {
            transport,
            host,
            port,
            unix_socket,
            database,
            user,
            password: self.password,
            sslmode,
            sslrootcert: self.sslrootcert,
            sslcert: self.sslcert,
            sslkey: self.sslkey,
            options: self.options,
            bind_address: None,
        })
    }
}

impl ConnectionInfo {
    /// Parse connection string (URL or key/value form)
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            return Self::parse_url(s);
        }
        if s.contains('=') {
            return Self::parse_key_value(s);
        }
        Err(Error::Config(
            "connection string must be a postgres:// URL or key=value pairs".into(),
        ))
    }

    fn parse_url(s: &str) -> Result<Self> {
        let url = Url::parse(s)
            .map_err(|e| Error::Config(format!("invalid connection URL: {}", e)))?;

        let mut pending = Pending::default();
        match url.host() {
            Some(Host::Domain(host)) if !host.is_empty() => {
                pending.host = Some(decode(host, "host")?);
            }
            Some(Host::Ipv4(addr)) => pending.host = Some(addr.to_string()),
            Some(Host::Ipv6(addr)) => pending.host = Some(addr.to_string()),
            _ => {}
        }
        pending.port = url.port();

        if !url.username().is_empty() {
            pending.user = Some(decode(url.username(), "user")?);
        }
        if let Some(password) = url.password() {
            pending.password = Some(decode(password, "password")?);
        }

        let path = url.path().trim_start_matches('/');
        if !path.is_empty() {
            pending.database = Some(decode(path, "database")?);
        }

        // Query parameters may override host/port (Unix socket directory, etc.)
        for (key, value) in url.query_pairs() {
            pending.apply(&key, &value)?;
        }

        pending.finish()
    }

    fn parse_key_value(s: &str) -> Result<Self> {
        let mut pending = Pending::default();
        let mut chars = s.chars().peekable();

        loop {
            skip_whitespace(&mut chars);
            if chars.peek().is_none() {
                break;
            }

            let mut key = String::new();
            while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
                key.push(c);
            }
            skip_whitespace(&mut chars);
            if chars.next() != Some('=') {
                return Err(Error::Config(format!(
                    "missing '=' after '{}' in connection string",
                    key
                )));
            }
            skip_whitespace(&mut chars);

            let value = read_value(&mut chars)?;
            pending.apply(&key, &value)?;
        }

        pending.finish()
    }

    /// Resolve discrete connection fields
    pub fn from_params(params: &ConnectionParams) -> Result<Self> {
        if params.host.trim().is_empty() {
            return Err(Error::Config("host must not be empty".into()));
        }
        if params.user.is_empty() {
            return Err(Error::Config("user must not be empty".into()));
        }
        if params.dbname.is_empty() {
            return Err(Error::Config("dbname must not be empty".into()));
        }

        let pending = Pending {
            host: Some(params.host.clone()),
            port: Some(params.port),
            user: Some(params.user.clone()),
            password: Some(params.password.clone()),
            database: Some(params.dbname.clone()),
            ..Pending::default()
        };
        pending.finish()
    }

    /// Apply a tuning or TLS file option on top of the parsed parameters
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "sslrootcert" => self.sslrootcert = Some(value.to_string()),
            "sslcert" => self.sslcert = Some(value.to_string()),
            "sslkey" => self.sslkey = Some(value.to_string()),
            _ => self.options.set(key, value)?,
        }
        Ok(())
    }

    /// Human-readable endpoint, never containing credentials
    pub fn endpoint(&self) -> String {
        match (&self.transport, &self.host, &self.unix_socket) {
            (TransportType::Tcp, Some(host), _) if host.contains(':') => {
                format!("[{}]:{}", host, self.port)
            }
            (TransportType::Tcp, Some(host), _) => format!("{}:{}", host, self.port),
            (TransportType::Unix, _, Some(path)) => path.display().to_string(),
            _ => "<unknown>".to_string(),
        }
    }

    /// Build a `TlsConfig` from parsed connection parameters.
    ///
    /// Returns `None` if `sslmode` is `Disable`.
    /// Returns `Some(TlsConfig)` for all other modes.
    pub fn to_tls_config(&self) -> Result<Option<TlsConfig>> {
        if self.sslmode == SslMode::Disable {
            return Ok(None);
        }

        // libpq: a root certificate turns `require` into `verify-ca`
        let mode = match (self.sslmode, &self.sslrootcert) {
            (SslMode::Require, Some(_)) => SslMode::VerifyCa,
            (mode, _) => mode,
        };

        let mut builder = TlsConfig::builder().sslmode(mode);

        if let Some(ref ca_path) = self.sslrootcert {
            builder = builder.ca_cert_path(ca_path);
        }

        match (&self.sslcert, &self.sslkey) {
            (Some(cert), Some(key)) => {
                builder = builder.client_cert_path(cert).client_key_path(key);
            }
            (None, None) => {}
            _ => {
                return Err(Error::Config(
                    "sslcert and sslkey must be given together".into(),
                ))
            }
        }

        Ok(Some(builder.build()?))
    }

    /// Convert to the driver's startup configuration
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        use tokio_postgres::config::SslMode as PgSslMode;

        let mut config = tokio_postgres::Config::new();
        config.user(&self.user).dbname(&self.database);
        if let Some(ref password) = self.password {
            config.password(password);
        }
        if let Some(ref name) = self.options.application_name {
            config.application_name(name);
        }
        if let Some(options) = self.options.server_options() {
            config.options(&options);
        }
        // Certificate checks live in our rustls config; the driver only
        // needs to know whether to send SSLRequest and insist on `S`.
        config.ssl_mode(match self.sslmode {
            SslMode::Disable => PgSslMode::Disable,
            _ => PgSslMode::Require,
        });
        config
    }
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn read_value(chars: &mut Peekable<Chars<'_>>) -> Result<String> {
    let mut value = String::new();

    if chars.next_if_eq(&'\'').is_some() {
        loop {
            match chars.next() {
                Some('\\') => match chars.next() {
                    Some(c) => value.push(c),
                    None => break,
                },
                Some('\'') => return Ok(value),
                Some(c) => value.push(c),
                None => break,
            }
        }
        return Err(Error::Config(
            "unterminated quoted value in connection string".into(),
        ));
    }

    while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                value.push(escaped);
            }
        } else {
            value.push(c);
        }
    }
    Ok(value)
}
