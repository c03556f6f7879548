//! Check connectivity to a PostgreSQL server
//!
//! ```text
//! pgconnect --dsn postgres://app@db.example.com/orders
//! pgconnect --secrets secrets.toml --sslmode verify-full
//! DATABASE_URL=... pgconnect -o connect_timeout=5
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use pgconnect::secrets::{EnvSecrets, TomlSecrets};
use pgconnect::{acquire_connection, ConnectionConfig, SslMode, StderrReporter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "pgconnect", version, about = "Open one PostgreSQL session and report the outcome")]
struct Cli {
    /// Connection string (URL or key=value form)
    #[arg(long, env = "PGCONNECT_DSN", conflicts_with = "secrets")]
    dsn: Option<String>,

    /// TOML secrets file holding DATABASE_URL or DB_* keys
    #[arg(long, value_name = "PATH")]
    secrets: Option<PathBuf>,

    /// Load a .env file before reading secrets from the environment
    #[arg(long)]
    dotenv: bool,

    /// Override the TLS mode
    #[arg(long, value_name = "MODE")]
    sslmode: Option<SslMode>,

    /// Local address to bind the client socket to
    #[arg(long, value_name = "ADDR")]
    bind_address: Option<IpAddr>,

    /// Connection option, e.g. `-o connect_timeout=5` (repeatable)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    options: Vec<(String, String)>,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<ConnectionConfig> {
    let mut config = if let Some(dsn) = &cli.dsn {
        ConnectionConfig::dsn(dsn.clone())
    } else if let Some(path) = &cli.secrets {
        let secrets = TomlSecrets::from_path(path)?;
        ConnectionConfig::from_secrets(&secrets)
            .with_context(|| format!("reading secrets from {}", path.display()))?
    } else {
        let secrets = if cli.dotenv {
            EnvSecrets::new().with_dotenv()
        } else {
            EnvSecrets::new()
        };
        ConnectionConfig::from_secrets(&secrets).context("reading secrets from the environment")?
    };

    if let Some(mode) = cli.sslmode {
        config = config.with_sslmode(mode);
    }
    if let Some(addr) = cli.bind_address {
        config = config.with_bind_address(addr);
    }
    for (key, value) in &cli.options {
        config = config.with_option(key.clone(), value.clone());
    }

    // Surface resolution errors before any socket is opened
    config.resolve().context("invalid connection configuration")?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = load_config(&cli)?;

    let Some(handle) = acquire_connection(&config, &StderrReporter).await? else {
        return Ok(false);
    };

    let row = handle
        .client()
        .query_one("SELECT current_user::text, current_database()::text, version()", &[])
        .await;
    match row {
        Ok(row) => {
            let user: String = row.get(0);
            let database: String = row.get(1);
            let version: String = row.get(2);
            println!(
                "connected to {} as {} (database {}, {})",
                handle.endpoint(),
                user,
                database,
                if handle.is_encrypted() { "TLS" } else { "plaintext" }
            );
            println!("{}", version);
        }
        Err(e) => {
            handle.close().await;
            bail!("connected to server but the check query failed: {}", e);
        }
    }

    handle.close().await;
    Ok(true)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "pgconnect=info".into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();
    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting pgconnect");

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
