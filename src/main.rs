//! Stockroom Admin - bootstrap and maintenance for a Stockroom store.
//!
//! Opens whichever backend is configured and runs one command against it:
//! - `migrate`: bring the schema up to date
//! - `seed`: insert the fixed development data set
//! - `useradd`: create an administrator account
//! - `status`: round-trip the store

use anyhow::Context;
use clap::{Parser, Subcommand};
use stockroom_core::config::parse_timeout_ms;
use stockroom_core::{schema, BackendKind, DatabaseHandle, NewUser, Role, StoreConfig};

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "stockroom";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Display name given to accounts created by `useradd` without `--name`
pub const USERADD_NAME_DEFAULT: &str = "Administrator";

// =============================================================================
// CLI
// =============================================================================

/// Stockroom Admin - bootstrap and maintenance
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Migrate, seed and administer a Stockroom store")]
#[command(version)]
struct Cli {
    /// Backend: sqlite (sql) or sled (kv). Overrides STOCKROOM_DB_TYPE
    #[arg(long)]
    db_type: Option<String>,

    /// SQLite database file. Overrides STOCKROOM_DB_SQL_PATH
    #[arg(long)]
    sql_path: Option<String>,

    /// sled database directory. Overrides STOCKROOM_DB_KV_PATH
    #[arg(long)]
    kv_path: Option<String>,

    /// Bound on opening the store, in milliseconds. Overrides STOCKROOM_DB_TIMEOUT_MS
    #[arg(long)]
    timeout_ms: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create or update the schema
    Migrate,
    /// Insert seed data that is not already present
    Seed,
    /// Create a user holding the admin and user roles
    Useradd {
        /// Email address to log in with
        email: String,
        /// Password to log in with
        password: String,
        /// Display name
        #[arg(long, default_value = USERADD_NAME_DEFAULT)]
        name: String,
    },
    /// Check that the store answers
    Status,
}

impl Cli {
    /// Environment first, then flags; `~` expanded in paths.
    fn store_config(&self) -> anyhow::Result<StoreConfig> {
        let mut config = StoreConfig::from_env().context("reading STOCKROOM_DB_* environment")?;

        if let Some(raw) = &self.db_type {
            config = config.with_backend(raw.parse::<BackendKind>()?);
        }
        if let Some(path) = &self.sql_path {
            config = config.with_sql_path(path.as_str());
        }
        if let Some(path) = &self.kv_path {
            config = config.with_kv_path(path.as_str());
        }
        if let Some(raw) = &self.timeout_ms {
            config = config.with_open_timeout(parse_timeout_ms(raw)?);
        }

        config.sql_path = expand(&config.sql_path.to_string_lossy()).into();
        config.kv_path = expand(&config.kv_path.to_string_lossy()).into();
        Ok(config)
    }
}

fn expand(path: &str) -> String {
    shellexpand::tilde(path).to_string()
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info,sqlx=warn",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::info!("Stockroom Admin v{}", APP_VERSION);

    let config = cli.store_config()?;
    let path = match config.backend {
        BackendKind::Sqlite => &config.sql_path,
        BackendKind::Sled => &config.kv_path,
    };
    tracing::info!(backend = %config.backend, path = %path.display(), "opening store");

    let handle = DatabaseHandle::open(&config)
        .await
        .with_context(|| format!("opening {} store", config.backend))?;

    let result = run(&handle, cli.command).await;
    handle.close().await.context("closing store")?;
    result
}

async fn run(handle: &DatabaseHandle, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Migrate => {
            schema::migrate(handle).await?;
            println!("Migrations complete");
        }
        Command::Seed => {
            schema::seed(handle).await?;
            println!("Seed data complete");
        }
        Command::Useradd {
            email,
            password,
            name,
        } => {
            let new = NewUser {
                name,
                email,
                roles: vec![Role::Admin, Role::User],
                password: password.clone(),
                password_confirm: password,
            };
            let user = handle
                .storage()
                .create_user(&new, chrono::Utc::now())
                .await
                .context("creating user")?;
            println!("User created with id: {}", user.id);
        }
        Command::Status => {
            handle.storage().status_check().await?;
            println!("{} store is available", handle.kind());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cli_parses_useradd() {
        let cli = Cli::try_parse_from([
            APP_NAME,
            "--db-type",
            "kv",
            "-vv",
            "useradd",
            "admin@example.com",
            "gophers",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Useradd { email, name, .. } => {
                assert_eq!(email, "admin@example.com");
                assert_eq!(name, USERADD_NAME_DEFAULT);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            APP_NAME,
            "--db-type",
            "sled",
            "--kv-path",
            "/tmp/stockroom-kv",
            "--timeout-ms",
            "250",
            "status",
        ])
        .unwrap();

        let config = cli.store_config().unwrap();
        assert_eq!(config.backend, BackendKind::Sled);
        assert_eq!(config.kv_path, std::path::PathBuf::from("/tmp/stockroom-kv"));
        assert_eq!(config.open_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let cli = Cli::try_parse_from([APP_NAME, "--db-type", "postgres", "migrate"]).unwrap();
        let err = cli.store_config().unwrap_err();
        assert!(err.to_string().contains("unsupported"), "{err}");
    }

    #[test]
    fn test_expand_home() {
        let expanded = expand("~/stockroom");
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with("stockroom"));
    }
}
