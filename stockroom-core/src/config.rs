//! Configuration - which backend to open, and where.
//!
//! TigerStyle: explicit defaults from `constants.rs`, bounded timeouts.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DB_KV_PATH_DEFAULT, DB_OPEN_TIMEOUT_MS_DEFAULT, DB_OPEN_TIMEOUT_MS_MAX, DB_SQL_PATH_DEFAULT,
    DB_TYPE_DEFAULT,
};

/// Environment variable naming the backend.
pub const ENV_DB_TYPE: &str = "STOCKROOM_DB_TYPE";
/// Environment variable with the SQLite file path.
pub const ENV_DB_SQL_PATH: &str = "STOCKROOM_DB_SQL_PATH";
/// Environment variable with the sled directory path.
pub const ENV_DB_KV_PATH: &str = "STOCKROOM_DB_KV_PATH";
/// Environment variable with the open timeout in milliseconds.
pub const ENV_DB_TIMEOUT_MS: &str = "STOCKROOM_DB_TIMEOUT_MS";

// =============================================================================
// Errors
// =============================================================================

/// Errors building a `StoreConfig`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Backend name is not one this crate implements
    #[error("unsupported database backend {0:?}")]
    UnsupportedBackend(String),

    /// Timeout is not a number of milliseconds in range
    #[error("invalid open timeout {value:?}: must be 1..={max} milliseconds")]
    InvalidTimeout {
        /// Rejected value
        value: String,
        /// Upper bound
        max: u64,
    },
}

// =============================================================================
// BackendKind
// =============================================================================

/// The two interchangeable backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Relational: SQLite via sqlx
    Sqlite,
    /// Embedded ordered KV: sled
    Sled,
}

impl BackendKind {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Sled => "sled",
        }
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sql" => Ok(Self::Sqlite),
            "sled" | "kv" => Ok(Self::Sled),
            _ => Err(ConfigError::UnsupportedBackend(s.to_string())),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// StoreConfig
// =============================================================================

/// Everything needed to open a `DatabaseHandle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Which backend to open
    pub backend: BackendKind,
    /// SQLite database file
    pub sql_path: PathBuf,
    /// sled database directory
    pub kv_path: PathBuf,
    /// Bound on opening the backend
    pub open_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sql_path: PathBuf::from(DB_SQL_PATH_DEFAULT),
            kv_path: PathBuf::from(DB_KV_PATH_DEFAULT),
            open_timeout: Duration::from_millis(DB_OPEN_TIMEOUT_MS_DEFAULT),
        }
    }
}

impl StoreConfig {
    /// Read `STOCKROOM_DB_*` from the process environment.
    ///
    /// Paths are taken verbatim; expanding `~` is the caller's job.
    ///
    /// # Errors
    /// `ConfigError` if the backend name or timeout is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Missing keys take defaults.
    ///
    /// # Errors
    /// `ConfigError` if the backend name or timeout is invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend: BackendKind = lookup(ENV_DB_TYPE)
            .unwrap_or_else(|| DB_TYPE_DEFAULT.to_string())
            .parse()?;
        let defaults = Self::default();

        let open_timeout = match lookup(ENV_DB_TIMEOUT_MS) {
            Some(raw) => parse_timeout_ms(&raw)?,
            None => defaults.open_timeout,
        };

        Ok(Self {
            backend,
            sql_path: lookup(ENV_DB_SQL_PATH).map_or(defaults.sql_path, PathBuf::from),
            kv_path: lookup(ENV_DB_KV_PATH).map_or(defaults.kv_path, PathBuf::from),
            open_timeout,
        })
    }

    /// Set the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Set the SQLite file path.
    #[must_use]
    pub fn with_sql_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.sql_path = path.into();
        self
    }

    /// Set the sled directory path.
    #[must_use]
    pub fn with_kv_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.kv_path = path.into();
        self
    }

    /// Set the open timeout.
    ///
    /// # Panics
    /// Panics if `timeout` is zero or above `DB_OPEN_TIMEOUT_MS_MAX`.
    #[must_use]
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        assert!(!timeout.is_zero(), "open timeout must be positive");
        assert!(
            timeout <= Duration::from_millis(DB_OPEN_TIMEOUT_MS_MAX),
            "open timeout {timeout:?} exceeds max {DB_OPEN_TIMEOUT_MS_MAX}ms"
        );
        self.open_timeout = timeout;
        self
    }
}

/// Parse a millisecond count within `1..=DB_OPEN_TIMEOUT_MS_MAX`.
///
/// # Errors
/// `ConfigError::InvalidTimeout` otherwise.
pub fn parse_timeout_ms(raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if (1..=DB_OPEN_TIMEOUT_MS_MAX).contains(&ms) => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidTimeout {
            value: raw.to_string(),
            max: DB_OPEN_TIMEOUT_MS_MAX,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_backend_kind_aliases() {
        assert_eq!("sqlite".parse::<BackendKind>(), Ok(BackendKind::Sqlite));
        assert_eq!("SQL".parse::<BackendKind>(), Ok(BackendKind::Sqlite));
        assert_eq!("sled".parse::<BackendKind>(), Ok(BackendKind::Sled));
        assert_eq!(" kv ".parse::<BackendKind>(), Ok(BackendKind::Sled));
        assert_eq!(
            "postgres".parse::<BackendKind>(),
            Err(ConfigError::UnsupportedBackend("postgres".to_string()))
        );
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.open_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_DB_TYPE, "kv"),
            (ENV_DB_KV_PATH, "/tmp/stock"),
            (ENV_DB_TIMEOUT_MS, "250"),
        ]))
        .unwrap();

        assert_eq!(config.backend, BackendKind::Sled);
        assert_eq!(config.kv_path, PathBuf::from("/tmp/stock"));
        assert_eq!(config.open_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_rejects_bad_timeout() {
        for raw in ["0", "-1", "soon", "600000"] {
            let result = StoreConfig::from_lookup(lookup(&[(ENV_DB_TIMEOUT_MS, raw)]));
            assert!(matches!(result, Err(ConfigError::InvalidTimeout { .. })), "{raw}");
        }
    }
}
