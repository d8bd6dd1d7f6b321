//! Leaderboard configuration from environment variables

use std::env;
use std::time::Duration;

/// Configuration for the leaderboard engine
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct LeaderboardConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `.sql` schema files
    pub schema_dir: String,

    /// Use the in-memory cache (false selects the always-miss backend)
    pub cache_enabled: bool,

    /// Lifetime of a cached query result in seconds
    pub cache_ttl_secs: u64,

    /// Upper bound on cached query results
    pub cache_max_entries: u64,

    /// Total attempts per store operation (first try included)
    pub max_attempts: u32,

    /// First retry delay in milliseconds, doubled on every retry
    pub initial_backoff_ms: u64,

    /// Deadline for a single store call in milliseconds
    pub store_timeout_ms: u64,

    /// How long SQLite waits on a locked database in milliseconds
    pub busy_timeout_ms: u64,

    /// Stored-rank refresh interval in milliseconds (0 disables the task)
    pub rank_refresh_interval_ms: u64,

    /// Limit used when a top-N caller gives none
    pub default_top_limit: i64,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            db_path: "scoreflow.db".to_string(),
            schema_dir: "sql".to_string(),
            cache_enabled: true,
            cache_ttl_secs: 300,
            cache_max_entries: 10_000,
            max_attempts: 3,
            initial_backoff_ms: 100,
            store_timeout_ms: 5_000,
            busy_timeout_ms: 2_000,
            rank_refresh_interval_ms: 0,
            default_top_limit: 10,
        }
    }
}

impl LeaderboardConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `SCOREFLOW_DB_PATH` (default: scoreflow.db)
    /// - `SCOREFLOW_SCHEMA_DIR` (default: sql)
    /// - `CACHE_ENABLED` (default: true)
    /// - `CACHE_TTL_SECS` (default: 300)
    /// - `CACHE_MAX_ENTRIES` (default: 10000)
    /// - `SUBMIT_MAX_ATTEMPTS` (default: 3)
    /// - `RETRY_INITIAL_BACKOFF_MS` (default: 100)
    /// - `STORE_TIMEOUT_MS` (default: 5000)
    /// - `SQLITE_BUSY_TIMEOUT_MS` (default: 2000)
    /// - `RANK_REFRESH_INTERVAL_MS` (default: 0, disabled)
    /// - `DEFAULT_TOP_LIMIT` (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            db_path: env::var("SCOREFLOW_DB_PATH").unwrap_or(defaults.db_path),

            schema_dir: env::var("SCOREFLOW_SCHEMA_DIR").unwrap_or(defaults.schema_dir),

            cache_enabled: env::var("CACHE_ENABLED")
                .ok()
                .and_then(|s| s.to_lowercase().parse().ok())
                .unwrap_or(defaults.cache_enabled),

            cache_ttl_secs: parse_env("CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl_secs),

            cache_max_entries: parse_env("CACHE_MAX_ENTRIES").unwrap_or(defaults.cache_max_entries),

            max_attempts: parse_env("SUBMIT_MAX_ATTEMPTS").unwrap_or(defaults.max_attempts),

            initial_backoff_ms: parse_env("RETRY_INITIAL_BACKOFF_MS")
                .unwrap_or(defaults.initial_backoff_ms),

            store_timeout_ms: parse_env("STORE_TIMEOUT_MS").unwrap_or(defaults.store_timeout_ms),

            busy_timeout_ms: parse_env("SQLITE_BUSY_TIMEOUT_MS").unwrap_or(defaults.busy_timeout_ms),

            rank_refresh_interval_ms: parse_env("RANK_REFRESH_INTERVAL_MS")
                .unwrap_or(defaults.rank_refresh_interval_ms),

            default_top_limit: parse_env("DEFAULT_TOP_LIMIT").unwrap_or(defaults.default_top_limit),
        }
    }

    /// Same configuration pointed at another database file
    pub fn with_db_path(mut self, db_path: impl Into<String>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.is_empty() {
            return Err(ConfigError::InvalidValue("db_path cannot be empty".to_string()));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "SUBMIT_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        if self.cache_enabled && self.cache_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CACHE_TTL_SECS must be positive when caching is enabled".to_string(),
            ));
        }

        if self.store_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "STORE_TIMEOUT_MS must be positive".to_string(),
            ));
        }

        // A lock wait must give up before the call deadline does
        if self.busy_timeout_ms >= self.store_timeout_ms {
            return Err(ConfigError::InvalidValue(format!(
                "SQLITE_BUSY_TIMEOUT_MS ({}) must be below STORE_TIMEOUT_MS ({})",
                self.busy_timeout_ms, self.store_timeout_ms
            )));
        }

        if self.default_top_limit <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "DEFAULT_TOP_LIMIT must be positive, got {}",
                self.default_top_limit
            )));
        }

        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LeaderboardConfig::default();

        assert_eq!(config.db_path, "scoreflow.db");
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.default_top_limit, 10);
        assert!(config.cache_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_config() {
        // Test: Custom configuration from env vars
        env::set_var("SCOREFLOW_DB_PATH", "/tmp/scoreflow_test.db");
        env::set_var("CACHE_ENABLED", "FALSE");
        env::set_var("SUBMIT_MAX_ATTEMPTS", "5");
        env::set_var("RETRY_INITIAL_BACKOFF_MS", "not-a-number");

        let config = LeaderboardConfig::from_env();

        assert_eq!(config.db_path, "/tmp/scoreflow_test.db");
        assert!(!config.cache_enabled);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_backoff_ms, 100); // unparsable falls back

        // Cleanup
        env::remove_var("SCOREFLOW_DB_PATH");
        env::remove_var("CACHE_ENABLED");
        env::remove_var("SUBMIT_MAX_ATTEMPTS");
        env::remove_var("RETRY_INITIAL_BACKOFF_MS");
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = LeaderboardConfig {
            max_attempts: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LeaderboardConfig {
            cache_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LeaderboardConfig {
            cache_enabled: false,
            cache_ttl_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_busy_timeout_at_or_above_deadline() {
        let config = LeaderboardConfig {
            busy_timeout_ms: 10_000,
            store_timeout_ms: 100,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("SQLITE_BUSY_TIMEOUT_MS"));

        let config = LeaderboardConfig {
            busy_timeout_ms: 5_000,
            store_timeout_ms: 5_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = LeaderboardConfig {
            busy_timeout_ms: 50,
            store_timeout_ms: 100,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
