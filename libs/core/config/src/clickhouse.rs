use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};

/// Configuration for the ClickHouse analytical store (HTTP interface).
#[derive(Clone, Debug)]
pub struct ClickHouseConfig {
    /// Base URL of the ClickHouse HTTP endpoint, e.g. "http://clickhouse:8123"
    pub url: String,

    /// Database holding the events table and rollup view
    pub database: String,

    pub username: String,
    pub password: String,

    /// Per-request timeout in milliseconds. A slow or unavailable store fails
    /// the individual request instead of wedging the caller.
    pub timeout_ms: u64,
}

impl ClickHouseConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl FromEnv for ClickHouseConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("CLICKHOUSE_URL", "http://127.0.0.1:8123"),
            database: env_or_default("CLICKHOUSE_DATABASE", "analytics"),
            username: env_or_default("CLICKHOUSE_USERNAME", "default"),
            password: env_or_default("CLICKHOUSE_PASSWORD", ""),
            timeout_ms: env_parse_or("CLICKHOUSE_TIMEOUT_MS", 5_000)?,
        })
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8123".to_string(),
            database: "analytics".to_string(),
            username: "default".to_string(),
            password: String::new(),
            timeout_ms: 5_000,
        }
    }
}
