use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};
use uuid::Uuid;

/// Configuration for the event bus (Redis Streams).
///
/// Each analytics topic is a stream; all consumers share one consumer group
/// so topic partitions are balanced across worker instances.
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Redis connection URL
    pub url: String,

    /// Consumer group shared by all analytics workers
    pub consumer_group: String,

    /// Unique consumer id within the group (auto-generated if not provided)
    pub consumer_id: String,

    /// Blocking read timeout in milliseconds
    pub block_timeout_ms: u64,

    /// Batch size for reading messages
    pub batch_size: usize,

    /// Maximum broker connection attempts at startup before failing fatally
    pub connect_retries: u32,

    /// Initial backoff between connection attempts in milliseconds
    /// (doubled per attempt, capped at `connect_backoff_max_ms`)
    pub connect_backoff_ms: u64,

    /// Upper bound on connection backoff in milliseconds
    pub connect_backoff_max_ms: u64,

    /// Grace period for in-flight messages on shutdown, in milliseconds
    pub shutdown_grace_ms: u64,
}

impl FromEnv for BusConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            url: env_or_default("REDIS_URL", "redis://127.0.0.1:6379"),
            consumer_group: env_or_default("BUS_CONSUMER_GROUP", "analytics-group"),
            consumer_id: env_or_default(
                "BUS_CONSUMER_ID",
                &format!("analytics-{}", Uuid::new_v4()),
            ),
            block_timeout_ms: env_parse_or("BUS_BLOCK_TIMEOUT_MS", 5_000)?,
            batch_size: env_parse_or("BUS_BATCH_SIZE", 10)?,
            connect_retries: env_parse_or("BUS_CONNECT_RETRIES", 5)?,
            connect_backoff_ms: env_parse_or("BUS_CONNECT_BACKOFF_MS", 100)?,
            connect_backoff_max_ms: env_parse_or("BUS_CONNECT_BACKOFF_MAX_MS", 30_000)?,
            shutdown_grace_ms: env_parse_or("BUS_SHUTDOWN_GRACE_MS", 10_000)?,
        })
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            consumer_group: "analytics-group".to_string(),
            consumer_id: format!("analytics-{}", Uuid::new_v4()),
            block_timeout_ms: 5_000,
            batch_size: 10,
            connect_retries: 5,
            connect_backoff_ms: 100,
            connect_backoff_max_ms: 30_000,
            shutdown_grace_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bus_config_defaults() {
        temp_env::with_vars(
            [
                ("REDIS_URL", None::<&str>),
                ("BUS_CONSUMER_GROUP", None),
                ("BUS_CONSUMER_ID", None),
            ],
            || {
                let config = BusConfig::from_env().unwrap();
                assert_eq!(config.url, "redis://127.0.0.1:6379");
                assert_eq!(config.consumer_group, "analytics-group");
                assert!(config.consumer_id.starts_with("analytics-"));
                assert_eq!(config.connect_retries, 5);
            },
        );
    }

    #[test]
    fn test_bus_config_overrides() {
        temp_env::with_vars(
            [
                ("BUS_CONSUMER_ID", Some("worker-1")),
                ("BUS_CONNECT_RETRIES", Some("3")),
                ("BUS_BLOCK_TIMEOUT_MS", Some("1000")),
            ],
            || {
                let config = BusConfig::from_env().unwrap();
                assert_eq!(config.consumer_id, "worker-1");
                assert_eq!(config.connect_retries, 3);
                assert_eq!(config.block_timeout_ms, 1000);
            },
        );
    }

    #[test]
    fn test_bus_config_invalid_batch_size() {
        temp_env::with_var("BUS_BATCH_SIZE", Some("many"), || {
            assert!(BusConfig::from_env().is_err());
        });
    }
}
