use crate::{env_or_default, env_parse_or, ConfigError, FromEnv};

/// Configuration for the external identity service.
///
/// Bearer tokens are verified by calling the identity service's whoami
/// endpoint; no local session state is kept.
#[derive(Clone, Debug)]
pub struct IdentityConfig {
    /// Base URL of the identity service, e.g. "http://auth:3001"
    pub base_url: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl IdentityConfig {
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.timeout_ms)
    }
}

impl FromEnv for IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or_default("AUTH_SERVICE_URL", "http://auth:3001"),
            timeout_ms: env_parse_or("AUTH_TIMEOUT_MS", 5_000)?,
        })
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            base_url: "http://auth:3001".to_string(),
            timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_config_defaults() {
        temp_env::with_vars(
            [("AUTH_SERVICE_URL", None::<&str>), ("AUTH_TIMEOUT_MS", None)],
            || {
                let config = IdentityConfig::from_env().unwrap();
                assert_eq!(config.base_url, "http://auth:3001");
                assert_eq!(config.timeout_ms, 5_000);
            },
        );
    }

    #[test]
    fn test_identity_config_overrides() {
        temp_env::with_var("AUTH_SERVICE_URL", Some("http://identity:8000"), || {
            let config = IdentityConfig::from_env().unwrap();
            assert_eq!(config.base_url, "http://identity:8000");
        });
    }
}
