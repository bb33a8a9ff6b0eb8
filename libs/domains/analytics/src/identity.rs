//! External identity service client.
//!
//! Token verification is fully delegated: we forward the caller's
//! bearer token to the identity service's whoami endpoint and trust
//! its answer. No session state, no local JWT parsing.

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use core_config::identity::IdentityConfig;

use crate::error::AnalyticsError;

/// Identity of an authenticated caller as reported by the identity
/// service.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub is_email_verified: bool,
}

#[derive(Clone)]
pub struct IdentityClient {
    client: reqwest::Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(config: &IdentityConfig) -> Result<Self, AnalyticsError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnalyticsError::Internal {
                message: format!("failed to build identity client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a bearer token to a user via the identity service.
    #[instrument(skip(self, token))]
    pub async fn whoami(&self, token: &str) -> Result<AuthUser, AnalyticsError> {
        let response = self
            .client
            .get(format!("{}/api/auth/user", self.base_url))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| AnalyticsError::IdentityUnavailable {
                detail: format!("identity request failed: {e}"),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AnalyticsError::Unauthorized {
                detail: "token rejected by identity service".to_string(),
            });
        }
        if !status.is_success() {
            warn!(status = %status, "identity service error");
            return Err(AnalyticsError::IdentityUnavailable {
                detail: format!("identity service returned {status}"),
            });
        }

        response
            .json()
            .await
            .map_err(|e| AnalyticsError::IdentityUnavailable {
                detail: format!("invalid identity response: {e}"),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_user_decodes_identity_response() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id":"0191d3a0-0000-7000-8000-000000000001","email":"reader@example.com","is_email_verified":true}"#,
        )
        .unwrap();
        assert_eq!(user.email, "reader@example.com");
        assert!(user.is_email_verified);
    }

    #[test]
    fn test_verified_flag_defaults_to_false() {
        let user: AuthUser = serde_json::from_str(
            r#"{"id":"0191d3a0-0000-7000-8000-000000000001","email":"reader@example.com"}"#,
        )
        .unwrap();
        assert!(!user.is_email_verified);
    }
}
