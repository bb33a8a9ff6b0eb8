//! Bearer-token extractor backed by the external identity service.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use domain_analytics::AuthUser;

use crate::state::AppState;

/// Authenticated caller. Extraction forwards the bearer token to the
/// identity service; there is no local token parsing.
pub struct CurrentUser(pub AuthUser);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized("missing bearer token".to_string()).into_response()
            })?;

        let user = state
            .identity
            .whoami(token)
            .await
            .map_err(|err| err.into_response())?;

        Ok(CurrentUser(user))
    }
}
