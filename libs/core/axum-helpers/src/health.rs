//! Liveness and readiness endpoints for Kubernetes probes.

use axum::{Json, Router, routing::get};
use serde::Serialize;
use utoipa::ToSchema;

/// Health check response
#[derive(Serialize, ToSchema, Clone)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: String,
}

/// Router exposing `/health` and `/healthz` liveness endpoints.
pub fn health_router(service: &str, version: &str) -> Router {
    let response = HealthResponse {
        status: "ok",
        service: service.to_string(),
        version: version.to_string(),
    };

    let handler = move || {
        let response = response.clone();
        async move { Json(response) }
    };

    Router::new()
        .route("/health", get(handler.clone()))
        .route("/healthz", get(handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_router_builds() {
        let _router = health_router("analytics-api", "0.1.0");
    }
}
