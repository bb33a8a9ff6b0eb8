pub mod analytics;
pub mod events;

use axum::routing::get;
use axum::{Json, Router};
use axum_helpers::health_router;

use crate::openapi::ApiDoc;
use crate::state::AppState;
use utoipa::OpenApi;

/// Assemble the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/events", events::router())
        .nest("/analytics", analytics::router())
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .with_state(state)
        .merge(health_router("analytics-api", env!("CARGO_PKG_VERSION")))
}
