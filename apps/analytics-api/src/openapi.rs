//! OpenAPI document for the analytics API.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::routes::{analytics, events};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Analytics API",
        description = "Event ingestion and analytics query endpoints"
    ),
    paths(
        events::track_pdf_view,
        events::track_pdf_like,
        events::track_pdf_favorite,
        events::track_pdf_rating,
        events::track_pdf_upload,
        events::track_reading_start,
        events::track_reading_end,
        events::track_comment_posted,
        events::track_comment_like,
        events::track_profile_view,
        events::track_custom,
        events::track_batch,
        analytics::pdf_stats,
        analytics::pdf_rating,
        analytics::pdf_comment_stats,
        analytics::user_popularity,
        analytics::user_uploads,
        analytics::personal_stats,
        analytics::top_users,
        analytics::top_pdfs,
        analytics::top_categories,
        analytics::trending_pdfs,
        analytics::event_type_count,
        analytics::platform_summary,
        analytics::engagement_timeline,
        analytics::reading_patterns,
    ),
    tags(
        (name = "events", description = "Event ingestion"),
        (name = "analytics", description = "Aggregated analytics queries")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_default();
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_builds() {
        let doc = ApiDoc::openapi();
        let json = serde_json::to_string(&doc).unwrap();
        assert!(json.contains("/events/batch"));
        assert!(json.contains("/analytics/trending/pdfs"));
    }
}
