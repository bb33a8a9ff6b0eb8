//! Read-side analytics endpoints.
//!
//! Mostly public; only the personal-stats endpoint resolves the caller
//! through the identity service. All aggregation happens in the query
//! engine; handlers just parse parameters and shape responses.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tracing::instrument;
use utoipa::IntoParams;
use uuid::Uuid;

use domain_analytics::query::{
    CategoryRow, CommentStats, EventTypeCount, PdfStats, PersonalStats, PlatformSummary,
    RatingSummary, ReadingPatternBucket, TimelineBucket, TopPdfRow, TopUserRow, TrendingPdfRow,
    UserPopularity, UserUploads,
};
use domain_analytics::{AnalyticsError, EventType, Period};

use crate::auth::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pdf/{id}/stats", get(pdf_stats))
        .route("/pdf/{id}/rating", get(pdf_rating))
        .route("/pdf/{id}/comments", get(pdf_comment_stats))
        .route("/user/{id}/popularity", get(user_popularity))
        .route("/user/{id}/uploads", get(user_uploads))
        .route("/me/stats", get(personal_stats))
        .route("/top/users", get(top_users))
        .route("/top/pdfs", get(top_pdfs))
        .route("/top/categories", get(top_categories))
        .route("/trending/pdfs", get(trending_pdfs))
        .route("/events/{event_type}/count", get(event_type_count))
        .route("/summary", get(platform_summary))
        .route("/engagement/timeline", get(engagement_timeline))
        .route("/reading/patterns", get(reading_patterns))
}

/// Common `limit` / `period` query parameters for ranking endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RankingQuery {
    pub limit: Option<u32>,
    pub period: Option<String>,
}

/// Parse the period parameter against the closed enum, falling back to
/// the endpoint's default. Invalid values are a 400, never coerced.
fn period_or(raw: &Option<String>, default: Period) -> Result<Period, AnalyticsError> {
    match raw {
        Some(value) => Period::parse(value),
        None => Ok(default),
    }
}

#[utoipa::path(
    get,
    path = "/analytics/pdf/{id}/stats",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses((status = 200, description = "Point stats from the rollup", body = PdfStats)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn pdf_stats(
    State(state): State<AppState>,
    Path(pdf_id): Path<Uuid>,
) -> Result<Json<PdfStats>, AnalyticsError> {
    Ok(Json(state.query.pdf_stats(pdf_id).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/pdf/{id}/rating",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses((status = 200, description = "Rating summary", body = RatingSummary)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn pdf_rating(
    State(state): State<AppState>,
    Path(pdf_id): Path<Uuid>,
) -> Result<Json<RatingSummary>, AnalyticsError> {
    Ok(Json(state.query.pdf_rating(pdf_id).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/pdf/{id}/comments",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses((status = 200, description = "Comment stats", body = CommentStats)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn pdf_comment_stats(
    State(state): State<AppState>,
    Path(pdf_id): Path<Uuid>,
) -> Result<Json<CommentStats>, AnalyticsError> {
    Ok(Json(state.query.pdf_comment_stats(pdf_id).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/user/{id}/popularity",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Profile view counts", body = UserPopularity)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn user_popularity(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserPopularity>, AnalyticsError> {
    Ok(Json(state.query.user_popularity(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/user/{id}/uploads",
    params(("id" = Uuid, Path, description = "User ID")),
    responses((status = 200, description = "Upload stats", body = UserUploads)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn user_uploads(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserUploads>, AnalyticsError> {
    Ok(Json(state.query.user_uploads(user_id).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/me/stats",
    responses(
        (status = 200, description = "Caller's own activity", body = PersonalStats),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer" = [])),
    tag = "analytics"
)]
#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn personal_stats(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<PersonalStats>, AnalyticsError> {
    Ok(Json(state.query.personal_stats(user.0.id).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/top/users",
    params(RankingQuery),
    responses((status = 200, description = "Most active users", body = Vec<TopUserRow>)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn top_users(
    State(state): State<AppState>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<Vec<TopUserRow>>, AnalyticsError> {
    let period = period_or(&params.period, Period::SevenDays)?;
    Ok(Json(state.query.top_users(period, params.limit).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/top/pdfs",
    params(RankingQuery),
    responses((status = 200, description = "Most engaged documents", body = Vec<TopPdfRow>)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn top_pdfs(
    State(state): State<AppState>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<Vec<TopPdfRow>>, AnalyticsError> {
    let period = period_or(&params.period, Period::SevenDays)?;
    Ok(Json(state.query.top_pdfs(period, params.limit).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/top/categories",
    params(RankingQuery),
    responses((status = 200, description = "Upload counts per category", body = Vec<CategoryRow>)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn top_categories(
    State(state): State<AppState>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<Vec<CategoryRow>>, AnalyticsError> {
    let period = period_or(&params.period, Period::SevenDays)?;
    Ok(Json(state.query.top_categories(period, params.limit).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/trending/pdfs",
    params(RankingQuery),
    responses((status = 200, description = "Documents trending over the last 24h", body = Vec<TrendingPdfRow>)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn trending_pdfs(
    State(state): State<AppState>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<Vec<TrendingPdfRow>>, AnalyticsError> {
    Ok(Json(state.query.trending_pdfs(params.limit).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/events/{event_type}/count",
    params(
        ("event_type" = String, Path, description = "Canonical event type"),
        RankingQuery
    ),
    responses(
        (status = 200, description = "Event count in the window", body = EventTypeCount),
        (status = 400, description = "Unknown event type or period")
    ),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn event_type_count(
    State(state): State<AppState>,
    Path(event_type): Path<String>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<EventTypeCount>, AnalyticsError> {
    let event_type: EventType =
        event_type
            .parse()
            .map_err(|_| AnalyticsError::Validation {
                message: format!("unknown event type '{event_type}'"),
            })?;
    let period = period_or(&params.period, Period::OneDay)?;
    Ok(Json(state.query.event_type_count(event_type, period).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/summary",
    responses((status = 200, description = "Platform counters over the last 24h", body = PlatformSummary)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn platform_summary(
    State(state): State<AppState>,
) -> Result<Json<PlatformSummary>, AnalyticsError> {
    Ok(Json(state.query.platform_summary().await?))
}

#[utoipa::path(
    get,
    path = "/analytics/engagement/timeline",
    params(RankingQuery),
    responses((status = 200, description = "Hourly event counts", body = Vec<TimelineBucket>)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn engagement_timeline(
    State(state): State<AppState>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<Vec<TimelineBucket>>, AnalyticsError> {
    let period = period_or(&params.period, Period::OneDay)?;
    Ok(Json(state.query.engagement_timeline(period).await?))
}

#[utoipa::path(
    get,
    path = "/analytics/reading/patterns",
    params(RankingQuery),
    responses((status = 200, description = "Reading sessions by hour of day", body = Vec<ReadingPatternBucket>)),
    tag = "analytics"
)]
#[instrument(skip(state))]
pub async fn reading_patterns(
    State(state): State<AppState>,
    Query(params): Query<RankingQuery>,
) -> Result<Json<Vec<ReadingPatternBucket>>, AnalyticsError> {
    let period = period_or(&params.period, Period::SevenDays)?;
    Ok(Json(state.query.reading_patterns(period).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_defaults_per_endpoint() {
        assert_eq!(period_or(&None, Period::SevenDays).unwrap(), Period::SevenDays);
        assert_eq!(period_or(&None, Period::OneDay).unwrap(), Period::OneDay);
    }

    #[test]
    fn test_invalid_period_is_rejected_not_coerced() {
        let err = period_or(&Some("2w".to_string()), Period::OneDay).unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { .. }));
    }

    #[test]
    fn test_explicit_period_overrides_default() {
        assert_eq!(
            period_or(&Some("90d".to_string()), Period::OneDay).unwrap(),
            Period::NinetyDays
        );
    }
}
