//! Event ingestion endpoints.
//!
//! Every endpoint resolves the caller through the identity service,
//! builds a canonical event and hands it to the shared ingestion
//! pipeline. The HTTP path is a producer like any bus topic; nothing
//! here writes to the store directly.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use axum_helpers::ValidatedJson;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use domain_analytics::{
    AnalyticsError, BatchOutcome, Event, EventMeta, EventType, IngestEvent, TargetType,
};

use crate::auth::CurrentUser;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pdf/{id}/view", post(track_pdf_view))
        .route("/pdf/{id}/like", post(track_pdf_like))
        .route("/pdf/{id}/favorite", post(track_pdf_favorite))
        .route("/pdf/{id}/rating", post(track_pdf_rating))
        .route("/pdf/{id}/upload", post(track_pdf_upload))
        .route("/pdf/{id}/reading-start", post(track_reading_start))
        .route("/pdf/{id}/reading-end", post(track_reading_end))
        .route("/comment/{id}/posted", post(track_comment_posted))
        .route("/comment/{id}/like", post(track_comment_like))
        .route("/profile/{id}/view", post(track_profile_view))
        .route("/custom", post(track_custom))
        .route("/batch", post(track_batch))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrackResponse {
    pub success: bool,
    pub message: String,
}

fn tracked(message: &str) -> (StatusCode, Json<TrackResponse>) {
    (
        StatusCode::CREATED,
        Json(TrackResponse {
            success: true,
            message: message.to_string(),
        }),
    )
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RatingBody {
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ReadingEndBody {
    #[validate(range(min = 0.0, message = "duration must be non-negative"))]
    pub duration: f64,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UploadBody {
    #[validate(length(min = 1, max = 64, message = "category must be 1-64 characters"))]
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommentBody {
    pub pdf_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchBody {
    #[validate(length(min = 1, max = 100, message = "batch must contain 1-100 events"))]
    pub events: Vec<IngestEvent>,
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/view",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses(
        (status = 201, description = "View tracked", body = TrackResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 503, description = "Store unavailable")
    ),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn track_pdf_view(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let event = Event::new(EventType::View, user.0.id, pdf_id, TargetType::Pdf);
    state.pipeline.ingest(&event).await?;
    Ok(tracked("View tracked"))
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/like",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses((status = 201, description = "Like tracked", body = TrackResponse)),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn track_pdf_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let event = Event::new(EventType::Like, user.0.id, pdf_id, TargetType::Pdf);
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Like tracked"))
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/favorite",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses((status = 201, description = "Favorite tracked", body = TrackResponse)),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn track_pdf_favorite(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let event = Event::new(EventType::Favorite, user.0.id, pdf_id, TargetType::Pdf);
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Favorite tracked"))
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/rating",
    params(("id" = Uuid, Path, description = "PDF ID")),
    request_body = RatingBody,
    responses(
        (status = 201, description = "Rating tracked", body = TrackResponse),
        (status = 400, description = "Rating out of range")
    ),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id, rating = body.0.rating))]
pub async fn track_pdf_rating(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
    body: ValidatedJson<RatingBody>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let mut event = Event::new(EventType::Rate, user.0.id, pdf_id, TargetType::Pdf);
    event.rating = body.0.rating;
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Rating tracked"))
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/upload",
    params(("id" = Uuid, Path, description = "PDF ID")),
    request_body = UploadBody,
    responses((status = 201, description = "Upload tracked", body = TrackResponse)),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id))]
pub async fn track_pdf_upload(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
    body: ValidatedJson<UploadBody>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let mut event = Event::new(EventType::Upload, user.0.id, pdf_id, TargetType::Pdf);
    event.meta = EventMeta::Upload {
        category: body
            .0
            .category
            .unwrap_or_else(|| "uncategorized".to_string()),
    };
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Upload tracked"))
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/reading-start",
    params(("id" = Uuid, Path, description = "PDF ID")),
    responses((status = 201, description = "Reading session start tracked", body = TrackResponse)),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user), fields(user_id = %user.0.id))]
pub async fn track_reading_start(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let event = Event::new(EventType::ReadingStart, user.0.id, pdf_id, TargetType::Pdf);
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Reading session started"))
}

#[utoipa::path(
    post,
    path = "/events/pdf/{id}/reading-end",
    params(("id" = Uuid, Path, description = "PDF ID")),
    request_body = ReadingEndBody,
    responses(
        (status = 201, description = "Reading session tracked", body = TrackResponse),
        (status = 400, description = "Negative duration")
    ),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id, duration = body.0.duration))]
pub async fn track_reading_end(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(pdf_id): Path<Uuid>,
    body: ValidatedJson<ReadingEndBody>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let mut event = Event::new(EventType::ReadingEnd, user.0.id, pdf_id, TargetType::Pdf);
    event.duration = body.0.duration;
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Reading session tracked"))
}

#[utoipa::path(
    post,
    path = "/events/comment/{id}/posted",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = CommentBody,
    responses((status = 201, description = "Comment tracked", body = TrackResponse)),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id))]
pub async fn track_comment_posted(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(comment_id): Path<Uuid>,
    body: ValidatedJson<CommentBody>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let mut event = Event::new(EventType::Comment, user.0.id, comment_id, TargetType::Comment);
    if let Some(pdf_id) = body.0.pdf_id {
        event.meta = EventMeta::CommentRef { pdf_id };
    }
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Comment tracked"))
}

#[utoipa::path(
    post,
    path = "/events/comment/{id}/like",
    params(("id" = Uuid, Path, description = "Comment ID")),
    request_body = CommentBody,
    responses((status = 201, description = "Comment like tracked", body = TrackResponse)),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id))]
pub async fn track_comment_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(comment_id): Path<Uuid>,
    body: ValidatedJson<CommentBody>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let mut event = Event::new(EventType::Like, user.0.id, comment_id, TargetType::Comment);
    if let Some(pdf_id) = body.0.pdf_id {
        event.meta = EventMeta::CommentRef { pdf_id };
    }
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Comment like tracked"))
}

#[utoipa::path(
    post,
    path = "/events/profile/{id}/view",
    params(("id" = Uuid, Path, description = "Profile owner's user ID")),
    responses(
        (status = 201, description = "Profile view tracked", body = TrackResponse),
        (status = 200, description = "Self-view ignored", body = TrackResponse)
    ),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user), fields(viewer_id = %user.0.id))]
pub async fn track_profile_view(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(profile_user_id): Path<Uuid>,
) -> Result<impl IntoResponse, AnalyticsError> {
    // Looking at your own profile is not engagement; acknowledged but
    // never stored.
    if profile_user_id == user.0.id {
        info!("self profile view ignored");
        return Ok((
            StatusCode::OK,
            Json(TrackResponse {
                success: true,
                message: "Self-view ignored".to_string(),
            }),
        ));
    }

    let mut event = Event::new(
        EventType::ProfileView,
        user.0.id,
        profile_user_id,
        TargetType::User,
    );
    event.meta = EventMeta::ProfileView {
        viewer_id: user.0.id,
    };
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Profile view tracked"))
}

#[utoipa::path(
    post,
    path = "/events/custom",
    request_body = IngestEvent,
    responses(
        (status = 201, description = "Event tracked", body = TrackResponse),
        (status = 400, description = "Invalid event")
    ),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id))]
pub async fn track_custom(
    State(state): State<AppState>,
    user: CurrentUser,
    body: ValidatedJson<IngestEvent>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let event = body.0.into_event(user.0.id)?;
    state.pipeline.ingest(&event).await?;
    Ok(tracked("Event tracked"))
}

#[utoipa::path(
    post,
    path = "/events/batch",
    request_body = BatchBody,
    responses(
        (status = 207, description = "Per-item outcomes", body = BatchOutcome),
        (status = 400, description = "Batch empty or too large")
    ),
    security(("bearer" = [])),
    tag = "events"
)]
#[instrument(skip(state, user, body), fields(user_id = %user.0.id, count = body.0.events.len()))]
pub async fn track_batch(
    State(state): State<AppState>,
    user: CurrentUser,
    body: ValidatedJson<BatchBody>,
) -> Result<impl IntoResponse, AnalyticsError> {
    let outcome = state.pipeline.ingest_batch(user.0.id, body.0.events).await?;
    Ok((StatusCode::MULTI_STATUS, Json(outcome)))
}
