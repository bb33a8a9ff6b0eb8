//! Read-side query engine.
//!
//! All aggregation SQL lives here as pure builder functions so ranking,
//! windowing and tie-break rules can be asserted in unit tests without
//! a database. Identifier-typed inputs are always bound server-side via
//! `{name:Type}` placeholders; only closed-enum values (periods, the
//! database name) are interpolated into the SQL text.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::{EventType, Period};
use crate::store::ClickHouseStore;

/// Default leaderboard size; explicit limits are clamped to [1, 100].
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Minimum qualifying-event count for a document to trend.
pub const TRENDING_THRESHOLD: u32 = 5;

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

// ---------------------------------------------------------------------------
// Row and response shapes
// ---------------------------------------------------------------------------

/// One rollup line for a target, per event type.
#[derive(Debug, Clone, Deserialize)]
pub struct RollupRow {
    pub event_type: EventType,
    pub events: u64,
    pub avg_rating: Option<f64>,
    pub ratings: u64,
    pub avg_duration: Option<f64>,
}

/// Point stats for one document, folded from rollup rows.
#[derive(Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct PdfStats {
    pub views: u64,
    pub likes: u64,
    pub favorites: u64,
    pub reading_sessions: u64,
    pub avg_reading_duration: f64,
    pub total_ratings: u64,
    pub avg_rating: f64,
}

impl PdfStats {
    pub fn from_rows(rows: &[RollupRow]) -> Self {
        let mut stats = Self::default();
        for row in rows {
            match row.event_type {
                EventType::View => stats.views = row.events,
                EventType::Like => stats.likes = row.events,
                EventType::Favorite => stats.favorites = row.events,
                EventType::Rate => {
                    stats.total_ratings = row.ratings;
                    stats.avg_rating = row.avg_rating.unwrap_or(0.0);
                }
                EventType::ReadingEnd => {
                    stats.reading_sessions = row.events;
                    stats.avg_reading_duration = row.avg_duration.unwrap_or(0.0);
                }
                _ => {}
            }
        }
        stats
    }
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct RatingSummary {
    pub average_rating: Option<f64>,
    pub total_ratings: u64,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct CommentStats {
    pub total_comments: u64,
    pub total_likes: u64,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct UserPopularity {
    pub total_views: u64,
    pub unique_viewers: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadCountsRow {
    pub total_uploads: u64,
    pub total_views: u64,
}

#[derive(Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct UserUploads {
    pub total_uploads: u64,
    pub total_views: u64,
    pub avg_views_per_upload: f64,
}

impl UserUploads {
    pub fn from_row(row: UploadCountsRow) -> Self {
        let avg = if row.total_uploads == 0 {
            0.0
        } else {
            row.total_views as f64 / row.total_uploads as f64
        };
        Self {
            total_uploads: row.total_uploads,
            total_views: row.total_views,
            avg_views_per_upload: avg,
        }
    }
}

/// One per-event-type line of a user's own activity.
#[derive(Debug, Clone, Deserialize)]
pub struct ActivityRow {
    pub event_type: EventType,
    pub events: u64,
    pub total_duration: f64,
}

#[derive(Debug, Default, PartialEq, Serialize, ToSchema)]
pub struct PersonalStats {
    pub total_views: u64,
    pub total_likes: u64,
    pub total_favorites: u64,
    pub total_comments: u64,
    pub total_uploads: u64,
    pub reading_sessions: u64,
    pub total_reading_time: f64,
    pub avg_reading_duration: f64,
}

impl PersonalStats {
    pub fn from_rows(rows: &[ActivityRow]) -> Self {
        let mut stats = Self::default();
        for row in rows {
            match row.event_type {
                EventType::View => stats.total_views = row.events,
                EventType::Like => stats.total_likes = row.events,
                EventType::Favorite => stats.total_favorites = row.events,
                EventType::Comment => stats.total_comments = row.events,
                EventType::Upload => stats.total_uploads = row.events,
                EventType::ReadingEnd => {
                    stats.reading_sessions = row.events;
                    stats.total_reading_time = row.total_duration;
                    if row.events > 0 {
                        stats.avg_reading_duration = row.total_duration / row.events as f64;
                    }
                }
                _ => {}
            }
        }
        stats
    }
}

/// Leaderboard line for one user, ranked by their own engagement
/// events within the window.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TopUserRow {
    pub user_id: Uuid,
    pub views: u64,
    pub likes: u64,
    pub favorites: u64,
    pub total_engagement: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TopPdfRow {
    pub pdf_id: Uuid,
    pub views: u64,
    pub likes: u64,
    pub favorites: u64,
    pub avg_rating: Option<f64>,
    pub total_engagement: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TrendingPdfRow {
    pub pdf_id: Uuid,
    pub views: u64,
    pub likes: u64,
    pub engagement_score: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CategoryRow {
    pub category: String,
    pub uploads: u64,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct EventTypeCount {
    pub count: u64,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct PlatformSummary {
    pub daily_active_users: u64,
    pub total_events: u64,
    pub total_views: u64,
    pub total_likes: u64,
    pub total_uploads: u64,
    pub reading_sessions: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct TimelineBucket {
    /// Hour bucket in the store's text form, e.g. `2026-08-28 12:00:00`.
    pub bucket: String,
    pub events: u64,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ReadingPatternBucket {
    pub hour_of_day: u8,
    pub sessions: u64,
    pub avg_duration: Option<f64>,
}

// ---------------------------------------------------------------------------
// SQL builders
// ---------------------------------------------------------------------------

pub mod sql {
    use super::Period;

    pub fn pdf_stats(db: &str) -> String {
        format!(
            "SELECT event_type, \
             countMerge(events) AS events, \
             avgIfMerge(avg_rating) AS avg_rating, \
             countIfMerge(ratings) AS ratings, \
             avgMerge(avg_duration) AS avg_duration \
             FROM {db}.target_rollup \
             WHERE target_id = {{target_id:UUID}} \
             GROUP BY event_type"
        )
    }

    pub fn pdf_rating(db: &str) -> String {
        format!(
            "SELECT avg(toFloat64(rating)) AS average_rating, count() AS total_ratings \
             FROM {db}.events \
             WHERE event_type = 'rate' AND target_type = 'pdf' AND rating > 0 \
             AND target_id = {{target_id:UUID}}"
        )
    }

    pub fn pdf_comment_stats(db: &str) -> String {
        format!(
            "SELECT countIf(event_type = 'comment') AS total_comments, \
             countIf(event_type = 'like') AS total_likes \
             FROM {db}.events \
             WHERE target_type = 'comment' \
             AND JSONExtractString(metadata, 'pdf_id') = toString({{pdf_id:UUID}})"
        )
    }

    pub fn user_popularity(db: &str) -> String {
        format!(
            "SELECT count() AS total_views, uniqExact(user_id) AS unique_viewers \
             FROM {db}.events \
             WHERE event_type = 'profile_view' AND target_id = {{user_id:UUID}}"
        )
    }

    pub fn user_uploads(db: &str) -> String {
        format!(
            "SELECT \
             (SELECT uniqExact(target_id) FROM {db}.events \
              WHERE event_type = 'upload' AND user_id = {{user_id:UUID}}) AS total_uploads, \
             (SELECT count() FROM {db}.events \
              WHERE event_type = 'view' AND target_id IN \
              (SELECT DISTINCT target_id FROM {db}.events \
               WHERE event_type = 'upload' AND user_id = {{user_id:UUID}})) AS total_views"
        )
    }

    pub fn personal_stats(db: &str) -> String {
        format!(
            "SELECT event_type, count() AS events, sum(duration) AS total_duration \
             FROM {db}.events \
             WHERE user_id = {{user_id:UUID}} \
             GROUP BY event_type"
        )
    }

    pub fn top_users(db: &str, period: Period) -> String {
        format!(
            "SELECT user_id, \
             countIf(event_type = 'view') AS views, \
             countIf(event_type = 'like') AS likes, \
             countIf(event_type = 'favorite') AS favorites, \
             count() AS total_engagement \
             FROM {db}.events \
             WHERE event_type IN ('view', 'like', 'favorite') \
             AND timestamp >= now() - {interval} \
             GROUP BY user_id \
             ORDER BY total_engagement DESC, user_id ASC \
             LIMIT {{limit:UInt32}}",
            interval = period.interval_sql()
        )
    }

    pub fn top_pdfs(db: &str, period: Period) -> String {
        format!(
            "SELECT target_id AS pdf_id, \
             countIf(event_type = 'view') AS views, \
             countIf(event_type = 'like') AS likes, \
             countIf(event_type = 'favorite') AS favorites, \
             avgIf(toFloat64(rating), event_type = 'rate' AND rating > 0) AS avg_rating, \
             count() AS total_engagement \
             FROM {db}.events \
             WHERE target_type = 'pdf' \
             AND event_type IN ('view', 'like', 'favorite', 'rate') \
             AND timestamp >= now() - {interval} \
             GROUP BY target_id \
             ORDER BY total_engagement DESC, pdf_id ASC \
             LIMIT {{limit:UInt32}}",
            interval = period.interval_sql()
        )
    }

    pub fn trending_pdfs(db: &str) -> String {
        format!(
            "SELECT target_id AS pdf_id, \
             countIf(event_type = 'view') AS views, \
             countIf(event_type = 'like') AS likes, \
             count() AS engagement_score \
             FROM {db}.events \
             WHERE target_type = 'pdf' \
             AND timestamp >= now() - INTERVAL 24 HOUR \
             GROUP BY target_id \
             HAVING engagement_score > {threshold} \
             ORDER BY engagement_score DESC, pdf_id ASC \
             LIMIT {{limit:UInt32}}",
            threshold = super::TRENDING_THRESHOLD
        )
    }

    pub fn top_categories(db: &str, period: Period) -> String {
        format!(
            "SELECT JSONExtractString(metadata, 'category') AS category, \
             count() AS uploads \
             FROM {db}.events \
             WHERE event_type = 'upload' \
             AND timestamp >= now() - {interval} \
             GROUP BY category \
             ORDER BY uploads DESC, category ASC \
             LIMIT {{limit:UInt32}}",
            interval = period.interval_sql()
        )
    }

    pub fn event_type_count(db: &str, period: Period) -> String {
        format!(
            "SELECT count() AS count FROM {db}.events \
             WHERE event_type = {{event_type:String}} \
             AND timestamp >= now() - {interval}",
            interval = period.interval_sql()
        )
    }

    pub fn platform_summary(db: &str) -> String {
        format!(
            "SELECT uniqExact(user_id) AS daily_active_users, \
             count() AS total_events, \
             countIf(event_type = 'view') AS total_views, \
             countIf(event_type = 'like') AS total_likes, \
             countIf(event_type = 'upload') AS total_uploads, \
             countIf(event_type = 'reading_start') AS reading_sessions \
             FROM {db}.events \
             WHERE timestamp >= now() - INTERVAL 24 HOUR"
        )
    }

    pub fn engagement_timeline(db: &str, period: Period) -> String {
        format!(
            "SELECT toString(toStartOfHour(timestamp)) AS bucket, count() AS events \
             FROM {db}.events \
             WHERE timestamp >= now() - {interval} \
             GROUP BY bucket \
             ORDER BY bucket ASC",
            interval = period.interval_sql()
        )
    }

    pub fn reading_patterns(db: &str, period: Period) -> String {
        format!(
            "SELECT toHour(timestamp) AS hour_of_day, \
             count() AS sessions, \
             avg(duration) AS avg_duration \
             FROM {db}.events \
             WHERE event_type = 'reading_end' \
             AND timestamp >= now() - {interval} \
             GROUP BY hour_of_day \
             ORDER BY hour_of_day ASC",
            interval = period.interval_sql()
        )
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Read-side facade over the store. Never touches the live stream.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<ClickHouseStore>,
}

impl QueryEngine {
    pub fn new(store: Arc<ClickHouseStore>) -> Self {
        Self { store }
    }

    fn db(&self) -> &str {
        self.store.database()
    }

    /// Point stats for one document, served from the incremental rollup.
    #[instrument(skip(self))]
    pub async fn pdf_stats(&self, pdf_id: Uuid) -> Result<PdfStats, AnalyticsError> {
        let rows: Vec<RollupRow> = self
            .store
            .fetch_all(&sql::pdf_stats(self.db()), &[("target_id", pdf_id.to_string())])
            .await?;
        Ok(PdfStats::from_rows(&rows))
    }

    #[instrument(skip(self))]
    pub async fn pdf_rating(&self, pdf_id: Uuid) -> Result<RatingSummary, AnalyticsError> {
        let summary = self
            .store
            .fetch_one(&sql::pdf_rating(self.db()), &[("target_id", pdf_id.to_string())])
            .await?;
        Ok(summary.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn pdf_comment_stats(&self, pdf_id: Uuid) -> Result<CommentStats, AnalyticsError> {
        let stats = self
            .store
            .fetch_one(
                &sql::pdf_comment_stats(self.db()),
                &[("pdf_id", pdf_id.to_string())],
            )
            .await?;
        Ok(stats.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn user_popularity(&self, user_id: Uuid) -> Result<UserPopularity, AnalyticsError> {
        let popularity = self
            .store
            .fetch_one(
                &sql::user_popularity(self.db()),
                &[("user_id", user_id.to_string())],
            )
            .await?;
        Ok(popularity.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn user_uploads(&self, user_id: Uuid) -> Result<UserUploads, AnalyticsError> {
        let row: Option<UploadCountsRow> = self
            .store
            .fetch_one(
                &sql::user_uploads(self.db()),
                &[("user_id", user_id.to_string())],
            )
            .await?;
        Ok(UserUploads::from_row(row.unwrap_or_default()))
    }

    /// A user's own activity across all event kinds.
    #[instrument(skip(self))]
    pub async fn personal_stats(&self, user_id: Uuid) -> Result<PersonalStats, AnalyticsError> {
        let rows: Vec<ActivityRow> = self
            .store
            .fetch_all(
                &sql::personal_stats(self.db()),
                &[("user_id", user_id.to_string())],
            )
            .await?;
        Ok(PersonalStats::from_rows(&rows))
    }

    #[instrument(skip(self))]
    pub async fn top_users(
        &self,
        period: Period,
        limit: Option<u32>,
    ) -> Result<Vec<TopUserRow>, AnalyticsError> {
        let rows = self
            .store
            .fetch_all(
                &sql::top_users(self.db(), period),
                &[("limit", clamp_limit(limit).to_string())],
            )
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn top_pdfs(
        &self,
        period: Period,
        limit: Option<u32>,
    ) -> Result<Vec<TopPdfRow>, AnalyticsError> {
        let rows = self
            .store
            .fetch_all(
                &sql::top_pdfs(self.db(), period),
                &[("limit", clamp_limit(limit).to_string())],
            )
            .await?;
        Ok(rows)
    }

    /// Documents with more than [`TRENDING_THRESHOLD`] events in the
    /// last 24 hours, ranked by engagement.
    #[instrument(skip(self))]
    pub async fn trending_pdfs(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<TrendingPdfRow>, AnalyticsError> {
        let rows = self
            .store
            .fetch_all(
                &sql::trending_pdfs(self.db()),
                &[("limit", clamp_limit(limit).to_string())],
            )
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn top_categories(
        &self,
        period: Period,
        limit: Option<u32>,
    ) -> Result<Vec<CategoryRow>, AnalyticsError> {
        let rows = self
            .store
            .fetch_all(
                &sql::top_categories(self.db(), period),
                &[("limit", clamp_limit(limit).to_string())],
            )
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn event_type_count(
        &self,
        event_type: EventType,
        period: Period,
    ) -> Result<EventTypeCount, AnalyticsError> {
        let count = self
            .store
            .fetch_one(
                &sql::event_type_count(self.db(), period),
                &[("event_type", event_type.to_string())],
            )
            .await?;
        Ok(count.unwrap_or_default())
    }

    /// Platform-wide counters over the last 24 hours.
    #[instrument(skip(self))]
    pub async fn platform_summary(&self) -> Result<PlatformSummary, AnalyticsError> {
        let summary = self
            .store
            .fetch_one(&sql::platform_summary(self.db()), &[])
            .await?;
        Ok(summary.unwrap_or_default())
    }

    #[instrument(skip(self))]
    pub async fn engagement_timeline(
        &self,
        period: Period,
    ) -> Result<Vec<TimelineBucket>, AnalyticsError> {
        let rows = self
            .store
            .fetch_all(&sql::engagement_timeline(self.db(), period), &[])
            .await?;
        Ok(rows)
    }

    #[instrument(skip(self))]
    pub async fn reading_patterns(
        &self,
        period: Period,
    ) -> Result<Vec<ReadingPatternBucket>, AnalyticsError> {
        let rows = self
            .store
            .fetch_all(&sql::reading_patterns(self.db(), period), &[])
            .await?;
        Ok(rows)
    }
}
