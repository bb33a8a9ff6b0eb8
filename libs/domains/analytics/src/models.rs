//! Analytics domain models
//!
//! The canonical [`Event`] record is the single write shape of the
//! pipeline: every bus topic and every ingestion endpoint normalizes
//! into it before anything touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::error::AnalyticsError;

/// Interaction kinds tracked by the pipeline.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventType {
    View,
    Like,
    Favorite,
    Rate,
    Comment,
    Upload,
    ReadingStart,
    ReadingEnd,
    ProfileView,
}

/// What an event points at.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TargetType {
    Pdf,
    Comment,
    User,
}

impl Default for TargetType {
    fn default() -> Self {
        Self::Pdf
    }
}

/// Structured side-channel data carried by a subset of event kinds.
///
/// Untagged on the wire: producers send a flat object and the shape is
/// inferred from which keys are present. `Empty` must stay last so it
/// only matches when no richer variant does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum EventMeta {
    /// `upload` events carry the category the document was filed under.
    Upload { category: String },
    /// Comment-scoped events keep a back-reference to the owning document.
    CommentRef { pdf_id: Uuid },
    /// `profile_view` events record who was looking.
    ProfileView { viewer_id: Uuid },
    /// Everything else.
    Empty {},
}

impl Default for EventMeta {
    fn default() -> Self {
        Self::Empty {}
    }
}

impl EventMeta {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty {})
    }

    /// JSON text as persisted in the store's metadata column.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Canonical event record, the only shape ever written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Event {
    /// Interaction kind
    pub event_type: EventType,

    /// Acting user
    pub user_id: Uuid,

    /// Entity the interaction is about
    pub target_id: Uuid,

    /// Kind of the target entity
    pub target_type: TargetType,

    /// When the interaction happened (producer time, UTC)
    pub timestamp: DateTime<Utc>,

    /// Reading duration in seconds; zero for non-reading events
    #[serde(default)]
    pub duration: f64,

    /// Star rating 1-5; zero means "not a rating"
    #[serde(default)]
    pub rating: i32,

    /// Structured extra context
    #[serde(default)]
    pub meta: EventMeta,
}

impl Event {
    /// Minimal constructor; richer fields are set by the normalizer.
    pub fn new(event_type: EventType, user_id: Uuid, target_id: Uuid, target_type: TargetType) -> Self {
        Self {
            event_type,
            user_id,
            target_id,
            target_type,
            timestamp: Utc::now(),
            duration: 0.0,
            rating: 0,
            meta: EventMeta::default(),
        }
    }

    /// Store invariants that hold for every event regardless of origin.
    pub fn check_invariants(&self) -> Result<(), AnalyticsError> {
        if !(0..=5).contains(&self.rating) {
            return Err(AnalyticsError::Validation {
                message: format!("rating must be between 0 and 5, got {}", self.rating),
            });
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(AnalyticsError::Validation {
                message: format!("duration must be a non-negative number, got {}", self.duration),
            });
        }
        Ok(())
    }
}

/// DTO accepted by the custom and batch ingestion endpoints.
///
/// Producers may name the target explicitly (`targetId`) or through one
/// of the id fields the bus payloads use; resolution order is
/// `targetId`, `pdfId`, `commentId`, `profileUserId`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngestEvent {
    /// Interaction kind
    pub event_type: EventType,

    /// Explicit target
    #[serde(default)]
    pub target_id: Option<Uuid>,

    /// Explicit target kind; inferred from id fields when absent
    #[serde(default)]
    pub target_type: Option<TargetType>,

    #[serde(default)]
    pub pdf_id: Option<Uuid>,

    #[serde(default)]
    pub comment_id: Option<Uuid>,

    #[serde(default)]
    pub profile_user_id: Option<Uuid>,

    /// Producer timestamp; defaults to ingestion time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Reading duration in seconds
    #[serde(default)]
    #[validate(range(min = 0.0, message = "duration must be non-negative"))]
    pub duration: Option<f64>,

    /// Star rating
    #[serde(default)]
    #[validate(range(min = 1, max = 5, message = "rating must be between 1 and 5"))]
    pub rating: Option<i32>,

    /// Structured extra context
    #[serde(rename = "metadata", default)]
    pub meta: Option<EventMeta>,
}

impl IngestEvent {
    /// Resolve into a canonical [`Event`] on behalf of `user_id`.
    pub fn into_event(self, user_id: Uuid) -> Result<Event, AnalyticsError> {
        let target_id = self
            .target_id
            .or(self.pdf_id)
            .or(self.comment_id)
            .or(self.profile_user_id)
            .ok_or_else(|| AnalyticsError::Validation {
                message: "one of targetId, pdfId, commentId or profileUserId is required"
                    .to_string(),
            })?;

        let target_type = self.target_type.unwrap_or(if self.pdf_id.is_some() {
            TargetType::Pdf
        } else if self.comment_id.is_some() {
            TargetType::Comment
        } else if self.profile_user_id.is_some() {
            TargetType::User
        } else {
            TargetType::default()
        });

        let event = Event {
            event_type: self.event_type,
            user_id,
            target_id,
            target_type,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            duration: self.duration.unwrap_or(0.0),
            rating: self.rating.unwrap_or(0),
            meta: self.meta.unwrap_or_default(),
        };
        event.check_invariants()?;
        Ok(event)
    }
}

/// Closed set of query windows accepted by the analytics endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum Period {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
}

impl Period {
    pub const ALL: [Period; 5] = [
        Period::OneHour,
        Period::OneDay,
        Period::SevenDays,
        Period::ThirtyDays,
        Period::NinetyDays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneHour => "1h",
            Period::OneDay => "24h",
            Period::SevenDays => "7d",
            Period::ThirtyDays => "30d",
            Period::NinetyDays => "90d",
        }
    }

    /// SQL interval expression for `timestamp >= now() - <interval>`.
    pub fn interval_sql(&self) -> &'static str {
        match self {
            Period::OneHour => "INTERVAL 1 HOUR",
            Period::OneDay => "INTERVAL 24 HOUR",
            Period::SevenDays => "INTERVAL 7 DAY",
            Period::ThirtyDays => "INTERVAL 30 DAY",
            Period::NinetyDays => "INTERVAL 90 DAY",
        }
    }

    /// Parse a query-string value, rejecting anything outside the set.
    pub fn parse(value: &str) -> Result<Self, AnalyticsError> {
        Period::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == value)
            .ok_or_else(|| AnalyticsError::Validation {
                message: format!(
                    "invalid period '{value}', expected one of 1h, 24h, 7d, 30d, 90d"
                ),
            })
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_round_trips_through_strings() {
        assert_eq!(EventType::ReadingStart.to_string(), "reading_start");
        assert_eq!(
            "profile_view".parse::<EventType>().unwrap(),
            EventType::ProfileView
        );
    }

    #[test]
    fn test_meta_deserializes_by_shape() {
        let upload: EventMeta = serde_json::from_str(r#"{"category":"science"}"#).unwrap();
        assert_eq!(
            upload,
            EventMeta::Upload {
                category: "science".to_string()
            }
        );

        let comment: EventMeta =
            serde_json::from_str(r#"{"pdf_id":"0191d3a0-0000-7000-8000-000000000001"}"#).unwrap();
        assert!(matches!(comment, EventMeta::CommentRef { .. }));

        let empty: EventMeta = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_ingest_event_target_fallback_order() {
        let pdf = Uuid::now_v7();
        let comment = Uuid::now_v7();
        let raw = IngestEvent {
            event_type: EventType::Like,
            target_id: None,
            target_type: None,
            pdf_id: Some(pdf),
            comment_id: Some(comment),
            profile_user_id: None,
            timestamp: None,
            duration: None,
            rating: None,
            meta: None,
        };

        let event = raw.into_event(Uuid::now_v7()).unwrap();
        assert_eq!(event.target_id, pdf);
        assert_eq!(event.target_type, TargetType::Pdf);
    }

    #[test]
    fn test_ingest_event_without_any_target_is_rejected() {
        let raw = IngestEvent {
            event_type: EventType::View,
            target_id: None,
            target_type: None,
            pdf_id: None,
            comment_id: None,
            profile_user_id: None,
            timestamp: None,
            duration: None,
            rating: None,
            meta: None,
        };

        let err = raw.into_event(Uuid::now_v7()).unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { .. }));
    }

    #[test]
    fn test_invariants_reject_out_of_range_rating() {
        let mut event = Event::new(
            EventType::Rate,
            Uuid::now_v7(),
            Uuid::now_v7(),
            TargetType::Pdf,
        );
        event.rating = 6;
        assert!(event.check_invariants().is_err());

        event.rating = 5;
        assert!(event.check_invariants().is_ok());
    }

    #[test]
    fn test_period_parse_rejects_unknown_values() {
        assert_eq!(Period::parse("7d").unwrap(), Period::SevenDays);
        assert!(Period::parse("14d").is_err());
        assert!(Period::parse("").is_err());
    }
}
