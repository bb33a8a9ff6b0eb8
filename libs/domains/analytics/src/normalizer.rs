//! Topic payload normalization.
//!
//! Every bus topic carries its own payload shape; this module is the
//! single place that knows how each of them maps onto the canonical
//! [`Event`]. The mapping is pure so it can be tested without a broker
//! or a store in sight.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::{Event, EventMeta, EventType, TargetType};

/// Bus topics the consumer subscribes to. One stream per topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum Topic {
    PdfViewed,
    PdfLiked,
    PdfFavorited,
    PdfRated,
    PdfUploaded,
    CommentPosted,
    CommentLiked,
    ReadingStarted,
    ReadingEnded,
    ProfileViewed,
}

impl Topic {
    pub const ALL: [Topic; 10] = [
        Topic::PdfViewed,
        Topic::PdfLiked,
        Topic::PdfFavorited,
        Topic::PdfRated,
        Topic::PdfUploaded,
        Topic::CommentPosted,
        Topic::CommentLiked,
        Topic::ReadingStarted,
        Topic::ReadingEnded,
        Topic::ProfileViewed,
    ];

    /// Stream key on the bus, e.g. `pdf_viewed`.
    pub fn stream_name(&self) -> String {
        self.to_string()
    }
}

/// Superset of all fields the topic payloads may carry. Each topic
/// requires its own subset; the rest stay `None`. Bus payloads use
/// snake_case field names on the wire, unlike the camelCase HTTP DTOs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopicPayload {
    pub user_id: Option<Uuid>,
    pub pdf_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub profile_user_id: Option<Uuid>,
    pub viewer_id: Option<Uuid>,
    pub duration: Option<f64>,
    pub rating: Option<i32>,
    pub category: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Parse a stream key into a known [`Topic`].
pub fn parse_topic(name: &str) -> Result<Topic, AnalyticsError> {
    name.parse().map_err(|_| AnalyticsError::UnknownSource {
        topic: name.to_string(),
    })
}

/// Decode and normalize one raw bus message into a canonical event.
pub fn normalize_message(topic_name: &str, raw: &str) -> Result<Event, AnalyticsError> {
    let topic = parse_topic(topic_name)?;
    let payload: TopicPayload = serde_json::from_str(raw)?;
    normalize(topic, payload)
}

/// Map a decoded topic payload onto the canonical event shape.
pub fn normalize(topic: Topic, payload: TopicPayload) -> Result<Event, AnalyticsError> {
    let user_id = payload.user_id.ok_or_else(|| missing(topic, "user_id"))?;
    let timestamp = payload.timestamp.unwrap_or_else(Utc::now);

    let mut event = match topic {
        Topic::PdfViewed => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            Event::new(EventType::View, user_id, pdf_id, TargetType::Pdf)
        }
        Topic::PdfLiked => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            Event::new(EventType::Like, user_id, pdf_id, TargetType::Pdf)
        }
        Topic::PdfFavorited => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            Event::new(EventType::Favorite, user_id, pdf_id, TargetType::Pdf)
        }
        Topic::PdfRated => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            let mut event = Event::new(EventType::Rate, user_id, pdf_id, TargetType::Pdf);
            // A missing rating is the 0 sentinel: the event still counts,
            // the rating just stays out of averages.
            event.rating = payload.rating.unwrap_or(0);
            event
        }
        Topic::PdfUploaded => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            let mut event = Event::new(EventType::Upload, user_id, pdf_id, TargetType::Pdf);
            event.meta = EventMeta::Upload {
                category: payload
                    .category
                    .clone()
                    .unwrap_or_else(|| "uncategorized".to_string()),
            };
            event
        }
        Topic::CommentPosted => {
            let comment_id = payload
                .comment_id
                .ok_or_else(|| missing(topic, "comment_id"))?;
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            let mut event = Event::new(EventType::Comment, user_id, comment_id, TargetType::Comment);
            event.meta = EventMeta::CommentRef { pdf_id };
            event
        }
        Topic::CommentLiked => {
            let comment_id = payload
                .comment_id
                .ok_or_else(|| missing(topic, "comment_id"))?;
            let mut event = Event::new(EventType::Like, user_id, comment_id, TargetType::Comment);
            if let Some(pdf_id) = payload.pdf_id {
                event.meta = EventMeta::CommentRef { pdf_id };
            }
            event
        }
        Topic::ReadingStarted => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            Event::new(EventType::ReadingStart, user_id, pdf_id, TargetType::Pdf)
        }
        Topic::ReadingEnded => {
            let pdf_id = payload.pdf_id.ok_or_else(|| missing(topic, "pdf_id"))?;
            let duration = payload.duration.ok_or_else(|| missing(topic, "duration"))?;
            let mut event = Event::new(EventType::ReadingEnd, user_id, pdf_id, TargetType::Pdf);
            event.duration = duration;
            event
        }
        Topic::ProfileViewed => {
            // Here the acting user is the viewer and the target is the
            // profile owner.
            let profile_user_id = payload
                .profile_user_id
                .ok_or_else(|| missing(topic, "profile_user_id"))?;
            let viewer_id = payload.viewer_id.unwrap_or(user_id);
            let mut event = Event::new(
                EventType::ProfileView,
                viewer_id,
                profile_user_id,
                TargetType::User,
            );
            event.meta = EventMeta::ProfileView { viewer_id };
            event
        }
    };

    event.timestamp = timestamp;
    event.check_invariants()?;
    Ok(event)
}

fn missing(topic: Topic, field: &str) -> AnalyticsError {
    AnalyticsError::Malformed {
        detail: format!("topic {topic} requires field {field}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (Uuid, Uuid, Uuid) {
        (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7())
    }

    fn payload(user_id: Uuid) -> TopicPayload {
        TopicPayload {
            user_id: Some(user_id),
            ..TopicPayload::default()
        }
    }

    #[test]
    fn test_every_topic_has_a_stream_name() {
        let names: Vec<String> = Topic::ALL.iter().map(|t| t.stream_name()).collect();
        assert_eq!(names.len(), 10);
        assert!(names.contains(&"pdf_viewed".to_string()));
        assert!(names.contains(&"reading_ended".to_string()));
        for name in &names {
            assert_eq!(parse_topic(name).unwrap().stream_name(), *name);
        }
    }

    #[test]
    fn test_unknown_topic_is_rejected() {
        let err = parse_topic("pdf_deleted").unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownSource { .. }));
    }

    #[test]
    fn test_topic_mapping_table() {
        let (user, pdf, comment) = ids();

        let cases: Vec<(Topic, TopicPayload, EventType, TargetType, Uuid)> = vec![
            (
                Topic::PdfViewed,
                TopicPayload {
                    pdf_id: Some(pdf),
                    ..payload(user)
                },
                EventType::View,
                TargetType::Pdf,
                pdf,
            ),
            (
                Topic::PdfLiked,
                TopicPayload {
                    pdf_id: Some(pdf),
                    ..payload(user)
                },
                EventType::Like,
                TargetType::Pdf,
                pdf,
            ),
            (
                Topic::PdfFavorited,
                TopicPayload {
                    pdf_id: Some(pdf),
                    ..payload(user)
                },
                EventType::Favorite,
                TargetType::Pdf,
                pdf,
            ),
            (
                Topic::PdfRated,
                TopicPayload {
                    pdf_id: Some(pdf),
                    rating: Some(4),
                    ..payload(user)
                },
                EventType::Rate,
                TargetType::Pdf,
                pdf,
            ),
            (
                Topic::PdfUploaded,
                TopicPayload {
                    pdf_id: Some(pdf),
                    category: Some("science".to_string()),
                    ..payload(user)
                },
                EventType::Upload,
                TargetType::Pdf,
                pdf,
            ),
            (
                Topic::CommentPosted,
                TopicPayload {
                    comment_id: Some(comment),
                    pdf_id: Some(pdf),
                    ..payload(user)
                },
                EventType::Comment,
                TargetType::Comment,
                comment,
            ),
            (
                Topic::CommentLiked,
                TopicPayload {
                    comment_id: Some(comment),
                    pdf_id: Some(pdf),
                    ..payload(user)
                },
                EventType::Like,
                TargetType::Comment,
                comment,
            ),
            (
                Topic::ReadingStarted,
                TopicPayload {
                    pdf_id: Some(pdf),
                    ..payload(user)
                },
                EventType::ReadingStart,
                TargetType::Pdf,
                pdf,
            ),
            (
                Topic::ReadingEnded,
                TopicPayload {
                    pdf_id: Some(pdf),
                    duration: Some(120.0),
                    ..payload(user)
                },
                EventType::ReadingEnd,
                TargetType::Pdf,
                pdf,
            ),
        ];

        for (topic, raw, event_type, target_type, target_id) in cases {
            let event = normalize(topic, raw).unwrap_or_else(|e| panic!("{topic}: {e}"));
            assert_eq!(event.event_type, event_type, "{topic}");
            assert_eq!(event.target_type, target_type, "{topic}");
            assert_eq!(event.target_id, target_id, "{topic}");
            assert_eq!(event.user_id, user, "{topic}");
        }
    }

    #[test]
    fn test_profile_view_swaps_viewer_and_owner() {
        let (viewer, owner, _) = ids();
        let event = normalize(
            Topic::ProfileViewed,
            TopicPayload {
                user_id: Some(viewer),
                profile_user_id: Some(owner),
                viewer_id: Some(viewer),
                ..TopicPayload::default()
            },
        )
        .unwrap();

        assert_eq!(event.event_type, EventType::ProfileView);
        assert_eq!(event.user_id, viewer);
        assert_eq!(event.target_id, owner);
        assert_eq!(event.target_type, TargetType::User);
        assert_eq!(event.meta, EventMeta::ProfileView { viewer_id: viewer });
    }

    #[test]
    fn test_rated_payload_carries_rating() {
        let (user, pdf, _) = ids();
        let event = normalize(
            Topic::PdfRated,
            TopicPayload {
                pdf_id: Some(pdf),
                rating: Some(5),
                ..payload(user)
            },
        )
        .unwrap();
        assert_eq!(event.rating, 5);
    }

    #[test]
    fn test_rated_payload_rejects_out_of_range_rating() {
        let (user, pdf, _) = ids();
        let err = normalize(
            Topic::PdfRated,
            TopicPayload {
                pdf_id: Some(pdf),
                rating: Some(9),
                ..payload(user)
            },
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { .. }));
    }

    #[test]
    fn test_upload_defaults_category() {
        let (user, pdf, _) = ids();
        let event = normalize(
            Topic::PdfUploaded,
            TopicPayload {
                pdf_id: Some(pdf),
                ..payload(user)
            },
        )
        .unwrap();
        assert_eq!(
            event.meta,
            EventMeta::Upload {
                category: "uncategorized".to_string()
            }
        );
    }

    #[test]
    fn test_missing_required_field_is_malformed() {
        let (user, _, _) = ids();
        let err = normalize(Topic::PdfViewed, payload(user)).unwrap_err();
        assert!(matches!(err, AnalyticsError::Malformed { .. }));

        let err = normalize(
            Topic::ReadingEnded,
            TopicPayload {
                pdf_id: Some(Uuid::now_v7()),
                ..payload(user)
            },
        )
        .unwrap_err();
        assert!(matches!(err, AnalyticsError::Malformed { .. }));
    }

    #[test]
    fn test_normalize_message_decodes_json() {
        let user = Uuid::now_v7();
        let pdf = Uuid::now_v7();
        let raw = format!(r#"{{"user_id":"{user}","pdf_id":"{pdf}"}}"#);

        let event = normalize_message("pdf_viewed", &raw).unwrap();
        assert_eq!(event.event_type, EventType::View);
        assert_eq!(event.target_id, pdf);

        let err = normalize_message("pdf_viewed", "{not json").unwrap_err();
        assert!(matches!(err, AnalyticsError::Malformed { .. }));
    }

    #[test]
    fn test_bus_payload_fields_are_snake_case() {
        let user = Uuid::now_v7();
        let pdf = Uuid::now_v7();
        let comment = Uuid::now_v7();
        let owner = Uuid::now_v7();

        // The producers publish snake_case fields; every one of these
        // must decode and normalize, not fall into the poison path.
        let cases = vec![
            (
                "pdf_rated",
                format!(r#"{{"user_id":"{user}","pdf_id":"{pdf}","rating":4}}"#),
                EventType::Rate,
            ),
            (
                "reading_ended",
                format!(r#"{{"user_id":"{user}","pdf_id":"{pdf}","duration":42.5}}"#),
                EventType::ReadingEnd,
            ),
            (
                "comment_posted",
                format!(r#"{{"user_id":"{user}","comment_id":"{comment}","pdf_id":"{pdf}"}}"#),
                EventType::Comment,
            ),
            (
                "profile_viewed",
                format!(r#"{{"user_id":"{user}","profile_user_id":"{owner}","viewer_id":"{user}"}}"#),
                EventType::ProfileView,
            ),
        ];

        for (topic, raw, event_type) in cases {
            let event =
                normalize_message(topic, &raw).unwrap_or_else(|e| panic!("{topic}: {e}"));
            assert_eq!(event.event_type, event_type, "{topic}");
        }
    }

    #[test]
    fn test_rated_payload_without_rating_keeps_zero_sentinel() {
        let (user, pdf, _) = ids();
        let event = normalize(
            Topic::PdfRated,
            TopicPayload {
                pdf_id: Some(pdf),
                ..payload(user)
            },
        )
        .unwrap();
        assert_eq!(event.event_type, EventType::Rate);
        assert_eq!(event.rating, 0);
    }
}
