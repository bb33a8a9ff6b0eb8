//! Ingestion pipeline shared by the stream consumer and the HTTP API.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::AnalyticsError;
use crate::models::{Event, IngestEvent};
use crate::normalizer::normalize_message;
use crate::store::EventSink;

/// Maximum number of events accepted in one batch request.
pub const MAX_BATCH_SIZE: usize = 100;

/// Per-item result of a batch ingestion, index-correlated with the
/// request array.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemError {
    pub index: usize,
    pub error: String,
}

/// Aggregate outcome of a batch ingestion. A batch succeeds and fails
/// per item; one bad event never blocks its neighbours.
#[derive(Debug, Serialize, ToSchema)]
pub struct BatchOutcome {
    pub processed: usize,
    pub errors: usize,
    pub details: Vec<BatchItemError>,
}

impl BatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Funnel through which every event reaches the store, regardless of
/// whether it arrived over the bus or over HTTP.
pub struct IngestPipeline<S: EventSink> {
    sink: Arc<S>,
}

impl<S: EventSink> IngestPipeline<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }

    /// Append one already-canonical event.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, target_id = %event.target_id))]
    pub async fn ingest(&self, event: &Event) -> Result<(), AnalyticsError> {
        event.check_invariants()?;
        self.sink.append(event).await?;
        debug!("event stored");
        Ok(())
    }

    /// Decode, normalize and store one raw bus message.
    pub async fn ingest_message(
        &self,
        topic_name: &str,
        raw: &str,
    ) -> Result<Event, AnalyticsError> {
        let event = normalize_message(topic_name, raw)?;
        self.ingest(&event).await?;
        Ok(event)
    }

    /// Ingest a batch on behalf of `user_id`, item by item.
    ///
    /// Items are processed in order and independently: a failed item is
    /// recorded in the outcome and the loop moves on. The store is
    /// append-only and deliberately not deduplicating, so retrying a
    /// partially failed batch may double-count the items that did land.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn ingest_batch(
        &self,
        user_id: Uuid,
        items: Vec<IngestEvent>,
    ) -> Result<BatchOutcome, AnalyticsError> {
        if items.is_empty() {
            return Err(AnalyticsError::Validation {
                message: "batch must contain at least one event".to_string(),
            });
        }
        if items.len() > MAX_BATCH_SIZE {
            return Err(AnalyticsError::Validation {
                message: format!("batch size {} exceeds maximum {MAX_BATCH_SIZE}", items.len()),
            });
        }

        let mut outcome = BatchOutcome {
            processed: 0,
            errors: 0,
            details: Vec::new(),
        };

        for (index, item) in items.into_iter().enumerate() {
            let result = match item.into_event(user_id) {
                Ok(event) => self.ingest(&event).await,
                Err(err) => Err(err),
            };
            match result {
                Ok(()) => outcome.processed += 1,
                Err(err) => {
                    warn!(index, error = %err, "batch item rejected");
                    outcome.errors += 1;
                    outcome.details.push(BatchItemError {
                        index,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventType, TargetType};
    use crate::store::mock::MockEventSink;
    use crate::store::StoreError;

    fn ingest_event(event_type: EventType, pdf_id: Option<Uuid>) -> IngestEvent {
        IngestEvent {
            event_type,
            target_id: None,
            target_type: None,
            pdf_id,
            comment_id: None,
            profile_user_id: None,
            timestamp: None,
            duration: None,
            rating: None,
            meta: None,
        }
    }

    #[tokio::test]
    async fn test_message_for_unknown_topic_never_reaches_sink() {
        let mut sink = MockEventSink::new();
        sink.expect_append().never();

        let pipeline = IngestPipeline::new(Arc::new(sink));
        let err = pipeline
            .ingest_message("pdf_deleted", "{}")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::UnknownSource { .. }));
    }

    #[tokio::test]
    async fn test_malformed_message_never_reaches_sink() {
        let mut sink = MockEventSink::new();
        sink.expect_append().never();

        let pipeline = IngestPipeline::new(Arc::new(sink));
        let err = pipeline
            .ingest_message("pdf_viewed", "{broken")
            .await
            .unwrap_err();
        assert!(err.is_poison());
    }

    #[tokio::test]
    async fn test_valid_message_is_appended_once() {
        let user = Uuid::now_v7();
        let pdf = Uuid::now_v7();

        let mut sink = MockEventSink::new();
        sink.expect_append()
            .withf(move |e: &Event| e.event_type == EventType::View && e.target_id == pdf)
            .times(1)
            .returning(|_| Ok(()));

        let pipeline = IngestPipeline::new(Arc::new(sink));
        let raw = format!(r#"{{"user_id":"{user}","pdf_id":"{pdf}"}}"#);
        let event = pipeline.ingest_message("pdf_viewed", &raw).await.unwrap();
        assert_eq!(event.target_type, TargetType::Pdf);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_appends_twice() {
        // At-least-once delivery means a redelivered message is stored
        // again; the store keeps both rows.
        let user = Uuid::now_v7();
        let pdf = Uuid::now_v7();

        let mut sink = MockEventSink::new();
        sink.expect_append().times(2).returning(|_| Ok(()));

        let pipeline = IngestPipeline::new(Arc::new(sink));
        let raw = format!(r#"{{"user_id":"{user}","pdf_id":"{pdf}"}}"#);
        pipeline.ingest_message("pdf_viewed", &raw).await.unwrap();
        pipeline.ingest_message("pdf_viewed", &raw).await.unwrap();
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut sink = MockEventSink::new();
        sink.expect_append()
            .times(1)
            .returning(|_| Err(StoreError::Timeout { timeout_ms: 1000 }));

        let pipeline = IngestPipeline::new(Arc::new(sink));
        let user = Uuid::now_v7();
        let pdf = Uuid::now_v7();
        let raw = format!(r#"{{"user_id":"{user}","pdf_id":"{pdf}"}}"#);
        let err = pipeline.ingest_message("pdf_viewed", &raw).await.unwrap_err();
        assert!(!err.is_poison());
    }

    #[tokio::test]
    async fn test_batch_partial_success_keeps_index_correlation() {
        let mut sink = MockEventSink::new();
        // Only the two valid items hit the sink.
        sink.expect_append().times(2).returning(|_| Ok(()));

        let pipeline = IngestPipeline::new(Arc::new(sink));
        let items = vec![
            ingest_event(EventType::View, Some(Uuid::now_v7())),
            ingest_event(EventType::Like, None), // no target anywhere
            ingest_event(EventType::Favorite, Some(Uuid::now_v7())),
        ];

        let outcome = pipeline.ingest_batch(Uuid::now_v7(), items).await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.errors, 1);
        assert_eq!(outcome.details.len(), 1);
        assert_eq!(outcome.details[0].index, 1);
        assert!(!outcome.is_clean());
    }

    #[tokio::test]
    async fn test_batch_rejects_empty_and_oversized() {
        let mut sink = MockEventSink::new();
        sink.expect_append().never();
        let pipeline = IngestPipeline::new(Arc::new(sink));

        let err = pipeline.ingest_batch(Uuid::now_v7(), vec![]).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { .. }));

        let too_many: Vec<IngestEvent> = (0..=MAX_BATCH_SIZE)
            .map(|_| ingest_event(EventType::View, Some(Uuid::now_v7())))
            .collect();
        let err = pipeline
            .ingest_batch(Uuid::now_v7(), too_many)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation { .. }));
    }
}
