//! Analytics domain: event normalization, ingestion and read-side queries.
//!
//! The write path is `topic payload -> normalizer -> IngestPipeline ->
//! EventSink`; the read path is `QueryEngine -> ClickHouseStore`. Both
//! paths share one canonical [`models::Event`] shape and one append-only
//! store.

pub mod error;
pub mod identity;
pub mod ingest;
pub mod models;
pub mod normalizer;
pub mod query;
pub mod store;

pub use error::{AnalyticsError, Result};
pub use identity::{AuthUser, IdentityClient};
pub use ingest::{BatchOutcome, IngestPipeline, MAX_BATCH_SIZE};
pub use models::{Event, EventMeta, EventType, IngestEvent, Period, TargetType};
pub use normalizer::{normalize, normalize_message, parse_topic, Topic, TopicPayload};
pub use query::QueryEngine;
pub use store::{ClickHouseStore, EventSink, StoreError};
