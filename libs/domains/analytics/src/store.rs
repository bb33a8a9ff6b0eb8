//! ClickHouse-backed analytical store.
//!
//! The store speaks the ClickHouse HTTP interface directly: inserts go
//! in as `JSONEachRow` lines, reads come back the same way, and query
//! parameters are bound server-side through `param_*` query-string
//! pairs so no user input is ever spliced into SQL text.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use core_config::clickhouse::ClickHouseConfig;

use crate::models::{Event, EventType, TargetType};

/// Errors from the analytical store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("store transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("store row decode error: {detail}")]
    Decode { detail: String },
}

/// Append seam between the pipeline and the physical store.
///
/// The consumer and the HTTP API both write through this trait, which
/// keeps ingestion logic testable without a running ClickHouse.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Append one event. The store is append-only; there is no update
    /// or delete path.
    async fn append(&self, event: &Event) -> Result<(), StoreError>;
}

/// Wire row for `JSONEachRow` inserts into the events table.
#[derive(Debug, Serialize, Deserialize)]
pub struct EventRow {
    pub event_type: EventType,
    pub user_id: Uuid,
    pub target_id: Uuid,
    pub target_type: TargetType,
    /// `DateTime` column text form, e.g. `2026-08-28 12:00:00`.
    pub timestamp: String,
    pub duration: f64,
    pub rating: i32,
    pub metadata: String,
}

impl From<&Event> for EventRow {
    fn from(event: &Event) -> Self {
        Self {
            event_type: event.event_type,
            user_id: event.user_id,
            target_id: event.target_id,
            target_type: event.target_type,
            timestamp: event.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            duration: event.duration,
            rating: event.rating,
            metadata: event.meta.to_json_string(),
        }
    }
}

/// DDL for the raw event log. Ordered by `(event_type, timestamp)` to
/// match the access pattern of the query engine: filter on type, then
/// range-scan a time window.
pub fn events_table_ddl(database: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {database}.events (\n\
         \x20   event_type LowCardinality(String),\n\
         \x20   user_id UUID,\n\
         \x20   target_id UUID,\n\
         \x20   target_type LowCardinality(String),\n\
         \x20   timestamp DateTime,\n\
         \x20   duration Float64 DEFAULT 0,\n\
         \x20   rating Int32 DEFAULT 0,\n\
         \x20   metadata String DEFAULT '{{}}'\n\
         ) ENGINE = MergeTree()\n\
         ORDER BY (event_type, timestamp)"
    )
}

/// DDL for the incremental per-target rollup. Maintained by ClickHouse
/// on every insert, so point stats never scan the raw log. Ratings of
/// zero are the "not a rating" sentinel and are excluded from averages
/// at aggregation time; durations are averaged over every session, a
/// zero-length one included.
pub fn target_rollup_ddl(database: &str) -> String {
    format!(
        "CREATE MATERIALIZED VIEW IF NOT EXISTS {database}.target_rollup\n\
         ENGINE = AggregatingMergeTree()\n\
         ORDER BY (target_id, event_type)\n\
         AS SELECT\n\
         \x20   target_id,\n\
         \x20   event_type,\n\
         \x20   countState() AS events,\n\
         \x20   avgIfState(toFloat64(rating), rating > 0) AS avg_rating,\n\
         \x20   countIfState(rating > 0) AS ratings,\n\
         \x20   avgState(duration) AS avg_duration\n\
         FROM {database}.events\n\
         GROUP BY target_id, event_type"
    )
}

/// ClickHouse event store over the HTTP interface.
#[derive(Clone)]
pub struct ClickHouseStore {
    client: reqwest::Client,
    url: String,
    database: String,
    username: String,
    password: String,
    timeout_ms: u64,
}

impl ClickHouseStore {
    pub fn new(config: &ClickHouseConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
            database: config.database.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout_ms: config.timeout_ms,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Liveness probe against the server's `/ping` endpoint.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let response = self
            .client
            .get(format!("{}/ping", self.url))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        if !response.status().is_success() {
            return Err(StoreError::Status {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    /// Create the database, the raw event log and the rollup view.
    /// Idempotent; safe to run on every boot.
    #[instrument(skip(self))]
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        self.execute(&format!(
            "CREATE DATABASE IF NOT EXISTS {}",
            self.database
        ))
        .await?;
        self.execute(&events_table_ddl(&self.database)).await?;
        self.execute(&target_rollup_ddl(&self.database)).await?;
        info!(database = %self.database, "ClickHouse schema ready");
        Ok(())
    }

    /// Run a statement that returns no rows.
    async fn execute(&self, sql: &str) -> Result<(), StoreError> {
        let response = self
            .request(&[])
            .body(sql.to_string())
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.check(response).await?;
        Ok(())
    }

    /// Append a batch of events as `JSONEachRow` lines.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn append_many(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut body = String::new();
        for event in events {
            let row = EventRow::from(event);
            let line = serde_json::to_string(&row).map_err(|e| StoreError::Decode {
                detail: e.to_string(),
            })?;
            body.push_str(&line);
            body.push('\n');
        }

        let insert = format!(
            "INSERT INTO {}.events FORMAT JSONEachRow",
            self.database
        );
        let response = self
            .request(&[("query".to_string(), insert)])
            .body(body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.check(response).await?;

        debug!(count = events.len(), "events appended");
        Ok(())
    }

    /// Run a SELECT and decode each `JSONEachRow` line into `T`.
    ///
    /// `params` are bound server-side: a `{name:Type}` placeholder in
    /// the SQL picks up the `param_name` pair sent here.
    pub async fn fetch_all<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, StoreError> {
        let mut pairs: Vec<(String, String)> = vec![(
            "output_format_json_quote_64bit_integers".to_string(),
            "0".to_string(),
        )];
        for (name, value) in params {
            pairs.push((format!("param_{name}"), value.clone()));
        }

        let response = self
            .request(&pairs)
            .body(format!("{sql} FORMAT JSONEachRow"))
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        let text = self.check(response).await?;

        let mut rows = Vec::new();
        for line in text.lines().filter(|l| !l.trim().is_empty()) {
            let row = serde_json::from_str(line).map_err(|e| StoreError::Decode {
                detail: format!("{e}: {line}"),
            })?;
            rows.push(row);
        }
        Ok(rows)
    }

    /// Like [`fetch_all`](Self::fetch_all) but for single-row
    /// aggregates; `None` when the result set is empty.
    pub async fn fetch_one<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &[(&str, String)],
    ) -> Result<Option<T>, StoreError> {
        Ok(self.fetch_all(sql, params).await?.into_iter().next())
    }

    fn request(&self, query_pairs: &[(String, String)]) -> reqwest::RequestBuilder {
        self.client
            .post(&self.url)
            .header("X-ClickHouse-User", &self.username)
            .header("X-ClickHouse-Key", &self.password)
            .query(&[("database", self.database.as_str())])
            .query(query_pairs)
    }

    async fn check(&self, response: reqwest::Response) -> Result<String, StoreError> {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(status = %status, body = %body, "ClickHouse request failed");
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    fn classify(&self, err: reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout {
                timeout_ms: self.timeout_ms,
            }
        } else {
            StoreError::Transport(err)
        }
    }
}

#[async_trait]
impl EventSink for ClickHouseStore {
    async fn append(&self, event: &Event) -> Result<(), StoreError> {
        self.append_many(std::slice::from_ref(event)).await
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use mockall::mock;

    mock! {
        pub EventSink {}

        #[async_trait]
        impl EventSink for EventSink {
            async fn append(&self, event: &Event) -> Result<(), StoreError>;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventMeta;
    use chrono::TimeZone;

    #[test]
    fn test_event_row_wire_shape() {
        let mut event = Event::new(
            EventType::Rate,
            Uuid::now_v7(),
            Uuid::now_v7(),
            TargetType::Pdf,
        );
        event.rating = 4;
        event.timestamp = chrono::Utc.with_ymd_and_hms(2026, 8, 28, 12, 30, 0).unwrap();

        let row = EventRow::from(&event);
        let json = serde_json::to_string(&row).unwrap();

        assert!(json.contains(r#""event_type":"rate""#));
        assert!(json.contains(r#""timestamp":"2026-08-28 12:30:00""#));
        assert!(json.contains(r#""rating":4"#));
        assert!(json.contains(r#""metadata":"{}""#));
    }

    #[test]
    fn test_event_row_serializes_meta_as_json_text() {
        let mut event = Event::new(
            EventType::Upload,
            Uuid::now_v7(),
            Uuid::now_v7(),
            TargetType::Pdf,
        );
        event.meta = EventMeta::Upload {
            category: "history".to_string(),
        };

        let row = EventRow::from(&event);
        let meta: EventMeta = serde_json::from_str(&row.metadata).unwrap();
        assert_eq!(meta, event.meta);
    }

    #[test]
    fn test_events_table_orders_by_type_then_time() {
        let ddl = events_table_ddl("analytics");
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS analytics.events"));
        assert!(ddl.contains("ENGINE = MergeTree()"));
        assert!(ddl.contains("ORDER BY (event_type, timestamp)"));
    }

    #[test]
    fn test_rollup_excludes_zero_ratings() {
        let ddl = target_rollup_ddl("analytics");
        assert!(ddl.contains("AggregatingMergeTree()"));
        assert!(ddl.contains("ORDER BY (target_id, event_type)"));
        assert!(ddl.contains("avgIfState(toFloat64(rating), rating > 0)"));
        assert!(ddl.contains("countIfState(rating > 0)"));
    }

    #[test]
    fn test_rollup_averages_all_session_durations() {
        // A reading_end with duration 0 is still a session and still
        // weighs into the average.
        let ddl = target_rollup_ddl("analytics");
        assert!(ddl.contains("avgState(duration) AS avg_duration"));
        assert!(!ddl.contains("duration > 0"));
    }
}
