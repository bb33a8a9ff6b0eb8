//! Per-topic stream consumer.
//!
//! Each bus topic is one Redis stream read through a shared consumer
//! group, so ordering holds within a topic and topics are consumed
//! concurrently. Delivery is at-least-once: a message is acknowledged
//! only after the store write succeeded, so a crash mid-processing
//! redelivers rather than loses.
//!
//! Poison handling: a message that can never be processed (unknown
//! topic, broken JSON, missing required fields) is logged, counted and
//! acknowledged so it cannot wedge the stream. Store failures are the
//! opposite case and leave the message pending for redelivery.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::RedisResult;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use core_config::bus::BusConfig;
use domain_analytics::{EventSink, IngestPipeline, Topic};

/// Operational state of one topic consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Disconnected,
    Connecting,
    Subscribed,
    Consuming,
}

/// What to do with a message after a processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Written to the store; acknowledge.
    Stored,
    /// Poison; acknowledge and move on.
    Skipped,
    /// Transient failure; leave pending for redelivery.
    Retry,
}

/// Process one raw message and decide its fate. Pure with respect to
/// the bus: no acking happens here.
pub async fn process_message<S: EventSink>(
    pipeline: &IngestPipeline<S>,
    topic_name: &str,
    payload: &str,
) -> Disposition {
    match pipeline.ingest_message(topic_name, payload).await {
        Ok(event) => {
            debug!(topic = topic_name, event_type = %event.event_type, "message stored");
            Disposition::Stored
        }
        Err(err) if err.is_poison() => {
            warn!(topic = topic_name, error = %err, "poison message skipped");
            Disposition::Skipped
        }
        Err(err) => {
            error!(topic = topic_name, error = %err, "store write failed, will retry");
            Disposition::Retry
        }
    }
}

/// Bounded exponential backoff: base doubled per attempt, capped.
pub fn backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let exp = attempt.min(16);
    let delay = base_ms.saturating_mul(1u64 << exp).min(max_ms);
    Duration::from_millis(delay)
}

type StreamEntries = Vec<(String, Vec<(String, Vec<(String, String)>)>)>;

pub struct TopicConsumer<S: EventSink> {
    redis: ConnectionManager,
    topic: Topic,
    pipeline: Arc<IngestPipeline<S>>,
    config: BusConfig,
    state: ConsumerState,
}

impl<S: EventSink> TopicConsumer<S> {
    pub fn new(
        redis: ConnectionManager,
        topic: Topic,
        pipeline: Arc<IngestPipeline<S>>,
        config: BusConfig,
    ) -> Self {
        Self {
            redis,
            topic,
            pipeline,
            config,
            state: ConsumerState::Disconnected,
        }
    }

    pub fn state(&self) -> ConsumerState {
        self.state
    }

    /// Create the consumer group, tolerating one that already exists.
    async fn ensure_group(&mut self) -> RedisResult<()> {
        self.state = ConsumerState::Connecting;
        let stream = self.topic.stream_name();

        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.redis)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %stream, group = %self.config.consumer_group, "consumer group created");
            }
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %stream, "consumer group already exists");
            }
            Err(e) => {
                self.state = ConsumerState::Disconnected;
                return Err(e);
            }
        }

        self.state = ConsumerState::Subscribed;
        Ok(())
    }

    /// One XREADGROUP call. `id` is `">"` for new messages or `"0"`
    /// for this consumer's pending backlog.
    async fn read(&mut self, id: &str, block: bool) -> RedisResult<StreamEntries> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(&self.config.consumer_id);
        if block {
            cmd.arg("BLOCK").arg(self.config.block_timeout_ms);
        }
        cmd.arg("COUNT")
            .arg(self.config.batch_size)
            .arg("STREAMS")
            .arg(self.topic.stream_name())
            .arg(id);

        let result: RedisResult<Option<StreamEntries>> = cmd.query_async(&mut self.redis).await;
        Ok(result?.unwrap_or_default())
    }

    async fn ack(&mut self, entry_id: &str) -> RedisResult<()> {
        let _: i64 = redis::cmd("XACK")
            .arg(self.topic.stream_name())
            .arg(&self.config.consumer_group)
            .arg(entry_id)
            .query_async(&mut self.redis)
            .await?;
        Ok(())
    }

    /// Process one batch of entries in stream order. Returns whether a
    /// transient failure was hit (caller backs off before re-reading).
    async fn handle_entries(&mut self, streams: StreamEntries) -> bool {
        let mut hit_transient_failure = false;
        let topic_name = self.topic.stream_name();

        for (_stream, entries) in streams {
            for (entry_id, fields) in entries {
                let payload = fields
                    .iter()
                    .find(|(key, _)| key == "payload")
                    .map(|(_, value)| value.as_str());

                let disposition = match payload {
                    Some(raw) => process_message(&self.pipeline, &topic_name, raw).await,
                    None => {
                        warn!(entry_id = %entry_id, topic = %topic_name, "entry without payload field skipped");
                        Disposition::Skipped
                    }
                };

                match disposition {
                    Disposition::Stored | Disposition::Skipped => {
                        if let Err(e) = self.ack(&entry_id).await {
                            warn!(entry_id = %entry_id, error = %e, "ack failed, message will be redelivered");
                        }
                    }
                    Disposition::Retry => {
                        hit_transient_failure = true;
                    }
                }
            }
        }

        hit_transient_failure
    }

    /// Consume until shutdown. Redis errors reconnect with bounded
    /// exponential backoff; the connection manager re-establishes the
    /// link underneath.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let topic_name = self.topic.stream_name();
        let mut consecutive_errors: u32 = 0;
        let mut drain_pending = true;

        if let Err(e) = self.ensure_group().await {
            error!(topic = %topic_name, error = %e, "failed to create consumer group");
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            if self.state == ConsumerState::Disconnected
                || self.state == ConsumerState::Connecting
            {
                if self.ensure_group().await.is_err() {
                    let delay = backoff_delay(
                        consecutive_errors,
                        self.config.connect_backoff_ms,
                        self.config.connect_backoff_max_ms,
                    );
                    consecutive_errors += 1;
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }
            }

            // After subscribe or a store failure, work off this
            // consumer's pending backlog before reading new entries.
            let read_result = if drain_pending {
                self.read("0", false).await
            } else {
                let read = self.read(">", true);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    result = read => result,
                }
            };

            match read_result {
                Ok(streams) => {
                    consecutive_errors = 0;
                    self.state = ConsumerState::Consuming;

                    let backlog_empty =
                        drain_pending && streams.iter().all(|(_, entries)| entries.is_empty());

                    let failed = self.handle_entries(streams).await;
                    if failed {
                        drain_pending = true;
                        let delay = backoff_delay(
                            0,
                            self.config.connect_backoff_ms,
                            self.config.connect_backoff_max_ms,
                        );
                        tokio::select! {
                            _ = shutdown.changed() => break,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    } else if backlog_empty {
                        drain_pending = false;
                    }
                }
                Err(e) => {
                    self.state = ConsumerState::Disconnected;
                    let delay = backoff_delay(
                        consecutive_errors,
                        self.config.connect_backoff_ms,
                        self.config.connect_backoff_max_ms,
                    );
                    consecutive_errors += 1;
                    warn!(topic = %topic_name, error = %e, delay_ms = delay.as_millis() as u64, "read failed, backing off");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        info!(topic = %topic_name, "consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use domain_analytics::{Event, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Test sink that counts appends and can be switched to fail.
    #[derive(Default)]
    struct CountingSink {
        appended: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EventSink for CountingSink {
        async fn append(&self, _event: &Event) -> Result<(), StoreError> {
            if self.fail {
                return Err(StoreError::Timeout { timeout_ms: 1000 });
            }
            self.appended.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline(sink: CountingSink) -> (Arc<CountingSink>, IngestPipeline<CountingSink>) {
        let sink = Arc::new(sink);
        (sink.clone(), IngestPipeline::new(sink))
    }

    fn valid_payload() -> String {
        format!(
            r#"{{"user_id":"{}","pdf_id":"{}"}}"#,
            Uuid::now_v7(),
            Uuid::now_v7()
        )
    }

    #[tokio::test]
    async fn test_valid_message_is_stored_and_ackable() {
        let (sink, pipeline) = pipeline(CountingSink::default());
        let disposition = process_message(&pipeline, "pdf_viewed", &valid_payload()).await;
        assert_eq!(disposition, Disposition::Stored);
        assert_eq!(sink.appended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_topic_is_skipped_without_store_write() {
        let (sink, pipeline) = pipeline(CountingSink::default());
        let disposition = process_message(&pipeline, "pdf_deleted", &valid_payload()).await;
        assert_eq!(disposition, Disposition::Skipped);
        assert_eq!(sink.appended.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_skipped() {
        let (sink, pipeline) = pipeline(CountingSink::default());
        assert_eq!(
            process_message(&pipeline, "pdf_viewed", "{broken").await,
            Disposition::Skipped
        );
        assert_eq!(
            process_message(&pipeline, "pdf_viewed", r#"{"pdf_id":"not-a-uuid"}"#).await,
            Disposition::Skipped
        );
        assert_eq!(sink.appended.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_requests_retry() {
        let (_, pipeline) = pipeline(CountingSink {
            fail: true,
            ..CountingSink::default()
        });
        let disposition = process_message(&pipeline, "pdf_viewed", &valid_payload()).await;
        assert_eq!(disposition, Disposition::Retry);
    }

    #[tokio::test]
    async fn test_one_bad_message_does_not_block_the_next() {
        let (sink, pipeline) = pipeline(CountingSink::default());
        assert_eq!(
            process_message(&pipeline, "pdf_viewed", "not json at all").await,
            Disposition::Skipped
        );
        assert_eq!(
            process_message(&pipeline, "pdf_viewed", &valid_payload()).await,
            Disposition::Stored
        );
        assert_eq!(sink.appended.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        assert_eq!(backoff_delay(0, 100, 30_000), Duration::from_millis(100));
        assert_eq!(backoff_delay(1, 100, 30_000), Duration::from_millis(200));
        assert_eq!(backoff_delay(4, 100, 30_000), Duration::from_millis(1_600));
        assert_eq!(backoff_delay(20, 100, 30_000), Duration::from_millis(30_000));
    }
}
