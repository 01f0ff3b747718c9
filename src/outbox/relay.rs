use actix::Recipient;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::{DeadLetter, OutboxMessage};
use crate::actors::AddToDlq;
use crate::messaging::{EventPublisher, PublishError};
use crate::metrics::Metrics;
use crate::store::MarketStore;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Outbox Relay - publishes committed lifecycle events
// ============================================================================
//
// Per poll:
//   1. read up to `batch_size` pending rows, oldest first
//   2. publish each with backoff
//   3. mark published, or count the failure
//   4. rows out of deliveries go to the dead letter queue
//
// A failed row blocks later rows of the same order for the rest of the batch
// so one order's events never overtake each other. An open circuit ends the
// batch; the rows stay pending.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct RelaySettings {
    pub batch_size: usize,
    /// Poll cycles a row may fail before it is dead-lettered
    pub max_deliveries: i32,
    pub retry: RetryConfig,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_deliveries: 5,
            retry: RetryConfig::publishing(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    /// Left pending: blocked behind a failed row or an open circuit
    pub deferred: usize,
}

#[derive(Clone)]
pub struct OutboxRelay {
    store: Arc<dyn MarketStore>,
    publisher: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    settings: RelaySettings,
    dlq: Option<Recipient<AddToDlq>>,
}

impl OutboxRelay {
    pub fn new(
        store: Arc<dyn MarketStore>,
        publisher: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            publisher,
            metrics,
            settings,
            dlq: None,
        }
    }

    /// Route exhausted rows through the DLQ actor instead of writing them
    /// to the store directly.
    pub fn with_dlq(mut self, dlq: Recipient<AddToDlq>) -> Self {
        self.dlq = Some(dlq);
        self
    }

    pub fn publisher(&self) -> &Arc<dyn EventPublisher> {
        &self.publisher
    }

    pub async fn run_once(&self) -> anyhow::Result<RelayReport> {
        let pending = self.store.pending_outbox(self.settings.batch_size).await?;
        self.metrics.outbox_pending.set(pending.len() as i64);

        let mut report = RelayReport::default();
        if pending.is_empty() {
            return Ok(report);
        }

        let mut blocked: HashSet<Uuid> = HashSet::new();
        let mut remaining = pending.len();

        for message in &pending {
            remaining -= 1;

            if blocked.contains(&message.aggregate_id) {
                report.deferred += 1;
                continue;
            }

            let outcome = retry_on_transient(self.settings.retry.clone(), |_attempt| {
                self.publisher.publish(message)
            })
            .await;

            match outcome {
                RetryResult::Success(()) => {
                    self.store.mark_outbox_published(message.id).await?;
                    self.metrics.record_publish(&message.event_type, true);
                    report.published += 1;
                }
                RetryResult::PermanentFailure(PublishError::CircuitOpen(name)) => {
                    tracing::warn!(
                        publisher = name,
                        pending = remaining + 1,
                        "Circuit open, deferring rest of batch"
                    );
                    report.deferred += remaining + 1;
                    break;
                }
                RetryResult::Failed(error) | RetryResult::PermanentFailure(error) => {
                    self.metrics.record_publish(&message.event_type, false);
                    blocked.insert(message.aggregate_id);

                    let deliveries = message.attempts + 1;
                    if deliveries >= self.settings.max_deliveries {
                        self.dead_letter(message, &error, deliveries).await?;
                        report.dead_lettered += 1;
                    } else {
                        self.store
                            .record_outbox_failure(message.id, &error.to_string())
                            .await?;
                        report.failed += 1;
                    }
                }
            }
        }

        if report.published > 0 || report.failed > 0 || report.dead_lettered > 0 {
            tracing::info!(
                published = report.published,
                failed = report.failed,
                dead_lettered = report.dead_lettered,
                deferred = report.deferred,
                "Outbox relay batch complete"
            );
        }

        Ok(report)
    }

    async fn dead_letter(
        &self,
        message: &OutboxMessage,
        error: &PublishError,
        deliveries: i32,
    ) -> anyhow::Result<()> {
        let dead_letter = DeadLetter::from_message(message, error.to_string(), deliveries);

        match &self.dlq {
            Some(dlq) => dlq
                .send(AddToDlq { dead_letter })
                .await
                .map_err(|e| anyhow::anyhow!("DLQ actor unreachable: {}", e))?
                .map_err(|e| anyhow::anyhow!(e))?,
            None => {
                tracing::error!(
                    message_id = %message.id,
                    event_type = %message.event_type,
                    error = %error,
                    "💀 Dead-lettering outbox message"
                );
                self.store.record_dead_letter(&dead_letter).await?;
                self.metrics.record_dlq_message(&message.event_type);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UnitOfWork};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records publishes; fails every message whose aggregate is poisoned.
    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<Uuid>>,
        poisoned: Mutex<HashSet<Uuid>>,
        circuit_open: bool,
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
            if self.circuit_open {
                return Err(PublishError::CircuitOpen("recording"));
            }
            if self.poisoned.lock().unwrap().contains(&message.aggregate_id) {
                return Err(PublishError::Broker("partition offline".to_string()));
            }
            self.sent.lock().unwrap().push(message.id);
            Ok(())
        }
    }

    fn message(aggregate_id: Uuid) -> OutboxMessage {
        OutboxMessage {
            id: Uuid::now_v7(),
            aggregate_id,
            event_id: Uuid::new_v4(),
            event_type: "OrderPlaced".to_string(),
            topic: "order-events".to_string(),
            partition_key: aggregate_id.to_string(),
            payload: "{}".to_string(),
            correlation_id: Uuid::new_v4(),
            created_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    async fn enqueue(store: &MemoryStore, messages: &[OutboxMessage]) {
        let mut uow: Box<dyn UnitOfWork> = store.begin().await.unwrap();
        for m in messages {
            uow.enqueue_event(m).await.unwrap();
        }
        uow.commit().await.unwrap();
    }

    fn relay(store: &MemoryStore, publisher: Arc<RecordingPublisher>, max_deliveries: i32) -> OutboxRelay {
        OutboxRelay::new(
            Arc::new(store.clone()),
            publisher,
            Arc::new(Metrics::new().unwrap()),
            RelaySettings {
                batch_size: 10,
                max_deliveries,
                retry: RetryConfig {
                    max_attempts: 2,
                    initial_delay: Duration::from_millis(1),
                    max_delay: Duration::from_millis(2),
                    multiplier: 2.0,
                },
            },
        )
    }

    #[tokio::test]
    async fn test_relay_publishes_in_order_and_marks_rows() {
        let store = MemoryStore::new();
        let order = Uuid::new_v4();
        let batch = [message(order), message(order), message(Uuid::new_v4())];
        enqueue(&store, &batch).await;

        let publisher = Arc::new(RecordingPublisher::default());
        let report = relay(&store, publisher.clone(), 3).run_once().await.unwrap();

        assert_eq!(report.published, 3);
        assert_eq!(
            *publisher.sent.lock().unwrap(),
            batch.iter().map(|m| m.id).collect::<Vec<_>>()
        );
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_row_blocks_its_order_only() {
        let store = MemoryStore::new();
        let stuck = Uuid::new_v4();
        let healthy = Uuid::new_v4();
        enqueue(&store, &[message(stuck), message(stuck), message(healthy)]).await;

        let publisher = Arc::new(RecordingPublisher::default());
        publisher.poisoned.lock().unwrap().insert(stuck);

        let report = relay(&store, publisher, 3).run_once().await.unwrap();
        assert_eq!(
            report,
            RelayReport {
                published: 1,
                failed: 1,
                dead_lettered: 0,
                deferred: 1,
            }
        );

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attempts, 1);
    }

    #[tokio::test]
    async fn test_exhausted_row_is_dead_lettered() {
        let store = MemoryStore::new();
        let stuck = Uuid::new_v4();
        enqueue(&store, &[message(stuck)]).await;

        let publisher = Arc::new(RecordingPublisher::default());
        publisher.poisoned.lock().unwrap().insert(stuck);
        let relay = relay(&store, publisher, 2);

        assert_eq!(relay.run_once().await.unwrap().failed, 1);
        assert_eq!(relay.run_once().await.unwrap().dead_lettered, 1);

        assert!(store.pending_outbox(10).await.unwrap().is_empty());
        let dead = store.list_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].aggregate_id, stuck);
        assert!(dead[0].error_message.contains("partition offline"));
    }

    #[tokio::test]
    async fn test_open_circuit_defers_whole_batch() {
        let store = MemoryStore::new();
        enqueue(&store, &[message(Uuid::new_v4()), message(Uuid::new_v4())]).await;

        let publisher = Arc::new(RecordingPublisher {
            circuit_open: true,
            ..Default::default()
        });
        let report = relay(&store, publisher, 1).run_once().await.unwrap();

        assert_eq!(report.deferred, 2);
        assert_eq!(report.dead_lettered, 0);
        assert_eq!(store.pending_outbox(10).await.unwrap().len(), 2);
    }
}
