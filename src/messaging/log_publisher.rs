use async_trait::async_trait;

use super::{EventPublisher, PublishError};
use crate::outbox::OutboxMessage;

/// Used when no broker is configured: every event is written to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError> {
        tracing::info!(
            topic = %message.topic,
            key = %message.partition_key,
            event_type = %message.event_type,
            event_id = %message.event_id,
            payload = %message.payload,
            "📨 Lifecycle event"
        );
        Ok(())
    }
}
