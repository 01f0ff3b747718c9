use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod envelope;
pub mod relay;

pub use envelope::{DomainEvent, EventEnvelope};
pub use relay::{OutboxRelay, RelayReport, RelaySettings};

// ============================================================================
// Transactional Outbox
// ============================================================================
//
// Lifecycle events are written as outbox rows in the same unit of work as the
// order change they describe. The relay publishes them afterwards, so an
// event exists if and only if its change committed.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Time-ordered (v7) so pending rows drain in commit order.
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub partition_key: String,
    /// JSON-encoded `EventEnvelope`.
    pub payload: String,
    pub correlation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub attempts: i32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub message_id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub topic: String,
    pub payload: String,
    pub error_message: String,
    pub attempts: i32,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn from_message(message: &OutboxMessage, error_message: impl Into<String>, attempts: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_id: message.id,
            aggregate_id: message.aggregate_id,
            event_type: message.event_type.clone(),
            topic: message.topic.clone(),
            payload: message.payload.clone(),
            error_message: error_message.into(),
            attempts,
            failed_at: Utc::now(),
        }
    }
}
