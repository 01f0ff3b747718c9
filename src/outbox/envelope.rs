use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::OutboxMessage;

// ============================================================================
// Event Envelope - metadata wrapped around every published lifecycle event
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    /// Order version the event produced.
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    pub correlation_id: Uuid,

    /// Actor who triggered the change.
    pub user_id: Option<Uuid>,

    pub timestamp: DateTime<Utc>,

    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(event_data: E, sequence_number: i64, correlation_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            aggregate_id: event_data.aggregate_id(),
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            correlation_id,
            user_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Serialize into an outbox row keyed by aggregate, so one order's
    /// events land on one partition in order.
    pub fn to_outbox_message(&self, topic: &str) -> Result<OutboxMessage, serde_json::Error> {
        Ok(OutboxMessage {
            id: Uuid::now_v7(),
            aggregate_id: self.aggregate_id,
            event_id: self.event_id,
            event_type: self.event_type.clone(),
            topic: topic.to_string(),
            partition_key: self.aggregate_id.to_string(),
            payload: serde_json::to_string(self)?,
            correlation_id: self.correlation_id,
            created_at: self.timestamp,
            attempts: 0,
            last_error: None,
        })
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn event_type(&self) -> &'static str;

    fn aggregate_id(&self) -> Uuid;

    fn event_version(&self) -> i32 {
        1
    }
}

pub fn deserialize_envelope<E: DomainEvent>(payload: &str) -> Result<EventEnvelope<E>, serde_json::Error> {
    serde_json::from_str(payload)
}
