use async_trait::async_trait;

use crate::outbox::OutboxMessage;
use crate::utils::{CircuitState, IsTransient};

mod log_publisher;
mod redpanda;

pub use log_publisher::LogPublisher;
pub use redpanda::RedpandaClient;

// ============================================================================
// Event Publishing - where outbox rows go once committed
// ============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("Circuit breaker open for {0}")]
    CircuitOpen(&'static str),

    #[error("Broker error: {0}")]
    Broker(String),

    #[error("Publisher configuration error: {0}")]
    Config(String),
}

impl IsTransient for PublishError {
    fn is_transient(&self) -> bool {
        matches!(self, PublishError::Broker(_))
    }
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn publish(&self, message: &OutboxMessage) -> Result<(), PublishError>;

    /// None when the publisher has no breaker.
    async fn circuit_state(&self) -> Option<CircuitState> {
        None
    }
}
