// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Outbox relay polling
// - Dead letter queue
// - Health monitoring
// - Coordination and shutdown
//
// ============================================================================

mod coordinator;
mod dlq;
mod health_monitor;
mod outbox_relay;

pub use coordinator::{CoordinatorActor, Shutdown};
pub use dlq::{AddToDlq, DlqActor, GetDlqMessages};
pub use health_monitor::{GetSystemHealth, HealthMonitorActor, SystemHealth, UpdateHealth};
pub use outbox_relay::OutboxRelayActor;
