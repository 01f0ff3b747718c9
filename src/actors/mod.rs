// ============================================================================
// Actors Module
// ============================================================================
//
// Actor-based infrastructure around the order core.
//
// Structure:
// - core/           - health types shared by every actor
// - infrastructure/ - outbox relay, DLQ, health monitor, coordinator
//
// Note: Order placement and lifecycle run in OrderCommandHandler, NOT actors.
//       Actors are reserved for background infrastructure only.
//
// ============================================================================

mod core;
mod infrastructure;

pub use core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    AddToDlq, CoordinatorActor, DlqActor, GetDlqMessages, GetSystemHealth, HealthMonitorActor,
    OutboxRelayActor, Shutdown, SystemHealth, UpdateHealth,
};
