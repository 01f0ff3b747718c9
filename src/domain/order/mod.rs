// ============================================================================
// Order Domain
// ============================================================================
//
// - Value objects (Order, OrderItem, OrderStatus, Actor)
// - Lifecycle state machine and authorization rules
// - Price snapshotting
// - Events written to the outbox (OrderPlaced, OrderStatusChanged)
// - Commands and the OrderCommandHandler that runs them
//
// ============================================================================

pub mod aggregate;
pub mod command_handler;
pub mod commands;
pub mod errors;
pub mod events;
pub mod lifecycle;
pub mod pricing;
pub mod value_objects;

pub use aggregate::*;
pub use command_handler::*;
pub use commands::*;
pub use errors::*;
pub use events::*;
pub use value_objects::*;
