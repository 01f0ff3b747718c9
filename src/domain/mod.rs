// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - inventory: product stock and the ledger that reserves and releases it
// - order: placement, lifecycle and reads of marketplace orders
//
// Nothing here knows which store backs it; all persistence goes through
// the `store` traits.
//
// ============================================================================

pub mod inventory;
pub mod order;
