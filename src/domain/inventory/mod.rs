// ============================================================================
// Inventory Domain - product stock and the ledger that mutates it
// ============================================================================

pub mod product;
pub mod errors;
pub mod ledger;

pub use product::*;
pub use errors::*;
pub use ledger::*;
