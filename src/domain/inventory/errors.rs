use uuid::Uuid;

use super::product::ProductStatus;
use crate::store::StoreError;

// ============================================================================
// Inventory Ledger Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Product {0} not found")]
    NotFound(Uuid),

    #[error("Product {product_id} is {status}, not AVAILABLE")]
    Unavailable {
        product_id: Uuid,
        status: ProductStatus,
    },

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Quantity must be positive, got {0}")]
    InvalidQuantity(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}
