use uuid::Uuid;

use super::value_objects::OrderStatus;
use crate::domain::inventory::{LedgerError, ProductStatus};
use crate::store::StoreError;
use crate::utils::IsTransient;

// ============================================================================
// Order Errors - everything the core can report to the boundary
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Product {0} not found")]
    ProductNotFound(Uuid),

    #[error("Order {0} not found")]
    OrderNotFound(Uuid),

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

    #[error("Actor {actor_id} may not {action}")]
    Forbidden { actor_id: Uuid, action: String },

    #[error("Order {order_id} cannot move from {from} to {to}")]
    InvalidTransition {
        order_id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    },

    #[error("Order {order_id} was modified concurrently")]
    ConcurrentUpdate { order_id: Uuid },

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
}

impl OrderError {
    /// Stable error kind rendered at the boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::InvalidRequest(_) => "InvalidRequest",
            OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) => "NotFound",
            OrderError::Unavailable { .. } => "Unavailable",
            OrderError::InsufficientStock { .. } => "InsufficientStock",
            OrderError::Forbidden { .. } => "Forbidden",
            OrderError::InvalidTransition { .. } => "InvalidTransition",
            OrderError::ConcurrentUpdate { .. } => "ConcurrentUpdate",
            OrderError::PersistenceFailure(_) => "PersistenceFailure",
        }
    }

    pub(crate) fn forbidden(actor_id: Uuid, action: impl Into<String>) -> Self {
        OrderError::Forbidden {
            actor_id,
            action: action.into(),
        }
    }
}

impl From<LedgerError> for OrderError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound(product_id) => OrderError::ProductNotFound(product_id),
            LedgerError::Unavailable { product_id, status } => {
                OrderError::Unavailable { product_id, status }
            }
            LedgerError::InsufficientStock {
                product_id,
                requested,
                available,
            } => OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            LedgerError::InvalidQuantity(q) => {
                OrderError::InvalidRequest(format!("quantity must be positive, got {}", q))
            }
            LedgerError::Store(e) => OrderError::PersistenceFailure(e.to_string()),
        }
    }
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        OrderError::PersistenceFailure(err.to_string())
    }
}

impl From<serde_json::Error> for OrderError {
    fn from(err: serde_json::Error) -> Self {
        OrderError::PersistenceFailure(format!("failed to encode lifecycle event: {}", err))
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        matches!(self, OrderError::ConcurrentUpdate { .. })
    }
}
