use uuid::Uuid;

use super::value_objects::{Actor, LineRequest, OrderStatus};

// ============================================================================
// Order Commands - caller intent, identity already established
// ============================================================================

#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub buyer_id: Uuid,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub items: Vec<LineRequest>,
    pub correlation_id: Uuid,
}

impl PlaceOrder {
    pub fn new(buyer_id: Uuid, delivery_address: impl Into<String>, items: Vec<LineRequest>) -> Self {
        Self {
            buyer_id,
            delivery_address: delivery_address.into(),
            notes: None,
            items,
            correlation_id: Uuid::new_v4(),
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChangeOrderStatus {
    pub order_id: Uuid,
    pub actor: Actor,
    pub new_status: OrderStatus,
    pub correlation_id: Uuid,
}

impl ChangeOrderStatus {
    pub fn new(order_id: Uuid, actor: Actor, new_status: OrderStatus) -> Self {
        Self {
            order_id,
            actor,
            new_status,
            correlation_id: Uuid::new_v4(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListOrders {
    pub actor: Actor,
    pub page: u32,
    pub size: u32,
}

impl ListOrders {
    pub const MAX_PAGE_SIZE: u32 = 100;
    pub const DEFAULT_PAGE_SIZE: u32 = 20;

    pub fn new(actor: Actor, page: Option<u32>, size: Option<u32>) -> Self {
        Self {
            actor,
            page: page.unwrap_or(0),
            size: size
                .unwrap_or(Self::DEFAULT_PAGE_SIZE)
                .clamp(1, Self::MAX_PAGE_SIZE),
        }
    }
}
