use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{ActorRole, LineRequest, OrderItem, OrderStatus};
use crate::outbox::DomainEvent;

// ============================================================================
// Order Events - written to the outbox in the same unit of work as the change
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Placed(e) => e.order_id,
            OrderEvent::StatusChanged(e) => e.order_id,
        }
    }
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "OrderPlaced",
            OrderEvent::StatusChanged(_) => "OrderStatusChanged",
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.order_id()
    }
}

/// Order Placed - stock reserved, prices frozen
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlaced {
    pub order_id: Uuid,
    pub buyer_id: Uuid,
    pub total_amount: Decimal,
    pub items: Vec<OrderItem>,
    /// Distinct supplying farmers, for downstream notifications.
    pub farmer_ids: Vec<Uuid>,
    pub placed_at: DateTime<Utc>,
}

/// Order Status Changed - one applied lifecycle transition
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub actor_id: Uuid,
    pub actor_role: ActorRole,
    /// Quantities returned to stock; empty unless the order was cancelled.
    pub restocked: Vec<LineRequest>,
    pub version: i64,
    pub changed_at: DateTime<Utc>,
}
