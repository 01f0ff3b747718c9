use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{Order, OrderItem};

// ============================================================================
// Order Aggregate - the order plus its items, one consistency unit
// ============================================================================
//
// Items hold only identifiers (order id, product id). Product details and
// supplying farmers are looked up on demand, never carried as a live graph.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

impl OrderAggregate {
    pub fn new(order: Order, items: Vec<OrderItem>) -> Self {
        Self { order, items }
    }

    pub fn id(&self) -> Uuid {
        self.order.id
    }

    /// Sum of snapshot price times quantity over all items, `None` on overflow.
    pub fn computed_total(&self) -> Option<Decimal> {
        sum_line_totals(&self.items)
    }

    /// The stored total must equal the snapshot sum and every item must
    /// belong to this order with a positive quantity.
    pub fn is_consistent(&self) -> bool {
        !self.items.is_empty()
            && self.computed_total() == Some(self.order.total_amount)
            && self
                .items
                .iter()
                .all(|item| item.order_id == self.order.id && item.quantity > 0)
    }

    /// Items sorted by product id, the lock order used for restocking.
    pub fn items_in_lock_order(&self) -> Vec<&OrderItem> {
        let mut items: Vec<&OrderItem> = self.items.iter().collect();
        items.sort_by_key(|item| item.product_id);
        items
    }
}

pub(crate) fn sum_line_totals(items: &[OrderItem]) -> Option<Decimal> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.line_total()?))
}
