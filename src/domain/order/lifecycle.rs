use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{Actor, ActorRole, Order, OrderStatus};

// ============================================================================
// Order Lifecycle State Machine
// ============================================================================
//
//   PENDING ──► CONFIRMED ──► PROCESSING ──► SHIPPED ──► DELIVERED ──► REFUNDED
//      │            │
//      └──► CANCELLED ◄┘
//
// CANCELLED and REFUNDED are terminal; DELIVERED is terminal absent a refund.
//
// Checks run in this order: relationship to the order, role rule, table.
//
// ============================================================================

pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Pending => &[OrderStatus::Confirmed, OrderStatus::Cancelled],
        OrderStatus::Confirmed => &[OrderStatus::Processing, OrderStatus::Cancelled],
        OrderStatus::Processing => &[OrderStatus::Shipped],
        OrderStatus::Shipped => &[OrderStatus::Delivered],
        OrderStatus::Delivered => &[OrderStatus::Refunded],
        OrderStatus::Cancelled | OrderStatus::Refunded => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// A validated, not yet applied, status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: Uuid,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl StatusChange {
    /// Cancellation hands every reserved unit back to the ledger.
    pub fn restocks(&self) -> bool {
        self.to == OrderStatus::Cancelled
    }
}

/// True when the actor may read the order at all. Operators read any order
/// they are allowed to cancel or refund.
pub fn can_view(order: &Order, actor: &Actor, suppliers: &[Uuid]) -> bool {
    actor.role == ActorRole::Operator || order.buyer_id == actor.id || suppliers.contains(&actor.id)
}

pub fn plan_transition(
    order: &Order,
    actor: &Actor,
    suppliers: &[Uuid],
    to: OrderStatus,
) -> Result<StatusChange, OrderError> {
    let from = order.status;
    let action = format!("move order {} from {} to {}", order.id, from, to);

    let related = match actor.role {
        ActorRole::Buyer => actor.id == order.buyer_id,
        ActorRole::Farmer => suppliers.contains(&actor.id),
        ActorRole::Operator => true,
    };
    if !related {
        return Err(OrderError::forbidden(actor.id, action));
    }

    let role_permits = match actor.role {
        ActorRole::Buyer => from == OrderStatus::Pending && to == OrderStatus::Cancelled,
        ActorRole::Farmer => !matches!(to, OrderStatus::Cancelled | OrderStatus::Refunded),
        ActorRole::Operator => matches!(to, OrderStatus::Cancelled | OrderStatus::Refunded),
    };
    if !role_permits {
        return Err(OrderError::forbidden(actor.id, action));
    }

    if !can_transition(from, to) {
        return Err(OrderError::InvalidTransition {
            order_id: order.id,
            from,
            to,
        });
    }

    Ok(StatusChange {
        order_id: order.id,
        from,
        to,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn order_in(status: OrderStatus, buyer_id: Uuid) -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            buyer_id,
            status,
            total_amount: Decimal::new(1000, 2),
            delivery_address: "Farm Road 3".to_string(),
            notes: None,
            placed_at: now,
            updated_at: now,
            version: 1,
        }
    }

    #[test]
    fn test_transition_table() {
        use OrderStatus::*;
        let permitted = [
            (Pending, Confirmed),
            (Pending, Cancelled),
            (Confirmed, Processing),
            (Confirmed, Cancelled),
            (Processing, Shipped),
            (Shipped, Delivered),
            (Delivered, Refunded),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    can_transition(from, to),
                    permitted.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }

        assert!(allowed_targets(Cancelled).is_empty());
        assert!(allowed_targets(Refunded).is_empty());
    }

    #[test]
    fn test_buyer_may_cancel_pending_order() {
        let buyer = Uuid::new_v4();
        let order = order_in(OrderStatus::Pending, buyer);

        let change = plan_transition(&order, &Actor::buyer(buyer), &[], OrderStatus::Cancelled).unwrap();
        assert_eq!(change.from, OrderStatus::Pending);
        assert!(change.restocks());
    }

    #[test]
    fn test_buyer_is_forbidden_everything_else() {
        let buyer = Uuid::new_v4();
        let actor = Actor::buyer(buyer);

        let confirmed = order_in(OrderStatus::Confirmed, buyer);
        assert!(matches!(
            plan_transition(&confirmed, &actor, &[], OrderStatus::Cancelled),
            Err(OrderError::Forbidden { .. })
        ));

        let pending = order_in(OrderStatus::Pending, buyer);
        assert!(matches!(
            plan_transition(&pending, &actor, &[], OrderStatus::Confirmed),
            Err(OrderError::Forbidden { .. })
        ));

        let shipped = order_in(OrderStatus::Shipped, buyer);
        assert!(matches!(
            plan_transition(&shipped, &actor, &[], OrderStatus::Pending),
            Err(OrderError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_other_buyer_is_forbidden() {
        let order = order_in(OrderStatus::Pending, Uuid::new_v4());
        assert!(matches!(
            plan_transition(&order, &Actor::buyer(Uuid::new_v4()), &[], OrderStatus::Cancelled),
            Err(OrderError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_supplier_advances_order_forward() {
        let farmer = Uuid::new_v4();
        let actor = Actor::farmer(farmer);
        let mut order = order_in(OrderStatus::Pending, Uuid::new_v4());

        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            let change = plan_transition(&order, &actor, &[farmer], next).unwrap();
            assert!(!change.restocks());
            order.status = change.to;
        }
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn test_supplier_cannot_cancel_or_refund() {
        let farmer = Uuid::new_v4();
        let actor = Actor::farmer(farmer);

        let pending = order_in(OrderStatus::Pending, Uuid::new_v4());
        assert!(matches!(
            plan_transition(&pending, &actor, &[farmer], OrderStatus::Cancelled),
            Err(OrderError::Forbidden { .. })
        ));

        let delivered = order_in(OrderStatus::Delivered, Uuid::new_v4());
        assert!(matches!(
            plan_transition(&delivered, &actor, &[farmer], OrderStatus::Refunded),
            Err(OrderError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_supplier_backward_move_is_invalid_transition() {
        let farmer = Uuid::new_v4();
        let shipped = order_in(OrderStatus::Shipped, Uuid::new_v4());

        assert!(matches!(
            plan_transition(&shipped, &Actor::farmer(farmer), &[farmer], OrderStatus::Pending),
            Err(OrderError::InvalidTransition {
                from: OrderStatus::Shipped,
                to: OrderStatus::Pending,
                ..
            })
        ));
    }

    #[test]
    fn test_unrelated_farmer_is_forbidden() {
        let order = order_in(OrderStatus::Pending, Uuid::new_v4());
        let supplier = Uuid::new_v4();

        assert!(matches!(
            plan_transition(&order, &Actor::farmer(Uuid::new_v4()), &[supplier], OrderStatus::Confirmed),
            Err(OrderError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_operator_refunds_only_delivered_orders() {
        let operator = Actor::operator(Uuid::new_v4());

        let delivered = order_in(OrderStatus::Delivered, Uuid::new_v4());
        assert!(plan_transition(&delivered, &operator, &[], OrderStatus::Refunded).is_ok());

        let shipped = order_in(OrderStatus::Shipped, Uuid::new_v4());
        assert!(matches!(
            plan_transition(&shipped, &operator, &[], OrderStatus::Refunded),
            Err(OrderError::InvalidTransition { .. })
        ));
        assert!(matches!(
            plan_transition(&shipped, &operator, &[], OrderStatus::Delivered),
            Err(OrderError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_operator_may_cancel_confirmed_order() {
        let operator = Actor::operator(Uuid::new_v4());
        let confirmed = order_in(OrderStatus::Confirmed, Uuid::new_v4());

        let change = plan_transition(&confirmed, &operator, &[], OrderStatus::Cancelled).unwrap();
        assert!(change.restocks());

        let shipped = order_in(OrderStatus::Shipped, Uuid::new_v4());
        assert!(matches!(
            plan_transition(&shipped, &operator, &[], OrderStatus::Cancelled),
            Err(OrderError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn test_can_view() {
        let buyer = Uuid::new_v4();
        let farmer = Uuid::new_v4();
        let order = order_in(OrderStatus::Pending, buyer);

        assert!(can_view(&order, &Actor::buyer(buyer), &[farmer]));
        assert!(can_view(&order, &Actor::farmer(farmer), &[farmer]));
        assert!(!can_view(&order, &Actor::buyer(Uuid::new_v4()), &[farmer]));
        assert!(!can_view(&order, &Actor::farmer(Uuid::new_v4()), &[farmer]));
        assert!(can_view(&order, &Actor::operator(Uuid::new_v4()), &[farmer]));
    }
}
