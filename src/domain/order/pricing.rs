use rust_decimal::Decimal;
use uuid::Uuid;

use super::aggregate::sum_line_totals;
use super::errors::OrderError;
use super::value_objects::OrderItem;
use crate::domain::inventory::Reservation;

/// Items and total priced from the reservations' captured unit prices.
#[derive(Debug, Clone, PartialEq)]
pub struct PricedOrder {
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
}

/// Freeze prices at placement. The result is never recomputed from the catalog.
pub fn snapshot(order_id: Uuid, reservations: &[Reservation]) -> Result<PricedOrder, OrderError> {
    let items: Vec<OrderItem> = reservations
        .iter()
        .map(|reservation| OrderItem {
            id: Uuid::new_v4(),
            order_id,
            product_id: reservation.product_id,
            quantity: reservation.quantity,
            unit_price_snapshot: reservation.unit_price,
        })
        .collect();

    let total_amount = sum_line_totals(&items)
        .ok_or_else(|| OrderError::InvalidRequest("order total is too large to represent".to_string()))?;

    Ok(PricedOrder { items, total_amount })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(cents: i64, quantity: i32) -> Reservation {
        Reservation {
            product_id: Uuid::new_v4(),
            farmer_id: Uuid::new_v4(),
            quantity,
            unit_price: Decimal::new(cents, 2),
            remaining: 0,
        }
    }

    #[test]
    fn test_snapshot_totals_exactly() {
        let order_id = Uuid::new_v4();
        // 0.10 * 3 must not drift the way binary floats would
        let priced = snapshot(order_id, &[reservation(10, 3), reservation(1999, 2)]).unwrap();

        assert_eq!(priced.total_amount, Decimal::new(4028, 2));
        assert_eq!(priced.items.len(), 2);
        assert!(priced.items.iter().all(|item| item.order_id == order_id));
    }

    #[test]
    fn test_snapshot_copies_price_per_line() {
        let lines = [reservation(475, 1)];
        let priced = snapshot(Uuid::new_v4(), &lines).unwrap();

        assert_eq!(priced.items[0].unit_price_snapshot, Decimal::new(475, 2));
        assert_eq!(priced.items[0].product_id, lines[0].product_id);
    }

    #[test]
    fn test_snapshot_rejects_total_overflow() {
        let mut costly = reservation(0, i32::MAX);
        costly.unit_price = Decimal::MAX;
        assert!(matches!(
            snapshot(Uuid::new_v4(), &[costly]),
            Err(OrderError::InvalidRequest(_))
        ));

        // each line fits on its own, the sum does not
        let mut half = reservation(0, 1);
        half.unit_price = Decimal::MAX;
        assert!(matches!(
            snapshot(Uuid::new_v4(), &[half.clone(), half]),
            Err(OrderError::InvalidRequest(_))
        ));
    }
}
