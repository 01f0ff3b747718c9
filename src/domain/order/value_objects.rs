use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown order status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorRole {
    Buyer,
    Farmer,
    /// Marketplace staff; the only role that may issue refunds.
    Operator,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Buyer => "BUYER",
            ActorRole::Farmer => "FARMER",
            ActorRole::Operator => "OPERATOR",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUYER" => Ok(ActorRole::Buyer),
            "FARMER" => Ok(ActorRole::Farmer),
            "OPERATOR" => Ok(ActorRole::Operator),
            _ => Err(format!("unknown actor role '{}'", s)),
        }
    }
}

/// Authenticated caller, as established by the auth collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl Actor {
    pub fn buyer(id: Uuid) -> Self {
        Self { id, role: ActorRole::Buyer }
    }

    pub fn farmer(id: Uuid) -> Self {
        Self { id, role: ActorRole::Farmer }
    }

    pub fn operator(id: Uuid) -> Self {
        Self { id, role: ActorRole::Operator }
    }
}

/// One requested line of a placement.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price_snapshot: Decimal,
}

impl OrderItem {
    /// Snapshot price times quantity, `None` when the product overflows.
    pub fn line_total(&self) -> Option<Decimal> {
        self.unit_price_snapshot.checked_mul(Decimal::from(self.quantity))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: Uuid,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub delivery_address: String,
    pub notes: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Optimistic concurrency token, bumped on every status change.
    pub version: i64,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_parses_case_insensitively() {
        assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert_eq!("REFUNDED".parse::<OrderStatus>().unwrap(), OrderStatus::Refunded);
        assert!("LOST".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_actor_role_parsing() {
        assert_eq!("farmer".parse::<ActorRole>().unwrap(), ActorRole::Farmer);
        assert_eq!("OPERATOR".parse::<ActorRole>().unwrap(), ActorRole::Operator);
        assert!("admin".parse::<ActorRole>().is_err());
    }

    #[test]
    fn test_line_total_uses_snapshot_price() {
        let item = OrderItem {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            quantity: 3,
            unit_price_snapshot: Decimal::new(1999, 2),
        };
        assert_eq!(item.line_total(), Some(Decimal::new(5997, 2)));

        let huge = OrderItem {
            quantity: 2,
            unit_price_snapshot: Decimal::MAX,
            ..item
        };
        assert_eq!(huge.line_total(), None);
    }

    #[test]
    fn test_line_request_uses_camel_case_json() {
        let product_id = Uuid::new_v4();
        let json = format!(r#"{{"productId":"{}","quantity":2}}"#, product_id);
        let line: LineRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(line, LineRequest { product_id, quantity: 2 });
    }
}
