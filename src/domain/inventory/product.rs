use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Product - catalog row as seen by the order core
// ============================================================================
//
// The catalog service owns everything else about a product (description,
// category, images). The core only needs identity, owner, price and stock.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Available,
    OutOfStock,
    /// Explicitly delisted by its farmer; never flipped by stock changes.
    Unlisted,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductStatus::Available => "AVAILABLE",
            ProductStatus::OutOfStock => "OUT_OF_STOCK",
            ProductStatus::Unlisted => "UNLISTED",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProductStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(ProductStatus::Available),
            "OUT_OF_STOCK" => Ok(ProductStatus::OutOfStock),
            "UNLISTED" => Ok(ProductStatus::Unlisted),
            other => Err(format!("unknown product status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub farmer_id: Uuid,
    pub name: String,
    pub unit_price: Decimal,
    pub quantity_available: i32,
    pub status: ProductStatus,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// A freshly listed product; status follows the stock level.
    pub fn listed(farmer_id: Uuid, name: impl Into<String>, unit_price: Decimal, quantity: i32) -> Self {
        Self {
            id: Uuid::new_v4(),
            farmer_id,
            name: name.into(),
            unit_price,
            quantity_available: quantity,
            status: if quantity > 0 {
                ProductStatus::Available
            } else {
                ProductStatus::OutOfStock
            },
            updated_at: Utc::now(),
        }
    }

    /// Listed products can be ordered whenever they have stock.
    pub fn is_listed(&self) -> bool {
        self.status != ProductStatus::Unlisted
    }
}
