use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::LedgerError;
use super::product::{Product, ProductStatus};
use crate::store::{abort, MarketStore, UnitOfWork};

// ============================================================================
// Inventory Ledger - the only writer of product stock
// ============================================================================
//
// Atomicity comes from the unit of work: `lock_product` holds the row lock
// until commit or rollback, so the check and the decrement below can never
// interleave with another reservation for the same product.
//
// Callers reserving several products must do so in ascending product id.
//
// ============================================================================

/// Stock granted to one placement attempt, with the price captured under lock.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub product_id: Uuid,
    pub farmer_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub remaining: i32,
}

/// Check-and-decrement on a locked row.
pub fn apply_reservation(product: &Product, quantity: i32) -> Result<Product, LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidQuantity(quantity));
    }
    // a sold-out row is a shortfall, not a delisting
    if !product.is_listed() {
        return Err(LedgerError::Unavailable {
            product_id: product.id,
            status: product.status,
        });
    }
    if product.quantity_available < quantity {
        return Err(LedgerError::InsufficientStock {
            product_id: product.id,
            requested: quantity,
            available: product.quantity_available,
        });
    }

    let mut updated = product.clone();
    updated.quantity_available -= quantity;
    if updated.quantity_available == 0 {
        updated.status = ProductStatus::OutOfStock;
    }
    updated.updated_at = Utc::now();
    Ok(updated)
}

/// Additive restock on a locked row. Delisted products stay delisted.
pub fn apply_release(product: &Product, quantity: i32) -> Result<Product, LedgerError> {
    if quantity <= 0 {
        return Err(LedgerError::InvalidQuantity(quantity));
    }

    let mut updated = product.clone();
    updated.quantity_available = updated
        .quantity_available
        .checked_add(quantity)
        .ok_or(LedgerError::InvalidQuantity(quantity))?;
    if updated.status == ProductStatus::OutOfStock {
        updated.status = ProductStatus::Available;
    }
    updated.updated_at = Utc::now();
    Ok(updated)
}

pub struct InventoryLedger {
    store: Arc<dyn MarketStore>,
}

impl InventoryLedger {
    pub fn new(store: Arc<dyn MarketStore>) -> Self {
        Self { store }
    }

    /// Reserve stock in its own unit of work.
    pub async fn reserve(&self, product_id: Uuid, quantity: i32) -> Result<Reservation, LedgerError> {
        let mut uow = self.store.begin().await?;
        match Self::reserve_in(uow.as_mut(), product_id, quantity).await {
            Ok(reservation) => {
                uow.commit().await?;
                Ok(reservation)
            }
            Err(e) => {
                abort(uow).await;
                Err(e)
            }
        }
    }

    /// Release stock in its own unit of work.
    pub async fn release(&self, product_id: Uuid, quantity: i32) -> Result<Product, LedgerError> {
        let mut uow = self.store.begin().await?;
        match Self::release_in(uow.as_mut(), product_id, quantity).await {
            Ok(product) => {
                uow.commit().await?;
                Ok(product)
            }
            Err(e) => {
                abort(uow).await;
                Err(e)
            }
        }
    }

    pub async fn reserve_in(
        uow: &mut dyn UnitOfWork,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Reservation, LedgerError> {
        let product = uow
            .lock_product(product_id)
            .await?
            .ok_or(LedgerError::NotFound(product_id))?;

        let updated = apply_reservation(&product, quantity)?;
        uow.write_product_stock(product_id, updated.quantity_available, updated.status)
            .await?;

        tracing::debug!(
            product_id = %product_id,
            quantity = quantity,
            remaining = updated.quantity_available,
            status = %updated.status,
            "Reserved stock"
        );

        Ok(Reservation {
            product_id,
            farmer_id: product.farmer_id,
            quantity,
            unit_price: product.unit_price,
            remaining: updated.quantity_available,
        })
    }

    pub async fn release_in(
        uow: &mut dyn UnitOfWork,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<Product, LedgerError> {
        let product = uow
            .lock_product(product_id)
            .await?
            .ok_or(LedgerError::NotFound(product_id))?;

        let updated = apply_release(&product, quantity)?;
        uow.write_product_stock(product_id, updated.quantity_available, updated.status)
            .await?;

        tracing::debug!(
            product_id = %product_id,
            quantity = quantity,
            available = updated.quantity_available,
            "Released stock"
        );

        Ok(updated)
    }
}
