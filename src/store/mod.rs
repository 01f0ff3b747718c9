use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::inventory::{Product, ProductStatus};
use crate::domain::order::{Order, OrderAggregate, OrderItem, OrderStatus};
use crate::outbox::{DeadLetter, OutboxMessage};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ============================================================================
// Market Store - persistence seam for products, orders and the outbox
// ============================================================================
//
// Everything that must be atomic goes through a UnitOfWork:
//
//   begin() ──► lock_product / write_product_stock / insert_order /
//               update_order_status / enqueue_event ──► commit()
//
// Locks taken by a unit are held until commit or rollback. Dropping a unit
// without committing discards every staged write.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

/// Zero-based page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u32,
    pub size: u32,
}

impl Page {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn offset(&self) -> usize {
        self.page as usize * self.size as usize
    }

    pub fn limit(&self) -> usize {
        self.size as usize
    }
}

#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a product and hold its row lock until the unit ends.
    async fn lock_product(&mut self, product_id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Stage a stock write for a product locked by this unit.
    async fn write_product_stock(
        &mut self,
        product_id: Uuid,
        quantity_available: i32,
        status: ProductStatus,
    ) -> Result<(), StoreError>;

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError>;

    async fn load_order(&mut self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError>;

    /// Compare-and-swap on the order version. Returns false when the stored
    /// version no longer matches `expected_version`.
    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        expected_version: i64,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn enqueue_event(&mut self, message: &OutboxMessage) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait MarketStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError>;

    /// Catalog collaborator entry point; also used for seeding.
    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError>;

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError>;

    /// Distinct farmers owning at least one product in the order.
    async fn suppliers_of(&self, order_id: Uuid) -> Result<Vec<Uuid>, StoreError>;

    async fn list_orders_for_buyer(&self, buyer_id: Uuid, page: Page) -> Result<Vec<Order>, StoreError>;

    async fn list_orders_for_farmer(&self, farmer_id: Uuid, page: Page) -> Result<Vec<Order>, StoreError>;

    /// Oldest unpublished outbox rows first.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError>;

    async fn mark_outbox_published(&self, message_id: Uuid) -> Result<(), StoreError>;

    /// Bump the attempt counter after a failed publish.
    async fn record_outbox_failure(&self, message_id: Uuid, error: &str) -> Result<(), StoreError>;

    /// Park a message in the dead letter queue and take it out of the outbox.
    async fn record_dead_letter(&self, dead_letter: &DeadLetter) -> Result<(), StoreError>;

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Roll a unit back after a failure. The original error is what callers
/// report, so a failed rollback is only logged.
pub async fn abort(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        tracing::warn!(error = %e, "Rollback failed; unit discarded");
    }
}
