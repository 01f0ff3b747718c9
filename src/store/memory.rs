use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{MarketStore, Page, StoreError, UnitOfWork};
use crate::domain::inventory::{Product, ProductStatus};
use crate::domain::order::{Order, OrderAggregate, OrderItem, OrderStatus};
use crate::outbox::{DeadLetter, OutboxMessage};

// ============================================================================
// In-Memory Store - same locking contract as Postgres, inside one process
// ============================================================================
//
// Row locks are per-key async mutexes held by the unit until it ends.
// Committed state sits behind one RwLock and a commit applies all staged
// writes under a single write guard, so readers see a unit entirely or not
// at all.
//
// Lock order inside a unit: products (ascending id), then the order row.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Product(Uuid),
    Order(Uuid),
}

#[derive(Debug, Clone)]
struct OutboxRecord {
    message: OutboxMessage,
    published_at: Option<DateTime<Utc>>,
    dead: bool,
}

#[derive(Debug, Default)]
struct Tables {
    products: BTreeMap<Uuid, Product>,
    orders: HashMap<Uuid, OrderAggregate>,
    outbox: BTreeMap<Uuid, OutboxRecord>,
    dead_letters: Vec<DeadLetter>,
}

#[derive(Default)]
struct Shared {
    tables: RwLock<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
    fail_next_commit: AtomicBool,
    commit_ack_delay_ms: AtomicU64,
}

impl Shared {
    fn read(&self) -> std::sync::RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn row_lock(&self, key: RowKey) -> Arc<RowMutex<()>> {
        let mut locks = self.row_locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key).or_default().clone()
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next commit fail after all writes were staged.
    pub fn fail_next_commit(&self) {
        self.shared.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Hold back every commit acknowledgement after the data is applied,
    /// like a database whose COMMIT reply is slow to arrive.
    pub fn delay_commit_acks(&self, delay: Duration) {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.shared.commit_ack_delay_ms.store(millis, Ordering::SeqCst);
    }

    pub fn order_count(&self) -> usize {
        self.shared.read().orders.len()
    }
}

fn page_of(mut orders: Vec<Order>, page: Page) -> Vec<Order> {
    orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at).then_with(|| b.id.cmp(&a.id)));
    orders.into_iter().skip(page.offset()).take(page.limit()).collect()
}

#[async_trait]
impl MarketStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnit {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            products: HashMap::new(),
            new_orders: Vec::new(),
            status_updates: HashMap::new(),
            outbox: Vec::new(),
        }))
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.shared.read().products.get(&product_id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        let lock = self.shared.row_lock(RowKey::Product(product.id));
        let _guard = lock.lock().await;
        self.shared.write().products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
        Ok(self.shared.read().orders.get(&order_id).cloned())
    }

    async fn suppliers_of(&self, order_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let tables = self.shared.read();
        let Some(aggregate) = tables.orders.get(&order_id) else {
            return Ok(Vec::new());
        };

        let mut farmers: Vec<Uuid> = aggregate
            .items
            .iter()
            .filter_map(|item| tables.products.get(&item.product_id))
            .map(|product| product.farmer_id)
            .collect();
        farmers.sort();
        farmers.dedup();
        Ok(farmers)
    }

    async fn list_orders_for_buyer(&self, buyer_id: Uuid, page: Page) -> Result<Vec<Order>, StoreError> {
        let orders = self
            .shared
            .read()
            .orders
            .values()
            .filter(|aggregate| aggregate.order.buyer_id == buyer_id)
            .map(|aggregate| aggregate.order.clone())
            .collect();
        Ok(page_of(orders, page))
    }

    async fn list_orders_for_farmer(&self, farmer_id: Uuid, page: Page) -> Result<Vec<Order>, StoreError> {
        let tables = self.shared.read();
        let orders = tables
            .orders
            .values()
            .filter(|aggregate| {
                aggregate.items.iter().any(|item| {
                    tables
                        .products
                        .get(&item.product_id)
                        .is_some_and(|product| product.farmer_id == farmer_id)
                })
            })
            .map(|aggregate| aggregate.order.clone())
            .collect();
        Ok(page_of(orders, page))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        Ok(self
            .shared
            .read()
            .outbox
            .values()
            .filter(|record| record.published_at.is_none() && !record.dead)
            .take(limit)
            .map(|record| record.message.clone())
            .collect())
    }

    async fn mark_outbox_published(&self, message_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.shared.write();
        let record = tables
            .outbox
            .get_mut(&message_id)
            .ok_or_else(|| StoreError::Backend(format!("outbox message {} not found", message_id)))?;
        record.published_at = Some(Utc::now());
        Ok(())
    }

    async fn record_outbox_failure(&self, message_id: Uuid, error: &str) -> Result<(), StoreError> {
        let mut tables = self.shared.write();
        if let Some(record) = tables.outbox.get_mut(&message_id) {
            record.message.attempts += 1;
            record.message.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn record_dead_letter(&self, dead_letter: &DeadLetter) -> Result<(), StoreError> {
        let mut tables = self.shared.write();
        if let Some(record) = tables.outbox.get_mut(&dead_letter.message_id) {
            record.dead = true;
        }
        tables.dead_letters.push(dead_letter.clone());
        Ok(())
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError> {
        Ok(self
            .shared
            .read()
            .dead_letters
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// Unit of Work
// ============================================================================

struct StagedStatus {
    expected_version: i64,
    status: OrderStatus,
    at: DateTime<Utc>,
}

struct MemoryUnit {
    shared: Arc<Shared>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    /// Locked products, with any staged stock write applied.
    products: HashMap<Uuid, Product>,
    new_orders: Vec<OrderAggregate>,
    status_updates: HashMap<Uuid, StagedStatus>,
    outbox: Vec<OutboxMessage>,
}

impl MemoryUnit {
    async fn acquire(&mut self, key: RowKey) {
        if self.guards.contains_key(&key) {
            return;
        }
        let guard = self.shared.row_lock(key).lock_owned().await;
        self.guards.insert(key, guard);
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnit {
    async fn lock_product(&mut self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        if let Some(product) = self.products.get(&product_id) {
            return Ok(Some(product.clone()));
        }

        self.acquire(RowKey::Product(product_id)).await;

        let committed = self.shared.read().products.get(&product_id).cloned();
        if let Some(product) = &committed {
            self.products.insert(product_id, product.clone());
        }
        Ok(committed)
    }

    async fn write_product_stock(
        &mut self,
        product_id: Uuid,
        quantity_available: i32,
        status: ProductStatus,
    ) -> Result<(), StoreError> {
        if quantity_available < 0 {
            return Err(StoreError::Backend(format!(
                "negative stock {} for product {}",
                quantity_available, product_id
            )));
        }
        let product = self.products.get_mut(&product_id).ok_or_else(|| {
            StoreError::Backend(format!("product {} written without holding its lock", product_id))
        })?;
        product.quantity_available = quantity_available;
        product.status = status;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError> {
        let exists = self.shared.read().orders.contains_key(&order.id)
            || self.new_orders.iter().any(|staged| staged.order.id == order.id);
        if exists {
            return Err(StoreError::Backend(format!("order {} already exists", order.id)));
        }
        self.new_orders
            .push(OrderAggregate::new(order.clone(), items.to_vec()));
        Ok(())
    }

    async fn load_order(&mut self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
        let staged = self
            .new_orders
            .iter()
            .find(|staged| staged.order.id == order_id)
            .cloned();
        let mut aggregate = match staged {
            Some(aggregate) => aggregate,
            None => match self.shared.read().orders.get(&order_id) {
                Some(aggregate) => aggregate.clone(),
                None => return Ok(None),
            },
        };

        if let Some(update) = self.status_updates.get(&order_id) {
            aggregate.order.status = update.status;
            aggregate.order.version = update.expected_version + 1;
            aggregate.order.updated_at = update.at;
        }
        Ok(Some(aggregate))
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        expected_version: i64,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.acquire(RowKey::Order(order_id)).await;

        let current = match self.status_updates.get(&order_id) {
            Some(update) => Some(update.expected_version + 1),
            None => self
                .shared
                .read()
                .orders
                .get(&order_id)
                .map(|aggregate| aggregate.order.version),
        };

        if current != Some(expected_version) {
            return Ok(false);
        }

        self.status_updates.insert(
            order_id,
            StagedStatus {
                expected_version,
                status,
                at,
            },
        );
        Ok(true)
    }

    async fn enqueue_event(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        self.outbox.push(message.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        if self.shared.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }

        let MemoryUnit {
            shared,
            guards,
            products,
            new_orders,
            status_updates,
            outbox,
        } = *self;

        {
            let mut tables = shared.write();

            for (id, product) in products {
                tables.products.insert(id, product);
            }
            for aggregate in new_orders {
                tables.orders.insert(aggregate.order.id, aggregate);
            }
            for (order_id, update) in status_updates {
                if let Some(aggregate) = tables.orders.get_mut(&order_id) {
                    aggregate.order.status = update.status;
                    aggregate.order.version = update.expected_version + 1;
                    aggregate.order.updated_at = update.at;
                }
            }
            for message in outbox {
                tables.outbox.insert(
                    message.id,
                    OutboxRecord {
                        message,
                        published_at: None,
                        dead: false,
                    },
                );
            }
        }

        drop(guards);

        let ack_delay = shared.commit_ack_delay_ms.load(Ordering::SeqCst);
        if ack_delay > 0 {
            tokio::time::sleep(Duration::from_millis(ack_delay)).await;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn product(quantity: i32) -> Product {
        Product::listed(Uuid::new_v4(), "Honey", Decimal::new(900, 2), quantity)
    }

    fn order_for(buyer_id: Uuid, product_id: Uuid) -> (Order, Vec<OrderItem>) {
        let now = Utc::now();
        let order = Order {
            id: Uuid::new_v4(),
            buyer_id,
            status: OrderStatus::Pending,
            total_amount: Decimal::new(900, 2),
            delivery_address: "1 Hive Street".to_string(),
            notes: None,
            placed_at: now,
            updated_at: now,
            version: 1,
        };
        let items = vec![OrderItem {
            id: Uuid::new_v4(),
            order_id: order.id,
            product_id,
            quantity: 1,
            unit_price_snapshot: Decimal::new(900, 2),
        }];
        (order, items)
    }

    #[tokio::test]
    async fn test_uncommitted_writes_are_invisible() {
        let store = MemoryStore::new();
        let honey = product(3);
        store.upsert_product(&honey).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.lock_product(honey.id).await.unwrap();
        uow.write_product_stock(honey.id, 1, ProductStatus::Available).await.unwrap();

        assert_eq!(store.get_product(honey.id).await.unwrap().unwrap().quantity_available, 3);

        uow.commit().await.unwrap();
        assert_eq!(store.get_product(honey.id).await.unwrap().unwrap().quantity_available, 1);
    }

    #[tokio::test]
    async fn test_dropped_unit_releases_lock_and_discards_writes() {
        let store = MemoryStore::new();
        let honey = product(3);
        store.upsert_product(&honey).await.unwrap();

        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_product(honey.id).await.unwrap();
            uow.write_product_stock(honey.id, 0, ProductStatus::OutOfStock).await.unwrap();
        }

        let mut next = store.begin().await.unwrap();
        let locked = tokio::time::timeout(Duration::from_secs(1), next.lock_product(honey.id))
            .await
            .expect("lock should be free after drop")
            .unwrap()
            .unwrap();
        assert_eq!(locked.quantity_available, 3);
    }

    #[tokio::test]
    async fn test_second_unit_waits_for_row_lock() {
        let store = MemoryStore::new();
        let honey = product(3);
        store.upsert_product(&honey).await.unwrap();

        let mut first = store.begin().await.unwrap();
        first.lock_product(honey.id).await.unwrap();

        let contender = store.clone();
        let id = honey.id;
        let waiter = tokio::spawn(async move {
            let mut second = contender.begin().await.unwrap();
            let seen = second.lock_product(id).await.unwrap().unwrap();
            seen.quantity_available
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        first.write_product_stock(honey.id, 2, ProductStatus::Available).await.unwrap();
        first.commit().await.unwrap();

        assert_eq!(waiter.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_writing_unlocked_product_is_rejected() {
        let store = MemoryStore::new();
        let mut uow = store.begin().await.unwrap();
        assert!(uow
            .write_product_stock(Uuid::new_v4(), 1, ProductStatus::Available)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_status_update_checks_version() {
        let store = MemoryStore::new();
        let honey = product(3);
        store.upsert_product(&honey).await.unwrap();
        let (order, items) = order_for(Uuid::new_v4(), honey.id);

        let mut uow = store.begin().await.unwrap();
        uow.insert_order(&order, &items).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert!(!uow
            .update_order_status(order.id, 7, OrderStatus::Confirmed, Utc::now())
            .await
            .unwrap());
        assert!(uow
            .update_order_status(order.id, 1, OrderStatus::Confirmed, Utc::now())
            .await
            .unwrap());
        let staged = uow.load_order(order.id).await.unwrap().unwrap();
        assert_eq!(staged.order.version, 2);
        uow.commit().await.unwrap();

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.order.status, OrderStatus::Confirmed);
        assert_eq!(stored.order.version, 2);
    }

    #[tokio::test]
    async fn test_injected_commit_failure_applies_nothing() {
        let store = MemoryStore::new();
        let honey = product(3);
        store.upsert_product(&honey).await.unwrap();
        let (order, items) = order_for(Uuid::new_v4(), honey.id);

        store.fail_next_commit();
        let mut uow = store.begin().await.unwrap();
        uow.lock_product(honey.id).await.unwrap();
        uow.write_product_stock(honey.id, 2, ProductStatus::Available).await.unwrap();
        uow.insert_order(&order, &items).await.unwrap();
        assert!(uow.commit().await.is_err());

        assert_eq!(store.order_count(), 0);
        assert_eq!(store.get_product(honey.id).await.unwrap().unwrap().quantity_available, 3);
    }

    #[tokio::test]
    async fn test_listing_and_suppliers() {
        let store = MemoryStore::new();
        let honey = product(3);
        store.upsert_product(&honey).await.unwrap();
        let buyer = Uuid::new_v4();

        for _ in 0..3 {
            let (order, items) = order_for(buyer, honey.id);
            let mut uow = store.begin().await.unwrap();
            uow.insert_order(&order, &items).await.unwrap();
            uow.commit().await.unwrap();
        }

        let first_page = store.list_orders_for_buyer(buyer, Page::new(0, 2)).await.unwrap();
        assert_eq!(first_page.len(), 2);
        assert!(first_page[0].placed_at >= first_page[1].placed_at);
        assert_eq!(store.list_orders_for_buyer(buyer, Page::new(1, 2)).await.unwrap().len(), 1);

        let farmer_orders = store
            .list_orders_for_farmer(honey.farmer_id, Page::new(0, 10))
            .await
            .unwrap();
        assert_eq!(farmer_orders.len(), 3);
        assert!(store
            .list_orders_for_farmer(Uuid::new_v4(), Page::new(0, 10))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(store.suppliers_of(farmer_orders[0].id).await.unwrap(), vec![honey.farmer_id]);
    }
}
