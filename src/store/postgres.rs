use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{MarketStore, Page, StoreError, UnitOfWork};
use crate::domain::inventory::{Product, ProductStatus};
use crate::domain::order::{Order, OrderAggregate, OrderItem, OrderStatus};
use crate::outbox::{DeadLetter, OutboxMessage};

const SCHEMA: &str = include_str!("../../migrations/001_marketplace.sql");

const PRODUCT_COLUMNS: &str =
    "id, farmer_id, name, unit_price, quantity_available, status, updated_at";

const ORDER_COLUMNS: &str =
    "id, buyer_id, status, total_amount, delivery_address, notes, order_date, updated_at, version";

const OUTBOX_COLUMNS: &str = "id, aggregate_id, event_id, event_type, topic, partition_key, \
     payload, correlation_id, created_at, attempts, last_error";

// ============================================================================
// Postgres Store
// ============================================================================
//
// One sqlx transaction per unit of work. Stock rows are locked with
// SELECT ... FOR UPDATE and status writes are guarded by the version column.
//
// ============================================================================

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        tracing::info!(max_connections = max_connections, "✅ Connected to Postgres");
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    pub async fn apply_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        tracing::info!("Marketplace schema ready");
        Ok(())
    }
}

fn parse_column<T: FromStr<Err = String>>(raw: &str) -> Result<T, StoreError> {
    raw.parse::<T>().map_err(StoreError::CorruptRow)
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Product {
        id: row.try_get("id")?,
        farmer_id: row.try_get("farmer_id")?,
        name: row.try_get("name")?,
        unit_price: row.try_get("unit_price")?,
        quantity_available: row.try_get("quantity_available")?,
        status: parse_column(&status)?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        buyer_id: row.try_get("buyer_id")?,
        status: parse_column(&status)?,
        total_amount: row.try_get("total_amount")?,
        delivery_address: row.try_get("delivery_address")?,
        notes: row.try_get("notes")?,
        placed_at: row.try_get("order_date")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        unit_price_snapshot: row.try_get("unit_price_snapshot")?,
    })
}

fn outbox_from_row(row: &PgRow) -> Result<OutboxMessage, StoreError> {
    Ok(OutboxMessage {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_id: row.try_get("event_id")?,
        event_type: row.try_get("event_type")?,
        topic: row.try_get("topic")?,
        partition_key: row.try_get("partition_key")?,
        payload: row.try_get("payload")?,
        correlation_id: row.try_get("correlation_id")?,
        created_at: row.try_get("created_at")?,
        attempts: row.try_get("attempts")?,
        last_error: row.try_get("last_error")?,
    })
}

fn dead_letter_from_row(row: &PgRow) -> Result<DeadLetter, StoreError> {
    Ok(DeadLetter {
        id: row.try_get("id")?,
        message_id: row.try_get("message_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        topic: row.try_get("topic")?,
        payload: row.try_get("payload")?,
        error_message: row.try_get("error_message")?,
        attempts: row.try_get("attempts")?,
        failed_at: row.try_get("failed_at")?,
    })
}

fn page_bounds(page: Page) -> (i64, i64) {
    (page.limit() as i64, page.offset() as i64)
}

#[async_trait]
impl MarketStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn get_product(&self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn upsert_product(&self, product: &Product) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, farmer_id, name, unit_price, quantity_available, status, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET farmer_id = EXCLUDED.farmer_id,
                name = EXCLUDED.name,
                unit_price = EXCLUDED.unit_price,
                quantity_available = EXCLUDED.quantity_available,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(product.id)
        .bind(product.farmer_id)
        .bind(&product.name)
        .bind(product.unit_price)
        .bind(product.quantity_available)
        .bind(product.status.as_str())
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
        // REPEATABLE READ keeps the order row and its items from one snapshot
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;
        let aggregate = load_aggregate(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(aggregate)
    }

    async fn suppliers_of(&self, order_id: Uuid) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT p.farmer_id
            FROM order_items oi
            JOIN products p ON p.id = oi.product_id
            WHERE oi.order_id = $1
            ORDER BY p.farmer_id
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<Uuid, _>("farmer_id").map_err(StoreError::from))
            .collect()
    }

    async fn list_orders_for_buyer(&self, buyer_id: Uuid, page: Page) -> Result<Vec<Order>, StoreError> {
        let (limit, offset) = page_bounds(page);
        let sql = format!(
            "SELECT {} FROM orders WHERE buyer_id = $1 ORDER BY order_date DESC, id DESC LIMIT $2 OFFSET $3",
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(buyer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_orders_for_farmer(&self, farmer_id: Uuid, page: Page) -> Result<Vec<Order>, StoreError> {
        let (limit, offset) = page_bounds(page);
        let sql = format!(
            r#"
            SELECT {} FROM orders o
            WHERE EXISTS (
                SELECT 1 FROM order_items oi
                JOIN products p ON p.id = oi.product_id
                WHERE oi.order_id = o.id AND p.farmer_id = $1
            )
            ORDER BY o.order_date DESC, o.id DESC
            LIMIT $2 OFFSET $3
            "#,
            ORDER_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(farmer_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>, StoreError> {
        let sql = format!(
            "SELECT {} FROM outbox_messages \
             WHERE published_at IS NULL AND NOT dead_lettered \
             ORDER BY id LIMIT $1",
            OUTBOX_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(outbox_from_row).collect()
    }

    async fn mark_outbox_published(&self, message_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE outbox_messages SET published_at = now() WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_outbox_failure(&self, message_id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE outbox_messages SET attempts = attempts + 1, last_error = $2 WHERE id = $1",
        )
        .bind(message_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_dead_letter(&self, dead_letter: &DeadLetter) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO dead_letter_queue
                (id, message_id, aggregate_id, event_type, topic, payload, error_message, attempts, failed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(dead_letter.id)
        .bind(dead_letter.message_id)
        .bind(dead_letter.aggregate_id)
        .bind(&dead_letter.event_type)
        .bind(&dead_letter.topic)
        .bind(&dead_letter.payload)
        .bind(&dead_letter.error_message)
        .bind(dead_letter.attempts)
        .bind(dead_letter.failed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE outbox_messages SET dead_lettered = TRUE WHERE id = $1")
            .bind(dead_letter.message_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetter>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_id, aggregate_id, event_type, topic, payload, error_message, attempts, failed_at
            FROM dead_letter_queue
            ORDER BY failed_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(dead_letter_from_row).collect()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

async fn load_aggregate(
    tx: &mut Transaction<'static, Postgres>,
    order_id: Uuid,
) -> Result<Option<OrderAggregate>, StoreError> {
    let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
    let Some(row) = sqlx::query(&sql)
        .bind(order_id)
        .fetch_optional(&mut **tx)
        .await?
    else {
        return Ok(None);
    };
    let order = order_from_row(&row)?;

    let item_rows = sqlx::query(
        r#"
        SELECT id, order_id, product_id, quantity, unit_price_snapshot
        FROM order_items
        WHERE order_id = $1
        ORDER BY product_id
        "#,
    )
    .bind(order_id)
    .fetch_all(&mut **tx)
    .await?;
    let items = item_rows
        .iter()
        .map(item_from_row)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(OrderAggregate::new(order, items)))
}

// ============================================================================
// Unit of Work
// ============================================================================

/// Dropping the transaction without commit rolls it back.
struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_product(&mut self, product_id: Uuid) -> Result<Option<Product>, StoreError> {
        let sql = format!("SELECT {} FROM products WHERE id = $1 FOR UPDATE", PRODUCT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(product_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(product_from_row).transpose()
    }

    async fn write_product_stock(
        &mut self,
        product_id: Uuid,
        quantity_available: i32,
        status: ProductStatus,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE products SET quantity_available = $2, status = $3, updated_at = now() WHERE id = $1",
        )
        .bind(product_id)
        .bind(quantity_available)
        .bind(status.as_str())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Backend(format!(
                "stock write for product {} touched {} rows",
                product_id,
                result.rows_affected()
            )));
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, items: &[OrderItem]) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO orders
                (id, buyer_id, status, total_amount, delivery_address, notes, order_date, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id)
        .bind(order.buyer_id)
        .bind(order.status.as_str())
        .bind(order.total_amount)
        .bind(&order.delivery_address)
        .bind(&order.notes)
        .bind(order.placed_at)
        .bind(order.updated_at)
        .bind(order.version)
        .execute(&mut *self.tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_snapshot)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.unit_price_snapshot)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn load_order(&mut self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
        load_aggregate(&mut self.tx, order_id).await
    }

    async fn update_order_status(
        &mut self,
        order_id: Uuid,
        expected_version: i64,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = $4, version = version + 1
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(order_id)
        .bind(expected_version)
        .bind(status.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn enqueue_event(&mut self, message: &OutboxMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO outbox_messages
                (id, aggregate_id, event_id, event_type, topic, partition_key,
                 payload, correlation_id, created_at, attempts)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(message.id)
        .bind(message.aggregate_id)
        .bind(message.event_id)
        .bind(&message.event_type)
        .bind(&message.topic)
        .bind(&message.partition_key)
        .bind(&message.payload)
        .bind(message.correlation_id)
        .bind(message.created_at)
        .bind(message.attempts)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
