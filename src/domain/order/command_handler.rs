use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

use super::aggregate::OrderAggregate;
use super::commands::{ChangeOrderStatus, ListOrders, PlaceOrder};
use super::errors::OrderError;
use super::events::{OrderEvent, OrderPlaced, OrderStatusChanged};
use super::lifecycle::{self, StatusChange};
use super::pricing;
use super::value_objects::{Actor, ActorRole, LineRequest, Order, OrderStatus};
use crate::domain::inventory::InventoryLedger;
use crate::metrics::Metrics;
use crate::outbox::EventEnvelope;
use crate::store::{abort, MarketStore, Page, UnitOfWork};
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

/// Distinct products allowed in one placement.
pub const MAX_ORDER_LINES: usize = 100;

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Placement:  validate → merge + sort lines → reserve each (ascending id)
//             → snapshot prices → insert order + OrderPlaced → commit
// Lifecycle:  read → plan transition → [release items] → CAS status
//             → OrderStatusChanged → commit; version conflicts re-read
//
// Every write path runs in exactly one unit of work. Any error discards the
// whole unit. The placement deadline bounds the work before commit only, so
// a slow COMMIT reply never reports a saved order as failed.
//
// ============================================================================

#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub placement_timeout: Duration,
    pub events_topic: String,
    pub status_retry: RetryConfig,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            placement_timeout: Duration::from_secs(5),
            events_topic: "order-events".to_string(),
            status_retry: RetryConfig::status_conflicts(),
        }
    }
}

pub struct OrderCommandHandler {
    store: Arc<dyn MarketStore>,
    metrics: Arc<Metrics>,
    settings: HandlerSettings,
}

impl OrderCommandHandler {
    pub fn new(store: Arc<dyn MarketStore>, metrics: Arc<Metrics>, settings: HandlerSettings) -> Self {
        Self {
            store,
            metrics,
            settings,
        }
    }

    // ========================================================================
    // Placement
    // ========================================================================

    #[instrument(
        name = "order::place",
        skip(self, command),
        fields(buyer_id = %command.buyer_id, correlation_id = %command.correlation_id)
    )]
    pub async fn place_order(&self, command: PlaceOrder) -> Result<OrderAggregate, OrderError> {
        let started = Instant::now();

        let result = match validate_placement(&command) {
            Ok(lines) => self.run_placement(&command, &lines).await,
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(aggregate) => {
                let units: i64 = aggregate.items.iter().map(|item| i64::from(item.quantity)).sum();
                self.metrics.record_placement(units.unsigned_abs(), elapsed);
                tracing::info!(
                    order_id = %aggregate.id(),
                    total = %aggregate.order.total_amount,
                    lines = aggregate.items.len(),
                    "✅ Order placed"
                );
            }
            Err(e) => {
                self.metrics.record_placement_failure(e.kind(), elapsed);
                match e {
                    OrderError::PersistenceFailure(_) => tracing::error!(error = %e, "Order placement failed"),
                    _ => tracing::info!(error = %e, kind = e.kind(), "Order placement rejected"),
                }
            }
        }

        result
    }

    async fn run_placement(
        &self,
        command: &PlaceOrder,
        lines: &[LineRequest],
    ) -> Result<OrderAggregate, OrderError> {
        let deadline = self.settings.placement_timeout;
        let staged = tokio::time::timeout(deadline, async {
            let mut uow = self.store.begin().await?;
            match self.place_in(uow.as_mut(), command, lines).await {
                Ok(aggregate) => Ok::<_, OrderError>((uow, aggregate)),
                Err(e) => {
                    abort(uow).await;
                    Err(e)
                }
            }
        })
        .await;

        // a dropped unit rolls back, so nothing staged so far survives the deadline
        let (uow, aggregate) = match staged {
            Ok(outcome) => outcome?,
            Err(_) => {
                return Err(OrderError::PersistenceFailure(format!(
                    "placement timed out after {} ms",
                    deadline.as_millis()
                )))
            }
        };

        uow.commit().await?;
        Ok(aggregate)
    }

    async fn place_in(
        &self,
        uow: &mut dyn UnitOfWork,
        command: &PlaceOrder,
        lines: &[LineRequest],
    ) -> Result<OrderAggregate, OrderError> {
        let order_id = Uuid::new_v4();

        let mut reservations = Vec::with_capacity(lines.len());
        for line in lines {
            reservations.push(InventoryLedger::reserve_in(&mut *uow, line.product_id, line.quantity).await?);
        }

        let priced = pricing::snapshot(order_id, &reservations)?;
        let now = Utc::now();
        let order = Order {
            id: order_id,
            buyer_id: command.buyer_id,
            status: OrderStatus::Pending,
            total_amount: priced.total_amount,
            delivery_address: command.delivery_address.trim().to_string(),
            notes: command
                .notes
                .as_ref()
                .map(|notes| notes.trim().to_string())
                .filter(|notes| !notes.is_empty()),
            placed_at: now,
            updated_at: now,
            version: 1,
        };
        let aggregate = OrderAggregate::new(order, priced.items);
        if !aggregate.is_consistent() {
            return Err(OrderError::PersistenceFailure(format!(
                "order {} total does not match its priced items",
                order_id
            )));
        }
        uow.insert_order(&aggregate.order, &aggregate.items).await?;

        let mut farmer_ids: Vec<Uuid> = reservations.iter().map(|r| r.farmer_id).collect();
        farmer_ids.sort();
        farmer_ids.dedup();

        let event = OrderEvent::Placed(OrderPlaced {
            order_id,
            buyer_id: aggregate.order.buyer_id,
            total_amount: aggregate.order.total_amount,
            items: aggregate.items.clone(),
            farmer_ids,
            placed_at: now,
        });
        let message = EventEnvelope::new(event, aggregate.order.version, command.correlation_id)
            .with_user(command.buyer_id)
            .to_outbox_message(&self.settings.events_topic)?;
        uow.enqueue_event(&message).await?;

        Ok(aggregate)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    #[instrument(
        name = "order::change_status",
        skip(self, command),
        fields(
            order_id = %command.order_id,
            actor_id = %command.actor.id,
            role = %command.actor.role,
            to = %command.new_status
        )
    )]
    pub async fn change_status(&self, command: ChangeOrderStatus) -> Result<OrderAggregate, OrderError> {
        let outcome = retry_on_transient(self.settings.status_retry.clone(), |attempt| {
            self.try_change_status(&command, attempt)
        })
        .await;

        match outcome {
            RetryResult::Success(aggregate) => Ok(aggregate),
            RetryResult::Failed(e) => {
                tracing::error!(error = %e, "Status change kept conflicting");
                Err(e)
            }
            RetryResult::PermanentFailure(e) => {
                tracing::info!(error = %e, kind = e.kind(), "Status change rejected");
                Err(e)
            }
        }
    }

    async fn try_change_status(
        &self,
        command: &ChangeOrderStatus,
        attempt: u32,
    ) -> Result<OrderAggregate, OrderError> {
        let aggregate = self
            .store
            .get_order(command.order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(command.order_id))?;
        let suppliers = self.store.suppliers_of(command.order_id).await?;

        let change = lifecycle::plan_transition(&aggregate.order, &command.actor, &suppliers, command.new_status)?;

        let mut uow = self.store.begin().await?;
        match self.apply_change(uow.as_mut(), &aggregate, change, command).await {
            Ok((updated, restocked)) => {
                uow.commit().await?;
                self.metrics
                    .record_transition(change.from.as_str(), change.to.as_str(), restocked);
                tracing::info!(
                    from = %change.from,
                    to = %change.to,
                    version = updated.order.version,
                    restocked_units = restocked,
                    attempt = attempt,
                    "Order status changed"
                );
                Ok(updated)
            }
            Err(e) => {
                abort(uow).await;
                if matches!(e, OrderError::ConcurrentUpdate { .. }) {
                    self.metrics.status_conflicts.inc();
                }
                Err(e)
            }
        }
    }

    async fn apply_change(
        &self,
        uow: &mut dyn UnitOfWork,
        aggregate: &OrderAggregate,
        change: StatusChange,
        command: &ChangeOrderStatus,
    ) -> Result<(OrderAggregate, u64), OrderError> {
        let mut restocked = Vec::new();
        if change.restocks() {
            for item in aggregate.items_in_lock_order() {
                InventoryLedger::release_in(&mut *uow, item.product_id, item.quantity).await?;
                restocked.push(LineRequest {
                    product_id: item.product_id,
                    quantity: item.quantity,
                });
            }
        }
        let restocked_units: u64 = restocked.iter().map(|line| u64::from(line.quantity.unsigned_abs())).sum();

        let at = Utc::now();
        let applied = uow
            .update_order_status(change.order_id, aggregate.order.version, change.to, at)
            .await?;
        if !applied {
            return Err(OrderError::ConcurrentUpdate {
                order_id: change.order_id,
            });
        }

        // read back through the unit so the result carries the stored version
        let updated = uow
            .load_order(change.order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(change.order_id))?;
        let order = &updated.order;

        let event = OrderEvent::StatusChanged(OrderStatusChanged {
            order_id: order.id,
            from: change.from,
            to: change.to,
            actor_id: command.actor.id,
            actor_role: command.actor.role,
            restocked,
            version: order.version,
            changed_at: at,
        });
        let message = EventEnvelope::new(event, order.version, command.correlation_id)
            .with_user(command.actor.id)
            .with_metadata("actor_role", command.actor.role.as_str())
            .to_outbox_message(&self.settings.events_topic)?;
        uow.enqueue_event(&message).await?;

        Ok((updated, restocked_units))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The buyer of record, a supplying farmer or an operator may read an order.
    #[instrument(name = "order::get", skip(self, actor), fields(actor_id = %actor.id, role = %actor.role))]
    pub async fn get_order(&self, order_id: Uuid, actor: &Actor) -> Result<OrderAggregate, OrderError> {
        let aggregate = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        let suppliers = self.store.suppliers_of(order_id).await?;

        if !lifecycle::can_view(&aggregate.order, actor, &suppliers) {
            return Err(OrderError::forbidden(actor.id, format!("view order {}", order_id)));
        }
        Ok(aggregate)
    }

    #[instrument(name = "order::list", skip(self), fields(actor_id = %query.actor.id, role = %query.actor.role))]
    pub async fn list_orders(&self, query: ListOrders) -> Result<Vec<Order>, OrderError> {
        let page = Page::new(query.page, query.size);
        let Actor { id, role } = query.actor;

        let orders = match role {
            ActorRole::Buyer => self.store.list_orders_for_buyer(id, page).await?,
            ActorRole::Farmer => self.store.list_orders_for_farmer(id, page).await?,
            ActorRole::Operator => return Err(OrderError::forbidden(id, "list orders")),
        };
        Ok(orders)
    }
}

/// Reject malformed placements and collapse duplicate products into one
/// line each, sorted by product id.
pub fn validate_placement(command: &PlaceOrder) -> Result<Vec<LineRequest>, OrderError> {
    if command.items.is_empty() {
        return Err(OrderError::InvalidRequest("order must contain at least one item".to_string()));
    }
    if command.delivery_address.trim().is_empty() {
        return Err(OrderError::InvalidRequest("delivery address is required".to_string()));
    }

    let mut merged: BTreeMap<Uuid, i32> = BTreeMap::new();
    for line in &command.items {
        if line.quantity <= 0 {
            return Err(OrderError::InvalidRequest(format!(
                "quantity for product {} must be positive, got {}",
                line.product_id, line.quantity
            )));
        }
        let quantity = merged.entry(line.product_id).or_insert(0);
        *quantity = quantity.checked_add(line.quantity).ok_or_else(|| {
            OrderError::InvalidRequest(format!("quantity for product {} is too large", line.product_id))
        })?;
    }

    if merged.len() > MAX_ORDER_LINES {
        return Err(OrderError::InvalidRequest(format!(
            "order has {} distinct products, at most {} allowed",
            merged.len(),
            MAX_ORDER_LINES
        )));
    }

    Ok(merged
        .into_iter()
        .map(|(product_id, quantity)| LineRequest { product_id, quantity })
        .collect())
}
