use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::identity::Identity;
use super::AppState;
use crate::actors::GetDlqMessages;
use crate::domain::order::{
    ActorRole, ChangeOrderStatus, LineRequest, ListOrders, Order, OrderError, OrderStatus, PlaceOrder,
};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

const DEFAULT_DEAD_LETTER_LIMIT: usize = 50;
const MAX_DEAD_LETTER_LIMIT: usize = 500;

// --- Request / response DTOs ---

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderRequest {
    pub delivery_address: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub items: Vec<LineRequest>,
}

#[derive(Deserialize, Debug)]
pub struct ChangeStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize, Debug)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub struct DeadLetterQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize, Debug)]
pub struct OrderPage {
    pub page: u32,
    pub size: u32,
    pub orders: Vec<Order>,
}

fn correlation_id(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

// --- Handlers ---

/// The caller places the order as its own buyer of record.
#[instrument(
    name = "handler::place_order",
    skip(state, req, identity, body),
    fields(actor_id = %identity.actor().id, lines = body.items.len())
)]
pub async fn place_order_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    identity: Identity,
    body: web::Json<PlaceOrderRequest>,
) -> Result<HttpResponse, OrderError> {
    let body = body.into_inner();
    let mut command = PlaceOrder::new(identity.actor().id, body.delivery_address, body.items);
    if let Some(notes) = body.notes {
        command = command.with_notes(notes);
    }
    if let Some(correlation_id) = correlation_id(&req) {
        command = command.with_correlation(correlation_id);
    }

    let placed = state.orders.place_order(command).await?;
    Ok(HttpResponse::Created().json(placed))
}

#[instrument(
    name = "handler::change_status",
    skip(state, req, identity, body),
    fields(order_id = %path, actor_id = %identity.actor().id, to = %body.status)
)]
pub async fn change_status_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    identity: Identity,
    path: web::Path<Uuid>,
    body: web::Json<ChangeStatusRequest>,
) -> Result<HttpResponse, OrderError> {
    let mut command = ChangeOrderStatus::new(path.into_inner(), identity.actor(), body.status);
    if let Some(correlation_id) = correlation_id(&req) {
        command.correlation_id = correlation_id;
    }

    let updated = state.orders.change_status(command).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[instrument(name = "handler::get_order", skip(state, identity), fields(order_id = %path, actor_id = %identity.actor().id))]
pub async fn get_order_handler(
    state: web::Data<AppState>,
    identity: Identity,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, OrderError> {
    let order = state.orders.get_order(path.into_inner(), &identity.actor()).await?;
    Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::list_orders", skip(state, identity, query), fields(actor_id = %identity.actor().id))]
pub async fn list_orders_handler(
    state: web::Data<AppState>,
    identity: Identity,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, OrderError> {
    let list = ListOrders::new(identity.actor(), query.page, query.size);
    let (page, size) = (list.page, list.size);

    let orders = state.orders.list_orders(list).await?;
    Ok(HttpResponse::Ok().json(OrderPage { page, size, orders }))
}

/// Parked outbox rows, oldest first, for operators doing manual replay.
#[instrument(name = "handler::dead_letters", skip(state, identity, query), fields(actor_id = %identity.actor().id))]
pub async fn dead_letters_handler(
    state: web::Data<AppState>,
    identity: Identity,
    query: web::Query<DeadLetterQuery>,
) -> Result<HttpResponse, OrderError> {
    let actor = identity.actor();
    if actor.role != ActorRole::Operator {
        return Err(OrderError::forbidden(actor.id, "read dead letters"));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_DEAD_LETTER_LIMIT)
        .clamp(1, MAX_DEAD_LETTER_LIMIT);
    let parked = state
        .dead_letters
        .send(GetDlqMessages { limit })
        .await
        .map_err(|e| OrderError::PersistenceFailure(format!("DLQ unreachable: {}", e)))?
        .map_err(OrderError::PersistenceFailure)?;

    Ok(HttpResponse::Ok().json(parked))
}
