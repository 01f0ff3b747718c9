use actix::Recipient;
use actix_web::{error, web, App, HttpResponse, HttpServer, Responder};
use std::sync::Arc;

use crate::actors::{GetDlqMessages, GetSystemHealth};
use crate::domain::order::{OrderCommandHandler, OrderError};
use crate::metrics::Metrics;

pub mod errors;
pub mod handlers;
pub mod identity;

pub use identity::{Identity, ACTOR_ID_HEADER, ACTOR_ROLE_HEADER};

// ============================================================================
// HTTP Boundary
// ============================================================================
//
//   POST  /orders               place an order as the calling buyer
//   PATCH /orders/{id}/status   move an order through its lifecycle
//   GET   /orders/{id}          read one order (buyer, supplying farmer or operator)
//   GET   /orders?page&size     list the caller's orders, newest first
//   GET   /dead-letters?limit   parked outbox rows (operators only)
//   GET   /metrics              prometheus text format
//   GET   /health               coordinator health report
//
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderCommandHandler>,
    pub metrics: Arc<Metrics>,
    pub health: Recipient<GetSystemHealth>,
    pub dead_letters: Recipient<GetDlqMessages>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| error::Error::from(OrderError::InvalidRequest(err.to_string()))),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| error::Error::from(OrderError::InvalidRequest(err.to_string()))),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| error::Error::from(OrderError::InvalidRequest(err.to_string()))),
    )
    .service(
        web::scope("/orders")
            .route("", web::post().to(handlers::place_order_handler))
            .route("", web::get().to(handlers::list_orders_handler))
            .route("/{id}", web::get().to(handlers::get_order_handler))
            .route("/{id}/status", web::patch().to(handlers::change_status_handler)),
    )
    .route("/dead-letters", web::get().to(handlers::dead_letters_handler))
    .route("/metrics", web::get().to(metrics_handler))
    .route("/health", web::get().to(health_handler));
}

pub async fn start_http_server(host: &str, port: u16, state: AppState) -> std::io::Result<()> {
    tracing::info!("🌐 Starting HTTP server on http://{}:{}", host, port);

    let data = web::Data::new(state);
    HttpServer::new(move || App::new().app_data(data.clone()).configure(configure))
        .bind((host, port))?
        .run()
        .await
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    match state.metrics.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    match state.health.send(GetSystemHealth).await {
        Ok(report) if report.overall_status.is_unhealthy() => HttpResponse::ServiceUnavailable().json(report),
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => {
            tracing::error!(error = %e, "Health monitor unreachable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "overallStatus": { "status": "UNHEALTHY", "reason": "health monitor unreachable" }
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::{DlqActor, HealthMonitorActor};
    use crate::outbox::{DeadLetter, OutboxMessage};
    use crate::domain::inventory::Product;
    use crate::domain::order::HandlerSettings;
    use crate::messaging::LogPublisher;
    use crate::store::{MarketStore, MemoryStore};
    use actix::Actor;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use uuid::Uuid;

    async fn state_with(store: Arc<MemoryStore>) -> AppState {
        let metrics = Arc::new(Metrics::new().unwrap());
        let monitor = HealthMonitorActor::new(store.clone(), Arc::new(LogPublisher), metrics.clone()).start();
        let dlq = DlqActor::new(store.clone(), metrics.clone()).start();
        AppState {
            orders: Arc::new(OrderCommandHandler::new(
                store,
                metrics.clone(),
                HandlerSettings::default(),
            )),
            metrics,
            health: monitor.recipient(),
            dead_letters: dlq.recipient(),
        }
    }

    #[actix_web::test]
    async fn test_place_then_cancel_over_http() {
        let store = Arc::new(MemoryStore::new());
        let farmer = Uuid::new_v4();
        let product = Product::listed(farmer, "Honey", Decimal::new(800, 2), 3);
        store.upsert_product(&product).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(store.clone()).await))
                .configure(configure),
        )
        .await;
        let buyer = Uuid::new_v4().to_string();

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((ACTOR_ID_HEADER, buyer.as_str()))
            .insert_header((ACTOR_ROLE_HEADER, "BUYER"))
            .set_json(json!({
                "deliveryAddress": "12 Orchard Lane",
                "items": [{ "productId": product.id, "quantity": 2 }]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let placed: Value = test::read_body_json(resp).await;
        assert_eq!(placed["status"], "PENDING");
        assert_eq!(placed["totalAmount"], "16.00");
        let order_id = placed["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::patch()
            .uri(&format!("/orders/{}/status", order_id))
            .insert_header((ACTOR_ID_HEADER, buyer.as_str()))
            .insert_header((ACTOR_ROLE_HEADER, "BUYER"))
            .set_json(json!({ "status": "CANCELLED" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        assert_eq!(store.get_product(product.id).await.unwrap().unwrap().quantity_available, 3);
    }

    #[actix_web::test]
    async fn test_insufficient_stock_renders_conflict() {
        let store = Arc::new(MemoryStore::new());
        let product = Product::listed(Uuid::new_v4(), "Honey", Decimal::new(800, 2), 1);
        store.upsert_product(&product).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(store).await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "BUYER"))
            .set_json(json!({
                "deliveryAddress": "12 Orchard Lane",
                "items": [{ "productId": product.id, "quantity": 2 }]
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "InsufficientStock");
        assert_eq!(body["available"], 1);
    }

    #[actix_web::test]
    async fn test_requests_without_identity_are_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(Arc::new(MemoryStore::new())).await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri(&format!("/orders/{}", Uuid::new_v4()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "InvalidRequest");
    }

    #[actix_web::test]
    async fn test_malformed_body_is_invalid_request() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(Arc::new(MemoryStore::new())).await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::patch()
            .uri(&format!("/orders/{}/status", Uuid::new_v4()))
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "FARMER"))
            .set_json(json!({ "status": "LOST" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_metrics_and_health_endpoints() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(Arc::new(MemoryStore::new())).await))
                .configure(configure),
        )
        .await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("orders_placed_total"));

        let resp = test::call_service(&app, test::TestRequest::get().uri("/health").to_request()).await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn test_dead_letters_are_operator_only() {
        let store = Arc::new(MemoryStore::new());
        let message = OutboxMessage {
            id: Uuid::now_v7(),
            aggregate_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            event_type: "OrderPlaced".to_string(),
            topic: "order-events".to_string(),
            partition_key: "k".to_string(),
            payload: "{}".to_string(),
            correlation_id: Uuid::new_v4(),
            created_at: chrono::Utc::now(),
            attempts: 5,
            last_error: None,
        };
        store
            .record_dead_letter(&DeadLetter::from_message(&message, "broker rejected", 5))
            .await
            .unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(store).await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/dead-letters?limit=10")
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "FARMER"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let req = test::TestRequest::get()
            .uri("/dead-letters?limit=10")
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "OPERATOR"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["message_id"], message.id.to_string());
    }

    #[actix_web::test]
    async fn test_operator_reads_any_order_over_http() {
        let store = Arc::new(MemoryStore::new());
        let product = Product::listed(Uuid::new_v4(), "Honey", Decimal::new(800, 2), 3);
        store.upsert_product(&product).await.unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state_with(store).await))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/orders")
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "BUYER"))
            .set_json(json!({
                "deliveryAddress": "12 Orchard Lane",
                "items": [{ "productId": product.id, "quantity": 1 }]
            }))
            .to_request();
        let placed: Value = test::read_body_json(test::call_service(&app, req).await).await;
        let order_id = placed["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri(&format!("/orders/{}", order_id))
            .insert_header((ACTOR_ID_HEADER, Uuid::new_v4().to_string()))
            .insert_header((ACTOR_ROLE_HEADER, "OPERATOR"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
