use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;

use crate::domain::order::OrderError;

impl ResponseError for OrderError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrderError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Forbidden { .. } => StatusCode::FORBIDDEN,
            OrderError::Unavailable { .. }
            | OrderError::InsufficientStock { .. }
            | OrderError::InvalidTransition { .. }
            | OrderError::ConcurrentUpdate { .. } => StatusCode::CONFLICT,
            OrderError::PersistenceFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            OrderError::PersistenceFailure(detail) => {
                tracing::error!(detail = %detail, "Responding with persistence failure");
                json!({
                    "error": self.kind(),
                    "message": "The order service is temporarily unavailable, please retry",
                })
            }
            OrderError::ProductNotFound(product_id) => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "productId": product_id,
            }),
            OrderError::OrderNotFound(order_id) | OrderError::ConcurrentUpdate { order_id } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "orderId": order_id,
            }),
            OrderError::Unavailable { product_id, status } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "productId": product_id,
                "status": status,
            }),
            OrderError::InsufficientStock {
                product_id,
                requested,
                available,
            } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "productId": product_id,
                "requested": requested,
                "available": available,
            }),
            OrderError::InvalidTransition { order_id, from, to } => json!({
                "error": self.kind(),
                "message": self.to_string(),
                "orderId": order_id,
                "from": from,
                "to": to,
            }),
            OrderError::InvalidRequest(_) | OrderError::Forbidden { .. } => json!({
                "error": self.kind(),
                "message": self.to_string(),
            }),
        };

        HttpResponse::build(self.status_code()).json(body)
    }
}
