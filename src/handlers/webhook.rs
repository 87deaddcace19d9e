use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::providers::verify_webhook_signature;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "x-razorpay-signature";

#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<Wrapped<PaymentEntity>>,
    pub order: Option<Wrapped<OrderEntity>>,
}

#[derive(Debug, Deserialize)]
pub struct Wrapped<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderEntity {
    pub id: String,
}

impl WebhookEvent {
    fn order_ref(&self) -> Option<&str> {
        self.payload
            .order
            .as_ref()
            .map(|o| o.entity.id.as_str())
            .or_else(|| {
                self.payload
                    .payment
                    .as_ref()
                    .and_then(|p| p.entity.order_id.as_deref())
            })
    }
}

/// Payment provider callback. The raw body is authenticated before parsing.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing webhook signature".to_string()))?;

    if !verify_webhook_signature(&state.webhook_secret, &body, signature) {
        tracing::warn!("Rejected payment webhook with invalid signature");
        return Err(AppError::Unauthorized("invalid webhook signature".to_string()));
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid webhook payload: {}", e)))?;

    let Some(order_ref) = event.order_ref() else {
        tracing::warn!(event = %event.event, "Payment webhook without order reference");
        return Ok(Json(json!({ "status": "ignored" })));
    };

    let result = match event.event.as_str() {
        "payment.captured" | "order.paid" => state.orders.complete_buy(order_ref).await,
        "payment.failed" => state.orders.fail_payment(order_ref).await,
        other => {
            tracing::debug!(event = other, order_ref, "Ignoring payment webhook event");
            return Ok(Json(json!({ "status": "ignored" })));
        }
    };

    match result {
        Ok(order) => {
            tracing::info!(event = %event.event, order_id = %order.id, status = %order.status, "Payment webhook processed");
            Ok(Json(json!({
                "status": "processed",
                "order_id": order.id,
                "order_status": order.status,
            })))
        }
        Err(AppError::NotFound(_)) => {
            // Orders created elsewhere on the same merchant account.
            tracing::warn!(event = %event.event, order_ref, "Payment webhook for unknown order");
            Ok(Json(json!({ "status": "ignored" })))
        }
        Err(e) => Err(e),
    }
}
