//! Payment provider client (Razorpay style REST API) and webhook signature check.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;

use super::{GuardedClient, ProviderError};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct PaymentOrderRequest {
    /// Amount in the currency's minor unit (paise for INR).
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
    pub customer_id: String,
}

/// What the client checkout needs to collect the payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub order_ref: String,
    pub session_token: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Created,
    Attempted,
    Paid,
    Failed,
}

impl PaymentState {
    fn from_provider(status: &str) -> Self {
        match status {
            "paid" | "captured" => PaymentState::Paid,
            "attempted" | "authorized" => PaymentState::Attempted,
            "failed" => PaymentState::Failed,
            _ => PaymentState::Created,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentStatus {
    pub state: PaymentState,
    pub payment_ref: Option<String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentSession, ProviderError>;
    async fn fetch_order_status(&self, order_ref: &str) -> Result<PaymentStatus, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ProviderOrder {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ProviderPayments {
    #[serde(default)]
    items: Vec<ProviderPayment>,
}

#[derive(Debug, Deserialize)]
struct ProviderPayment {
    id: String,
    status: String,
}

pub struct RazorpayClient {
    http: GuardedClient,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(http: GuardedClient, base_url: String, key_id: String, key_secret: String) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id,
            key_secret,
        }
    }

    async fn captured_payment(&self, order_ref: &str) -> Result<Option<String>, ProviderError> {
        let url = format!("{}/v1/orders/{}/payments", self.base_url, order_ref);
        let request = self
            .http
            .client()
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret));
        let payments: ProviderPayments = self.http.send_json(request).await?;

        Ok(payments
            .items
            .into_iter()
            .find(|p| p.status == "captured")
            .map(|p| p.id))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentSession, ProviderError> {
        let url = format!("{}/v1/orders", self.base_url);
        let body = json!({
            "amount": request.amount_minor,
            "currency": request.currency,
            "receipt": request.receipt,
            "notes": { "user_id": request.customer_id },
        });
        let http_request = self
            .http
            .client()
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body);

        let order: ProviderOrder = self.http.send_json(http_request).await?;
        Ok(PaymentSession {
            order_ref: order.id,
            session_token: self.key_id.clone(),
            amount_minor: order.amount,
            currency: order.currency,
        })
    }

    async fn fetch_order_status(&self, order_ref: &str) -> Result<PaymentStatus, ProviderError> {
        let url = format!("{}/v1/orders/{}", self.base_url, order_ref);
        let request = self
            .http
            .client()
            .get(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret));
        let order: ProviderOrder = self.http.send_json(request).await?;

        let state = PaymentState::from_provider(&order.status);
        let payment_ref = if state == PaymentState::Paid {
            match self.captured_payment(order_ref).await {
                Ok(found) => found,
                Err(e) => {
                    tracing::warn!(order_ref, error = %e, "Could not look up captured payment id");
                    None
                }
            }
        } else {
            None
        };

        Ok(PaymentStatus { state, payment_ref })
    }
}

/// Checks a hex HMAC-SHA256 signature of the raw webhook body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

/// Hex HMAC-SHA256 of `body`, the format the provider sends in its signature header.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, hmac::digest::InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}
