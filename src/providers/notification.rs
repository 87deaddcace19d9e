use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{payment::sign_payload, GuardedClient, ProviderError};

/// Delivers a user-facing notification. Delivery mechanics live behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<(), ProviderError>;
}

#[derive(Debug, Deserialize)]
struct GatewayAck {
    #[serde(default)]
    accepted: Option<bool>,
}

/// Posts notifications to a push gateway as JSON, signed with
/// `X-Signature: hex(hmac_sha256(secret, body))`.
pub struct PushGatewayNotifier {
    http: GuardedClient,
    url: String,
    secret: String,
}

impl PushGatewayNotifier {
    pub fn new(http: GuardedClient, url: String, secret: String) -> Self {
        Self { http, url, secret }
    }
}

#[async_trait]
impl Notifier for PushGatewayNotifier {
    async fn notify_user(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<(), ProviderError> {
        let payload = json!({
            "user_id": user_id,
            "title": title,
            "body": body,
            "data": metadata,
        });
        let raw = serde_json::to_vec(&payload)
            .map_err(|e| ProviderError::malformed(self.http.name(), e.to_string()))?;
        let signature = sign_payload(&self.secret, &raw)
            .map_err(|e| ProviderError::malformed(self.http.name(), e.to_string()))?;

        let request = self
            .http
            .client()
            .post(&self.url)
            .header("content-type", "application/json")
            .header("X-Signature", signature)
            .body(raw);

        let ack: GatewayAck = self.http.send_json(request).await?;
        if ack.accepted == Some(false) {
            return Err(ProviderError::malformed(self.http.name(), "notification rejected"));
        }

        tracing::debug!(user_id, title, "Push notification accepted");
        Ok(())
    }
}

/// Notifier used when no push gateway is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(
        &self,
        user_id: &str,
        title: &str,
        body: &str,
        metadata: Value,
    ) -> Result<(), ProviderError> {
        tracing::info!(user_id, title, body, %metadata, "Notification");
        Ok(())
    }
}
