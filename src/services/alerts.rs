use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{AlertFrequency, AlertStatus, MetalType, PriceAlert};
use crate::error::AppError;
use crate::ports::AlertRepository;
use crate::providers::Notifier;
use crate::services::price_engine::PriceBook;

/// Minimum gap between two notifications of one recurring alert.
pub fn default_cooldown() -> Duration {
    Duration::hours(1)
}

pub struct AlertService {
    alerts: Arc<dyn AlertRepository>,
    notifier: Arc<dyn Notifier>,
    prices: PriceBook,
    cooldown: Duration,
}

impl AlertService {
    pub fn new(alerts: Arc<dyn AlertRepository>, notifier: Arc<dyn Notifier>, prices: PriceBook) -> Self {
        Self {
            alerts,
            notifier,
            prices,
            cooldown: default_cooldown(),
        }
    }

    /// Creates an alert whose direction is fixed against the current buy price.
    pub async fn create_alert(
        &self,
        user_id: &str,
        metal: MetalType,
        target_price: f64,
        frequency: AlertFrequency,
    ) -> Result<PriceAlert, AppError> {
        if !(target_price.is_finite() && target_price > 0.0) {
            return Err(AppError::Validation("target_price must be a positive number".to_string()));
        }

        let current = self.prices.engine(metal).effective_price().await;
        let alert = PriceAlert::new(user_id.to_string(), metal, target_price, current.buy_price, frequency);
        let saved = self.alerts.insert(&alert).await?;

        tracing::info!(
            alert_id = %saved.id,
            user_id,
            metal = %metal,
            target_price,
            condition = saved.condition.as_str(),
            "Price alert created"
        );
        Ok(saved)
    }

    pub async fn list_alerts(&self, user_id: &str) -> Result<Vec<PriceAlert>, AppError> {
        Ok(self.alerts.list_for_user(user_id).await?)
    }

    pub async fn cancel_alert(&self, user_id: &str, alert_id: Uuid) -> Result<PriceAlert, AppError> {
        let mut alert = self.alerts.get_by_id(alert_id).await?;
        if alert.user_id != user_id {
            return Err(AppError::NotFound(format!("alert {}", alert_id)));
        }
        if alert.status != AlertStatus::Active {
            return Err(AppError::Conflict(format!(
                "alert {} is already {}",
                alert_id,
                alert.status.as_str()
            )));
        }

        alert.status = AlertStatus::Cancelled;
        self.alerts
            .update(&alert)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("alert {} is no longer active", alert_id)))
    }

    /// Tests every active alert of `metal` against a freshly observed buy price.
    /// Returns how many notifications were sent. A failed notification leaves
    /// the alert unchanged so the next update retries it.
    pub async fn evaluate(&self, metal: MetalType, price: f64, observed_at: DateTime<Utc>) -> Result<usize, AppError> {
        let active = self.alerts.list_active(metal).await?;
        let mut fired = 0;

        for mut alert in active {
            if !alert.should_fire(price, observed_at, self.cooldown) {
                continue;
            }

            let title = format!("{} price alert", capitalize(metal.as_str()));
            let body = format!(
                "{} is now {:.2}, {} your target of {:.2}",
                capitalize(metal.as_str()),
                price,
                alert.condition.as_str(),
                alert.target_price
            );
            let metadata = json!({
                "alert_id": alert.id,
                "metal_type": metal,
                "condition": alert.condition,
                "target_price": alert.target_price,
                "current_price": price,
            });

            if let Err(e) = self.notifier.notify_user(&alert.user_id, &title, &body, metadata).await {
                tracing::warn!(alert_id = %alert.id, error = %e, "Alert notification failed");
                continue;
            }

            alert.record_trigger(observed_at);
            match self.alerts.update(&alert).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    tracing::info!(alert_id = %alert.id, "Alert left active state during notification");
                }
                Err(e) => {
                    tracing::error!(alert_id = %alert.id, error = %e, "Failed to record alert trigger");
                    continue;
                }
            }
            fired += 1;
        }

        if fired > 0 {
            tracing::info!(metal = %metal, price, fired, "Price alerts triggered");
        }
        Ok(fired)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("gold"), "Gold");
        assert_eq!(capitalize(""), "");
    }
}
