use async_trait::async_trait;
use bullion_core::adapters::InMemoryStore;
use bullion_core::config::PricingConfig;
use bullion_core::domain::{AlertCondition, AlertFrequency, AlertStatus, MetalType, PriceObservation};
use bullion_core::error::AppError;
use bullion_core::ports::{AlertRepository, PriceRepository};
use bullion_core::providers::{FxRateProvider, Notifier, ProviderError};
use bullion_core::services::{AlertService, FxRateCache, PriceBook};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

struct FixedFx;

#[async_trait]
impl FxRateProvider for FixedFx {
    async fn fetch_rate(&self, _base: &str, _quote: &str) -> Result<f64, ProviderError> {
        Ok(83.0)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(String, String, Value)>>,
    down: AtomicBool,
}

impl RecordingNotifier {
    fn sent(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(&self, user_id: &str, title: &str, _body: &str, metadata: Value) -> Result<(), ProviderError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(ProviderError::Status {
                provider: "push-gateway".to_string(),
                status: 502,
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((user_id.to_string(), title.to_string(), metadata));
        Ok(())
    }
}

async fn service() -> (AlertService, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let store = Arc::new(InMemoryStore::new());
    (service_with(store, notifier.clone()).await, notifier)
}

async fn service_with(store: Arc<InMemoryStore>, notifier: Arc<dyn Notifier>) -> AlertService {
    let fx = Arc::new(FxRateCache::new(
        Arc::new(FixedFx),
        "INR",
        std::time::Duration::from_secs(3600),
        83.0,
    ));
    let prices = PriceBook::build(&PricingConfig::default(), Vec::new(), fx, store.clone());

    let gold = PriceObservation::new(MetalType::Gold, 7000.0, 6800.0, "INR", "goldapi");
    PriceRepository::insert(store.as_ref(), &gold).await.unwrap();

    AlertService::new(store, notifier, prices)
}

/// Cancels the alert through the store while the push is in flight, the way a
/// concurrent `DELETE /alerts/:id` would.
struct CancelDuringPush {
    store: Arc<InMemoryStore>,
    alert_id: Mutex<Option<Uuid>>,
}

#[async_trait]
impl Notifier for CancelDuringPush {
    async fn notify_user(&self, _user_id: &str, _title: &str, _body: &str, _metadata: Value) -> Result<(), ProviderError> {
        let id = self.alert_id.lock().unwrap().expect("alert id set");
        let mut alert = AlertRepository::get_by_id(self.store.as_ref(), id).await.unwrap();
        alert.status = AlertStatus::Cancelled;
        AlertRepository::update(self.store.as_ref(), &alert).await.unwrap();
        Ok(())
    }
}

#[tokio::test]
async fn test_condition_is_fixed_at_creation() {
    let (alerts, _) = service().await;

    let above = alerts
        .create_alert("alice", MetalType::Gold, 7200.0, AlertFrequency::Once)
        .await
        .unwrap();
    let below = alerts
        .create_alert("alice", MetalType::Gold, 6900.0, AlertFrequency::Once)
        .await
        .unwrap();

    assert_eq!(above.condition, AlertCondition::Above);
    assert_eq!(below.condition, AlertCondition::Below);
    assert_eq!(alerts.list_alerts("alice").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_invalid_target_is_rejected() {
    let (alerts, _) = service().await;

    let result = alerts
        .create_alert("alice", MetalType::Gold, -1.0, AlertFrequency::Once)
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn test_once_alert_fires_a_single_time() {
    let (alerts, notifier) = service().await;
    let alert = alerts
        .create_alert("alice", MetalType::Gold, 7200.0, AlertFrequency::Once)
        .await
        .unwrap();
    let now = Utc::now();

    assert_eq!(alerts.evaluate(MetalType::Gold, 7100.0, now).await.unwrap(), 0);
    assert_eq!(alerts.evaluate(MetalType::Gold, 7250.0, now).await.unwrap(), 1);
    assert_eq!(alerts.evaluate(MetalType::Gold, 7300.0, now + Duration::hours(2)).await.unwrap(), 0);

    let stored = alerts.list_alerts("alice").await.unwrap();
    assert_eq!(stored[0].id, alert.id);
    assert_eq!(stored[0].status, AlertStatus::Triggered);

    let sent = notifier.sent.lock().unwrap();
    assert_eq!(sent[0].0, "alice");
    assert_eq!(sent[0].1, "Gold price alert");
    assert_eq!(sent[0].2["condition"], "above");
}

#[tokio::test]
async fn test_recurring_alert_waits_for_cooldown() {
    let (alerts, notifier) = service().await;
    alerts
        .create_alert("bob", MetalType::Gold, 6500.0, AlertFrequency::Recurring)
        .await
        .unwrap();
    let start = Utc::now();

    assert_eq!(alerts.evaluate(MetalType::Gold, 6400.0, start).await.unwrap(), 1);
    assert_eq!(
        alerts
            .evaluate(MetalType::Gold, 6300.0, start + Duration::minutes(30))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        alerts
            .evaluate(MetalType::Gold, 6300.0, start + Duration::minutes(61))
            .await
            .unwrap(),
        1
    );
    assert_eq!(notifier.sent(), 2);

    let stored = alerts.list_alerts("bob").await.unwrap();
    assert_eq!(stored[0].status, AlertStatus::Active);
}

#[tokio::test]
async fn test_failed_notification_is_retried() {
    let (alerts, notifier) = service().await;
    alerts
        .create_alert("alice", MetalType::Gold, 7200.0, AlertFrequency::Once)
        .await
        .unwrap();
    let now = Utc::now();

    notifier.down.store(true, Ordering::SeqCst);
    assert_eq!(alerts.evaluate(MetalType::Gold, 7300.0, now).await.unwrap(), 0);
    let stored = alerts.list_alerts("alice").await.unwrap();
    assert_eq!(stored[0].status, AlertStatus::Active);
    assert!(stored[0].triggered_at.is_none());

    notifier.down.store(false, Ordering::SeqCst);
    assert_eq!(alerts.evaluate(MetalType::Gold, 7300.0, now).await.unwrap(), 1);
}

#[tokio::test]
async fn test_other_metal_is_not_evaluated() {
    let (alerts, notifier) = service().await;
    alerts
        .create_alert("alice", MetalType::Gold, 7200.0, AlertFrequency::Once)
        .await
        .unwrap();

    assert_eq!(alerts.evaluate(MetalType::Silver, 9000.0, Utc::now()).await.unwrap(), 0);
    assert_eq!(notifier.sent(), 0);
}

#[tokio::test]
async fn test_cancel_alert() {
    let (alerts, notifier) = service().await;
    let alert = alerts
        .create_alert("alice", MetalType::Gold, 7200.0, AlertFrequency::Recurring)
        .await
        .unwrap();

    let other = alerts.cancel_alert("mallory", alert.id).await;
    assert!(matches!(other, Err(AppError::NotFound(_))));

    let cancelled = alerts.cancel_alert("alice", alert.id).await.unwrap();
    assert_eq!(cancelled.status, AlertStatus::Cancelled);

    let again = alerts.cancel_alert("alice", alert.id).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));

    assert_eq!(alerts.evaluate(MetalType::Gold, 7500.0, Utc::now()).await.unwrap(), 0);
    assert_eq!(notifier.sent(), 0);
}

#[tokio::test]
async fn test_cancel_during_notification_is_kept() {
    let store = Arc::new(InMemoryStore::new());
    let notifier = Arc::new(CancelDuringPush {
        store: store.clone(),
        alert_id: Mutex::new(None),
    });
    let alerts = service_with(store, notifier.clone()).await;
    let alert = alerts
        .create_alert("alice", MetalType::Gold, 7100.0, AlertFrequency::Recurring)
        .await
        .unwrap();
    *notifier.alert_id.lock().unwrap() = Some(alert.id);

    alerts.evaluate(MetalType::Gold, 7200.0, Utc::now()).await.unwrap();

    let stored = alerts.list_alerts("alice").await.unwrap();
    assert_eq!(stored[0].status, AlertStatus::Cancelled);
    assert_eq!(alerts.evaluate(MetalType::Gold, 7300.0, Utc::now() + Duration::hours(2)).await.unwrap(), 0);
}
