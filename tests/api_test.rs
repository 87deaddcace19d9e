use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bullion_core::adapters::InMemoryStore;
use bullion_core::config::PricingConfig;
use bullion_core::domain::{MetalType, PriceObservation};
use bullion_core::health::{DependencyChecker, PriceFeedChecker};
use bullion_core::ports::PriceRepository;
use bullion_core::providers::{sign_payload, FxRateProvider, GuardedClient, LogNotifier, ProviderError, RazorpayClient};
use bullion_core::services::{AlertService, FxRateCache, OrderService, PriceAnalytics, PriceBook};
use bullion_core::{create_app, refresh_limiter, AppState};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

const WEBHOOK_SECRET: &str = "whsec_test";

struct FixedFx;

#[async_trait]
impl FxRateProvider for FixedFx {
    async fn fetch_rate(&self, _base: &str, _quote: &str) -> Result<f64, ProviderError> {
        Ok(83.0)
    }
}

async fn setup_test_app(payment_url: String) -> (String, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let fx = Arc::new(FxRateCache::new(Arc::new(FixedFx), "INR", Duration::from_secs(3600), 83.0));
    let prices = PriceBook::build(&PricingConfig::default(), Vec::new(), fx, store.clone());

    let gold = PriceObservation::new(MetalType::Gold, 5470.0, 5204.0, "INR", "metals-live");
    PriceRepository::insert(store.as_ref(), &gold).await.unwrap();

    let payments = Arc::new(RazorpayClient::new(
        GuardedClient::new("razorpay", Duration::from_secs(5)),
        payment_url,
        "rzp_test_key".to_string(),
        "rzp_test_secret".to_string(),
    ));
    let orders = Arc::new(OrderService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        payments,
        prices.clone(),
        "INR",
        BigDecimal::from(10),
    ));
    let alerts = Arc::new(AlertService::new(store.clone(), Arc::new(LogNotifier), prices.clone()));
    let checkers: Vec<Arc<dyn DependencyChecker>> =
        vec![Arc::new(PriceFeedChecker::new(prices.clone(), chrono::Duration::hours(24)))];

    let app_state = AppState {
        analytics: PriceAnalytics::new(store.clone()),
        prices,
        orders,
        alerts,
        webhook_secret: WEBHOOK_SECRET.to_string(),
        refresh_limiter: refresh_limiter(1),
        health_checkers: Arc::new(checkers),
        start_time: Instant::now(),
    };
    let app = create_app(app_state);

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(app.into_make_service());
    let actual_addr = server.local_addr();

    tokio::spawn(async move {
        server.await.unwrap();
    });

    (format!("http://{}", actual_addr), store)
}

async fn send_webhook(client: &reqwest::Client, base_url: &str, body: &Value, secret: &str) -> reqwest::Response {
    let raw = serde_json::to_vec(body).unwrap();
    let signature = sign_payload(secret, &raw).unwrap();
    client
        .post(format!("{}/webhooks/payment", base_url))
        .header("content-type", "application/json")
        .header("x-razorpay-signature", signature)
        .body(raw)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_and_current_price() {
    let payments = mockito::Server::new_async().await;
    let (base_url, _store) = setup_test_app(payments.url()).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{}/health", base_url)).send().await.unwrap();
    assert_eq!(health.status(), StatusCode::OK);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["status"], "healthy");

    let price = client.get(format!("{}/prices/gold", base_url)).send().await.unwrap();
    assert_eq!(price.status(), StatusCode::OK);
    let body: Value = price.json().await.unwrap();
    assert_eq!(body["buy_price"], 5470.0);
    assert_eq!(body["sell_price"], 5204.0);

    let unknown = client.get(format!("{}/prices/platinum", base_url)).send().await.unwrap();
    assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_user_endpoints_require_identity() {
    let payments = mockito::Server::new_async().await;
    let (base_url, _store) = setup_test_app(payments.url()).await;

    let response = reqwest::Client::new()
        .get(format!("{}/wallet", base_url))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_buy_settled_by_webhook() {
    let mut payments = mockito::Server::new_async().await;
    let _create = payments
        .mock("POST", "/v1/orders")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "order_api1", "amount": 100000, "currency": "INR", "status": "created"}"#)
        .create_async()
        .await;
    let _status = payments
        .mock("GET", "/v1/orders/order_api1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "order_api1", "amount": 100000, "currency": "INR", "status": "paid"}"#)
        .create_async()
        .await;
    let _payments = payments
        .mock("GET", "/v1/orders/order_api1/payments")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items": [{"id": "pay_api1", "status": "captured"}]}"#)
        .create_async()
        .await;

    let (base_url, _store) = setup_test_app(payments.url()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/orders/buy", base_url))
        .header("x-user-id", "alice")
        .json(&json!({ "metal_type": "gold", "amount": "1000" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let checkout: Value = response.json().await.unwrap();
    assert_eq!(checkout["order"]["status"], "payment_pending");
    assert_eq!(checkout["payment"]["order_ref"], "order_api1");

    let event = json!({
        "event": "payment.captured",
        "payload": { "payment": { "entity": { "id": "pay_api1", "order_id": "order_api1" } } }
    });

    // Forged signature is refused and changes nothing.
    let forged = send_webhook(&client, &base_url, &event, "wrong-secret").await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    let first = send_webhook(&client, &base_url, &event, WEBHOOK_SECRET).await;
    assert_eq!(first.status(), StatusCode::OK);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["status"], "processed");
    assert_eq!(body["order_status"], "completed");

    // A redelivery is harmless.
    let second = send_webhook(&client, &base_url, &event, WEBHOOK_SECRET).await;
    assert_eq!(second.status(), StatusCode::OK);

    let wallet: Value = client
        .get(format!("{}/wallet", base_url))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wallet["gold_balance"], "0.1828");

    let transactions: Value = client
        .get(format!("{}/transactions", base_url))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(transactions.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_webhook_for_unknown_order_is_ignored() {
    let payments = mockito::Server::new_async().await;
    let (base_url, _store) = setup_test_app(payments.url()).await;

    let event = json!({
        "event": "order.paid",
        "payload": { "order": { "entity": { "id": "order_elsewhere" } } }
    });
    let response = send_webhook(&reqwest::Client::new(), &base_url, &event, WEBHOOK_SECRET).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn test_oversell_returns_unprocessable() {
    let payments = mockito::Server::new_async().await;
    let (base_url, _store) = setup_test_app(payments.url()).await;

    let response = reqwest::Client::new()
        .post(format!("{}/orders/sell", base_url))
        .header("x-user-id", "bob")
        .json(&json!({ "metal_type": "gold", "quantity": "0.1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], 422);
}

#[tokio::test]
async fn test_refresh_is_throttled_per_metal() {
    let payments = mockito::Server::new_async().await;
    let (base_url, _store) = setup_test_app(payments.url()).await;
    let client = reqwest::Client::new();

    let first = client
        .post(format!("{}/prices/gold/refresh", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let body: Value = first.json().await.unwrap();
    // No providers configured in this setup.
    assert_eq!(body["outcome"]["kind"], "synthetic");

    let second = client
        .post(format!("{}/prices/gold/refresh", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

    let silver = client
        .post(format!("{}/prices/silver/refresh", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(silver.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_alert_lifecycle_over_http() {
    let payments = mockito::Server::new_async().await;
    let (base_url, _store) = setup_test_app(payments.url()).await;
    let client = reqwest::Client::new();

    let created = client
        .post(format!("{}/alerts", base_url))
        .header("x-user-id", "alice")
        .json(&json!({ "metal_type": "gold", "target_price": 6000.0, "frequency": "recurring" }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let alert: Value = created.json().await.unwrap();
    assert_eq!(alert["condition"], "above");

    let id = alert["id"].as_str().unwrap();
    let cancelled = client
        .delete(format!("{}/alerts/{}", base_url, id))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap();
    assert_eq!(cancelled.status(), StatusCode::OK);

    let listed: Value = client
        .get(format!("{}/alerts", base_url))
        .header("x-user-id", "alice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed[0]["status"], "cancelled");
}

#[tokio::test]
async fn test_failed_attempt_then_capture_over_webhooks() {
    let mut payments = mockito::Server::new_async().await;
    let _create = payments
        .mock("POST", "/v1/orders")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "order_api2", "amount": 100000, "currency": "INR", "status": "created"}"#)
        .create_async()
        .await;
    let attempted = payments
        .mock("GET", "/v1/orders/order_api2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "order_api2", "amount": 100000, "currency": "INR", "status": "attempted"}"#)
        .create_async()
        .await;

    let (base_url, _store) = setup_test_app(payments.url()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/orders/buy", base_url))
        .header("x-user-id", "carol")
        .json(&json!({ "metal_type": "gold", "amount": "1000" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let failed = json!({
        "event": "payment.failed",
        "payload": { "payment": { "entity": { "id": "pay_declined", "order_id": "order_api2" } } }
    });
    let first = send_webhook(&client, &base_url, &failed, WEBHOOK_SECRET).await;
    assert_eq!(first.status(), StatusCode::OK);
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["order_status"], "payment_pending");

    attempted.remove_async().await;
    let _paid = payments
        .mock("GET", "/v1/orders/order_api2")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"id": "order_api2", "amount": 100000, "currency": "INR", "status": "paid"}"#)
        .create_async()
        .await;
    let _captured = payments
        .mock("GET", "/v1/orders/order_api2/payments")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"items": [{"id": "pay_retry", "status": "captured"}]}"#)
        .create_async()
        .await;

    let paid = json!({
        "event": "order.paid",
        "payload": { "order": { "entity": { "id": "order_api2" } } }
    });
    let second = send_webhook(&client, &base_url, &paid, WEBHOOK_SECRET).await;
    assert_eq!(second.status(), StatusCode::OK);
    let body: Value = second.json().await.unwrap();
    assert_eq!(body["order_status"], "completed");

    let wallet: Value = client
        .get(format!("{}/wallet", base_url))
        .header("x-user-id", "carol")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(wallet["gold_balance"], "0.1828");
}
