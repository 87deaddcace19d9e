use async_trait::async_trait;
use bigdecimal::BigDecimal;
use bullion_core::adapters::InMemoryStore;
use bullion_core::config::PricingConfig;
use bullion_core::domain::{MetalType, OrderSide, OrderStatus, PriceObservation, WalletBalance};
use bullion_core::error::AppError;
use bullion_core::ports::{LedgerRepository, PriceRepository, WalletRepository};
use bullion_core::providers::{
    FxRateProvider, PaymentGateway, PaymentOrderRequest, PaymentSession, PaymentState, PaymentStatus,
    ProviderError,
};
use bullion_core::services::{FxRateCache, OrderService, PriceBook};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct FixedFx;

#[async_trait]
impl FxRateProvider for FixedFx {
    async fn fetch_rate(&self, _base: &str, _quote: &str) -> Result<f64, ProviderError> {
        Ok(83.0)
    }
}

/// Payment provider double. Orders start as created; tests mark them paid or failed.
#[derive(Default)]
struct FakeGateway {
    next: AtomicUsize,
    states: Mutex<HashMap<String, PaymentState>>,
    requests: Mutex<Vec<PaymentOrderRequest>>,
}

impl FakeGateway {
    fn set_state(&self, order_ref: &str, state: PaymentState) {
        self.states.lock().unwrap().insert(order_ref.to_string(), state);
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &PaymentOrderRequest) -> Result<PaymentSession, ProviderError> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let order_ref = format!("order_{}", n);
        self.states
            .lock()
            .unwrap()
            .insert(order_ref.clone(), PaymentState::Created);
        self.requests.lock().unwrap().push(request.clone());
        Ok(PaymentSession {
            order_ref,
            session_token: "rzp_test_key".to_string(),
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
        })
    }

    async fn fetch_order_status(&self, order_ref: &str) -> Result<PaymentStatus, ProviderError> {
        let state = self
            .states
            .lock()
            .unwrap()
            .get(order_ref)
            .copied()
            .unwrap_or(PaymentState::Created);
        Ok(PaymentStatus {
            state,
            payment_ref: (state == PaymentState::Paid).then(|| format!("pay_{}", order_ref)),
        })
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    gateway: Arc<FakeGateway>,
    prices: PriceBook,
    orders: OrderService,
}

async fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let gateway = Arc::new(FakeGateway::default());
    let fx = Arc::new(FxRateCache::new(Arc::new(FixedFx), "INR", Duration::from_secs(3600), 83.0));
    let prices = PriceBook::build(&PricingConfig::default(), Vec::new(), fx, store.clone());

    // Seed a stored gold price so orders price at 5470 / 5204.
    let gold = PriceObservation::new(MetalType::Gold, 5470.0, 5204.0, "INR", "metals-live");
    PriceRepository::insert(store.as_ref(), &gold).await.unwrap();

    let orders = OrderService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        gateway.clone(),
        prices.clone(),
        "INR",
        BigDecimal::from(10),
    );

    Harness {
        store,
        gateway,
        prices,
        orders,
    }
}

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_buy_locks_price_and_quantity() {
    let h = harness().await;

    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();

    assert_eq!(checkout.order.status, OrderStatus::PaymentPending);
    assert_eq!(checkout.order.side, OrderSide::Buy);
    assert_eq!(checkout.order.price_per_unit, dec("5470"));
    assert_eq!(checkout.order.quantity, dec("0.1828"));
    assert_eq!(checkout.order.provider_order_ref.as_deref(), Some(checkout.payment.order_ref.as_str()));
    assert_eq!(checkout.payment.amount_minor, 100000);
    assert_eq!(h.gateway.requests.lock().unwrap()[0].receipt, checkout.order.id.to_string());

    // Nothing is credited before payment.
    let wallet = WalletRepository::get(h.store.as_ref(), "alice").await.unwrap();
    assert_eq!(wallet.gold_balance, BigDecimal::from(0));
}

#[tokio::test]
async fn test_buy_below_minimum_is_rejected() {
    let h = harness().await;

    let result = h.orders.initiate_buy("alice", dec("5"), MetalType::Gold).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(h.gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_completion_is_idempotent() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();
    let reference = checkout.payment.order_ref.clone();
    h.gateway.set_state(&reference, PaymentState::Paid);

    // Webhook and client verification race for the same order.
    let first = h.orders.complete_buy(&reference).await.unwrap();
    let second = h.orders.verify_order("alice", checkout.order.id).await.unwrap();
    let third = h.orders.complete_buy(&reference).await.unwrap();

    assert_eq!(first.status, OrderStatus::Completed);
    assert_eq!(second.status, OrderStatus::Completed);
    assert_eq!(third.completed_at, first.completed_at);
    assert_eq!(first.provider_payment_ref.as_deref(), Some(format!("pay_{}", reference).as_str()));

    let wallet = WalletRepository::get(h.store.as_ref(), "alice").await.unwrap();
    assert_eq!(wallet.gold_balance, dec("0.1828"));
    let entries = h.store.list_for_order(checkout.order.id).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, OrderSide::Buy);
}

#[tokio::test]
async fn test_completion_requires_paid_status() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();

    let result = h.orders.complete_buy(&checkout.payment.order_ref).await;

    assert!(matches!(result, Err(AppError::PaymentNotCompleted(_))));
    let order = h.orders.get_order_by_id("alice", checkout.order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::PaymentPending);
}

#[tokio::test]
async fn test_price_is_locked_at_creation() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();

    // The market moves before the payment settles.
    let moved = PriceObservation::new(MetalType::Gold, 9000.0, 8800.0, "INR", "metals-live");
    PriceRepository::insert(h.store.as_ref(), &moved).await.unwrap();
    h.gateway.set_state(&checkout.payment.order_ref, PaymentState::Paid);

    let settled = h.orders.complete_buy(&checkout.payment.order_ref).await.unwrap();

    assert_eq!(settled.price_per_unit, dec("5470"));
    assert_eq!(settled.quantity, dec("0.1828"));
}

#[tokio::test]
async fn test_failed_and_cancelled_buys_never_credit() {
    let h = harness().await;
    let failed = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();
    let cancelled = h.orders.initiate_buy("alice", dec("500"), MetalType::Gold).await.unwrap();

    h.gateway.set_state(&failed.payment.order_ref, PaymentState::Failed);
    let failed_order = h.orders.fail_payment(&failed.payment.order_ref).await.unwrap();
    let cancelled_order = h.orders.cancel_order("alice", cancelled.order.id).await.unwrap();

    assert_eq!(failed_order.status, OrderStatus::Failed);
    assert_eq!(cancelled_order.status, OrderStatus::Cancelled);

    // A capture for a cancelled order is refused.
    h.gateway.set_state(&cancelled.payment.order_ref, PaymentState::Paid);
    let late = h.orders.complete_buy(&cancelled.payment.order_ref).await;
    assert!(matches!(late, Err(AppError::Conflict(_))));

    let wallet = WalletRepository::get(h.store.as_ref(), "alice").await.unwrap();
    assert_eq!(wallet.gold_balance, BigDecimal::from(0));
    assert!(h.orders.get_user_transactions("alice", 20, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_attempt_keeps_order_open_for_retry() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();
    let order_ref = checkout.payment.order_ref.clone();

    // First card declined; the provider order is attempted, not closed.
    h.gateway.set_state(&order_ref, PaymentState::Attempted);
    let after_failure = h.orders.fail_payment(&order_ref).await.unwrap();
    assert_eq!(after_failure.status, OrderStatus::PaymentPending);

    // The retry succeeds.
    h.gateway.set_state(&order_ref, PaymentState::Paid);
    let settled = h.orders.complete_buy(&order_ref).await.unwrap();
    assert_eq!(settled.status, OrderStatus::Completed);

    let wallet = WalletRepository::get(h.store.as_ref(), "alice").await.unwrap();
    assert_eq!(wallet.gold_balance, dec("0.1828"));
    assert_eq!(h.orders.get_user_transactions("alice", 20, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_capture_after_failed_status_still_settles() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();
    let order_ref = checkout.payment.order_ref.clone();

    h.gateway.set_state(&order_ref, PaymentState::Failed);
    assert_eq!(h.orders.fail_payment(&order_ref).await.unwrap().status, OrderStatus::Failed);

    h.gateway.set_state(&order_ref, PaymentState::Paid);
    let settled = h.orders.complete_buy(&order_ref).await.unwrap();
    assert_eq!(settled.status, OrderStatus::Completed);
    assert_eq!(settled.price_per_unit, dec("5470"));

    // Redelivery of either event changes nothing.
    assert_eq!(h.orders.complete_buy(&order_ref).await.unwrap().status, OrderStatus::Completed);
    assert_eq!(h.orders.fail_payment(&order_ref).await.unwrap().status, OrderStatus::Completed);

    let wallet = WalletRepository::get(h.store.as_ref(), "alice").await.unwrap();
    assert_eq!(wallet.gold_balance, dec("0.1828"));
    assert_eq!(h.orders.get_user_transactions("alice", 20, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_failure_event_for_paid_order_settles_it() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();
    h.gateway.set_state(&checkout.payment.order_ref, PaymentState::Paid);

    let order = h.orders.fail_payment(&checkout.payment.order_ref).await.unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_fail_payment_leaves_completed_order() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();
    h.gateway.set_state(&checkout.payment.order_ref, PaymentState::Paid);
    h.orders.complete_buy(&checkout.payment.order_ref).await.unwrap();

    let order = h.orders.fail_payment(&checkout.payment.order_ref).await.unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_sell_more_than_held_is_rejected() {
    let h = harness().await;
    let mut wallet = WalletBalance::empty("bob");
    wallet.gold_balance = dec("0.05");
    h.store.seed_wallet(wallet.clone()).unwrap();

    let result = h.orders.initiate_sell("bob", dec("0.1"), MetalType::Gold).await;

    assert!(matches!(result, Err(AppError::InsufficientBalance(_))));
    assert_eq!(WalletRepository::get(h.store.as_ref(), "bob").await.unwrap(), wallet);
    assert!(h.orders.get_user_orders("bob", 20, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_sell_settles_at_sell_price() {
    let h = harness().await;
    let mut wallet = WalletBalance::empty("bob");
    wallet.gold_balance = dec("0.5");
    h.store.seed_wallet(wallet).unwrap();

    let order = h.orders.initiate_sell("bob", dec("0.1"), MetalType::Gold).await.unwrap();

    assert_eq!(order.status, OrderStatus::Completed);
    assert_eq!(order.price_per_unit, dec("5204"));
    assert_eq!(order.amount_in_currency, dec("520.40"));

    let wallet = WalletRepository::get(h.store.as_ref(), "bob").await.unwrap();
    assert_eq!(wallet.gold_balance, dec("0.4"));
    assert_eq!(wallet.wallet_balance, dec("520.40"));

    let transactions = h.orders.get_user_transactions("bob", 20, 0).await.unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0].kind, OrderSide::Sell);
}

#[tokio::test]
async fn test_orders_are_scoped_to_owner() {
    let h = harness().await;
    let checkout = h.orders.initiate_buy("alice", dec("1000"), MetalType::Gold).await.unwrap();

    let result = h.orders.get_order_by_id("mallory", checkout.order.id).await;
    assert!(matches!(result, Err(AppError::NotFound(_))));

    let cancel = h.orders.cancel_order("mallory", checkout.order.id).await;
    assert!(matches!(cancel, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_wallet_summary_values_holdings_at_sell_price() {
    let h = harness().await;
    let mut wallet = WalletBalance::empty("carol");
    wallet.gold_balance = dec("2");
    wallet.wallet_balance = dec("100");
    h.store.seed_wallet(wallet).unwrap();

    let summary = h.orders.wallet_summary("carol").await.unwrap();

    assert_eq!(summary.gold_value, dec("10408.00"));
    // No silver held; silver value is zero whatever its price.
    assert_eq!(summary.silver_value, dec("0.00"));
    assert_eq!(summary.total_value, dec("10508.00"));
    assert_eq!(summary.currency, "INR");

    // Silver has no stored price yet, so it falls back to the default.
    let silver = h.prices.engine(MetalType::Silver).effective_price().await;
    assert_eq!(silver.buy_price, 92.0);
}
