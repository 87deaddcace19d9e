//! Order creation and settlement.
//!
//! Buys are priced and locked when created, then settled once the payment
//! provider confirms the charge. Confirmation can arrive twice (webhook and
//! client verify); the store completes an order only while it is still
//! `payment_pending` or `failed`, so the balance is credited exactly once.

use bigdecimal::BigDecimal;
use chrono::Utc;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{LedgerEntry, MetalType, Order, OrderSide, OrderStatus, WalletBalance};
use crate::error::AppError;
use crate::ports::{LedgerRepository, OrderRepository, RepositoryError, Settlement, WalletRepository};
use crate::providers::{PaymentGateway, PaymentOrderRequest, PaymentSession, PaymentState};
use crate::services::price_engine::PriceBook;

/// Quantities are held in grams to four decimals.
pub const QUANTITY_SCALE: i64 = 4;
/// Currency amounts are held to two decimals.
pub const AMOUNT_SCALE: i64 = 2;

#[derive(Debug, Clone, Serialize)]
pub struct BuyCheckout {
    pub order: Order,
    pub payment: PaymentSession,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    #[serde(flatten)]
    pub balances: WalletBalance,
    pub gold_value: BigDecimal,
    pub silver_value: BigDecimal,
    pub total_value: BigDecimal,
    pub currency: String,
}

pub struct OrderService {
    orders: Arc<dyn OrderRepository>,
    ledger: Arc<dyn LedgerRepository>,
    wallets: Arc<dyn WalletRepository>,
    payments: Arc<dyn PaymentGateway>,
    prices: PriceBook,
    currency: String,
    min_buy_amount: BigDecimal,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        ledger: Arc<dyn LedgerRepository>,
        wallets: Arc<dyn WalletRepository>,
        payments: Arc<dyn PaymentGateway>,
        prices: PriceBook,
        currency: impl Into<String>,
        min_buy_amount: BigDecimal,
    ) -> Self {
        Self {
            orders,
            ledger,
            wallets,
            payments,
            prices,
            currency: currency.into(),
            min_buy_amount,
        }
    }

    /// Prices a buy of `amount` in local currency, opens a payment with the
    /// provider and stores the order as `payment_pending` with the price locked.
    pub async fn initiate_buy(
        &self,
        user_id: &str,
        amount: BigDecimal,
        metal: MetalType,
    ) -> Result<BuyCheckout, AppError> {
        let amount = amount.with_scale(AMOUNT_SCALE);
        if amount < self.min_buy_amount {
            return Err(AppError::Validation(format!(
                "amount must be at least {}",
                self.min_buy_amount
            )));
        }

        let price = self.prices.engine(metal).effective_price().await;
        let price_per_unit = to_decimal(price.buy_price, metal)?;
        let quantity = (amount.clone() / price_per_unit.clone()).with_scale(QUANTITY_SCALE);
        if quantity <= BigDecimal::from(0) {
            return Err(AppError::Validation("amount is too small for one unit of quantity".to_string()));
        }

        let mut order = Order::new(
            user_id.to_string(),
            OrderSide::Buy,
            metal,
            amount.clone(),
            quantity,
            price_per_unit,
        );

        let session = self
            .payments
            .create_order(&PaymentOrderRequest {
                amount_minor: minor_units(&amount)?,
                currency: self.currency.clone(),
                receipt: order.id.to_string(),
                customer_id: user_id.to_string(),
            })
            .await?;

        order.provider_order_ref = Some(session.order_ref.clone());
        order
            .transition(OrderStatus::PaymentPending)
            .map_err(AppError::Internal)?;
        let order = self.orders.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            user_id,
            metal = %metal,
            amount = %order.amount_in_currency,
            quantity = %order.quantity,
            price = %order.price_per_unit,
            provider_order_ref = %session.order_ref,
            "Buy order created"
        );

        Ok(BuyCheckout { order, payment: session })
    }

    /// Settles a paid buy. Safe to call any number of times from any source:
    /// an already completed order is returned unchanged.
    pub async fn complete_buy(&self, provider_order_ref: &str) -> Result<Order, AppError> {
        let order = self
            .orders
            .get_by_provider_ref(provider_order_ref)
            .await
            .map_err(|e| not_found(e, "order", provider_order_ref))?;

        match order.status {
            OrderStatus::Completed => return Ok(order),
            OrderStatus::PaymentPending | OrderStatus::Failed => {}
            other => {
                return Err(AppError::Conflict(format!(
                    "order {} is {} and cannot be completed",
                    order.id, other
                )))
            }
        }

        let status = self.payments.fetch_order_status(provider_order_ref).await?;
        if status.state != PaymentState::Paid {
            return Err(AppError::PaymentNotCompleted(format!(
                "payment for order {} is not completed yet",
                order.id
            )));
        }

        match self
            .orders
            .settle_buy(order.id, status.payment_ref, Utc::now())
            .await?
        {
            Settlement::Settled(settled) => {
                tracing::info!(
                    order_id = %settled.id,
                    user_id = %settled.user_id,
                    metal = %settled.metal_type,
                    quantity = %settled.quantity,
                    "Buy settled"
                );
                Ok(settled)
            }
            Settlement::AlreadySettled(settled) => {
                tracing::info!(order_id = %settled.id, "Buy was already settled");
                Ok(settled)
            }
        }
    }

    /// Client-side confirmation of a buy by order id.
    pub async fn verify_order(&self, user_id: &str, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.get_order_by_id(user_id, order_id).await?;
        if order.side != OrderSide::Buy {
            return Err(AppError::BadRequest("only buy orders need payment verification".to_string()));
        }
        match order.provider_order_ref.as_deref() {
            Some(reference) => self.complete_buy(reference).await,
            None => Err(AppError::Conflict(format!("order {} has no payment", order.id))),
        }
    }

    /// Handles a failed payment attempt. The provider order decides: paid settles,
    /// attempted stays pending for a retry, anything else marks the buy failed.
    /// Completed orders are left untouched.
    pub async fn fail_payment(&self, provider_order_ref: &str) -> Result<Order, AppError> {
        let order = self
            .orders
            .get_by_provider_ref(provider_order_ref)
            .await
            .map_err(|e| not_found(e, "order", provider_order_ref))?;
        if order.status != OrderStatus::PaymentPending {
            return Ok(order);
        }

        let status = self.payments.fetch_order_status(provider_order_ref).await?;
        match status.state {
            PaymentState::Paid => return self.complete_buy(provider_order_ref).await,
            PaymentState::Attempted => {
                tracing::info!(order_id = %order.id, "Payment attempt failed, order still open");
                return Ok(order);
            }
            PaymentState::Created | PaymentState::Failed => {}
        }

        match self
            .orders
            .update_status(order.id, OrderStatus::PaymentPending, OrderStatus::Failed)
            .await?
        {
            Some(failed) => {
                tracing::info!(order_id = %failed.id, "Buy payment failed");
                Ok(failed)
            }
            None => Ok(self.orders.get_by_id(order.id).await?),
        }
    }

    pub async fn cancel_order(&self, user_id: &str, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.get_order_by_id(user_id, order_id).await?;
        if order.side != OrderSide::Buy {
            return Err(AppError::BadRequest("sell orders settle immediately".to_string()));
        }

        self.orders
            .update_status(order.id, OrderStatus::PaymentPending, OrderStatus::Cancelled)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("order {} can no longer be cancelled", order.id)))
    }

    /// Sells `quantity` grams at the current sell price and settles at once.
    pub async fn initiate_sell(
        &self,
        user_id: &str,
        quantity: BigDecimal,
        metal: MetalType,
    ) -> Result<Order, AppError> {
        let quantity = quantity.with_scale(QUANTITY_SCALE);
        if quantity <= BigDecimal::from(0) {
            return Err(AppError::Validation("quantity must be positive".to_string()));
        }

        let wallet = self.wallets.get(user_id).await?;
        let available = wallet.metal(metal);
        if *available < quantity {
            return Err(AppError::InsufficientBalance(format!(
                "requested {} g of {}, available {} g",
                quantity, metal, available
            )));
        }

        let price = self.prices.engine(metal).effective_price().await;
        let price_per_unit = to_decimal(price.sell_price, metal)?;
        let amount = (quantity.clone() * price_per_unit.clone()).with_scale(AMOUNT_SCALE);

        let mut order = Order::new(
            user_id.to_string(),
            OrderSide::Sell,
            metal,
            amount,
            quantity,
            price_per_unit,
        );
        order.transition(OrderStatus::Completed).map_err(AppError::Internal)?;

        let order = self.orders.settle_sell(&order).await?;
        tracing::info!(
            order_id = %order.id,
            user_id,
            metal = %metal,
            quantity = %order.quantity,
            amount = %order.amount_in_currency,
            "Sell settled"
        );
        Ok(order)
    }

    pub async fn get_user_orders(&self, user_id: &str, limit: i64, offset: i64) -> Result<Vec<Order>, AppError> {
        Ok(self.orders.list_for_user(user_id, limit, offset).await?)
    }

    pub async fn get_order_by_id(&self, user_id: &str, order_id: Uuid) -> Result<Order, AppError> {
        let order = self
            .orders
            .get_by_id(order_id)
            .await
            .map_err(|e| not_found(e, "order", &order_id.to_string()))?;
        if order.user_id != user_id {
            return Err(AppError::NotFound(format!("order {}", order_id)));
        }
        Ok(order)
    }

    pub async fn wallet_summary(&self, user_id: &str) -> Result<WalletSummary, AppError> {
        let balances = self.wallets.get(user_id).await?;

        let mut values = Vec::with_capacity(MetalType::ALL.len());
        for metal in MetalType::ALL {
            let price = self.prices.engine(metal).effective_price().await;
            let value = (balances.metal(metal).clone() * to_decimal(price.sell_price, metal)?).with_scale(AMOUNT_SCALE);
            values.push(value);
        }
        let gold_value = values[0].clone();
        let silver_value = values[1].clone();
        let total_value = balances.wallet_balance.clone() + gold_value.clone() + silver_value.clone();

        Ok(WalletSummary {
            balances,
            gold_value,
            silver_value,
            total_value,
            currency: self.currency.clone(),
        })
    }

    pub async fn get_user_transactions(
        &self,
        user_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        Ok(self.ledger.list_for_user(user_id, limit, offset).await?)
    }
}

/// Effective prices are plain floats; orders lock them as exact decimals.
fn to_decimal(price: f64, metal: MetalType) -> Result<BigDecimal, AppError> {
    if !(price.is_finite() && price > 0.0) {
        return Err(AppError::PriceUnavailable(format!("no usable {} price", metal)));
    }
    BigDecimal::from_str(&format!("{:.2}", price))
        .map_err(|e| AppError::PriceUnavailable(format!("{} price {}: {}", metal, price, e)))
}

fn minor_units(amount: &BigDecimal) -> Result<i64, AppError> {
    (amount.clone() * BigDecimal::from(100))
        .with_scale(0)
        .to_string()
        .parse()
        .map_err(|_| AppError::Validation(format!("amount {} is out of range", amount)))
}

fn not_found(e: RepositoryError, what: &str, key: &str) -> AppError {
    match e {
        RepositoryError::NotFound(_) => AppError::NotFound(format!("{} {}", what, key)),
        other => other.into(),
    }
}
