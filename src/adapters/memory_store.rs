//! In-memory implementation of every storage port.
//! One mutex guards all collections so settlements are atomic, like a DB transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::{
    AlertStatus, LedgerEntry, MetalType, Order, OrderStatus, PriceAlert, PriceObservation,
    WalletBalance,
};
use crate::ports::{
    AlertRepository, LedgerRepository, OrderRepository, PriceRepository, RepositoryError,
    RepositoryResult, Settlement, WalletRepository,
};

#[derive(Default)]
struct MemoryState {
    prices: Vec<PriceObservation>,
    orders: HashMap<Uuid, Order>,
    ledger: Vec<LedgerEntry>,
    wallets: HashMap<String, WalletBalance>,
    alerts: HashMap<Uuid, PriceAlert>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> RepositoryResult<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Database("in-memory store lock poisoned".to_string()))
    }

    /// Replace a user's balances. Used to open accounts with existing holdings.
    pub fn seed_wallet(&self, wallet: WalletBalance) -> RepositoryResult<()> {
        self.state()?.wallets.insert(wallet.user_id.clone(), wallet);
        Ok(())
    }
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn page<T: Clone>(items: &[T], limit: i64, offset: i64) -> Vec<T> {
    items
        .iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl PriceRepository for InMemoryStore {
    async fn insert(&self, observation: &PriceObservation) -> RepositoryResult<PriceObservation> {
        self.state()?.prices.push(observation.clone());
        Ok(observation.clone())
    }

    async fn latest(&self, metal: MetalType) -> RepositoryResult<Option<PriceObservation>> {
        let state = self.state()?;
        Ok(state
            .prices
            .iter()
            .rev()
            .find(|p| p.metal_type == metal)
            .cloned())
    }

    async fn range(
        &self,
        metal: MetalType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<PriceObservation>> {
        let state = self.state()?;
        let mut rows: Vec<PriceObservation> = state
            .prices
            .iter()
            .filter(|p| p.metal_type == metal && p.timestamp >= from && p.timestamp <= to)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.timestamp);
        Ok(rows)
    }

    async fn delete_older_than(&self, metal: MetalType, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let mut state = self.state()?;
        let before = state.prices.len();
        state
            .prices
            .retain(|p| p.metal_type != metal || p.timestamp >= cutoff);
        Ok((before - state.prices.len()) as u64)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert(&self, order: &Order) -> RepositoryResult<Order> {
        let mut state = self.state()?;
        if state.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(format!("order {} already exists", order.id)));
        }
        if let Some(reference) = &order.provider_order_ref {
            let taken = state
                .orders
                .values()
                .any(|o| o.provider_order_ref.as_deref() == Some(reference.as_str()));
            if taken {
                return Err(RepositoryError::Conflict(format!(
                    "provider order {} already linked",
                    reference
                )));
            }
        }
        state.orders.insert(order.id, order.clone());
        Ok(order.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Order> {
        self.state()?
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn get_by_provider_ref(&self, provider_order_ref: &str) -> RepositoryResult<Order> {
        self.state()?
            .orders
            .values()
            .find(|o| o.provider_order_ref.as_deref() == Some(provider_order_ref))
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(provider_order_ref.to_string()))
    }

    async fn list_for_user(&self, user_id: &str, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>> {
        let state = self.state()?;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut orders, |o| o.created_at);
        Ok(page(&orders, limit, offset))
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepositoryResult<Option<Order>> {
        let mut state = self.state()?;
        let order = state
            .orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))?;
        if order.status != from {
            return Ok(None);
        }
        order.status = to;
        Ok(Some(order.clone()))
    }

    async fn settle_buy(
        &self,
        order_id: Uuid,
        provider_payment_ref: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Settlement> {
        let mut state = self.state()?;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| RepositoryError::NotFound(order_id.to_string()))?;

        match order.status {
            OrderStatus::Completed => return Ok(Settlement::AlreadySettled(order.clone())),
            OrderStatus::PaymentPending | OrderStatus::Failed => {}
            other => {
                return Err(RepositoryError::Conflict(format!(
                    "order {} is {} and cannot be settled",
                    order_id, other
                )))
            }
        }

        order.status = OrderStatus::Completed;
        order.completed_at = Some(completed_at);
        if provider_payment_ref.is_some() {
            order.provider_payment_ref = provider_payment_ref;
        }
        let settled = order.clone();

        let wallet = state
            .wallets
            .entry(settled.user_id.clone())
            .or_insert_with(|| WalletBalance::empty(settled.user_id.clone()));
        let current = wallet.metal(settled.metal_type).clone();
        *wallet.metal_mut(settled.metal_type) = current + settled.quantity.clone();

        state.ledger.push(LedgerEntry::for_order(&settled));
        Ok(Settlement::Settled(settled))
    }

    async fn settle_sell(&self, order: &Order) -> RepositoryResult<Order> {
        let mut state = self.state()?;
        if state.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(format!("order {} already exists", order.id)));
        }

        let wallet = state
            .wallets
            .entry(order.user_id.clone())
            .or_insert_with(|| WalletBalance::empty(order.user_id.clone()));
        let available = wallet.metal(order.metal_type).clone();
        if available < order.quantity {
            return Err(RepositoryError::InsufficientBalance {
                metal: order.metal_type,
                requested: order.quantity.clone(),
                available,
            });
        }
        *wallet.metal_mut(order.metal_type) = available - order.quantity.clone();
        wallet.wallet_balance = wallet.wallet_balance.clone() + order.amount_in_currency.clone();

        state.orders.insert(order.id, order.clone());
        state.ledger.push(LedgerEntry::for_order(order));
        Ok(order.clone())
    }
}

#[async_trait]
impl LedgerRepository for InMemoryStore {
    async fn list_for_user(&self, user_id: &str, limit: i64, offset: i64) -> RepositoryResult<Vec<LedgerEntry>> {
        let state = self.state()?;
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut entries, |e| e.created_at);
        Ok(page(&entries, limit, offset))
    }

    async fn list_for_order(&self, order_id: Uuid) -> RepositoryResult<Vec<LedgerEntry>> {
        Ok(self
            .state()?
            .ledger
            .iter()
            .filter(|e| e.reference_order_id == order_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WalletRepository for InMemoryStore {
    async fn get(&self, user_id: &str) -> RepositoryResult<WalletBalance> {
        Ok(self
            .state()?
            .wallets
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| WalletBalance::empty(user_id)))
    }
}

#[async_trait]
impl AlertRepository for InMemoryStore {
    async fn insert(&self, alert: &PriceAlert) -> RepositoryResult<PriceAlert> {
        self.state()?.alerts.insert(alert.id, alert.clone());
        Ok(alert.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PriceAlert> {
        self.state()?
            .alerts
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<PriceAlert>> {
        let state = self.state()?;
        let mut alerts: Vec<PriceAlert> = state
            .alerts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        newest_first(&mut alerts, |a| a.created_at);
        Ok(alerts)
    }

    async fn list_active(&self, metal: MetalType) -> RepositoryResult<Vec<PriceAlert>> {
        Ok(self
            .state()?
            .alerts
            .values()
            .filter(|a| a.metal_type == metal && a.status == AlertStatus::Active)
            .cloned()
            .collect())
    }

    async fn update(&self, alert: &PriceAlert) -> RepositoryResult<Option<PriceAlert>> {
        let mut state = self.state()?;
        match state.alerts.get_mut(&alert.id) {
            Some(stored) if stored.status == AlertStatus::Active => {
                stored.status = alert.status;
                stored.triggered_at = alert.triggered_at;
                Ok(Some(stored.clone()))
            }
            Some(_) => Ok(None),
            None => Err(RepositoryError::NotFound(alert.id.to_string())),
        }
    }
}
