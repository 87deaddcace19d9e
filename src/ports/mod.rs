//! Storage ports.
//! Services depend on these traits; `adapters` provides Postgres and in-memory implementations.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    LedgerEntry, MetalType, Order, OrderStatus, PriceAlert, PriceObservation, WalletBalance,
};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient {metal} balance: requested {requested}, available {available}")]
    InsufficientBalance {
        metal: MetalType,
        requested: BigDecimal,
        available: BigDecimal,
    },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of an attempt to settle a buy.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// This call completed the order, credited the balance and wrote the ledger entry.
    Settled(Order),
    /// Another caller settled it first. Nothing was mutated.
    AlreadySettled(Order),
}

impl Settlement {
    pub fn into_order(self) -> Order {
        match self {
            Settlement::Settled(order) | Settlement::AlreadySettled(order) => order,
        }
    }
}

/// Append-only price time series.
#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn insert(&self, observation: &PriceObservation) -> RepositoryResult<PriceObservation>;
    async fn latest(&self, metal: MetalType) -> RepositoryResult<Option<PriceObservation>>;
    /// Observations with `from <= timestamp <= to`, oldest first.
    async fn range(
        &self,
        metal: MetalType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<PriceObservation>>;
    async fn delete_older_than(&self, metal: MetalType, cutoff: DateTime<Utc>) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> RepositoryResult<Order>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Order>;
    async fn get_by_provider_ref(&self, provider_order_ref: &str) -> RepositoryResult<Order>;
    async fn list_for_user(&self, user_id: &str, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>>;
    /// Conditional status change. `None` when the order was no longer in `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepositoryResult<Option<Order>>;
    /// Complete a paid buy, credit the metal balance and append the ledger entry
    /// in one atomic step. Completing an already completed order is a no-op.
    async fn settle_buy(
        &self,
        order_id: Uuid,
        provider_payment_ref: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Settlement>;
    /// Persist a completed sell, debit the metal balance (only if sufficient),
    /// credit the wallet and append the ledger entry in one atomic step.
    async fn settle_sell(&self, order: &Order) -> RepositoryResult<Order>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn list_for_user(&self, user_id: &str, limit: i64, offset: i64) -> RepositoryResult<Vec<LedgerEntry>>;
    async fn list_for_order(&self, order_id: Uuid) -> RepositoryResult<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    /// Balances for `user_id`; a user with no row yet has zero balances.
    async fn get(&self, user_id: &str) -> RepositoryResult<WalletBalance>;
}

#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: &PriceAlert) -> RepositoryResult<PriceAlert>;
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PriceAlert>;
    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<PriceAlert>>;
    async fn list_active(&self, metal: MetalType) -> RepositoryResult<Vec<PriceAlert>>;
    /// Persist status and trigger time, only while the stored alert is still
    /// active. `Ok(None)` means it moved on (cancelled or triggered) meanwhile.
    async fn update(&self, alert: &PriceAlert) -> RepositoryResult<Option<PriceAlert>>;
}
