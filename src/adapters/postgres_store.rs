//! Postgres implementation of the storage ports.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::{
    LedgerEntry, MetalType, Order, OrderStatus, PriceAlert, PriceObservation, WalletBalance,
};
use crate::ports::{
    AlertRepository, LedgerRepository, OrderRepository, PriceRepository, RepositoryError,
    RepositoryResult, Settlement, WalletRepository,
};

/// Postgres-backed store for prices, orders, ledger, wallets and alerts.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T>(column: &str, value: &str) -> RepositoryResult<T>
where
    T: FromStr<Err = String>,
{
    value
        .parse()
        .map_err(|e| RepositoryError::Database(format!("bad {} value: {}", column, e)))
}

/// Balance column for a metal. Only ever one of two static names.
fn balance_column(metal: MetalType) -> &'static str {
    match metal {
        MetalType::Gold => "gold_balance",
        MetalType::Silver => "silver_balance",
    }
}

#[async_trait]
impl PriceRepository for PostgresStore {
    async fn insert(&self, observation: &PriceObservation) -> RepositoryResult<PriceObservation> {
        let row = sqlx::query_as::<_, PriceRow>(
            r#"
            INSERT INTO price_observations (
                id, metal_type, buy_price, sell_price, currency, source, observed_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(observation.id)
        .bind(observation.metal_type.as_str())
        .bind(observation.buy_price)
        .bind(observation.sell_price)
        .bind(&observation.currency)
        .bind(&observation.source)
        .bind(observation.timestamp)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn latest(&self, metal: MetalType) -> RepositoryResult<Option<PriceObservation>> {
        let row = sqlx::query_as::<_, PriceRow>(
            "SELECT * FROM price_observations WHERE metal_type = $1 ORDER BY observed_at DESC LIMIT 1",
        )
        .bind(metal.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(PriceRow::into_domain).transpose()
    }

    async fn range(
        &self,
        metal: MetalType,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> RepositoryResult<Vec<PriceObservation>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT * FROM price_observations
            WHERE metal_type = $1 AND observed_at >= $2 AND observed_at <= $3
            ORDER BY observed_at ASC
            "#,
        )
        .bind(metal.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PriceRow::into_domain).collect()
    }

    async fn delete_older_than(&self, metal: MetalType, cutoff: DateTime<Utc>) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM price_observations WHERE metal_type = $1 AND observed_at < $2")
            .bind(metal.as_str())
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl OrderRepository for PostgresStore {
    async fn insert(&self, order: &Order) -> RepositoryResult<Order> {
        let mut conn = self.pool.acquire().await?;
        insert_order(&mut conn, order).await?.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn get_by_provider_ref(&self, provider_order_ref: &str) -> RepositoryResult<Order> {
        let row = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE provider_order_ref = $1")
            .bind(provider_order_ref)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(provider_order_ref.to_string()))?
            .into_domain()
    }

    async fn list_for_user(&self, user_id: &str, limit: i64, offset: i64) -> RepositoryResult<Vec<Order>> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderRow::into_domain).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: OrderStatus,
        to: OrderStatus,
    ) -> RepositoryResult<Option<Order>> {
        let row = sqlx::query_as::<_, OrderRow>(
            "UPDATE orders SET status = $3 WHERE id = $1 AND status = $2 RETURNING *",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.into_domain()?)),
            None => {
                // Distinguish "moved on" from "never existed".
                OrderRepository::get_by_id(self, id).await?;
                Ok(None)
            }
        }
    }

    async fn settle_buy(
        &self,
        order_id: Uuid,
        provider_payment_ref: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> RepositoryResult<Settlement> {
        let mut tx = self.pool.begin().await?;

        // Only one caller can win this conditional update.
        let row = sqlx::query_as::<_, OrderRow>(
            r#"
            UPDATE orders
            SET status = 'completed',
                completed_at = $2,
                provider_payment_ref = COALESCE($3, provider_payment_ref)
            WHERE id = $1 AND status IN ('payment_pending', 'failed')
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(completed_at)
        .bind(&provider_payment_ref)
        .fetch_optional(&mut *tx)
        .await?;

        let order = match row {
            Some(row) => row.into_domain()?,
            None => {
                tx.rollback().await?;
                let existing = OrderRepository::get_by_id(self, order_id).await?;
                return match existing.status {
                    OrderStatus::Completed => Ok(Settlement::AlreadySettled(existing)),
                    other => Err(RepositoryError::Conflict(format!(
                        "order {} is {} and cannot be settled",
                        order_id, other
                    ))),
                };
            }
        };

        let column = balance_column(order.metal_type);
        let credit = format!(
            "INSERT INTO wallets (user_id, {col}) VALUES ($1, $2) \
             ON CONFLICT (user_id) DO UPDATE SET {col} = wallets.{col} + EXCLUDED.{col}, updated_at = NOW()",
            col = column
        );
        sqlx::query(&credit)
            .bind(&order.user_id)
            .bind(&order.quantity)
            .execute(&mut *tx)
            .await?;

        insert_ledger_entry(&mut tx, &LedgerEntry::for_order(&order)).await?;

        tx.commit().await?;
        Ok(Settlement::Settled(order))
    }

    async fn settle_sell(&self, order: &Order) -> RepositoryResult<Order> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(&order.user_id)
            .execute(&mut *tx)
            .await?;

        let column = balance_column(order.metal_type);
        let debit = format!(
            "UPDATE wallets SET {col} = {col} - $2, wallet_balance = wallet_balance + $3, updated_at = NOW() \
             WHERE user_id = $1 AND {col} >= $2 RETURNING user_id",
            col = column
        );
        let debited: Option<(String,)> = sqlx::query_as(&debit)
            .bind(&order.user_id)
            .bind(&order.quantity)
            .bind(&order.amount_in_currency)
            .fetch_optional(&mut *tx)
            .await?;

        if debited.is_none() {
            let available: (BigDecimal,) =
                sqlx::query_as(&format!("SELECT {} FROM wallets WHERE user_id = $1", column))
                    .bind(&order.user_id)
                    .fetch_one(&mut *tx)
                    .await?;
            tx.rollback().await?;
            return Err(RepositoryError::InsufficientBalance {
                metal: order.metal_type,
                requested: order.quantity.clone(),
                available: available.0,
            });
        }

        let saved = insert_order(&mut tx, order).await?.into_domain()?;
        insert_ledger_entry(&mut tx, &LedgerEntry::for_order(&saved)).await?;

        tx.commit().await?;
        Ok(saved)
    }
}

async fn insert_order(conn: &mut sqlx::PgConnection, order: &Order) -> RepositoryResult<OrderRow> {
    let row = sqlx::query_as::<_, OrderRow>(
        r#"
        INSERT INTO orders (
            id, user_id, side, metal_type, amount_in_currency, quantity, price_per_unit,
            status, provider_order_ref, provider_payment_ref, created_at, completed_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        RETURNING *
        "#,
    )
    .bind(order.id)
    .bind(&order.user_id)
    .bind(order.side.as_str())
    .bind(order.metal_type.as_str())
    .bind(&order.amount_in_currency)
    .bind(&order.quantity)
    .bind(&order.price_per_unit)
    .bind(order.status.as_str())
    .bind(&order.provider_order_ref)
    .bind(&order.provider_payment_ref)
    .bind(order.created_at)
    .bind(order.completed_at)
    .fetch_one(conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("order {} already exists", order.id))
        }
        other => RepositoryError::from(other),
    })?;

    Ok(row)
}

async fn insert_ledger_entry(conn: &mut sqlx::PgConnection, entry: &LedgerEntry) -> RepositoryResult<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (
            id, user_id, amount, quantity, metal_type, kind, status, reference_order_id, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(entry.id)
    .bind(&entry.user_id)
    .bind(&entry.amount)
    .bind(&entry.quantity)
    .bind(entry.metal_type.as_str())
    .bind(entry.kind.as_str())
    .bind(&entry.status)
    .bind(entry.reference_order_id)
    .bind(entry.created_at)
    .execute(conn)
    .await?;

    Ok(())
}

#[async_trait]
impl LedgerRepository for PostgresStore {
    async fn list_for_user(&self, user_id: &str, limit: i64, offset: i64) -> RepositoryResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>(
            "SELECT * FROM ledger_entries WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(LedgerRow::into_domain).collect()
    }

    async fn list_for_order(&self, order_id: Uuid) -> RepositoryResult<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, LedgerRow>("SELECT * FROM ledger_entries WHERE reference_order_id = $1")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(LedgerRow::into_domain).collect()
    }
}

#[async_trait]
impl WalletRepository for PostgresStore {
    async fn get(&self, user_id: &str) -> RepositoryResult<WalletBalance> {
        let row = sqlx::query_as::<_, WalletRow>(
            "SELECT user_id, wallet_balance, gold_balance, silver_balance FROM wallets WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(WalletRow::into_domain)
            .unwrap_or_else(|| WalletBalance::empty(user_id)))
    }
}

#[async_trait]
impl AlertRepository for PostgresStore {
    async fn insert(&self, alert: &PriceAlert) -> RepositoryResult<PriceAlert> {
        let row = sqlx::query_as::<_, AlertRow>(
            r#"
            INSERT INTO price_alerts (
                id, user_id, metal_type, target_price, condition, frequency, status, triggered_at, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(alert.id)
        .bind(&alert.user_id)
        .bind(alert.metal_type.as_str())
        .bind(alert.target_price)
        .bind(alert.condition.as_str())
        .bind(alert.frequency.as_str())
        .bind(alert.status.as_str())
        .bind(alert.triggered_at)
        .bind(alert.created_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PriceAlert> {
        let row = sqlx::query_as::<_, AlertRow>("SELECT * FROM price_alerts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| RepositoryError::NotFound(id.to_string()))?
            .into_domain()
    }

    async fn list_for_user(&self, user_id: &str) -> RepositoryResult<Vec<PriceAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM price_alerts WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRow::into_domain).collect()
    }

    async fn list_active(&self, metal: MetalType) -> RepositoryResult<Vec<PriceAlert>> {
        let rows = sqlx::query_as::<_, AlertRow>(
            "SELECT * FROM price_alerts WHERE metal_type = $1 AND status = 'active'",
        )
        .bind(metal.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlertRow::into_domain).collect()
    }

    async fn update(&self, alert: &PriceAlert) -> RepositoryResult<Option<PriceAlert>> {
        let row = sqlx::query_as::<_, AlertRow>(
            "UPDATE price_alerts SET status = $2, triggered_at = $3 \
             WHERE id = $1 AND status = 'active' RETURNING *",
        )
        .bind(alert.id)
        .bind(alert.status.as_str())
        .bind(alert.triggered_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.into_domain()?)),
            None => {
                AlertRepository::get_by_id(self, alert.id).await?;
                Ok(None)
            }
        }
    }
}

// Internal row types for SQLx. Not exposed outside the adapter.

#[derive(Debug, sqlx::FromRow)]
struct PriceRow {
    id: Uuid,
    metal_type: String,
    buy_price: f64,
    sell_price: f64,
    currency: String,
    source: String,
    observed_at: DateTime<Utc>,
}

impl PriceRow {
    fn into_domain(self) -> RepositoryResult<PriceObservation> {
        Ok(PriceObservation {
            id: self.id,
            metal_type: parse_column("metal_type", &self.metal_type)?,
            buy_price: self.buy_price,
            sell_price: self.sell_price,
            currency: self.currency,
            source: self.source,
            timestamp: self.observed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: String,
    side: String,
    metal_type: String,
    amount_in_currency: BigDecimal,
    quantity: BigDecimal,
    price_per_unit: BigDecimal,
    status: String,
    provider_order_ref: Option<String>,
    provider_payment_ref: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl OrderRow {
    fn into_domain(self) -> RepositoryResult<Order> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            side: parse_column("side", &self.side)?,
            metal_type: parse_column("metal_type", &self.metal_type)?,
            amount_in_currency: self.amount_in_currency,
            quantity: self.quantity,
            price_per_unit: self.price_per_unit,
            status: parse_column("status", &self.status)?,
            provider_order_ref: self.provider_order_ref,
            provider_payment_ref: self.provider_payment_ref,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LedgerRow {
    id: Uuid,
    user_id: String,
    amount: BigDecimal,
    quantity: BigDecimal,
    metal_type: String,
    kind: String,
    status: String,
    reference_order_id: Uuid,
    created_at: DateTime<Utc>,
}

impl LedgerRow {
    fn into_domain(self) -> RepositoryResult<LedgerEntry> {
        Ok(LedgerEntry {
            id: self.id,
            user_id: self.user_id,
            amount: self.amount,
            quantity: self.quantity,
            metal_type: parse_column("metal_type", &self.metal_type)?,
            kind: parse_column("kind", &self.kind)?,
            status: self.status,
            reference_order_id: self.reference_order_id,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    user_id: String,
    wallet_balance: BigDecimal,
    gold_balance: BigDecimal,
    silver_balance: BigDecimal,
}

impl WalletRow {
    fn into_domain(self) -> WalletBalance {
        WalletBalance {
            user_id: self.user_id,
            wallet_balance: self.wallet_balance,
            gold_balance: self.gold_balance,
            silver_balance: self.silver_balance,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    id: Uuid,
    user_id: String,
    metal_type: String,
    target_price: f64,
    condition: String,
    frequency: String,
    status: String,
    triggered_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl AlertRow {
    fn into_domain(self) -> RepositoryResult<PriceAlert> {
        Ok(PriceAlert {
            id: self.id,
            user_id: self.user_id,
            metal_type: parse_column("metal_type", &self.metal_type)?,
            target_price: self.target_price,
            condition: parse_column("condition", &self.condition)?,
            frequency: parse_column("frequency", &self.frequency)?,
            status: parse_column("status", &self.status)?,
            triggered_at: self.triggered_at,
            created_at: self.created_at,
        })
    }
}
