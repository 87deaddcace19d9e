use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::TradingHours;
use crate::services::alerts::AlertService;
use crate::services::price_engine::{PriceBook, PriceEngine};

pub const TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Drives the price feed: one tick per minute during trading hours, each
/// tick updating every metal concurrently, plus retention on a cron schedule.
pub struct PriceScheduler {
    prices: PriceBook,
    alerts: Arc<AlertService>,
    trading_hours: TradingHours,
    retention: chrono::Duration,
    retention_schedule: Schedule,
}

impl PriceScheduler {
    pub fn new(
        prices: PriceBook,
        alerts: Arc<AlertService>,
        trading_hours: TradingHours,
        retention_days: i64,
        retention_cron: &str,
    ) -> anyhow::Result<Self> {
        let retention_schedule = Schedule::from_str(retention_cron)
            .map_err(|e| anyhow::anyhow!("invalid RETENTION_CRON '{}': {}", retention_cron, e))?;

        Ok(Self {
            prices,
            alerts,
            trading_hours,
            retention: chrono::Duration::days(retention_days),
            retention_schedule,
        })
    }

    /// Starts the tick loop and the retention loop.
    pub fn spawn(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        let ticker = {
            let scheduler = self.clone();
            tokio::spawn(async move {
                tracing::info!(interval = ?TICK_INTERVAL, "Price scheduler started");
                let mut interval = tokio::time::interval(TICK_INTERVAL);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    scheduler.tick(Utc::now());
                }
            })
        };

        let retention = tokio::spawn(async move {
            loop {
                let Some(next) = self.retention_schedule.upcoming(Utc).next() else {
                    tracing::warn!("Retention schedule has no upcoming run");
                    return;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;
                self.run_retention().await;
            }
        });

        vec![ticker, retention]
    }

    /// One scheduler tick. Outside trading hours nothing happens. Inside, each
    /// metal's update runs in its own task so a slow provider for one metal
    /// never delays the other. The returned handles are only needed by callers
    /// that want to wait for the cycle.
    pub fn tick(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        if !self.trading_hours.contains(now) {
            tracing::debug!(%now, "Outside trading hours, skipping price update");
            return Vec::new();
        }

        self.prices
            .engines()
            .into_iter()
            .map(|engine| {
                let engine = engine.clone();
                let alerts = self.alerts.clone();
                tokio::spawn(async move { update_metal(&engine, &alerts).await })
            })
            .collect()
    }

    /// Deletes observations older than the retention horizon for every metal.
    pub async fn run_retention(&self) -> u64 {
        let mut total = 0;
        for engine in self.prices.engines() {
            match engine.cleanup(self.retention).await {
                Ok(deleted) => total += deleted,
                Err(e) => tracing::error!(metal = %engine.metal(), error = %e, "Price retention failed"),
            }
        }
        total
    }
}

async fn update_metal(engine: &PriceEngine, alerts: &AlertService) {
    let update = engine.update_price().await;
    if !update.is_market_data() {
        return;
    }

    let observation = &update.observation;
    if let Err(e) = alerts
        .evaluate(engine.metal(), observation.buy_price, observation.timestamp)
        .await
    {
        tracing::error!(metal = %engine.metal(), error = %e, "Alert evaluation failed");
    }
}
