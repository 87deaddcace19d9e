use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use crate::services::PriceBook;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn unhealthy(error: impl Into<String>) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.into(),
        }
    }

    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    fn name(&self) -> &'static str;
    /// A failing critical dependency makes the service unhealthy, others only degrade it.
    fn critical(&self) -> bool {
        false
    }
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn critical(&self) -> bool {
        true
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e.to_string()),
        }
    }
}

/// Reports the feed as unhealthy when any metal's effective price is older than `max_age`.
pub struct PriceFeedChecker {
    prices: PriceBook,
    max_age: chrono::Duration,
}

impl PriceFeedChecker {
    pub fn new(prices: PriceBook, max_age: chrono::Duration) -> Self {
        Self { prices, max_age }
    }
}

#[async_trait]
impl DependencyChecker for PriceFeedChecker {
    fn name(&self) -> &'static str {
        "price_feed"
    }

    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        for engine in self.prices.engines() {
            let price = engine.effective_price().await;
            let age = Utc::now() - price.timestamp;
            if age > self.max_age {
                return DependencyStatus::unhealthy(format!(
                    "{} price is {} minutes old (source {})",
                    engine.metal(),
                    age.num_minutes(),
                    price.source
                ));
            }
        }
        DependencyStatus::healthy(start)
    }
}

pub async fn check_health(checkers: &[Arc<dyn DependencyChecker>], start_time: Instant) -> HealthResponse {
    let timeout_duration = Duration::from_secs(5);

    let results = futures::future::join_all(
        checkers
            .iter()
            .map(|checker| async move { (checker.clone(), timeout(timeout_duration, checker.check()).await) }),
    )
    .await;

    let mut dependencies = HashMap::new();
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (checker, result) in results {
        let status = result.unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if checker.critical() {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
        dependencies.insert(checker.name().to_string(), status);
    }

    let status = if has_critical_failure {
        "unhealthy"
    } else if has_non_critical_failure {
        "degraded"
    } else {
        "healthy"
    };

    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: start_time.elapsed().as_secs(),
        dependencies,
    }
}
