use anyhow::{Context, Result};
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::adapters::PostgresStore;
use crate::config::Config;
use crate::health::{DependencyChecker, PostgresChecker, PriceFeedChecker};
use crate::providers::{
    GoldApiProvider, GuardedClient, LogNotifier, MetalsLiveProvider, Notifier, OpenExchangeRatesClient,
    PriceProvider, PushGatewayNotifier, RatesApiProvider, RazorpayClient,
};
use crate::services::{AlertService, FxRateCache, OrderService, PriceAnalytics, PriceBook, PriceScheduler};
use crate::AppState;

/// Everything the server and the CLI commands need, wired against Postgres.
pub struct Services {
    pub state: AppState,
    pub scheduler: Arc<PriceScheduler>,
}

/// Providers in priority order. Keyed APIs are only used when a key is configured.
pub fn build_price_providers(config: &Config) -> Vec<Arc<dyn PriceProvider>> {
    let timeout = config.pricing.provider_timeout;
    let p = &config.providers;
    let mut providers: Vec<Arc<dyn PriceProvider>> = Vec::new();

    if let Some(key) = &p.goldapi_key {
        providers.push(Arc::new(GoldApiProvider::new(
            GuardedClient::new("goldapi", timeout),
            p.goldapi_url.clone(),
            key.clone(),
        )));
    }
    if let Some(key) = &p.metals_api_key {
        providers.push(Arc::new(RatesApiProvider::new(
            GuardedClient::new("metals-api", timeout),
            p.metals_api_url.clone(),
            key.clone(),
            "access_key",
            "symbols",
        )));
    }
    if let Some(key) = &p.metalprice_api_key {
        providers.push(Arc::new(RatesApiProvider::new(
            GuardedClient::new("metalpriceapi", timeout),
            p.metalprice_api_url.clone(),
            key.clone(),
            "api_key",
            "currencies",
        )));
    }
    if let Some(url) = &p.metals_live_url {
        providers.push(Arc::new(MetalsLiveProvider::new(
            GuardedClient::new("metals-live", timeout),
            url.clone(),
        )));
    }

    if providers.is_empty() {
        tracing::warn!("No price providers configured, prices will be synthetic");
    }
    providers
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    match (
        &config.notifications.push_gateway_url,
        &config.notifications.push_gateway_secret,
    ) {
        (Some(url), Some(secret)) => Arc::new(PushGatewayNotifier::new(
            GuardedClient::new("push-gateway", config.pricing.provider_timeout),
            url.clone(),
            secret.clone(),
        )),
        _ => {
            tracing::info!("No push gateway configured, notifications are logged only");
            Arc::new(LogNotifier)
        }
    }
}

pub fn build_services(config: &Config, pool: PgPool) -> Result<Services> {
    let store = Arc::new(PostgresStore::new(pool.clone()));
    let timeout = config.pricing.provider_timeout;

    let fx = Arc::new(FxRateCache::new(
        Arc::new(OpenExchangeRatesClient::new(
            GuardedClient::new("fx", timeout),
            config.providers.fx_api_url.clone(),
        )),
        config.pricing.currency.clone(),
        config.pricing.fx_max_age,
        config.pricing.fx_default_rate,
    ));

    let prices = PriceBook::build(&config.pricing, build_price_providers(config), fx, store.clone());

    let payments = Arc::new(RazorpayClient::new(
        GuardedClient::new("razorpay", timeout),
        config.payment.api_url.clone(),
        config.payment.key_id.clone(),
        config.payment.key_secret.clone(),
    ));

    let orders = Arc::new(OrderService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        payments,
        prices.clone(),
        config.pricing.currency.clone(),
        config.min_buy_amount.clone(),
    ));
    let alerts = Arc::new(AlertService::new(store.clone(), build_notifier(config), prices.clone()));

    let scheduler = Arc::new(PriceScheduler::new(
        prices.clone(),
        alerts.clone(),
        config.trading_hours.clone(),
        config.pricing.retention_days,
        &config.retention_cron,
    )?);

    let health_checkers: Vec<Arc<dyn DependencyChecker>> = vec![
        Arc::new(PostgresChecker::new(pool)),
        Arc::new(PriceFeedChecker::new(prices.clone(), chrono::Duration::hours(24))),
    ];

    let state = AppState {
        analytics: PriceAnalytics::new(store),
        prices,
        orders,
        alerts,
        webhook_secret: config.payment.webhook_secret.clone(),
        refresh_limiter: crate::refresh_limiter(config.refresh_per_minute),
        health_checkers: Arc::new(health_checkers),
        start_time: Instant::now(),
    };

    Ok(Services { state, scheduler })
}

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub fx: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.fx
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("FX Provider:           {}", status(self.fx));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        fx: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    if let Err(e) = validate_url_reachable(&config.providers.fx_api_url).await {
        report.fx = false;
        report.errors.push(format!("FX: {}", e));
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.payment.webhook_secret.is_empty() {
        anyhow::bail!("PAYMENT_WEBHOOK_SECRET is empty");
    }

    for (name, value) in [
        ("RAZORPAY_API_URL", &config.payment.api_url),
        ("FX_API_URL", &config.providers.fx_api_url),
        ("GOLDAPI_URL", &config.providers.goldapi_url),
    ] {
        url::Url::parse(value).with_context(|| format!("{} is not a valid URL", name))?;
    }

    cron::Schedule::from_str(&config.retention_cron)
        .map_err(|e| anyhow::anyhow!("RETENTION_CRON is invalid: {}", e))?;
    config.pricing.validate()?;

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_url_reachable(url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;

    if response.status().is_server_error() {
        anyhow::bail!("{} returned status: {}", url, response.status());
    }

    Ok(())
}
