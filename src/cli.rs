use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::domain::MetalType;
use crate::startup::Services;

#[derive(Parser)]
#[command(name = "bullion-core")]
#[command(about = "Bullion Core - digital gold and silver backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and price scheduler (default)
    Serve,

    /// Price feed maintenance
    #[command(subcommand)]
    Prices(PriceCommands),

    /// Order reconciliation
    #[command(subcommand)]
    Orders(OrderCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum PriceCommands {
    /// Fetch a fresh price now, ignoring the update interval
    Refresh {
        #[arg(value_name = "METAL")]
        metal: MetalType,
    },

    /// Delete observations older than the retention window
    Cleanup,
}

#[derive(Subcommand)]
pub enum OrderCommands {
    /// Check a buy with the payment provider and settle it if paid
    Verify {
        #[arg(value_name = "PROVIDER_ORDER_REF")]
        provider_ref: String,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_price_refresh(services: &Services, metal: MetalType) -> anyhow::Result<()> {
    let update = services.state.prices.engine(metal).force_refresh().await;
    let observation = &update.observation;

    tracing::info!(metal = %metal, outcome = ?update.outcome, "Manual price refresh");
    println!(
        "✓ {} buy {:.2} / sell {:.2} {} ({})",
        metal, observation.buy_price, observation.sell_price, observation.currency, observation.source
    );

    Ok(())
}

pub async fn handle_price_cleanup(services: &Services) -> anyhow::Result<()> {
    let deleted = services.scheduler.run_retention().await;
    println!("✓ Removed {} expired price observations", deleted);
    Ok(())
}

pub async fn handle_order_verify(services: &Services, provider_ref: &str) -> anyhow::Result<()> {
    let order = services
        .state
        .orders
        .complete_buy(provider_ref)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to verify order {}: {}", provider_ref, e))?;

    tracing::info!(order_id = %order.id, status = %order.status, "Order verified from CLI");
    println!("✓ Order {} is {}", order.id, order.status);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = crate::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    crate::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Currency: {}", config.pricing.currency);
    println!("  Spread: {}%", config.pricing.spread_percent);
    println!("  Update Interval: {:?}", config.pricing.update_interval);
    println!("  Retention: {} days ({})", config.pricing.retention_days, config.retention_cron);
    for metal in MetalType::ALL {
        let settings = config.pricing.metal(metal);
        println!(
            "  {} bounds: [{}, {}], fallback {}/{}",
            metal, settings.min_price, settings.max_price, settings.fallback_buy, settings.fallback_sell
        );
    }
    println!("  Payment API: {}", config.payment.api_url);

    let pool = crate::db::create_pool(config).await?;
    let report = crate::startup::validate_environment(config, &pool).await?;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }
    tracing::info!("Configuration is valid");
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
