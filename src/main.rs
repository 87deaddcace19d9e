use bullion_core::cli::{self, Cli, Commands, DbCommands, OrderCommands, PriceCommands};
use bullion_core::config::Config;
use bullion_core::{create_app, db, startup};
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Prices(command) => {
            let pool = db::create_pool(&config).await?;
            let services = startup::build_services(&config, pool)?;
            match command {
                PriceCommands::Refresh { metal } => cli::handle_price_refresh(&services, metal).await,
                PriceCommands::Cleanup => cli::handle_price_cleanup(&services).await,
            }
        }
        Commands::Orders(OrderCommands::Verify { provider_ref }) => {
            let pool = db::create_pool(&config).await?;
            let services = startup::build_services(&config, pool)?;
            cli::handle_order_verify(&services, &provider_ref).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let report = startup::validate_environment(&config, &pool).await?;
    report.print();
    if !report.environment || !report.database {
        anyhow::bail!("Startup validation failed");
    }
    if !report.fx {
        tracing::warn!("FX provider unreachable, prices will use the last known or default rate");
    }

    let services = startup::build_services(&config, pool)?;
    let _workers = services.scheduler.clone().spawn();

    let app = create_app(services.state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
