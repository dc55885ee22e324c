mod cli;
mod config;
mod observability;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use localpro_db_postgres::PostgresStores;
use localpro_reconcile::{Gateway, ReconciliationEngine, ReconciliationScheduler, RunOptions, Schedule};
use tracing::{info, warn};

use cli::{CheckConfigArgs, Cli, Commands, OnceArgs};
use config::AppConfig;

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let log_filter = observability::init();
    let cli = Cli::parse();

    let cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    log_filter.apply(&cfg.logging.level);

    let result = match cli.command {
        Commands::Run => run(cfg).await,
        Commands::Once(args) => once(cfg, args).await,
        Commands::CheckConfig(args) => check_config(&cfg, &args),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn build_engine(cfg: &AppConfig) -> Result<Arc<ReconciliationEngine>> {
    let stores = PostgresStores::connect(&cfg.storage)
        .await
        .context("connecting to payment stores")?;

    let engine = ReconciliationEngine::builder()
        .with_repositories(stores.repositories())
        .with_gateway_clients(&cfg.paypal, &cfg.paymongo)
        .context("building gateway clients")?
        .with_config(&cfg.reconcile)
        .build();

    let gateways = engine.configured_gateways();
    if gateways.is_empty() {
        warn!("No payment gateway credentials configured; runs will skip every gateway");
    } else {
        info!(gateways = ?gateways, "Payment gateways configured");
    }
    Ok(Arc::new(engine))
}

async fn run(cfg: AppConfig) -> Result<()> {
    if !cfg.reconcile.enabled {
        warn!("Scheduled payment reconciliation disabled (reconcile.enabled = false)");
        return Ok(());
    }

    let engine = build_engine(&cfg).await?;
    let scheduler = ReconciliationScheduler::new(engine, &cfg.reconcile)?;
    if let Ok(next) = scheduler.upcoming(1)
        && let Some(first) = next.first()
    {
        info!(next_fire = %first, "First scheduled payment reconciliation");
    }
    scheduler.start();

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;

    info!("Shutdown requested, stopping scheduler");
    scheduler.stop();
    scheduler.wait_idle().await;
    Ok(())
}

async fn once(cfg: AppConfig, args: OnceArgs) -> Result<()> {
    let engine = build_engine(&cfg).await?;
    let options = RunOptions {
        gateways: (!args.gateways.is_empty()).then_some(args.gateways),
        max_concurrency: args.max_concurrency,
    };

    let stats = engine.run_once(&options).await;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

fn check_config(cfg: &AppConfig, args: &CheckConfigArgs) -> Result<()> {
    println!("{}", toml::to_string_pretty(&cfg.masked())?);

    for gateway in Gateway::ALL {
        let configured = match gateway {
            Gateway::PayPal => cfg.paypal.is_configured(),
            Gateway::PayMongo => cfg.paymongo.is_configured(),
        };
        let state = if configured { "configured" } else { "skipped (no credentials)" };
        println!("{gateway}: {state}");
    }

    let schedule = Schedule::parse(&cfg.reconcile.cron, &cfg.reconcile.timezone)?;
    println!(
        "\nNext {} fires ({} in {}):",
        args.upcoming,
        schedule.expression(),
        schedule.timezone()
    );
    for fire in schedule.upcoming_from_now(args.upcoming)? {
        println!("  {}", fire.to_rfc3339());
    }
    Ok(())
}
