use std::path::PathBuf;

use clap::{Parser, Subcommand};
use localpro_reconcile::Gateway;

#[derive(Parser)]
#[command(name = "localpro-reconciler")]
#[command(about = "Reconcile pending LocalPro payments against PayPal and PayMongo")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./localpro.toml when present)
    #[arg(short, long, global = true, env = "LOCALPRO_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scheduler until interrupted
    Run,
    /// Run one reconciliation pass and print its stats as JSON
    Once(OnceArgs),
    /// Validate configuration and show upcoming fire times
    CheckConfig(CheckConfigArgs),
}

#[derive(clap::Args)]
pub struct OnceArgs {
    /// Only sync this gateway (repeatable)
    #[arg(short, long = "gateway")]
    pub gateways: Vec<Gateway>,

    /// Override reconcile.max_concurrency for this run
    #[arg(long)]
    pub max_concurrency: Option<usize>,
}

#[derive(clap::Args)]
pub struct CheckConfigArgs {
    /// Number of upcoming fire times to list
    #[arg(long, default_value_t = 5)]
    pub upcoming: usize,
}
