//! Satchel server binary

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use satchel::config::Args;
use satchel::db::MarketDb;
use satchel::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("satchel={},info", args.log_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Starting satchel v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Starting bonus: {} coins, approval reward: {} coins",
        args.starting_bonus, args.approval_reward
    );

    let db = Arc::new(MarketDb::open(&args.db_path)?);
    let state = Arc::new(AppState::new(args, db)?);

    server::run(state).await?;

    Ok(())
}
