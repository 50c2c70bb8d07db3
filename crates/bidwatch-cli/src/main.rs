use std::sync::Arc;

use anyhow::Result;
use bidwatch_store::open_store;
use bidwatch_sync::{build_scheduler, run_sync_once_from_env, SyncConfig, SyncPipeline};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "bidwatch")]
#[command(about = "Procurement feed collector and dashboard")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync cycle over all enabled feeds and exit.
    Sync,
    /// Serve the dashboard.
    Serve,
    /// Run the cron scheduler until interrupted.
    Watch,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = run_sync_once_from_env().await?;
            let totals = summary.totals();
            println!(
                "sync complete: run_id={} fetched={} inserted={} updated={} skipped={}",
                summary.run_id,
                summary.total_fetched(),
                totals.inserted,
                totals.updated,
                totals.skipped
            );
        }
        Commands::Serve => {
            bidwatch_web::serve_from_env().await?;
        }
        Commands::Watch => {
            let config = SyncConfig::from_env();
            let store = open_store(config.database_url.as_deref(), &config.data_dir).await;
            let pipeline = Arc::new(SyncPipeline::new(config, store));
            let sched = build_scheduler(pipeline).await?;
            sched.start().await?;
            info!("scheduler running, press ctrl-c to stop");
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
        }
    }

    Ok(())
}
