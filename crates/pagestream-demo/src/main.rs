#![doc = include_str!("../README.md")]

mod config;
mod pager;
mod table;
mod telemetry;

use clap::Parser;
use config::{CliArgs, DemoConfig};
use telemetry::init_telemetry;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = DemoConfig::try_from(args)?;

    init_telemetry()?;
    log_startup_info(&config);

    tokio::select! {
        res = pager::run(&config) => {
            let summary = res?;
            tracing::info!(
                rows = summary.rows,
                last_id = ?summary.last_id,
                queries = summary.queries,
                "Paging finished"
            );
        }
        res = signal::ctrl_c() => {
            res?;
            tracing::info!("Received Ctrl+C signal, stopping");
        }
    }

    Ok(())
}

fn log_startup_info(config: &DemoConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Paging with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Paging {} rows, {} per page",
            config.table_rows,
            config.page_size
        );
    }
}
