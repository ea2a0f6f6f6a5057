//! neo4j-metric-aggregator
//!
//! HTTP service answering annotation metrics for batches of concepts:
//! - `GET /concepts/metrics?uuids=a,b,c`
//! - `GET /__health`, `GET /__gtg`, `GET /__build-info`

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::info;

mod config;
mod handlers;
mod health;
mod logging;
mod server;

fn main() -> Result<()> {
    let cli = config::Cli::parse();
    logging::init(&cli.log_level, cli.log_format)?;
    let config = cli.into_config()?;

    info!(
        app_name = %config.app_name,
        app_system_code = %config.app_system_code,
        port = config.listen.port(),
        neo4j_endpoint = %config.neo4j.endpoint,
        neo4j_database = %config.neo4j.database,
        max_request_batch_size = config.max_request_batch_size,
        recent_window_secs = config.recent_window.as_secs(),
        "starting service"
    );

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))?;

    rt.block_on(server::serve(config))?;
    info!("service stopped");
    Ok(())
}
