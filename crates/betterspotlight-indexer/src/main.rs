//! betterspotlight-indexer service binary.

use std::sync::Arc;

use anyhow::Context;
use betterspotlight_extractor::NativeExtractor;
use betterspotlight_indexer::service::{default_db_path, IndexerService};
use betterspotlight_ipc::ServiceRunner;
use betterspotlight_store::SqliteStore;
use clap::Parser;

/// BetterSpotlight indexing service.
#[derive(Parser)]
#[command(name = "betterspotlight-indexer", version, about)]
struct Cli {}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store = SqliteStore::open(default_db_path())
        .await
        .context("failed to open store")?;
    let service = IndexerService::start(store, Arc::new(NativeExtractor::new()))
        .await
        .context("failed to start indexer core")?;

    let runner = ServiceRunner::start("indexer", service.method_handler())
        .await
        .context("failed to start indexer service")?;
    runner.run_until_shutdown().await;
    service.shutdown();
    Ok(())
}
