//! betterspotlight-query service binary.

use std::path::PathBuf;

use anyhow::Context;
use betterspotlight_domain::constants::ipc::ENV_DATA_DIR;
use betterspotlight_ipc::{socket_path, ServiceRunner, SocketClient};
use betterspotlight_query::{QueryService, QueryServiceOptions};
use betterspotlight_store::SqliteStore;
use clap::Parser;

/// BetterSpotlight query service.
#[derive(Parser)]
#[command(name = "betterspotlight-query", version, about)]
struct Cli {}

fn data_dir() -> PathBuf {
    std::env::var(ENV_DATA_DIR).map_or_else(
        |_| {
            std::env::var("HOME").map_or_else(
                |_| std::env::temp_dir().join("betterspotlight"),
                |home| {
                    PathBuf::from(home)
                        .join(".local")
                        .join("share")
                        .join("betterspotlight")
                },
            )
        },
        PathBuf::from,
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let data_dir = data_dir();
    let store = SqliteStore::open(data_dir.join("index.db"))
        .await
        .context("failed to open store")?;

    // Peer clients are best-effort: the service degrades gracefully when a
    // peer is not up yet, and the clients reconnect on their own.
    let inference = match socket_path("inference") {
        Ok(path) => match SocketClient::connect(&path, 1_000).await {
            Ok(client) => {
                client.enable_auto_reconnect(u32::MAX, 1_000);
                Some(client)
            }
            Err(_) => None,
        },
        Err(_) => None,
    };
    let indexer = match socket_path("indexer") {
        Ok(path) => match SocketClient::connect(&path, 1_000).await {
            Ok(client) => {
                client.enable_auto_reconnect(u32::MAX, 1_000);
                Some(client)
            }
            Err(_) => None,
        },
        Err(_) => None,
    };

    let service = QueryService::start(
        store,
        QueryServiceOptions {
            data_dir,
            inference,
            indexer,
        },
    )
    .await
    .context("failed to start query core")?;

    let runner = ServiceRunner::start("query", service.method_handler())
        .await
        .context("failed to start query service")?;
    runner.run_until_shutdown().await;
    Ok(())
}
