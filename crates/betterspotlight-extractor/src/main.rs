//! betterspotlight-extractor service binary.

use anyhow::Context;
use betterspotlight_ipc::ServiceRunner;
use clap::Parser;

/// BetterSpotlight extraction service.
#[derive(Parser)]
#[command(name = "betterspotlight-extractor", version, about)]
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

    let runner = ServiceRunner::start("extractor", betterspotlight_extractor::service::method_handler())
        .await
        .context("failed to start extractor service")?;
    runner.run_until_shutdown().await;
    Ok(())
}
