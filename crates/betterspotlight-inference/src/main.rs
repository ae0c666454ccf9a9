//! betterspotlight-inference service binary.

use anyhow::Context;
use betterspotlight_inference::InferenceService;
use betterspotlight_ipc::ServiceRunner;
use clap::Parser;

/// BetterSpotlight inference service.
#[derive(Parser)]
#[command(name = "betterspotlight-inference", version, about)]
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

    let service = InferenceService::new();
    let runner = ServiceRunner::start("inference", service.method_handler())
        .await
        .context("failed to start inference service")?;
    runner.run_until_shutdown().await;
    service.shutdown();
    Ok(())
}
