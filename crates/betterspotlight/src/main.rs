//! BetterSpotlight host binary: initializes the runtime environment,
//! reconciles orphan instances, supervises the four services and tears
//! everything down on SIGINT/SIGTERM.

use anyhow::Context;
use betterspotlight::AppConfig;
use betterspotlight_runtime::{
    cleanup_orphan_runtime_directories, init_runtime_context, Supervisor, SupervisorEvent,
};
use clap::Parser;
use tracing::{info, warn};

/// BetterSpotlight host process.
#[derive(Parser)]
#[command(name = "betterspotlight", version, about)]
struct Cli {}

const SERVICES: [&str; 4] = [
    "betterspotlight-indexer",
    "betterspotlight-extractor",
    "betterspotlight-inference",
    "betterspotlight-query",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_filter.clone())),
        )
        .init();

    let context = init_runtime_context().context("failed to initialize runtime environment")?;
    let removed = cleanup_orphan_runtime_directories(&context);
    if !removed.is_empty() {
        info!(count = removed.len(), "reconciled orphan runtime directories");
    }

    let supervisor = Supervisor::new(context);
    supervisor.set_child_env(
        betterspotlight_domain::constants::ipc::ENV_DATA_DIR,
        &config.data_dir.display().to_string(),
    );
    for service in SERVICES {
        let short_name = service.trim_start_matches("betterspotlight-");
        supervisor
            .add_service(short_name, config.service_binary(service))
            .await;
    }

    let mut events = supervisor.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SupervisorEvent::AllServicesReady => info!("all services ready"),
                SupervisorEvent::ServiceCrashed { name, crash_count } => {
                    warn!(service = %name, crash_count, "service crashed");
                }
                _ => {}
            }
        }
    });

    if !supervisor.start_all().await {
        warn!("one or more services failed to spawn");
    }

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
    }

    supervisor.stop_all().await;
    Ok(())
}
