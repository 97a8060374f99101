//! `run` and `rules` subcommands.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::watch;
use tracing::info;

use hivekeeper_core::HivekeeperConfig;
use hivekeeper_dispatch::{CommandDispatcher, HttpActuatorTransport, command_channel};
use hivekeeper_scheduler::Controller;
use hivekeeper_state::{HiveRepository, StateStore};

fn open_store(config: &HivekeeperConfig) -> anyhow::Result<StateStore> {
    let path = &config.store.path;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = StateStore::open(path).with_context(|| format!("opening {}", path.display()))?;
    info!(path = ?path, "state store opened");
    Ok(store)
}

pub async fn run(config: HivekeeperConfig) -> anyhow::Result<()> {
    info!("hivekeeper daemon starting");

    let interval_unit = config.interval_unit()?;
    let request_timeout = config.request_timeout()?;

    // ── Initialize subsystems ──────────────────────────────────

    let store: Arc<dyn HiveRepository> = Arc::new(open_store(&config)?);

    let (commands, command_rx) = command_channel();
    let transport = HttpActuatorTransport::new(config.dispatcher.actuator_port);
    let dispatcher = CommandDispatcher::new(store.clone(), transport)
        .with_request_timeout(request_timeout)
        .with_max_failed_keepalive(config.dispatcher.max_failed_keepalive);

    let controller = Controller::new(store, commands, interval_unit);

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let dispatcher_handle = tokio::spawn(dispatcher.run(command_rx, shutdown_rx));

    controller.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to install Ctrl-C handler")?;
    info!("shutdown signal received");

    controller.stop().await;
    let _ = shutdown_tx.send(true);
    let _ = dispatcher_handle.await;

    info!("hivekeeper daemon stopped");
    Ok(())
}

pub fn print_rules(config: &HivekeeperConfig) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let rules = store.list_rules()?;
    println!("{}", serde_json::to_string_pretty(&rules)?);
    Ok(())
}
