// Retrace Helper - Privileged D-Bus service for snapshot comparison and file restore
// Started on demand by D-Bus activation; exits when idle

use anyhow::{Context, Result};
use retrace_common::{DBUS_OBJECT_PATH, DBUS_SERVICE_NAME, RetraceConfig};
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use zbus::Connection;

mod audit;
mod authority;
mod comparison;
mod operations;
mod restore;
mod service;
mod snapshots;
mod xattr;

use authority::PolkitGate;
use operations::Operations;
use service::{Activity, RetraceService};
use snapshots::BtrfsSnapshots;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Must run as root
    if nix::unistd::geteuid().as_raw() != 0 {
        log::error!("retrace-helper must be run as root");
        std::process::exit(1);
    }

    let config = RetraceConfig::new();
    log::info!(
        "Starting Retrace Helper service v{} ({} configurations from {})",
        env!("CARGO_PKG_VERSION"),
        config.configs.len(),
        config.config_file.display()
    );

    let idle_timeout = config.idle_timeout;
    let connection = Connection::system()
        .await
        .context("Failed to connect to the system bus")?;

    let gate = PolkitGate::new(connection.clone(), config.polkit_timeout);
    let activity = Arc::new(Activity::default());
    let ops = Operations::new(config, gate, BtrfsSnapshots::new());

    connection
        .object_server()
        .at(DBUS_OBJECT_PATH, RetraceService::new(ops, Arc::clone(&activity)))
        .await
        .context("Failed to register service object")?;
    connection
        .request_name(DBUS_SERVICE_NAME)
        .await
        .with_context(|| format!("Failed to acquire {DBUS_SERVICE_NAME}"))?;

    log::info!("Retrace Helper is ready at {}", DBUS_OBJECT_PATH);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => log::info!("Received SIGTERM, shutting down..."),
        _ = sigint.recv() => log::info!("Received SIGINT, shutting down..."),
        _ = activity.idle_or_quit(idle_timeout) => log::info!("Shutting down..."),
    }

    Ok(())
}
