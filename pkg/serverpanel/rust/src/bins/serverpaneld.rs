// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, anyhow};
use serverpanel::domain::init_local_offset;
use serverpanel::infrastructure::{
    JavaLauncher, JavaRuntimeChecker, PaperArtifactFetcher, SysinfoSampler,
};
use serverpanel::{
    ConfigStore, PanelConfig, ProcessSupervisor, SupervisorPorts, resolve_storage_location,
};
use std::sync::Arc;
use tracing::info;

fn main() -> anyhow::Result<()> {
    // Must run before any other thread exists.
    init_local_offset();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?
        .block_on(run())
}

async fn run() -> anyhow::Result<()> {
    let config = PanelConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config
        .validate()
        .map_err(|e| anyhow!(e))
        .context("invalid configuration")?;

    let data_dir = resolve_storage_location(config.data_dir.clone());
    let store = Arc::new(ConfigStore::open(&data_dir));
    info!(
        data_dir = %data_dir.display(),
        servers_dir = %config.servers_dir.display(),
        java = %config.java,
        "serverpaneld starting"
    );

    let ports = SupervisorPorts {
        runtime: Arc::new(JavaRuntimeChecker::new(config.java.clone())),
        fetcher: Arc::new(PaperArtifactFetcher::new()),
        sampler: Arc::new(SysinfoSampler::new()),
        launcher: Arc::new(JavaLauncher::new(config.java.clone())),
    };
    let supervisor = ProcessSupervisor::new(store, config.supervisor_options(), ports);
    for server in supervisor.list() {
        info!(server = %server.name, status = %server.status, pid = ?server.pid, port = server.port, "registered server");
    }

    let poller = supervisor.liveness_poller(config.poll_interval);
    poller.start();

    shutdown_signal().await?;

    poller.stop().await;
    if config.stop_on_exit {
        info!("stopping all servers before exit");
        supervisor.stop_all().await;
    }
    info!("serverpaneld stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("received ctrl-c, shutting down");
    Ok(())
}
