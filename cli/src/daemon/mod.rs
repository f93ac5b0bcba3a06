// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon mode implementation
//!
//! Handles:
//! - Wiring the sweep orchestrator from configuration
//! - The sweep / sleep loop
//! - Graceful shutdown between sweeps

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use helm_cache_core::{
    application::sweep::SweepOrchestrator,
    domain::collector_config::CollectorConfigManifest,
    infrastructure::{
        chartmuseum_client::ChartMuseumClient,
        event_bus::{EventBus, EventBusError, EventReceiver},
        helm_packager::HelmPackager,
        kubernetes_lister::KubernetesSecretLister,
        workspace::ChartWorkspace,
    },
};

/// Build a [`SweepOrchestrator`] backed by the cluster, ChartMuseum and helm
pub fn build_orchestrator(config: &CollectorConfigManifest) -> Result<SweepOrchestrator> {
    let lister = KubernetesSecretLister::from_config(&config.spec.cluster)
        .context("Failed to configure Kubernetes access")?;

    let registry = ChartMuseumClient::from_config(&config.spec.registry)
        .context("Failed to configure ChartMuseum client")?;
    if !config.spec.registry.is_active() {
        warn!("No ChartMuseum URL configured; charts will be packaged locally but not published");
    }

    let packager = HelmPackager::from_config(&config.spec.helm);
    let workspace = ChartWorkspace::from_config(config);
    let event_bus = Arc::new(EventBus::with_default_capacity());

    Ok(SweepOrchestrator::new(
        Arc::new(lister),
        Arc::new(registry),
        Arc::new(packager),
        Arc::new(workspace),
        event_bus,
    ))
}

/// Sweep, sleep the scanning interval, repeat until Ctrl+C or SIGTERM.
///
/// A failed sweep is logged and the next one runs after the usual interval.
/// A signal received mid-sweep takes effect once that sweep finishes.
pub async fn run(config: CollectorConfigManifest) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;
    let interval = config.spec.scanning_interval;

    tokio::spawn(log_events(orchestrator.event_bus().subscribe()));

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    info!(
        home = %config.spec.home_directory.display(),
        registry = %config.spec.registry.url,
        interval = %humantime::format_duration(interval),
        "helm-cache daemon started"
    );

    loop {
        match orchestrator.run_sweep().await {
            Ok(summary) => {
                if summary.failed > 0 {
                    warn!("{}", summary);
                }
            }
            Err(e) => error!(error = %e, "Sweep failed"),
        }
        if let Some(cached) = orchestrator.cached_artifacts() {
            metrics::gauge!("helm_cache_registry_artifacts").set(cached as f64);
        }

        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("helm-cache daemon shutting down");
    Ok(())
}

/// Mirror collector events into the debug log
async fn log_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(event) => debug!(event = event.name(), "{:?}", event),
            Err(EventBusError::Lagged(skipped)) => {
                warn!(skipped, "Event log fell behind");
            }
            Err(_) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
