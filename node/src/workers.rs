//! Periodic workers and graceful shutdown.
//!
//! Every engine or service runs in its own tokio task that owns it, ticking
//! on a `tokio::time::interval`. Shutdown is broadcast through
//! [`ShutdownController`]; a worker only checks for it between ticks, so an
//! in-flight tick always runs to completion.

use std::time::Duration;

use async_trait::async_trait;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::release::BundleReleaseService;
use crate::resolver::TransferResolver;
use crate::restorer::BundleRestorer;
use crate::sync::{ResolutionSyncEngine, SyncVariant};

/// Coordinates graceful shutdown across all workers.
///
/// Workers call [`subscribe`](Self::subscribe) to get a receiver and
/// `select!` on it between ticks.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// One unit of periodic work. Errors are handled inside `tick`.
#[async_trait]
pub trait PeriodicTask: Send + 'static {
    fn name(&self) -> &'static str;

    async fn tick(&mut self);
}

/// Run `task` every `period` until shutdown is signalled.
pub fn spawn_periodic<T: PeriodicTask>(
    mut task: T,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!(worker = task.name(), "worker shutting down");
                    break;
                }
                _ = interval.tick() => {
                    task.tick().await;
                }
            }
        }
    })
}

#[async_trait]
impl<V: SyncVariant + 'static> PeriodicTask for ResolutionSyncEngine<V> {
    fn name(&self) -> &'static str {
        ResolutionSyncEngine::name(self)
    }

    async fn tick(&mut self) {
        // Failures are logged by the engine; the next tick retries the range.
        if let Ok(active) = self.ongoing_resolutions().await {
            tracing::debug!(engine = self.name(), active = active.len(), "sync tick");
        }
    }
}

#[async_trait]
impl PeriodicTask for BundleRestorer {
    fn name(&self) -> &'static str {
        "restorer"
    }

    async fn tick(&mut self) {
        match self.restore().await {
            Ok(report) if report.missing > 0 => tracing::info!(
                missing = report.missing,
                restored = report.restored.len(),
                abandoned = report.abandoned.len(),
                failed = report.failed.len(),
                "restore pass finished"
            ),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "restore pass failed"),
        }
    }
}

#[async_trait]
impl PeriodicTask for BundleReleaseService {
    fn name(&self) -> &'static str {
        "release"
    }

    async fn tick(&mut self) {
        match self.process().await {
            Ok(info) => tracing::debug!(
                total = info.total,
                started = info.transfers_started,
                transfered = info.transfered,
                "release tick"
            ),
            Err(e) => tracing::warn!(error = %e, "release tick failed"),
        }
    }
}

#[async_trait]
impl PeriodicTask for TransferResolver {
    fn name(&self) -> &'static str {
        "resolver"
    }

    async fn tick(&mut self) {
        match self.resolve_all().await {
            Ok(report) if !report.resolved.is_empty() || !report.failed.is_empty() => {
                tracing::info!(
                    resolved = report.resolved.len(),
                    failed = report.failed.len(),
                    "resolver tick"
                )
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "resolver tick failed"),
        }
    }
}
