//! The shelter node: wires the sync engines and services to their
//! collaborators and runs each one as a periodic worker.

use std::sync::Arc;

use shelter_ledger::{BundleDownloader, LedgerEventSource, ShelteringContract};
use shelter_store::{BundleRepository, CheckpointStore, StoreError};
use shelter_store_lmdb::LmdbEnvironment;
use shelter_types::{Address, Clock};
use tokio::task::JoinHandle;

use crate::activity_log::ActivityLog;
use crate::config::ShelterConfig;
use crate::cooldown::FailedResolutions;
use crate::metrics::ShelterMetrics;
use crate::release::BundleReleaseService;
use crate::resolver::TransferResolver;
use crate::restorer::{BundleRestorer, PayloadHandling};
use crate::sync::{
    ResolutionSyncEngine, RetirementTransferEvents, ShelteringEvents, TransferEvents,
};
use crate::workers::{spawn_periodic, ShutdownController};
use crate::NodeError;

/// LMDB map size of the checkpoint database.
const CHECKPOINT_MAP_SIZE: usize = 64 * 1024 * 1024;

/// External systems the node talks to.
pub struct Collaborators {
    pub ledger: Arc<dyn LedgerEventSource>,
    pub contract: Arc<dyn ShelteringContract>,
    pub downloader: Arc<dyn BundleDownloader>,
    pub repository: Arc<dyn BundleRepository>,
    pub checkpoints: Arc<dyn CheckpointStore>,
    pub clock: Arc<dyn Clock>,
}

/// Open the LMDB checkpoint store under `config.data_dir`, refusing to
/// start on a database that fails its integrity check.
pub fn open_checkpoint_store(config: &ShelterConfig) -> Result<Arc<dyn CheckpointStore>, NodeError> {
    let env = LmdbEnvironment::open(&config.data_dir, CHECKPOINT_MAP_SIZE).map_err(StoreError::from)?;
    let report = env.integrity_report().map_err(StoreError::from)?;
    if !report.is_healthy() {
        return Err(StoreError::Corruption(report.errors.join("; ")).into());
    }
    tracing::info!(
        data_dir = %config.data_dir.display(),
        entries = report.total_entries,
        "checkpoint store ready"
    );
    Ok(Arc::new(env.checkpoint_store()))
}

/// A running shelter node.
pub struct ShelterNode {
    pub config: ShelterConfig,
    pub address: Address,
    pub metrics: Arc<ShelterMetrics>,
    pub activity: Arc<ActivityLog>,
    pub shutdown: Arc<ShutdownController>,
    task_handles: Vec<JoinHandle<()>>,
}

impl ShelterNode {
    /// Build every worker and spawn it. Must be called inside a tokio
    /// runtime.
    pub fn start(config: ShelterConfig, collaborators: Collaborators) -> Result<Self, NodeError> {
        let address = config.node_address()?;
        let metrics = Arc::new(ShelterMetrics::new());
        let activity = Arc::new(ActivityLog::new(
            config.activity_log_capacity,
            collaborators.clock.clone(),
        ));
        let shutdown = Arc::new(ShutdownController::new());
        let step = config.event_fetch_step;
        let lookback = config.transfer_lookback_blocks();

        let mut task_handles = Vec::new();

        let sheltering = ResolutionSyncEngine::new(
            ShelteringEvents::new(address.clone(), step, config.onboarding_scan_chunk),
            collaborators.ledger.clone(),
        )
        .with_snapshots(collaborators.checkpoints.clone())
        .with_metrics(metrics.clone());
        let handling = if config.unpack_bundles {
            PayloadHandling::Unpack
        } else {
            PayloadHandling::Whole
        };
        let restorer = BundleRestorer::new(
            sheltering,
            collaborators.contract.clone(),
            collaborators.downloader.clone(),
            collaborators.repository.clone(),
        )
        .with_handling(handling)
        .with_activity_log(activity.clone())
        .with_metrics(metrics.clone());
        task_handles.push(spawn_periodic(
            restorer,
            config.restore_interval(),
            shutdown.subscribe(),
        ));

        let inbound = ResolutionSyncEngine::new(
            TransferEvents::inbound(address.clone(), step, lookback),
            collaborators.ledger.clone(),
        )
        .with_snapshots(collaborators.checkpoints.clone());
        let resolver = TransferResolver::new(
            inbound,
            collaborators.contract.clone(),
            collaborators.downloader.clone(),
            collaborators.repository.clone(),
            FailedResolutions::new(config.failed_start_cooldown_secs, collaborators.clock.clone()),
        )
        .with_activity_log(activity.clone())
        .with_metrics(metrics.clone());
        task_handles.push(spawn_periodic(
            resolver,
            config.resolve_interval(),
            shutdown.subscribe(),
        ));

        if config.retire {
            let retirement = ResolutionSyncEngine::new(
                RetirementTransferEvents::new(address.clone(), step, lookback),
                collaborators.ledger.clone(),
            )
            .with_snapshots(collaborators.checkpoints.clone());
            let release = BundleReleaseService::new(
                retirement,
                collaborators.contract.clone(),
                collaborators.repository.clone(),
                FailedResolutions::new(
                    config.failed_start_cooldown_secs,
                    collaborators.clock.clone(),
                ),
                config.release_concurrency,
            )
            .with_activity_log(activity.clone())
            .with_metrics(metrics.clone());
            task_handles.push(spawn_periodic(
                release,
                config.release_interval(),
                shutdown.subscribe(),
            ));
        } else {
            let outbound = ResolutionSyncEngine::new(
                TransferEvents::outbound(address.clone(), step, lookback),
                collaborators.ledger.clone(),
            )
            .with_snapshots(collaborators.checkpoints.clone());
            task_handles.push(spawn_periodic(
                outbound,
                config.sync_interval(),
                shutdown.subscribe(),
            ));
        }

        tracing::info!(
            node = %address,
            retire = config.retire,
            workers = task_handles.len(),
            "shelter node started"
        );

        Ok(Self {
            config,
            address,
            metrics,
            activity,
            shutdown,
            task_handles,
        })
    }

    /// Signal every worker and wait for in-flight ticks to finish.
    pub async fn stop(&mut self) {
        tracing::info!("shelter node stopping");
        self.shutdown.shutdown();
        for handle in self.task_handles.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "worker task ended abnormally");
            }
        }
        tracing::info!("shelter node stopped");
    }

    /// Run until SIGINT or SIGTERM, then stop.
    pub async fn run_until_signal(mut self) {
        self.shutdown.wait_for_signal().await;
        self.stop().await;
    }
}
