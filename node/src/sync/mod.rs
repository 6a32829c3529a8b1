//! Resumable mirroring of ledger event history into an active-resolutions
//! view.
//!
//! [`ResolutionSyncEngine`] runs the shared cycle: pick the block range,
//! let the [`SyncVariant`] fetch its three event batches, apply them to the
//! cache, advance the checkpoint. Variants only decide which events they
//! fetch and where a cold start begins.
//!
//! A cycle fetches everything before touching the cache, so a failed fetch
//! leaves both the cache and the checkpoint exactly as they were. The first
//! cycle of an engine with a snapshot store hydrates from it before
//! scanning.

pub mod retirement;
pub mod sheltering;
pub mod transfers;

use std::sync::Arc;

use async_trait::async_trait;
use shelter_ledger::{EventKind, LedgerEventSource};
use shelter_store::{Checkpoint, CheckpointStore};
use shelter_types::Resolution;

use crate::active_resolutions::ActiveResolutions;
use crate::collector::{collect_filtered_events_with_step, EventFilter};
use crate::error::SyncError;
use crate::metrics::ShelterMetrics;

pub use retirement::RetirementTransferEvents;
pub use sheltering::ShelteringEvents;
pub use transfers::TransferEvents;

pub type ShelteringSync = ResolutionSyncEngine<ShelteringEvents>;
pub type TransferSync = ResolutionSyncEngine<TransferEvents>;
pub type RetirementSync = ResolutionSyncEngine<RetirementTransferEvents>;

/// Events of one scan, bucketed by the action they have on the cache.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub started: Vec<Resolution>,
    pub resolved: Vec<Resolution>,
    pub timed_out: Vec<Resolution>,
}

/// The variant-specific part of a sync engine.
#[async_trait]
pub trait SyncVariant: Send + Sync {
    /// Checkpoint key, also used in logs.
    fn name(&self) -> &'static str;

    /// First block to scan when no checkpoint exists.
    async fn cold_start_block(
        &self,
        ledger: &dyn LedgerEventSource,
        current_block: u64,
    ) -> Result<u64, SyncError>;

    /// Fetch the started, resolved and timed-out events of `[from, to]`.
    async fn fetch_events(
        &self,
        ledger: &dyn LedgerEventSource,
        from_block: u64,
        to_block: u64,
    ) -> Result<EventBatch, SyncError>;

    /// Called after a batch was applied with the records its resolved
    /// events removed from the cache.
    fn on_applied(&mut self, _discharged: Vec<Resolution>) {}
}

/// Fetch events of `kind` and turn them into resolutions keyed by `id_field`.
pub(crate) async fn collect_resolutions(
    ledger: &dyn LedgerEventSource,
    kind: EventKind,
    range: (u64, u64),
    step: u64,
    output_fields: &[&str],
    filter: &EventFilter,
    id_field: &str,
) -> Result<Vec<Resolution>, SyncError> {
    let (from_block, to_block) = range;
    let records = collect_filtered_events_with_step(
        from_block,
        to_block,
        step,
        |from, to| ledger.fetch_events(kind, from, to),
        output_fields,
        filter,
    )
    .await?;
    records
        .into_iter()
        .map(|record| {
            record
                .into_resolution(id_field)
                .map_err(|source| SyncError::MalformedEvent {
                    kind: kind.as_str(),
                    source,
                })
        })
        .collect()
}

pub struct ResolutionSyncEngine<V: SyncVariant> {
    variant: V,
    ledger: Arc<dyn LedgerEventSource>,
    cache: ActiveResolutions,
    last_saved_block: Option<u64>,
    snapshots: Option<Arc<dyn CheckpointStore>>,
    metrics: Option<Arc<ShelterMetrics>>,
    hydrated: bool,
}

impl<V: SyncVariant> ResolutionSyncEngine<V> {
    pub fn new(variant: V, ledger: Arc<dyn LedgerEventSource>) -> Self {
        Self {
            variant,
            ledger,
            cache: ActiveResolutions::new(),
            last_saved_block: None,
            snapshots: None,
            metrics: None,
            hydrated: false,
        }
    }

    /// Persist `(last_saved_block, active records)` after every scan and
    /// restore them in [`hydrate`](Self::hydrate).
    pub fn with_snapshots(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ShelterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn name(&self) -> &'static str {
        self.variant.name()
    }

    pub fn variant(&self) -> &V {
        &self.variant
    }

    pub fn variant_mut(&mut self) -> &mut V {
        &mut self.variant
    }

    pub fn last_saved_block(&self) -> Option<u64> {
        self.last_saved_block
    }

    /// The cached view, without scanning.
    pub fn active_resolutions(&self) -> Vec<Resolution> {
        self.cache.active_resolutions()
    }

    /// Load the persisted checkpoint and snapshot, once. Engines without a
    /// snapshot store have nothing to load.
    pub fn hydrate(&mut self) -> Result<(), SyncError> {
        if self.hydrated {
            return Ok(());
        }
        if let Some(store) = &self.snapshots {
            if let Some(checkpoint) = store.load(self.variant.name())? {
                tracing::info!(
                    engine = self.variant.name(),
                    last_saved_block = checkpoint.last_saved_block,
                    records = checkpoint.records.len(),
                    "hydrated from checkpoint"
                );
                self.last_saved_block = Some(checkpoint.last_saved_block);
                self.cache.set_active_resolutions(checkpoint.records);
            }
        }
        self.hydrated = true;
        Ok(())
    }

    /// First block of the next scan.
    pub async fn from_block(&self, current_block: u64) -> Result<u64, SyncError> {
        match self.last_saved_block {
            Some(block) => Ok(block.saturating_add(1)),
            None => {
                self.variant
                    .cold_start_block(self.ledger.as_ref(), current_block)
                    .await
            }
        }
    }

    /// Run one cycle and return the active resolutions in ledger order.
    pub async fn ongoing_resolutions(&mut self) -> Result<Vec<Resolution>, SyncError> {
        match self.run_cycle().await {
            Ok(()) => Ok(self.cache.active_resolutions()),
            Err(e) => {
                if let Some(metrics) = &self.metrics {
                    metrics.sync_failures.inc();
                }
                tracing::warn!(engine = self.variant.name(), error = %e, "sync cycle aborted");
                Err(e)
            }
        }
    }

    async fn run_cycle(&mut self) -> Result<(), SyncError> {
        self.hydrate()?;
        let current_block = self.ledger.current_block_number().await?;
        let from_block = self.from_block(current_block).await?;
        if from_block > current_block {
            tracing::trace!(
                engine = self.variant.name(),
                from_block,
                current_block,
                "nothing new to scan"
            );
            return Ok(());
        }

        let batch = self
            .variant
            .fetch_events(self.ledger.as_ref(), from_block, current_block)
            .await?;
        tracing::debug!(
            engine = self.variant.name(),
            from_block,
            to_block = current_block,
            started = batch.started.len(),
            resolved = batch.resolved.len(),
            timed_out = batch.timed_out.len(),
            "scanned block range"
        );

        let discharged = self.cache.apply_incoming_resolution_events(
            batch.started,
            batch.resolved,
            batch.timed_out,
        );
        self.variant.on_applied(discharged);
        self.last_saved_block = Some(current_block);
        self.save_snapshot(current_block);

        if let Some(metrics) = &self.metrics {
            metrics.sync_cycles.inc();
            metrics.active_resolutions.set(self.cache.len() as i64);
            metrics
                .last_scanned_block
                .set(i64::try_from(current_block).unwrap_or(i64::MAX));
        }
        Ok(())
    }

    fn save_snapshot(&self, last_saved_block: u64) {
        let Some(store) = &self.snapshots else {
            return;
        };
        let checkpoint = Checkpoint::new(last_saved_block, self.cache.active_resolutions());
        if let Err(e) = store.save(self.variant.name(), &checkpoint) {
            tracing::warn!(
                engine = self.variant.name(),
                last_saved_block,
                error = %e,
                "failed to persist checkpoint, continuing with in-memory state"
            );
        }
    }
}
