//! Voluntary custody release.
//!
//! A retiring node hands every bundle it shelters to other nodes. The work
//! list is the set of locally stored bundles at the first tick; bundles
//! stored later are not part of the campaign. Each tick finalizes the
//! transfers other nodes resolved since the last tick, then starts new
//! transfers while fewer than `concurrency` are ongoing.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use shelter_ledger::ShelteringContract;
use shelter_store::BundleRepository;
use shelter_types::{BundleId, Resolution};

use crate::activity_log::ActivityLog;
use crate::cooldown::FailedResolutions;
use crate::metrics::ShelterMetrics;
use crate::sync::RetirementSync;
use crate::NodeError;

const WORKER: &str = "release";

/// Progress of the release campaign.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReleaseModeInfo {
    /// Bundles in the work list snapshot.
    pub total: usize,
    pub transfers_started: usize,
    /// Bundles removed locally after their transfer was resolved.
    pub transfered: usize,
}

pub struct BundleReleaseService {
    transfers: RetirementSync,
    contract: Arc<dyn ShelteringContract>,
    repository: Arc<dyn BundleRepository>,
    failed_starts: FailedResolutions,
    concurrency: usize,
    sheltered: Option<BTreeSet<BundleId>>,
    /// Resolved transfers whose local removal failed; retried every tick.
    unfinalized: Vec<Resolution>,
    mode_info: ReleaseModeInfo,
    activity: Option<Arc<ActivityLog>>,
    metrics: Option<Arc<ShelterMetrics>>,
}

impl BundleReleaseService {
    pub fn new(
        transfers: RetirementSync,
        contract: Arc<dyn ShelteringContract>,
        repository: Arc<dyn BundleRepository>,
        failed_starts: FailedResolutions,
        concurrency: usize,
    ) -> Self {
        Self {
            transfers,
            contract,
            repository,
            failed_starts,
            concurrency,
            sheltered: None,
            unfinalized: Vec::new(),
            mode_info: ReleaseModeInfo::default(),
            activity: None,
            metrics: None,
        }
    }

    pub fn with_activity_log(mut self, activity: Arc<ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ShelterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn mode_info(&self) -> ReleaseModeInfo {
        self.mode_info
    }

    /// Bundles still to hand over, `None` before the first tick.
    pub fn remaining(&self) -> Option<&BTreeSet<BundleId>> {
        self.sheltered.as_ref()
    }

    /// Run one release tick.
    pub async fn process(&mut self) -> Result<ReleaseModeInfo, NodeError> {
        if self.sheltered.is_none() {
            let snapshot: BTreeSet<BundleId> =
                self.repository.stored_bundle_ids()?.into_iter().collect();
            self.mode_info.total = snapshot.len();
            tracing::info!(bundles = snapshot.len(), "starting release campaign");
            self.sheltered = Some(snapshot);
        }

        let active = match self.transfers.ongoing_resolutions().await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "transfer sync failed, using cached transfers");
                self.transfers.active_resolutions()
            }
        };

        self.finalize_resolved();
        self.start_transfers(&active).await;
        Ok(self.mode_info)
    }

    fn finalize_resolved(&mut self) {
        let mut resolved = std::mem::take(&mut self.unfinalized);
        resolved.extend(self.transfers.flush_resolved_transfers());

        for transfer in resolved {
            let bundle_id = transfer.bundle_id();
            let in_campaign = self
                .sheltered
                .as_ref()
                .is_some_and(|sheltered| sheltered.contains(&bundle_id));
            if !in_campaign {
                // Replayed from before a restart, or never part of this campaign.
                tracing::debug!(
                    transfer_id = %transfer.id,
                    bundle_id = %bundle_id,
                    "resolved transfer outside the work list, skipping"
                );
                continue;
            }
            match self.repository.remove_bundle(&bundle_id) {
                Ok(()) => {
                    if let Some(sheltered) = self.sheltered.as_mut() {
                        sheltered.remove(&bundle_id);
                    }
                    self.mode_info.transfered += 1;
                    if let Some(metrics) = &self.metrics {
                        metrics.transfers_finalized.inc();
                    }
                    self.record(format!(
                        "transfer {} resolved, removed bundle {bundle_id}",
                        transfer.id
                    ));
                }
                Err(e) => {
                    tracing::warn!(
                        transfer_id = %transfer.id,
                        bundle_id = %bundle_id,
                        error = %e,
                        "failed to remove transferred bundle"
                    );
                    self.unfinalized.push(transfer);
                }
            }
        }
    }

    async fn start_transfers(&mut self, active: &[Resolution]) {
        let mut ongoing = active.len();
        if ongoing >= self.concurrency {
            return;
        }
        let in_transfer: HashSet<BundleId> = active
            .iter()
            .map(Resolution::bundle_id)
            .chain(self.unfinalized.iter().map(Resolution::bundle_id))
            .collect();
        let candidates: Vec<BundleId> = match &self.sheltered {
            Some(sheltered) => sheltered
                .iter()
                .filter(|bundle| !in_transfer.contains(*bundle))
                .cloned()
                .collect(),
            None => return,
        };

        self.failed_starts.prune();
        for bundle_id in candidates {
            if ongoing >= self.concurrency {
                break;
            }
            if self.failed_starts.is_cooling_down(bundle_id.as_str()) {
                continue;
            }
            match self.contract.start_transfer(&bundle_id).await {
                Ok(transfer_id) => {
                    ongoing += 1;
                    self.mode_info.transfers_started += 1;
                    self.failed_starts.forget(bundle_id.as_str());
                    if let Some(metrics) = &self.metrics {
                        metrics.transfers_started.inc();
                    }
                    self.record(format!("started transfer {transfer_id} of bundle {bundle_id}"));
                }
                Err(e) => {
                    tracing::warn!(bundle_id = %bundle_id, error = %e, "failed to start transfer");
                    self.failed_starts.remember(bundle_id.as_str());
                }
            }
        }
    }

    fn record(&self, message: String) {
        if let Some(activity) = &self.activity {
            activity.record(WORKER, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ResolutionSyncEngine, RetirementTransferEvents};
    use shelter_nullables::{NullBundleRepository, NullCheckpointStore, NullClock, NullLedger};
    use shelter_types::{Address, TransferId};

    struct Fixture {
        ledger: Arc<NullLedger>,
        repository: Arc<NullBundleRepository>,
        clock: Arc<NullClock>,
        checkpoints: Arc<NullCheckpointStore>,
    }

    impl Fixture {
        fn with_bundles(count: usize) -> Self {
            let repository = Arc::new(NullBundleRepository::new());
            for i in 0..count {
                repository.insert_stored(&BundleId::new(format!("b{i:02}")));
            }
            Self {
                ledger: Arc::new(NullLedger::new(Address::new("0x01"))),
                repository,
                clock: Arc::new(NullClock::new(10_000)),
                checkpoints: Arc::new(NullCheckpointStore::new()),
            }
        }

        fn service(&self, concurrency: usize) -> BundleReleaseService {
            let sync = ResolutionSyncEngine::new(
                RetirementTransferEvents::new(Address::new("0x01"), 100, 1_000),
                self.ledger.clone(),
            );
            self.service_over(sync, concurrency)
        }

        /// A service whose transfer engine checkpoints into `self.checkpoints`.
        fn persisted_service(&self, concurrency: usize) -> BundleReleaseService {
            let sync = ResolutionSyncEngine::new(
                RetirementTransferEvents::new(Address::new("0x01"), 100, 1_000),
                self.ledger.clone(),
            )
            .with_snapshots(self.checkpoints.clone());
            self.service_over(sync, concurrency)
        }

        fn service_over(&self, sync: RetirementSync, concurrency: usize) -> BundleReleaseService {
            BundleReleaseService::new(
                sync,
                self.ledger.clone(),
                self.repository.clone(),
                FailedResolutions::new(600, self.clock.clone()),
                concurrency,
            )
        }
    }

    #[tokio::test]
    async fn starts_at_most_the_concurrency_cap() {
        let fx = Fixture::with_bundles(25);
        let mut service = fx.service(20);

        let info = service.process().await.unwrap();
        assert_eq!(info.total, 25);
        assert_eq!(info.transfers_started, 20);
        assert_eq!(fx.ledger.started_transfers().len(), 20);

        // All 20 are ongoing now: nothing new may start.
        let info = service.process().await.unwrap();
        assert_eq!(info.transfers_started, 20);
    }

    #[tokio::test]
    async fn resolved_transfers_free_slots_and_remove_bundles() {
        let fx = Fixture::with_bundles(3);
        let mut service = fx.service(2);
        service.process().await.unwrap();
        assert_eq!(fx.ledger.started_transfers().len(), 2);

        fx.ledger.resolve_by_peer(&TransferId::new("transfer-1"));
        let info = service.process().await.unwrap();

        assert_eq!(info.transfered, 1);
        assert_eq!(info.transfers_started, 3);
        assert!(!fx.repository.is_bundle_stored(&BundleId::new("b00")).unwrap());
        assert_eq!(service.remaining().map(|r| r.len()), Some(2));
    }

    #[tokio::test]
    async fn snapshot_is_taken_once() {
        let fx = Fixture::with_bundles(1);
        let mut service = fx.service(5);
        service.process().await.unwrap();

        fx.repository.insert_stored(&BundleId::new("late"));
        let info = service.process().await.unwrap();
        assert_eq!(info.total, 1);
        assert_eq!(fx.ledger.started_transfers(), vec![BundleId::new("b00")]);
    }

    #[tokio::test]
    async fn failed_start_cools_down_before_retry() {
        let fx = Fixture::with_bundles(1);
        let bundle = BundleId::new("b00");
        fx.ledger.fail_starts_for(&bundle, true);
        let mut service = fx.service(5);

        assert_eq!(service.process().await.unwrap().transfers_started, 0);
        fx.ledger.fail_starts_for(&bundle, false);

        fx.clock.advance(599);
        assert_eq!(service.process().await.unwrap().transfers_started, 0);

        fx.clock.advance(1);
        assert_eq!(service.process().await.unwrap().transfers_started, 1);
    }

    #[tokio::test]
    async fn failed_removal_is_retried_without_restarting_transfer() {
        let fx = Fixture::with_bundles(1);
        let bundle = BundleId::new("b00");
        let mut service = fx.service(5);
        service.process().await.unwrap();

        fx.repository.fail_removal_of(&bundle);
        fx.ledger.resolve_by_peer(&TransferId::new("transfer-1"));
        let info = service.process().await.unwrap();
        assert_eq!(info.transfered, 0);
        assert_eq!(info.transfers_started, 1);
        assert_eq!(fx.ledger.started_transfers().len(), 1);
    }

    /// Two bundles in transfer, the first one already handed over.
    async fn hand_over_first_of_two(fx: &Fixture, mut service: BundleReleaseService) {
        assert_eq!(service.process().await.unwrap().transfers_started, 2);
        fx.ledger.resolve_by_peer(&TransferId::new("transfer-1"));
        assert_eq!(service.process().await.unwrap().transfered, 1);
    }

    #[tokio::test]
    async fn restart_resumes_from_transfer_checkpoint() {
        let fx = Fixture::with_bundles(2);
        hand_over_first_of_two(&fx, fx.persisted_service(5)).await;

        let mut restarted = fx.persisted_service(5);
        let info = restarted.process().await.unwrap();

        assert_eq!(
            info,
            ReleaseModeInfo {
                total: 1,
                transfers_started: 0,
                transfered: 0,
            }
        );
        // transfer-2 is still ongoing: no second transfer for b01.
        assert_eq!(fx.ledger.started_transfers().len(), 2);
        assert!(fx.repository.is_bundle_stored(&BundleId::new("b01")).unwrap());
        let remaining: Vec<&BundleId> = restarted.remaining().unwrap().iter().collect();
        assert_eq!(remaining, vec![&BundleId::new("b01")]);
    }

    #[tokio::test]
    async fn replayed_resolution_is_not_finalized_again() {
        let fx = Fixture::with_bundles(2);
        hand_over_first_of_two(&fx, fx.service(5)).await;

        // Without a checkpoint the engine rescans and sees transfer-1 resolve again.
        let metrics = Arc::new(ShelterMetrics::new());
        let mut restarted = fx.service(5).with_metrics(metrics.clone());
        let info = restarted.process().await.unwrap();

        assert_eq!(info.transfered, 0);
        assert_eq!(info.transfers_started, 0);
        assert_eq!(metrics.transfers_finalized.get(), 0);
        assert!(fx.repository.is_bundle_stored(&BundleId::new("b01")).unwrap());
        assert_eq!(restarted.remaining().map(|r| r.len()), Some(1));
    }
}
