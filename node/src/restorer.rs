//! Bundle restoration.
//!
//! Makes local storage match the ledger's sheltering obligations for this
//! node: every obligation whose bundle is missing locally is downloaded
//! from a randomly chosen donor, falling back to the other donors and
//! finally the uploader. Obligations the ledger no longer holds this node
//! to are abandoned, cancelling any transfer still pending for them.
//!
//! Every bundle is handled on its own; a failure never stops the batch.

use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shelter_ledger::{BundleDownloader, ShelteringContract};
use shelter_store::{BundlePayload, BundleRepository};
use shelter_types::{Address, BundleId, Resolution, Timestamp};

use crate::activity_log::ActivityLog;
use crate::metrics::ShelterMetrics;
use crate::sync::ShelteringSync;
use crate::NodeError;

const WORKER: &str = "restorer";

/// How a downloaded payload is written to the repository.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadHandling {
    /// Store the payload as one bundle.
    Whole,
    /// Store every asset and event of a composite payload individually,
    /// then the bundle itself.
    Unpack,
}

/// Outcome of one [`BundleRestorer::restore`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Obligations whose bundle was not stored locally.
    pub missing: usize,
    pub restored: Vec<BundleId>,
    /// No longer sheltered by this node according to the ledger.
    pub abandoned: Vec<BundleId>,
    /// Every donor failed; retried on the next pass.
    pub failed: Vec<BundleId>,
}

enum BundleOutcome {
    Restored,
    Abandoned,
    Exhausted,
}

/// Donor candidates for a bundle, in no particular order except that the
/// uploader always comes last. `own` is never a candidate, so an uploader
/// that is this node itself is not appended either.
pub fn bundle_donors(shelterers: &[Address], own: &Address, uploader: &Address) -> Vec<Address> {
    let mut donors: Vec<Address> = Vec::with_capacity(shelterers.len() + 1);
    for shelterer in shelterers {
        if shelterer != own && shelterer != uploader && !donors.contains(shelterer) {
            donors.push(shelterer.clone());
        }
    }
    if uploader != own {
        donors.push(uploader.clone());
    }
    donors
}

pub struct BundleRestorer {
    sheltering: ShelteringSync,
    contract: Arc<dyn ShelteringContract>,
    downloader: Arc<dyn BundleDownloader>,
    repository: Arc<dyn BundleRepository>,
    handling: PayloadHandling,
    rng: StdRng,
    activity: Option<Arc<ActivityLog>>,
    metrics: Option<Arc<ShelterMetrics>>,
}

impl BundleRestorer {
    pub fn new(
        sheltering: ShelteringSync,
        contract: Arc<dyn ShelteringContract>,
        downloader: Arc<dyn BundleDownloader>,
        repository: Arc<dyn BundleRepository>,
    ) -> Self {
        Self {
            sheltering,
            contract,
            downloader,
            repository,
            handling: PayloadHandling::Whole,
            rng: StdRng::from_entropy(),
            activity: None,
            metrics: None,
        }
    }

    /// Unpack composite payloads into their entries before storing.
    pub fn with_handling(mut self, handling: PayloadHandling) -> Self {
        self.handling = handling;
        self
    }

    /// Deterministic donor order, for tests.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_activity_log(mut self, activity: Arc<ActivityLog>) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<ShelterMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sheltering(&self) -> &ShelteringSync {
        &self.sheltering
    }

    fn node(&self) -> Address {
        self.sheltering.variant().node().clone()
    }

    /// Current obligations: a fresh sync cycle, or the cached view if the
    /// cycle fails.
    async fn obligations(&mut self) -> Vec<Resolution> {
        match self.sheltering.ongoing_resolutions().await {
            Ok(active) => active,
            Err(e) => {
                tracing::warn!(error = %e, "sheltering sync failed, using cached obligations");
                self.sheltering.active_resolutions()
            }
        }
    }

    /// Run one restoration pass.
    pub async fn restore(&mut self) -> Result<RestoreReport, NodeError> {
        let obligations = self.obligations().await;
        let stored: HashSet<BundleId> = self.repository.stored_bundle_ids()?.into_iter().collect();
        let missing: Vec<Resolution> = obligations
            .into_iter()
            .filter(|obligation| !stored.contains(&obligation.bundle_id()))
            .collect();

        let mut report = RestoreReport {
            missing: missing.len(),
            ..RestoreReport::default()
        };
        if !missing.is_empty() {
            tracing::info!(missing = missing.len(), "restoring missing bundles");
        }

        for obligation in &missing {
            let bundle_id = obligation.bundle_id();
            match self.restore_bundle(obligation).await {
                Ok(BundleOutcome::Restored) => report.restored.push(bundle_id),
                Ok(BundleOutcome::Abandoned) => report.abandoned.push(bundle_id),
                Ok(BundleOutcome::Exhausted) => {
                    self.count_failure();
                    report.failed.push(bundle_id);
                }
                Err(e) => {
                    tracing::warn!(bundle_id = %bundle_id, error = %e, "failed to restore bundle");
                    self.count_failure();
                    report.failed.push(bundle_id);
                }
            }
        }
        Ok(report)
    }

    async fn restore_bundle(&mut self, obligation: &Resolution) -> Result<BundleOutcome, NodeError> {
        let bundle_id = obligation.bundle_id();
        let own = obligation.shelterer().unwrap_or_else(|| self.node());

        if !self.contract.is_sheltering(&bundle_id, &own).await? {
            if let Some(transfer_id) = self.contract.pending_transfer(&bundle_id, &own).await? {
                self.contract.cancel_transfer(&transfer_id).await?;
                self.record(format!("cancelled transfer {transfer_id} of abandoned bundle {bundle_id}"));
            }
            tracing::info!(bundle_id = %bundle_id, "no longer sheltering, skipping restore");
            return Ok(BundleOutcome::Abandoned);
        }

        let expiration = self.contract.sheltering_expiration(&bundle_id, &own).await?;
        let shelterers = self.contract.shelterers(&bundle_id).await?;
        let uploader = self.contract.uploader(&bundle_id).await?;
        let mut candidates = bundle_donors(&shelterers, &own, &uploader);

        while !candidates.is_empty() {
            let donor = self.pick_donor(&mut candidates, &uploader);
            match self.fetch_and_store(&bundle_id, &donor, expiration).await {
                Ok(()) => {
                    if let Some(metrics) = &self.metrics {
                        metrics.bundles_restored.inc();
                    }
                    self.record(format!("restored bundle {bundle_id} from {donor}"));
                    return Ok(BundleOutcome::Restored);
                }
                Err(e) => {
                    tracing::warn!(
                        bundle_id = %bundle_id,
                        donor = %donor,
                        remaining = candidates.len(),
                        error = %e,
                        "download attempt failed"
                    );
                }
            }
        }

        tracing::warn!(bundle_id = %bundle_id, "every donor failed, bundle stays missing");
        Ok(BundleOutcome::Exhausted)
    }

    /// Take a random candidate, leaving the uploader for when no other
    /// donor remains.
    fn pick_donor(&mut self, candidates: &mut Vec<Address>, uploader: &Address) -> Address {
        let peers = if candidates.last() == Some(uploader) {
            candidates.len() - 1
        } else {
            candidates.len()
        };
        let index = if peers == 0 {
            candidates.len() - 1
        } else {
            self.rng.gen_range(0..peers)
        };
        candidates.remove(index)
    }

    async fn fetch_and_store(
        &self,
        bundle_id: &BundleId,
        donor: &Address,
        expiration: Timestamp,
    ) -> Result<(), NodeError> {
        let payload = self
            .downloader
            .download_bundle(bundle_id, donor, expiration)
            .await?;
        if &payload.bundle_id != bundle_id {
            return Err(NodeError::BundleMismatch {
                expected: bundle_id.to_string(),
                received: payload.bundle_id.to_string(),
            });
        }
        self.store(&payload, expiration)
    }

    fn store(&self, payload: &BundlePayload, expiration: Timestamp) -> Result<(), NodeError> {
        if self.handling == PayloadHandling::Unpack {
            for entry in payload.entries() {
                self.repository.store_entry(&payload.bundle_id, entry)?;
            }
        }
        self.repository.store_bundle(payload, expiration)?;
        Ok(())
    }

    fn count_failure(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.restore_failures.inc();
        }
    }

    fn record(&self, message: String) {
        if let Some(activity) = &self.activity {
            activity.record(WORKER, message);
        }
    }
}
