//! Takes over bundles other nodes are handing away.
//!
//! Follows inbound transfers (opened by other donors) and, once the ledger
//! lets this node resolve one, downloads the bundle from its donor, stores
//! it and resolves the transfer. Transfers that fail are skipped until
//! their cool-down elapses.

use std::sync::Arc;

use shelter_ledger::{BundleDownloader, ShelteringContract};
use shelter_store::BundleRepository;
use shelter_types::{fields, BundleId, Resolution, TransferId};

use crate::activity_log::ActivityLog;
use crate::cooldown::FailedResolutions;
use crate::metrics::ShelterMetrics;
use crate::sync::TransferSync;
use crate::NodeError;

const WORKER: &str = "resolver";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveReport {
    pub resolved: Vec<TransferId>,
    pub failed: Vec<TransferId>,
}

pub struct TransferResolver {
    transfers: TransferSync,
    contract: Arc<dyn ShelteringContract>,
    downloader: Arc<dyn BundleDownloader>,
    repository: Arc<dyn BundleRepository>,
    failed: FailedResolutions,
    activity: Option<Arc<ActivityLog>>,
    metrics: Option<Arc<ShelterMetrics>>,
}

impl TransferResolver {
    pub fn new(
        transfers: TransferSync,
        contract: Arc<dyn ShelteringContract>,
        downloader: Arc<dyn BundleDownloader>,
        repository: Arc<dyn BundleRepository>,
        failed: FailedResolutions,
    ) -> Self {
        Self {
            transfers,
            contract,
            downloader,
            repository,
            failed,
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

    /// Take over a single transfer.
    ///
    /// Fails with [`NodeError::CannotResolve`] while the ledger does not
    /// allow this node to resolve it.
    pub async fn resolve_one(&self, transfer: &Resolution) -> Result<(), NodeError> {
        let transfer_id = transfer.transfer_id();
        let bundle_id = transfer
            .field(fields::BUNDLE_ID)
            .map(BundleId::new)
            .ok_or_else(|| NodeError::MalformedResolution {
                id: transfer.id.clone(),
                field: fields::BUNDLE_ID,
            })?;
        let donor = transfer
            .donor()
            .ok_or_else(|| NodeError::MalformedResolution {
                id: transfer.id.clone(),
                field: fields::DONOR_ID,
            })?;

        if !self.contract.can_resolve(&transfer_id).await? {
            return Err(NodeError::CannotResolve { transfer_id });
        }

        if !self.repository.is_bundle_stored(&bundle_id)? {
            let expiration = self
                .contract
                .sheltering_expiration(&bundle_id, &donor)
                .await?;
            let payload = self
                .downloader
                .download_bundle(&bundle_id, &donor, expiration)
                .await?;
            if payload.bundle_id != bundle_id {
                return Err(NodeError::BundleMismatch {
                    expected: bundle_id.to_string(),
                    received: payload.bundle_id.to_string(),
                });
            }
            self.repository.store_bundle(&payload, expiration)?;
        }

        self.contract.resolve(&transfer_id).await?;
        if let Some(metrics) = &self.metrics {
            metrics.transfers_resolved.inc();
        }
        if let Some(activity) = &self.activity {
            activity.record(
                WORKER,
                format!("resolved transfer {transfer_id} of bundle {bundle_id} from {donor}"),
            );
        }
        Ok(())
    }

    /// Sync inbound transfers and try each one not cooling down, in ledger
    /// order.
    pub async fn resolve_all(&mut self) -> Result<ResolveReport, NodeError> {
        let transfers = self.transfers.ongoing_resolutions().await?;
        self.failed.prune();

        let mut report = ResolveReport::default();
        for transfer in &transfers {
            if self.failed.is_cooling_down(&transfer.id) {
                continue;
            }
            match self.resolve_one(transfer).await {
                Ok(()) => {
                    self.failed.forget(&transfer.id);
                    report.resolved.push(transfer.transfer_id());
                }
                Err(NodeError::CannotResolve { transfer_id }) if self.bundle_stored(transfer) => {
                    tracing::debug!(transfer_id = %transfer_id, "bundle already held, not resolvable yet");
                }
                Err(e) => {
                    tracing::warn!(transfer_id = %transfer.id, error = %e, "failed to resolve transfer");
                    self.failed.remember(&transfer.id);
                    report.failed.push(transfer.transfer_id());
                }
            }
        }
        Ok(report)
    }

    fn bundle_stored(&self, transfer: &Resolution) -> bool {
        transfer
            .field(fields::BUNDLE_ID)
            .map(BundleId::new)
            .is_some_and(|bundle_id| self.repository.is_bundle_stored(&bundle_id).unwrap_or(false))
    }
}
