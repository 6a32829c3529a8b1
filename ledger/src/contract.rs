//! Views and transactions of the sheltering contract.

use async_trait::async_trait;

use shelter_types::{Address, BundleId, Timestamp, TransferId};

use crate::LedgerError;

/// Request/response calls keyed by bundle or transfer id.
#[async_trait]
pub trait ShelteringContract: Send + Sync {
    /// Every node currently sheltering the bundle.
    async fn shelterers(&self, bundle_id: &BundleId) -> Result<Vec<Address>, LedgerError>;

    /// The node that originally uploaded the bundle.
    async fn uploader(&self, bundle_id: &BundleId) -> Result<Address, LedgerError>;

    /// When `shelterer`'s obligation for the bundle expires.
    async fn sheltering_expiration(
        &self,
        bundle_id: &BundleId,
        shelterer: &Address,
    ) -> Result<Timestamp, LedgerError>;

    /// Whether the ledger still records `shelterer` as sheltering the bundle.
    async fn is_sheltering(
        &self,
        bundle_id: &BundleId,
        shelterer: &Address,
    ) -> Result<bool, LedgerError>;

    /// The in-progress transfer of the bundle opened by `donor`, if any.
    async fn pending_transfer(
        &self,
        bundle_id: &BundleId,
        donor: &Address,
    ) -> Result<Option<TransferId>, LedgerError>;

    /// Whether this node may resolve the transfer now.
    async fn can_resolve(&self, transfer_id: &TransferId) -> Result<bool, LedgerError>;

    /// Take over the bundle of a transfer.
    async fn resolve(&self, transfer_id: &TransferId) -> Result<(), LedgerError>;

    /// Open a transfer handing the bundle to another node. Returns once the
    /// transaction is included in a block.
    async fn start_transfer(&self, bundle_id: &BundleId) -> Result<TransferId, LedgerError>;

    /// Withdraw a transfer.
    async fn cancel_transfer(&self, transfer_id: &TransferId) -> Result<(), LedgerError>;
}
