//! Peer bundle downloads.

use async_trait::async_trait;

use shelter_store::BundlePayload;
use shelter_types::{Address, BundleId, Timestamp};

use crate::LedgerError;

/// Fetches bundles from other nodes.
#[async_trait]
pub trait BundleDownloader: Send + Sync {
    /// Download `bundle_id` from `donor`. `expiration` is the sheltering
    /// expiration the donor must still honour for the request to be valid.
    async fn download_bundle(
        &self,
        bundle_id: &BundleId,
        donor: &Address,
        expiration: Timestamp,
    ) -> Result<BundlePayload, LedgerError>;
}
