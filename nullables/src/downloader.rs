//! Nullable downloader — serves bundles from a fixed table of donors.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use shelter_ledger::{BundleDownloader, LedgerError};
use shelter_store::BundlePayload;
use shelter_types::{Address, BundleId, Timestamp};

/// A downloader that only succeeds for `(bundle, donor)` pairs it was given.
pub struct NullDownloader {
    available: Mutex<HashMap<(BundleId, Address), BundlePayload>>,
    attempts: Mutex<Vec<(BundleId, Address, Timestamp)>>,
}

impl NullDownloader {
    pub fn new() -> Self {
        Self {
            available: Mutex::new(HashMap::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Let `donor` serve `payload`.
    pub fn serve(&self, donor: &Address, payload: BundlePayload) {
        self.available
            .lock()
            .unwrap()
            .insert((payload.bundle_id.clone(), donor.clone()), payload);
    }

    /// Answer requests for `bundle_id` from `donor` with `payload`, even if
    /// it holds a different bundle.
    pub fn serve_for(&self, bundle_id: &BundleId, donor: &Address, payload: BundlePayload) {
        self.available
            .lock()
            .unwrap()
            .insert((bundle_id.clone(), donor.clone()), payload);
    }

    /// Every download attempted so far, in order.
    pub fn attempts(&self) -> Vec<(BundleId, Address, Timestamp)> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Default for NullDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleDownloader for NullDownloader {
    async fn download_bundle(
        &self,
        bundle_id: &BundleId,
        donor: &Address,
        expiration: Timestamp,
    ) -> Result<BundlePayload, LedgerError> {
        self.attempts
            .lock()
            .unwrap()
            .push((bundle_id.clone(), donor.clone(), expiration));
        self.available
            .lock()
            .unwrap()
            .get(&(bundle_id.clone(), donor.clone()))
            .cloned()
            .ok_or_else(|| LedgerError::Download {
                donor: donor.to_string(),
                reason: format!("{bundle_id} not available"),
            })
    }
}
