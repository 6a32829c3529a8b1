//! Local bundle repository trait and the payload types it stores.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use shelter_types::{BundleId, Timestamp};

/// Kind of an entry inside a composite bundle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryKind {
    Asset,
    Event,
}

/// One asset or event packed into a composite bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub kind: EntryKind,
    pub id: String,
    pub data: Vec<u8>,
}

/// Body of a downloaded bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleContent {
    /// Stored as-is; the node never looks inside.
    Opaque(Vec<u8>),
    /// Assets and events sharing the bundle's metadata. Each entry is stored
    /// individually before the bundle itself.
    Composite { entries: Vec<BundleEntry> },
}

/// A bundle as received from a donor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePayload {
    pub bundle_id: BundleId,
    /// Opaque metadata document shared by all entries.
    #[serde(default)]
    pub metadata: Vec<u8>,
    pub content: BundleContent,
}

impl BundlePayload {
    pub fn opaque(bundle_id: BundleId, data: Vec<u8>) -> Self {
        Self {
            bundle_id,
            metadata: Vec::new(),
            content: BundleContent::Opaque(data),
        }
    }

    pub fn entries(&self) -> &[BundleEntry] {
        match &self.content {
            BundleContent::Opaque(_) => &[],
            BundleContent::Composite { entries } => entries,
        }
    }
}

/// Narrow CRUD surface over locally sheltered bundles.
pub trait BundleRepository: Send + Sync {
    /// Whether the bundle is stored locally.
    fn is_bundle_stored(&self, bundle_id: &BundleId) -> Result<bool, StoreError>;

    /// Store a bundle and mark it sheltered until `sheltered_until`.
    fn store_bundle(
        &self,
        payload: &BundlePayload,
        sheltered_until: Timestamp,
    ) -> Result<(), StoreError>;

    /// Store a single asset or event unpacked from a composite bundle.
    fn store_entry(&self, bundle_id: &BundleId, entry: &BundleEntry) -> Result<(), StoreError>;

    /// Ids of every bundle stored locally.
    fn stored_bundle_ids(&self) -> Result<Vec<BundleId>, StoreError>;

    /// Remove a bundle (and its entries) from local storage.
    fn remove_bundle(&self, bundle_id: &BundleId) -> Result<(), StoreError>;
}
