//! Nullable stores — thread-safe in-memory storage for testing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use shelter_store::{
    BundleEntry, BundlePayload, BundleRepository, Checkpoint, CheckpointStore, StoreError,
};
use shelter_types::{BundleId, Timestamp};

/// An in-memory bundle repository for testing.
pub struct NullBundleRepository {
    bundles: Mutex<BTreeMap<BundleId, (BundlePayload, Timestamp)>>,
    entries: Mutex<Vec<(BundleId, BundleEntry)>>,
    failing_stores: AtomicBool,
    failing_removals: Mutex<HashSet<BundleId>>,
}

impl NullBundleRepository {
    pub fn new() -> Self {
        Self {
            bundles: Mutex::new(BTreeMap::new()),
            entries: Mutex::new(Vec::new()),
            failing_stores: AtomicBool::new(false),
            failing_removals: Mutex::new(HashSet::new()),
        }
    }

    /// Seed an already-stored bundle with an empty body.
    pub fn insert_stored(&self, bundle_id: &BundleId) {
        self.bundles.lock().unwrap().insert(
            bundle_id.clone(),
            (
                BundlePayload::opaque(bundle_id.clone(), Vec::new()),
                Timestamp::EPOCH,
            ),
        );
    }

    pub fn fail_stores(&self, failing: bool) {
        self.failing_stores.store(failing, Ordering::SeqCst);
    }

    pub fn fail_removal_of(&self, bundle_id: &BundleId) {
        self.failing_removals
            .lock()
            .unwrap()
            .insert(bundle_id.clone());
    }

    /// Expiration the bundle was stored with.
    pub fn sheltered_until(&self, bundle_id: &BundleId) -> Option<Timestamp> {
        self.bundles
            .lock()
            .unwrap()
            .get(bundle_id)
            .map(|(_, until)| *until)
    }

    /// Entries unpacked from composite bundles, in storage order.
    pub fn stored_entries(&self) -> Vec<(BundleId, BundleEntry)> {
        self.entries.lock().unwrap().clone()
    }
}

impl Default for NullBundleRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleRepository for NullBundleRepository {
    fn is_bundle_stored(&self, bundle_id: &BundleId) -> Result<bool, StoreError> {
        Ok(self.bundles.lock().unwrap().contains_key(bundle_id))
    }

    fn store_bundle(
        &self,
        payload: &BundlePayload,
        sheltered_until: Timestamp,
    ) -> Result<(), StoreError> {
        if self.failing_stores.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.bundles.lock().unwrap().insert(
            payload.bundle_id.clone(),
            (payload.clone(), sheltered_until),
        );
        Ok(())
    }

    fn store_entry(&self, bundle_id: &BundleId, entry: &BundleEntry) -> Result<(), StoreError> {
        if self.failing_stores.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.entries
            .lock()
            .unwrap()
            .push((bundle_id.clone(), entry.clone()));
        Ok(())
    }

    fn stored_bundle_ids(&self) -> Result<Vec<BundleId>, StoreError> {
        Ok(self.bundles.lock().unwrap().keys().cloned().collect())
    }

    fn remove_bundle(&self, bundle_id: &BundleId) -> Result<(), StoreError> {
        if self.failing_removals.lock().unwrap().contains(bundle_id) {
            return Err(StoreError::Backend(format!("cannot remove {bundle_id}")));
        }
        self.bundles.lock().unwrap().remove(bundle_id);
        self.entries
            .lock()
            .unwrap()
            .retain(|(owner, _)| owner != bundle_id);
        Ok(())
    }
}

/// An in-memory checkpoint store for testing.
pub struct NullCheckpointStore {
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
    failing_saves: AtomicBool,
    saves: AtomicUsize,
}

impl NullCheckpointStore {
    pub fn new() -> Self {
        Self {
            checkpoints: Mutex::new(HashMap::new()),
            failing_saves: AtomicBool::new(false),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn fail_saves(&self, failing: bool) {
        self.failing_saves.store(failing, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for NullCheckpointStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CheckpointStore for NullCheckpointStore {
    fn load(&self, name: &str) -> Result<Option<Checkpoint>, StoreError> {
        Ok(self.checkpoints.lock().unwrap().get(name).cloned())
    }

    fn save(&self, name: &str, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        if self.failing_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("checkpoint store unavailable".into()));
        }
        self.checkpoints
            .lock()
            .unwrap()
            .insert(name.to_string(), checkpoint.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
