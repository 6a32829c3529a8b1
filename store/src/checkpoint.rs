//! Sync checkpoint storage trait.

use crate::StoreError;
use serde::{Deserialize, Serialize};
use shelter_types::Resolution;

/// Persisted progress of one sync engine.
///
/// `last_saved_block` is the last block fully scanned. `records` is the
/// engine's active set at that block; engines that only need the block
/// number leave it empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_saved_block: u64,
    #[serde(default)]
    pub records: Vec<Resolution>,
}

impl Checkpoint {
    pub fn new(last_saved_block: u64, records: Vec<Resolution>) -> Self {
        Self {
            last_saved_block,
            records,
        }
    }
}

/// Keyed persistence for sync checkpoints.
///
/// Each sync engine owns exactly one key (its name) and is the only writer
/// of it.
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint stored under `name`, if any.
    fn load(&self, name: &str) -> Result<Option<Checkpoint>, StoreError>;

    /// Replace the checkpoint stored under `name`.
    fn save(&self, name: &str, checkpoint: &Checkpoint) -> Result<(), StoreError>;
}
