//! Ordering key for ledger events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of an event in the ledger: block number, then log index within
/// the block.
///
/// The derived `Ord` compares `block_number` first, which is the canonical
/// total order every replay of ledger events follows.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl EventPosition {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
        }
    }
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}
