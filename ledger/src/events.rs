//! Ledger event source.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Ledger events the node follows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    /// A node took on a sheltering obligation for a bundle.
    ShelteringAdded,
    /// A sheltering obligation ended.
    ShelteringRemoved,
    /// A node joined the network.
    NodeOnboarded,
    /// A custody transfer was opened by a donor.
    TransferStarted,
    /// A custody transfer was taken over by a new shelterer.
    TransferResolved,
    /// A custody transfer was withdrawn or expired.
    TransferCancelled,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ShelteringAdded => "ShelteringAdded",
            EventKind::ShelteringRemoved => "ShelteringRemoved",
            EventKind::NodeOnboarded => "NodeOnboarded",
            EventKind::TransferStarted => "TransferStarted",
            EventKind::TransferResolved => "TransferResolved",
            EventKind::TransferCancelled => "TransferCancelled",
        }
    }
}

/// An event as returned by the ledger, before normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    pub block_number: u64,
    pub log_index: u64,
    /// Decoded event arguments, keyed by argument name.
    pub values: BTreeMap<String, String>,
}

impl RawEvent {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            block_number,
            log_index,
            values: BTreeMap::new(),
        }
    }

    /// Builder-style setter for an event argument.
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Read access to ledger history.
#[async_trait]
pub trait LedgerEventSource: Send + Sync {
    /// Number of the current head block.
    async fn current_block_number(&self) -> Result<u64, LedgerError>;

    /// Events of `kind` emitted in `[from_block, to_block]`, inclusive.
    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, LedgerError>;
}
