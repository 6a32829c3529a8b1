//! Outbound transfers of a retiring node.
//!
//! Same events as [`TransferEvents::outbound`], but every transfer a
//! resolved event discharges is also queued for the release service, which
//! drains the queue exactly once per entry.

use async_trait::async_trait;
use shelter_ledger::LedgerEventSource;
use shelter_types::{Address, Resolution};

use super::{EventBatch, ResolutionSyncEngine, SyncVariant, TransferEvents};
use crate::error::SyncError;

pub struct RetirementTransferEvents {
    transfers: TransferEvents,
    resolved: Vec<Resolution>,
}

impl RetirementTransferEvents {
    pub fn new(node: Address, step: u64, lookback_blocks: u64) -> Self {
        Self {
            transfers: TransferEvents::outbound(node, step, lookback_blocks),
            resolved: Vec::new(),
        }
    }

    /// Take every queued resolved transfer.
    pub fn flush_resolved_transfers(&mut self) -> Vec<Resolution> {
        std::mem::take(&mut self.resolved)
    }

    pub fn pending_resolved(&self) -> usize {
        self.resolved.len()
    }
}

#[async_trait]
impl SyncVariant for RetirementTransferEvents {
    fn name(&self) -> &'static str {
        "retirement-transfers"
    }

    async fn cold_start_block(
        &self,
        ledger: &dyn LedgerEventSource,
        current_block: u64,
    ) -> Result<u64, SyncError> {
        self.transfers.cold_start_block(ledger, current_block).await
    }

    async fn fetch_events(
        &self,
        ledger: &dyn LedgerEventSource,
        from_block: u64,
        to_block: u64,
    ) -> Result<EventBatch, SyncError> {
        self.transfers.fetch_events(ledger, from_block, to_block).await
    }

    fn on_applied(&mut self, discharged: Vec<Resolution>) {
        self.resolved.extend(discharged);
    }
}

impl ResolutionSyncEngine<RetirementTransferEvents> {
    pub fn flush_resolved_transfers(&mut self) -> Vec<Resolution> {
        self.variant_mut().flush_resolved_transfers()
    }
}
