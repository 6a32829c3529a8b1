//! Custody transfers.
//!
//! `TransferStarted` opens a resolution keyed by transfer id,
//! `TransferResolved` discharges it and `TransferCancelled` ends it. Only the
//! started events are filtered by donor; resolved and cancelled events for
//! transfers this engine never saw are no-ops in the cache.

use async_trait::async_trait;
use shelter_ledger::{EventKind, LedgerEventSource};
use shelter_types::{fields, Address};

use super::{collect_resolutions, EventBatch, SyncVariant};
use crate::collector::EventFilter;
use crate::error::SyncError;

const STARTED_FIELDS: &[&str] = &[
    fields::TRANSFER_ID,
    fields::DONOR_ID,
    fields::BUNDLE_ID,
    fields::COUNT,
];
const ENDED_FIELDS: &[&str] = &[fields::TRANSFER_ID];

/// Blocks to look back on a cold start so that no transfer still alive at
/// the head can have started earlier.
pub fn transfer_lookback_blocks(challenge_duration_secs: u64, min_block_time_secs: u64) -> u64 {
    challenge_duration_secs.div_ceil(min_block_time_secs.max(1))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    /// Transfers this node opened as donor.
    Outbound,
    /// Transfers opened by other donors.
    Inbound,
}

pub struct TransferEvents {
    node: Address,
    direction: Direction,
    step: u64,
    lookback_blocks: u64,
}

impl TransferEvents {
    pub fn outbound(node: Address, step: u64, lookback_blocks: u64) -> Self {
        Self {
            node,
            direction: Direction::Outbound,
            step,
            lookback_blocks,
        }
    }

    pub fn inbound(node: Address, step: u64, lookback_blocks: u64) -> Self {
        Self {
            node,
            direction: Direction::Inbound,
            step,
            lookback_blocks,
        }
    }

    pub fn node(&self) -> &Address {
        &self.node
    }

    fn started_filter(&self) -> EventFilter {
        match self.direction {
            Direction::Outbound => EventFilter::address_is(fields::DONOR_ID, &self.node),
            Direction::Inbound => EventFilter::address_is_not(fields::DONOR_ID, &self.node),
        }
    }
}

#[async_trait]
impl SyncVariant for TransferEvents {
    fn name(&self) -> &'static str {
        match self.direction {
            Direction::Outbound => "transfers",
            Direction::Inbound => "inbound-transfers",
        }
    }

    async fn cold_start_block(
        &self,
        _ledger: &dyn LedgerEventSource,
        current_block: u64,
    ) -> Result<u64, SyncError> {
        Ok(current_block.saturating_sub(self.lookback_blocks))
    }

    async fn fetch_events(
        &self,
        ledger: &dyn LedgerEventSource,
        from_block: u64,
        to_block: u64,
    ) -> Result<EventBatch, SyncError> {
        let range = (from_block, to_block);
        let started = collect_resolutions(
            ledger,
            EventKind::TransferStarted,
            range,
            self.step,
            STARTED_FIELDS,
            &self.started_filter(),
            fields::TRANSFER_ID,
        )
        .await?;
        let resolved = collect_resolutions(
            ledger,
            EventKind::TransferResolved,
            range,
            self.step,
            ENDED_FIELDS,
            &EventFilter::Any,
            fields::TRANSFER_ID,
        )
        .await?;
        let cancelled = collect_resolutions(
            ledger,
            EventKind::TransferCancelled,
            range,
            self.step,
            ENDED_FIELDS,
            &EventFilter::Any,
            fields::TRANSFER_ID,
        )
        .await?;
        Ok(EventBatch {
            started,
            resolved,
            timed_out: cancelled,
        })
    }
}
