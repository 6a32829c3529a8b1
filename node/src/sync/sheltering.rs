//! Sheltering obligations of this node.
//!
//! Obligations only start (`ShelteringAdded`) or end (`ShelteringRemoved`);
//! there is no partial resolution. The resolution id is the bundle id.

use async_trait::async_trait;
use shelter_ledger::{EventKind, LedgerEventSource};
use shelter_types::{fields, Address};

use super::{collect_resolutions, EventBatch, SyncVariant};
use crate::collector::{collect_filtered_events_with_step, EventFilter};
use crate::error::SyncError;

const SHELTERING_FIELDS: &[&str] = &[fields::BUNDLE_ID, fields::SHELTERER];

pub struct ShelteringEvents {
    node: Address,
    step: u64,
    onboarding_scan_chunk: u64,
}

impl ShelteringEvents {
    pub fn new(node: Address, step: u64, onboarding_scan_chunk: u64) -> Self {
        Self {
            node,
            step,
            onboarding_scan_chunk: onboarding_scan_chunk.max(1),
        }
    }

    pub fn node(&self) -> &Address {
        &self.node
    }

    fn filter(&self) -> EventFilter {
        EventFilter::address_is(fields::SHELTERER, &self.node)
    }
}

#[async_trait]
impl SyncVariant for ShelteringEvents {
    fn name(&self) -> &'static str {
        "sheltering"
    }

    /// Walk back from the head in `onboarding_scan_chunk` windows until one
    /// holds this node's onboarding event; start at the earliest such
    /// event in that window. Block 0 if the node never onboarded.
    async fn cold_start_block(
        &self,
        ledger: &dyn LedgerEventSource,
        current_block: u64,
    ) -> Result<u64, SyncError> {
        let filter = EventFilter::address_is(fields::NODE_ADDRESS, &self.node);
        let mut window_end = current_block;
        loop {
            let window_start = window_end.saturating_sub(self.onboarding_scan_chunk - 1);
            let onboarded = collect_filtered_events_with_step(
                window_start,
                window_end,
                self.step,
                |from, to| ledger.fetch_events(EventKind::NodeOnboarded, from, to),
                &[fields::NODE_ADDRESS],
                &filter,
            )
            .await?;
            if let Some(block) = onboarded.iter().map(|e| e.block_number).min() {
                tracing::debug!(node = %self.node, block, "found onboarding block");
                return Ok(block);
            }
            if window_start == 0 {
                tracing::debug!(node = %self.node, "no onboarding event, starting from genesis");
                return Ok(0);
            }
            window_end = window_start - 1;
        }
    }

    async fn fetch_events(
        &self,
        ledger: &dyn LedgerEventSource,
        from_block: u64,
        to_block: u64,
    ) -> Result<EventBatch, SyncError> {
        let filter = self.filter();
        let started = collect_resolutions(
            ledger,
            EventKind::ShelteringAdded,
            (from_block, to_block),
            self.step,
            SHELTERING_FIELDS,
            &filter,
            fields::BUNDLE_ID,
        )
        .await?;
        let removed = collect_resolutions(
            ledger,
            EventKind::ShelteringRemoved,
            (from_block, to_block),
            self.step,
            SHELTERING_FIELDS,
            &filter,
            fields::BUNDLE_ID,
        )
        .await?;
        Ok(EventBatch {
            started,
            resolved: Vec::new(),
            timed_out: removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ResolutionSyncEngine;
    use shelter_ledger::RawEvent;
    use shelter_nullables::NullLedger;
    use std::sync::Arc;

    fn addr(n: u8) -> Address {
        Address::new(format!("0x{:040x}", n))
    }

    fn onboarded(block: u64, node: &Address) -> RawEvent {
        RawEvent::new(block, 0).with(fields::NODE_ADDRESS, node.as_str())
    }

    fn sheltering(block: u64, log: u64, bundle: &str, node: &Address) -> RawEvent {
        RawEvent::new(block, log)
            .with(fields::BUNDLE_ID, bundle)
            .with(fields::SHELTERER, node.as_str())
    }

    #[tokio::test]
    async fn cold_start_finds_onboarding_block() {
        let node = addr(7);
        let ledger = NullLedger::new(node.clone());
        ledger.emit(EventKind::NodeOnboarded, onboarded(120, &addr(3)));
        ledger.emit(EventKind::NodeOnboarded, onboarded(95, &node));
        ledger.set_head(500);

        let variant = ShelteringEvents::new(node, 1000, 100);
        assert_eq!(variant.cold_start_block(&ledger, 500).await.unwrap(), 95);

        let windows: Vec<(u64, u64)> = ledger
            .fetch_calls()
            .into_iter()
            .map(|(_, from, to)| (from, to))
            .collect();
        assert_eq!(windows, vec![(401, 500), (301, 400), (201, 300), (101, 200), (1, 100)]);
    }

    #[tokio::test]
    async fn cold_start_without_onboarding_is_genesis() {
        let node = addr(7);
        let ledger = NullLedger::new(node.clone());
        ledger.emit(EventKind::NodeOnboarded, onboarded(10, &addr(2)));
        let variant = ShelteringEvents::new(node, 1000, 64);
        assert_eq!(variant.cold_start_block(&ledger, 300).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cold_start_picks_earliest_event_in_window() {
        let node = addr(7);
        let ledger = NullLedger::new(node.clone());
        ledger.emit(EventKind::NodeOnboarded, onboarded(95, &node));
        ledger.emit(EventKind::NodeOnboarded, onboarded(60, &node));
        let variant = ShelteringEvents::new(node, 1000, 100);
        assert_eq!(variant.cold_start_block(&ledger, 100).await.unwrap(), 60);
    }

    #[tokio::test]
    async fn only_this_nodes_obligations_are_tracked() {
        let node = addr(7);
        let ledger = Arc::new(NullLedger::new(node.clone()));
        ledger.emit(EventKind::ShelteringAdded, sheltering(2, 0, "mine", &node));
        ledger.emit(EventKind::ShelteringAdded, sheltering(2, 1, "theirs", &addr(9)));
        ledger.emit(EventKind::ShelteringAdded, sheltering(3, 0, "gone", &node));
        ledger.emit(EventKind::ShelteringRemoved, sheltering(5, 0, "gone", &node));
        ledger.emit(EventKind::ShelteringRemoved, sheltering(5, 1, "mine", &addr(9)));

        let mut engine =
            ResolutionSyncEngine::new(ShelteringEvents::new(node.clone(), 2, 100), ledger.clone());
        let active = engine.ongoing_resolutions().await.unwrap();

        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "mine");
        assert_eq!(active[0].shelterer(), Some(node));
    }
}
