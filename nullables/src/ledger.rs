//! Nullable ledger — scripted events and contract state.
//!
//! Contract transactions (`start_transfer`, `resolve`, `cancel_transfer`)
//! append the matching event one block past the current head, the way a
//! confirmed transaction would show up on a real ledger.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use shelter_ledger::{EventKind, LedgerError, LedgerEventSource, RawEvent, ShelteringContract};
use shelter_types::{fields, Address, BundleId, Timestamp, TransferId};

/// Expiration reported for obligations that were never given one.
pub const DEFAULT_EXPIRATION: Timestamp = Timestamp::new(4_000_000_000);

#[derive(Default)]
struct LedgerState {
    head: u64,
    events: BTreeMap<EventKind, Vec<RawEvent>>,
    fetch_calls: Vec<(EventKind, u64, u64)>,
    failing_fetches: usize,
    failing_head_reads: usize,
    failing_kinds: HashSet<EventKind>,
    shelterers: HashMap<BundleId, Vec<Address>>,
    uploaders: HashMap<BundleId, Address>,
    expirations: HashMap<(BundleId, Address), Timestamp>,
    pending_transfers: HashMap<(BundleId, Address), TransferId>,
    transfer_bundles: HashMap<TransferId, BundleId>,
    resolvable: HashSet<TransferId>,
    failing_starts: HashSet<BundleId>,
    started: Vec<BundleId>,
    resolved: Vec<TransferId>,
    cancelled: Vec<TransferId>,
    next_transfer: u64,
}

/// An in-memory ledger for testing.
pub struct NullLedger {
    /// Address used as the sender of contract transactions.
    caller: Address,
    state: Mutex<LedgerState>,
}

impl NullLedger {
    pub fn new(caller: Address) -> Self {
        Self {
            caller,
            state: Mutex::new(LedgerState::default()),
        }
    }

    // ── Event history ───────────────────────────────────────────────────

    pub fn set_head(&self, head: u64) {
        self.state.lock().unwrap().head = head;
    }

    pub fn head(&self) -> u64 {
        self.state.lock().unwrap().head
    }

    /// Record an event. The head moves forward if the event lies past it.
    pub fn emit(&self, kind: EventKind, event: RawEvent) {
        let mut state = self.state.lock().unwrap();
        state.head = state.head.max(event.block_number);
        state.events.entry(kind).or_default().push(event);
    }

    /// Make the next `count` calls to `fetch_events` fail.
    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().unwrap().failing_fetches = count;
    }

    /// Make every fetch of `kind` fail until cleared.
    pub fn fail_fetches_of(&self, kind: EventKind, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_kinds.insert(kind);
        } else {
            state.failing_kinds.remove(&kind);
        }
    }

    /// Make the next `count` calls to `current_block_number` fail.
    pub fn fail_next_head_reads(&self, count: usize) {
        self.state.lock().unwrap().failing_head_reads = count;
    }

    /// Every `(kind, from, to)` range requested so far.
    pub fn fetch_calls(&self) -> Vec<(EventKind, u64, u64)> {
        self.state.lock().unwrap().fetch_calls.clone()
    }

    // ── Contract state ──────────────────────────────────────────────────

    pub fn set_shelterers(&self, bundle_id: &BundleId, shelterers: Vec<Address>) {
        self.state
            .lock()
            .unwrap()
            .shelterers
            .insert(bundle_id.clone(), shelterers);
    }

    pub fn set_uploader(&self, bundle_id: &BundleId, uploader: Address) {
        self.state
            .lock()
            .unwrap()
            .uploaders
            .insert(bundle_id.clone(), uploader);
    }

    pub fn set_expiration(&self, bundle_id: &BundleId, shelterer: &Address, at: Timestamp) {
        self.state
            .lock()
            .unwrap()
            .expirations
            .insert((bundle_id.clone(), shelterer.clone()), at);
    }

    pub fn set_pending_transfer(&self, bundle_id: &BundleId, donor: &Address, id: TransferId) {
        let mut state = self.state.lock().unwrap();
        state
            .transfer_bundles
            .insert(id.clone(), bundle_id.clone());
        state
            .pending_transfers
            .insert((bundle_id.clone(), donor.clone()), id);
    }

    pub fn set_resolvable(&self, transfer_id: &TransferId, resolvable: bool) {
        let mut state = self.state.lock().unwrap();
        if resolvable {
            state.resolvable.insert(transfer_id.clone());
        } else {
            state.resolvable.remove(transfer_id);
        }
    }

    /// Make `start_transfer` fail for the bundle until cleared.
    pub fn fail_starts_for(&self, bundle_id: &BundleId, failing: bool) {
        let mut state = self.state.lock().unwrap();
        if failing {
            state.failing_starts.insert(bundle_id.clone());
        } else {
            state.failing_starts.remove(bundle_id);
        }
    }

    pub fn started_transfers(&self) -> Vec<BundleId> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn resolved_transfers(&self) -> Vec<TransferId> {
        self.state.lock().unwrap().resolved.clone()
    }

    pub fn cancelled_transfers(&self) -> Vec<TransferId> {
        self.state.lock().unwrap().cancelled.clone()
    }

    /// Resolve a transfer on behalf of another node, emitting the event.
    pub fn resolve_by_peer(&self, transfer_id: &TransferId) {
        let mut state = self.state.lock().unwrap();
        Self::append_transfer_event(&mut state, EventKind::TransferResolved, transfer_id);
    }

    fn append_transfer_event(state: &mut LedgerState, kind: EventKind, transfer_id: &TransferId) {
        state.head += 1;
        let event = RawEvent::new(state.head, 0).with(fields::TRANSFER_ID, transfer_id.as_str());
        state.events.entry(kind).or_default().push(event);
    }
}

#[async_trait]
impl LedgerEventSource for NullLedger {
    async fn current_block_number(&self) -> Result<u64, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_head_reads > 0 {
            state.failing_head_reads -= 1;
            return Err(LedgerError::Rpc("head unavailable".into()));
        }
        Ok(state.head)
    }

    async fn fetch_events(
        &self,
        kind: EventKind,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawEvent>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.fetch_calls.push((kind, from_block, to_block));
        let kind_fails = state.failing_kinds.contains(&kind);
        if kind_fails || state.failing_fetches > 0 {
            if !kind_fails {
                state.failing_fetches -= 1;
            }
            return Err(LedgerError::Rpc(format!(
                "{} [{from_block}, {to_block}] unavailable",
                kind.as_str()
            )));
        }
        Ok(state
            .events
            .get(&kind)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.block_number >= from_block && e.block_number <= to_block)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl ShelteringContract for NullLedger {
    async fn shelterers(&self, bundle_id: &BundleId) -> Result<Vec<Address>, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .shelterers
            .get(bundle_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn uploader(&self, bundle_id: &BundleId) -> Result<Address, LedgerError> {
        self.state
            .lock()
            .unwrap()
            .uploaders
            .get(bundle_id)
            .cloned()
            .ok_or_else(|| LedgerError::Reverted(format!("unknown bundle {bundle_id}")))
    }

    async fn sheltering_expiration(
        &self,
        bundle_id: &BundleId,
        shelterer: &Address,
    ) -> Result<Timestamp, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .expirations
            .get(&(bundle_id.clone(), shelterer.clone()))
            .copied()
            .unwrap_or(DEFAULT_EXPIRATION))
    }

    async fn is_sheltering(
        &self,
        bundle_id: &BundleId,
        shelterer: &Address,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .shelterers
            .get(bundle_id)
            .is_some_and(|list| list.contains(shelterer)))
    }

    async fn pending_transfer(
        &self,
        bundle_id: &BundleId,
        donor: &Address,
    ) -> Result<Option<TransferId>, LedgerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pending_transfers
            .get(&(bundle_id.clone(), donor.clone()))
            .cloned())
    }

    async fn can_resolve(&self, transfer_id: &TransferId) -> Result<bool, LedgerError> {
        Ok(self.state.lock().unwrap().resolvable.contains(transfer_id))
    }

    async fn resolve(&self, transfer_id: &TransferId) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        if !state.resolvable.remove(transfer_id) {
            return Err(LedgerError::Reverted(format!(
                "transfer {transfer_id} cannot be resolved"
            )));
        }
        state.resolved.push(transfer_id.clone());
        if let Some(bundle_id) = state.transfer_bundles.get(transfer_id).cloned() {
            let caller = self.caller.clone();
            state.shelterers.entry(bundle_id).or_default().push(caller);
        }
        Self::append_transfer_event(&mut state, EventKind::TransferResolved, transfer_id);
        Ok(())
    }

    async fn start_transfer(&self, bundle_id: &BundleId) -> Result<TransferId, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_starts.contains(bundle_id) {
            return Err(LedgerError::Reverted(format!(
                "transfer of {bundle_id} rejected"
            )));
        }
        state.next_transfer += 1;
        let transfer_id = TransferId::new(format!("transfer-{}", state.next_transfer));
        state.head += 1;
        let event = RawEvent::new(state.head, 0)
            .with(fields::TRANSFER_ID, transfer_id.as_str())
            .with(fields::DONOR_ID, self.caller.as_str())
            .with(fields::BUNDLE_ID, bundle_id.as_str());
        state
            .events
            .entry(EventKind::TransferStarted)
            .or_default()
            .push(event);
        state.started.push(bundle_id.clone());
        state
            .transfer_bundles
            .insert(transfer_id.clone(), bundle_id.clone());
        let caller = self.caller.clone();
        state
            .pending_transfers
            .insert((bundle_id.clone(), caller), transfer_id.clone());
        Ok(transfer_id)
    }

    async fn cancel_transfer(&self, transfer_id: &TransferId) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        state.pending_transfers.retain(|_, id| id != transfer_id);
        state.cancelled.push(transfer_id.clone());
        Self::append_transfer_event(&mut state, EventKind::TransferCancelled, transfer_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::new(format!("0x{:040x}", n))
    }

    #[tokio::test]
    async fn fetch_returns_only_events_in_range() {
        let ledger = NullLedger::new(addr(1));
        for block in [1, 5, 9] {
            ledger.emit(EventKind::ShelteringAdded, RawEvent::new(block, 0));
        }
        let events = ledger
            .fetch_events(EventKind::ShelteringAdded, 2, 9)
            .await
            .unwrap();
        let blocks: Vec<u64> = events.iter().map(|e| e.block_number).collect();
        assert_eq!(blocks, vec![5, 9]);
        assert_eq!(ledger.head(), 9);
    }

    #[tokio::test]
    async fn injected_fetch_failures_are_consumed() {
        let ledger = NullLedger::new(addr(1));
        ledger.fail_next_fetches(1);
        assert!(ledger
            .fetch_events(EventKind::TransferStarted, 0, 10)
            .await
            .is_err());
        assert!(ledger
            .fetch_events(EventKind::TransferStarted, 0, 10)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn start_transfer_emits_started_event() {
        let ledger = NullLedger::new(addr(1));
        ledger.set_head(10);
        let bundle = BundleId::new("b1");
        let id = ledger.start_transfer(&bundle).await.unwrap();

        let events = ledger
            .fetch_events(EventKind::TransferStarted, 11, 11)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value(fields::TRANSFER_ID), Some(id.as_str()));
        assert_eq!(events[0].value(fields::DONOR_ID), Some(addr(1).as_str()));
        assert_eq!(
            ledger.pending_transfer(&bundle, &addr(1)).await.unwrap(),
            Some(id)
        );
    }

    #[tokio::test]
    async fn resolve_requires_resolvable_transfer() {
        let ledger = NullLedger::new(addr(2));
        let id = TransferId::new("t1");
        assert!(ledger.resolve(&id).await.is_err());

        ledger.set_pending_transfer(&BundleId::new("b1"), &addr(1), id.clone());
        ledger.set_resolvable(&id, true);
        ledger.resolve(&id).await.unwrap();
        assert_eq!(ledger.resolved_transfers(), vec![id]);
        assert!(ledger
            .is_sheltering(&BundleId::new("b1"), &addr(2))
            .await
            .unwrap());
    }
}
