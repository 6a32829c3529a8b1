//! In-memory view of the custody obligations that are currently live.
//!
//! Ledger events for one obligation can land in the same polling window in
//! any relative order across the three event kinds. They are merged into a
//! single list sorted by ledger position and replayed in that order, so a
//! `resolved` event never overtakes the `started` event it refers to.

use std::collections::HashMap;

use shelter_types::{EventPosition, Resolution};

/// One ledger event, tagged with the action it has on the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResolutionEvent {
    /// A new obligation appeared.
    Started(Resolution),
    /// One resolution of the obligation was recorded.
    Resolved { id: String, position: EventPosition },
    /// The obligation ended without being resolved.
    TimedOut { id: String, position: EventPosition },
}

impl ResolutionEvent {
    pub fn position(&self) -> EventPosition {
        match self {
            ResolutionEvent::Started(record) => record.position(),
            ResolutionEvent::Resolved { position, .. }
            | ResolutionEvent::TimedOut { position, .. } => *position,
        }
    }
}

/// Tag the three event batches and merge them into ledger order.
///
/// The sort is stable: events at the same position keep the
/// started, resolved, timed-out precedence of the concatenation.
pub fn merge_resolution_events(
    started: Vec<Resolution>,
    resolved: Vec<Resolution>,
    timed_out: Vec<Resolution>,
) -> Vec<ResolutionEvent> {
    let mut events: Vec<ResolutionEvent> = started
        .into_iter()
        .map(ResolutionEvent::Started)
        .chain(resolved.into_iter().map(|r| ResolutionEvent::Resolved {
            position: r.position(),
            id: r.id,
        }))
        .chain(timed_out.into_iter().map(|r| ResolutionEvent::TimedOut {
            position: r.position(),
            id: r.id,
        }))
        .collect();
    events.sort_by_key(ResolutionEvent::position);
    events
}

/// Mapping from resolution id to the live record.
#[derive(Clone, Debug, Default)]
pub struct ActiveResolutions {
    records: HashMap<String, Resolution>,
}

impl ActiveResolutions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless its id is already active. A zero `count` is
    /// treated as the default of 1.
    pub fn add(&mut self, mut record: Resolution) {
        if self.records.contains_key(&record.id) {
            return;
        }
        if record.count == 0 {
            record.count = 1;
        }
        self.records.insert(record.id.clone(), record);
    }

    pub fn has(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Resolution> {
        self.records.get(id)
    }

    /// Remove a record. Absent ids are ignored.
    pub fn expire(&mut self, id: &str) -> Option<Resolution> {
        self.records.remove(id)
    }

    /// Decrement the remaining count, removing the record when it reaches
    /// zero. Returns the removed record.
    pub fn decrease_active_count(&mut self, id: &str) -> Option<Resolution> {
        let record = self.records.get_mut(id)?;
        record.count = record.count.saturating_sub(1);
        if record.count == 0 {
            self.records.remove(id)
        } else {
            None
        }
    }

    /// Copies of every active record, ascending by ledger position.
    pub fn active_resolutions(&self) -> Vec<Resolution> {
        let mut records: Vec<Resolution> = self.records.values().cloned().collect();
        records.sort_by_key(Resolution::position);
        records
    }

    /// Replace the whole state, e.g. when hydrating from a snapshot.
    pub fn set_active_resolutions(&mut self, records: Vec<Resolution>) {
        self.records.clear();
        for record in records {
            self.add(record);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Apply one tagged event.
    pub fn apply(&mut self, event: ResolutionEvent) -> Option<Resolution> {
        match event {
            ResolutionEvent::Started(record) => {
                self.add(record);
                None
            }
            ResolutionEvent::Resolved { id, .. } => self.decrease_active_count(&id),
            ResolutionEvent::TimedOut { id, .. } => {
                self.expire(&id);
                None
            }
        }
    }

    /// Merge the batches into ledger order and apply them one by one.
    ///
    /// Returns the records that `resolved` events discharged completely, in
    /// the order they were discharged.
    pub fn apply_incoming_resolution_events(
        &mut self,
        started: Vec<Resolution>,
        resolved: Vec<Resolution>,
        timed_out: Vec<Resolution>,
    ) -> Vec<Resolution> {
        merge_resolution_events(started, resolved, timed_out)
            .into_iter()
            .filter_map(|event| self.apply(event))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, block: u64, log: u64) -> Resolution {
        Resolution::new(id, block, log)
    }

    #[test]
    fn add_is_idempotent_and_keeps_first_record() {
        let mut cache = ActiveResolutions::new();
        cache.add(rec("A", 1, 0).with_count(12));
        cache.add(rec("A", 2, 0).with_count(2207));
        assert_eq!(cache.get("A").map(|r| r.count), Some(12));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn add_defaults_zero_count_to_one() {
        let mut cache = ActiveResolutions::new();
        cache.add(rec("A", 1, 0).with_count(0));
        assert_eq!(cache.get("A").map(|r| r.count), Some(1));
    }

    #[test]
    fn decrease_removes_exactly_at_zero() {
        let mut cache = ActiveResolutions::new();
        cache.add(rec("A", 1, 0).with_count(3));

        assert!(cache.decrease_active_count("A").is_none());
        assert_eq!(cache.get("A").map(|r| r.count), Some(2));
        assert!(cache.decrease_active_count("A").is_none());
        assert_eq!(cache.get("A").map(|r| r.count), Some(1));

        let removed = cache.decrease_active_count("A").expect("removed at zero");
        assert_eq!(removed.count, 0);
        assert!(!cache.has("A"));

        assert!(cache.decrease_active_count("A").is_none());
        assert!(!cache.has("A"));
    }

    #[test]
    fn expire_is_unconditional_and_idempotent() {
        let mut cache = ActiveResolutions::new();
        cache.add(rec("A", 1, 0).with_count(5));
        assert!(cache.expire("A").is_some());
        assert!(cache.expire("A").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn active_resolutions_sorted_by_position() {
        let mut cache = ActiveResolutions::new();
        cache.add(rec("c", 5, 0));
        cache.add(rec("a", 2, 7));
        cache.add(rec("b", 2, 3));
        let ids: Vec<String> = cache.active_resolutions().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }

    #[test]
    fn set_active_resolutions_replaces_state() {
        let mut cache = ActiveResolutions::new();
        cache.add(rec("old", 1, 0));
        cache.set_active_resolutions(vec![rec("x", 3, 0), rec("y", 4, 0)]);
        assert!(!cache.has("old"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn resolutions_apply_in_block_order_regardless_of_input_order() {
        let mut cache = ActiveResolutions::new();
        cache.apply_incoming_resolution_events(
            vec![rec("1", 1, 0).with_count(5)],
            vec![rec("1", 3, 0), rec("1", 2, 0)],
            vec![],
        );
        assert_eq!(cache.get("1").map(|r| r.count), Some(3));
    }

    #[test]
    fn resolved_before_started_in_input_still_applies_after_start() {
        let mut cache = ActiveResolutions::new();
        let discharged = cache.apply_incoming_resolution_events(
            vec![rec("t", 10, 1)],
            vec![rec("t", 12, 0)],
            vec![],
        );
        assert!(!cache.has("t"));
        assert_eq!(discharged.len(), 1);
        assert_eq!(discharged[0].id, "t");
    }

    #[test]
    fn resolution_preceding_start_is_a_noop() {
        let mut cache = ActiveResolutions::new();
        cache.apply_incoming_resolution_events(
            vec![rec("t", 10, 1).with_count(2)],
            vec![rec("t", 9, 0)],
            vec![],
        );
        assert_eq!(cache.get("t").map(|r| r.count), Some(2));
    }

    #[test]
    fn timeout_removes_and_later_start_recreates() {
        let mut cache = ActiveResolutions::new();
        cache.apply_incoming_resolution_events(
            vec![rec("s", 1, 0), rec("s", 8, 0)],
            vec![],
            vec![rec("s", 5, 0)],
        );
        let record = cache.get("s").expect("re-added after timeout");
        assert_eq!(record.block_number, 8);
    }

    #[test]
    fn same_position_keeps_started_first() {
        let merged = merge_resolution_events(
            vec![rec("x", 4, 2)],
            vec![rec("x", 4, 2)],
            vec![rec("x", 4, 2)],
        );
        assert!(matches!(merged[0], ResolutionEvent::Started(_)));
        assert!(matches!(merged[1], ResolutionEvent::Resolved { .. }));
        assert!(matches!(merged[2], ResolutionEvent::TimedOut { .. }));
    }

    #[test]
    fn discharged_records_only_come_from_resolved_events() {
        let mut cache = ActiveResolutions::new();
        let discharged = cache.apply_incoming_resolution_events(
            vec![rec("a", 1, 0), rec("b", 1, 1)],
            vec![rec("a", 2, 0), rec("unknown", 2, 1)],
            vec![rec("b", 3, 0)],
        );
        let ids: Vec<String> = discharged.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a"]);
        assert!(cache.is_empty());
    }
}
