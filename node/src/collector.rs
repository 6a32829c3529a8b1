//! Event collection over block ranges.
//!
//! Ledger nodes cap the size of a single log query, so a scan over
//! `[from_block, to_block]` is split into consecutive sub-ranges of at most
//! `step` blocks, fetched strictly in order. The first failing sub-range
//! aborts the whole collection.

use std::collections::BTreeMap;
use std::future::Future;

use shelter_ledger::RawEvent;
use shelter_types::{fields, Address, Resolution, ShelterError};

/// Predicate applied to raw events before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventFilter {
    Any,
    FieldEquals { field: &'static str, value: String },
    FieldNotEquals { field: &'static str, value: String },
}

impl EventFilter {
    /// Keep events whose `field` holds `address`.
    pub fn address_is(field: &'static str, address: &Address) -> Self {
        EventFilter::FieldEquals {
            field,
            value: address.as_str().to_string(),
        }
    }

    /// Keep events whose `field` holds anything but `address`.
    pub fn address_is_not(field: &'static str, address: &Address) -> Self {
        EventFilter::FieldNotEquals {
            field,
            value: address.as_str().to_string(),
        }
    }

    pub fn matches(&self, event: &RawEvent) -> bool {
        match self {
            EventFilter::Any => true,
            EventFilter::FieldEquals { field, value } => event
                .value(field)
                .is_some_and(|v| v.eq_ignore_ascii_case(value)),
            EventFilter::FieldNotEquals { field, value } => event
                .value(field)
                .is_some_and(|v| !v.eq_ignore_ascii_case(value)),
        }
    }
}

/// A normalized event: ordering keys plus the requested fields only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventRecord {
    pub block_number: u64,
    pub log_index: u64,
    pub fields: BTreeMap<String, String>,
}

impl EventRecord {
    /// Keep `block_number`, `log_index` and those of `output_fields` the
    /// event carries; everything else is dropped.
    pub fn normalize(event: RawEvent, output_fields: &[&str]) -> Self {
        let RawEvent {
            block_number,
            log_index,
            mut values,
        } = event;
        let fields = output_fields
            .iter()
            .filter_map(|name| values.remove(*name).map(|v| (name.to_string(), v)))
            .collect();
        Self {
            block_number,
            log_index,
            fields,
        }
    }

    /// Turn the record into a resolution keyed by `id_field`.
    ///
    /// A `count` field, when present, sets the number of resolutions the
    /// obligation needs; it defaults to 1.
    pub fn into_resolution(mut self, id_field: &str) -> Result<Resolution, ShelterError> {
        let id = self
            .fields
            .get(id_field)
            .cloned()
            .ok_or_else(|| ShelterError::MissingField(id_field.to_string()))?;
        let count = match self.fields.remove(fields::COUNT) {
            Some(raw) => raw.parse::<u32>().map_err(|_| ShelterError::InvalidField {
                field: fields::COUNT.to_string(),
                value: raw,
            })?,
            None => 1,
        };
        Ok(Resolution {
            id,
            block_number: self.block_number,
            log_index: self.log_index,
            count,
            fields: self.fields,
        })
    }
}

/// Split `[from_block, to_block]` into inclusive sub-ranges of at most
/// `step` blocks. The last sub-range may be shorter.
pub fn block_ranges(from_block: u64, to_block: u64, step: u64) -> Vec<(u64, u64)> {
    let step = step.max(1);
    let mut ranges = Vec::new();
    let mut start = from_block;
    while start <= to_block {
        let end = start.saturating_add(step - 1).min(to_block);
        ranges.push((start, end));
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    ranges
}

/// Fetch every event in `[from_block, to_block]`, `step` blocks at a time.
pub async fn collect_events_with_step<F, Fut, E>(
    from_block: u64,
    to_block: u64,
    step: u64,
    fetch: F,
    output_fields: &[&str],
) -> Result<Vec<EventRecord>, E>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<RawEvent>, E>>,
{
    collect_filtered_events_with_step(
        from_block,
        to_block,
        step,
        fetch,
        output_fields,
        &EventFilter::Any,
    )
    .await
}

/// Like [`collect_events_with_step`], keeping only events matching `filter`.
pub async fn collect_filtered_events_with_step<F, Fut, E>(
    from_block: u64,
    to_block: u64,
    step: u64,
    mut fetch: F,
    output_fields: &[&str],
    filter: &EventFilter,
) -> Result<Vec<EventRecord>, E>
where
    F: FnMut(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<RawEvent>, E>>,
{
    let mut records = Vec::new();
    for (sub_from, sub_to) in block_ranges(from_block, to_block, step) {
        let events = fetch(sub_from, sub_to).await?;
        tracing::trace!(
            from_block = sub_from,
            to_block = sub_to,
            count = events.len(),
            "fetched event chunk"
        );
        records.extend(
            events
                .into_iter()
                .filter(|e| filter.matches(e))
                .map(|e| EventRecord::normalize(e, output_fields)),
        );
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn raw(block: u64, log: u64) -> RawEvent {
        RawEvent::new(block, log)
            .with("bundleId", format!("b{block}"))
            .with("shelterer", "0xAA")
            .with("extra", "dropped")
    }

    #[test]
    fn ranges_cover_exact_multiple() {
        assert_eq!(block_ranges(0, 9, 5), vec![(0, 4), (5, 9)]);
    }

    #[test]
    fn ranges_with_remainder() {
        assert_eq!(block_ranges(10, 22, 5), vec![(10, 14), (15, 19), (20, 22)]);
    }

    #[test]
    fn single_block_range() {
        assert_eq!(block_ranges(7, 7, 100), vec![(7, 7)]);
    }

    #[test]
    fn empty_when_from_exceeds_to() {
        assert!(block_ranges(8, 7, 3).is_empty());
    }

    #[test]
    fn zero_step_is_treated_as_one() {
        assert_eq!(block_ranges(1, 3, 0), vec![(1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn range_ending_at_max_terminates() {
        assert_eq!(
            block_ranges(u64::MAX - 1, u64::MAX, 10),
            vec![(u64::MAX - 1, u64::MAX)]
        );
    }

    #[test]
    fn normalize_keeps_only_requested_fields() {
        let record = EventRecord::normalize(raw(3, 1), &["bundleId", "missing"]);
        assert_eq!(record.block_number, 3);
        assert_eq!(record.log_index, 1);
        assert_eq!(record.fields.len(), 1);
        assert_eq!(record.fields.get("bundleId").map(String::as_str), Some("b3"));
    }

    #[test]
    fn into_resolution_defaults_count() {
        let record = EventRecord::normalize(raw(3, 1), &["bundleId"]);
        let resolution = record.into_resolution("bundleId").unwrap();
        assert_eq!(resolution.id, "b3");
        assert_eq!(resolution.count, 1);
    }

    #[test]
    fn into_resolution_reads_count_field() {
        let event = RawEvent::new(1, 0).with("challengeId", "c1").with("count", "5");
        let record = EventRecord::normalize(event, &["challengeId", "count"]);
        let resolution = record.into_resolution("challengeId").unwrap();
        assert_eq!(resolution.count, 5);
        assert!(resolution.field("count").is_none());
    }

    #[test]
    fn into_resolution_rejects_missing_id() {
        let record = EventRecord::normalize(raw(1, 0), &["shelterer"]);
        assert!(matches!(
            record.into_resolution("bundleId"),
            Err(ShelterError::MissingField(_))
        ));
    }

    #[test]
    fn filters_compare_addresses_case_insensitively() {
        let node = Address::new("0xaa");
        let event = raw(1, 0);
        assert!(EventFilter::address_is("shelterer", &node).matches(&event));
        assert!(!EventFilter::address_is_not("shelterer", &node).matches(&event));
        assert!(!EventFilter::address_is("donorId", &node).matches(&event));
        assert!(EventFilter::Any.matches(&event));
    }

    #[tokio::test]
    async fn fetches_sub_ranges_in_order() {
        let calls = RefCell::new(Vec::new());
        let records = collect_events_with_step(
            1,
            12,
            5,
            |from, to| {
                calls.borrow_mut().push((from, to));
                async move { Ok::<_, String>(vec![raw(from, 0), raw(to, 1)]) }
            },
            &["bundleId"],
        )
        .await
        .unwrap();

        assert_eq!(*calls.borrow(), vec![(1, 5), (6, 10), (11, 12)]);
        let blocks: Vec<u64> = records.iter().map(|r| r.block_number).collect();
        assert_eq!(blocks, vec![1, 5, 6, 10, 11, 12]);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_sub_ranges() {
        let calls = RefCell::new(Vec::new());
        let result = collect_events_with_step(
            0,
            29,
            10,
            |from, to| {
                calls.borrow_mut().push((from, to));
                async move {
                    if from == 10 {
                        Err("boom".to_string())
                    } else {
                        Ok(vec![raw(from, 0)])
                    }
                }
            },
            &["bundleId"],
        )
        .await;

        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(*calls.borrow(), vec![(0, 9), (10, 19)]);
    }

    #[tokio::test]
    async fn filter_is_applied_before_normalization() {
        let node = Address::new("0xbb");
        let records = collect_filtered_events_with_step(
            0,
            0,
            1,
            |_, _| async {
                Ok::<_, String>(vec![
                    raw(0, 0),
                    RawEvent::new(0, 1)
                        .with("bundleId", "mine")
                        .with("shelterer", "0xBB"),
                ])
            },
            &["bundleId"],
            &EventFilter::address_is("shelterer", &node),
        )
        .await
        .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].fields.get("bundleId").map(String::as_str), Some("mine"));
        assert!(!records[0].fields.contains_key("shelterer"));
    }
}
