//! Property tests for event replay ordering and chunked event collection.

use proptest::prelude::*;

use shelter_ledger::RawEvent;
use shelter_node::{collect_events_with_step, ActiveResolutions};
use shelter_types::Resolution;

// ---------------------------------------------------------------------------
// Chronological merge
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
enum Kind {
    Started,
    Resolved,
    TimedOut,
}

/// Events with unique positions, in arbitrary input order.
fn arb_events() -> impl Strategy<Value = Vec<(Kind, Resolution)>> {
    let kind = prop_oneof![
        2 => Just(Kind::Started),
        3 => Just(Kind::Resolved),
        1 => Just(Kind::TimedOut),
    ];
    prop::collection::vec((kind, 0u8..4, 1u32..4), 0..48)
        .prop_map(|events| {
            events
                .into_iter()
                .enumerate()
                .map(|(i, (kind, id, count))| {
                    let i = i as u64;
                    let record = Resolution::new(format!("r{id}"), i / 3, i % 3).with_count(count);
                    (kind, record)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
}

fn apply_one_by_one(events: &[(Kind, Resolution)]) -> ActiveResolutions {
    let mut ordered: Vec<&(Kind, Resolution)> = events.iter().collect();
    ordered.sort_by_key(|(_, record)| record.position());
    let mut cache = ActiveResolutions::new();
    for (kind, record) in ordered {
        match kind {
            Kind::Started => cache.add(record.clone()),
            Kind::Resolved => {
                cache.decrease_active_count(&record.id);
            }
            Kind::TimedOut => {
                cache.expire(&record.id);
            }
        }
    }
    cache
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn merged_apply_matches_sequential_replay(events in arb_events()) {
        let mut started = Vec::new();
        let mut resolved = Vec::new();
        let mut timed_out = Vec::new();
        for (kind, record) in events.iter().cloned() {
            match kind {
                Kind::Started => started.push(record),
                Kind::Resolved => resolved.push(record),
                Kind::TimedOut => timed_out.push(record),
            }
        }

        let mut merged = ActiveResolutions::new();
        merged.apply_incoming_resolution_events(started, resolved, timed_out);
        let expected = apply_one_by_one(&events);

        prop_assert_eq!(merged.active_resolutions(), expected.active_resolutions());
    }

    #[test]
    fn counts_never_increase_under_resolutions(count in 1u32..20, resolutions in 0usize..30) {
        let mut cache = ActiveResolutions::new();
        cache.add(Resolution::new("x", 0, 0).with_count(count));
        let mut last = count;
        for _ in 0..resolutions {
            cache.decrease_active_count("x");
            match cache.get("x") {
                Some(record) => {
                    prop_assert!(record.count < last);
                    prop_assert!(record.count > 0);
                    last = record.count;
                }
                None => last = 0,
            }
        }
        prop_assert_eq!(cache.has("x"), resolutions < count as usize);
    }
}

// ---------------------------------------------------------------------------
// Chunked fetch equivalence
// ---------------------------------------------------------------------------

/// Deterministic ledger stub: an event at every block divisible by 3, two
/// at every block divisible by 5.
fn stub_events(from: u64, to: u64) -> Vec<RawEvent> {
    let mut events = Vec::new();
    for block in from..=to {
        if block % 3 == 0 {
            events.push(RawEvent::new(block, 0).with("bundleId", format!("b{block}")));
        }
        if block % 5 == 0 {
            events.push(RawEvent::new(block, 1).with("bundleId", format!("c{block}")));
            events.push(
                RawEvent::new(block, 2)
                    .with("bundleId", format!("d{block}"))
                    .with("noise", "x"),
            );
        }
    }
    events
}

fn collect(from: u64, to: u64, step: u64) -> Vec<shelter_node::EventRecord> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    runtime
        .block_on(collect_events_with_step(
            from,
            to,
            step,
            |a, b| async move { Ok::<_, String>(stub_events(a, b)) },
            &["bundleId"],
        ))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn result_is_independent_of_step(
        from in 0u64..100,
        len in 0u64..250,
        step_a in 1u64..80,
        step_b in 1u64..80,
    ) {
        let to = from + len;
        let a = collect(from, to, step_a);
        let b = collect(from, to, step_b);
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a, collect(from, to, len + 1));
    }

    #[test]
    fn exact_multiple_and_single_block_ranges(from in 0u64..100, chunks in 1u64..10, step in 1u64..30) {
        let to = from + chunks * step - 1;
        prop_assert_eq!(collect(from, to, step), collect(from, to, 1));
        prop_assert_eq!(collect(from, from, step), collect(from, from, 1));
    }
}
