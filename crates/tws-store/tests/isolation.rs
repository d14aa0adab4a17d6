//! Integration tests for the shared value store.
//!
//! Tests cover:
//! - Universe isolation under arbitrary write sequences
//! - Batch writes are never observed half applied
//! - Re-entrant writes from listeners propagate down a chain
//! - Namespaced strings address the right universe

use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tws_core::{FieldKey, Provenance, Universe, Value};
use tws_store::{KeyNamespace, StoreError, ValueStore, WriteBatch};

fn universe_strategy() -> impl Strategy<Value = Universe> {
    prop_oneof![Just(Universe::Target), Just(Universe::Reference)]
}

fn write_strategy() -> impl Strategy<Value = (Universe, usize, f64)> {
    (universe_strategy(), 0usize..4, -1.0e6f64..1.0e6)
}

const FIELDS: [&str; 4] = ["occupants", "dailyHours", "area", "cop"];

proptest! {
    /// A write in one universe never changes what the other universe reads.
    #[test]
    fn writes_never_cross_universes(writes in prop::collection::vec(write_strategy(), 1..40)) {
        let store = ValueStore::new();
        let mut expected = std::collections::HashMap::new();

        for (universe, field, value) in writes {
            let key = FieldKey::new(universe, FIELDS[field]);
            let mirror = key.mirrored();
            let before = store.get(&mirror);

            store.set(key.clone(), Value::Number(value), Provenance::User);
            expected.insert(key, value);

            prop_assert_eq!(store.get(&mirror), before);
        }

        for (key, value) in expected {
            prop_assert_eq!(store.get(&key), Some(Value::Number(value)));
        }
    }

    /// Listeners on one universe fire only for that universe's writes.
    #[test]
    fn listeners_are_universe_scoped(writes in prop::collection::vec(write_strategy(), 1..40)) {
        let store = ValueStore::new();
        let target_hits = Arc::new(AtomicUsize::new(0));
        let reference_hits = Arc::new(AtomicUsize::new(0));

        for field in FIELDS {
            let t = Arc::clone(&target_hits);
            store.add_listener(FieldKey::target(field), "t", move |_| {
                t.fetch_add(1, Ordering::SeqCst);
            });
            let r = Arc::clone(&reference_hits);
            store.add_listener(FieldKey::reference(field), "r", move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            });
        }

        let target_writes = writes.iter().filter(|(u, _, _)| *u == Universe::Target).count();
        let reference_writes = writes.len() - target_writes;
        for (universe, field, value) in writes {
            store.set(FieldKey::new(universe, FIELDS[field]), Value::Number(value), Provenance::User);
        }

        prop_assert_eq!(target_hits.load(Ordering::SeqCst), target_writes);
        prop_assert_eq!(reference_hits.load(Ordering::SeqCst), reference_writes);
    }
}

/// Every listener triggered by a batch sees every entry of that batch.
#[test]
fn test_batch_observed_whole() {
    let store = ValueStore::new();
    let fields = ["annualOccupiedHours", "occupantGains", "ventilationRate"];
    let observations = Arc::new(Mutex::new(Vec::new()));

    for field in fields {
        let obs = Arc::clone(&observations);
        let reader = store.clone();
        store.add_listener(FieldKey::target(field), "observer", move |_| {
            let seen: Vec<_> = fields
                .iter()
                .map(|f| reader.get(&FieldKey::target(*f)))
                .collect();
            obs.lock().push(seen);
        });
    }

    let mut batch = WriteBatch::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        batch.push(
            FieldKey::target(*field),
            Value::Number(i as f64 + 1.0),
            Provenance::Computed,
        );
    }
    let report = store.apply(batch);
    assert_eq!(report.written.len(), 3);

    let observations = observations.lock();
    assert_eq!(observations.len(), 3);
    for seen in observations.iter() {
        assert!(seen.iter().all(Option::is_some));
    }
}

/// A batch partially refused by the overwrite rule still writes the rest.
#[test]
fn test_batch_reports_rejected_entries() {
    let store = ValueStore::new();
    store.set(FieldKey::target("a"), Value::Number(5.0), Provenance::Computed);

    let report = store.apply(
        WriteBatch::new()
            .with(FieldKey::target("a"), Value::Number(0.0), Provenance::Default)
            .with(FieldKey::target("b"), Value::Number(0.0), Provenance::Default),
    );

    assert_eq!(report.rejected, vec![FieldKey::target("a")]);
    assert_eq!(report.written, vec![FieldKey::target("b")]);
    assert_eq!(store.get(&FieldKey::target("a")), Some(Value::Number(5.0)));
}

/// Writes propagate down a listener chain; each stage reads its upstream
/// from the store rather than from the change payload.
#[test]
fn test_listener_chain_propagation() {
    let store = ValueStore::new();
    let stages = ["s0", "s1", "s2", "s3", "s4"];

    for pair in stages.windows(2) {
        let (up, down) = (pair[0], pair[1]);
        let handle = store.clone();
        for universe in Universe::ALL {
            let h = handle.clone();
            store.add_listener(FieldKey::new(universe, up), down, move |_| {
                let v = h.number(&FieldKey::new(universe, up), 0.0);
                h.set(
                    FieldKey::new(universe, down),
                    Value::Number(v + 1.0),
                    Provenance::Computed,
                );
            });
        }
        store.register_dependency(up, down, "+1").unwrap();
    }

    store.set(FieldKey::target("s0"), Value::Number(10.0), Provenance::User);
    store.set(FieldKey::reference("s0"), Value::Number(100.0), Provenance::User);

    assert_eq!(store.number(&FieldKey::target("s4"), 0.0), 14.0);
    assert_eq!(store.number(&FieldKey::reference("s4"), 0.0), 104.0);
    assert_eq!(
        store.dependency_graph().recompute_order(&["s0"]),
        vec!["s1", "s2", "s3", "s4"]
    );
}

/// The same bare field in both universes is read back through the
/// namespace without ambiguity.
#[test]
fn test_namespace_round_trip() {
    let store = ValueStore::new();
    store.set(FieldKey::target("heatingSystem"), Value::choice("Heatpump"), Provenance::User);
    store.set(FieldKey::reference("heatingSystem"), Value::choice("Gas"), Provenance::Default);

    let exported = store.export_namespace();
    assert_eq!(exported["heatingSystem"], "Heatpump");
    assert_eq!(exported["ref_heatingSystem"], "Gas");

    let copy = ValueStore::new();
    for (name, value) in &exported {
        copy.import_namespaced(name, Value::text(value.as_str()), Provenance::User)
            .unwrap();
    }
    assert_eq!(
        copy.get(&FieldKey::reference("heatingSystem")),
        Some(Value::text("Gas"))
    );
    assert_eq!(copy.stats().target_keys, 1);
    assert_eq!(copy.stats().reference_keys, 1);
}

#[test]
fn test_custom_prefix_and_ambiguous_import() {
    let store = ValueStore::with_namespace(KeyNamespace::new("baseline_"));
    store
        .import_namespaced("baseline_cop", Value::Number(2.5), Provenance::User)
        .unwrap();
    assert_eq!(store.get(&FieldKey::reference("cop")), Some(Value::Number(2.5)));

    let err = store
        .import_namespaced("baseline_", Value::Number(1.0), Provenance::User)
        .unwrap_err();
    assert!(matches!(err, StoreError::AmbiguousFieldName { .. }));
}
