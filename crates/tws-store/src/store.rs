//! Value Store - the shared keyed store all modules publish into.
//!
//! Provides:
//! - Universe-qualified reads and writes with provenance tracking
//! - Synchronous listener dispatch after every stored write
//! - Transactional batch writes
//! - Dependency registration with cycle rejection
//! - The namespaced string view used by external collaborators

use crate::batch::{BatchReport, WriteBatch};
use crate::error::StoreError;
use crate::listener::{Change, ListenerFn, ListenerId, ListenerRegistry};
use crate::namespace::KeyNamespace;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use tws_core::{FieldKey, Provenance, StoredValue, Universe, Value, WriteOutcome};
use tws_graph::{DependencyGraph, GraphError};

#[derive(Default)]
struct Counters {
    writes: AtomicU64,
    rejected: AtomicU64,
    notifications: AtomicU64,
    batches: AtomicU64,
}

struct Inner {
    values: RwLock<HashMap<FieldKey, StoredValue>>,
    listeners: RwLock<ListenerRegistry>,
    graph: RwLock<DependencyGraph>,
    namespace: KeyNamespace,
    counters: Counters,
}

/// Handle to the shared value store.
///
/// Cloning is cheap and every clone refers to the same store. Modules receive
/// a handle at construction; there is no global instance.
///
/// No lock is held while listeners run, so a listener may write to the store
/// again (directly or through a module recalculation). The store does not
/// bound that recursion; callers break cycles.
#[derive(Clone)]
pub struct ValueStore {
    inner: Arc<Inner>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::with_namespace(KeyNamespace::default())
    }

    pub fn with_namespace(namespace: KeyNamespace) -> Self {
        Self {
            inner: Arc::new(Inner {
                values: RwLock::new(HashMap::new()),
                listeners: RwLock::new(ListenerRegistry::default()),
                graph: RwLock::new(DependencyGraph::new()),
                namespace,
                counters: Counters::default(),
            }),
        }
    }

    // === Reads ===

    /// Current value, or `None` when nothing was published under `key`.
    pub fn get(&self, key: &FieldKey) -> Option<Value> {
        self.inner.values.read().get(key).map(|s| s.value.clone())
    }

    pub fn get_stored(&self, key: &FieldKey) -> Option<StoredValue> {
        self.inner.values.read().get(key).cloned()
    }

    pub fn contains(&self, key: &FieldKey) -> bool {
        self.inner.values.read().contains_key(key)
    }

    /// Numeric reading of `key`; missing or unparsable values yield
    /// `fallback`.
    pub fn number(&self, key: &FieldKey, fallback: f64) -> f64 {
        self.inner
            .values
            .read()
            .get(key)
            .map_or(fallback, |s| s.value.number_or(fallback))
    }

    /// Every stored entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<FieldKey, StoredValue> {
        self.inner
            .values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Stored entries of one universe, keyed by bare field name.
    pub fn universe_view(&self, universe: Universe) -> BTreeMap<String, StoredValue> {
        self.inner
            .values
            .read()
            .iter()
            .filter(|(k, _)| k.universe() == universe)
            .map(|(k, v)| (k.field().to_string(), v.clone()))
            .collect()
    }

    // === Writes ===

    /// Store `value` under `key`, then synchronously notify the key's
    /// listeners in registration order.
    ///
    /// A `Default` write over a computed value is refused and nobody is
    /// notified.
    pub fn set(&self, key: FieldKey, value: Value, provenance: Provenance) -> WriteOutcome {
        let outcome = {
            let mut values = self.inner.values.write();
            self.write_locked(&mut values, &key, value.clone(), provenance)
        };

        if outcome.is_stored() {
            self.notify(Change {
                key,
                value,
                provenance,
            });
        }
        outcome
    }

    /// Apply every entry of `batch` under one lock, then notify listeners
    /// for each written key in batch order.
    pub fn apply(&self, batch: WriteBatch) -> BatchReport {
        if batch.is_empty() {
            return BatchReport::default();
        }
        self.inner.counters.batches.fetch_add(1, Ordering::Relaxed);

        let mut report = BatchReport::default();
        let mut changes = Vec::with_capacity(batch.len());
        {
            let mut values = self.inner.values.write();
            for entry in batch {
                let outcome = self.write_locked(
                    &mut values,
                    &entry.key,
                    entry.value.clone(),
                    entry.provenance,
                );
                if outcome.is_stored() {
                    report.written.push(entry.key.clone());
                    changes.push(Change {
                        key: entry.key,
                        value: entry.value,
                        provenance: entry.provenance,
                    });
                } else {
                    report.rejected.push(entry.key);
                }
            }
        }

        debug!(
            written = report.written.len(),
            rejected = report.rejected.len(),
            "Applied write batch"
        );
        for change in changes {
            self.notify(change);
        }
        report
    }

    fn write_locked(
        &self,
        values: &mut HashMap<FieldKey, StoredValue>,
        key: &FieldKey,
        value: Value,
        provenance: Provenance,
    ) -> WriteOutcome {
        let outcome = match values.get_mut(key) {
            Some(existing) if !existing.accepts_write(provenance) => WriteOutcome::Rejected,
            Some(existing) => {
                existing.value = value;
                existing.provenance = provenance;
                WriteOutcome::Updated
            }
            None => {
                values.insert(key.clone(), StoredValue::new(value, provenance));
                WriteOutcome::Inserted
            }
        };

        if outcome.is_stored() {
            self.inner.counters.writes.fetch_add(1, Ordering::Relaxed);
            trace!(%key, %provenance, "Stored value");
        } else {
            self.inner.counters.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(%key, %provenance, "Refused default write over computed value");
        }
        outcome
    }

    fn notify(&self, change: Change) {
        // Snapshot the callbacks so listeners can (un)register freely.
        let callbacks = self.inner.listeners.read().callbacks_for(&change.key);
        if callbacks.is_empty() {
            return;
        }

        self.inner
            .counters
            .notifications
            .fetch_add(callbacks.len() as u64, Ordering::Relaxed);
        trace!(key = %change.key, listeners = callbacks.len(), "Dispatching change");

        for callback in callbacks {
            callback(&change);
        }
    }

    // === Listeners ===

    /// Register `callback` on `key` on behalf of `owner`.
    ///
    /// Idempotent per `(key, owner)`: re-registering returns the existing
    /// id, so a module that initializes twice does not double-fire.
    pub fn add_listener<F>(&self, key: FieldKey, owner: &str, callback: F) -> ListenerId
    where
        F: Fn(&Change) + Send + Sync + 'static,
    {
        let callback: Arc<ListenerFn> = Arc::new(callback);
        let (id, created) = self
            .inner
            .listeners
            .write()
            .register(key.clone(), owner, callback);
        if created {
            debug!(%key, owner, %id, "Registered listener");
        }
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.write().remove(id)
    }

    /// Remove every listener registered by `owner`.
    pub fn remove_listeners_of(&self, owner: &str) -> usize {
        self.inner.listeners.write().remove_owner(owner)
    }

    pub fn listener_count(&self, key: &FieldKey) -> usize {
        self.inner.listeners.read().count_for(key)
    }

    // === Dependencies ===

    /// Record that `downstream` is computed from `upstream`.
    ///
    /// Purely descriptive: nothing is recomputed. An edge that would close a
    /// cycle is refused.
    pub fn register_dependency(
        &self,
        upstream: &str,
        downstream: &str,
        note: &str,
    ) -> Result<(), GraphError> {
        self.inner
            .graph
            .write()
            .add_edge(upstream, downstream, note)
    }

    /// Copy of the dependency graph for diagnostics.
    pub fn dependency_graph(&self) -> DependencyGraph {
        self.inner.graph.read().clone()
    }

    // === Namespace ===

    pub fn namespace(&self) -> &KeyNamespace {
        &self.inner.namespace
    }

    /// Read through a namespaced string (`field` or `ref_field`).
    pub fn get_namespaced(&self, name: &str) -> Option<Value> {
        self.get(&self.inner.namespace.parse(name))
    }

    /// Write through a namespaced string, e.g. from an importer.
    pub fn import_namespaced(
        &self,
        name: &str,
        value: Value,
        provenance: Provenance,
    ) -> Result<WriteOutcome, StoreError> {
        let key = self.inner.namespace.parse(name);
        self.inner.namespace.check_field_name(key.field())?;
        Ok(self.set(key, value, provenance))
    }

    /// Flat `namespaced key -> value` view of the whole store.
    pub fn export_namespace(&self) -> BTreeMap<String, String> {
        self.inner
            .values
            .read()
            .iter()
            .map(|(k, v)| (self.inner.namespace.render(k), v.value.to_plain_string()))
            .collect()
    }

    // === Diagnostics ===

    pub fn stats(&self) -> StoreStats {
        let (target_keys, reference_keys) = {
            let values = self.inner.values.read();
            let target = values
                .keys()
                .filter(|k| k.universe() == Universe::Target)
                .count();
            (target, values.len() - target)
        };
        let counters = &self.inner.counters;

        StoreStats {
            target_keys,
            reference_keys,
            listeners: self.inner.listeners.read().len(),
            writes: counters.writes.load(Ordering::Relaxed),
            rejected_writes: counters.rejected.load(Ordering::Relaxed),
            notifications: counters.notifications.load(Ordering::Relaxed),
            batches: counters.batches.load(Ordering::Relaxed),
        }
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueStore")
            .field("namespace", &self.inner.namespace)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Counters describing store activity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub target_keys: usize,
    pub reference_keys: usize,
    pub listeners: usize,
    pub writes: u64,
    pub rejected_writes: u64,
    pub notifications: u64,
    pub batches: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_get_absent_is_none() {
        let store = ValueStore::new();
        assert_eq!(store.get(&FieldKey::target("missing")), None);
        assert_eq!(store.number(&FieldKey::target("missing"), 4.0), 4.0);
    }

    #[test]
    fn test_universes_are_isolated() {
        let store = ValueStore::new();
        store.set(FieldKey::target("dailyHours"), Value::Number(12.0), Provenance::User);
        store.set(FieldKey::reference("dailyHours"), Value::Number(8.0), Provenance::Default);

        assert_eq!(store.get(&FieldKey::target("dailyHours")), Some(Value::Number(12.0)));
        assert_eq!(store.get(&FieldKey::reference("dailyHours")), Some(Value::Number(8.0)));
    }

    #[test]
    fn test_number_fallback_on_parse_error() {
        let store = ValueStore::new();
        store.set(FieldKey::target("area"), Value::text("n/a"), Provenance::User);
        assert_eq!(store.number(&FieldKey::target("area"), 0.0), 0.0);
    }

    #[test]
    fn test_default_cannot_overwrite_computed() {
        let store = ValueStore::new();
        let key = FieldKey::target("annualOccupiedHours");
        store.set(key.clone(), Value::Number(4380.0), Provenance::Computed);

        assert_eq!(
            store.set(key.clone(), Value::Number(0.0), Provenance::Default),
            WriteOutcome::Rejected
        );
        assert_eq!(store.get(&key), Some(Value::Number(4380.0)));
        assert_eq!(
            store.set(key.clone(), Value::Number(10.0), Provenance::User),
            WriteOutcome::Updated
        );
        assert_eq!(store.stats().rejected_writes, 1);
    }

    #[test]
    fn test_listeners_fire_in_registration_order_after_write() {
        let store = ValueStore::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let key = FieldKey::target("occupants");

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            let reader = store.clone();
            store.add_listener(key.clone(), name, move |change| {
                // The write is visible before any listener runs.
                let current = reader.get(&change.key);
                seen.lock().push((name, current));
            });
        }

        store.set(key.clone(), Value::Number(126.0), Provenance::User);

        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![
                ("first", Some(Value::Number(126.0))),
                ("second", Some(Value::Number(126.0)))
            ]
        );
    }

    #[test]
    fn test_rejected_write_does_not_notify() {
        let store = ValueStore::new();
        let key = FieldKey::target("x");
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        store.set(key.clone(), Value::Number(1.0), Provenance::Computed);
        store.add_listener(key.clone(), "m", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.set(key, Value::Number(2.0), Provenance::Default);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_only_sees_its_universe() {
        let store = ValueStore::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        store.add_listener(FieldKey::reference("x"), "m", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        store.set(FieldKey::target("x"), Value::Number(1.0), Provenance::User);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        store.set(FieldKey::reference("x"), Value::Number(1.0), Provenance::User);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_removing_itself_during_dispatch() {
        let store = ValueStore::new();
        let key = FieldKey::target("x");
        let count = Arc::new(AtomicUsize::new(0));
        let id_slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let (c, slot, handle) = (Arc::clone(&count), Arc::clone(&id_slot), store.clone());
        let id = store.add_listener(key.clone(), "once", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            if let Some(id) = slot.lock().take() {
                handle.remove_listener(id);
            }
        });
        *id_slot.lock() = Some(id);

        let c2 = Arc::clone(&count);
        store.add_listener(key.clone(), "always", move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        store.set(key.clone(), Value::Number(1.0), Provenance::User);
        // Both ran during the dispatch that removed "once".
        assert_eq!(count.load(Ordering::SeqCst), 11);

        store.set(key, Value::Number(2.0), Provenance::User);
        assert_eq!(count.load(Ordering::SeqCst), 21);
    }

    #[test]
    fn test_reentrant_write_from_listener() {
        let store = ValueStore::new();
        let handle = store.clone();
        store.add_listener(FieldKey::target("dailyHours"), "occupancy", move |change| {
            let hours = change.value.number_or(0.0);
            handle.set(
                FieldKey::target("annualOccupiedHours"),
                Value::Number(hours * 365.0),
                Provenance::Computed,
            );
        });

        store.set(FieldKey::target("dailyHours"), Value::Number(12.0), Provenance::User);
        assert_eq!(
            store.get(&FieldKey::target("annualOccupiedHours")),
            Some(Value::Number(4380.0))
        );
    }

    #[test]
    fn test_batch_is_visible_in_full_to_every_listener() {
        let store = ValueStore::new();
        let observed = Arc::new(Mutex::new(Vec::new()));
        let (obs, reader) = (Arc::clone(&observed), store.clone());
        store.add_listener(FieldKey::reference("a"), "watcher", move |_| {
            // When the first key's listener runs, the second is already stored.
            obs.lock().push(reader.get(&FieldKey::reference("b")));
        });

        let batch = WriteBatch::new()
            .with(FieldKey::reference("a"), Value::Number(1.0), Provenance::Computed)
            .with(FieldKey::reference("b"), Value::Number(2.0), Provenance::Computed);
        let report = store.apply(batch);

        assert!(report.is_complete());
        assert_eq!(report.written.len(), 2);
        assert_eq!(*observed.lock(), vec![Some(Value::Number(2.0))]);
    }

    #[test]
    fn test_register_dependency_rejects_cycle() {
        let store = ValueStore::new();
        store.register_dependency("a", "b", "").unwrap();
        store.register_dependency("b", "c", "").unwrap();
        assert!(matches!(
            store.register_dependency("c", "a", ""),
            Err(GraphError::Cycle { .. })
        ));
        assert_eq!(store.dependency_graph().edge_count(), 2);
    }

    #[test]
    fn test_namespace_view() {
        let store = ValueStore::new();
        store.set(FieldKey::target("cop"), Value::Number(3.5), Provenance::User);
        store
            .import_namespaced("ref_cop", Value::Number(2.8), Provenance::User)
            .unwrap();

        assert_eq!(store.get(&FieldKey::reference("cop")), Some(Value::Number(2.8)));
        assert_eq!(store.get_namespaced("cop"), Some(Value::Number(3.5)));

        let exported = store.export_namespace();
        assert_eq!(exported.get("cop").map(String::as_str), Some("3.5"));
        assert_eq!(exported.get("ref_cop").map(String::as_str), Some("2.8"));
    }
}
