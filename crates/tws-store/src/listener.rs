//! Listener registry.
//!
//! Listeners are keyed by [`FieldKey`] and invoked in registration order.
//! Dispatch works on a snapshot of the callback list, so a callback that
//! removes or re-registers listeners only affects later dispatches.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tws_core::{FieldKey, Provenance, Value};

/// A write observed by a listener.
#[derive(Clone, Debug, PartialEq)]
pub struct Change {
    pub key: FieldKey,
    pub value: Value,
    pub provenance: Provenance,
}

/// Callback invoked synchronously after a write.
pub type ListenerFn = dyn Fn(&Change) + Send + Sync;

/// Handle returned by registration, used for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

struct Entry {
    id: ListenerId,
    owner: String,
    callback: Arc<ListenerFn>,
}

#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: u64,
    by_key: HashMap<FieldKey, Vec<Entry>>,
    index: HashMap<ListenerId, FieldKey>,
}

impl ListenerRegistry {
    /// Register `callback` on `key` for `owner`.
    ///
    /// Registration is idempotent per `(key, owner)`: a second call returns
    /// the existing id and keeps the original callback. Returns whether a
    /// new entry was created.
    pub(crate) fn register(
        &mut self,
        key: FieldKey,
        owner: &str,
        callback: Arc<ListenerFn>,
    ) -> (ListenerId, bool) {
        let entries = self.by_key.entry(key.clone()).or_default();
        if let Some(existing) = entries.iter().find(|e| e.owner == owner) {
            return (existing.id, false);
        }

        self.next_id += 1;
        let id = ListenerId(self.next_id);
        entries.push(Entry {
            id,
            owner: owner.to_string(),
            callback,
        });
        self.index.insert(id, key);
        (id, true)
    }

    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        let Some(key) = self.index.remove(&id) else {
            return false;
        };
        if let Some(entries) = self.by_key.get_mut(&key) {
            entries.retain(|e| e.id != id);
            if entries.is_empty() {
                self.by_key.remove(&key);
            }
        }
        true
    }

    pub(crate) fn remove_owner(&mut self, owner: &str) -> usize {
        let ids: Vec<ListenerId> = self
            .by_key
            .values()
            .flatten()
            .filter(|e| e.owner == owner)
            .map(|e| e.id)
            .collect();
        ids.into_iter().filter(|id| self.remove(*id)).count()
    }

    /// Callbacks for `key`, cloned so the caller can release the lock.
    pub(crate) fn callbacks_for(&self, key: &FieldKey) -> Vec<Arc<ListenerFn>> {
        self.by_key
            .get(key)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.callback)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count_for(&self, key: &FieldKey) -> usize {
        self.by_key.get(key).map_or(0, Vec::len)
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Arc<ListenerFn> {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Change| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_registration_is_idempotent_per_owner() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::default();
        let key = FieldKey::target("occupants");

        let (first, created) = registry.register(key.clone(), "gains", counting(&counter));
        assert!(created);
        let (second, created) = registry.register(key.clone(), "gains", counting(&counter));
        assert!(!created);
        assert_eq!(first, second);

        registry.register(key.clone(), "ventilation", counting(&counter));
        assert_eq!(registry.count_for(&key), 2);
        assert_eq!(registry.count_for(&key.mirrored()), 0);
    }

    #[test]
    fn test_remove_and_remove_owner() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = ListenerRegistry::default();
        let (id, _) = registry.register(FieldKey::target("a"), "m1", counting(&counter));
        registry.register(FieldKey::reference("a"), "m1", counting(&counter));
        registry.register(FieldKey::target("b"), "m2", counting(&counter));

        assert!(registry.remove(id));
        assert!(!registry.remove(id));
        assert_eq!(registry.remove_owner("m1"), 1);
        assert_eq!(registry.len(), 1);
    }
}
