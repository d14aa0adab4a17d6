//! Transactional write batches.
//!
//! A recomputation pass buffers all of its outputs and hands them to the
//! store in one [`WriteBatch`]. The store writes every entry under a single
//! lock acquisition and only then notifies listeners, so no listener (and no
//! interleaved writer) ever sees a partially applied pass.

use tws_core::{FieldKey, Provenance, Value};

/// One buffered write.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchEntry {
    pub key: FieldKey,
    pub value: Value,
    pub provenance: Provenance,
}

/// Ordered buffer of writes applied atomically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WriteBatch {
    entries: Vec<BatchEntry>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Buffer a write. A later write to the same key replaces the earlier
    /// one in place, keeping its position.
    pub fn push(&mut self, key: FieldKey, value: Value, provenance: Provenance) {
        if let Some(existing) = self.entries.iter_mut().find(|e| e.key == key) {
            existing.value = value;
            existing.provenance = provenance;
        } else {
            self.entries.push(BatchEntry {
                key,
                value,
                provenance,
            });
        }
    }

    /// Builder-style [`WriteBatch::push`].
    pub fn with(mut self, key: FieldKey, value: Value, provenance: Provenance) -> Self {
        self.push(key, value, provenance);
        self
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl IntoIterator for WriteBatch {
    type Item = BatchEntry;
    type IntoIter = std::vec::IntoIter<BatchEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// What happened when a batch was applied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    /// Keys written, in batch order.
    pub written: Vec<FieldKey>,
    /// Keys the overwrite rule refused.
    pub rejected: Vec<FieldKey>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_replaces_same_key_in_place() {
        let mut batch = WriteBatch::new();
        batch.push(FieldKey::target("a"), Value::Number(1.0), Provenance::Computed);
        batch.push(FieldKey::target("b"), Value::Number(2.0), Provenance::Computed);
        batch.push(FieldKey::target("a"), Value::Number(3.0), Provenance::Computed);

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.entries()[0].key, FieldKey::target("a"));
        assert_eq!(batch.entries()[0].value, Value::Number(3.0));
    }

    #[test]
    fn test_same_field_in_both_universes_is_two_entries() {
        let batch = WriteBatch::new()
            .with(FieldKey::target("a"), Value::Number(1.0), Provenance::Computed)
            .with(FieldKey::reference("a"), Value::Number(2.0), Provenance::Computed);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.entries()[1].key, FieldKey::reference("a"));
    }
}
