//! Slot storage trait and implementations.
//!
//! A slot holds one opaque blob per `(module, universe)`. The adapter
//! decides what goes in the blob; slot stores only move strings around.

use crate::error::{PersistError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tws_core::Universe;

/// Address of a persisted blob.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotKey {
    module: String,
    universe: Universe,
}

impl SlotKey {
    pub fn new(module: impl Into<String>, universe: Universe) -> Self {
        Self {
            module: module.into(),
            universe,
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    /// `"{module}.{target|reference}"`.
    pub fn render(&self) -> String {
        format!("{}.{}", self.module, self.universe.as_str())
    }

    /// Inverse of [`SlotKey::render`].
    pub fn parse(s: &str) -> Option<Self> {
        let (module, universe) = s.rsplit_once('.')?;
        if module.is_empty() {
            return None;
        }
        let universe = match universe {
            "target" => Universe::Target,
            "reference" => Universe::Reference,
            _ => return None,
        };
        Some(Self::new(module, universe))
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Trait for blob storage keyed by [`SlotKey`].
///
/// Implementations use interior mutability so one store can be shared by
/// every module of an engine.
pub trait SlotStore: Send + Sync {
    /// Read a slot; `Ok(None)` when it was never written.
    fn read(&self, key: &SlotKey) -> Result<Option<String>>;

    /// Replace the contents of a slot.
    fn write(&self, key: &SlotKey, blob: String) -> Result<()>;

    /// Delete a slot, returning whether it existed.
    fn remove(&self, key: &SlotKey) -> Result<bool>;

    /// Every slot currently stored, in key order.
    fn slots(&self) -> Result<Vec<SlotKey>>;
}

/// In-process slot store.
#[derive(Debug, Default)]
pub struct MemorySlotStore {
    slots: RwLock<BTreeMap<SlotKey, String>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl SlotStore for MemorySlotStore {
    fn read(&self, key: &SlotKey) -> Result<Option<String>> {
        Ok(self.slots.read().get(key).cloned())
    }

    fn write(&self, key: &SlotKey, blob: String) -> Result<()> {
        self.slots.write().insert(key.clone(), blob);
        Ok(())
    }

    fn remove(&self, key: &SlotKey) -> Result<bool> {
        Ok(self.slots.write().remove(key).is_some())
    }

    fn slots(&self) -> Result<Vec<SlotKey>> {
        Ok(self.slots.read().keys().cloned().collect())
    }
}

/// One JSON file per slot under a directory.
///
/// Writes go to a hidden temp file first and are renamed into place, so a
/// crash mid-write leaves the previous blob intact.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    dir: PathBuf,
}

const SLOT_EXTENSION: &str = "json";

impl FileSlotStore {
    /// Open (creating if needed) a slot directory.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &SlotKey) -> Result<PathBuf> {
        let module = key.module();
        let unsafe_name = module.is_empty()
            || module.starts_with('.')
            || module.contains(['/', '\\']);
        if unsafe_name {
            return Err(PersistError::InvalidSlot(module.to_string()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", key.render(), SLOT_EXTENSION)))
    }
}

impl SlotStore for FileSlotStore {
    fn read(&self, key: &SlotKey) -> Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &SlotKey, blob: String) -> Result<()> {
        let path = self.path_for(key)?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", key.render(), SLOT_EXTENSION));
        fs::write(&tmp, blob)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &SlotKey) -> Result<bool> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn slots(&self) -> Result<Vec<SlotKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SLOT_EXTENSION) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| !s.starts_with('.'))
                .and_then(SlotKey::parse)
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_key_render_and_parse() {
        let key = SlotKey::new("occupancy", Universe::Reference);
        assert_eq!(key.render(), "occupancy.reference");
        assert_eq!(SlotKey::parse("occupancy.reference"), Some(key));
        assert_eq!(
            SlotKey::parse("section.v2.target"),
            Some(SlotKey::new("section.v2", Universe::Target))
        );
        assert_eq!(SlotKey::parse("occupancy.baseline"), None);
        assert_eq!(SlotKey::parse(".target"), None);
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySlotStore::new();
        let key = SlotKey::new("gains", Universe::Target);
        assert_eq!(store.read(&key).unwrap(), None);

        store.write(&key, "{}".into()).unwrap();
        assert_eq!(store.read(&key).unwrap().as_deref(), Some("{}"));
        assert_eq!(store.slots().unwrap(), vec![key.clone()]);

        assert!(store.remove(&key).unwrap());
        assert!(!store.remove(&key).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_file_store_rejects_path_like_modules() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSlotStore::new(dir.path()).unwrap();
        let key = SlotKey::new("../escape", Universe::Target);
        assert!(matches!(
            store.write(&key, "{}".into()),
            Err(PersistError::InvalidSlot(_))
        ));
    }
}
