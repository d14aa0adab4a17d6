//! Persistence adapter shared by every module of an engine.

use crate::envelope::{decode, Decoded, Envelope, StateMap};
use crate::error::Result;
use crate::slot::{MemorySlotStore, SlotKey, SlotStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use tws_core::Universe;

/// Saves and restores module universes through a [`SlotStore`].
///
/// Cloning shares the underlying slot store.
#[derive(Clone)]
pub struct PersistenceAdapter {
    slots: Arc<dyn SlotStore>,
}

impl PersistenceAdapter {
    pub fn new(slots: impl SlotStore + 'static) -> Self {
        Self {
            slots: Arc::new(slots),
        }
    }

    pub fn from_shared(slots: Arc<dyn SlotStore>) -> Self {
        Self { slots }
    }

    /// Adapter over a fresh [`MemorySlotStore`].
    pub fn in_memory() -> Self {
        Self::new(MemorySlotStore::new())
    }

    pub fn slot_store(&self) -> &Arc<dyn SlotStore> {
        &self.slots
    }

    /// Seal `fields` into an envelope and store it.
    pub fn save(&self, module: &str, universe: Universe, fields: &StateMap) -> Result<()> {
        let key = SlotKey::new(module, universe);
        let envelope = Envelope::seal(&key, fields.clone())?;
        self.slots.write(&key, envelope.to_json()?)?;
        debug!(slot = %key, fields = fields.len(), checksum = %envelope.checksum.short(), "Saved slot");
        Ok(())
    }

    /// Restore a module universe.
    ///
    /// `None` when the slot was never written or cannot be trusted; the
    /// reason is logged and the caller reseeds defaults.
    pub fn load(&self, module: &str, universe: Universe) -> Option<StateMap> {
        let key = SlotKey::new(module, universe);
        match self.inspect(module, universe) {
            Ok(Some(decoded)) => {
                debug!(slot = %key, format = decoded.format, "Restored slot");
                Some(decoded.fields)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(slot = %key, error = %e, "Discarding unreadable slot");
                None
            }
        }
    }

    /// Strict variant of [`PersistenceAdapter::load`] that surfaces why a
    /// slot was rejected and reports its format and timestamp.
    pub fn inspect(&self, module: &str, universe: Universe) -> Result<Option<Decoded>> {
        let key = SlotKey::new(module, universe);
        match self.slots.read(&key)? {
            Some(blob) => decode(&key, &blob).map(Some),
            None => Ok(None),
        }
    }

    /// Remove both universes' slots of `module`, returning how many existed.
    pub fn clear(&self, module: &str) -> Result<usize> {
        let mut removed = 0;
        for universe in Universe::ALL {
            if self.slots.remove(&SlotKey::new(module, universe))? {
                removed += 1;
            }
        }
        debug!(module, removed, "Cleared slots");
        Ok(removed)
    }

    pub fn slots(&self) -> Result<Vec<SlotKey>> {
        self.slots.slots()
    }
}

impl Default for PersistenceAdapter {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl fmt::Debug for PersistenceAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistenceAdapter").finish_non_exhaustive()
    }
}
