//! # tws-persist
//!
//! Per-universe persistence for TwinState modules.
//!
//! Each `(module, universe)` owns one slot. Slots hold a versioned envelope
//! with a SHA-256 checksum over the persisted fields; anything that fails to
//! decode is discarded on load so the module reseeds its defaults.
//!
//! - [`SlotStore`]: blob storage ([`MemorySlotStore`], [`FileSlotStore`])
//! - [`PersistenceAdapter`]: `save` / `load` / `clear` over a slot store
//! - [`Envelope`] and [`decode`]: the on-disk format, including legacy
//!   flat-map blobs
//!
//! ## Example
//!
//! ```rust
//! use tws_core::{Provenance, StoredValue, Universe, Value};
//! use tws_persist::{PersistenceAdapter, StateMap};
//!
//! let adapter = PersistenceAdapter::in_memory();
//! let mut fields = StateMap::new();
//! fields.insert(
//!     "dailyHours".to_string(),
//!     StoredValue::new(Value::Number(12.0), Provenance::User),
//! );
//!
//! adapter.save("occupancy", Universe::Target, &fields).unwrap();
//! assert_eq!(adapter.load("occupancy", Universe::Target), Some(fields));
//! assert_eq!(adapter.load("occupancy", Universe::Reference), None);
//! ```

pub mod adapter;
pub mod checksum;
pub mod envelope;
pub mod error;
pub mod slot;

pub use adapter::PersistenceAdapter;
pub use checksum::Checksum;
pub use envelope::{decode, Decoded, Envelope, StateMap, FORMAT_VERSION, LEGACY_FORMAT};
pub use error::{PersistError, Result};
pub use slot::{FileSlotStore, MemorySlotStore, SlotKey, SlotStore};
