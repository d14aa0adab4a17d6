//! # tws-store
//!
//! The shared value store every TwinState module publishes into.
//!
//! Values are addressed by a typed [`FieldKey`](tws_core::FieldKey), so a
//! Target read can never observe a Reference value. Writes notify the
//! listeners registered on exactly that key, synchronously and in
//! registration order, after the value is visible.
//!
//! ## Example
//!
//! ```rust
//! use tws_core::{FieldKey, Provenance, Value};
//! use tws_store::ValueStore;
//!
//! let store = ValueStore::new();
//! let handle = store.clone();
//! store.add_listener(FieldKey::target("dailyHours"), "occupancy", move |change| {
//!     let hours = change.value.number_or(0.0);
//!     handle.set(
//!         FieldKey::target("annualOccupiedHours"),
//!         Value::Number(hours * 365.0),
//!         Provenance::Computed,
//!     );
//! });
//!
//! store.set(FieldKey::target("dailyHours"), Value::Number(12.0), Provenance::User);
//! assert_eq!(store.get_namespaced("annualOccupiedHours"), Some(Value::Number(4380.0)));
//! assert_eq!(store.get_namespaced("ref_annualOccupiedHours"), None);
//! ```

pub mod batch;
pub mod error;
pub mod listener;
pub mod namespace;
pub mod store;

pub use batch::{BatchEntry, BatchReport, WriteBatch};
pub use error::{Result, StoreError};
pub use listener::{Change, ListenerFn, ListenerId};
pub use namespace::{KeyNamespace, DEFAULT_REFERENCE_PREFIX};
pub use store::{StoreStats, ValueStore};
