//! # tws-core
//!
//! Core types for the TwinState dual-universe reactive store.
//!
//! - [`Universe`] and [`FieldKey`]: the typed `(universe, field)` key every
//!   stored value is addressed by
//! - [`Value`], [`FieldKind`], [`Provenance`], [`StoredValue`]
//! - [`FieldDecl`] and [`Schema`]: the field registration surface a module
//!   hands to the core
//!
//! ## Example
//!
//! ```rust
//! use tws_core::{FieldDecl, Schema, Universe, Value};
//!
//! let schema = Schema::new(vec![
//!     FieldDecl::number("dailyHours", 12.0).reference_default(8.0),
//!     FieldDecl::number("annualOccupiedHours", 0.0)
//!         .derived()
//!         .depends_on(["dailyHours"]),
//! ])
//! .unwrap();
//!
//! let hours = schema.get("dailyHours").unwrap();
//! assert_eq!(hours.default_for(Universe::Reference), &Value::Number(8.0));
//! ```

pub mod schema;
pub mod universe;
pub mod value;

pub use schema::{FieldDecl, FieldRole, Schema, SchemaError};
pub use universe::{FieldKey, Universe};
pub use value::{FieldKind, Provenance, StoredValue, Value, WriteOutcome};
