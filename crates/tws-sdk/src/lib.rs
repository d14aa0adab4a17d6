//! TwinState SDK - calculation modules on top of the dual-universe store
//!
//! A module declares its fields, keeps a private sub-store per universe and
//! recomputes its derived fields for both universes whenever an input or an
//! upstream field changes. The [`Engine`] owns the shared store, wires modules
//! together and runs whole-model operations.
//!
//! # Quick Start
//!
//! ```rust
//! use tws_core::{FieldDecl, Provenance, Universe, Value};
//! use tws_sdk::{Engine, EngineConfig, FnCalculation};
//!
//! let engine = Engine::new(EngineConfig::default());
//!
//! let occupancy = engine
//!     .register(FnCalculation::new(
//!         "occupancy",
//!         vec![
//!             FieldDecl::number("occupants", 126.0),
//!             FieldDecl::number("dailyHours", 8.0),
//!             FieldDecl::number("annualOccupiedHours", 0.0)
//!                 .derived()
//!                 .depends_on(["dailyHours"]),
//!         ],
//!         |ctx| {
//!             let hours = ctx.number("dailyHours");
//!             ctx.set_output("annualOccupiedHours", hours * 365.0)
//!         },
//!     ))
//!     .unwrap();
//!
//! let gains = engine
//!     .register(FnCalculation::new(
//!         "gains",
//!         vec![FieldDecl::number("occupantGains", 0.0)
//!             .derived()
//!             .depends_on(["occupants", "annualOccupiedHours"])],
//!         |ctx| {
//!             let kwh = ctx.number("occupants") * ctx.number("annualOccupiedHours") * 0.07;
//!             ctx.set_output("occupantGains", kwh)
//!         },
//!     ))
//!     .unwrap();
//!
//! // Editing the Target universe leaves Reference untouched.
//! occupancy.set("dailyHours", Value::Number(12.0), Provenance::User).unwrap();
//! assert_eq!(gains.get_in(Universe::Target, "occupantGains"), Some(Value::Number(126.0 * 4380.0 * 0.07)));
//! assert_eq!(gains.get_in(Universe::Reference, "occupantGains"), Some(Value::Number(126.0 * 2920.0 * 0.07)));
//! ```
//!
//! # Architecture
//!
//! - [`calculation`] - The [`Calculation`] trait and the per-pass context
//! - [`module`] - Module lifecycle, field access and rendering
//! - [`orchestrator`] - Dual-universe recomputation
//! - [`engine`] - Registration and whole-model operations
//! - [`state`] - Per-universe sub-stores
//! - [`guard`] - Re-entrancy and active-universe guards
//! - [`events`] - Broadcast events
//! - [`config`] - Engine and orchestrator configuration
//! - [`error`] - Error types

pub mod calculation;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod guard;
pub mod module;
pub mod orchestrator;
pub mod state;

// Re-exports for convenience
pub use calculation::{Calculation, FnCalculation, PassContext};
pub use config::{EngineConfig, EngineConfigBuilder, OrchestratorConfig};
pub use engine::{Engine, EngineStats};
pub use error::{CalcError, EngineError, ModuleError, Result};
pub use events::{EngineEvent, ModuleEvent};
pub use guard::{OverrideGuard, Reentrant, Reentry};
pub use module::{FieldView, Module, ModuleOptions, ModuleStats, ModuleView};
pub use orchestrator::{CalcReport, PassOutcome, PassReport};
pub use state::{ModuleState, UniverseState};

// Re-export the types every module author touches
pub use tws_core::{FieldDecl, FieldKey, FieldKind, Provenance, Universe, Value, WriteOutcome};
pub use tws_persist::{FileSlotStore, MemorySlotStore, PersistenceAdapter};
pub use tws_store::ValueStore;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::calculation::{Calculation, FnCalculation, PassContext};
    pub use crate::config::{EngineConfig, EngineConfigBuilder};
    pub use crate::engine::Engine;
    pub use crate::error::{CalcError, EngineError, ModuleError};
    pub use crate::module::Module;
    pub use tws_core::{FieldDecl, Provenance, Universe, Value};
}
