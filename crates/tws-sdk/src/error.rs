//! Error types for the TwinState SDK.

use thiserror::Error;
use tws_core::SchemaError;
use tws_graph::GraphError;
use tws_persist::PersistError;
use tws_store::StoreError;

/// Errors surfaced by [`Module`](crate::Module) operations.
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("Unknown field {field} in module {module}")]
    UnknownField { module: String, field: String },

    #[error("Invalid schema for module {module}: {source}")]
    Schema {
        module: String,
        #[source]
        source: SchemaError,
    },

    #[error("Persistence failed for module {module}: {source}")]
    Persist {
        module: String,
        #[source]
        source: PersistError,
    },

    #[error("Dependency rejected in module {module}: {source}")]
    Dependency {
        module: String,
        #[source]
        source: GraphError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure reported by a [`Calculation`](crate::Calculation) pass.
///
/// Never reaches the caller of `set` or `calculate_all`; the orchestrator
/// logs it and publishes zeroed outputs instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalcError {
    #[error("Computation failed: {0}")]
    Failed(String),

    #[error("Unknown output field: {0}")]
    UnknownOutput(String),

    #[error("Field {0} is an input and cannot be written by a pass")]
    NotDerived(String),

    #[error("Pass panicked: {0}")]
    Panicked(String),
}

impl CalcError {
    pub fn failed(message: impl Into<String>) -> Self {
        CalcError::Failed(message.into())
    }
}

/// Errors surfaced by the [`Engine`](crate::Engine).
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Module already registered: {0}")]
    DuplicateModule(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Field {field} is declared by both {existing} and {incoming}")]
    DuplicatePublisher {
        field: String,
        existing: String,
        incoming: String,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for module operations.
pub type Result<T> = std::result::Result<T, ModuleError>;
