//! Error types for the value store.

use thiserror::Error;
use tws_graph::GraphError;

/// Errors that can occur in store operations.
///
/// Reads and writes never fail; only registration and namespace checks do.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Field name must not be empty")]
    EmptyFieldName,

    #[error("Field name {field} starts with the reference prefix {prefix}")]
    AmbiguousFieldName { field: String, prefix: String },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
