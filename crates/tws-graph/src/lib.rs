//! # tws-graph
//!
//! Dependency graph for the TwinState store.
//!
//! The graph documents which fields are computed from which, across module
//! boundaries, and refuses any edge that would close a cycle. It is used for
//! diagnostics and recompute-order queries; evaluation itself is listener
//! driven.
//!
//! ## Example
//!
//! ```rust
//! use tws_graph::{DependencyGraph, GraphError};
//!
//! let mut graph = DependencyGraph::new();
//! graph.add_edge("dailyHours", "annualOccupiedHours", "hours x 365").unwrap();
//! graph.add_edge("annualOccupiedHours", "occupantGains", "").unwrap();
//!
//! // Closing the loop is a configuration error, not a runtime hang.
//! let err = graph.add_edge("occupantGains", "dailyHours", "").unwrap_err();
//! assert!(matches!(err, GraphError::Cycle { .. }));
//!
//! assert_eq!(
//!     graph.recompute_order(&["dailyHours"]),
//!     vec!["annualOccupiedHours", "occupantGains"]
//! );
//! ```

mod graph;

pub use graph::{DependencyEdge, DependencyGraph, GraphError, GraphStats};
