//! # holoflow Internal Library
//!
//! Re-exports the core holoflow crates for convenience.

/// Execution engine: ports, conditions, operators, graph and scheduler.
pub use holoflow_graph;

/// Ambient infrastructure (tracing setup).
pub use holoflow_core;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use holoflow_core::{TracingConfig, TracingFormat, TracingSetup};
    pub use holoflow_graph::prelude::*;
}
