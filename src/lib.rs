//! An operator-graph streaming engine in Rust.
//!

pub use holoflow_internal::*;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use holoflow_internal::prelude::*;
}
