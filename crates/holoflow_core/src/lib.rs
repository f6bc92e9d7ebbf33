//! Core infrastructure for holoflow applications.
//!
//! This crate provides the ambient pieces most holoflow binaries need:
//!
//! - [`TracingSetup`] - Installs a `tracing` subscriber (pretty, compact or JSON)
//! - [`TracingConfig`] - The configuration a subscriber was installed with
//!
//! # Example
//!
//! ```
//! use holoflow_core::{TracingFormat, TracingSetup};
//! use tracing::Level;
//!
//! let config = TracingSetup::new()
//!     .with_level(Level::DEBUG)
//!     .with_format(TracingFormat::Compact)
//!     .init();
//! assert_eq!(config.level, Level::DEBUG);
//! ```

mod tracing_setup;

pub use tracing_setup::{ParseFormatError, TracingConfig, TracingFormat, TracingSetup};
