//! Lifecycle hooks for scheduler runs.
//!
//! Hooks let callers observe a run without touching operator code: progress
//! reporting, metrics, test assertions and so on.
//!
//! - Hooks execute in registration order
//! - Hooks never run while the scheduler holds its internal lock, so a hook
//!   may call [`StopHandle::stop`](crate::scheduler::StopHandle::stop)
//! - Hooks run on whichever thread produced the event
//!
//! # Architecture
//!
//! - **Events** ([`events`]): the [`EngineEvent`] enum and its [`EventKind`] tags
//! - **API** ([`api`]): registration and invocation
//!
//! # Example
//!
//! ```
//! use holoflow_graph::hooks::{EngineEvent, EventKind, HooksAPI};
//!
//! let hooks = HooksAPI::new();
//! hooks
//!     .register_observer("failures", [EventKind::NodeError], |event: &EngineEvent| {
//!         if let EngineEvent::NodeError { node_name, error, .. } = event {
//!             tracing::warn!(%node_name, %error, "node failed");
//!         }
//!     })
//!     .unwrap();
//! ```

pub mod api;
pub mod events;

pub use api::{BoxedHook, HookRegistrationError, HooksAPI};
pub use events::{EngineEvent, EventKind};
