//! Operator-graph execution primitives for holoflow.
//!
//! `holoflow_graph` provides the building blocks of a streaming pipeline:
//! operators declare typed ports, edges bind those ports into a directed
//! acyclic graph, and an event-driven scheduler runs the graph on a pool of
//! worker threads.
//!
//! # Core Concepts
//!
//! - [`PortSpec`] - Named, typed input or output port declaration
//! - [`MessageQueue`](port::MessageQueue) - Bounded FIFO behind every input port
//! - [`Condition`] - Gate on whether a node may execute (count, boolean, periodic)
//! - [`Operator`] - User computation hosted by a node
//! - [`Graph`] - Builder for nodes and flows, sealed with [`Graph::freeze`]
//! - [`ExecutionContext`] - Port access for one execution
//! - [`Scheduler`] - Multi-worker runtime that executes a frozen graph
//!
//! # Example
//!
//! ```
//! use holoflow_graph::prelude::*;
//!
//! let mut graph = Graph::new();
//! let numbers = graph
//!     .add_node(
//!         "numbers",
//!         [PortSpec::output::<u64>("out")],
//!         [CountCondition::new(5).boxed()],
//!         |ctx| ctx.emit(ctx.execution(), "out"),
//!     )
//!     .unwrap();
//! let square = graph
//!     .add_node(
//!         "square",
//!         [PortSpec::input::<u64>("in"), PortSpec::output::<u64>("out")],
//!         [],
//!         |ctx| {
//!             let value = ctx.receive_as::<u64>("in")?;
//!             ctx.emit(*value * *value, "out")
//!         },
//!     )
//!     .unwrap();
//! let sink = graph
//!     .add_node("sink", [PortSpec::input::<u64>("in")], [], |ctx| {
//!         ctx.receive("in").map(drop)
//!     })
//!     .unwrap();
//! graph
//!     .add_flow(numbers, square, [("out", "in")])
//!     .unwrap()
//!     .add_flow(square, sink, [("out", "in")])
//!     .unwrap();
//! graph.freeze().unwrap();
//!
//! let result = Scheduler::default().run(&graph).unwrap();
//! assert!(result.is_success());
//! assert_eq!(result.executions(sink), 5);
//! ```

/// Execution conditions gating node readiness.
pub mod condition;

/// Per-execution port access for operators.
pub mod context;

/// Edges binding output ports to input ports.
pub mod edge;

/// Error types.
pub mod error;

/// Graph structure and builder API.
pub mod graph;

/// Lifecycle hooks for scheduler runs.
pub mod hooks;

/// Type-erased messages.
pub mod message;

/// Operators and the nodes hosting them.
pub mod node;

/// Port declarations and bounded message queues.
pub mod port;

/// Event-driven multi-worker scheduler.
pub mod scheduler;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::condition::{
        AlwaysCondition, BooleanCondition, BoxedCondition, Condition, ConditionFlag,
        CountCondition, PeriodicCondition,
    };
    pub use crate::context::ExecutionContext;
    pub use crate::edge::{Edge, EdgeId};
    pub use crate::error::{ConfigurationError, OperatorError, RunError};
    pub use crate::graph::Graph;
    pub use crate::hooks::{EngineEvent, EventKind, HooksAPI};
    pub use crate::message::{Message, Payload};
    pub use crate::node::{BoxedOperator, FnOperator, Node, NodeId, Operator, OperatorSpec, RunState};
    pub use crate::port::{OverflowPolicy, PortDirection, PortSpec};
    pub use crate::scheduler::{
        FailurePolicy, NodeFailure, NodeOutcome, NodeReport, RunResult, Scheduler,
        SchedulerConfig, StopHandle,
    };
}

// Re-export key types at crate root for convenience
pub use condition::Condition;
pub use context::ExecutionContext;
pub use error::{ConfigurationError, OperatorError, RunError};
pub use graph::Graph;
pub use message::Message;
pub use node::{NodeId, Operator};
pub use port::PortSpec;
pub use scheduler::{RunResult, Scheduler, SchedulerConfig};
