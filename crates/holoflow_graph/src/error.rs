//! Error types for graph composition, operator execution and runs.
//!
//! - [`ConfigurationError`] is raised synchronously while composing or
//!   freezing a graph and never during execution.
//! - [`OperatorError`] is produced by (or on behalf of) a compute callback and
//!   fails the owning node.
//! - [`RunError`] is returned by [`Scheduler::run`](crate::scheduler::Scheduler::run).

use crate::node::NodeId;
use crate::port::PortDirection;
use crate::scheduler::NodeFailure;

/// Errors detected while composing, validating or freezing a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigurationError {
    /// A node with the same name is already registered.
    #[error("node '{name}' is already registered")]
    DuplicateNode {
        /// The duplicate node name.
        name: String,
    },

    /// A node declares the same port name twice in one direction.
    #[error("node '{node}' declares {direction} port '{port}' more than once")]
    DuplicatePort {
        /// The node name.
        node: String,
        /// The duplicate port name.
        port: String,
        /// Direction of the duplicate port.
        direction: PortDirection,
    },

    /// A node handle does not belong to this graph.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// A port name does not exist on the node in the given direction.
    #[error("node '{node}' has no {direction} port named '{port}'")]
    UnknownPort {
        /// The node name.
        node: String,
        /// The missing port name.
        port: String,
        /// Direction that was searched.
        direction: PortDirection,
    },

    /// Producer and consumer ports carry different payload types.
    #[error(
        "flow {producer}.{output} -> {consumer}.{input} carries '{output_type}' into a port expecting '{input_type}'"
    )]
    TypeMismatch {
        /// Producer node name.
        producer: String,
        /// Producer output port.
        output: String,
        /// Consumer node name.
        consumer: String,
        /// Consumer input port.
        input: String,
        /// Payload type of the output port.
        output_type: &'static str,
        /// Payload type of the input port.
        input_type: &'static str,
    },

    /// The same producer port is bound to the same consumer port twice.
    #[error("flow {producer}.{output} -> {consumer}.{input} is registered twice")]
    DuplicateEdge {
        /// Producer node name.
        producer: String,
        /// Producer output port.
        output: String,
        /// Consumer node name.
        consumer: String,
        /// Consumer input port.
        input: String,
    },

    /// An input port has no incoming edge and could never receive a message.
    #[error("input port '{port}' on node '{node}' has no incoming flow")]
    UnconnectedInput {
        /// The node name.
        node: String,
        /// The unconnected input port.
        port: String,
    },

    /// The edges contain a directed cycle.
    #[error("graph contains a cycle through nodes: {}", .nodes.join(", "))]
    Cycle {
        /// Names of the nodes that participate in (or sit behind) the cycle.
        nodes: Vec<String>,
    },

    /// A port was declared with a queue capacity of zero.
    #[error("port '{port}' on node '{node}' must have a capacity of at least 1")]
    InvalidCapacity {
        /// The node name.
        node: String,
        /// The offending port.
        port: String,
    },

    /// A structural change was attempted after [`Graph::freeze`](crate::graph::Graph::freeze).
    #[error("graph is frozen; structural changes are no longer allowed")]
    GraphFrozen,

    /// A run was attempted on a graph that has not been frozen.
    #[error("graph must be frozen before it can run")]
    NotFrozen,

    /// The scheduler was configured with zero workers.
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
}

/// Failure of a single operator execution.
///
/// Any `OperatorError` returned from (or raised on behalf of) a compute
/// callback transitions the owning node to
/// [`RunState::Failed`](crate::node::RunState::Failed).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorError {
    /// `receive` was called on an input port with no available message.
    #[error("readiness violation: input port '{port}' has no message")]
    ReadinessViolation {
        /// The empty input port.
        port: String,
    },

    /// The port name is not declared on the executing node.
    #[error("no {direction} port named '{port}'")]
    UnknownPort {
        /// The requested port.
        port: String,
        /// Direction that was searched.
        direction: PortDirection,
    },

    /// A payload of the wrong type was emitted or requested.
    #[error("port '{port}' carries '{expected}', got '{actual}'")]
    PayloadType {
        /// The port involved.
        port: String,
        /// Declared payload type of the port.
        expected: &'static str,
        /// Type that was emitted or requested.
        actual: &'static str,
    },

    /// A destination queue with the `Reject` policy was full.
    #[error("queue '{queue}' is full (capacity {capacity})")]
    Overflow {
        /// Destination queue as `node.port`.
        queue: String,
        /// Capacity of the queue.
        capacity: usize,
    },

    /// A blocked emit was abandoned because the run is stopping.
    #[error("emit on port '{port}' interrupted by a stop request")]
    Interrupted {
        /// The output port that was emitting.
        port: String,
    },

    /// A blocked emit could never complete: every execution in the run was
    /// waiting on a full queue and no other node could run.
    #[error("emit into queue '{queue}' stalled: every running node is blocked on a full queue")]
    Stalled {
        /// Destination queue as `node.port`.
        queue: String,
    },

    /// The compute callback panicked.
    #[error("compute panicked: {0}")]
    Panicked(String),

    /// The compute callback reported a failure.
    #[error("{0}")]
    Compute(String),
}

impl OperatorError {
    /// Creates a [`OperatorError::Compute`] from any displayable message.
    #[must_use]
    pub fn compute(message: impl Into<String>) -> Self {
        Self::Compute(message.into())
    }
}

/// Errors returned by a scheduler run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The graph or scheduler configuration is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The scheduler is already executing a graph.
    #[error("scheduler is already running a graph")]
    AlreadyRunning,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked outside of operator code.
    #[error("worker thread panicked")]
    WorkerPanicked,

    /// One or more nodes failed during the run.
    #[error("{} node(s) failed: {}", .0.len(), summarize(.0))]
    NodesFailed(Vec<NodeFailure>),
}

fn summarize(failures: &[NodeFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{} ({})", failure.name, failure.error))
        .collect::<Vec<_>>()
        .join("; ")
}
