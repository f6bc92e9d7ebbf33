//! Unified event enum for scheduler hooks.
//!
//! All hooks receive `&EngineEvent` and match on variants for typed access.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use crate::error::OperatorError;
use crate::node::NodeId;

/// Events emitted during a scheduler run.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    // ─────────────────────────────────────────────────────────────────────────
    // Run-Level Events
    // ─────────────────────────────────────────────────────────────────────────
    /// Fired before the first execution of a run.
    RunStart {
        /// Number of nodes in the graph.
        node_count: usize,
        /// Number of worker threads.
        worker_count: usize,
    },

    /// Fired after every worker has exited.
    RunComplete {
        /// Successful executions across all nodes.
        executions: u64,
        /// Number of failed nodes.
        failures: usize,
        /// Whether the run ended through a stop request.
        stopped: bool,
        /// Wall-clock duration of the run.
        duration: Duration,
    },

    /// Fired once when a stop is first requested.
    StopRequested {
        /// The node whose compute asked to stop, if any.
        requested_by: Option<NodeId>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Node Events
    // ─────────────────────────────────────────────────────────────────────────
    /// Fired on the worker thread before a compute call.
    NodeStart {
        /// The executing node.
        node_id: NodeId,
        /// The node's name.
        node_name: Arc<str>,
        /// Zero-based execution index.
        execution: u64,
        /// Worker running the execution.
        worker: usize,
    },

    /// Fired after a compute call returned successfully.
    NodeComplete {
        /// The executed node.
        node_id: NodeId,
        /// The node's name.
        node_name: Arc<str>,
        /// Zero-based execution index.
        execution: u64,
        /// How long the compute call took.
        duration: Duration,
    },

    /// Fired when a node fails.
    NodeError {
        /// The failed node.
        node_id: NodeId,
        /// The node's name.
        node_name: Arc<str>,
        /// The failure.
        error: OperatorError,
    },

    /// Fired when a node's conditions are exhausted.
    NodeExhausted {
        /// The exhausted node.
        node_id: NodeId,
        /// The node's name.
        node_name: Arc<str>,
        /// Successful executions of the node in this run.
        executions: u64,
    },

    /// Fired when a node can never run again because its inputs are drained
    /// and every upstream producer finished normally.
    NodeDrained {
        /// The drained node.
        node_id: NodeId,
        /// The node's name.
        node_name: Arc<str>,
    },

    /// Fired when a node can never run again because upstream failed.
    NodeStarved {
        /// The starved node.
        node_id: NodeId,
        /// The node's name.
        node_name: Arc<str>,
    },
}

impl EngineEvent {
    /// Returns the kind tag of the event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RunStart { .. } => EventKind::RunStart,
            Self::RunComplete { .. } => EventKind::RunComplete,
            Self::StopRequested { .. } => EventKind::StopRequested,
            Self::NodeStart { .. } => EventKind::NodeStart,
            Self::NodeComplete { .. } => EventKind::NodeComplete,
            Self::NodeError { .. } => EventKind::NodeError,
            Self::NodeExhausted { .. } => EventKind::NodeExhausted,
            Self::NodeDrained { .. } => EventKind::NodeDrained,
            Self::NodeStarved { .. } => EventKind::NodeStarved,
        }
    }

    /// Returns the node the event refers to, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::NodeStart { node_id, .. }
            | Self::NodeComplete { node_id, .. }
            | Self::NodeError { node_id, .. }
            | Self::NodeExhausted { node_id, .. }
            | Self::NodeDrained { node_id, .. }
            | Self::NodeStarved { node_id, .. } => Some(*node_id),
            Self::StopRequested { requested_by } => *requested_by,
            Self::RunStart { .. } | Self::RunComplete { .. } => None,
        }
    }
}

/// Tag identifying a kind of [`EngineEvent`]; hooks are registered per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// See [`EngineEvent::RunStart`].
    RunStart,
    /// See [`EngineEvent::RunComplete`].
    RunComplete,
    /// See [`EngineEvent::StopRequested`].
    StopRequested,
    /// See [`EngineEvent::NodeStart`].
    NodeStart,
    /// See [`EngineEvent::NodeComplete`].
    NodeComplete,
    /// See [`EngineEvent::NodeError`].
    NodeError,
    /// See [`EngineEvent::NodeExhausted`].
    NodeExhausted,
    /// See [`EngineEvent::NodeDrained`].
    NodeDrained,
    /// See [`EngineEvent::NodeStarved`].
    NodeStarved,
}

impl EventKind {
    /// Every event kind.
    pub const ALL: [Self; 9] = [
        Self::RunStart,
        Self::RunComplete,
        Self::StopRequested,
        Self::NodeStart,
        Self::NodeComplete,
        Self::NodeError,
        Self::NodeExhausted,
        Self::NodeDrained,
        Self::NodeStarved,
    ];

    /// Returns the kind's name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::RunStart => "RunStart",
            Self::RunComplete => "RunComplete",
            Self::StopRequested => "StopRequested",
            Self::NodeStart => "NodeStart",
            Self::NodeComplete => "NodeComplete",
            Self::NodeError => "NodeError",
            Self::NodeExhausted => "NodeExhausted",
            Self::NodeDrained => "NodeDrained",
            Self::NodeStarved => "NodeStarved",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let event = EngineEvent::NodeStart {
            node_id: NodeId::new(1),
            node_name: Arc::from("flagger"),
            execution: 0,
            worker: 2,
        };
        assert_eq!(event.kind(), EventKind::NodeStart);
        assert_eq!(event.node_id(), Some(NodeId::new(1)));

        let event = EngineEvent::RunStart {
            node_count: 3,
            worker_count: 4,
        };
        assert_eq!(event.kind(), EventKind::RunStart);
        assert_eq!(event.node_id(), None);
    }

    #[test]
    fn kind_names_are_unique() {
        let mut names: Vec<_> = EventKind::ALL.iter().map(|kind| kind.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
        assert_eq!(EventKind::NodeError.to_string(), "NodeError");
    }
}
