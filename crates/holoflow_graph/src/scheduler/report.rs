//! Run results.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use crate::error::{OperatorError, RunError};
use crate::node::NodeId;

/// How a node ended a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeOutcome {
    /// A condition was exhausted.
    Exhausted,
    /// Inputs drained after every upstream producer finished normally.
    Drained,
    /// Could never run again because upstream failed or stalled.
    Starved,
    /// An execution failed.
    Failed,
    /// Still runnable when the run was stopped.
    Stopped,
}

impl NodeOutcome {
    /// Returns `true` for outcomes of a normal, complete run.
    #[must_use]
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Exhausted | Self::Drained)
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exhausted => "exhausted",
            Self::Drained => "drained",
            Self::Starved => "starved",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Per-node summary of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    /// The node.
    pub node: NodeId,
    /// The node's name.
    pub name: Arc<str>,
    /// Successful executions.
    pub executions: u64,
    /// Final outcome.
    pub outcome: NodeOutcome,
}

/// A node failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// The failed node.
    pub node: NodeId,
    /// The node's name.
    pub name: Arc<str>,
    /// The error that failed it.
    pub error: OperatorError,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Per-node reports, indexed by [`NodeId`].
    pub nodes: Vec<NodeReport>,
    /// Failures in the order they were recorded.
    pub failures: Vec<NodeFailure>,
    /// Whether the run ended through a stop request.
    pub stopped: bool,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl RunResult {
    /// Returns `true` if no node failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Report for a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeReport> {
        self.nodes.get(id.index())
    }

    /// Report for a node, looked up by name.
    #[must_use]
    pub fn node_by_name(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|report| &*report.name == name)
    }

    /// Successful executions of a node, zero for unknown nodes.
    #[must_use]
    pub fn executions(&self, id: NodeId) -> u64 {
        self.node(id).map_or(0, |report| report.executions)
    }

    /// Final outcome of a node.
    #[must_use]
    pub fn outcome(&self, id: NodeId) -> Option<NodeOutcome> {
        self.node(id).map(|report| report.outcome)
    }

    /// Successful executions across all nodes.
    #[must_use]
    pub fn total_executions(&self) -> u64 {
        self.nodes.iter().map(|report| report.executions).sum()
    }

    /// Converts node failures into an error.
    ///
    /// # Errors
    ///
    /// Returns [`RunError::NodesFailed`] if any node failed.
    pub fn into_result(self) -> Result<Self, RunError> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(RunError::NodesFailed(self.failures))
        }
    }
}
