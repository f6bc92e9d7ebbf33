//! Edge types for graphs.
//!
//! An edge binds one output port of a producer to one input port of a
//! consumer. Edges are created by [`Graph::add_flow`](crate::graph::Graph::add_flow)
//! and are immutable once registered.

use core::fmt;

use crate::node::NodeId;
use crate::port::QueueKey;

/// Unique identifier for an edge in the graph.
///
/// IDs are dense indices assigned in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    /// Creates a new edge ID.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge_{}", self.0)
    }
}

/// A directed binding from a producer output port to a consumer input port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// The edge ID.
    pub id: EdgeId,
    /// Node owning the output port.
    pub producer: NodeId,
    /// Index of the output port on the producer.
    pub output: usize,
    /// Node owning the input port.
    pub consumer: NodeId,
    /// Index of the input port on the consumer.
    pub input: usize,
}

impl Edge {
    /// Creates a new edge.
    #[must_use]
    pub fn new(id: EdgeId, producer: NodeId, output: usize, consumer: NodeId, input: usize) -> Self {
        Self {
            id,
            producer,
            output,
            consumer,
            input,
        }
    }

    /// The destination queue. Edges into the same input port share it.
    pub(crate) fn queue_key(&self) -> QueueKey {
        QueueKey {
            node: self.consumer,
            input: self.input,
        }
    }

    /// Returns `true` if both edges bind the same pair of ports.
    #[must_use]
    pub fn connects_same_ports(&self, other: &Self) -> bool {
        self.producer == other.producer
            && self.output == other.output
            && self.consumer == other.consumer
            && self.input == other.input
    }
}
