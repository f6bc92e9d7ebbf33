//! Operators and the graph nodes that host them.
//!
//! An [`Operator`] is the user-supplied unit of computation. It declares its
//! ports once in [`Operator::setup`] and is invoked through
//! [`Operator::compute`] every time its node is scheduled. The graph wraps
//! each operator in a [`Node`], which adds a stable [`NodeId`], the port
//! queues and the scheduling conditions.

use core::fmt;
use std::sync::Arc;

use downcast_rs::{Downcast, impl_downcast};
use parking_lot::Mutex;

use crate::condition::BoxedCondition;
use crate::context::ExecutionContext;
use crate::error::OperatorError;
use crate::message::Payload;
use crate::port::{InputPort, OutputPort, PortDirection, PortSpec};

/// Unique identifier for a node in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Creates a new node ID.
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

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

/// Scheduling state of a node within a run.
///
/// ```text
/// Idle ──▶ Ready ──▶ Running ──▶ Idle
///   │                   │
///   ▼                   ▼
/// Exhausted           Failed
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Waiting for inputs, conditions or queue room.
    #[default]
    Idle,
    /// Queued for a worker.
    Ready,
    /// Executing on a worker.
    Running,
    /// A condition will never permit again.
    Exhausted,
    /// An execution failed.
    Failed,
}

impl RunState {
    /// Returns `true` for states a node never leaves during a run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Exhausted | Self::Failed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Operator
// ─────────────────────────────────────────────────────────────────────────────

/// Port declarations collected from [`Operator::setup`].
#[derive(Debug, Default)]
pub struct OperatorSpec {
    ports: Vec<PortSpec>,
}

impl OperatorSpec {
    /// Creates an empty spec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an input port with default capacity and policy.
    pub fn input<T: Payload>(&mut self, name: impl Into<String>) -> &mut Self {
        self.port(PortSpec::input::<T>(name))
    }

    /// Declares an output port.
    pub fn output<T: Payload>(&mut self, name: impl Into<String>) -> &mut Self {
        self.port(PortSpec::output::<T>(name))
    }

    /// Adds a fully configured port declaration.
    pub fn port(&mut self, spec: PortSpec) -> &mut Self {
        self.ports.push(spec);
        self
    }

    /// Returns the declared ports in declaration order.
    #[must_use]
    pub fn ports(&self) -> &[PortSpec] {
        &self.ports
    }

    pub(crate) fn into_ports(self) -> Vec<PortSpec> {
        self.ports
    }
}

/// A user-supplied computation hosted by a graph node.
///
/// The scheduler guarantees that `compute` never runs concurrently with
/// itself for the same operator instance, so it takes `&mut self` and may
/// keep state between executions.
///
/// # Example
///
/// ```
/// use holoflow_graph::prelude::*;
///
/// struct Doubler;
///
/// impl Operator for Doubler {
///     fn setup(&self, spec: &mut OperatorSpec) {
///         spec.input::<u32>("in").output::<u32>("out");
///     }
///
///     fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
///         let value = ctx.receive_as::<u32>("in")?;
///         ctx.emit(*value * 2, "out")
///     }
/// }
/// ```
pub trait Operator: Downcast + Send {
    /// Declares the operator's ports.
    fn setup(&self, spec: &mut OperatorSpec);

    /// Called once per run before the first execution.
    ///
    /// # Errors
    ///
    /// A failure marks the node failed before it ever executes.
    fn start(&mut self) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Performs one execution.
    ///
    /// # Errors
    ///
    /// Any error fails the node for the rest of the run.
    fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError>;

    /// Called once per run after the last execution.
    fn stop(&mut self) {}
}

impl_downcast!(Operator);

/// A type-erased operator.
pub type BoxedOperator = Box<dyn Operator>;

/// An operator built from a port list and a closure.
pub struct FnOperator<F> {
    ports: Vec<PortSpec>,
    compute: F,
}

impl<F> FnOperator<F>
where
    F: FnMut(&mut ExecutionContext<'_>) -> Result<(), OperatorError> + Send + 'static,
{
    /// Creates an operator from its ports and compute closure.
    #[must_use]
    pub fn new(ports: impl IntoIterator<Item = PortSpec>, compute: F) -> Self {
        Self {
            ports: ports.into_iter().collect(),
            compute,
        }
    }
}

impl<F> Operator for FnOperator<F>
where
    F: FnMut(&mut ExecutionContext<'_>) -> Result<(), OperatorError> + Send + 'static,
{
    fn setup(&self, spec: &mut OperatorSpec) {
        for port in &self.ports {
            spec.port(port.clone());
        }
    }

    fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        (self.compute)(ctx)
    }
}

impl<F> fmt::Debug for FnOperator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnOperator")
            .field("ports", &self.ports)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────────────────────

/// A vertex of the graph: an operator, its ports and its conditions.
pub struct Node {
    id: NodeId,
    name: Arc<str>,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    upstream: Vec<NodeId>,
    downstream: Vec<NodeId>,
    pub(crate) conditions: Mutex<Vec<BoxedCondition>>,
    pub(crate) operator: Mutex<BoxedOperator>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        name: Arc<str>,
        ports: Vec<PortSpec>,
        conditions: Vec<BoxedCondition>,
        operator: BoxedOperator,
    ) -> Self {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for port in ports {
            match port.direction() {
                PortDirection::Input => inputs.push(InputPort::new(port)),
                PortDirection::Output => outputs.push(OutputPort::new(port)),
            }
        }
        Self {
            id,
            name,
            inputs,
            outputs,
            upstream: Vec::new(),
            downstream: Vec::new(),
            conditions: Mutex::new(conditions),
            operator: Mutex::new(operator),
        }
    }

    /// Returns the node ID.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Returns the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Input ports in declaration order.
    #[must_use]
    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    /// Output ports in declaration order.
    #[must_use]
    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    /// Looks up an input port by name.
    #[must_use]
    pub fn input(&self, name: &str) -> Option<(usize, &InputPort)> {
        self.inputs
            .iter()
            .enumerate()
            .find(|(_, port)| port.name() == name)
    }

    /// Looks up an output port by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<(usize, &OutputPort)> {
        self.outputs
            .iter()
            .enumerate()
            .find(|(_, port)| port.name() == name)
    }

    /// Nodes with an edge into this node.
    #[must_use]
    pub fn upstream(&self) -> &[NodeId] {
        &self.upstream
    }

    /// Nodes this node has an edge into.
    #[must_use]
    pub fn downstream(&self) -> &[NodeId] {
        &self.downstream
    }

    /// Returns `true` if the node has no input ports.
    #[must_use]
    pub fn is_source(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Number of attached conditions.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.conditions.lock().len()
    }

    pub(crate) fn input_mut(&mut self, index: usize) -> &mut InputPort {
        &mut self.inputs[index]
    }

    pub(crate) fn output_mut(&mut self, index: usize) -> &mut OutputPort {
        &mut self.outputs[index]
    }

    pub(crate) fn link_upstream(&mut self, producer: NodeId) {
        if !self.upstream.contains(&producer) {
            self.upstream.push(producer);
        }
    }

    pub(crate) fn link_downstream(&mut self, consumer: NodeId) {
        if !self.downstream.contains(&consumer) {
            self.downstream.push(consumer);
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}
