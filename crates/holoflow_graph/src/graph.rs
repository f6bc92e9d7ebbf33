//! Graph structure and builder API.
//!
//! A [`Graph`] is a directed acyclic graph of operator nodes connected by
//! port-to-port edges. It is composed mutably with [`Graph::add_operator`],
//! [`Graph::add_node`] and [`Graph::add_flow`], then sealed with
//! [`Graph::freeze`]. A frozen graph's structure never changes and can be
//! run by a [`Scheduler`](crate::scheduler::Scheduler) any number of times.
//!
//! Port names and payload types are checked eagerly while composing. The
//! whole-graph checks (unconnected inputs and cycles) run in
//! [`Graph::validate`] and [`Graph::freeze`].

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{MappedMutexGuard, MutexGuard};

use crate::condition::{BoxedCondition, Condition};
use crate::context::ExecutionContext;
use crate::edge::{Edge, EdgeId};
use crate::error::{ConfigurationError, OperatorError};
use crate::node::{BoxedOperator, FnOperator, Node, NodeId, Operator, OperatorSpec};
use crate::port::{PortDirection, PortSpec};

/// A directed acyclic graph of operators.
///
/// # Example
///
/// ```
/// use holoflow_graph::prelude::*;
///
/// let mut graph = Graph::new();
/// let source = graph
///     .add_node(
///         "source",
///         [PortSpec::output::<u32>("out")],
///         [CountCondition::new(3).boxed()],
///         |ctx| ctx.emit(1_u32, "out"),
///     )
///     .unwrap();
/// let sink = graph
///     .add_node("sink", [PortSpec::input::<u32>("in")], [], |ctx| {
///         ctx.receive("in").map(drop)
///     })
///     .unwrap();
/// graph.add_flow(source, sink, [("out", "in")]).unwrap();
/// graph.freeze().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Graph {
    /// All nodes, indexed by [`NodeId`].
    nodes: Vec<Node>,
    /// All edges, indexed by [`EdgeId`].
    edges: Vec<Edge>,
    /// Node lookup by name.
    names: HashMap<Arc<str>, NodeId>,
    /// Topological order, populated on freeze.
    order: Vec<NodeId>,
    frozen: bool,
}

impl Graph {
    /// Creates a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all nodes in the graph.
    #[must_use]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Returns all edges in the graph.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` once [`Graph::freeze`] has succeeded.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Gets a node by ID.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// Gets an edge by ID.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index())
    }

    /// Looks up a node ID by name.
    #[must_use]
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    /// Topological order of the nodes. Empty until the graph is frozen.
    #[must_use]
    pub fn topological_order(&self) -> &[NodeId] {
        &self.order
    }

    /// Returns `true` if `to` is `from` or lies downstream of it.
    #[must_use]
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut pending = vec![from];
        while let Some(id) = pending.pop() {
            if id == to {
                return true;
            }
            let Some(node) = self.node(id) else {
                continue;
            };
            if core::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            pending.extend_from_slice(node.downstream());
        }
        false
    }

    /// Borrows a node's operator as its concrete type.
    ///
    /// Intended for inspecting operator state after a run. Returns `None` if
    /// the node does not exist or hosts a different operator type. Blocks
    /// while the operator is executing.
    #[must_use]
    pub fn operator<T: Operator>(&self, id: NodeId) -> Option<MappedMutexGuard<'_, T>> {
        let guard = self.node(id)?.operator.lock();
        MutexGuard::try_map(guard, |operator| {
            let operator: &mut dyn Operator = &mut **operator;
            operator.downcast_mut::<T>()
        })
        .ok()
    }

    /// Borrows the first condition of type `T` attached to a node.
    #[must_use]
    pub fn condition<T: Condition>(&self, id: NodeId) -> Option<MappedMutexGuard<'_, T>> {
        let guard = self.node(id)?.conditions.lock();
        MutexGuard::try_map(guard, |conditions| {
            conditions
                .iter_mut()
                .find_map(|condition| condition.downcast_mut::<T>())
        })
        .ok()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder API
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds an operator node.
    ///
    /// The operator's ports are taken from [`Operator::setup`].
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::GraphFrozen`] after [`Graph::freeze`]
    /// - [`ConfigurationError::DuplicateNode`] if the name is taken
    /// - [`ConfigurationError::DuplicatePort`] if a port name repeats
    /// - [`ConfigurationError::InvalidCapacity`] for a zero-capacity input
    pub fn add_operator<O: Operator>(
        &mut self,
        name: impl Into<String>,
        operator: O,
        conditions: impl IntoIterator<Item = BoxedCondition>,
    ) -> Result<NodeId, ConfigurationError> {
        self.add_boxed_operator(name, Box::new(operator), conditions)
    }

    /// Adds an already boxed operator node.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::add_operator`].
    pub fn add_boxed_operator(
        &mut self,
        name: impl Into<String>,
        operator: BoxedOperator,
        conditions: impl IntoIterator<Item = BoxedCondition>,
    ) -> Result<NodeId, ConfigurationError> {
        if self.frozen {
            return Err(ConfigurationError::GraphFrozen);
        }

        let name: String = name.into();
        if self.names.contains_key(name.as_str()) {
            return Err(ConfigurationError::DuplicateNode { name });
        }

        let mut spec = OperatorSpec::new();
        operator.setup(&mut spec);
        let ports = spec.into_ports();
        check_ports(&name, &ports)?;

        let id = NodeId::new(self.nodes.len());
        let name: Arc<str> = Arc::from(name);
        self.names.insert(Arc::clone(&name), id);
        self.nodes.push(Node::new(
            id,
            name,
            ports,
            conditions.into_iter().collect(),
            operator,
        ));

        tracing::debug!(node = %id, name = %self.nodes[id.index()].name(), "node added");
        Ok(id)
    }

    /// Adds a node from a port list and a compute closure.
    ///
    /// # Errors
    ///
    /// Same as [`Graph::add_operator`].
    pub fn add_node<F>(
        &mut self,
        name: impl Into<String>,
        ports: impl IntoIterator<Item = PortSpec>,
        conditions: impl IntoIterator<Item = BoxedCondition>,
        compute: F,
    ) -> Result<NodeId, ConfigurationError>
    where
        F: FnMut(&mut ExecutionContext<'_>) -> Result<(), OperatorError> + Send + 'static,
    {
        self.add_operator(name, FnOperator::new(ports, compute), conditions)
    }

    /// Binds producer output ports to consumer input ports.
    ///
    /// Each `(output, input)` pair creates one edge. Edges are registered in
    /// iteration order. An output port may feed several inputs (fan-out) and
    /// an input port may be fed by several outputs (fan-in). Either every
    /// pair is registered or, on error, none is.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::GraphFrozen`] after [`Graph::freeze`]
    /// - [`ConfigurationError::UnknownNode`] for a foreign node handle
    /// - [`ConfigurationError::UnknownPort`] for a missing port name
    /// - [`ConfigurationError::TypeMismatch`] if payload types differ
    /// - [`ConfigurationError::DuplicateEdge`] if a pair is already bound
    pub fn add_flow<'a>(
        &mut self,
        producer: NodeId,
        consumer: NodeId,
        ports: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<&mut Self, ConfigurationError> {
        if self.frozen {
            return Err(ConfigurationError::GraphFrozen);
        }
        let from = self
            .node(producer)
            .ok_or(ConfigurationError::UnknownNode(producer))?;
        let to = self
            .node(consumer)
            .ok_or(ConfigurationError::UnknownNode(consumer))?;

        let mut pending: Vec<Edge> = Vec::new();
        for (output_name, input_name) in ports {
            let (output, output_port) =
                from.output(output_name)
                    .ok_or_else(|| ConfigurationError::UnknownPort {
                        node: from.name().to_owned(),
                        port: output_name.to_owned(),
                        direction: PortDirection::Output,
                    })?;
            let (input, input_port) =
                to.input(input_name)
                    .ok_or_else(|| ConfigurationError::UnknownPort {
                        node: to.name().to_owned(),
                        port: input_name.to_owned(),
                        direction: PortDirection::Input,
                    })?;

            if output_port.spec().type_id() != input_port.spec().type_id() {
                return Err(ConfigurationError::TypeMismatch {
                    producer: from.name().to_owned(),
                    output: output_name.to_owned(),
                    consumer: to.name().to_owned(),
                    input: input_name.to_owned(),
                    output_type: output_port.spec().type_name(),
                    input_type: input_port.spec().type_name(),
                });
            }

            let edge = Edge::new(
                EdgeId::new(self.edges.len() + pending.len()),
                producer,
                output,
                consumer,
                input,
            );
            if self
                .edges
                .iter()
                .chain(&pending)
                .any(|existing| existing.connects_same_ports(&edge))
            {
                return Err(ConfigurationError::DuplicateEdge {
                    producer: from.name().to_owned(),
                    output: output_name.to_owned(),
                    consumer: to.name().to_owned(),
                    input: input_name.to_owned(),
                });
            }
            pending.push(edge);
        }

        for edge in pending {
            tracing::debug!(
                edge = %edge.id,
                producer = %edge.producer,
                consumer = %edge.consumer,
                "flow added"
            );
            let from = &mut self.nodes[edge.producer.index()];
            from.output_mut(edge.output).add_edge(edge.id);
            from.link_downstream(edge.consumer);
            let to = &mut self.nodes[edge.consumer.index()];
            to.input_mut(edge.input).add_producer(edge.producer);
            to.link_upstream(edge.producer);
            self.edges.push(edge);
        }
        Ok(self)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Validates the whole graph and reports every problem found.
    ///
    /// Checks that every input port has at least one incoming edge and that
    /// the edges form no directed cycle.
    ///
    /// # Errors
    ///
    /// Returns all detected [`ConfigurationError`]s.
    pub fn validate(&self) -> Result<(), Vec<ConfigurationError>> {
        let mut errors = Vec::new();

        for node in &self.nodes {
            for port in node.inputs() {
                if port.producers().is_empty() {
                    errors.push(ConfigurationError::UnconnectedInput {
                        node: node.name().to_owned(),
                        port: port.name().to_owned(),
                    });
                }
            }
        }

        if let Err(cycle) = self.sort() {
            errors.push(cycle);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates and seals the graph.
    ///
    /// After a successful freeze no nodes or edges can be added. Freezing an
    /// already frozen graph is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the first error [`Graph::validate`] would report.
    pub fn freeze(&mut self) -> Result<(), ConfigurationError> {
        if self.frozen {
            return Ok(());
        }
        if let Err(errors) = self.validate()
            && let Some(first) = errors.into_iter().next()
        {
            return Err(first);
        }
        self.order = self.sort()?;
        self.frozen = true;
        tracing::debug!(
            nodes = self.nodes.len(),
            edges = self.edges.len(),
            "graph frozen"
        );
        Ok(())
    }

    /// Kahn's algorithm over node-level edges.
    fn sort(&self) -> Result<Vec<NodeId>, ConfigurationError> {
        let mut in_degree = vec![0_usize; self.nodes.len()];
        for edge in &self.edges {
            in_degree[edge.consumer.index()] += 1;
        }

        let mut queue: VecDeque<NodeId> = self
            .nodes
            .iter()
            .map(Node::id)
            .filter(|id| in_degree[id.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            order.push(id);
            for edge in self.edges.iter().filter(|edge| edge.producer == id) {
                let degree = &mut in_degree[edge.consumer.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(edge.consumer);
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let nodes = self
                .nodes
                .iter()
                .filter(|node| in_degree[node.id().index()] > 0)
                .map(|node| node.name().to_owned())
                .collect();
            Err(ConfigurationError::Cycle { nodes })
        }
    }

    /// Clears per-run queue and port state ahead of a new run.
    ///
    /// Leftover messages from a previous run are kept; reservations and
    /// emit sequences are not.
    pub(crate) fn prepare_run(&self) {
        for node in &self.nodes {
            for port in node.inputs() {
                port.queue().clear_reservations();
            }
            for port in node.outputs() {
                port.reset_sequence();
            }
        }
    }
}

fn check_ports(node: &str, ports: &[PortSpec]) -> Result<(), ConfigurationError> {
    for (index, port) in ports.iter().enumerate() {
        let duplicate = ports[..index]
            .iter()
            .any(|earlier| earlier.direction() == port.direction() && earlier.name() == port.name());
        if duplicate {
            return Err(ConfigurationError::DuplicatePort {
                node: node.to_owned(),
                port: port.name().to_owned(),
                direction: port.direction(),
            });
        }
        if port.direction() == PortDirection::Input && port.capacity() == 0 {
            return Err(ConfigurationError::InvalidCapacity {
                node: node.to_owned(),
                port: port.name().to_owned(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::CountCondition;

    fn noop(_ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        Ok(())
    }

    fn source(graph: &mut Graph, name: &str) -> NodeId {
        graph
            .add_node(name, [PortSpec::output::<u32>("out")], [], noop)
            .unwrap()
    }

    fn sink(graph: &mut Graph, name: &str) -> NodeId {
        graph
            .add_node(name, [PortSpec::input::<u32>("in")], [], noop)
            .unwrap()
    }

    fn relay(graph: &mut Graph, name: &str) -> NodeId {
        graph
            .add_node(
                name,
                [PortSpec::input::<u32>("in"), PortSpec::output::<u32>("out")],
                [],
                noop,
            )
            .unwrap()
    }

    #[test]
    fn new_graph_is_empty() {
        let graph = Graph::new();
        assert!(graph.is_empty());
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
        assert!(!graph.is_frozen());
    }

    #[test]
    fn add_node_assigns_sequential_ids() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = sink(&mut graph, "b");
        assert_eq!(a, NodeId::new(0));
        assert_eq!(b, NodeId::new(1));
        assert_eq!(graph.node_id("b"), Some(b));
        assert_eq!(graph.node(a).unwrap().name(), "a");
    }

    #[test]
    fn duplicate_node_name_rejected() {
        let mut graph = Graph::new();
        source(&mut graph, "a");
        let err = graph
            .add_node("a", [PortSpec::output::<u32>("out")], [], noop)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::DuplicateNode { name: "a".into() });
    }

    #[test]
    fn duplicate_port_rejected() {
        let mut graph = Graph::new();
        let err = graph
            .add_node(
                "a",
                [PortSpec::input::<u32>("x"), PortSpec::input::<u8>("x")],
                [],
                noop,
            )
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicatePort { ref port, .. } if port == "x"));

        // The same name in both directions is allowed.
        graph
            .add_node(
                "b",
                [PortSpec::input::<u32>("x"), PortSpec::output::<u32>("x")],
                [],
                noop,
            )
            .unwrap();
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut graph = Graph::new();
        let err = graph
            .add_node("a", [PortSpec::input::<u32>("in").with_capacity(0)], [], noop)
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidCapacity { .. }));
    }

    #[test]
    fn add_flow_links_ports() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = sink(&mut graph, "b");
        graph.add_flow(a, b, [("out", "in")]).unwrap();

        assert_eq!(graph.edge_count(), 1);
        let edge = graph.edge(EdgeId::new(0)).unwrap();
        assert_eq!((edge.producer, edge.consumer), (a, b));
        assert_eq!(graph.node(a).unwrap().downstream(), &[b]);
        assert_eq!(graph.node(b).unwrap().upstream(), &[a]);
        assert_eq!(graph.node(b).unwrap().inputs()[0].producers(), &[a]);
    }

    #[test]
    fn add_flow_rejects_unknown_port() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = sink(&mut graph, "b");
        let err = graph.add_flow(a, b, [("missing", "in")]).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::UnknownPort {
                node: "a".into(),
                port: "missing".into(),
                direction: PortDirection::Output,
            }
        );
    }

    #[test]
    fn add_flow_rejects_unknown_node() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let err = graph.add_flow(a, NodeId::new(9), [("out", "in")]).unwrap_err();
        assert_eq!(err, ConfigurationError::UnknownNode(NodeId::new(9)));
    }

    #[test]
    fn add_flow_rejects_type_mismatch() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = graph
            .add_node("b", [PortSpec::input::<f32>("in")], [], noop)
            .unwrap();
        let err = graph.add_flow(a, b, [("out", "in")]).unwrap_err();
        assert!(matches!(err, ConfigurationError::TypeMismatch { .. }));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn add_flow_is_all_or_nothing() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = sink(&mut graph, "b");
        let err = graph
            .add_flow(a, b, [("out", "in"), ("out", "nope")])
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownPort { .. }));
        assert_eq!(graph.edge_count(), 0);
        assert!(graph.node(b).unwrap().upstream().is_empty());
    }

    #[test]
    fn duplicate_edge_rejected() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = sink(&mut graph, "b");
        graph.add_flow(a, b, [("out", "in")]).unwrap();
        let err = graph.add_flow(a, b, [("out", "in")]).unwrap_err();
        assert!(matches!(err, ConfigurationError::DuplicateEdge { .. }));
    }

    #[test]
    fn validate_reports_all_unconnected_inputs() {
        let mut graph = Graph::new();
        sink(&mut graph, "a");
        sink(&mut graph, "b");
        let errors = graph.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(
            errors
                .iter()
                .all(|e| matches!(e, ConfigurationError::UnconnectedInput { .. }))
        );
    }

    #[test]
    fn freeze_detects_cycle() {
        let mut graph = Graph::new();
        let a = relay(&mut graph, "a");
        let b = relay(&mut graph, "b");
        graph.add_flow(a, b, [("out", "in")]).unwrap();
        graph.add_flow(b, a, [("out", "in")]).unwrap();
        let err = graph.freeze().unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::Cycle {
                nodes: vec!["a".into(), "b".into()]
            }
        );
        assert!(!graph.is_frozen());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut graph = Graph::new();
        let a = relay(&mut graph, "a");
        graph.add_flow(a, a, [("out", "in")]).unwrap();
        assert!(matches!(
            graph.freeze(),
            Err(ConfigurationError::Cycle { .. })
        ));
    }

    #[test]
    fn freeze_computes_topological_order() {
        let mut graph = Graph::new();
        let c = sink(&mut graph, "c");
        let b = relay(&mut graph, "b");
        let a = source(&mut graph, "a");
        graph.add_flow(a, b, [("out", "in")]).unwrap();
        graph.add_flow(b, c, [("out", "in")]).unwrap();
        graph.freeze().unwrap();
        assert_eq!(graph.topological_order(), &[a, b, c]);
    }

    #[test]
    fn reaches_follows_edges_downstream() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        let b = relay(&mut graph, "b");
        let c = sink(&mut graph, "c");
        let d = source(&mut graph, "d");
        let e = sink(&mut graph, "e");
        graph.add_flow(a, b, [("out", "in")]).unwrap();
        graph.add_flow(b, c, [("out", "in")]).unwrap();
        graph.add_flow(d, e, [("out", "in")]).unwrap();

        assert!(graph.reaches(a, c));
        assert!(graph.reaches(b, b));
        assert!(!graph.reaches(c, a));
        assert!(!graph.reaches(a, e));
        assert!(!graph.reaches(d, b));
    }

    #[test]
    fn frozen_graph_rejects_mutation() {
        let mut graph = Graph::new();
        let a = source(&mut graph, "a");
        graph.freeze().unwrap();
        graph.freeze().unwrap();

        let err = graph
            .add_node("b", [PortSpec::input::<u32>("in")], [], noop)
            .unwrap_err();
        assert_eq!(err, ConfigurationError::GraphFrozen);
        let err = graph.add_flow(a, a, [("out", "in")]).unwrap_err();
        assert_eq!(err, ConfigurationError::GraphFrozen);
    }

    #[test]
    fn condition_lookup_by_type() {
        let mut graph = Graph::new();
        let a = graph
            .add_node(
                "a",
                [PortSpec::output::<u32>("out")],
                [CountCondition::new(5).boxed()],
                noop,
            )
            .unwrap();
        let count = graph.condition::<CountCondition>(a).unwrap();
        assert_eq!(count.limit(), 5);
    }
}
