//! Tests for graph composition through the public builder API.

mod test_utils;

use holoflow_graph::prelude::*;
use test_utils::{collector, counter_source, relay};

/// Operator with state, used to check structural metadata and inspection.
#[derive(Default)]
struct Accumulator {
    total: u64,
}

impl Operator for Accumulator {
    fn setup(&self, spec: &mut OperatorSpec) {
        spec.input::<u64>("in").output::<u64>("sum");
    }

    fn compute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        self.total += *ctx.receive_as::<u64>("in")?;
        ctx.emit(self.total, "sum")
    }
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
fn add_operator_registers_ports() {
    let mut graph = Graph::new();
    let id = graph
        .add_operator("acc", Accumulator::default(), [])
        .expect("operator should be added");

    let node = graph.node(id).expect("node should exist");
    assert_eq!(node.name(), "acc");
    assert_eq!(node.inputs().len(), 1);
    assert_eq!(node.outputs().len(), 1);
    assert_eq!(node.inputs()[0].queue().capacity(), 1);
    assert_eq!(node.inputs()[0].queue().policy(), OverflowPolicy::Block);
    assert!(!node.is_source());
    assert_eq!(graph.node_id("acc"), Some(id));
}

#[test]
fn node_ids_follow_insertion_order() {
    let mut graph = Graph::new();
    let a = counter_source(&mut graph, "a", 1);
    let b = relay(&mut graph, "b");
    let (c, _) = collector(&mut graph, "c");
    assert_eq!([a.index(), b.index(), c.index()], [0, 1, 2]);
}

#[test]
fn chained_flows_build_a_pipeline() {
    let mut graph = Graph::new();
    let source = counter_source(&mut graph, "source", 3);
    let middle = relay(&mut graph, "middle");
    let (sink, _) = collector(&mut graph, "sink");

    graph
        .add_flow(source, middle, [("out", "in")])
        .unwrap()
        .add_flow(middle, sink, [("out", "in")])
        .unwrap();
    graph.freeze().unwrap();

    assert_eq!(graph.edge_count(), 2);
    assert_eq!(graph.topological_order(), &[source, middle, sink]);
    assert_eq!(graph.node(middle).unwrap().upstream(), &[source]);
    assert_eq!(graph.node(middle).unwrap().downstream(), &[sink]);
}

#[test]
fn fan_out_and_fan_in_share_ports() {
    let mut graph = Graph::new();
    let left = counter_source(&mut graph, "left", 1);
    let right = counter_source(&mut graph, "right", 1);
    let (a, _) = collector(&mut graph, "a");
    let (b, _) = collector(&mut graph, "b");

    graph.add_flow(left, a, [("out", "in")]).unwrap();
    graph.add_flow(left, b, [("out", "in")]).unwrap();
    graph.add_flow(right, b, [("out", "in")]).unwrap();
    graph.freeze().unwrap();

    let (_, output) = graph.node(left).unwrap().output("out").unwrap();
    assert_eq!(output.edges().len(), 2);
    let (_, input) = graph.node(b).unwrap().input("in").unwrap();
    assert_eq!(input.producers(), &[left, right]);
}

#[test]
fn multiple_pairs_in_one_flow() {
    let mut graph = Graph::new();
    let pair = graph
        .add_node(
            "pair",
            [PortSpec::output::<u64>("x"), PortSpec::output::<String>("label")],
            [CountCondition::new(1).boxed()],
            |ctx| {
                ctx.emit(1_u64, "x")?;
                ctx.emit(String::from("one"), "label")
            },
        )
        .unwrap();
    let join = graph
        .add_node(
            "join",
            [PortSpec::input::<u64>("x"), PortSpec::input::<String>("label")],
            [],
            |ctx| {
                ctx.receive("x")?;
                ctx.receive("label").map(drop)
            },
        )
        .unwrap();

    graph
        .add_flow(pair, join, [("x", "x"), ("label", "label")])
        .unwrap();
    assert_eq!(graph.edge_count(), 2);
    assert!(graph.validate().is_ok());
}

#[test]
fn failed_flow_registers_nothing() {
    let mut graph = Graph::new();
    let source = counter_source(&mut graph, "source", 1);
    let (sink, _) = collector(&mut graph, "sink");

    let err = graph
        .add_flow(source, sink, [("out", "in"), ("out", "missing")])
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::UnknownPort { ref port, .. } if port == "missing"));
    assert_eq!(graph.edge_count(), 0);
    assert!(graph.node(sink).unwrap().inputs()[0].producers().is_empty());
}

#[test]
fn type_mismatch_names_both_types() {
    let mut graph = Graph::new();
    let source = counter_source(&mut graph, "source", 1);
    let sink = graph
        .add_node("text", [PortSpec::input::<String>("in")], [], |ctx| {
            ctx.receive("in").map(drop)
        })
        .unwrap();

    let err = graph.add_flow(source, sink, [("out", "in")]).unwrap_err();
    let message = err.to_string();
    assert!(message.contains("u64"), "{message}");
    assert!(message.contains("String"), "{message}");
}

#[test]
fn validate_reports_every_problem() {
    let mut graph = Graph::new();
    let a = relay(&mut graph, "a");
    let b = relay(&mut graph, "b");
    let (_, _) = collector(&mut graph, "orphan");
    graph.add_flow(a, b, [("out", "in")]).unwrap();
    graph.add_flow(b, a, [("out", "in")]).unwrap();

    let errors = graph.validate().unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(matches!(
        &errors[0],
        ConfigurationError::UnconnectedInput { node, .. } if node == "orphan"
    ));
    assert!(matches!(&errors[1], ConfigurationError::Cycle { nodes } if nodes.len() == 2));

    let first = graph.freeze().unwrap_err();
    assert_eq!(first, errors[0]);
    assert!(!graph.is_frozen());
}

#[test]
fn frozen_graph_rejects_changes() {
    let mut graph = Graph::new();
    let source = counter_source(&mut graph, "source", 1);
    let (sink, _) = collector(&mut graph, "sink");
    graph.add_flow(source, sink, [("out", "in")]).unwrap();
    graph.freeze().unwrap();
    graph.freeze().expect("freezing twice is a no-op");

    assert_eq!(
        graph.add_operator("late", Accumulator::default(), []),
        Err(ConfigurationError::GraphFrozen)
    );
    assert!(matches!(
        graph.add_flow(source, sink, [("out", "in")]),
        Err(ConfigurationError::GraphFrozen)
    ));
}

#[test]
fn zero_capacity_port_rejected() {
    let mut graph = Graph::new();
    let err = graph
        .add_node(
            "tiny",
            [PortSpec::input::<u64>("in").with_capacity(0)],
            [],
            |_ctx| Ok(()),
        )
        .unwrap_err();
    assert_eq!(
        err,
        ConfigurationError::InvalidCapacity {
            node: "tiny".into(),
            port: "in".into(),
        }
    );
}

#[test]
fn operator_state_is_inspectable_after_run() {
    let mut graph = Graph::new();
    let source = counter_source(&mut graph, "source", 5);
    let acc = graph.add_operator("acc", Accumulator::default(), []).unwrap();
    let (sink, sums) = collector(&mut graph, "sink");
    graph
        .add_flow(source, acc, [("out", "in")])
        .unwrap()
        .add_flow(acc, sink, [("sum", "in")])
        .unwrap();
    graph.freeze().unwrap();

    Scheduler::default().run(&graph).unwrap();

    let accumulator = graph.operator::<Accumulator>(acc).expect("operator type matches");
    assert_eq!(accumulator.total, 1 + 2 + 3 + 4);
    assert_eq!(sums.values(), vec![0, 1, 3, 6, 10]);
    assert!(graph.operator::<Accumulator>(source).is_none());
}

#[test]
fn condition_state_is_inspectable_after_run() {
    let mut graph = Graph::new();
    let source = counter_source(&mut graph, "source", 4);
    let (sink, _) = collector(&mut graph, "sink");
    graph.add_flow(source, sink, [("out", "in")]).unwrap();
    graph.freeze().unwrap();

    Scheduler::default().run(&graph).unwrap();

    let count = graph.condition::<CountCondition>(source).unwrap();
    assert_eq!(count.executed(), 4);
    assert_eq!(count.remaining(), 0);
    drop(count);
    assert!(graph.condition::<PeriodicCondition>(source).is_none());
}
