//! Shared test utilities for `holoflow_graph` integration tests.
//!
//! This module provides common operators, graph helpers and hook recorders
//! used across multiple test files. Import via `mod test_utils;` in test files.

#![allow(
    dead_code,
    missing_docs,
    reason = "shared test utilities, not all items used in every test binary"
)]

use core::time::Duration;
use std::sync::Arc;
use std::time::Instant;

use holoflow_graph::prelude::*;
use parking_lot::Mutex;

// ═══════════════════════════════════════════════════════════════════════════════
// SCHEDULER SETUP
// ═══════════════════════════════════════════════════════════════════════════════

/// Scheduler configuration with the given worker count.
pub fn workers(count: usize) -> SchedulerConfig {
    SchedulerConfig::new().with_worker_count(count)
}

/// Freezes a graph, panicking with every validation error on failure.
pub fn frozen(mut graph: Graph) -> Graph {
    if let Err(errors) = graph.validate() {
        panic!("graph should be valid: {errors:?}");
    }
    graph.freeze().expect("graph should freeze");
    graph
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMMON OPERATORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Adds a source emitting `0..count` on port `out`.
pub fn counter_source(graph: &mut Graph, name: &str, count: u64) -> NodeId {
    graph
        .add_node(
            name,
            [PortSpec::output::<u64>("out")],
            [CountCondition::new(count).boxed()],
            |ctx| ctx.emit(ctx.execution(), "out"),
        )
        .expect("source should be added")
}

/// Adds a node forwarding `in` to `out` unchanged.
pub fn relay(graph: &mut Graph, name: &str) -> NodeId {
    graph
        .add_node(
            name,
            [PortSpec::input::<u64>("in"), PortSpec::output::<u64>("out")],
            [],
            |ctx| {
                let message = ctx.receive("in")?;
                ctx.emit_message(message, "out")
            },
        )
        .expect("relay should be added")
}

/// Values received by a [`collector`] node, in arrival order.
#[derive(Clone, Default)]
pub struct Collected {
    values: Arc<Mutex<Vec<u64>>>,
}

impl Collected {
    /// Returns a snapshot of every received value.
    pub fn values(&self) -> Vec<u64> {
        self.values.lock().clone()
    }

    /// Number of received values.
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    /// Appends a value.
    pub fn record(&self, value: u64) {
        self.values.lock().push(value);
    }
}

/// Adds a sink recording every `u64` it receives on port `in`.
pub fn collector(graph: &mut Graph, name: &str) -> (NodeId, Collected) {
    let collected = Collected::default();
    let sink = collected.clone();
    let id = graph
        .add_node(name, [PortSpec::input::<u64>("in")], [], move |ctx| {
            let value = ctx.receive_as::<u64>("in")?;
            sink.record(*value);
            Ok(())
        })
        .expect("collector should be added");
    (id, collected)
}

/// Adds a sink that fails on the given value and records everything else.
pub fn failing_collector(graph: &mut Graph, name: &str, fail_on: u64) -> (NodeId, Collected) {
    let collected = Collected::default();
    let sink = collected.clone();
    let id = graph
        .add_node(name, [PortSpec::input::<u64>("in")], [], move |ctx| {
            let value = *ctx.receive_as::<u64>("in")?;
            if value == fail_on {
                return Err(OperatorError::compute(format!("bad input {value}")));
            }
            sink.record(value);
            Ok(())
        })
        .expect("failing collector should be added");
    (id, collected)
}

/// Spins until `done` returns `true` or the timeout elapses.
pub fn wait_for(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    done()
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOOK RECORDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Every event delivered to a recording hook.
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<EngineEvent>>>,
}

impl EventLog {
    /// Registers a hook on every event kind that records into this log.
    pub fn attach(hooks: &HooksAPI) -> Self {
        let log = Self::default();
        let sink = Arc::clone(&log.events);
        hooks
            .register_all("event_log", move |event: &EngineEvent| {
                sink.lock().push(event.clone());
            })
            .expect("hook registration should succeed");
        log
    }

    /// Kinds of the recorded events, in delivery order.
    pub fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().iter().map(EngineEvent::kind).collect()
    }

    /// Number of recorded events of a kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    /// Number of recorded events of a kind for one node.
    pub fn count_for(&self, kind: EventKind, node: NodeId) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind() == kind && event.node_id() == Some(node))
            .count()
    }

    /// Snapshot of every recorded event.
    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }
}
