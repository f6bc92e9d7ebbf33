//! Shared run state and readiness evaluation.
//!
//! All scheduling decisions happen under one lock around [`SchedState`].
//! Readiness is re-evaluated incrementally: a push re-checks the consumer, a
//! pop or released reservation re-checks the producers of that queue, a
//! finished execution re-checks the node itself, and a node that can never
//! run again re-checks its neighbours.
//!
//! Lock order is `SchedState` → node conditions → queue. Nothing that holds a
//! queue lock ever acquires the state lock.
//!
//! An emit waiting on a full queue may run another ready node on its own
//! thread when no worker is free. Once every running execution waits in an
//! emit and nothing is ready or scheduled, those emits fail as stalled.

use core::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::context::{BlockedEmit, EngineSignals};
use crate::error::OperatorError;
use crate::graph::Graph;
use crate::hooks::{EngineEvent, HooksAPI};
use crate::node::{Node, NodeId, RunState};
use crate::port::{MessageQueue, OverflowPolicy, QueueKey};

use super::config::FailurePolicy;
use super::report::{NodeFailure, NodeOutcome, NodeReport, RunResult};
use super::worker;

/// Why an idle node can never become ready again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retirement {
    Drained,
    Starved,
}

/// State shared between the scheduler, its workers and stop handles.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<SchedState>,
    pub(crate) work: Condvar,
    pub(crate) stop: AtomicBool,
    pub(crate) active: AtomicBool,
}

impl Shared {
    /// Raises the stop flag and wakes every waiting worker.
    pub(crate) fn request_stop(&self, requested_by: Option<NodeId>) {
        if !self.stop.swap(true, Ordering::AcqRel) {
            tracing::info!(requested_by = ?requested_by, "stop requested");
            self.state
                .lock()
                .events
                .push(EngineEvent::StopRequested { requested_by });
        }
        self.work.notify_all();
    }
}

/// Mutable bookkeeping for one run.
#[derive(Debug, Default)]
pub(crate) struct SchedState {
    states: Vec<RunState>,
    retired: Vec<Option<Retirement>>,
    executions: Vec<u64>,
    /// One entry per reserved slot.
    reservations: Vec<Vec<QueueKey>>,
    ready: VecDeque<NodeId>,
    timers: BinaryHeap<Reverse<(Instant, NodeId)>>,
    /// The live timer of each node; heap entries that differ are stale.
    wakes: Vec<Option<Instant>>,
    running: usize,
    /// Nodes currently waiting inside an emit, one entry per waiting emit.
    blocked: Vec<NodeId>,
    failures: Vec<NodeFailure>,
    events: Vec<EngineEvent>,
    done: bool,
}

impl SchedState {
    pub(crate) fn new(node_count: usize) -> Self {
        Self {
            states: vec![RunState::Idle; node_count],
            retired: vec![None; node_count],
            executions: vec![0; node_count],
            reservations: vec![Vec::new(); node_count],
            wakes: vec![None; node_count],
            ..Self::default()
        }
    }
}

/// A claimed execution.
#[derive(Debug)]
pub(crate) struct Task {
    pub(crate) node: NodeId,
    pub(crate) execution: u64,
    pub(crate) reserved: Vec<QueueKey>,
}

/// One run of one graph.
pub(crate) struct Engine<'g> {
    graph: &'g Graph,
    hooks: &'g HooksAPI,
    policy: FailurePolicy,
    shared: &'g Shared,
    workers: usize,
    /// Nodes that can never execute again. Readable without the state lock.
    closed: Vec<AtomicBool>,
}

impl<'g> Engine<'g> {
    pub(crate) fn new(
        graph: &'g Graph,
        hooks: &'g HooksAPI,
        policy: FailurePolicy,
        shared: &'g Shared,
        workers: usize,
    ) -> Self {
        Self {
            graph,
            hooks,
            policy,
            shared,
            workers,
            closed: (0..graph.node_count()).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub(crate) fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub(crate) fn hooks(&self) -> &'g HooksAPI {
        self.hooks
    }

    fn lock(&self) -> MutexGuard<'g, SchedState> {
        self.shared.state.lock()
    }

    /// Releases the state lock, then delivers buffered events to hooks.
    fn flush(&self, mut state: MutexGuard<'_, SchedState>) {
        let events = core::mem::take(&mut state.events);
        drop(state);
        for event in &events {
            self.hooks.invoke(event);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Run lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Calls [`Operator::start`](crate::node::Operator::start) on every node in
    /// topological order. Returns which nodes started.
    pub(crate) fn start_operators(&self) -> Vec<bool> {
        let mut started = vec![false; self.graph.node_count()];
        for &id in self.graph.topological_order() {
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let result = {
                let mut operator = node.operator.lock();
                panic::catch_unwind(AssertUnwindSafe(|| operator.start()))
                    .unwrap_or_else(|payload| Err(OperatorError::Panicked(panic_message(&*payload))))
            };
            match result {
                Ok(()) => started[id.index()] = true,
                Err(error) => {
                    let mut state = self.lock();
                    self.fail(&mut state, node, error);
                    self.flush(state);
                    if self.policy == FailurePolicy::Abort {
                        tracing::error!(node = %node.name(), "aborting run");
                        self.shared.request_stop(None);
                    }
                }
            }
        }
        started
    }

    /// Calls [`Operator::stop`](crate::node::Operator::stop) on every started node.
    pub(crate) fn stop_operators(&self, started: &[bool]) {
        for &id in self.graph.topological_order() {
            if !started.get(id.index()).copied().unwrap_or(false) {
                continue;
            }
            let Some(node) = self.graph.node(id) else {
                continue;
            };
            let mut operator = node.operator.lock();
            if panic::catch_unwind(AssertUnwindSafe(|| operator.stop())).is_err() {
                tracing::warn!(node = %node.name(), "operator stop panicked");
            }
        }
    }

    /// Evaluates every node once, in topological order.
    pub(crate) fn seed(&self) {
        let mut state = self.lock();
        for &id in self.graph.topological_order() {
            self.evaluate(&mut state, id);
        }
        self.shared.work.notify_all();
        self.flush(state);
    }

    /// Builds the run summary. Call after every worker has exited.
    pub(crate) fn finish(&self, duration: core::time::Duration) -> RunResult {
        let mut state = self.lock();
        let stopped = self.shared.stop.load(Ordering::Acquire);
        let nodes = self
            .graph
            .nodes()
            .iter()
            .map(|node| {
                let index = node.id().index();
                let outcome = match (state.states[index], state.retired[index]) {
                    (RunState::Exhausted, _) => NodeOutcome::Exhausted,
                    (RunState::Failed, _) => NodeOutcome::Failed,
                    (_, Some(Retirement::Drained)) => NodeOutcome::Drained,
                    (_, None) if stopped => NodeOutcome::Stopped,
                    (_, Some(Retirement::Starved)) => NodeOutcome::Starved,
                    (run_state, None) => {
                        tracing::warn!(
                            node = %node.name(),
                            state = ?run_state,
                            "node was never retired, reporting it as starved"
                        );
                        NodeOutcome::Starved
                    }
                };
                NodeReport {
                    node: node.id(),
                    name: node.shared_name(),
                    executions: state.executions[index],
                    outcome,
                }
            })
            .collect();
        let failures = core::mem::take(&mut state.failures);
        self.flush(state);
        RunResult {
            nodes,
            failures,
            stopped,
            duration,
        }
    }

    /// Stops the workers after a spawn failure.
    pub(crate) fn abort(&self) {
        self.shared.request_stop(None);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Worker protocol
    // ─────────────────────────────────────────────────────────────────────────

    /// Blocks until a node is ready, the run terminates or a stop is requested.
    pub(crate) fn next_task(&self) -> Option<Task> {
        let mut state = self.lock();
        loop {
            if state.done {
                return None;
            }
            if self.shared.stop.load(Ordering::Acquire) {
                self.flush(state);
                return None;
            }

            self.fire_timers(&mut state);

            if let Some(task) = claim(&mut state) {
                self.flush(state);
                return Some(task);
            }

            if state.running == 0 && state.timers.is_empty() {
                state.done = true;
                tracing::debug!("no runnable nodes remain");
                self.shared.work.notify_all();
                self.flush(state);
                return None;
            }

            if !state.events.is_empty() {
                self.flush(state);
                state = self.lock();
                continue;
            }

            let deadline = state.timers.peek().map(|Reverse((at, _))| *at);
            match deadline {
                Some(at) => {
                    self.shared.work.wait_until(&mut state, at);
                }
                None => self.shared.work.wait(&mut state),
            }
        }
    }

    /// Records the end of an execution.
    pub(crate) fn complete(&self, id: NodeId, result: Result<(), OperatorError>, unused: &[QueueKey]) {
        let Some(node) = self.graph.node(id) else {
            return;
        };
        for &key in unused {
            if let Some(queue) = self.queue(key) {
                queue.release();
            }
        }

        let index = id.index();
        match result {
            Ok(()) => {
                for condition in node.conditions.lock().iter_mut() {
                    condition.on_executed();
                }
                let mut state = self.lock();
                state.running -= 1;
                state.executions[index] += 1;
                state.states[index] = RunState::Idle;
                self.evaluate(&mut state, id);
                self.recheck_producers(&mut state, unused);
                self.shared.work.notify_all();
                self.flush(state);
            }
            Err(error) => {
                let stopping = self.shared.stop.load(Ordering::Acquire);
                let mut state = self.lock();
                state.running -= 1;
                if stopping && matches!(error, OperatorError::Interrupted { .. }) {
                    tracing::debug!(node = %node.name(), "execution interrupted by stop");
                    state.states[index] = RunState::Idle;
                } else {
                    self.fail(&mut state, node, error);
                    if self.policy == FailurePolicy::Abort {
                        tracing::error!(node = %node.name(), "aborting run");
                        drop(state);
                        self.shared.request_stop(None);
                        state = self.lock();
                    }
                }
                self.recheck_producers(&mut state, unused);
                self.shared.work.notify_all();
                self.flush(state);
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readiness
    // ─────────────────────────────────────────────────────────────────────────

    /// Re-checks an idle node and marks it ready, exhausted or retired.
    fn evaluate(&self, state: &mut SchedState, id: NodeId) {
        let index = id.index();
        if state.done || state.states[index] != RunState::Idle || state.retired[index].is_some() {
            return;
        }
        let Some(node) = self.graph.node(id) else {
            return;
        };

        {
            let conditions = node.conditions.lock();
            if conditions.iter().any(|condition| condition.is_exhausted()) {
                drop(conditions);
                self.exhaust(state, node);
                return;
            }
            let refusing: Vec<Option<Instant>> = conditions
                .iter()
                .filter(|condition| !condition.permits())
                .map(|condition| condition.wake_at())
                .collect();
            if !refusing.is_empty() {
                if let Some(at) = refusing.into_iter().flatten().min() {
                    schedule_wake(state, id, at);
                }
                return;
            }
        }

        if node.inputs().iter().any(|port| port.queue().is_empty()) {
            if let Some(retirement) = self.retirement(state, node) {
                self.retire(state, node, retirement);
            }
            return;
        }

        let Some(reserved) = self.reserve_outputs(state, node) else {
            return;
        };
        state.reservations[index] = reserved;
        state.states[index] = RunState::Ready;
        state.ready.push_back(id);
        tracing::trace!(node = %node.name(), "ready");
        self.shared.work.notify_one();
    }

    /// Decides whether an empty input can never be refilled.
    fn retirement(&self, state: &SchedState, node: &Node) -> Option<Retirement> {
        let mut retirement = None;
        for port in node.inputs() {
            if !port.queue().is_empty() {
                continue;
            }
            let producers = port.producers();
            if !producers.iter().all(|&producer| is_closed(state, producer)) {
                continue;
            }
            let starved = producers.iter().any(|&producer| {
                state.states[producer.index()] == RunState::Failed
                    || state.retired[producer.index()] == Some(Retirement::Starved)
            });
            if starved {
                return Some(Retirement::Starved);
            }
            retirement = Some(Retirement::Drained);
        }
        retirement
    }

    /// Reserves room on every blocking queue the node feeds: one slot per
    /// edge into the queue, capped at the queue's capacity.
    ///
    /// Queues of closed consumers are skipped. Returns `None`, holding
    /// nothing, if any queue is out of room.
    fn reserve_outputs(&self, state: &SchedState, node: &Node) -> Option<Vec<QueueKey>> {
        let mut wanted: Vec<(QueueKey, usize)> = Vec::new();
        for output in node.outputs() {
            for &edge_id in output.edges() {
                let Some(edge) = self.graph.edge(edge_id) else {
                    continue;
                };
                if is_closed(state, edge.consumer) {
                    continue;
                }
                let key = edge.queue_key();
                match wanted.iter_mut().find(|(wanted_key, _)| *wanted_key == key) {
                    Some((_, edges)) => *edges += 1,
                    None => wanted.push((key, 1)),
                }
            }
        }

        let mut reserved = Vec::new();
        for (key, edges) in wanted {
            let Some(queue) = self.queue(key) else {
                continue;
            };
            if queue.policy() != OverflowPolicy::Block {
                continue;
            }
            for _ in 0..edges.min(queue.capacity()) {
                if queue.try_reserve() {
                    reserved.push(key);
                } else {
                    for &held in &reserved {
                        if let Some(queue) = self.queue(held) {
                            queue.release();
                        }
                    }
                    return None;
                }
            }
        }
        Some(reserved)
    }

    fn recheck_producers(&self, state: &mut SchedState, queues: &[QueueKey]) {
        for &key in queues {
            let Some(consumer) = self.graph.node(key.node) else {
                continue;
            };
            let Some(input) = consumer.inputs().get(key.input) else {
                continue;
            };
            for &producer in input.producers() {
                self.evaluate(state, producer);
            }
        }
    }

    fn fire_timers(&self, state: &mut SchedState) {
        let now = Instant::now();
        let mut due = Vec::new();
        while let Some(&Reverse((at, id))) = state.timers.peek() {
            if at > now {
                break;
            }
            state.timers.pop();
            if state.wakes[id.index()] == Some(at) {
                state.wakes[id.index()] = None;
                due.push(id);
            }
        }
        for id in due {
            self.evaluate(state, id);
        }
    }

    /// Claims the first ready node that feeds no node blocked in an emit.
    fn claim_independent(&self, state: &mut SchedState) -> Option<Task> {
        let position = state.ready.iter().position(|&candidate| {
            !state
                .blocked
                .iter()
                .any(|&blocked| self.graph.reaches(candidate, blocked))
        })?;
        let id = state.ready.remove(position)?;
        state.ready.push_front(id);
        claim(state)
    }

    fn queue(&self, key: QueueKey) -> Option<&'g MessageQueue> {
        let consumer = self.graph.node(key.node)?;
        Some(consumer.inputs().get(key.input)?.queue())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Terminal transitions
    // ─────────────────────────────────────────────────────────────────────────

    fn exhaust(&self, state: &mut SchedState, node: &Node) {
        let index = node.id().index();
        state.states[index] = RunState::Exhausted;
        self.closed[index].store(true, Ordering::Release);
        tracing::debug!(node = %node.name(), executions = state.executions[index], "exhausted");
        state.events.push(EngineEvent::NodeExhausted {
            node_id: node.id(),
            node_name: node.shared_name(),
            executions: state.executions[index],
        });
        self.propagate(state, node);
    }

    fn retire(&self, state: &mut SchedState, node: &Node, retirement: Retirement) {
        let index = node.id().index();
        state.retired[index] = Some(retirement);
        self.closed[index].store(true, Ordering::Release);
        let event = match retirement {
            Retirement::Drained => {
                tracing::debug!(node = %node.name(), "inputs drained");
                EngineEvent::NodeDrained {
                    node_id: node.id(),
                    node_name: node.shared_name(),
                }
            }
            Retirement::Starved => {
                tracing::warn!(node = %node.name(), "starved by upstream failure");
                EngineEvent::NodeStarved {
                    node_id: node.id(),
                    node_name: node.shared_name(),
                }
            }
        };
        state.events.push(event);
        self.propagate(state, node);
    }

    fn fail(&self, state: &mut SchedState, node: &Node, error: OperatorError) {
        let index = node.id().index();
        state.states[index] = RunState::Failed;
        self.closed[index].store(true, Ordering::Release);
        tracing::warn!(node = %node.name(), %error, "node failed");
        state.failures.push(NodeFailure {
            node: node.id(),
            name: node.shared_name(),
            error: error.clone(),
        });
        state.events.push(EngineEvent::NodeError {
            node_id: node.id(),
            node_name: node.shared_name(),
            error,
        });
        self.propagate(state, node);
    }

    /// A closed node may retire its consumers and unblock its producers.
    fn propagate(&self, state: &mut SchedState, node: &Node) {
        for &consumer in node.downstream() {
            self.evaluate(state, consumer);
        }
        for &producer in node.upstream() {
            self.evaluate(state, producer);
        }
    }
}

/// Takes the front of the ready set and marks it running.
fn claim(state: &mut SchedState) -> Option<Task> {
    let id = state.ready.pop_front()?;
    let index = id.index();
    state.states[index] = RunState::Running;
    state.running += 1;
    Some(Task {
        node: id,
        execution: state.executions[index],
        reserved: core::mem::take(&mut state.reservations[index]),
    })
}

/// Keeps at most one live timer per node, the earliest requested.
fn schedule_wake(state: &mut SchedState, id: NodeId, at: Instant) {
    let pending = &mut state.wakes[id.index()];
    if pending.is_some_and(|pending| pending <= at) {
        return;
    }
    *pending = Some(at);
    state.timers.push(Reverse((at, id)));
}

fn is_closed(state: &SchedState, id: NodeId) -> bool {
    state.states[id.index()].is_terminal() || state.retired[id.index()].is_some()
}

pub(crate) fn panic_message(payload: &(dyn core::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

impl EngineSignals for Engine<'_> {
    fn enqueued(&self, consumer: NodeId) {
        let mut state = self.lock();
        self.evaluate(&mut state, consumer);
        self.flush(state);
    }

    fn dequeued(&self, consumer: NodeId, input: usize) {
        let Some(node) = self.graph.node(consumer) else {
            return;
        };
        let mut state = self.lock();
        for &producer in node.inputs()[input].producers() {
            self.evaluate(&mut state, producer);
        }
        self.flush(state);
    }

    fn accepts(&self, consumer: NodeId) -> bool {
        !self
            .closed
            .get(consumer.index())
            .is_some_and(|closed| closed.load(Ordering::Acquire))
    }

    fn stopping(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    fn request_stop(&self, requested_by: NodeId) {
        self.shared.request_stop(Some(requested_by));
    }

    fn enter_blocked(&self, node: NodeId) {
        self.lock().blocked.push(node);
    }

    fn leave_blocked(&self, node: NodeId) {
        let mut state = self.lock();
        if let Some(position) = state.blocked.iter().position(|&blocked| blocked == node) {
            state.blocked.swap_remove(position);
        }
    }

    /// Runs a ready node inline when no worker is free to take it, and
    /// reports a stall once every execution is waiting in an emit with
    /// nothing ready or scheduled.
    ///
    /// Only nodes that cannot reach a blocked node are run inline: anything
    /// upstream could end up waiting on the emit suspended beneath it.
    fn blocked_emit(&self, worker: usize) -> BlockedEmit {
        let mut state = self.lock();
        if state.done || self.shared.stop.load(Ordering::Acquire) {
            self.flush(state);
            return BlockedEmit::Wait;
        }
        self.fire_timers(&mut state);

        let worker_free = state.running < self.workers;
        if !worker_free && let Some(task) = self.claim_independent(&mut state) {
            self.flush(state);
            tracing::trace!(node = %task.node, worker, "running ready node while an emit is blocked");
            worker::execute(self, task, worker);
            return BlockedEmit::Helped;
        }

        // Ready nodes left behind either go to a free worker or feed a blocked emit.
        let stalled = state.timers.is_empty()
            && state.running == state.blocked.len()
            && (state.ready.is_empty() || !worker_free);
        if stalled {
            tracing::warn!(
                blocked = state.blocked.len(),
                "every running node is blocked on a full queue"
            );
        }
        self.flush(state);
        if stalled {
            BlockedEmit::Stalled
        } else {
            BlockedEmit::Wait
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, CountCondition, PeriodicCondition};
    use crate::context::ExecutionContext;
    use crate::port::PortSpec;

    fn noop(_ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        Ok(())
    }

    fn pipeline(count: u64) -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::new();
        let source = graph
            .add_node(
                "source",
                [PortSpec::output::<u32>("out")],
                [CountCondition::new(count).boxed()],
                noop,
            )
            .unwrap();
        let sink = graph
            .add_node("sink", [PortSpec::input::<u32>("in")], [], noop)
            .unwrap();
        graph.add_flow(source, sink, [("out", "in")]).unwrap();
        graph.freeze().unwrap();
        (graph, source, sink)
    }

    fn engine_parts(graph: &Graph) -> Shared {
        let shared = Shared::default();
        *shared.state.lock() = SchedState::new(graph.node_count());
        shared
    }

    #[test]
    fn seed_marks_source_ready_and_reserves() {
        let (graph, source, sink) = pipeline(2);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 4);

        engine.seed();
        let state = shared.state.lock();
        assert_eq!(state.states[source.index()], RunState::Ready);
        assert_eq!(state.states[sink.index()], RunState::Idle);
        assert_eq!(state.reservations[source.index()].len(), 1);
        assert_eq!(graph.node(sink).unwrap().inputs()[0].queue().reserved(), 1);
    }

    #[test]
    fn exhausted_source_drains_sink() {
        let (graph, source, sink) = pipeline(0);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 4);

        engine.seed();
        assert!(!engine.accepts(sink));
        assert!(engine.next_task().is_none());

        let result = engine.finish(core::time::Duration::ZERO);
        assert_eq!(result.outcome(source), Some(NodeOutcome::Exhausted));
        assert_eq!(result.outcome(sink), Some(NodeOutcome::Drained));
    }

    #[test]
    fn failure_starves_downstream() {
        let (graph, source, sink) = pipeline(5);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 4);

        engine.seed();
        let task = engine.next_task().unwrap();
        assert_eq!(task.node, source);
        engine.complete(task.node, Err(OperatorError::compute("boom")), &task.reserved);

        assert_eq!(graph.node(sink).unwrap().inputs()[0].queue().reserved(), 0);
        assert!(engine.next_task().is_none());
        let result = engine.finish(core::time::Duration::ZERO);
        assert_eq!(result.outcome(source), Some(NodeOutcome::Failed));
        assert_eq!(result.outcome(sink), Some(NodeOutcome::Starved));
        assert_eq!(result.failures.len(), 1);
    }

    #[test]
    fn abort_policy_raises_stop() {
        let (graph, source, _) = pipeline(5);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Abort, &shared, 4);

        engine.seed();
        let task = engine.next_task().unwrap();
        engine.complete(task.node, Err(OperatorError::compute("boom")), &task.reserved);
        assert!(engine.stopping());
        assert!(engine.next_task().is_none());
        let result = engine.finish(core::time::Duration::ZERO);
        assert!(result.stopped);
        assert_eq!(result.outcome(source), Some(NodeOutcome::Failed));
    }

    #[test]
    fn two_edges_into_one_queue_share_its_capacity() {
        let mut graph = Graph::new();
        let source = graph
            .add_node(
                "source",
                [PortSpec::output::<u32>("a"), PortSpec::output::<u32>("b")],
                [CountCondition::new(1).boxed()],
                noop,
            )
            .unwrap();
        let sink = graph
            .add_node("sink", [PortSpec::input::<u32>("in")], [], noop)
            .unwrap();
        graph.add_flow(source, sink, [("a", "in"), ("b", "in")]).unwrap();
        graph.freeze().unwrap();
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 4);

        engine.seed();
        let state = shared.state.lock();
        assert_eq!(state.states[source.index()], RunState::Ready);
        assert_eq!(state.reservations[source.index()], vec![QueueKey { node: sink, input: 0 }]);
        assert_eq!(graph.node(sink).unwrap().inputs()[0].queue().reserved(), 1);
    }

    #[test]
    fn refusing_node_keeps_one_pending_wake() {
        let mut graph = Graph::new();
        let source = graph
            .add_node(
                "source",
                [PortSpec::output::<u32>("out")],
                [PeriodicCondition::new(core::time::Duration::from_secs(60)).boxed()],
                noop,
            )
            .unwrap();
        graph.freeze().unwrap();
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 4);

        engine.seed();
        let task = engine.next_task().unwrap();
        engine.complete(task.node, Ok(()), &task.reserved);
        for _ in 0..10 {
            engine.enqueued(source);
        }

        let state = shared.state.lock();
        assert_eq!(state.states[source.index()], RunState::Idle);
        assert_eq!(state.timers.len(), 1);
        assert!(state.wakes[source.index()].is_some());
    }

    #[test]
    fn stale_timers_are_skipped() {
        let (graph, source, _) = pipeline(1);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 4);

        let mut state = shared.state.lock();
        let now = Instant::now();
        schedule_wake(&mut state, source, now + core::time::Duration::from_secs(60));
        schedule_wake(&mut state, source, now);
        assert_eq!(state.timers.len(), 2);
        assert_eq!(state.wakes[source.index()], Some(now));

        engine.fire_timers(&mut state);
        assert_eq!(state.wakes[source.index()], None);
        assert_eq!(state.timers.len(), 1);
        assert_eq!(state.states[source.index()], RunState::Ready);
    }

    #[test]
    fn blocked_emit_reports_stall_only_when_nothing_can_run() {
        let (graph, source, _) = pipeline(5);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 2);

        engine.seed();
        let task = engine.next_task().unwrap();
        engine.enter_blocked(task.node);
        assert_eq!(engine.blocked_emit(0), BlockedEmit::Stalled);

        // The sink becomes ready, so a free worker can still make room.
        let sink = graph.node(source).unwrap().downstream()[0];
        let queue = graph.node(sink).unwrap().inputs()[0].queue();
        queue.push_reserved(crate::message::Message::new(1_u32));
        engine.enqueued(sink);
        assert_eq!(engine.blocked_emit(0), BlockedEmit::Wait);
        engine.leave_blocked(task.node);
        assert!(shared.state.lock().blocked.is_empty());
    }

    #[test]
    fn blocked_emit_runs_downstream_node_inline() {
        let (graph, source, sink) = pipeline(5);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 1);

        engine.seed();
        let task = engine.next_task().unwrap();
        let queue = graph.node(sink).unwrap().inputs()[0].queue();
        queue.push_reserved(crate::message::Message::new(1_u32));
        engine.enqueued(sink);
        engine.enter_blocked(task.node);

        assert_eq!(engine.blocked_emit(0), BlockedEmit::Helped);
        let state = shared.state.lock();
        assert_eq!(state.executions[sink.index()], 1);
        assert_eq!(state.states[source.index()], RunState::Running);
        assert_eq!(state.running, 1);
    }

    #[test]
    fn blocked_emit_never_runs_its_own_upstream() {
        let (graph, source, sink) = pipeline(5);
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 1);

        engine.seed();
        {
            let mut state = shared.state.lock();
            state.running = 1;
            state.blocked.push(sink);
        }

        assert_eq!(engine.blocked_emit(0), BlockedEmit::Stalled);
        let state = shared.state.lock();
        assert_eq!(state.ready, [source]);
        assert_eq!(state.executions[source.index()], 0);
    }

    /// Refuses forever without ever exhausting.
    struct Shut;

    impl Condition for Shut {
        fn name(&self) -> &'static str {
            "shut"
        }

        fn permits(&self) -> bool {
            false
        }

        fn on_executed(&mut self) {}
    }

    #[test]
    fn never_retired_node_reports_starved() {
        let mut graph = Graph::new();
        let source = graph
            .add_node("source", [PortSpec::output::<u32>("out")], [Shut.boxed()], noop)
            .unwrap();
        graph.freeze().unwrap();
        let shared = engine_parts(&graph);
        let hooks = HooksAPI::new();
        let engine = Engine::new(&graph, &hooks, FailurePolicy::Isolate, &shared, 1);

        engine.seed();
        assert!(engine.next_task().is_none());
        let state = shared.state.lock();
        assert_eq!(state.states[source.index()], RunState::Idle);
        assert_eq!(state.retired[source.index()], None);
        drop(state);

        let result = engine.finish(core::time::Duration::ZERO);
        assert_eq!(result.outcome(source), Some(NodeOutcome::Starved));
        assert!(!result.stopped);
    }

    #[test]
    fn panic_messages() {
        let payload: Box<dyn core::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(&*payload), "static");
        let payload: Box<dyn core::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn core::any::Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(&*payload), "unknown panic payload");
    }
}
