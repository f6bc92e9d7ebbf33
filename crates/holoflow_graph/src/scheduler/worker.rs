//! Worker loop.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::context::ExecutionContext;
use crate::error::OperatorError;
use crate::hooks::EngineEvent;

use super::state::{Engine, Task, panic_message};

/// Runs ready nodes until the run terminates or is stopped.
pub(crate) fn run_worker(engine: &Engine<'_>, worker: usize) {
    tracing::trace!(worker, "worker started");
    while let Some(task) = engine.next_task() {
        execute(engine, task, worker);
    }
    tracing::trace!(worker, "worker exiting");
}

/// Runs one claimed execution on the calling thread.
pub(super) fn execute(engine: &Engine<'_>, task: Task, worker: usize) {
    let graph = engine.graph();
    let Some(node) = graph.node(task.node) else {
        return;
    };
    let span = tracing::debug_span!(
        "compute",
        node = %node.name(),
        execution = task.execution,
        worker
    );
    let _entered = span.enter();

    engine.hooks().invoke(&EngineEvent::NodeStart {
        node_id: task.node,
        node_name: node.shared_name(),
        execution: task.execution,
        worker,
    });

    let started = Instant::now();
    let mut ctx = ExecutionContext::new(graph, node, engine, task.reserved, task.execution, worker);
    let result = {
        let mut operator = node.operator.lock();
        panic::catch_unwind(AssertUnwindSafe(|| operator.compute(&mut ctx)))
            .unwrap_or_else(|payload| Err(OperatorError::Panicked(panic_message(&*payload))))
    };
    let unused = ctx.into_unused_reservations();
    let duration = started.elapsed();

    if result.is_ok() {
        tracing::trace!(?duration, "compute finished");
        engine.hooks().invoke(&EngineEvent::NodeComplete {
            node_id: task.node,
            node_name: node.shared_name(),
            execution: task.execution,
            duration,
        });
    }
    engine.complete(task.node, result, &unused);
}
