//! Event-driven, multi-threaded execution of frozen graphs.
//!
//! A [`Scheduler`] runs a frozen [`Graph`] on a fixed pool of worker threads.
//! Nodes become ready when every input port holds a message, every condition
//! permits and every blocking destination queue has room. Each ready node is
//! executed by exactly one worker at a time.
//!
//! A run ends when no node is ready, none is running and no time-based
//! condition is pending, or when a stop is requested through a
//! [`StopHandle`] or [`ExecutionContext::request_stop`](crate::context::ExecutionContext::request_stop).
//!
//! # Failures
//!
//! A failing compute marks its node failed. Under [`FailurePolicy::Isolate`]
//! the rest of the graph keeps running and nodes that depend on the failed
//! one are reported as [`NodeOutcome::Starved`]. Under
//! [`FailurePolicy::Abort`] the first failure stops the run.

mod config;
mod report;
mod state;
mod worker;

use core::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;

pub use config::{DEFAULT_WORKER_COUNT, FailurePolicy, SchedulerConfig};
pub use report::{NodeFailure, NodeOutcome, NodeReport, RunResult};

use crate::error::{ConfigurationError, RunError};
use crate::graph::Graph;
use crate::hooks::{EngineEvent, HooksAPI};
use state::{Engine, SchedState, Shared};

/// Runs frozen graphs on a pool of worker threads.
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
///         [CountCondition::new(10).boxed()],
///         |ctx| ctx.emit(ctx.execution() as u32, "out"),
///     )
///     .unwrap();
/// let sink = graph
///     .add_node("sink", [PortSpec::input::<u32>("in")], [], |ctx| {
///         ctx.receive("in").map(drop)
///     })
///     .unwrap();
/// graph.add_flow(source, sink, [("out", "in")]).unwrap();
/// graph.freeze().unwrap();
///
/// let result = Scheduler::new(SchedulerConfig::default()).run(&graph).unwrap();
/// assert_eq!(result.executions(sink), 10);
/// ```
pub struct Scheduler {
    config: SchedulerConfig,
    hooks: HooksAPI,
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Creates a scheduler.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            hooks: HooksAPI::new(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Replaces the hook registry.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HooksAPI) -> Self {
        self.hooks = hooks;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Returns the hook registry.
    #[must_use]
    pub fn hooks(&self) -> &HooksAPI {
        &self.hooks
    }

    /// Returns a handle that can stop runs of this scheduler from any thread.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Returns `true` while a run is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.active.load(Ordering::Acquire)
    }

    /// Runs a frozen graph to completion.
    ///
    /// Blocks until the run terminates or is stopped. Node failures do not
    /// make this return an error; inspect [`RunResult::failures`] or call
    /// [`RunResult::into_result`].
    ///
    /// # Errors
    ///
    /// - [`RunError::Configuration`] if the graph is not frozen or the
    ///   configuration is invalid
    /// - [`RunError::AlreadyRunning`] if this scheduler is already running
    /// - [`RunError::Spawn`] if a worker thread cannot be created
    /// - [`RunError::WorkerPanicked`] if a worker died outside operator code
    pub fn run(&self, graph: &Graph) -> Result<RunResult, RunError> {
        self.config.validate()?;
        if !graph.is_frozen() {
            return Err(ConfigurationError::NotFrozen.into());
        }
        if self.shared.active.swap(true, Ordering::AcqRel) {
            return Err(RunError::AlreadyRunning);
        }
        let _active = ActiveGuard(&self.shared.active);

        self.shared.stop.store(false, Ordering::Release);
        *self.shared.state.lock() = SchedState::new(graph.node_count());
        graph.prepare_run();

        let workers = self.config.worker_count;
        let engine = Engine::new(graph, &self.hooks, self.config.failure_policy, &self.shared, workers);
        let started = Instant::now();

        tracing::info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            workers,
            policy = ?self.config.failure_policy,
            "run starting"
        );
        self.hooks.invoke(&EngineEvent::RunStart {
            node_count: graph.node_count(),
            worker_count: workers,
        });

        let started_operators = engine.start_operators();
        engine.seed();
        let joined = spawn_workers(&engine, workers);
        engine.stop_operators(&started_operators);
        let result = engine.finish(started.elapsed());
        joined?;

        tracing::info!(
            executions = result.total_executions(),
            failures = result.failures.len(),
            stopped = result.stopped,
            duration = ?result.duration,
            "run complete"
        );
        self.hooks.invoke(&EngineEvent::RunComplete {
            executions: result.total_executions(),
            failures: result.failures.len(),
            stopped: result.stopped,
            duration: result.duration,
        });
        Ok(result)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Runs a frozen graph with a one-off scheduler.
///
/// # Errors
///
/// See [`Scheduler::run`].
pub fn run(graph: &Graph, config: SchedulerConfig) -> Result<RunResult, RunError> {
    Scheduler::new(config).run(graph)
}

fn spawn_workers(engine: &Engine<'_>, workers: usize) -> Result<(), RunError> {
    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        let mut spawn_error = None;
        for index in 0..workers {
            let spawned = thread::Builder::new()
                .name(format!("holoflow-worker-{index}"))
                .spawn_scoped(scope, move || worker::run_worker(engine, index));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(error) => {
                    tracing::error!(worker = index, %error, "failed to spawn worker");
                    engine.abort();
                    spawn_error = Some(error);
                    break;
                }
            }
        }

        let panicked = handles
            .into_iter()
            .map(thread::ScopedJoinHandle::join)
            .filter(Result::is_err)
            .count();
        if let Some(error) = spawn_error {
            return Err(RunError::Spawn(error));
        }
        if panicked > 0 {
            return Err(RunError::WorkerPanicked);
        }
        Ok(())
    })
}

/// Clears the active flag when a run ends, including by unwinding.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Stops runs of a [`Scheduler`] from any thread.
///
/// Stopping lets in-flight executions finish, wakes emits blocked on a full
/// queue, and keeps every other node from starting. A stop raised while no
/// run is active is discarded when the next run starts.
#[derive(Clone)]
pub struct StopHandle {
    shared: Arc<Shared>,
}

impl StopHandle {
    /// Requests a stop.
    pub fn stop(&self) {
        self.shared.request_stop(None);
    }

    /// Returns `true` if a stop has been requested for the current run.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }
}

impl fmt::Debug for StopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StopHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Condition, CountCondition};
    use crate::context::ExecutionContext;
    use crate::error::OperatorError;
    use crate::port::PortSpec;

    fn noop(_ctx: &mut ExecutionContext<'_>) -> Result<(), OperatorError> {
        Ok(())
    }

    #[test]
    fn unfrozen_graph_rejected() {
        let graph = Graph::new();
        let err = Scheduler::default().run(&graph).unwrap_err();
        assert!(matches!(
            err,
            RunError::Configuration(ConfigurationError::NotFrozen)
        ));
    }

    #[test]
    fn zero_workers_rejected() {
        let mut graph = Graph::new();
        graph.freeze().unwrap();
        let err = run(&graph, SchedulerConfig::new().with_worker_count(0)).unwrap_err();
        assert!(matches!(
            err,
            RunError::Configuration(ConfigurationError::InvalidWorkerCount)
        ));
    }

    #[test]
    fn empty_graph_terminates() {
        let mut graph = Graph::new();
        graph.freeze().unwrap();
        let result = Scheduler::default().run(&graph).unwrap();
        assert!(result.is_success());
        assert!(result.nodes.is_empty());
        assert!(!result.stopped);
    }

    #[test]
    fn single_source_runs_count_times() {
        let mut graph = Graph::new();
        let id = graph
            .add_node(
                "tick",
                [PortSpec::output::<u32>("out")],
                [CountCondition::new(4).boxed()],
                noop,
            )
            .unwrap();
        graph.freeze().unwrap();

        let scheduler = Scheduler::new(SchedulerConfig::new().with_worker_count(2));
        let result = scheduler.run(&graph).unwrap();
        assert_eq!(result.executions(id), 4);
        assert_eq!(result.outcome(id), Some(NodeOutcome::Exhausted));
        assert!(!scheduler.is_running());
    }

    #[test]
    fn stale_stop_is_cleared_by_next_run() {
        let mut graph = Graph::new();
        let id = graph
            .add_node(
                "tick",
                [PortSpec::output::<u32>("out")],
                [CountCondition::new(2).boxed()],
                noop,
            )
            .unwrap();
        graph.freeze().unwrap();

        let scheduler = Scheduler::default();
        scheduler.stop_handle().stop();
        let result = scheduler.run(&graph).unwrap();
        assert!(!result.stopped);
        assert_eq!(result.executions(id), 2);
    }
}
