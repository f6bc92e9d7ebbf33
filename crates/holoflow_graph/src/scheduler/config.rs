//! Scheduler configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Default number of worker threads.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// What the scheduler does when a node fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Only the failed node stops. Independent branches keep running and
    /// downstream nodes starve once their queues drain.
    #[default]
    Isolate,
    /// The first failure stops the whole run.
    Abort,
}

/// Configuration for a [`Scheduler`](super::Scheduler).
///
/// # Example
///
/// ```
/// use holoflow_graph::scheduler::{FailurePolicy, SchedulerConfig};
///
/// let config = SchedulerConfig::default()
///     .with_worker_count(2)
///     .with_failure_policy(FailurePolicy::Abort);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Reaction to node failures.
    pub failure_policy: FailurePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    #[must_use]
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Sets the failure policy.
    #[must_use]
    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidWorkerCount`] for zero workers.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.worker_count == 0 {
            return Err(ConfigurationError::InvalidWorkerCount);
        }
        Ok(())
    }
}
