//! Scheduling conditions attached to nodes.
//!
//! A node may only become ready while every one of its conditions permits.
//! After each successful execution the scheduler calls
//! [`Condition::on_executed`] on all of them. A condition that reports
//! [`Condition::is_exhausted`] retires its node for the rest of the run.
//!
//! # Built-in conditions
//!
//! | Condition | Permits | Exhausted |
//! |-----------|---------|-----------|
//! | [`CountCondition`] | fewer than `limit` executions | after `limit` executions |
//! | [`AlwaysCondition`] | always | never |
//! | [`BooleanCondition`] | while its flag is enabled | once its flag is disabled |
//! | [`PeriodicCondition`] | once per period | never |

use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use downcast_rs::{Downcast, impl_downcast};

/// A gate on whether a node may execute.
///
/// Conditions are owned by their node and only touched by the scheduler while
/// it holds that node's condition lock, so implementations need not be
/// `Sync`.
pub trait Condition: Downcast + Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if the node may execute now.
    ///
    /// Must not have side effects.
    fn permits(&self) -> bool;

    /// Advances internal state after a successful execution.
    fn on_executed(&mut self);

    /// Returns `true` once the condition will never permit again.
    fn is_exhausted(&self) -> bool {
        false
    }

    /// Instant at which a condition that currently refuses will permit again.
    ///
    /// Time-based conditions return `Some` so the scheduler can re-check
    /// readiness without any queue activity. An instant in the past is
    /// re-checked immediately.
    fn wake_at(&self) -> Option<Instant> {
        None
    }

    /// Boxes the condition.
    fn boxed(self) -> BoxedCondition
    where
        Self: Sized + 'static,
    {
        Box::new(self)
    }
}

impl_downcast!(Condition);

/// A type-erased condition.
pub type BoxedCondition = Box<dyn Condition>;

impl fmt::Debug for dyn Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condition")
            .field("name", &self.name())
            .field("permits", &self.permits())
            .field("exhausted", &self.is_exhausted())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CountCondition
// ─────────────────────────────────────────────────────────────────────────────

/// Permits exactly `limit` executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountCondition {
    limit: u64,
    executed: u64,
}

impl CountCondition {
    /// Creates a condition permitting `limit` executions.
    #[must_use]
    pub fn new(limit: u64) -> Self {
        Self { limit, executed: 0 }
    }

    /// Total number of executions permitted.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Executions observed so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed
    }

    /// Executions still permitted.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.executed)
    }
}

impl Condition for CountCondition {
    fn name(&self) -> &'static str {
        "count"
    }

    fn permits(&self) -> bool {
        self.executed < self.limit
    }

    fn on_executed(&mut self) {
        self.executed = self.executed.saturating_add(1);
    }

    fn is_exhausted(&self) -> bool {
        self.executed >= self.limit
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AlwaysCondition
// ─────────────────────────────────────────────────────────────────────────────

/// Permits every execution.
///
/// A node without inputs gated only by this condition runs until the run is
/// stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlwaysCondition;

impl Condition for AlwaysCondition {
    fn name(&self) -> &'static str {
        "always"
    }

    fn permits(&self) -> bool {
        true
    }

    fn on_executed(&mut self) {}
}

// ─────────────────────────────────────────────────────────────────────────────
// BooleanCondition
// ─────────────────────────────────────────────────────────────────────────────

/// Shared switch controlling a [`BooleanCondition`].
#[derive(Debug, Clone)]
pub struct ConditionFlag(Arc<AtomicBool>);

impl ConditionFlag {
    /// Creates a flag in the given state.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    /// Enables the flag.
    pub fn enable(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Disables the flag.
    pub fn disable(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Returns the current state.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Permits executions while a shared flag is enabled.
///
/// Disabling the flag retires the node: once the scheduler observes the
/// disabled state the node is exhausted for the rest of the run. The flag may
/// be flipped from any thread, including from the node's own compute.
#[derive(Debug, Clone)]
pub struct BooleanCondition {
    flag: ConditionFlag,
}

impl BooleanCondition {
    /// Creates an enabled condition and returns it with its control flag.
    #[must_use]
    pub fn new() -> (Self, ConditionFlag) {
        let flag = ConditionFlag::new(true);
        (Self::with_flag(flag.clone()), flag)
    }

    /// Creates a condition driven by an existing flag.
    #[must_use]
    pub fn with_flag(flag: ConditionFlag) -> Self {
        Self { flag }
    }

    /// Returns the control flag.
    #[must_use]
    pub fn flag(&self) -> &ConditionFlag {
        &self.flag
    }
}

impl Condition for BooleanCondition {
    fn name(&self) -> &'static str {
        "boolean"
    }

    fn permits(&self) -> bool {
        self.flag.is_enabled()
    }

    fn on_executed(&mut self) {}

    fn is_exhausted(&self) -> bool {
        !self.flag.is_enabled()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PeriodicCondition
// ─────────────────────────────────────────────────────────────────────────────

/// Permits at most one execution per period.
///
/// The first execution is permitted immediately; each later one once
/// `period` has elapsed since the previous execution completed.
#[derive(Debug, Clone, Copy)]
pub struct PeriodicCondition {
    period: Duration,
    next: Option<Instant>,
}

impl PeriodicCondition {
    /// Creates a condition with the given period.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Returns the period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Condition for PeriodicCondition {
    fn name(&self) -> &'static str {
        "periodic"
    }

    fn permits(&self) -> bool {
        self.next.is_none_or(|next| Instant::now() >= next)
    }

    fn on_executed(&mut self) {
        self.next = Some(Instant::now() + self.period);
    }

    fn wake_at(&self) -> Option<Instant> {
        self.next
    }
}
