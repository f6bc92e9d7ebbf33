//! Typed ports and the bounded queues behind them.
//!
//! Every input port owns one [`MessageQueue`]. All edges that target the same
//! input port feed that single queue, so fan-in interleaves messages in
//! arrival order while each producer's own order is preserved.
//!
//! # Backpressure
//!
//! Queues with [`OverflowPolicy::Block`] support slot reservations. The
//! scheduler only marks a producer ready after reserving, on each blocking
//! queue it feeds, one slot per edge into that queue (at most the queue's
//! capacity). The first emit per edge in an execution therefore never waits
//! unless a producer has more edges into one queue than the queue has slots.
//! Further emits wait for the consumer to make room.

use core::any::TypeId;
use core::fmt;
use core::time::Duration;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::edge::EdgeId;
use crate::message::{Message, Payload};
use crate::node::NodeId;

/// Default queue capacity of an input port.
pub const DEFAULT_CAPACITY: usize = 1;

/// Direction of a port relative to its node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    /// Receives messages.
    Input,
    /// Emits messages.
    Output,
}

impl fmt::Display for PortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// What happens when a message is pushed into a full queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// The emitting operator waits until the consumer makes room.
    #[default]
    Block,
    /// The emit fails with [`OperatorError::Overflow`](crate::error::OperatorError::Overflow).
    Reject,
    /// The oldest queued message is discarded to make room.
    DropOldest,
    /// The new message is discarded.
    DropNewest,
}

/// Declaration of a single named, typed port.
///
/// Capacity and overflow policy only apply to input ports, which own the
/// queue. They are ignored on output ports.
#[derive(Debug, Clone)]
pub struct PortSpec {
    name: String,
    direction: PortDirection,
    type_id: TypeId,
    type_name: &'static str,
    capacity: usize,
    overflow: OverflowPolicy,
}

impl PortSpec {
    /// Declares an input port carrying `T`.
    #[must_use]
    pub fn input<T: Payload>(name: impl Into<String>) -> Self {
        Self::new::<T>(name, PortDirection::Input)
    }

    /// Declares an output port carrying `T`.
    #[must_use]
    pub fn output<T: Payload>(name: impl Into<String>) -> Self {
        Self::new::<T>(name, PortDirection::Output)
    }

    fn new<T: Payload>(name: impl Into<String>, direction: PortDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the overflow policy.
    #[must_use]
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Returns the port name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the port direction.
    #[must_use]
    pub fn direction(&self) -> PortDirection {
        self.direction
    }

    /// Returns the payload [`TypeId`].
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the payload type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the queue capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the overflow policy.
    #[must_use]
    pub fn overflow(&self) -> OverflowPolicy {
        self.overflow
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue
// ─────────────────────────────────────────────────────────────────────────────

/// Result of a successful push.
#[derive(Debug)]
pub(crate) enum PushOutcome {
    /// The message is in the queue.
    Enqueued,
    /// The message is in the queue; the returned oldest message was evicted.
    Evicted(Message),
    /// The queue was full and the new message was discarded.
    Discarded,
}

/// An input queue, addressed by its node and input port index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct QueueKey {
    pub(crate) node: NodeId,
    pub(crate) input: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Message>,
    reserved: usize,
}

impl QueueState {
    fn occupied(&self) -> usize {
        self.messages.len() + self.reserved
    }
}

/// A bounded FIFO queue owned by an input port.
#[derive(Debug)]
pub struct MessageQueue {
    capacity: usize,
    policy: OverflowPolicy,
    state: Mutex<QueueState>,
    not_full: Condvar,
}

impl MessageQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            capacity,
            policy,
            state: Mutex::new(QueueState::default()),
            not_full: Condvar::new(),
        }
    }

    /// Maximum number of queued messages.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy applied on push.
    #[must_use]
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    /// Returns `true` if no message is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().messages.is_empty()
    }

    /// Number of slots currently reserved by ready producers.
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.state.lock().reserved
    }

    /// Reserves one slot if the queue has room for it.
    pub(crate) fn try_reserve(&self) -> bool {
        let mut state = self.state.lock();
        if state.occupied() < self.capacity {
            state.reserved += 1;
            true
        } else {
            false
        }
    }

    /// Returns an unused reservation.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        drop(state);
        self.not_full.notify_all();
    }

    /// Drops every outstanding reservation.
    pub(crate) fn clear_reservations(&self) {
        self.state.lock().reserved = 0;
        self.not_full.notify_all();
    }

    /// Pushes a message into a slot reserved earlier.
    pub(crate) fn push_reserved(&self, message: Message) {
        let mut state = self.state.lock();
        state.reserved = state.reserved.saturating_sub(1);
        state.messages.push_back(message);
    }

    /// Pushes a message according to the overflow policy.
    ///
    /// Never waits. A full `Block` or `Reject` queue hands the message back.
    pub(crate) fn push(&self, message: Message) -> Result<PushOutcome, Message> {
        let mut state = self.state.lock();
        if state.occupied() < self.capacity {
            state.messages.push_back(message);
            return Ok(PushOutcome::Enqueued);
        }

        match self.policy {
            OverflowPolicy::Block | OverflowPolicy::Reject => Err(message),
            OverflowPolicy::DropOldest => match state.messages.pop_front() {
                Some(evicted) => {
                    state.messages.push_back(message);
                    Ok(PushOutcome::Evicted(evicted))
                }
                // Every slot is reserved; nothing queued can be evicted.
                None => Ok(PushOutcome::Discarded),
            },
            OverflowPolicy::DropNewest => Ok(PushOutcome::Discarded),
        }
    }

    /// Waits up to `timeout` for a free slot.
    ///
    /// Returns early when room appears, so callers retry their push in a loop.
    pub(crate) fn wait_for_room(&self, timeout: Duration) {
        let mut state = self.state.lock();
        if state.occupied() >= self.capacity {
            self.not_full.wait_for(&mut state, timeout);
        }
    }

    /// Removes the oldest message.
    pub(crate) fn pop(&self) -> Option<Message> {
        let message = self.state.lock().messages.pop_front();
        if message.is_some() {
            self.not_full.notify_all();
        }
        message
    }

    /// Removes and returns every queued message.
    pub fn drain(&self) -> Vec<Message> {
        let drained: Vec<_> = self.state.lock().messages.drain(..).collect();
        self.not_full.notify_all();
        drained
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ports bound to a node
// ─────────────────────────────────────────────────────────────────────────────

/// An input port together with its queue and upstream producers.
#[derive(Debug)]
pub struct InputPort {
    spec: PortSpec,
    queue: MessageQueue,
    producers: Vec<NodeId>,
}

impl InputPort {
    pub(crate) fn new(spec: PortSpec) -> Self {
        let queue = MessageQueue::new(spec.capacity(), spec.overflow());
        Self {
            spec,
            queue,
            producers: Vec::new(),
        }
    }

    /// Returns the port declaration.
    #[must_use]
    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    /// Returns the port name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Returns the port queue.
    #[must_use]
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Nodes with at least one edge into this port.
    #[must_use]
    pub fn producers(&self) -> &[NodeId] {
        &self.producers
    }

    pub(crate) fn add_producer(&mut self, producer: NodeId) {
        if !self.producers.contains(&producer) {
            self.producers.push(producer);
        }
    }
}

/// An output port together with its outgoing edges.
#[derive(Debug)]
pub struct OutputPort {
    spec: PortSpec,
    edges: Vec<EdgeId>,
    sequence: AtomicU64,
}

impl OutputPort {
    pub(crate) fn new(spec: PortSpec) -> Self {
        Self {
            spec,
            edges: Vec::new(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Returns the port declaration.
    #[must_use]
    pub fn spec(&self) -> &PortSpec {
        &self.spec
    }

    /// Returns the port name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.spec.name()
    }

    /// Edges leaving this port, in registration order.
    #[must_use]
    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }

    /// Number of messages emitted on this port in the current run.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub(crate) fn add_edge(&mut self, edge: EdgeId) {
        self.edges.push(edge);
    }

    pub(crate) fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn reset_sequence(&self) {
        self.sequence.store(0, Ordering::Relaxed);
    }
}
