//! The per-execution handle passed to [`Operator::compute`](crate::node::Operator::compute).
//!
//! An [`ExecutionContext`] is scoped to one node and one execution. It reads
//! from the node's input queues and writes to the queues of every consumer
//! connected to an output port.

use core::time::Duration;
use std::sync::Arc;

use hashbrown::HashMap;

use crate::edge::Edge;
use crate::error::OperatorError;
use crate::graph::Graph;
use crate::message::{Message, Payload};
use crate::node::{Node, NodeId};
use crate::port::{MessageQueue, OverflowPolicy, PortDirection, PushOutcome, QueueKey};

/// How long a blocked emit waits before consulting the scheduler again.
const BLOCKED_EMIT_POLL: Duration = Duration::from_millis(5);

/// What an emit blocked on a full queue should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockedEmit {
    /// Wait for the consumer to make room.
    Wait,
    /// Another ready node ran on this worker; retry at once.
    Helped,
    /// Nothing in the run can make room any more.
    Stalled,
}

/// How a blocked delivery ended.
enum Unblocked {
    Enqueued,
    Discarded,
    Interrupted,
    Stalled,
}

/// Callbacks from an executing operator into the scheduler.
///
/// Implementations must not hold any queue lock while calling back into the
/// scheduler state.
pub(crate) trait EngineSignals: Sync {
    /// A message was added to one of `consumer`'s input queues.
    fn enqueued(&self, consumer: NodeId);

    /// A message was removed from input port `input` of `consumer`.
    fn dequeued(&self, consumer: NodeId, input: usize);

    /// Returns `false` once `consumer` can never execute again in this run.
    fn accepts(&self, consumer: NodeId) -> bool;

    /// Returns `true` once the run is stopping.
    fn stopping(&self) -> bool;

    /// Asks the run to stop.
    fn request_stop(&self, requested_by: NodeId);

    /// An emit of `node` started waiting for room in a full queue.
    fn enter_blocked(&self, node: NodeId);

    /// An emit of `node` stopped waiting.
    fn leave_blocked(&self, node: NodeId);

    /// Called repeatedly while an emit on `worker` waits for room.
    ///
    /// May run another ready node to completion on the calling thread.
    fn blocked_emit(&self, worker: usize) -> BlockedEmit;
}

/// Port access for a single execution of a single node.
pub struct ExecutionContext<'a> {
    graph: &'a Graph,
    node: &'a Node,
    signals: &'a dyn EngineSignals,
    /// Reserved slots per destination queue.
    reserved: HashMap<QueueKey, usize>,
    execution: u64,
    worker: usize,
}

impl<'a> ExecutionContext<'a> {
    pub(crate) fn new(
        graph: &'a Graph,
        node: &'a Node,
        signals: &'a dyn EngineSignals,
        reserved: impl IntoIterator<Item = QueueKey>,
        execution: u64,
        worker: usize,
    ) -> Self {
        let mut slots = HashMap::new();
        for key in reserved {
            *slots.entry(key).or_insert(0) += 1;
        }
        Self {
            graph,
            node,
            signals,
            reserved: slots,
            execution,
            worker,
        }
    }

    /// ID of the executing node.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node.id()
    }

    /// Name of the executing node.
    #[must_use]
    pub fn node_name(&self) -> &str {
        self.node.name()
    }

    /// Zero-based index of this execution among the node's completed ones.
    #[must_use]
    pub fn execution(&self) -> u64 {
        self.execution
    }

    /// Index of the worker running this execution.
    #[must_use]
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Returns `true` if the input port has a message waiting.
    #[must_use]
    pub fn has_message(&self, port: &str) -> bool {
        self.pending(port) > 0
    }

    /// Number of messages waiting on an input port.
    #[must_use]
    pub fn pending(&self, port: &str) -> usize {
        self.node
            .input(port)
            .map_or(0, |(_, input)| input.queue().len())
    }

    /// Removes the oldest message from an input port.
    ///
    /// # Errors
    ///
    /// - [`OperatorError::UnknownPort`] if the node has no such input
    /// - [`OperatorError::ReadinessViolation`] if the queue is empty
    pub fn receive(&mut self, port: &str) -> Result<Message, OperatorError> {
        let (index, input) = self
            .node
            .input(port)
            .ok_or_else(|| OperatorError::UnknownPort {
                port: port.to_owned(),
                direction: PortDirection::Input,
            })?;
        let message = input
            .queue()
            .pop()
            .ok_or_else(|| OperatorError::ReadinessViolation {
                port: port.to_owned(),
            })?;
        self.signals.dequeued(self.node.id(), index);
        Ok(message)
    }

    /// Removes the oldest message from an input port and downcasts it.
    ///
    /// The port's declared type is checked before anything is removed.
    ///
    /// # Errors
    ///
    /// As [`ExecutionContext::receive`], plus [`OperatorError::PayloadType`]
    /// if `T` is not the port's payload type.
    pub fn receive_as<T: Payload>(&mut self, port: &str) -> Result<Arc<T>, OperatorError> {
        if let Some((_, input)) = self.node.input(port)
            && input.spec().type_id() != core::any::TypeId::of::<T>()
        {
            return Err(OperatorError::PayloadType {
                port: port.to_owned(),
                expected: input.spec().type_name(),
                actual: core::any::type_name::<T>(),
            });
        }
        let message = self.receive(port)?;
        message
            .downcast::<T>()
            .map_err(|message| OperatorError::PayloadType {
                port: port.to_owned(),
                expected: core::any::type_name::<T>(),
                actual: message.payload_type_name(),
            })
    }

    /// Emits a value on an output port.
    ///
    /// # Errors
    ///
    /// See [`ExecutionContext::emit_message`].
    pub fn emit<T: Payload>(&mut self, value: T, port: &str) -> Result<(), OperatorError> {
        self.emit_message(Message::new(value), port)
    }

    /// Emits an already shared value on an output port.
    ///
    /// # Errors
    ///
    /// See [`ExecutionContext::emit_message`].
    pub fn emit_shared<T: Payload>(&mut self, value: Arc<T>, port: &str) -> Result<(), OperatorError> {
        self.emit_message(Message::from_arc(value), port)
    }

    /// Delivers a message to every consumer connected to an output port.
    ///
    /// Consumers receive the same shared payload in edge registration order.
    /// An output port with no edges discards the message. Messages for
    /// consumers that have retired are discarded.
    ///
    /// # Errors
    ///
    /// - [`OperatorError::UnknownPort`] if the node has no such output
    /// - [`OperatorError::PayloadType`] if the payload type differs from the port's
    /// - [`OperatorError::Overflow`] if a `Reject` queue is full
    /// - [`OperatorError::Interrupted`] if a blocked emit is cut short by a stop
    /// - [`OperatorError::Stalled`] if a blocked emit could never complete
    ///
    /// Consumers earlier in the edge order keep the message when a later
    /// delivery fails.
    pub fn emit_message(&mut self, message: Message, port: &str) -> Result<(), OperatorError> {
        let node = self.node;
        let (_, output) = node
            .output(port)
            .ok_or_else(|| OperatorError::UnknownPort {
                port: port.to_owned(),
                direction: PortDirection::Output,
            })?;
        if message.payload_type_id() != output.spec().type_id() {
            return Err(OperatorError::PayloadType {
                port: port.to_owned(),
                expected: output.spec().type_name(),
                actual: message.payload_type_name(),
            });
        }

        let graph = self.graph;
        let message = message.with_sequence(output.next_sequence());
        for &edge_id in output.edges() {
            if let Some(edge) = graph.edge(edge_id) {
                self.deliver(edge, port, message.clone())?;
            }
        }
        Ok(())
    }

    /// Asks the scheduler to stop the run after in-flight executions finish.
    pub fn request_stop(&self) {
        self.signals.request_stop(self.node.id());
    }

    /// Returns `true` once the run is stopping.
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.signals.stopping()
    }

    /// Reserved slots that were never used by an emit, one entry per slot.
    pub(crate) fn into_unused_reservations(self) -> Vec<QueueKey> {
        self.reserved
            .into_iter()
            .flat_map(|(key, slots)| core::iter::repeat_n(key, slots))
            .collect()
    }

    fn take_reservation(&mut self, key: QueueKey) -> bool {
        let Some(slots) = self.reserved.get_mut(&key) else {
            return false;
        };
        *slots -= 1;
        if *slots == 0 {
            self.reserved.remove(&key);
        }
        true
    }

    fn deliver(&mut self, edge: &Edge, port: &str, message: Message) -> Result<(), OperatorError> {
        let graph = self.graph;
        let Some(consumer) = graph.node(edge.consumer) else {
            return Ok(());
        };
        let input = &consumer.inputs()[edge.input];
        let queue = input.queue();

        if self.take_reservation(edge.queue_key()) {
            queue.push_reserved(message);
            self.signals.enqueued(edge.consumer);
            return Ok(());
        }

        let signals = self.signals;
        let target = edge.consumer;
        if !signals.accepts(target) {
            tracing::trace!(edge = %edge.id, consumer = %consumer.name(), "consumer retired, message discarded");
            return Ok(());
        }

        let message = match queue.push(message) {
            Ok(PushOutcome::Enqueued) => {
                signals.enqueued(target);
                return Ok(());
            }
            Ok(PushOutcome::Evicted(evicted)) => {
                tracing::debug!(
                    consumer = %consumer.name(),
                    port = %input.name(),
                    sequence = evicted.sequence(),
                    "queue full, oldest message dropped"
                );
                signals.enqueued(target);
                return Ok(());
            }
            Ok(PushOutcome::Discarded) => {
                tracing::debug!(
                    consumer = %consumer.name(),
                    port = %input.name(),
                    "queue full, new message dropped"
                );
                return Ok(());
            }
            Err(message) => message,
        };

        if queue.policy() != OverflowPolicy::Block {
            return Err(OperatorError::Overflow {
                queue: format!("{}.{}", consumer.name(), input.name()),
                capacity: queue.capacity(),
            });
        }

        signals.enter_blocked(self.node.id());
        let unblocked = self.wait_and_push(queue, target, message);
        signals.leave_blocked(self.node.id());

        match unblocked {
            Unblocked::Enqueued => signals.enqueued(target),
            Unblocked::Discarded => {
                tracing::trace!(edge = %edge.id, consumer = %consumer.name(), "consumer retired while blocked, message discarded");
            }
            Unblocked::Interrupted => {
                return Err(OperatorError::Interrupted {
                    port: port.to_owned(),
                });
            }
            Unblocked::Stalled => {
                return Err(OperatorError::Stalled {
                    queue: format!("{}.{}", consumer.name(), input.name()),
                });
            }
        }
        Ok(())
    }

    /// Retries a push into a full blocking queue until it lands or can never land.
    fn wait_and_push(&self, queue: &MessageQueue, target: NodeId, mut message: Message) -> Unblocked {
        let signals = self.signals;
        loop {
            if signals.stopping() {
                return Unblocked::Interrupted;
            }
            if !signals.accepts(target) {
                return Unblocked::Discarded;
            }
            let stalled = match signals.blocked_emit(self.worker) {
                BlockedEmit::Wait => {
                    queue.wait_for_room(BLOCKED_EMIT_POLL);
                    false
                }
                BlockedEmit::Helped => false,
                BlockedEmit::Stalled => true,
            };
            // A consumer may have popped just before the stall was observed.
            message = match queue.push(message) {
                Ok(_) => return Unblocked::Enqueued,
                Err(_) if stalled => return Unblocked::Stalled,
                Err(message) => message,
            };
        }
    }
}

impl core::fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("node", &self.node.name())
            .field("execution", &self.execution)
            .field("worker", &self.worker)
            .finish_non_exhaustive()
    }
}
