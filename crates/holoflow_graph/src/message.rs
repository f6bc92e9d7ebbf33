//! Type-erased messages carried between operator ports.
//!
//! A [`Message`] wraps a payload behind an `Arc`, so fan-out to several
//! consumers shares the same allocation. Payloads are immutable once
//! emitted; a consumer that needs to mutate takes ownership with
//! [`Message::downcast`] and clones when the payload is still shared.

use core::any::{Any, TypeId};
use core::fmt;
use std::sync::Arc;

/// Marker trait for values that can travel through ports.
///
/// Implemented for every `Send + Sync + 'static` type.
pub trait Payload: Any + Send + Sync {}

impl<T: Any + Send + Sync> Payload for T {}

/// A single datum in flight between two ports.
#[derive(Clone)]
pub struct Message {
    payload: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    sequence: u64,
}

impl Message {
    /// Wraps a value into a message.
    #[must_use]
    pub fn new<T: Payload>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wraps an already shared value into a message.
    #[must_use]
    pub fn from_arc<T: Payload>(value: Arc<T>) -> Self {
        Self {
            payload: value,
            type_id: TypeId::of::<T>(),
            type_name: core::any::type_name::<T>(),
            sequence: 0,
        }
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Position of this message in the emitting port's output stream.
    ///
    /// Sequences start at zero and increase by one for every emit on the
    /// same output port within a run.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the [`TypeId`] of the payload.
    #[must_use]
    pub fn payload_type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name of the payload.
    #[must_use]
    pub fn payload_type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the payload is a `T`.
    #[must_use]
    pub fn is<T: Payload>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the payload as a `T`.
    #[must_use]
    pub fn downcast_ref<T: Payload>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    /// Converts the message into a shared handle to its payload.
    ///
    /// # Errors
    ///
    /// Returns the message unchanged if the payload is not a `T`.
    pub fn downcast<T: Payload>(self) -> Result<Arc<T>, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        let Self {
            payload,
            type_id,
            type_name,
            sequence,
        } = self;
        payload.downcast::<T>().map_err(|payload| Self {
            payload,
            type_id,
            type_name,
            sequence,
        })
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("type", &self.type_name)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}
