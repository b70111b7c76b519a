//! Type-erased message handlers
//!
//! A subscriber accepts any handler type, but stores it behind one uniform
//! dispatch signature. `CallbackCell::new::<H>` boxes the handler as
//! `Box<dyn ErasedHandler>`; the vtable picked at that point is the only way
//! the handler is ever invoked, so the stored value can never be called as a
//! different type. Getting the concrete handler back goes through `Any` and
//! yields `None` for any type other than `H`.

use std::any::Any;

use tracing::warn;

use crate::broker::message::{Message, RawMessage};

/// Receives messages delivered to a subscriber.
///
/// Implemented for every `FnMut(&Message<'_>)` closure; implement it on a
/// struct when the handler state should be inspectable afterwards (see
/// `Subscriber::with_handler`).
pub trait MessageHandler {
    fn on_message(&mut self, message: &Message<'_>);
}

impl<F> MessageHandler for F
where
    F: FnMut(&Message<'_>),
{
    fn on_message(&mut self, message: &Message<'_>) {
        self(message)
    }
}

/// Uniform view of a stored handler, one implementation per handler type.
trait ErasedHandler {
    fn invoke(&mut self, message: &Message<'_>);
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<H> ErasedHandler for H
where
    H: MessageHandler + 'static,
{
    fn invoke(&mut self, message: &Message<'_>) {
        self.on_message(message)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Owns one handler and dispatches engine records to it.
pub struct CallbackCell {
    handler: Box<dyn ErasedHandler>,
    dispatched: u64,
}

impl CallbackCell {
    pub fn new<H>(handler: H) -> Self
    where
        H: MessageHandler + 'static,
    {
        Self {
            handler: Box::new(handler),
            dispatched: 0,
        }
    }

    /// Wraps a closure; its argument type is inferred from this bound.
    pub fn from_fn<F>(on_message: F) -> Self
    where
        F: FnMut(&Message<'_>) + 'static,
    {
        Self::new(on_message)
    }

    /// Invokes the handler once with a view of `raw`.
    ///
    /// Records with a QoS outside 0..=2 cannot form a valid view and are
    /// dropped without invoking the handler.
    pub fn dispatch(&mut self, raw: &RawMessage<'_>) {
        let Some(message) = Message::from_raw(raw) else {
            warn!(topic = raw.topic, qos = raw.qos, "dropping message with invalid QoS");
            return;
        };
        self.handler.invoke(&message);
        self.dispatched += 1;
    }

    /// Number of times the handler has been invoked.
    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// The stored handler, if it is an `H`.
    pub fn handler<H: 'static>(&self) -> Option<&H> {
        self.handler.as_any().downcast_ref()
    }

    /// The stored handler, mutably, if it is an `H`.
    pub fn handler_mut<H: 'static>(&mut self) -> Option<&mut H> {
        self.handler.as_any_mut().downcast_mut()
    }
}
