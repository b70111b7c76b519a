//! Subscriptions and the polling loop
//!
//! A `Subscriber` owns its connection and its `CallbackCell`. The engine's
//! per-connection callback slot gets a closure holding only a `Weak`
//! reference to the cell: the engine can reach the handler while the
//! subscriber is alive, and never keeps it alive on its own.
//!
//! Nothing happens in the background. Messages are only delivered while the
//! caller is inside `handle_events`, which is meant to be called in a loop:
//!
//! ```ignore
//! while !stop.load(Ordering::Relaxed) {
//!     subscriber.handle_events(Duration::from_millis(100))?;
//! }
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::broker::engine::{Engine, MessageCallback};
use crate::broker::message::{Message, QoS, RawMessage};
use crate::client::callback::{CallbackCell, MessageHandler};
use crate::client::connection::{ConnectionHandle, timeout_millis};
use crate::client::session::Session;
use crate::utils::error::{Failure, check_status};

/// Receives messages matching one topic filter.
pub struct Subscriber<E: Engine> {
    connection: ConnectionHandle<E>,
    cell: Rc<RefCell<CallbackCell>>,
    filter: String,
    // Set by the first failed `handle_events`; the subscriber is unusable after.
    failure: Option<Failure>,
}

impl<E: Engine> Subscriber<E> {
    /// Connects, subscribes to `filter` with QoS 0 and installs the closure
    /// `on_message`.
    pub fn new<F>(session: &Session<E>, filter: &str, on_message: F) -> Result<Self, Failure>
    where
        F: FnMut(&Message<'_>) + 'static,
    {
        Self::with_message_handler(session, filter, on_message)
    }

    /// Like [`Subscriber::new`], for handler types implementing
    /// [`MessageHandler`] directly.
    pub fn with_message_handler<H>(
        session: &Session<E>,
        filter: &str,
        handler: H,
    ) -> Result<Self, Failure>
    where
        H: MessageHandler + 'static,
    {
        let mut connection = ConnectionHandle::open(session)?;
        let (engine, raw) = connection.parts();
        check_status(engine.subscribe(raw, filter, QoS::AtMostOnce))?;

        let cell = Rc::new(RefCell::new(CallbackCell::new(handler)));
        engine.set_message_callback(raw, route_to(Rc::downgrade(&cell)));
        debug!(filter, "subscribed");

        Ok(Self {
            connection,
            cell,
            filter: filter.to_string(),
            failure: None,
        })
    }

    /// Runs one round of engine event processing.
    ///
    /// Waits at most `timeout` for activity; what a zero timeout means is up
    /// to the engine. Every message delivered during the call has been
    /// handed to the handler by the time it returns.
    ///
    /// Once this fails the subscriber stays broken and keeps returning the
    /// same failure; drop it and build a new one.
    pub fn handle_events(&mut self, timeout: Duration) -> Result<(), Failure> {
        if let Some(failure) = self.failure {
            return Err(failure);
        }

        let (engine, raw) = self.connection.parts();
        if let Err(failure) = check_status(engine.process_events(raw, timeout_millis(timeout))) {
            warn!(filter = %self.filter, %failure, "event loop failed");
            self.failure = Some(failure);
            return Err(failure);
        }
        Ok(())
    }

    /// `handle_events` without waiting.
    pub fn poll(&mut self) -> Result<(), Failure> {
        self.handle_events(Duration::ZERO)
    }

    pub fn topic_filter(&self) -> &str {
        &self.filter
    }

    /// `false` once `handle_events` has failed.
    pub fn is_active(&self) -> bool {
        self.failure.is_none()
    }

    /// Number of messages handed to the handler so far.
    pub fn dispatched(&self) -> u64 {
        self.cell.borrow().dispatched()
    }

    /// Runs `f` on the handler if it is an `H`.
    pub fn with_handler<H, R>(&self, f: impl FnOnce(&H) -> R) -> Option<R>
    where
        H: 'static,
    {
        self.cell.borrow().handler::<H>().map(f)
    }

    /// Runs `f` on the handler, mutably, if it is an `H`.
    pub fn with_handler_mut<H, R>(&mut self, f: impl FnOnce(&mut H) -> R) -> Option<R>
    where
        H: 'static,
    {
        self.cell.borrow_mut().handler_mut::<H>().map(f)
    }
}

/// The engine-side callback: forwards records to the cell while it exists.
fn route_to(cell: Weak<RefCell<CallbackCell>>) -> MessageCallback {
    Box::new(move |raw: &RawMessage<'_>| {
        if let Some(cell) = cell.upgrade() {
            cell.borrow_mut().dispatch(raw);
        }
    })
}
