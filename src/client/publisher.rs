use tracing::trace;

use crate::broker::engine::Engine;
use crate::broker::message::{QoS, Retain};
use crate::client::connection::ConnectionHandle;
use crate::client::session::Session;
use crate::utils::error::{Failure, check_status};

/// Sends messages to the session's broker.
///
/// Every publish is a single QoS 0 send: no queue, no retry, and the call
/// returns as soon as the engine has accepted the message.
pub struct Publisher<E: Engine> {
    connection: ConnectionHandle<E>,
    published: u64,
}

impl<E: Engine> Publisher<E> {
    /// Opens and connects a dedicated connection.
    pub fn new(session: &Session<E>) -> Result<Self, Failure> {
        Ok(Self {
            connection: ConnectionHandle::open(session)?,
            published: 0,
        })
    }

    /// Publishes `payload` on `topic`. Empty payloads are allowed.
    pub fn publish(
        &mut self,
        topic: &str,
        payload: impl AsRef<[u8]>,
        retain: Retain,
    ) -> Result<(), Failure> {
        let payload = payload.as_ref();
        let (engine, raw) = self.connection.parts();
        check_status(engine.publish(raw, topic, payload, QoS::AtMostOnce, retain.into()))?;
        self.published += 1;
        trace!(topic, bytes = payload.len(), ?retain, "published");
        Ok(())
    }

    /// Number of messages the engine has accepted from this publisher.
    pub fn published(&self) -> u64 {
        self.published
    }
}
