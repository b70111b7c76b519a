//! Connection ownership
//!
//! `ConnectionHandle` is the only owner of an engine connection. It is
//! created already connected and releases the connection exactly once when
//! dropped, whichever way the owning scope is left. A connect failure during
//! `open` drops the half-built handle, so nothing leaks on that path either.

use std::time::Duration;

use tracing::{debug, warn};

use crate::broker::engine::Engine;
use crate::client::session::{LibraryGuard, Session};
use crate::config::HostConfig;
use crate::utils::error::{Failure, check_allocation, check_status};

/// Owns one connected engine connection.
pub struct ConnectionHandle<E: Engine> {
    raw: E::Connection,
    // Dropped after `Drop::drop` has released `raw`.
    library: LibraryGuard<E>,
}

impl<E: Engine> ConnectionHandle<E> {
    /// Allocates a connection and connects it to the session's host.
    pub fn open(session: &Session<E>) -> Result<Self, Failure> {
        let library = session.library().clone();
        let raw = check_allocation(library.engine().allocate_connection())?;
        let mut handle = Self { raw, library };

        let config = session.config();
        let (engine, raw) = handle.parts();
        if let Err(failure) = check_status(engine.connect(
            raw,
            &config.address,
            config.port,
            keep_alive_secs(config),
        )) {
            warn!(address = %config.address, port = config.port, %failure, "connect failed");
            return Err(failure);
        }

        debug!(address = %config.address, port = config.port, "connected");
        Ok(handle)
    }

    /// The engine and the raw connection, for issuing further engine calls.
    pub(crate) fn parts(&mut self) -> (&E, &mut E::Connection) {
        (&**self.library.engine(), &mut self.raw)
    }
}

impl<E: Engine> Drop for ConnectionHandle<E> {
    fn drop(&mut self) {
        self.library.engine().release_connection(&mut self.raw);
        debug!("connection released");
    }
}

/// Keep-alive in whole seconds, saturating at the engine's integer range.
fn keep_alive_secs(config: &HostConfig) -> i32 {
    i32::try_from(config.keep_alive.as_secs()).unwrap_or(i32::MAX)
}

/// Converts a poll timeout to the engine's millisecond argument.
pub(crate) fn timeout_millis(timeout: Duration) -> i32 {
    i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX)
}
