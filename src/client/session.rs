//! Sessions and process-wide engine initialisation
//!
//! A `Session` pairs a `HostConfig` with a shared engine and keeps the
//! engine's library initialised while it is alive. Initialisation is
//! reference counted through `LibraryGuard`:
//! - the first guard on an engine runs `Engine::init`
//! - dropping the last guard runs `Engine::cleanup`
//!
//! Every connection holds its own guard, so dropping a session before the
//! publishers and subscribers built from it is fine.
//!
//! Concurrency note: the count is atomic, but a guard acquired while another
//! thread is still inside `Engine::init` does not wait for it. Create sessions
//! from one thread, or serialise their creation externally.

use std::rc::Rc;

use tracing::{debug, info};

use crate::broker::engine::Engine;
use crate::config::HostConfig;
use crate::utils::error::{Failure, check_status};

/// Keeps an engine's library initialised for as long as it lives.
pub struct LibraryGuard<E: Engine> {
    engine: Rc<E>,
}

impl<E: Engine> LibraryGuard<E> {
    /// Registers a user of `engine`, initialising it if this is the first.
    pub fn acquire(engine: Rc<E>) -> Result<Self, Failure> {
        let library = engine.library();
        if library.enter() {
            if let Err(failure) = check_status(engine.init()) {
                library.leave();
                return Err(failure);
            }
            info!("broker engine initialised");
        }
        Ok(Self { engine })
    }

    pub fn engine(&self) -> &Rc<E> {
        &self.engine
    }
}

impl<E: Engine> Clone for LibraryGuard<E> {
    fn clone(&self) -> Self {
        // A live guard keeps the count above zero, so this never initialises.
        self.engine.library().enter();
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: Engine> Drop for LibraryGuard<E> {
    fn drop(&mut self) {
        if self.engine.library().leave() {
            self.engine.cleanup();
            info!("broker engine cleaned up");
        }
    }
}

/// A `HostConfig` bound to an initialised engine.
///
/// Publishers and subscribers are built from a session and connect to the
/// host it describes.
pub struct Session<E: Engine> {
    config: HostConfig,
    library: LibraryGuard<E>,
}

impl<E: Engine> Session<E> {
    /// Takes ownership of `engine` and opens a session on it.
    pub fn open(engine: E, config: HostConfig) -> Result<Self, Failure> {
        Self::with_engine(Rc::new(engine), config)
    }

    /// Opens a session on an engine that is shared with other sessions.
    pub fn with_engine(engine: Rc<E>, config: HostConfig) -> Result<Self, Failure> {
        let library = LibraryGuard::acquire(engine)?;
        debug!(address = %config.address, port = config.port, "session opened");
        Ok(Self { config, library })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn engine(&self) -> &Rc<E> {
        self.library.engine()
    }

    pub(crate) fn library(&self) -> &LibraryGuard<E> {
        &self.library
    }
}
