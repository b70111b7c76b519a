//! The `client` module holds the types applications use directly.
//!
//! - `Session`: a `HostConfig` bound to an initialised engine.
//! - `ConnectionHandle`: sole owner of one engine connection.
//! - `CallbackCell`: type-erased storage for a message handler.
//! - `Publisher` and `Subscriber`: the publish and receive sides.

pub mod callback;
pub mod connection;
pub mod publisher;
pub mod session;
pub mod subscriber;

pub use callback::{CallbackCell, MessageHandler};
pub use connection::ConnectionHandle;
pub use publisher::Publisher;
pub use session::{LibraryGuard, Session};
pub use subscriber::Subscriber;
