//! Broker engine boundary
//!
//! The engine is the component that actually speaks MQTT: framing, the broker
//! handshake, keep-alive and socket I/O. This crate never does any of that
//! itself. It reaches the engine through the narrow, handle-based [`Engine`]
//! trait below, which mirrors the C API of libmosquitto:
//!
//! - every call takes the engine's own connection value and reports a raw
//!   integer [`Status`]; translating it is the caller's job (see
//!   `utils::error::check_status`),
//! - allocation may fail and returns `None`,
//! - inbound messages reach the caller through a single callback slot per
//!   connection, invoked from inside `process_events`.
//!
//! Engines also own a [`LibraryState`], the reference count that decides when
//! process-wide initialisation and cleanup run.

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::broker::message::{QoS, RawMessage};

/// Raw status code reported by an engine call.
pub type Status = i32;

/// Status codes, numbered the way libmosquitto numbers them.
pub mod status {
    use super::Status;

    pub const SUCCESS: Status = 0;
    pub const NOMEM: Status = 1;
    pub const PROTOCOL: Status = 2;
    pub const INVAL: Status = 3;
    pub const NO_CONN: Status = 4;
    pub const CONN_REFUSED: Status = 5;
    pub const NOT_FOUND: Status = 6;
    pub const CONN_LOST: Status = 7;
    pub const TLS: Status = 8;
    pub const PAYLOAD_SIZE: Status = 9;
    pub const NOT_SUPPORTED: Status = 10;
    pub const AUTH: Status = 11;
    pub const ACL_DENIED: Status = 12;
    pub const UNKNOWN: Status = 13;
    pub const ERRNO: Status = 14;

    /// Short human readable description of a status code.
    pub const fn describe(code: Status) -> &'static str {
        match code {
            SUCCESS => "success",
            NOMEM => "out of memory",
            PROTOCOL => "protocol error",
            INVAL => "invalid arguments",
            NO_CONN => "not connected",
            CONN_REFUSED => "connection refused",
            NOT_FOUND => "not found",
            CONN_LOST => "connection lost",
            TLS => "TLS error",
            PAYLOAD_SIZE => "payload too large",
            NOT_SUPPORTED => "not supported",
            AUTH => "authentication failed",
            ACL_DENIED => "access denied",
            UNKNOWN => "unknown error",
            ERRNO => "system error",
            _ => "unrecognised status",
        }
    }
}

/// Converts a string argument for a C engine call; interior NUL bytes are
/// reported as `INVAL`.
#[cfg_attr(not(feature = "mosquitto"), allow(dead_code))]
pub(crate) fn c_string(value: &str) -> Result<CString, Status> {
    CString::new(value).map_err(|_| status::INVAL)
}

/// The single callback slot of an engine connection.
///
/// Engines call it once per delivered message, synchronously, from inside
/// [`Engine::process_events`]. The record is only valid for that call.
pub type MessageCallback = Box<dyn FnMut(&RawMessage<'_>)>;

/// Reference count behind process-wide engine initialisation.
///
/// The first acquirer runs `Engine::init`, the last releaser runs
/// `Engine::cleanup`. The count itself is atomic, but a second acquirer can
/// observe a non-zero count before the first acquirer's `init` has returned,
/// so sessions must not be created concurrently from several threads without
/// external serialisation.
#[derive(Debug, Default)]
pub struct LibraryState {
    users: AtomicUsize,
}

impl LibraryState {
    pub const fn new() -> Self {
        Self {
            users: AtomicUsize::new(0),
        }
    }

    /// Number of live guards holding the library open.
    pub fn users(&self) -> usize {
        self.users.load(Ordering::Acquire)
    }

    /// Registers one more user. Returns `true` if this was the first one.
    pub(crate) fn enter(&self) -> bool {
        self.users.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Drops one user. Returns `true` if this was the last one.
    pub(crate) fn leave(&self) -> bool {
        self.users.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// Handle-based API of an MQTT broker engine.
///
/// Methods take `&self` because an engine is shared by every connection it
/// created; per-connection state lives in [`Engine::Connection`].
pub trait Engine {
    /// Engine-owned state for one connection.
    type Connection;

    /// Process-wide initialisation, run when the first session opens.
    fn init(&self) -> Status;

    /// Process-wide cleanup, run when the last session or connection closes.
    fn cleanup(&self);

    /// The reference count that guards `init` and `cleanup`.
    fn library(&self) -> &LibraryState;

    fn allocate_connection(&self) -> Option<Self::Connection>;

    fn connect(
        &self,
        connection: &mut Self::Connection,
        address: &str,
        port: u16,
        keep_alive_secs: i32,
    ) -> Status;

    fn publish(
        &self,
        connection: &mut Self::Connection,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Status;

    fn subscribe(&self, connection: &mut Self::Connection, filter: &str, qos: QoS) -> Status;

    /// Installs the connection's message callback, replacing any previous one.
    fn set_message_callback(&self, connection: &mut Self::Connection, callback: MessageCallback);

    /// Runs one iteration of network processing, waiting up to `timeout_ms`
    /// for activity. Messages received during the call are handed to the
    /// message callback before it returns.
    fn process_events(&self, connection: &mut Self::Connection, timeout_ms: i32) -> Status;

    /// Releases the connection. Called exactly once per allocated connection;
    /// the value is never used again afterwards.
    fn release_connection(&self, connection: &mut Self::Connection);
}
