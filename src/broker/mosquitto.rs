//! libmosquitto engine
//!
//! Binds the crate's `Engine` trait to the C library. Everything unsafe in
//! the crate lives in this file:
//! - raw `mosquitto` pointers are owned by `MosquittoConnection` and only
//!   destroyed by `release_connection`
//! - the message callback is boxed twice so its address is thin and stable;
//!   that address is the mosquitto user-data pointer the trampoline reads back
//! - strings are converted to `CString`; interior NUL bytes report `INVAL`
//!
//! Enabled with the `mosquitto` cargo feature; links against the system
//! `libmosquitto`.

use std::ffi::{CStr, c_char, c_int, c_void};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::{self, NonNull};

use tracing::{debug, error, warn};

use crate::broker::engine::{
    Engine, LibraryState, MessageCallback, Status, c_string, status,
};
use crate::broker::message::{QoS, RawMessage};

#[allow(non_camel_case_types)]
#[repr(C)]
struct mosquitto {
    _private: [u8; 0],
}

#[allow(non_camel_case_types)]
#[repr(C)]
struct mosquitto_message {
    mid: c_int,
    topic: *mut c_char,
    payload: *mut c_void,
    payloadlen: c_int,
    qos: c_int,
    retain: bool,
}

type OnMessage = unsafe extern "C" fn(*mut mosquitto, *mut c_void, *const mosquitto_message);

#[link(name = "mosquitto")]
unsafe extern "C" {
    fn mosquitto_lib_init() -> c_int;
    fn mosquitto_lib_cleanup() -> c_int;
    fn mosquitto_new(id: *const c_char, clean_session: bool, obj: *mut c_void) -> *mut mosquitto;
    fn mosquitto_destroy(mosq: *mut mosquitto);
    fn mosquitto_connect(
        mosq: *mut mosquitto,
        host: *const c_char,
        port: c_int,
        keepalive: c_int,
    ) -> c_int;
    fn mosquitto_disconnect(mosq: *mut mosquitto) -> c_int;
    fn mosquitto_publish(
        mosq: *mut mosquitto,
        mid: *mut c_int,
        topic: *const c_char,
        payloadlen: c_int,
        payload: *const c_void,
        qos: c_int,
        retain: bool,
    ) -> c_int;
    fn mosquitto_subscribe(
        mosq: *mut mosquitto,
        mid: *mut c_int,
        sub: *const c_char,
        qos: c_int,
    ) -> c_int;
    fn mosquitto_message_callback_set(mosq: *mut mosquitto, on_message: Option<OnMessage>);
    fn mosquitto_user_data_set(mosq: *mut mosquitto, obj: *mut c_void);
    fn mosquitto_loop(mosq: *mut mosquitto, timeout: c_int, max_packets: c_int) -> c_int;
}

static LIBRARY: LibraryState = LibraryState::new();

/// Engine backed by the system libmosquitto.
///
/// libmosquitto keeps process-wide state, so every instance shares one
/// `LibraryState`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MosquittoEngine;

/// One `struct mosquitto *` plus the callback installed on it.
pub struct MosquittoConnection {
    raw: NonNull<mosquitto>,
    callback: Option<Box<MessageCallback>>,
}

impl MosquittoEngine {
    pub fn new() -> Self {
        Self
    }
}

unsafe extern "C" fn on_message(
    _mosq: *mut mosquitto,
    user_data: *mut c_void,
    message: *const mosquitto_message,
) {
    if user_data.is_null() || message.is_null() {
        return;
    }
    // SAFETY: user_data is the address of the boxed callback installed by
    // `set_message_callback`; it lives until `release_connection`, which
    // destroys the mosquitto instance before dropping the box.
    let callback = unsafe { &mut *(user_data as *mut MessageCallback) };
    // SAFETY: libmosquitto passes a valid message for the duration of the call.
    let message = unsafe { &*message };

    if message.topic.is_null() {
        return;
    }
    // SAFETY: the topic is a NUL-terminated string owned by libmosquitto.
    let Ok(topic) = unsafe { CStr::from_ptr(message.topic) }.to_str() else {
        warn!("dropping message with a non UTF-8 topic");
        return;
    };
    let payload: &[u8] = if message.payload.is_null() || message.payloadlen <= 0 {
        &[]
    } else {
        // SAFETY: payload points at payloadlen bytes owned by libmosquitto.
        unsafe {
            std::slice::from_raw_parts(message.payload as *const u8, message.payloadlen as usize)
        }
    };

    let raw = RawMessage {
        mid: message.mid,
        topic,
        payload,
        qos: message.qos,
        retain: message.retain,
    };
    // Unwinding into C is undefined behaviour.
    if catch_unwind(AssertUnwindSafe(|| callback(&raw))).is_err() {
        error!(topic, "message handler panicked");
    }
}

impl Engine for MosquittoEngine {
    type Connection = MosquittoConnection;

    fn init(&self) -> Status {
        // SAFETY: no preconditions.
        unsafe { mosquitto_lib_init() }
    }

    fn cleanup(&self) {
        // SAFETY: called once, after the last connection was destroyed.
        let code = unsafe { mosquitto_lib_cleanup() };
        if code != status::SUCCESS {
            debug!(code, "mosquitto_lib_cleanup failed");
        }
    }

    fn library(&self) -> &LibraryState {
        &LIBRARY
    }

    fn allocate_connection(&self) -> Option<MosquittoConnection> {
        // SAFETY: a null id asks libmosquitto to generate one, which requires
        // clean_session = true.
        let raw = unsafe { mosquitto_new(ptr::null(), true, ptr::null_mut()) };
        NonNull::new(raw).map(|raw| MosquittoConnection {
            raw,
            callback: None,
        })
    }

    fn connect(
        &self,
        connection: &mut MosquittoConnection,
        address: &str,
        port: u16,
        keep_alive_secs: i32,
    ) -> Status {
        let host = match c_string(address) {
            Ok(host) => host,
            Err(code) => return code,
        };
        // SAFETY: raw is a live instance, host outlives the call.
        unsafe {
            mosquitto_connect(
                connection.raw.as_ptr(),
                host.as_ptr(),
                c_int::from(port),
                keep_alive_secs,
            )
        }
    }

    fn publish(
        &self,
        connection: &mut MosquittoConnection,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Status {
        let topic = match c_string(topic) {
            Ok(topic) => topic,
            Err(code) => return code,
        };
        let Ok(len) = c_int::try_from(payload.len()) else {
            return status::PAYLOAD_SIZE;
        };
        // SAFETY: raw is live; topic and payload outlive the call, which copies them.
        unsafe {
            mosquitto_publish(
                connection.raw.as_ptr(),
                ptr::null_mut(),
                topic.as_ptr(),
                len,
                payload.as_ptr() as *const c_void,
                qos as c_int,
                retain,
            )
        }
    }

    fn subscribe(&self, connection: &mut MosquittoConnection, filter: &str, qos: QoS) -> Status {
        let filter = match c_string(filter) {
            Ok(filter) => filter,
            Err(code) => return code,
        };
        // SAFETY: raw is live, filter outlives the call.
        unsafe {
            mosquitto_subscribe(
                connection.raw.as_ptr(),
                ptr::null_mut(),
                filter.as_ptr(),
                qos as c_int,
            )
        }
    }

    fn set_message_callback(
        &self,
        connection: &mut MosquittoConnection,
        callback: MessageCallback,
    ) {
        // Take the address from the box in its final place; it is not moved
        // again until `release_connection` drops it.
        let stored = connection.callback.insert(Box::new(callback));
        let user_data = &mut **stored as *mut MessageCallback as *mut c_void;
        // SAFETY: raw is live and the box outlives the instance (see
        // `release_connection`).
        unsafe {
            mosquitto_user_data_set(connection.raw.as_ptr(), user_data);
            mosquitto_message_callback_set(connection.raw.as_ptr(), Some(on_message));
        }
    }

    fn process_events(&self, connection: &mut MosquittoConnection, timeout_ms: i32) -> Status {
        // SAFETY: raw is live; callbacks run on this thread before the call returns.
        unsafe { mosquitto_loop(connection.raw.as_ptr(), timeout_ms, 1) }
    }

    fn release_connection(&self, connection: &mut MosquittoConnection) {
        // SAFETY: raw is live and is never used again after destroy.
        unsafe {
            // Not connected is fine here.
            let _ = mosquitto_disconnect(connection.raw.as_ptr());
            mosquitto_destroy(connection.raw.as_ptr());
        }
        connection.callback = None;
    }
}
