//! Message definitions
//!
//! Two shapes of an inbound message exist:
//! - `RawMessage`: the record an engine hands to its callback, with the QoS
//!   still a raw integer exactly as the engine reported it
//! - `Message`: the read-only view user handlers receive, built from a raw
//!   record for the duration of one handler call
//!
//! Both borrow from engine-owned buffers, so neither can outlive the callback
//! invocation that produced it.

use std::fmt;

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Maps a raw engine value to a QoS level.
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(QoS::AtMostOnce),
            1 => Some(QoS::AtLeastOnce),
            2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

/// Whether the broker should keep a published message for future subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Retain {
    Yes,
    #[default]
    No,
}

impl From<Retain> for bool {
    fn from(retain: Retain) -> bool {
        retain == Retain::Yes
    }
}

impl From<bool> for Retain {
    fn from(retain: bool) -> Retain {
        if retain { Retain::Yes } else { Retain::No }
    }
}

/// A delivery record as produced by an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawMessage<'a> {
    pub mid: i32,
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: i32,
    pub retain: bool,
}

/// Read-only view of one delivered message.
///
/// Only valid inside the handler call that received it; copy out whatever
/// needs to outlive the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    pub mid: i32,
    pub topic: &'a str,
    pub payload: &'a [u8],
    pub qos: QoS,
    pub retain: bool,
}

impl<'a> Message<'a> {
    /// Builds the view, or `None` if the record carries an invalid QoS.
    pub fn from_raw(raw: &RawMessage<'a>) -> Option<Self> {
        Some(Self {
            mid: raw.mid,
            topic: raw.topic,
            payload: raw.payload,
            qos: QoS::from_raw(raw.qos)?,
            retain: raw.retain,
        })
    }

    /// The payload as UTF-8 text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&'a str> {
        std::str::from_utf8(self.payload).ok()
    }
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} bytes)", self.topic, self.payload.len())
    }
}

/// An owned copy of a message, used where an engine has to queue deliveries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub mid: i32,
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl StoredMessage {
    /// Borrows the stored copy as an engine delivery record.
    pub fn as_raw(&self) -> RawMessage<'_> {
        RawMessage {
            mid: self.mid,
            topic: &self.topic,
            payload: &self.payload,
            qos: self.qos as i32,
            retain: self.retain,
        }
    }
}
