//! The `broker` module describes the boundary to the MQTT broker engine.
//!
//! - `engine`: the handle-based `Engine` trait and its status codes.
//! - `message`: raw delivery records and the read-only message view.
//! - `topic`: topic name and filter validation and wildcard matching.
//! - `loopback`: an in-process engine for tests and offline use.
//! - `mosquitto`: libmosquitto bindings, behind the `mosquitto` feature.

pub mod engine;
pub mod loopback;
pub mod message;
#[cfg(feature = "mosquitto")]
pub mod mosquitto;
pub mod topic;

pub use engine::{Engine, LibraryState, MessageCallback, Status, status};
pub use loopback::LoopbackEngine;
pub use message::{Message, QoS, RawMessage, Retain};

#[cfg(test)]
mod tests;
