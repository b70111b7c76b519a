//! # mqttbind
//!
//! `mqttbind` is a small client-side binding layer over an MQTT broker
//! engine. It does not speak MQTT itself; it wraps an engine's handle-based
//! API (libmosquitto, or the in-process loopback engine) in types that make
//! resource leaks and mistyped callbacks impossible to write.
//!
//! ## Core Modules
//!
//! - `broker`: the engine boundary (`Engine` trait, status codes, message records).
//! - `client`: sessions, owned connections, publishers and subscribers.
//! - `config`: `HostConfig` and file/environment configuration loading.
//! - `utils`: the `Failure` type every engine result is translated into, and logging.
//!
//! ## Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! use mqttbind::{HostConfig, LoopbackEngine, Publisher, Retain, Session, Subscriber};
//!
//! let session = Session::open(LoopbackEngine::new(), HostConfig::default())?;
//!
//! let topics = Rc::new(RefCell::new(Vec::new()));
//! let sink = topics.clone();
//! let mut subscriber = Subscriber::new(&session, "test/#", move |m| {
//!     sink.borrow_mut().push(m.topic.to_string());
//! })?;
//!
//! let mut publisher = Publisher::new(&session)?;
//! publisher.publish("test/foo", b"bar", Retain::No)?;
//!
//! subscriber.handle_events(Duration::ZERO)?;
//! assert_eq!(*topics.borrow(), ["test/foo"]);
//! # Ok::<(), mqttbind::Failure>(())
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod utils;

pub use broker::{Engine, LoopbackEngine, Message, QoS, Retain};
pub use client::{MessageHandler, Publisher, Session, Subscriber};
pub use config::HostConfig;
pub use utils::error::Failure;
