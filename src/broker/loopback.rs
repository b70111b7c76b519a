//! Loopback engine
//!
//! An in-process stand-in for a real broker engine. Every connection opened
//! on the same `LoopbackEngine` talks to the same tiny in-memory broker:
//! - `publish` routes a message to every connected link whose filters match,
//!   and keeps the last retained message per topic
//! - `subscribe` validates the filter and queues matching retained messages
//! - `process_events` hands queued messages to the connection's callback,
//!   including messages queued by that callback while it runs (at most
//!   `MAX_DELIVERY_ROUNDS` passes)
//!
//! The engine is single threaded. `process_events` never sleeps: nothing can
//! arrive while the only thread is waiting, so it returns as soon as the
//! queue is drained, whatever the timeout.
//!
//! For tests it counts every lifecycle call (`stats`) and can be told to
//! fail specific calls (`fail_allocation`, `set_fault`).

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, trace};

use crate::broker::engine::{Engine, LibraryState, MessageCallback, Status, status};
use crate::broker::message::{QoS, StoredMessage};
use crate::broker::topic;

/// Upper bound on drain passes per `process_events`, so handlers that keep
/// republishing to their own filter cannot hold the caller forever.
pub const MAX_DELIVERY_ROUNDS: usize = 64;

/// Engine calls that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    Connect,
    Publish,
    Subscribe,
    ProcessEvents,
}

/// Call counters, for asserting on resource handling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub inits: u64,
    pub cleanups: u64,
    pub allocated: u64,
    pub released: u64,
    pub publishes: u64,
    pub subscribes: u64,
    pub loops: u64,
}

impl EngineStats {
    /// Connections allocated and not yet released.
    pub fn live(&self) -> u64 {
        self.allocated - self.released
    }
}

/// Engine-side state of one loopback connection.
pub struct LoopbackConnection {
    id: usize,
    callback: Option<MessageCallback>,
}

impl LoopbackConnection {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[derive(Debug, Default)]
struct Link {
    connected: bool,
    lost: bool,
    filters: Vec<String>,
    inbox: VecDeque<StoredMessage>,
}

#[derive(Debug, Default)]
struct Broker {
    next_id: usize,
    next_mid: i32,
    links: HashMap<usize, Link>,
    retained: BTreeMap<String, StoredMessage>,
    stats: EngineStats,
    fail_allocation: bool,
    faults: HashMap<Operation, Status>,
}

impl Broker {
    fn fault(&self, operation: Operation) -> Option<Status> {
        self.faults.get(&operation).copied()
    }

    fn next_mid(&mut self) -> i32 {
        self.next_mid = self.next_mid.wrapping_add(1);
        self.next_mid
    }

    /// Queues a message on every connected link subscribed to its topic.
    fn route(&mut self, topic: &str, payload: &[u8], retain: bool) -> usize {
        let mid = self.next_mid();
        if retain {
            if payload.is_empty() {
                self.retained.remove(topic);
            } else {
                self.retained.insert(
                    topic.to_string(),
                    StoredMessage {
                        mid,
                        topic: topic.to_string(),
                        payload: payload.to_vec(),
                        qos: QoS::AtMostOnce,
                        retain: true,
                    },
                );
            }
        }

        let mut delivered = 0;
        for link in self.links.values_mut() {
            if !link.connected || link.lost {
                continue;
            }
            if link.filters.iter().any(|f| topic::matches(f, topic)) {
                // A live publish is never flagged as retained on delivery.
                link.inbox.push_back(StoredMessage {
                    mid,
                    topic: topic.to_string(),
                    payload: payload.to_vec(),
                    qos: QoS::AtMostOnce,
                    retain: false,
                });
                delivered += 1;
            }
        }
        delivered
    }
}

/// In-memory engine; see the module documentation.
#[derive(Debug, Default)]
pub struct LoopbackEngine {
    library: LibraryState,
    broker: RefCell<Broker>,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> EngineStats {
        self.broker.borrow().stats
    }

    /// Makes every following `allocate_connection` return `None`.
    pub fn fail_allocation(&self, fail: bool) {
        self.broker.borrow_mut().fail_allocation = fail;
    }

    /// Makes every following call of `operation` report `code`, or clears the
    /// fault when `code` is `None`.
    pub fn set_fault(&self, operation: Operation, code: Option<Status>) {
        let mut broker = self.broker.borrow_mut();
        match code {
            Some(code) => broker.faults.insert(operation, code),
            None => broker.faults.remove(&operation),
        };
    }

    /// Delivers a message as if another client had published it.
    ///
    /// Returns the number of connections it was queued for.
    pub fn inject(&self, topic: &str, payload: &[u8], retain: bool) -> usize {
        self.broker.borrow_mut().route(topic, payload, retain)
    }

    /// Simulates network loss on every connected link.
    pub fn drop_connections(&self) {
        let mut broker = self.broker.borrow_mut();
        for link in broker.links.values_mut().filter(|link| link.connected) {
            link.lost = true;
        }
    }

    /// Messages waiting to be delivered on `connection`.
    pub fn pending(&self, connection: &LoopbackConnection) -> usize {
        self.broker
            .borrow()
            .links
            .get(&connection.id)
            .map_or(0, |link| link.inbox.len())
    }

    /// The retained message currently stored for `topic`, if any.
    pub fn retained(&self, topic: &str) -> Option<StoredMessage> {
        self.broker.borrow().retained.get(topic).cloned()
    }
}

impl Engine for LoopbackEngine {
    type Connection = LoopbackConnection;

    fn init(&self) -> Status {
        let mut broker = self.broker.borrow_mut();
        if let Some(code) = broker.fault(Operation::Init) {
            return code;
        }
        broker.stats.inits += 1;
        status::SUCCESS
    }

    fn cleanup(&self) {
        self.broker.borrow_mut().stats.cleanups += 1;
    }

    fn library(&self) -> &LibraryState {
        &self.library
    }

    fn allocate_connection(&self) -> Option<LoopbackConnection> {
        let mut broker = self.broker.borrow_mut();
        if broker.fail_allocation {
            return None;
        }
        let id = broker.next_id;
        broker.next_id += 1;
        broker.links.insert(id, Link::default());
        broker.stats.allocated += 1;
        trace!(id, "loopback connection allocated");
        Some(LoopbackConnection { id, callback: None })
    }

    fn connect(
        &self,
        connection: &mut LoopbackConnection,
        address: &str,
        port: u16,
        keep_alive_secs: i32,
    ) -> Status {
        let mut broker = self.broker.borrow_mut();
        if let Some(code) = broker.fault(Operation::Connect) {
            return code;
        }
        if address.is_empty() || port == 0 || (1..5).contains(&keep_alive_secs) {
            return status::INVAL;
        }
        match broker.links.get_mut(&connection.id) {
            Some(link) => {
                link.connected = true;
                debug!(id = connection.id, address, port, "loopback connection up");
                status::SUCCESS
            }
            None => status::INVAL,
        }
    }

    fn publish(
        &self,
        connection: &mut LoopbackConnection,
        topic_name: &str,
        payload: &[u8],
        _qos: QoS,
        retain: bool,
    ) -> Status {
        let mut broker = self.broker.borrow_mut();
        if let Some(code) = broker.fault(Operation::Publish) {
            return code;
        }
        if !topic::is_valid_topic(topic_name) {
            return status::INVAL;
        }
        match broker.links.get(&connection.id) {
            Some(link) if link.lost => return status::CONN_LOST,
            Some(link) if link.connected => {}
            _ => return status::NO_CONN,
        }
        broker.stats.publishes += 1;
        broker.route(topic_name, payload, retain);
        status::SUCCESS
    }

    fn subscribe(&self, connection: &mut LoopbackConnection, filter: &str, _qos: QoS) -> Status {
        let mut broker = self.broker.borrow_mut();
        if let Some(code) = broker.fault(Operation::Subscribe) {
            return code;
        }
        if !topic::is_valid_filter(filter) {
            return status::INVAL;
        }

        let replay: Vec<StoredMessage> = broker
            .retained
            .values()
            .filter(|m| topic::matches(filter, &m.topic))
            .cloned()
            .collect();

        let Some(link) = broker.links.get_mut(&connection.id) else {
            return status::INVAL;
        };
        if link.lost {
            return status::CONN_LOST;
        }
        if !link.connected {
            return status::NO_CONN;
        }
        link.filters.push(filter.to_string());
        link.inbox.extend(replay);
        broker.stats.subscribes += 1;
        status::SUCCESS
    }

    fn set_message_callback(&self, connection: &mut LoopbackConnection, callback: MessageCallback) {
        connection.callback = Some(callback);
    }

    fn process_events(&self, connection: &mut LoopbackConnection, _timeout_ms: i32) -> Status {
        {
            let mut broker = self.broker.borrow_mut();
            if let Some(code) = broker.fault(Operation::ProcessEvents) {
                return code;
            }
            broker.stats.loops += 1;
        }

        // Callbacks may publish through this engine, including back to this
        // connection, so keep draining until the inbox stays empty.
        for _ in 0..MAX_DELIVERY_ROUNDS {
            let batch: Vec<StoredMessage> = {
                let mut broker = self.broker.borrow_mut();
                let Some(link) = broker.links.get_mut(&connection.id) else {
                    return status::INVAL;
                };
                if link.lost {
                    return status::CONN_LOST;
                }
                if !link.connected {
                    return status::NO_CONN;
                }
                link.inbox.drain(..).collect()
            };
            if batch.is_empty() {
                return status::SUCCESS;
            }

            if let Some(callback) = connection.callback.as_mut() {
                for message in &batch {
                    callback(&message.as_raw());
                }
            }
        }

        debug!(id = connection.id, "delivery rounds exhausted, rest left queued");
        status::SUCCESS
    }

    fn release_connection(&self, connection: &mut LoopbackConnection) {
        {
            let mut broker = self.broker.borrow_mut();
            broker.links.remove(&connection.id);
            broker.stats.released += 1;
        }
        connection.callback = None;
        trace!(id = connection.id, "loopback connection released");
    }
}
