use std::cell::RefCell;
use std::rc::Rc;

use super::engine::{Engine, c_string, status};
use super::loopback::{LoopbackEngine, MAX_DELIVERY_ROUNDS, Operation};
use super::message::{Message, QoS, RawMessage, Retain, StoredMessage};
use super::topic;

fn connected(engine: &LoopbackEngine) -> super::loopback::LoopbackConnection {
    let mut conn = engine.allocate_connection().unwrap();
    assert_eq!(engine.connect(&mut conn, "127.0.0.1", 1883, 60), status::SUCCESS);
    conn
}

#[test]
fn test_topic_matches_exact_and_wildcards() {
    assert!(topic::matches("test/foo", "test/foo"));
    assert!(topic::matches("test/#", "test/foo"));
    assert!(topic::matches("test/#", "test/foo/bar"));
    assert!(topic::matches("test/#", "test"));
    assert!(topic::matches("test/+", "test/foo"));
    assert!(topic::matches("+/+", "a/b"));
    assert!(!topic::matches("test/+", "test/foo/bar"));
    assert!(!topic::matches("test/+", "test"));
    assert!(!topic::matches("test/foo", "test/bar"));
    assert!(!topic::matches("test", "test/foo"));
}

#[test]
fn test_topic_dollar_topics_skip_leading_wildcards() {
    assert!(!topic::matches("#", "$SYS/broker/uptime"));
    assert!(!topic::matches("+/broker/uptime", "$SYS/broker/uptime"));
    assert!(topic::matches("$SYS/#", "$SYS/broker/uptime"));
}

#[test]
fn test_topic_validation() {
    assert!(topic::is_valid_filter("#"));
    assert!(topic::is_valid_filter("a/+/c"));
    assert!(topic::is_valid_filter("a/b/#"));
    assert!(!topic::is_valid_filter(""));
    assert!(!topic::is_valid_filter("a/#/c"));
    assert!(!topic::is_valid_filter("a/b#"));
    assert!(!topic::is_valid_filter("a+/b"));

    assert!(topic::is_valid_topic("a/b"));
    assert!(!topic::is_valid_topic(""));
    assert!(!topic::is_valid_topic("a/+"));
    assert!(!topic::is_valid_topic("a/#"));
}

#[test]
fn test_message_view_from_raw() {
    let raw = RawMessage {
        mid: 3,
        topic: "test/foo",
        payload: b"bar",
        qos: 1,
        retain: true,
    };
    let view = Message::from_raw(&raw).unwrap();
    assert_eq!(view.topic, "test/foo");
    assert_eq!(view.payload, b"bar");
    assert_eq!(view.qos, QoS::AtLeastOnce);
    assert!(view.retain);
    assert_eq!(view.payload_str(), Some("bar"));
    assert_eq!(view.to_string(), "test/foo (3 bytes)");
}

#[test]
fn test_message_view_rejects_invalid_qos() {
    let raw = RawMessage {
        mid: 0,
        topic: "t",
        payload: b"",
        qos: 3,
        retain: false,
    };
    assert!(Message::from_raw(&raw).is_none());
}

#[test]
fn test_retain_conversions() {
    assert!(bool::from(Retain::Yes));
    assert!(!bool::from(Retain::No));
    assert_eq!(Retain::from(true), Retain::Yes);
    assert_eq!(Retain::default(), Retain::No);
}

#[test]
fn test_stored_message_as_raw() {
    let stored = StoredMessage {
        mid: 9,
        topic: "a".to_string(),
        payload: vec![1, 2],
        qos: QoS::ExactlyOnce,
        retain: false,
    };
    let raw = stored.as_raw();
    assert_eq!(raw.qos, 2);
    assert_eq!(raw.payload, &[1, 2]);
}

#[test]
fn test_c_string_rejects_interior_nul() {
    assert_eq!(c_string("test/foo").unwrap().as_bytes(), b"test/foo");
    assert_eq!(c_string("").unwrap().as_bytes(), b"");
    assert_eq!(c_string("test\0foo").unwrap_err(), status::INVAL);
}

#[test]
fn test_status_describe() {
    assert_eq!(status::describe(status::CONN_LOST), "connection lost");
    assert_eq!(status::describe(99), "unrecognised status");
}

#[test]
fn test_loopback_connect_rejects_bad_arguments() {
    let engine = LoopbackEngine::new();
    let mut conn = engine.allocate_connection().unwrap();
    assert_eq!(engine.connect(&mut conn, "", 1883, 60), status::INVAL);
    assert_eq!(engine.connect(&mut conn, "host", 0, 60), status::INVAL);
    assert_eq!(engine.connect(&mut conn, "host", 1883, 2), status::INVAL);
    assert_eq!(engine.connect(&mut conn, "host", 1883, 0), status::SUCCESS);
    engine.release_connection(&mut conn);
}

#[test]
fn test_loopback_requires_connection() {
    let engine = LoopbackEngine::new();
    let mut conn = engine.allocate_connection().unwrap();
    assert_eq!(
        engine.publish(&mut conn, "a", b"x", QoS::AtMostOnce, false),
        status::NO_CONN
    );
    assert_eq!(
        engine.subscribe(&mut conn, "a", QoS::AtMostOnce),
        status::NO_CONN
    );
    assert_eq!(engine.process_events(&mut conn, 0), status::NO_CONN);
    engine.release_connection(&mut conn);
}

#[test]
fn test_loopback_routes_between_connections() {
    let engine = LoopbackEngine::new();
    let mut publisher = connected(&engine);
    let mut subscriber = connected(&engine);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    engine.set_message_callback(
        &mut subscriber,
        Box::new(move |raw: &RawMessage<'_>| sink.borrow_mut().push(raw.topic.to_string())),
    );
    assert_eq!(
        engine.subscribe(&mut subscriber, "sensors/+", QoS::AtMostOnce),
        status::SUCCESS
    );

    assert_eq!(
        engine.publish(&mut publisher, "sensors/t1", b"21", QoS::AtMostOnce, false),
        status::SUCCESS
    );
    assert_eq!(
        engine.publish(&mut publisher, "other/t1", b"21", QoS::AtMostOnce, false),
        status::SUCCESS
    );
    assert_eq!(engine.pending(&subscriber), 1);

    assert_eq!(engine.process_events(&mut subscriber, 0), status::SUCCESS);
    assert_eq!(*seen.borrow(), vec!["sensors/t1".to_string()]);
    assert_eq!(engine.pending(&subscriber), 0);

    engine.release_connection(&mut publisher);
    engine.release_connection(&mut subscriber);
    assert_eq!(engine.stats().live(), 0);
}

#[test]
fn test_loopback_replays_and_clears_retained() {
    let engine = LoopbackEngine::new();
    assert_eq!(engine.inject("state/lamp", b"on", true), 0);
    assert_eq!(engine.retained("state/lamp").unwrap().payload, b"on");

    let mut conn = connected(&engine);
    let flags = Rc::new(RefCell::new(Vec::new()));
    let sink = flags.clone();
    engine.set_message_callback(
        &mut conn,
        Box::new(move |raw: &RawMessage<'_>| sink.borrow_mut().push(raw.retain)),
    );
    assert_eq!(
        engine.subscribe(&mut conn, "state/#", QoS::AtMostOnce),
        status::SUCCESS
    );
    assert_eq!(engine.process_events(&mut conn, 0), status::SUCCESS);
    assert_eq!(*flags.borrow(), vec![true]);

    engine.inject("state/lamp", b"", true);
    assert!(engine.retained("state/lamp").is_none());
    engine.release_connection(&mut conn);
}

#[test]
fn test_loopback_faults_and_lost_connections() {
    let engine = LoopbackEngine::new();
    let mut conn = connected(&engine);

    engine.set_fault(Operation::ProcessEvents, Some(status::PROTOCOL));
    assert_eq!(engine.process_events(&mut conn, 0), status::PROTOCOL);
    engine.set_fault(Operation::ProcessEvents, None);
    assert_eq!(engine.process_events(&mut conn, 0), status::SUCCESS);

    engine.drop_connections();
    assert_eq!(engine.process_events(&mut conn, 0), status::CONN_LOST);
    assert_eq!(
        engine.publish(&mut conn, "a", b"", QoS::AtMostOnce, false),
        status::CONN_LOST
    );

    engine.fail_allocation(true);
    assert!(engine.allocate_connection().is_none());
    engine.release_connection(&mut conn);

    let stats = engine.stats();
    assert_eq!(stats.allocated, 1);
    assert_eq!(stats.released, 1);
}

#[test]
fn test_loopback_delivers_messages_queued_during_dispatch() {
    let engine = Rc::new(LoopbackEngine::new());
    let mut conn = connected(&engine);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    let feedback = engine.clone();
    engine.set_message_callback(
        &mut conn,
        Box::new(move |raw: &RawMessage<'_>| {
            sink.borrow_mut().push(raw.topic.to_string());
            if raw.topic == "a/1" {
                feedback.inject("a/2", b"", false);
            }
        }),
    );
    assert_eq!(engine.subscribe(&mut conn, "a/#", QoS::AtMostOnce), status::SUCCESS);

    engine.inject("a/1", b"", false);
    assert_eq!(engine.process_events(&mut conn, 0), status::SUCCESS);

    assert_eq!(*seen.borrow(), vec!["a/1", "a/2"]);
    assert_eq!(engine.pending(&conn), 0);
    assert_eq!(engine.stats().loops, 1);
    engine.release_connection(&mut conn);
}

#[test]
fn test_loopback_bounds_self_feeding_delivery() {
    let engine = Rc::new(LoopbackEngine::new());
    let mut conn = connected(&engine);
    let count = Rc::new(RefCell::new(0));
    let counter = count.clone();
    let feedback = engine.clone();
    engine.set_message_callback(
        &mut conn,
        Box::new(move |_: &RawMessage<'_>| {
            *counter.borrow_mut() += 1;
            feedback.inject("echo", b"", false);
        }),
    );
    assert_eq!(engine.subscribe(&mut conn, "echo", QoS::AtMostOnce), status::SUCCESS);

    engine.inject("echo", b"", false);
    assert_eq!(engine.process_events(&mut conn, 0), status::SUCCESS);

    assert_eq!(*count.borrow(), MAX_DELIVERY_ROUNDS);
    assert_eq!(engine.pending(&conn), 1);
    engine.release_connection(&mut conn);
}
