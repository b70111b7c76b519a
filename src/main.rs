//! Demo for mqttbind
//!
//! Subscribes to a filter, publishes one message, then polls until the
//! requested number of messages arrived or the poll budget is spent.
//! Without the `mosquitto` feature it runs against the loopback engine.

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use mqttbind::config::{HostConfig, load_config};
use mqttbind::{Engine, Publisher, Retain, Session, Subscriber, utils};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mqttbind", about = "Publish one message and print what arrives")]
struct Args {
    /// Topic filter to subscribe to
    #[arg(long, default_value = "test/#")]
    filter: String,

    /// Topic to publish on
    #[arg(long, default_value = "test")]
    topic: String,

    /// Payload to publish
    #[arg(long, default_value = "test")]
    payload: String,

    /// Broker address, overrides the configuration
    #[arg(long)]
    address: Option<String>,

    /// Broker port, overrides the configuration
    #[arg(long)]
    port: Option<u16>,

    /// Stop after this many received messages
    #[arg(long, default_value_t = 1)]
    count: u64,

    /// Give up after this many polls
    #[arg(long, default_value_t = 100)]
    polls: u32,

    /// Milliseconds each poll may block
    #[arg(long, default_value_t = 100)]
    timeout_ms: u64,
}

fn main() {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(2);
        }
    };
    utils::logging::init(&settings.logging.level);

    let mut host = settings.host;
    if let Some(address) = args.address.clone() {
        host = host.with_address(address);
    }
    if let Some(port) = args.port {
        host = host.with_port(port);
    }

    if let Err(e) = run(&args, host) {
        error!("demo failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "mosquitto")]
fn engine() -> mqttbind::broker::mosquitto::MosquittoEngine {
    mqttbind::broker::mosquitto::MosquittoEngine::new()
}

#[cfg(not(feature = "mosquitto"))]
fn engine() -> mqttbind::LoopbackEngine {
    mqttbind::LoopbackEngine::new()
}

fn run(args: &Args, host: HostConfig) -> Result<(), mqttbind::Failure> {
    poll(args, Session::open(engine(), host)?)
}

fn poll<E: Engine>(args: &Args, session: Session<E>) -> Result<(), mqttbind::Failure> {
    let received = Rc::new(Cell::new(0u64));
    let counter = received.clone();
    let mut subscriber = Subscriber::new(&session, &args.filter, move |m| {
        counter.set(counter.get() + 1);
        match m.payload_str() {
            Some(text) => println!("{} {}", m.topic, text),
            None => println!("{} <{} bytes>", m.topic, m.payload.len()),
        }
    })?;

    let mut publisher = Publisher::new(&session)?;
    publisher.publish(&args.topic, args.payload.as_bytes(), Retain::No)?;
    info!(topic = %args.topic, "published");

    let timeout = Duration::from_millis(args.timeout_ms);
    for _ in 0..args.polls {
        if received.get() >= args.count {
            break;
        }
        subscriber.handle_events(timeout)?;
    }

    info!(received = received.get(), "done");
    Ok(())
}
