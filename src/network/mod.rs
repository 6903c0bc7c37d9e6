//! ## Network module
//!
//! Best-effort publish/subscribe between the nodes of the fleet.
//!
//! ## Sub-modules
//! - [publisher]: listens for heartbeats on a discovery port and pushes every payload to each live subscriber.
//! - [subscriber]: announces itself with heartbeats and collects everything pushed to it.
//! - [serial]: the wire codec every message goes through.
//!
//! ## Key Features
//! - One UDP discovery port per topic. Subscribers broadcast small [Heartbeat]s on it every 300 ms.
//! - Publishers keep the heartbeat senders in a [TtlQueue](crate::ttl_queue::TtlQueue) with a 5 s liveness TTL.
//! - Payloads go point to point over TCP: connect, write the body, close. No acknowledgement.

pub mod publisher;
pub mod serial;
pub mod subscriber;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config;

pub use publisher::start_publisher;
pub use subscriber::start_subscriber;

/// Sending side of a publisher.
pub type PubTx = mpsc::Sender<Vec<u8>>;

/// Receiving side of a subscriber.
pub type SubRx = mpsc::UnboundedReceiver<Vec<u8>>;

/// The logical topics exchanged between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Sales,
    SoldTo,
    Bid,
    Ack,
    OrderDelivered,
    LedgerGossip,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Sales => "sales",
            Topic::SoldTo => "sold-to",
            Topic::Bid => "bid",
            Topic::Ack => "ack",
            Topic::OrderDelivered => "order-delivered",
            Topic::LedgerGossip => "ledger-gossip",
        }
    }

    /// Discovery port used when nothing else is configured.
    pub fn discovery_port(self) -> u16 {
        match self {
            Topic::Sales => config::SALES_DISCOVERY_PORT,
            Topic::SoldTo => config::SOLD_TO_DISCOVERY_PORT,
            Topic::Bid => config::BID_DISCOVERY_PORT,
            Topic::Ack => config::ACK_DISCOVERY_PORT,
            Topic::OrderDelivered => config::ORDER_DELIVERED_DISCOVERY_PORT,
            Topic::LedgerGossip => config::LEDGER_GOSSIP_DISCOVERY_PORT,
        }
    }
}

/// Where publishers and subscribers of one topic meet.
#[derive(Debug, Clone)]
pub struct Channel {
    pub topic: Topic,
    pub discovery_port: u16,
    /// Address heartbeats are sent to. Broadcast by default.
    pub heartbeat_addr: IpAddr,
}

impl Channel {
    /// The broadcast channel of `topic` on its standard discovery port.
    pub fn new(topic: Topic) -> Self {
        Channel {
            topic,
            discovery_port: topic.discovery_port(),
            heartbeat_addr: IpAddr::V4(config::BC_ADDR),
        }
    }

    /// A channel that never leaves this host.
    pub fn local(topic: Topic, discovery_port: u16) -> Self {
        Channel { topic, discovery_port, heartbeat_addr: IpAddr::V4(Ipv4Addr::LOCALHOST) }
    }

    pub fn heartbeat_target(&self) -> SocketAddr {
        SocketAddr::new(self.heartbeat_addr, self.discovery_port)
    }
}

/// Sent by subscribers on the discovery port of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub topic: String,
    /// TCP port the subscriber receives messages on
    pub port: u16,
}

/// Sets up a reusable broadcast-capable UDP socket bound to `port` on every interface.
///
/// ## Parameters
/// - `port`: port to bind, `0` lets the OS pick one
///
/// ## Returns
/// A tokio [UdpSocket]. Must be called from inside a tokio runtime.
pub fn udp_socket(port: u16) -> anyhow::Result<UdpSocket> {
    let addr: SocketAddr = format!("{}:{}", config::BC_LISTEN_ADDR, port)
        .parse()
        .context("invalid listen address")?;
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, None)?;

    socket.set_nonblocking(true)?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("could not bind UDP socket on {}", addr))?;
    Ok(UdpSocket::from_std(socket.into())?)
}
