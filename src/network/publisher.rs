//! Publisher side of a topic.

use std::net::SocketAddr;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::{udp_socket, Channel, Heartbeat, PubTx};
use crate::config;
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::ttl_queue::{TtlItem, TtlQueue};

/// Starts a publisher on `channel`.
///
/// ## Parameters
/// - `channel`: topic and discovery port to listen for heartbeats on
/// - `log`: logger of the owning component
/// - `quit`: stops the publisher when raised
///
/// ## Returns
/// - A sender for outgoing payloads. Each payload is pushed to every live subscriber.
/// - The handle of the publisher task.
///
/// ## Behaviour
/// - Every heartbeat for the topic refreshes the liveness of the sender for [PEER_TTL](config::PEER_TTL).
///   A peer that goes quiet for that long is forgotten.
/// - Payloads are sent to all live peers concurrently. A failed send is logged and dropped, it
///   never stops delivery to the other peers and does not evict the peer.
///
/// # Notes
/// Must be called from inside a tokio runtime.
pub fn start_publisher(
    channel: Channel,
    log: Logger,
    quit: QuitRx,
) -> anyhow::Result<(PubTx, JoinHandle<anyhow::Result<()>>)> {
    let socket = udp_socket(channel.discovery_port)?;
    let (tx, rx) = mpsc::channel(config::PUBLISH_QUEUE_LEN);
    let handle = tokio::spawn(run_publisher(channel, socket, TtlQueue::new(), rx, log, quit, config::PEER_TTL));
    Ok((tx, handle))
}

async fn run_publisher(
    channel: Channel,
    socket: UdpSocket,
    peers: TtlQueue<SocketAddr>,
    mut payloads: mpsc::Receiver<Vec<u8>>,
    log: Logger,
    mut quit: QuitRx,
    peer_ttl: Duration,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; config::UDP_BUFFER];

    loop {
        tokio::select! {
            _ = quit.wait() => break,
            received = socket.recv_from(&mut buf) => {
                let (len, from) = match received {
                    Ok(r) => r,
                    Err(e) => {
                        log.warn("Could not read heartbeat", &[("topic", &channel.topic.as_str()), ("error", &e)]);
                        continue;
                    }
                };
                // Andre program kan dele porten, ignorer det vi ikkje forstår
                let heartbeat: Heartbeat = match serde_json::from_slice(&buf[..len]) {
                    Ok(hb) => hb,
                    Err(_) => continue,
                };
                if heartbeat.topic != channel.topic.as_str() {
                    continue;
                }
                let peer = SocketAddr::new(from.ip(), heartbeat.port);
                if refresh_peer(&peers, peer, peer_ttl).await {
                    log.ok("Discovered new subscriber", &[("topic", &channel.topic.as_str()), ("addr", &peer)]);
                }
            }
            payload = payloads.recv() => {
                let Some(payload) = payload else { break };
                let live = live_peers(&peers).await;
                let log = log.clone();
                tokio::spawn(async move {
                    join_all(live.into_iter().map(|peer| push(peer, payload.clone(), log.clone()))).await;
                });
            }
        }
    }
    Ok(())
}

/// Restarts the liveness clock of `peer` without creating a duplicate entry.
///
/// ## Returns
/// `true` if the peer was not known before.
async fn refresh_peer(peers: &TtlQueue<SocketAddr>, peer: SocketAddr, ttl: Duration) -> bool {
    let mut is_new = true;
    for item in peers.drain().await {
        if item.value == peer {
            is_new = false;
        } else {
            peers.insert(item);
        }
    }
    peers.insert(TtlItem::new(peer, ttl));
    is_new
}

/// Addresses of all peers that are still alive.
async fn live_peers(peers: &TtlQueue<SocketAddr>) -> Vec<SocketAddr> {
    let items = peers.drain().await;
    let addrs = items.iter().map(|item| item.value).collect();
    for item in items {
        peers.insert(item);
    }
    addrs
}

/// Pushes one payload to one peer. Errors are logged, never returned.
async fn push(peer: SocketAddr, payload: Vec<u8>, log: Logger) {
    let result = async {
        let mut stream = timeout(config::TCP_CONNECT_TIMEOUT, TcpStream::connect(peer)).await??;
        stream.write_all(&payload).await?;
        stream.shutdown().await?;
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = result {
        log.warn("Could not publish", &[("addr", &peer), ("error", &e)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Topic;
    use crate::shutdown::Quit;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    #[tokio::test]
    async fn heartbeat_refresh_does_not_duplicate_peer() {
        let peers = TtlQueue::new();
        let a: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:4001".parse().unwrap();

        assert!(refresh_peer(&peers, a, Duration::from_secs(5)).await);
        assert!(refresh_peer(&peers, b, Duration::from_secs(5)).await);
        assert!(!refresh_peer(&peers, a, Duration::from_secs(5)).await);

        let mut live = live_peers(&peers).await;
        live.sort();
        assert_eq!(live, vec![a, b]);
    }

    #[tokio::test]
    async fn refresh_extends_liveness() {
        let peers = TtlQueue::new();
        let a: SocketAddr = "127.0.0.1:4002".parse().unwrap();
        let ttl = Duration::from_millis(40);

        refresh_peer(&peers, a, ttl).await;
        sleep(Duration::from_millis(25)).await;
        refresh_peer(&peers, a, ttl).await;
        sleep(Duration::from_millis(25)).await;
        assert_eq!(live_peers(&peers).await, vec![a]);

        sleep(Duration::from_millis(30)).await;
        assert!(live_peers(&peers).await.is_empty());
    }

    #[tokio::test]
    async fn push_to_closed_port_only_logs() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        push(addr, b"hello".to_vec(), Logger::silent()).await;
    }

    #[tokio::test]
    async fn dead_peer_does_not_stop_delivery_to_live_one() {
        let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let dead_addr = dead.local_addr().unwrap();
        drop(dead);
        let live = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let live_addr = live.local_addr().unwrap();

        let peers = TtlQueue::new();
        refresh_peer(&peers, dead_addr, Duration::from_secs(5)).await;
        refresh_peer(&peers, live_addr, Duration::from_secs(5)).await;

        let quit = Quit::new();
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_publisher(
            Channel::local(Topic::Bid, 0),
            udp_socket(0).unwrap(),
            peers,
            rx,
            Logger::silent(),
            quit.subscribe(),
            Duration::from_secs(5),
        ));
        tx.send(b"to everyone".to_vec()).await.unwrap();

        let (mut stream, _) = timeout(Duration::from_secs(2), live.accept()).await.unwrap().unwrap();
        let mut body = Vec::new();
        timeout(Duration::from_secs(2), stream.read_to_end(&mut body)).await.unwrap().unwrap();
        assert_eq!(body, b"to everyone");

        quit.raise();
        task.await.unwrap().unwrap();
    }
}
