//! Subscriber side of a topic.

use std::net::{IpAddr, SocketAddr, TcpListener as StdTcpListener};

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use super::{serial, udp_socket, Channel, Heartbeat, SubRx};
use crate::config;
use crate::print::Logger;
use crate::shutdown::QuitRx;

/// Starts a subscriber on `channel`.
///
/// ## Parameters
/// - `channel`: topic and discovery port to announce on
/// - `log`: logger of the owning component
/// - `quit`: stops the subscriber when raised
///
/// ## Returns
/// - The receiving end of the delivered messages. Messages on one connection arrive whole; order across connections is best effort.
/// - The handle of the subscriber task.
///
/// ## Behaviour
/// - Binds a TCP listener on a port picked by the OS.
/// - Every [HEARTBEAT_PERIOD](config::HEARTBEAT_PERIOD) a [Heartbeat] with the topic and the
///   listener port is sent to the discovery port. If that fails, typically
///   because the network is unreachable, it is sent to localhost instead.
/// - Every accepted connection is read to the end in a task of its own, and the body is forwarded.
///   A peer that connects and sends nothing only holds up its own connection.
///
/// # Notes
/// Must be called from inside a tokio runtime.
pub fn start_subscriber(
    channel: Channel,
    log: Logger,
    quit: QuitRx,
) -> anyhow::Result<(SubRx, JoinHandle<anyhow::Result<()>>)> {
    let std_listener = StdTcpListener::bind((config::BC_LISTEN_ADDR, 0)).context("could not bind subscriber")?;
    std_listener.set_nonblocking(true)?;
    let listener = TcpListener::from_std(std_listener)?;
    let heartbeat_socket = udp_socket(0)?;

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run_subscriber(channel, listener, heartbeat_socket, out_tx, log, quit));
    Ok((out_rx, handle))
}

async fn run_subscriber(
    channel: Channel,
    listener: TcpListener,
    heartbeat_socket: UdpSocket,
    out_tx: mpsc::UnboundedSender<Vec<u8>>,
    log: Logger,
    mut quit: QuitRx,
) -> anyhow::Result<()> {
    let port = listener.local_addr()?.port();
    let heartbeat = serial::encode(&Heartbeat { topic: channel.topic.as_str().to_string(), port })?;
    let target = channel.heartbeat_target();
    let fallback = SocketAddr::new(config::LOCALHOST.parse::<IpAddr>()?, channel.discovery_port);

    let mut ticker = interval(config::HEARTBEAT_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = quit.wait() => break,
            _ = ticker.tick() => {
                if heartbeat_socket.send_to(&heartbeat, target).await.is_err() {
                    // Utan nettverk: snakk med oss sjølve
                    if let Err(e) = heartbeat_socket.send_to(&heartbeat, fallback).await {
                        log.warn("Could not send heartbeat", &[("topic", &channel.topic.as_str()), ("error", &e)]);
                    }
                }
            }
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        log.warn("Could not accept connection", &[("topic", &channel.topic.as_str()), ("error", &e)]);
                        continue;
                    }
                };
                // Ein treg sendar skal ikkje halde att dei andre
                tokio::spawn(read_message(stream, addr, out_tx.clone(), log.clone()));
            }
        }
    }
    Ok(())
}

/// Reads one connection to the end and forwards the body, unless it is empty.
async fn read_message(mut stream: TcpStream, addr: SocketAddr, out_tx: mpsc::UnboundedSender<Vec<u8>>, log: Logger) {
    let mut body = Vec::new();
    match timeout(config::TCP_READ_TIMEOUT, stream.read_to_end(&mut body)).await {
        Ok(Ok(0)) => {}
        Ok(Ok(_)) => {
            let _ = out_tx.send(body);
        }
        Ok(Err(e)) => log.warn("Could not read message", &[("addr", &addr), ("error", &e)]),
        Err(_) => log.warn("Timed out reading message", &[("addr", &addr)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Topic;
    use crate::shutdown::Quit;
    use tokio::io::AsyncWriteExt;
    use tokio::time::{Duration, Instant};

    #[tokio::test]
    async fn idle_connection_does_not_hold_up_others() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let quit = Quit::new();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_subscriber(
            Channel::local(Topic::Bid, 47_311),
            listener,
            udp_socket(0).unwrap(),
            out_tx,
            Logger::silent(),
            quit.subscribe(),
        ));

        let _idle = TcpStream::connect(addr).await.unwrap();
        let started = Instant::now();
        let mut sender = TcpStream::connect(addr).await.unwrap();
        sender.write_all(br#"{"x":1}"#).await.unwrap();
        sender.shutdown().await.unwrap();

        let body = timeout(Duration::from_millis(500), out_rx.recv()).await.unwrap().unwrap();
        assert_eq!(body, br#"{"x":1}"#);
        assert!(started.elapsed() < Duration::from_millis(200));

        quit.raise();
        task.await.unwrap().unwrap();
    }
}
