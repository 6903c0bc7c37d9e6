//! Buyer side of the auction.

use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::FloorConfig;
use crate::network::{serial, PubTx, SubRx};
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::types::{Ack, Bid, Call, CallDir, CallKind, NodeId, Order, SoldTo};

/// Prices a call for this node.
pub trait PriceCalculator: Send + Sync + 'static {
    fn price(&self, call: Call) -> impl Future<Output = anyhow::Result<i64>> + Send;
}

/// Topics the buyer listens and talks on.
pub struct BuyerIo {
    /// Sale announcements
    pub sales_rx: SubRx,
    /// Awards
    pub sold_to_rx: SubRx,
    pub bid_tx: PubTx,
    pub ack_tx: PubTx,
}

/// Whether this node may bid on `call` at all.
///
/// Rejects floors outside `floors`, cab calls placed in another node, hall calls without a
/// direction and hall calls that point out of the building at the top or bottom floor.
pub fn should_bid(call: &Call, self_id: &str, floors: FloorConfig) -> bool {
    if !floors.contains(call.floor) {
        return false;
    }
    match call.kind {
        CallKind::Cab => call.owner.as_deref() == Some(self_id),
        CallKind::Hall => match call.dir {
            CallDir::Up => call.floor != floors.top(),
            CallDir::Down => call.floor != floors.bottom,
            CallDir::None => false,
        },
    }
}

/// Starts the buyer of this node.
///
/// ## Parameters
/// - `self_id`: identity put on every bid, and matched against awards
/// - `pricer`: prices the calls this node bids on
/// - `orders_tx`: where won calls go, as new local orders
///
/// ## Behaviour
/// - Sale announcement: if [should_bid] accepts it, prices the call and publishes a [Bid].
/// - Award naming this node: publishes an [Ack] and queues the call as an [Order].
///   Awards for other nodes are ignored.
///
/// A message that does not decode ends the task with an error.
pub fn start_buyer<P: PriceCalculator>(
    self_id: NodeId,
    floors: FloorConfig,
    pricer: P,
    orders_tx: mpsc::Sender<Order>,
    io: BuyerIo,
    log: Logger,
    mut quit: QuitRx,
) -> JoinHandle<anyhow::Result<()>> {
    let BuyerIo { mut sales_rx, mut sold_to_rx, bid_tx, ack_tx } = io;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = quit.wait() => break,
                Some(bytes) = sales_rx.recv() => {
                    let call: Call = serial::decode(&bytes)?;
                    if !should_bid(&call, &self_id, floors) {
                        continue;
                    }
                    let price = match pricer.price(call.clone()).await {
                        Ok(price) => price,
                        Err(e) => {
                            log.warn("Could not price order", &[("floor", &call.floor), ("error", &e)]);
                            continue;
                        }
                    };
                    let bid = Bid { call, price, bidder_id: self_id.clone() };
                    if bid_tx.send(serial::encode(&bid)?).await.is_err() {
                        break;
                    }
                    log.info("Placed bid on order", &[("floor", &bid.call.floor), ("dir", &format!("{:?}", bid.call.dir)), ("price", &price)]);
                }
                Some(bytes) = sold_to_rx.recv() => {
                    let sold: SoldTo = serial::decode(&bytes)?;
                    if sold.bid.bidder_id != self_id {
                        continue;
                    }
                    if ack_tx.send(serial::encode(&Ack { bid: sold.bid.clone() })?).await.is_err() {
                        break;
                    }
                    log.call("Bought order", &sold.bid.call);
                    if orders_tx.send(Order::from(sold.bid.call)).await.is_err() {
                        break;
                    }
                }
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Quit;
    use tokio::time::{timeout, Duration};

    struct FixedPrice(i64);

    impl PriceCalculator for FixedPrice {
        fn price(&self, _call: Call) -> impl Future<Output = anyhow::Result<i64>> + Send {
            let price = self.0;
            async move { Ok(price) }
        }
    }

    fn floors() -> FloorConfig {
        FloorConfig { num: 4, bottom: 0 }
    }

    #[test]
    fn rejects_calls_it_cannot_serve() {
        assert!(!should_bid(&Call::hall(4, CallDir::Down), "me", floors()));
        assert!(!should_bid(&Call::hall(-1, CallDir::Up), "me", floors()));
        assert!(!should_bid(&Call::hall(3, CallDir::Up), "me", floors()));
        assert!(!should_bid(&Call::hall(0, CallDir::Down), "me", floors()));
        assert!(!should_bid(&Call::hall(1, CallDir::None), "me", floors()));
        assert!(!should_bid(&Call::cab(1, "other"), "me", floors()));
    }

    #[test]
    fn accepts_servable_calls() {
        assert!(should_bid(&Call::hall(3, CallDir::Down), "me", floors()));
        assert!(should_bid(&Call::hall(0, CallDir::Up), "me", floors()));
        assert!(should_bid(&Call::cab(2, "me"), "me", floors()));
    }

    struct Harness {
        sales_tx: mpsc::UnboundedSender<Vec<u8>>,
        sold_to_tx: mpsc::UnboundedSender<Vec<u8>>,
        bid_rx: mpsc::Receiver<Vec<u8>>,
        ack_rx: mpsc::Receiver<Vec<u8>>,
        orders_rx: mpsc::Receiver<Order>,
        _quit: Quit,
    }

    fn harness(price: i64) -> Harness {
        let quit = Quit::new();
        let (sales_tx, sales_rx) = mpsc::unbounded_channel();
        let (sold_to_tx, sold_to_rx) = mpsc::unbounded_channel();
        let (bid_tx, bid_rx) = mpsc::channel(8);
        let (ack_tx, ack_rx) = mpsc::channel(8);
        let (orders_tx, orders_rx) = mpsc::channel(8);
        start_buyer(
            "me".to_string(),
            floors(),
            FixedPrice(price),
            orders_tx,
            BuyerIo { sales_rx, sold_to_rx, bid_tx, ack_tx },
            Logger::silent(),
            quit.subscribe(),
        );
        Harness { sales_tx, sold_to_tx, bid_rx, ack_rx, orders_rx, _quit: quit }
    }

    #[tokio::test]
    async fn bids_on_announced_call() {
        let mut h = harness(7);
        let call = Call::hall(2, CallDir::Up);
        h.sales_tx.send(serial::encode(&call).unwrap()).unwrap();

        let bytes = timeout(Duration::from_secs(1), h.bid_rx.recv()).await.unwrap().unwrap();
        let bid: Bid = serial::decode(&bytes).unwrap();
        assert_eq!(bid, Bid { call, price: 7, bidder_id: "me".to_string() });
    }

    #[tokio::test]
    async fn skips_calls_it_cannot_serve() {
        let mut h = harness(7);
        h.sales_tx.send(serial::encode(&Call::cab(1, "other")).unwrap()).unwrap();
        h.sales_tx.send(serial::encode(&Call::hall(1, CallDir::Down)).unwrap()).unwrap();

        let bytes = timeout(Duration::from_secs(1), h.bid_rx.recv()).await.unwrap().unwrap();
        let bid: Bid = serial::decode(&bytes).unwrap();
        assert_eq!(bid.call, Call::hall(1, CallDir::Down));
    }

    #[tokio::test]
    async fn award_for_us_is_acked_and_queued() {
        let mut h = harness(3);
        let ours = Bid { call: Call::hall(1, CallDir::Up), price: 3, bidder_id: "me".to_string() };
        let theirs = Bid { call: Call::hall(2, CallDir::Up), price: 1, bidder_id: "other".to_string() };
        h.sold_to_tx.send(serial::encode(&SoldTo { bid: theirs }).unwrap()).unwrap();
        h.sold_to_tx.send(serial::encode(&SoldTo { bid: ours.clone() }).unwrap()).unwrap();

        let bytes = timeout(Duration::from_secs(1), h.ack_rx.recv()).await.unwrap().unwrap();
        let ack: Ack = serial::decode(&bytes).unwrap();
        assert_eq!(ack.bid, ours);

        let order = timeout(Duration::from_secs(1), h.orders_rx.recv()).await.unwrap().unwrap();
        assert_eq!(order, Order::from(ours.call));
        assert!(h.ack_rx.try_recv().is_err());
        assert!(h.orders_rx.try_recv().is_err());
    }
}
