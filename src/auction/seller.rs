//! Seller side of the auction.
//!
//! One round goes `Idle -> WaitingForBids -> WaitingForAck -> Idle`. A round that gets no bids,
//! or no ack from the winner, puts the call back in the for-sale queue. The call keeps the clock
//! it got when it first entered the queue, so it is retried until its auction TTL runs out.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Duration, Instant};

use crate::config::SellerConfig;
use crate::network::{serial, PubTx, SubRx};
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::ttl_queue::{TtlItem, TtlQueue};
use crate::types::{Ack, Bid, Call, SoldTo};

/// Topics the seller listens and talks on.
pub struct SellerIo {
    pub sales_tx: PubTx,
    pub sold_to_tx: PubTx,
    pub bid_rx: SubRx,
    pub ack_rx: SubRx,
}

enum State {
    Idle,
    WaitingForBids { item: TtlItem<Call>, bids: Vec<Bid>, deadline: Instant },
    WaitingForAck { item: TtlItem<Call>, winner: Bid, deadline: Instant },
}

impl State {
    fn deadline(&self) -> Option<Instant> {
        match self {
            State::Idle => None,
            State::WaitingForBids { deadline, .. } | State::WaitingForAck { deadline, .. } => Some(*deadline),
        }
    }
}

/// Starts the seller of this node.
///
/// ## Parameters
/// - `cfg`: auction TTL and the length of the bidding and ack windows
/// - `new_calls`: calls to sell, from button presses and from ledger resales
///
/// ## Behaviour
/// - Idle: takes the next live call from the for-sale queue and announces it on `sales`.
/// - WaitingForBids: keeps bids for the announced call until the bidding window closes. No bids
///   puts the call back. Otherwise the strictly lowest bid wins, the first one seen on a tie, and
///   is announced on `sold-to`.
/// - WaitingForAck: an [Ack] carrying exactly the winning bid ends the round. If none arrives
///   within the ack window the call is put back.
///
/// Bids and acks that do not belong to the current round are ignored.
/// A message that does not decode ends the task with an error.
pub fn start_seller(
    cfg: SellerConfig,
    mut new_calls: mpsc::Receiver<Call>,
    io: SellerIo,
    log: Logger,
    mut quit: QuitRx,
) -> JoinHandle<anyhow::Result<()>> {
    let SellerIo { sales_tx, sold_to_tx, mut bid_rx, mut ack_rx } = io;

    tokio::spawn(async move {
        let for_sale: TtlQueue<Call> = TtlQueue::new();
        let mut state = State::Idle;

        loop {
            let idle = matches!(state, State::Idle);
            // Greina under er avslått når det ikkje finst ein frist, men futuren må likevel lagast
            let deadline = state.deadline().unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = quit.wait() => break,
                Some(call) = new_calls.recv() => {
                    for_sale.insert(TtlItem::new(call, cfg.auction_ttl));
                }
                item = for_sale.recv(), if idle => {
                    let Some(item) = item else { break };
                    if sales_tx.send(serial::encode(&item.value)?).await.is_err() {
                        break;
                    }
                    log.call("Started a new sale", &item.value);
                    state = State::WaitingForBids {
                        item,
                        bids: Vec::new(),
                        deadline: Instant::now() + cfg.bidding_window,
                    };
                }
                Some(bytes) = bid_rx.recv() => {
                    let bid: Bid = serial::decode(&bytes)?;
                    if let State::WaitingForBids { item, bids, .. } = &mut state {
                        if bid.call == item.value {
                            log.info("Received bid", &[("floor", &bid.call.floor), ("price", &bid.price), ("id", &bid.bidder_id)]);
                            bids.push(bid);
                        }
                    }
                }
                Some(bytes) = ack_rx.recv() => {
                    let ack: Ack = serial::decode(&bytes)?;
                    if let State::WaitingForAck { winner, .. } = &state {
                        if ack.bid == *winner {
                            log.ok("Got ack from lowest bidder", &[("floor", &winner.call.floor), ("id", &winner.bidder_id)]);
                            state = State::Idle;
                        }
                    }
                }
                _ = sleep_until(deadline), if !idle => {
                    let expired = std::mem::replace(&mut state, State::Idle);
                    state = match expired {
                        State::WaitingForBids { item, bids, .. } => match lowest_bid(bids) {
                            None => {
                                log.info("No bids, retrying", &[("floor", &item.value.floor)]);
                                for_sale.insert(item);
                                State::Idle
                            }
                            Some(winner) => {
                                if sold_to_tx.send(serial::encode(&SoldTo { bid: winner.clone() })?).await.is_err() {
                                    break;
                                }
                                log.info("Sold to lowest bidder", &[("floor", &winner.call.floor), ("price", &winner.price), ("id", &winner.bidder_id)]);
                                State::WaitingForAck { item, winner, deadline: Instant::now() + cfg.ack_window }
                            }
                        },
                        State::WaitingForAck { item, .. } => {
                            log.warn("Ack timed out, retrying", &[("floor", &item.value.floor)]);
                            for_sale.insert(item);
                            State::Idle
                        }
                        State::Idle => State::Idle,
                    };
                }
            }
        }
        Ok(())
    })
}

/// The strictly lowest bid. On a tie the one received first wins.
fn lowest_bid(bids: Vec<Bid>) -> Option<Bid> {
    bids.into_iter().reduce(|best, bid| if bid.price < best.price { bid } else { best })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallDir;

    fn bid(price: i64, id: &str) -> Bid {
        Bid { call: Call::hall(1, CallDir::Up), price, bidder_id: id.to_string() }
    }

    #[test]
    fn lowest_bid_wins_first_seen_on_tie() {
        assert_eq!(lowest_bid(vec![]), None);
        assert_eq!(lowest_bid(vec![bid(30, "a"), bid(4, "b"), bid(9, "c")]), Some(bid(4, "b")));
        assert_eq!(lowest_bid(vec![bid(5, "a"), bid(5, "b")]), Some(bid(5, "a")));
    }
}
