//! The task that owns a node's order queue.
//!
//! It turns bought orders into goals for the elevator, removes orders when the elevator arrives,
//! tells the fleet about the delivery, and prices new calls for the buyer.

use std::future::Future;

use anyhow::{anyhow, Context};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep};

use super::delayed_counter::{self, DelayedCounter};
use super::price::calc_price_from_queue;
use super::sort::{resolve_dir, sort_orders};
use crate::auction::buyer::PriceCalculator;
use crate::config::{self, FloorConfig, OrderHandlerConfig};
use crate::elevator::ElevatorState;
use crate::network::{serial, PubTx};
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::types::{Call, Order};

struct PriceRequest {
    call: Call,
    reply: oneshot::Sender<anyhow::Result<i64>>,
}

/// Handle used by the buyer to add orders and ask for prices.
#[derive(Debug, Clone)]
pub struct OrderHandlerHandle {
    new_orders: mpsc::Sender<Order>,
    prices: mpsc::Sender<PriceRequest>,
}

impl std::fmt::Debug for PriceRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceRequest").field("call", &self.call).finish()
    }
}

impl OrderHandlerHandle {
    /// Queues a bought order for delivery.
    pub async fn add_order(&self, order: Order) -> anyhow::Result<()> {
        self.new_orders
            .send(order)
            .await
            .map_err(|_| anyhow!("order handler has stopped"))
    }

    /// A sender that queues orders directly, for tasks that only add orders.
    pub fn order_sender(&self) -> mpsc::Sender<Order> {
        self.new_orders.clone()
    }
}

impl PriceCalculator for OrderHandlerHandle {
    fn price(&self, call: Call) -> impl Future<Output = anyhow::Result<i64>> + Send {
        let prices = self.prices.clone();
        async move {
            let (reply, rx) = oneshot::channel();
            prices
                .send(PriceRequest { call, reply })
                .await
                .map_err(|_| anyhow!("order handler has stopped"))?;
            rx.await.context("order handler dropped price request")?
        }
    }
}

/// Starts the order handler.
///
/// ## Parameters
/// - `elev`: position and direction of the local elevator
/// - `goals_tx`: next goal for the elevator, sent whenever it may have changed
/// - `arrivals_rx`: orders the elevator has delivered
/// - `delivered_tx`: publisher on the `order-delivered` topic
///
/// ## Behaviour
/// - New order: resets the delayed counter if the queue was empty, then sends the new first
///   order of the sorted queue as goal.
/// - Arrival: removes every order equal to the arrival, resets the counter, publishes the
///   delivery repeatedly for a while and sends the next goal if there is one.
/// - Price request: [calc_price_from_queue] on the current queue, plus the delayed counter when
///   the queue is not empty.
///
/// ## Returns
/// The handle for adding orders and asking for prices, and the task handle.
pub fn start_order_handler<E: ElevatorState>(
    elev: E,
    floors: FloorConfig,
    cfg: OrderHandlerConfig,
    goals_tx: mpsc::Sender<Order>,
    mut arrivals_rx: mpsc::Receiver<Order>,
    delivered_tx: PubTx,
    log: Logger,
    mut quit: QuitRx,
) -> (OrderHandlerHandle, JoinHandle<anyhow::Result<()>>) {
    let (new_orders, mut new_orders_rx) = mpsc::channel::<Order>(64);
    let (prices, mut prices_rx) = mpsc::channel::<PriceRequest>(64);

    let handle = tokio::spawn(async move {
        let mut orders: Vec<Order> = Vec::new();
        let mut counter = delayed_counter::new(cfg.counter_delay, cfg.counter_tick);

        loop {
            tokio::select! {
                _ = quit.wait() => break,
                Some(order) = new_orders_rx.recv() => {
                    if orders.is_empty() {
                        counter.reset();
                    }
                    orders.push(order);
                    if !send_next_goal(&orders, &elev, floors, &goals_tx, &log).await? {
                        break;
                    }
                }
                Some(arrival) = arrivals_rx.recv() => {
                    let before = orders.len();
                    orders.retain(|o| o != &arrival);
                    if orders.len() < before {
                        log.call("Deleted order", &arrival.call);
                    }
                    counter.reset();

                    let payload = serial::encode(&arrival)?;
                    tokio::spawn(repeat_delivered(payload, delivered_tx.clone(), cfg));

                    if !orders.is_empty() && !send_next_goal(&orders, &elev, floors, &goals_tx, &log).await? {
                        break;
                    }
                }
                Some(req) = prices_rx.recv() => {
                    let price = price_with_penalty(&req.call, &orders, &elev, floors, &counter);
                    let _ = req.reply.send(price);
                }
            }
        }
        Ok(())
    });

    (OrderHandlerHandle { new_orders, prices }, handle)
}

fn price_with_penalty<E: ElevatorState>(
    call: &Call,
    orders: &[Order],
    elev: &E,
    floors: FloorConfig,
    counter: &DelayedCounter,
) -> anyhow::Result<i64> {
    let position = elev.position();
    let dir = resolve_dir(orders, position, elev.direction(), floors);
    let mut price = calc_price_from_queue(&Order::from(call.clone()), orders, position, dir, floors)?;
    if !orders.is_empty() {
        price += config::DELIVERY_DELAY_WEIGHT * counter.count();
    }
    Ok(price)
}

/// Sends the first order of the sorted queue to the elevator.
///
/// ## Returns
/// `Ok(false)` if the elevator is gone.
async fn send_next_goal<E: ElevatorState>(
    orders: &[Order],
    elev: &E,
    floors: FloorConfig,
    goals_tx: &mpsc::Sender<Order>,
    log: &Logger,
) -> anyhow::Result<bool> {
    let position = elev.position();
    let dir = resolve_dir(orders, position, elev.direction(), floors);
    let sorted = sort_orders(orders, position, dir, floors)?;
    let Some(goal) = sorted.into_iter().next() else {
        return Ok(true);
    };
    log.call("Set next goal", &goal.call);
    Ok(goals_tx.send(goal).await.is_ok())
}

/// Publishes a delivery every `delivered_repeat_period` until `delivered_repeat_for` has passed.
async fn repeat_delivered(payload: Vec<u8>, delivered_tx: PubTx, cfg: OrderHandlerConfig) {
    let deadline = sleep(cfg.delivered_repeat_for);
    tokio::pin!(deadline);
    let mut ticker = interval(cfg.delivered_repeat_period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = &mut deadline => return,
            _ = ticker.tick() => {
                if delivered_tx.send(payload.clone()).await.is_err() {
                    return;
                }
            }
        }
    }
}
