use std::env;
use std::io::BufRead;
use std::process::ExitCode;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use elevatormarket::auction::{start_buyer, start_seller, BuyerIo, SellerIo};
use elevatormarket::config::{self, LedgerConfig, OrderHandlerConfig, SellerConfig};
use elevatormarket::elevator::{parse_button, start_simulated_elevator};
use elevatormarket::init;
use elevatormarket::ledger::{start_gossip, start_ledger, LedgerIo, LedgerStore};
use elevatormarket::network::{start_publisher, start_subscriber, Channel, PubTx, SubRx, Topic};
use elevatormarket::print::Logger;
use elevatormarket::scheduler::start_order_handler;
use elevatormarket::shutdown::{self, Quit};
use elevatormarket::types::{Call, NodeId};

type Tasks = Vec<(&'static str, JoinHandle<anyhow::Result<()>>)>;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let run_cfg = init::parse_args(env::args().skip(1))?;
    if run_cfg.help {
        init::print_help();
        return Ok(());
    }
    let floors = run_cfg.floors;
    let log = Logger::new(run_cfg.print);
    let self_id = init::resolve_node_id(run_cfg.node_id, &log);
    log.info("Starter hovedprosess...", &[("id", &self_id), ("floors", &floors.num), ("bottom", &floors.bottom)]);

    let store = LedgerStore::open(&run_cfg.db_path)
        .with_context(|| format!("could not open ledger {}", run_cfg.db_path))?;

    let quit = Quit::new();
    let mut tasks: Tasks = Vec::new();

    /* START ----------- Transport ---------------------- */
    let net_log = log.module("NETWORK");
    let sales_tx = publish(Topic::Sales, "sales publisher", &net_log, &quit, &mut tasks)?;
    let sold_to_tx = publish(Topic::SoldTo, "sold-to publisher", &net_log, &quit, &mut tasks)?;
    let bid_tx = publish(Topic::Bid, "bid publisher", &net_log, &quit, &mut tasks)?;
    let ack_tx = publish(Topic::Ack, "ack publisher", &net_log, &quit, &mut tasks)?;
    let delivered_tx = publish(Topic::OrderDelivered, "order-delivered publisher", &net_log, &quit, &mut tasks)?;
    let gossip_tx = publish(Topic::LedgerGossip, "ledger-gossip publisher", &net_log, &quit, &mut tasks)?;

    let sales_rx = subscribe(Topic::Sales, "sales subscriber", &net_log, &quit, &mut tasks)?;
    let sold_to_rx = subscribe(Topic::SoldTo, "sold-to subscriber", &net_log, &quit, &mut tasks)?;
    let bid_rx = subscribe(Topic::Bid, "bid subscriber", &net_log, &quit, &mut tasks)?;
    // Selgar og ledger treng kvar sin kopi av ack-ane
    let seller_ack_rx = subscribe(Topic::Ack, "ack subscriber (seller)", &net_log, &quit, &mut tasks)?;
    let ledger_ack_rx = subscribe(Topic::Ack, "ack subscriber (ledger)", &net_log, &quit, &mut tasks)?;
    let delivered_rx = subscribe(Topic::OrderDelivered, "order-delivered subscriber", &net_log, &quit, &mut tasks)?;
    let gossip_rx = subscribe(Topic::LedgerGossip, "ledger-gossip subscriber", &net_log, &quit, &mut tasks)?;
    /* SLUTT ----------- Transport ---------------------- */

    /* START ----------- Heis og ordrehandtering ---------------------- */
    let (goals_tx, goals_rx) = mpsc::channel(16);
    let (arrivals_tx, arrivals_rx) = mpsc::channel(16);
    let (motion, elevator_task) = start_simulated_elevator(
        floors,
        floors.bottom,
        config::SIM_STEP_PERIOD,
        goals_rx,
        arrivals_tx,
        log.module("ELEVATOR"),
        quit.subscribe(),
    );
    tasks.push(("elevator", elevator_task));

    let (order_handler, order_handler_task) = start_order_handler(
        motion,
        floors,
        OrderHandlerConfig::default(),
        goals_tx,
        arrivals_rx,
        delivered_tx,
        log.module("ORDERS"),
        quit.subscribe(),
    );
    tasks.push(("order handler", order_handler_task));
    /* SLUTT ----------- Heis og ordrehandtering ---------------------- */

    /* START ----------- Auksjon ---------------------- */
    let (calls_tx, calls_rx) = mpsc::channel::<Call>(64);
    let seller_task = start_seller(
        SellerConfig::default(),
        calls_rx,
        SellerIo { sales_tx, sold_to_tx, bid_rx, ack_rx: seller_ack_rx },
        log.module("SELLER"),
        quit.subscribe(),
    );
    tasks.push(("seller", seller_task));

    let buyer_task = start_buyer(
        self_id.clone(),
        floors,
        order_handler.clone(),
        order_handler.order_sender(),
        BuyerIo { sales_rx, sold_to_rx, bid_tx, ack_tx },
        log.module("BUYER"),
        quit.subscribe(),
    );
    tasks.push(("buyer", buyer_task));
    /* SLUTT ----------- Auksjon ---------------------- */

    /* START ----------- Ledger ---------------------- */
    let ledger_cfg = LedgerConfig::default();
    let ledger_task = start_ledger(
        self_id.clone(),
        store.clone(),
        ledger_cfg,
        calls_tx.clone(),
        LedgerIo { ack_rx: ledger_ack_rx, delivered_rx, gossip_rx },
        log.module("LEDGER"),
        quit.subscribe(),
    );
    tasks.push(("ledger", ledger_task));

    let gossip_task = start_gossip(
        self_id.clone(),
        store.clone(),
        ledger_cfg.gossip_interval,
        gossip_tx,
        log.module("GOSSIP"),
        quit.subscribe(),
    );
    tasks.push(("gossip", gossip_task));
    /* SLUTT ----------- Ledger ---------------------- */

    spawn_button_reader(self_id, calls_tx, log.module("BUTTONS"));
    log.ok("All tasks started, type `hall <floor> up|down` or `cab <floor>`", &[]);

    let early_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("could not listen for Ctrl-C")?;
            log.info("Ctrl-C, shutting down", &[]);
            None
        }
        (name, result) = shutdown::first_exit(&mut tasks) => {
            log.err("Task stopped on its own, shutting down", &[("task", &name)]);
            Some(result.with_context(|| format!("task {} failed", name)))
        }
    };

    quit.raise();
    let joined = shutdown::rendezvous(tasks, &log).await;
    store.close()?;
    log.ok("Ledger closed", &[]);

    match early_exit {
        Some(Err(e)) => Err(e),
        Some(Ok(())) => joined.and_then(|()| Err(anyhow::anyhow!("a task stopped before shutdown"))),
        None => joined,
    }
}

fn publish(topic: Topic, name: &'static str, log: &Logger, quit: &Quit, tasks: &mut Tasks) -> anyhow::Result<PubTx> {
    let (tx, handle) = start_publisher(Channel::new(topic), log.clone(), quit.subscribe())
        .with_context(|| format!("could not start {}", name))?;
    tasks.push((name, handle));
    Ok(tx)
}

fn subscribe(topic: Topic, name: &'static str, log: &Logger, quit: &Quit, tasks: &mut Tasks) -> anyhow::Result<SubRx> {
    let (rx, handle) = start_subscriber(Channel::new(topic), log.clone(), quit.subscribe())
        .with_context(|| format!("could not start {}", name))?;
    tasks.push((name, handle));
    Ok(rx)
}

/// Reads button presses from the terminal on a thread of its own, and hands them to the seller.
///
/// The thread is not joined at shutdown: it is blocked on stdin and ends with the process.
fn spawn_button_reader(self_id: NodeId, calls_tx: mpsc::Sender<Call>, log: Logger) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match parse_button(&line, &self_id) {
                Some(call) => {
                    log.call("Button pressed", &call);
                    if calls_tx.blocking_send(call).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => log.warn("Unknown button", &[("line", &line)]),
            }
        }
    });
}
