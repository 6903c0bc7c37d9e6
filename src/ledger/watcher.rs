//! The ledger task: the only place the ledger store is written.

use std::time::{Duration, SystemTime};

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

use super::store::LedgerStore;
use super::{bucket_for, decode_entry, encode_entry, gossip, slot_for, LedgerEntry, LedgerError, LedgerSnapshot};
use crate::config::LedgerConfig;
use crate::network::{serial, SubRx};
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::types::{Ack, Bid, Call, NodeId, Order};

/// Topics the ledger listens on.
pub struct LedgerIo {
    pub ack_rx: SubRx,
    pub delivered_rx: SubRx,
    pub gossip_rx: SubRx,
}

/// Starts the ledger task.
///
/// ## Parameters
/// - `self_id`: snapshots sent by this node are not merged back in
/// - `store`: the ledger store, written only by this task
/// - `resale_tx`: input of this node's seller, for calls whose owner has stalled
///
/// ## Behaviour
/// - Ack, from any node: records the awarded call with `assign_time` now.
/// - Delivery: overwrites the slot of the call with a tombstone.
/// - Every `traversal_interval`: every entry older than its time to deliver, drawn as
///   `base_ttd` plus or minus up to `ttd_jitter`, is sent for resale and gets a fresh `assign_time`.
/// - Gossip from another node: merged in, see [merge].
///
/// A message that does not decode, or a store failure, ends the task with an error.
pub fn start_ledger(
    self_id: NodeId,
    store: LedgerStore,
    cfg: LedgerConfig,
    resale_tx: mpsc::Sender<Call>,
    io: LedgerIo,
    log: Logger,
    mut quit: QuitRx,
) -> JoinHandle<anyhow::Result<()>> {
    let LedgerIo { mut ack_rx, mut delivered_rx, mut gossip_rx } = io;

    tokio::spawn(async move {
        let mut traversal = interval(cfg.traversal_interval);
        traversal.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = quit.wait() => {
                    log.ok("And now my watch is ended", &[]);
                    break;
                }
                Some(bytes) = ack_rx.recv() => {
                    let ack: Ack = serial::decode(&bytes)?;
                    if !record(&store, &ack.bid)? {
                        log.warn("Ack for call without bucket", &[("floor", &ack.bid.call.floor)]);
                    }
                }
                Some(bytes) = delivered_rx.recv() => {
                    let order: Order = serial::decode(&bytes)?;
                    tombstone(&store, &order.call)?;
                }
                Some(bytes) = gossip_rx.recv() => {
                    let snapshot: LedgerSnapshot = serial::decode(&bytes)?;
                    if snapshot.sender_id == self_id {
                        continue;
                    }
                    let started = Instant::now();
                    let remote = gossip::unpack(&snapshot)?;
                    merge(&store, &remote)?;
                    log.ok("Received ledger and synced", &[("from", &snapshot.sender_id), ("took", &format!("{:?}", started.elapsed()))]);
                }
                _ = traversal.tick() => {
                    for call in take_stalled(&store, &cfg, SystemTime::now())? {
                        if resale_tx.send(call.clone()).await.is_err() {
                            return Ok(());
                        }
                        log.call("Sent order to seller for resale", &call);
                    }
                }
            }
        }
        Ok(())
    })
}

/// Records the call of `bid` as owned by its bidder, starting now.
///
/// ## Returns
/// `false` if the call has no bucket and nothing was written.
pub fn record(store: &LedgerStore, bid: &Bid) -> Result<bool, LedgerError> {
    let Some(bucket) = bucket_for(&bid.call) else {
        return Ok(false);
    };
    let entry = LedgerEntry {
        owner_id: bid.bidder_id.clone(),
        assign_time: SystemTime::now(),
        call: bid.call.clone(),
    };
    let value = encode_entry(&entry)?;
    store.update(|tx| {
        tx.create_bucket_if_not_exists(&bucket)?;
        tx.put(&bucket, &slot_for(&bid.call), &value)?;
        Ok(true)
    })
}

/// Marks the slot of `call` as delivered.
pub fn tombstone(store: &LedgerStore, call: &Call) -> Result<(), LedgerError> {
    let Some(bucket) = bucket_for(call) else {
        return Ok(());
    };
    store.update(|tx| {
        if tx.has_bucket(&bucket)? {
            tx.put(&bucket, &slot_for(call), &[])?;
        }
        Ok(())
    })
}

/// Copies every pending slot of `remote` into `store`, overwriting what is there.
///
/// Tombstones in `remote` are skipped: only a delivery seen by this node clears a slot.
pub fn merge(store: &LedgerStore, remote: &LedgerStore) -> Result<(), LedgerError> {
    let pending = remote.view(|buckets| {
        buckets
            .iter()
            .flat_map(|(bucket, slots)| {
                slots
                    .iter()
                    .filter(|(_, value)| !value.is_empty())
                    .map(move |(slot, value)| (bucket.clone(), slot.clone(), value.clone()))
            })
            .collect::<Vec<_>>()
    })?;

    store.update(|tx| {
        for (bucket, slot, value) in pending {
            tx.create_bucket_if_not_exists(&bucket)?;
            tx.put(&bucket, &slot, &value)?;
        }
        Ok(())
    })
}

/// Finds every entry that has outlived its time to deliver and restarts its clock.
///
/// ## Returns
/// The calls of those entries, to be sold again.
pub fn take_stalled(store: &LedgerStore, cfg: &LedgerConfig, now: SystemTime) -> Result<Vec<Call>, LedgerError> {
    let mut rng = rand::thread_rng();
    store.update(|tx| {
        let mut stalled = Vec::new();
        for name in tx.bucket_names()? {
            for (slot, value) in tx.slots(&name)? {
                if value.is_empty() {
                    continue;
                }
                let mut entry = decode_entry(&value)?;
                let ttd = jittered_ttd(cfg, &mut rng);
                let age = now.duration_since(entry.assign_time).unwrap_or(Duration::ZERO);
                if age < ttd {
                    continue;
                }
                entry.assign_time = now;
                tx.put(&name, &slot, &encode_entry(&entry)?)?;
                stalled.push(entry.call);
            }
        }
        Ok(stalled)
    })
}

fn jittered_ttd(cfg: &LedgerConfig, rng: &mut impl Rng) -> Duration {
    let jitter = cfg.ttd_jitter.as_millis() as i64;
    let offset = if jitter == 0 { 0 } else { rng.gen_range(-jitter..=jitter) };
    let ttd = cfg.base_ttd.as_millis() as i64 + offset;
    Duration::from_millis(ttd.max(0) as u64)
}
