//! Periodic full-state gossip of the ledger.

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

use super::store::LedgerStore;
use super::{pending_rows, LedgerError, LedgerSnapshot};
use crate::network::{serial, PubTx};
use crate::print::Logger;
use crate::shutdown::QuitRx;
use crate::types::NodeId;

const ZSTD_LEVEL: i32 = 1;

/// Serializes and compresses the whole store, tagged with `sender_id`.
pub fn pack(store: &LedgerStore, sender_id: &NodeId) -> Result<LedgerSnapshot, LedgerError> {
    let raw = store.snapshot()?;
    let payload = zstd::encode_all(raw.as_slice(), ZSTD_LEVEL).map_err(LedgerError::Compression)?;
    Ok(LedgerSnapshot { payload, sender_id: sender_id.clone() })
}

/// Decompresses a snapshot and opens it as a store of its own.
pub fn unpack(snapshot: &LedgerSnapshot) -> Result<LedgerStore, LedgerError> {
    let raw = zstd::decode_all(snapshot.payload.as_slice()).map_err(LedgerError::Compression)?;
    LedgerStore::open_snapshot(&raw)
}

/// Starts the gossip task.
///
/// Every `period` the store is packed and published on `gossip_tx`. With the `ledger` print
/// switch on, the pending entries are also printed as a table.
pub fn start_gossip(
    self_id: NodeId,
    store: LedgerStore,
    period: Duration,
    gossip_tx: PubTx,
    log: Logger,
    mut quit: QuitRx,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = quit.wait() => break,
                _ = ticker.tick() => {
                    let snapshot = pack(&store, &self_id)?;
                    if log.switches().ledger {
                        log.ledger(&pending_rows(&store)?);
                    }
                    if gossip_tx.send(serial::encode(&snapshot)?).await.is_err() {
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
    use crate::ledger::watcher::record;
    use crate::shutdown::Quit;
    use crate::types::{Bid, Call, CallDir};
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    fn filled_store() -> LedgerStore {
        let store = LedgerStore::in_memory().unwrap();
        let bid = Bid { call: Call::hall(2, CallDir::Up), price: 3, bidder_id: "node-a".to_string() };
        record(&store, &bid).unwrap();
        store
    }

    #[test]
    fn unpacked_snapshot_matches_store() {
        let store = filled_store();
        let snapshot = pack(&store, &"node-a".to_string()).unwrap();
        assert_eq!(snapshot.sender_id, "node-a");

        let copy = unpack(&snapshot).unwrap();
        assert_eq!(copy.snapshot().unwrap(), store.snapshot().unwrap());
    }

    #[test]
    fn corrupt_payload_is_an_error() {
        let snapshot = LedgerSnapshot { payload: vec![1, 2, 3, 4], sender_id: "x".into() };
        assert!(matches!(unpack(&snapshot), Err(LedgerError::Compression(_))));
    }

    #[tokio::test]
    async fn publishes_snapshot_every_period() {
        let quit = Quit::new();
        let (gossip_tx, mut gossip_rx) = mpsc::channel(8);
        let handle = start_gossip(
            "node-a".to_string(),
            filled_store(),
            Duration::from_millis(10),
            gossip_tx,
            Logger::silent(),
            quit.subscribe(),
        );

        for _ in 0..2 {
            let bytes = timeout(Duration::from_secs(1), gossip_rx.recv()).await.unwrap().unwrap();
            let snapshot: LedgerSnapshot = serial::decode(&bytes).unwrap();
            assert_eq!(snapshot.sender_id, "node-a");
            assert!(unpack(&snapshot).is_ok());
        }

        quit.raise();
        handle.await.unwrap().unwrap();
    }
}
