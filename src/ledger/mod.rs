//! ## Order ledger
//!
//! A replicated record of which node owns which call, used to notice nodes that stop delivering.
//!
//! ## Sub-modules
//! - [store]: the bucketed key-value store and its transactions, kept in a redb file.
//! - [watcher]: records acks, tombstones deliveries, resells stalled calls and merges gossip.
//! - [gossip]: periodically sends the whole store, compressed, to the other nodes.
//!
//! ## Layout
//! Hall calls live in the `hall-up` and `hall-down` buckets, cab calls in a bucket named after the
//! node they were placed in. The slot key is the floor. An empty slot is a tombstone.

pub mod gossip;
pub mod store;
pub mod watcher;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config;
use crate::types::{Call, CallDir, CallKind, NodeId};

pub use gossip::start_gossip;
pub use store::LedgerStore;
pub use watcher::{start_ledger, LedgerIo};

/// An assignment of a call to a node, as recorded in the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub owner_id: NodeId,
    pub assign_time: SystemTime,
    pub call: Call,
}

/// A compressed copy of one node's ledger, as sent on `ledger-gossip`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub payload: Vec<u8>,
    pub sender_id: NodeId,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("unknown ledger bucket {0}")]
    UnknownBucket(String),
    #[error("could not serialize ledger data")]
    Serialize(#[source] bincode::Error),
    #[error("could not decode ledger data")]
    Decode(#[source] bincode::Error),
    #[error("could not (de)compress ledger snapshot")]
    Compression(#[source] std::io::Error),
    #[error("ledger storage failed")]
    Storage(#[source] redb::Error),
    #[error("ledger store is closed")]
    Closed,
    #[error("ledger store lock is poisoned")]
    Poisoned,
}

/// Bucket a call is stored in.
///
/// `None` for a hall call without a direction or a cab call without an owner.
pub fn bucket_for(call: &Call) -> Option<String> {
    match (call.kind, call.dir) {
        (CallKind::Hall, CallDir::Up) => Some(config::HALL_UP_BUCKET.to_string()),
        (CallKind::Hall, CallDir::Down) => Some(config::HALL_DOWN_BUCKET.to_string()),
        (CallKind::Hall, CallDir::None) => None,
        (CallKind::Cab, _) => call.owner.clone(),
    }
}

/// Slot key of a call inside its bucket.
pub fn slot_for(call: &Call) -> String {
    call.floor.to_string()
}

pub fn encode_entry(entry: &LedgerEntry) -> Result<Vec<u8>, LedgerError> {
    bincode::serialize(entry).map_err(LedgerError::Serialize)
}

pub fn decode_entry(bytes: &[u8]) -> Result<LedgerEntry, LedgerError> {
    bincode::deserialize(bytes).map_err(LedgerError::Decode)
}

/// Every pending entry in `store` as `(bucket, slot, entry)`, for printing.
pub fn pending_rows(store: &LedgerStore) -> Result<Vec<(String, String, LedgerEntry)>, LedgerError> {
    store.view(|buckets| {
        let mut rows = Vec::new();
        for (bucket, slots) in buckets {
            for (slot, value) in slots {
                if value.is_empty() {
                    continue;
                }
                rows.push((bucket.clone(), slot.clone(), decode_entry(value)?));
            }
        }
        Ok(rows)
    })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calls_map_to_buckets() {
        assert_eq!(bucket_for(&Call::hall(1, CallDir::Up)).as_deref(), Some("hall-up"));
        assert_eq!(bucket_for(&Call::hall(1, CallDir::Down)).as_deref(), Some("hall-down"));
        assert_eq!(bucket_for(&Call::cab(1, "node-a")).as_deref(), Some("node-a"));
        assert_eq!(bucket_for(&Call::hall(1, CallDir::None)), None);
        assert_eq!(slot_for(&Call::cab(3, "node-a")), "3");
    }

    #[test]
    fn pending_rows_skip_tombstones() {
        let store = LedgerStore::in_memory().unwrap();
        let entry = LedgerEntry {
            owner_id: "node-a".into(),
            assign_time: SystemTime::now(),
            call: Call::hall(2, CallDir::Up),
        };
        let bytes = encode_entry(&entry).unwrap();
        store
            .update(|tx| {
                tx.put("hall-up", "2", &bytes)?;
                tx.put("hall-down", "1", &[])
            })
            .unwrap();

        let rows = pending_rows(&store).unwrap();
        assert_eq!(rows, vec![("hall-up".to_string(), "2".to_string(), entry)]);
    }
}
