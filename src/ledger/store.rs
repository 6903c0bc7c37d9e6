//! Bucketed key-value store behind the ledger, kept in a redb database.
//!
//! Every bucket is a table of slots keyed by decimal floor number. Values are bincode-encoded
//! [LedgerEntry](super::LedgerEntry)s, or empty for a tombstone.
//!
//! All writes happen inside [LedgerStore::update], one write transaction that is committed only
//! if the closure returns `Ok`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition, TableHandle, WriteTransaction};

use super::LedgerError;
use crate::config;

/// Slots of one bucket, as read out of the store.
pub type Bucket = BTreeMap<String, Vec<u8>>;
pub type Buckets = BTreeMap<String, Bucket>;

/// Handle to the store. Clones share the same database.
#[derive(Clone)]
pub struct LedgerStore {
    db: Arc<Mutex<Option<Database>>>,
}

/// Write transaction handed to an [LedgerStore::update] closure.
pub struct Tx<'a> {
    txn: &'a WriteTransaction,
}

fn storage(e: impl Into<redb::Error>) -> LedgerError {
    LedgerError::Storage(e.into())
}

fn slots_table(name: &str) -> TableDefinition<'_, &'static str, &'static [u8]> {
    TableDefinition::new(name)
}

impl LedgerStore {
    /// Opens the ledger file at `path`, creating it if needed.
    ///
    /// Entries written before a restart are still there, and are resold once their owner has had
    /// its time to deliver.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let db = Database::create(path).map_err(storage)?;
        LedgerStore::with_hall_buckets(db)
    }

    /// A store that lives only in memory.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage)?;
        LedgerStore::with_hall_buckets(db)
    }

    /// Opens bytes made by [LedgerStore::snapshot] as an in-memory store.
    pub fn open_snapshot(bytes: &[u8]) -> Result<Self, LedgerError> {
        let buckets: Buckets = bincode::deserialize(bytes).map_err(LedgerError::Decode)?;
        let store = LedgerStore::in_memory()?;
        store.update(|tx| {
            for (name, slots) in &buckets {
                tx.create_bucket_if_not_exists(name)?;
                for (slot, value) in slots {
                    tx.put(name, slot, value)?;
                }
            }
            Ok(())
        })?;
        Ok(store)
    }

    fn with_hall_buckets(db: Database) -> Result<Self, LedgerError> {
        let store = LedgerStore { db: Arc::new(Mutex::new(Some(db))) };
        store.update(|tx| {
            tx.create_bucket_if_not_exists(config::HALL_UP_BUCKET)?;
            tx.create_bucket_if_not_exists(config::HALL_DOWN_BUCKET)
        })?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Database>>, LedgerError> {
        self.db.lock().map_err(|_| LedgerError::Poisoned)
    }

    /// Runs `f` as one transaction. Nothing is written unless `f` returns `Ok`.
    pub fn update<R>(&self, f: impl FnOnce(&Tx<'_>) -> Result<R, LedgerError>) -> Result<R, LedgerError> {
        let guard = self.lock()?;
        let db = guard.as_ref().ok_or(LedgerError::Closed)?;
        let txn = db.begin_write().map_err(storage)?;
        let result = f(&Tx { txn: &txn });
        match result {
            Ok(out) => {
                txn.commit().map_err(storage)?;
                Ok(out)
            }
            Err(e) => {
                txn.abort().map_err(storage)?;
                Err(e)
            }
        }
    }

    /// Reads every bucket without writing.
    pub fn view<R>(&self, f: impl FnOnce(&Buckets) -> R) -> Result<R, LedgerError> {
        let buckets = self.read_all()?;
        Ok(f(&buckets))
    }

    /// The whole store, serialized.
    pub fn snapshot(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(&self.read_all()?).map_err(LedgerError::Serialize)
    }

    /// Closes the database. Every later call on any clone returns [LedgerError::Closed].
    pub fn close(&self) -> Result<(), LedgerError> {
        self.lock()?.take();
        Ok(())
    }

    fn read_all(&self) -> Result<Buckets, LedgerError> {
        let guard = self.lock()?;
        let db = guard.as_ref().ok_or(LedgerError::Closed)?;
        let read = db.begin_read().map_err(storage)?;

        let mut buckets = Buckets::new();
        for handle in read.list_tables().map_err(storage)? {
            let table = read.open_table(slots_table(handle.name())).map_err(storage)?;
            let mut slots = Bucket::new();
            for row in table.iter().map_err(storage)? {
                let (slot, value) = row.map_err(storage)?;
                slots.insert(slot.value().to_string(), value.value().to_vec());
            }
            buckets.insert(handle.name().to_string(), slots);
        }
        Ok(buckets)
    }
}

impl fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerStore").finish_non_exhaustive()
    }
}

impl Tx<'_> {
    pub fn create_bucket_if_not_exists(&self, name: &str) -> Result<(), LedgerError> {
        self.txn.open_table(slots_table(name)).map_err(storage)?;
        Ok(())
    }

    pub fn has_bucket(&self, name: &str) -> Result<bool, LedgerError> {
        Ok(self.bucket_names()?.iter().any(|b| b == name))
    }

    /// Writes one slot of an existing bucket.
    pub fn put(&self, bucket: &str, slot: &str, value: &[u8]) -> Result<(), LedgerError> {
        if !self.has_bucket(bucket)? {
            return Err(LedgerError::UnknownBucket(bucket.to_string()));
        }
        let mut table = self.txn.open_table(slots_table(bucket)).map_err(storage)?;
        table.insert(slot, value).map_err(storage)?;
        Ok(())
    }

    /// Every slot of `bucket`, ordered by key.
    pub fn slots(&self, bucket: &str) -> Result<Vec<(String, Vec<u8>)>, LedgerError> {
        if !self.has_bucket(bucket)? {
            return Err(LedgerError::UnknownBucket(bucket.to_string()));
        }
        let table = self.txn.open_table(slots_table(bucket)).map_err(storage)?;
        let mut slots = Vec::new();
        for row in table.iter().map_err(storage)? {
            let (slot, value) = row.map_err(storage)?;
            slots.push((slot.value().to_string(), value.value().to_vec()));
        }
        Ok(slots)
    }

    /// Names of every bucket, sorted.
    pub fn bucket_names(&self) -> Result<Vec<String>, LedgerError> {
        let mut names: Vec<String> = self
            .txn
            .list_tables()
            .map_err(storage)?
            .map(|handle| handle.name().to_string())
            .collect();
        names.sort();
        Ok(names)
    }
}
