use cbordata::Cborize;
use log::debug;

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use crate::{
    store::{bytes_dup_cmp, DupCmp, PutMode},
    Error, Result,
};

const STATS_VER: u32 = 0x00010001;

// Committed state. Values under a key are kept sorted by the
// database's duplicate comparator. An entry with an empty duplicate
// vector is a present key holding zero values, which is distinct from
// an absent key.
#[derive(Clone)]
struct Snapshot {
    seqno: u64,
    dbs: Vec<BTreeMap<Vec<u8>, Arc<Vec<Vec<u8>>>>>,
}

struct DbMeta {
    name: String,
    dupcmp: DupCmp,
}

/// Handle to a named database within an [Mstore].
#[derive(Clone, Debug)]
pub struct Db {
    pub(crate) id: usize,
    name: String,
}

impl Db {
    pub fn to_name(&self) -> String {
        self.name.clone()
    }
}

/// Mstore, in-memory ordered key/value store with duplicate-value
/// keys.
///
/// Readers work off copy-on-write snapshots and never block behind a
/// writer. Writers are serialised, [Mstore::begin] hands out one write
/// transaction at a time and the transaction publishes all of its
/// writes atomically on [Txn::commit]. A transaction sees its own
/// uncommitted writes, sees state committed before it began, and sees
/// nothing from a transaction that did not commit.
#[derive(Clone)]
pub struct Mstore {
    name: String,

    mu: Arc<Mutex<u32>>,
    inner: Arc<RwLock<Arc<Snapshot>>>,
    registry: Arc<RwLock<Vec<DbMeta>>>,
}

impl Mstore {
    pub fn new(name: &str) -> Mstore {
        let snapshot = Snapshot {
            seqno: 0,
            dbs: Vec::default(),
        };

        Mstore {
            name: name.to_string(),
            mu: Arc::new(Mutex::new(0)),
            inner: Arc::new(RwLock::new(Arc::new(snapshot))),
            registry: Arc::new(RwLock::new(Vec::default())),
        }
    }

    /// Identify this instance.
    #[inline]
    pub fn to_name(&self) -> String {
        self.name.clone()
    }

    /// Current sequence-no, incremented once for every committed
    /// write operation.
    pub fn to_seqno(&self) -> Result<u64> {
        Ok(self.read_snapshot()?.seqno)
    }

    /// Open, or re-open, the database `name`. The duplicate
    /// comparator decides sort order and equality of values stored
    /// under one key, plain byte order when `None`. The comparator is
    /// fixed at first open.
    pub fn open_db(&self, name: &str, dupcmp: Option<DupCmp>) -> Result<Db> {
        // same latch as transactions, an open must not interleave
        // with a concurrent commit.
        let _latch = match self.mu.lock() {
            Ok(latch) => latch,
            Err(err) => err_at!(RunRecovery, msg: "poisoned latch {}", err)?,
        };

        let mut registry = match self.registry.write() {
            Ok(registry) => registry,
            Err(err) => err_at!(RunRecovery, msg: "poisoned registry {}", err)?,
        };

        if let Some(id) = registry.iter().position(|m| m.name == name) {
            let db = Db { id, name: name.to_string() };
            return Ok(db);
        }

        let id = registry.len();
        registry.push(DbMeta {
            name: name.to_string(),
            dupcmp: dupcmp.unwrap_or(bytes_dup_cmp),
        });

        let mut snapshot = Snapshot::clone(&*self.read_snapshot()?);
        snapshot.dbs.push(BTreeMap::default());
        self.publish(snapshot)?;

        debug!(target: "mstore", "{:?}, opened db {:?}/{}", self.name, name, id);

        Ok(Db { id, name: name.to_string() })
    }

    /// Begin a write transaction. Only one write transaction is live
    /// at a time, a second call shall block until the first one
    /// commits or aborts.
    pub fn begin(&self) -> Result<Txn> {
        let _latch = match self.mu.lock() {
            Ok(latch) => latch,
            Err(err) => err_at!(RunRecovery, msg: "poisoned latch {}", err)?,
        };
        let base = self.read_snapshot()?;

        Ok(Txn {
            store: self,
            _latch,
            base,
            overlay: HashMap::default(),
            n_ops: 0,
        })
    }

    /// Fetch the first value under `key`. Pass the transaction to read
    /// its uncommitted writes, `None` reads the committed snapshot.
    pub fn get(&self, txn: Option<&Txn>, db: &Db, key: &[u8]) -> Result<Vec<u8>> {
        let dups = self.get_dups(txn, db, key)?;
        match dups.into_iter().next() {
            Some(value) => Ok(value),
            None => err_at!(KeyNotFound, msg: "{:?} empty key", db.name),
        }
    }

    /// Fetch every value under `key`, in duplicate-comparator order.
    /// A present key with zero values comes back as an empty vector,
    /// an absent key is `KeyNotFound`.
    pub fn get_dups(
        &self,
        txn: Option<&Txn>,
        db: &Db,
        key: &[u8],
    ) -> Result<Vec<Vec<u8>>> {
        if let Some(txn) = txn {
            if let Some(slot) = txn.overlay.get(&(db.id, key.to_vec())) {
                return match slot {
                    Some(dups) => Ok(dups.clone()),
                    None => err_at!(KeyNotFound, msg: "{:?} no key", db.name),
                };
            }
        }

        let snapshot = match txn {
            Some(txn) => Arc::clone(&txn.base),
            None => self.read_snapshot()?,
        };
        let map = match snapshot.dbs.get(db.id) {
            Some(map) => map,
            None => err_at!(InvalidInput, msg: "stale db handle {}", db.id)?,
        };
        match map.get(key) {
            Some(dups) => Ok(dups.as_ref().clone()),
            None => err_at!(KeyNotFound, msg: "{:?} no key", db.name),
        }
    }

    /// Open a duplicate cursor positioned on the first value under
    /// `key`, `KeyNotFound` when the key is absent or holds zero
    /// values.
    pub fn cursor(&self, txn: Option<&Txn>, db: &Db, key: &[u8]) -> Result<Cursor> {
        let dups = self.get_dups(txn, db, key)?;
        if dups.is_empty() {
            return err_at!(KeyNotFound, msg: "{:?} empty key", db.name);
        }

        Ok(Cursor {
            db: db.clone(),
            key: key.to_vec(),
            dupcmp: self.dupcmp_for(db.id)?,
            dups,
            pos: 0,
            dead: false,
        })
    }

    /// Gather statistics from this instance.
    pub fn to_stats(&self) -> Result<MstoreStats> {
        let snapshot = self.read_snapshot()?;
        let n_keys = snapshot.dbs.iter().map(|db| db.len()).sum();
        let n_values = snapshot
            .dbs
            .iter()
            .flat_map(|db| db.values())
            .map(|dups| dups.len())
            .sum();

        Ok(MstoreStats {
            name: self.name.clone(),
            seqno: snapshot.seqno,
            n_dbs: snapshot.dbs.len(),
            n_keys,
            n_values,
        })
    }

    fn read_snapshot(&self) -> Result<Arc<Snapshot>> {
        match self.inner.read() {
            Ok(inner) => Ok(Arc::clone(&inner)),
            Err(err) => err_at!(RunRecovery, msg: "poisoned snapshot {}", err),
        }
    }

    fn publish(&self, snapshot: Snapshot) -> Result<()> {
        match self.inner.write() {
            Ok(mut inner) => {
                *inner = Arc::new(snapshot);
                Ok(())
            }
            Err(err) => err_at!(RunRecovery, msg: "poisoned snapshot {}", err),
        }
    }

    fn dupcmp_for(&self, id: usize) -> Result<DupCmp> {
        let registry = match self.registry.read() {
            Ok(registry) => registry,
            Err(err) => err_at!(RunRecovery, msg: "poisoned registry {}", err)?,
        };
        match registry.get(id) {
            Some(meta) => Ok(meta.dupcmp),
            None => err_at!(InvalidInput, msg: "stale db handle {}", id),
        }
    }
}

/// Write transaction over an [Mstore].
///
/// Writes land in a private overlay and become visible to other
/// handles only at [Txn::commit]. Dropping the transaction without
/// committing aborts it.
pub struct Txn<'a> {
    store: &'a Mstore,
    _latch: MutexGuard<'a, u32>,
    base: Arc<Snapshot>,
    // key-granular overlay. `None` marks a key deleted wholesale,
    // `Some(dups)` the key's full duplicate vector after this txn's
    // writes.
    overlay: HashMap<(usize, Vec<u8>), Option<Vec<Vec<u8>>>>,
    n_ops: usize,
}

impl<'a> Txn<'a> {
    /// Store `value` under `key` as per `mode`, refer [PutMode].
    pub fn put(&mut self, db: &Db, key: &[u8], value: &[u8], mode: PutMode) -> Result<()> {
        let dupcmp = self.store.dupcmp_for(db.id)?;
        let slot = Self::slot(&self.base, &mut self.overlay, db.id, key);

        if let PutMode::NoOverwrite = mode {
            if slot.as_ref().map_or(false, |d| !d.is_empty()) {
                return err_at!(KeyExists, msg: "{:?} key exists", db.to_name());
            }
        }

        let dups = slot.get_or_insert_with(Vec::default);
        match dups.binary_search_by(|d| dupcmp(d, value)) {
            Ok(_) if mode == PutMode::NoDupData => {
                return err_at!(KeyExists, msg: "{:?} duplicate exists", db.to_name());
            }
            Ok(_) => (), // comparator-equal duplicate already in place
            Err(off) => dups.insert(off, value.to_vec()),
        }

        self.n_ops += 1;
        Ok(())
    }

    /// Delete `key` with every duplicate under it, `KeyNotFound` when
    /// absent.
    pub fn del(&mut self, db: &Db, key: &[u8]) -> Result<()> {
        let slot = Self::slot(&self.base, &mut self.overlay, db.id, key);
        match slot.take() {
            Some(_) => {
                self.n_ops += 1;
                Ok(())
            }
            None => err_at!(KeyNotFound, msg: "{:?} no key", db.to_name()),
        }
    }

    /// Delete the comparator-equal duplicate of `value` under `key`.
    /// Deleting an absent duplicate, or from an absent key, succeeds.
    /// Deleting the last duplicate leaves the key present with zero
    /// values.
    pub fn del_dup(&mut self, db: &Db, key: &[u8], value: &[u8]) -> Result<()> {
        let dupcmp = self.store.dupcmp_for(db.id)?;
        let slot = Self::slot(&self.base, &mut self.overlay, db.id, key);

        let dups = match slot.as_mut() {
            Some(dups) => dups,
            None => {
                // key absent, make sure it stays that way in the
                // overlay and report success.
                return Ok(());
            }
        };
        if let Ok(off) = dups.binary_search_by(|d| dupcmp(d, value)) {
            dups.remove(off);
            self.n_ops += 1;
        }
        Ok(())
    }

    /// Number of duplicates under `key`, `None` when the key is
    /// absent. The duplicate-cursor analogue of a count operation.
    pub fn dup_count(&self, db: &Db, key: &[u8]) -> Option<usize> {
        self.with_dups(db.id, key, |dups| dups.map(|d| d.len()))
    }

    /// First duplicate under `key` in comparator order, `None` when
    /// the key is absent or holds zero values.
    pub fn first_dup(&self, db: &Db, key: &[u8]) -> Option<Vec<u8>> {
        self.with_dups(db.id, key, |dups| dups.and_then(|d| d.first().cloned()))
    }

    /// Last duplicate under `key` in comparator order.
    pub fn last_dup(&self, db: &Db, key: &[u8]) -> Option<Vec<u8>> {
        self.with_dups(db.id, key, |dups| dups.and_then(|d| d.last().cloned()))
    }

    /// Publish this transaction's writes atomically. Return the
    /// store's sequence-no after the commit.
    pub fn commit(self) -> Result<u64> {
        let mut snapshot = Snapshot::clone(&self.base);
        snapshot.seqno += self.n_ops as u64;

        for ((db, key), slot) in self.overlay.into_iter() {
            let map = match snapshot.dbs.get_mut(db) {
                Some(map) => map,
                None => err_at!(InvalidInput, msg: "stale db handle {}", db)?,
            };
            match slot {
                Some(dups) => {
                    map.insert(key, Arc::new(dups));
                }
                None => {
                    map.remove(&key);
                }
            }
        }

        let seqno = snapshot.seqno;
        self.store.publish(snapshot)?;
        Ok(seqno)
    }

    /// Throw away this transaction's writes.
    pub fn abort(self) {
        // dropping the overlay and releasing the latch is all there
        // is to it.
    }

    // overlay slot for a key, faulted in from the base snapshot on
    // first touch so later writes mutate in place.
    fn slot<'t>(
        base: &Arc<Snapshot>,
        overlay: &'t mut HashMap<(usize, Vec<u8>), Option<Vec<Vec<u8>>>>,
        db: usize,
        key: &[u8],
    ) -> &'t mut Option<Vec<Vec<u8>>> {
        overlay.entry((db, key.to_vec())).or_insert_with(|| {
            let map = base.dbs.get(db)?;
            map.get(key).map(|dups| dups.as_ref().clone())
        })
    }

    // read-only view of a key's duplicates, overlay first, then the
    // transaction's base snapshot.
    fn with_dups<T>(
        &self,
        db: usize,
        key: &[u8],
        callb: impl FnOnce(Option<&[Vec<u8>]>) -> T,
    ) -> T {
        match self.overlay.get(&(db, key.to_vec())) {
            Some(Some(dups)) => callb(Some(dups)),
            Some(None) => callb(None),
            None => {
                let dups = self.base.dbs.get(db).and_then(|map| map.get(key));
                callb(dups.map(|d| d.as_slice()))
            }
        }
    }
}

/// Duplicate cursor pinned to one key, positioned on the first
/// duplicate at creation, refer [Mstore::cursor].
///
/// The cursor works off the state of the key at creation time, writes
/// made after it was opened are not reflected.
#[derive(Debug)]
pub struct Cursor {
    db: Db,
    key: Vec<u8>,
    dupcmp: DupCmp,
    dups: Vec<Vec<u8>>,
    pos: usize,
    dead: bool,
}

impl Cursor {
    /// Value under the cursor.
    pub fn value(&self) -> &[u8] {
        &self.dups[self.pos]
    }

    /// Step to the next duplicate, `KeyNotFound` past the last one.
    pub fn next_dup(&mut self) -> Result<&[u8]> {
        if self.dead || self.pos + 1 >= self.dups.len() {
            self.dead = true;
            return err_at!(KeyNotFound, msg: "cursor at end");
        }
        self.pos += 1;
        Ok(&self.dups[self.pos])
    }

    /// Batched read, up to `max` duplicates following the cursor
    /// position, stepping the cursor over them. `KeyNotFound` once
    /// exhausted.
    pub fn next_dup_batch(&mut self, max: usize) -> Result<Vec<Vec<u8>>> {
        if self.dead || self.pos + 1 >= self.dups.len() {
            self.dead = true;
            return err_at!(KeyNotFound, msg: "cursor at end");
        }
        let from = self.pos + 1;
        let upto = usize::min(from + max, self.dups.len());
        self.pos = upto - 1;
        Ok(self.dups[from..upto].to_vec())
    }

    /// Position the cursor on the duplicate comparator-equal to
    /// `data`, `KeyNotFound` when no such duplicate exists.
    pub fn get_both(&mut self, data: &[u8]) -> Result<&[u8]> {
        let dupcmp = self.dupcmp;
        match self.dups.binary_search_by(|d| dupcmp(d, data)) {
            Ok(off) => {
                self.pos = off;
                self.dead = false;
                Ok(&self.dups[self.pos])
            }
            Err(_) => err_at!(KeyNotFound, msg: "no matching duplicate"),
        }
    }

    /// Delete the duplicate under the cursor through `txn`. The
    /// cursor is exhausted afterwards.
    pub fn del_current(&mut self, txn: &mut Txn) -> Result<()> {
        let value = self.dups[self.pos].clone();
        txn.del_dup(&self.db, &self.key, &value)?;
        self.dead = true;
        Ok(())
    }
}

/// Statistics for [Mstore], a snapshot in time.
#[derive(Clone, Debug, Cborize)]
pub struct MstoreStats {
    pub name: String,
    pub seqno: u64,
    pub n_dbs: usize,
    pub n_keys: usize,
    pub n_values: usize,
}

impl MstoreStats {
    const ID: u32 = STATS_VER;
}

#[cfg(test)]
#[path = "mstore_test.rs"]
mod mstore_test;
