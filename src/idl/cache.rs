use cbordata::Cborize;
use log::debug;

use std::{
    collections::{BTreeMap, HashMap},
    fmt, result,
    sync::Mutex,
};

use crate::{idl::Idl, store::Db, Error, Result};

// key = (database, raw key bytes)
type CacheKey = (usize, Vec<u8>);

struct CacheSlot {
    // `None` is the negative sentinel, the key is known absent and
    // readers can skip the store lookup.
    idl: Option<Idl>,
    bytes: usize,
    tick: u64,
}

struct Inner {
    slots: HashMap<CacheKey, CacheSlot>,
    order: BTreeMap<u64, CacheKey>, // tick -> key, oldest first
    tick: u64,
    n_bytes: usize,
    n_hits: usize,
    n_misses: usize,
    n_evicted: usize,
}

/// What a cache probe came back with.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CacheHit {
    /// The id-set cached for this key.
    Idl(Idl),
    /// Negative sentinel, the key was absent last time the store was
    /// asked.
    NotFound,
}

/// Bounded in-memory cache of `(db, key) -> Idl`, shared by every
/// handle of a backend.
///
/// Writers invalidate with [IdlCache::del] strictly *before* the
/// store write, a reader racing the write either misses and reads
/// through, or sees stale-but-committed state, never a ghost of a
/// write that later aborted.
pub struct IdlCache {
    max_entries: usize,
    max_bytes: Option<usize>,
    inner: Mutex<Inner>,
}

impl IdlCache {
    /// `max_entries` bounds the entry count, must be non-zero.
    /// `max_bytes` optionally bounds the total footprint of cached
    /// id-sets.
    pub fn new(max_entries: usize, max_bytes: Option<usize>) -> IdlCache {
        let inner = Inner {
            slots: HashMap::default(),
            order: BTreeMap::default(),
            tick: 0,
            n_bytes: 0,
            n_hits: 0,
            n_misses: 0,
            n_evicted: 0,
        };

        IdlCache {
            max_entries: usize::max(max_entries, 1),
            max_bytes,
            inner: Mutex::new(inner),
        }
    }

    /// Probe for `(db, key)`. `None` is a plain miss, the caller
    /// reads through and may [IdlCache::put] what it found.
    pub fn get(&self, db: &Db, key: &[u8]) -> Result<Option<CacheHit>> {
        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;

        let ck = (db.id, key.to_vec());
        let (hit, old) = match inner.slots.get_mut(&ck) {
            Some(slot) => {
                let old = slot.tick;
                slot.tick = tick;
                let hit = match &slot.idl {
                    Some(idl) => CacheHit::Idl(idl.clone()),
                    None => CacheHit::NotFound,
                };
                (hit, old)
            }
            None => {
                inner.n_misses += 1;
                return Ok(None);
            }
        };
        inner.order.remove(&old);
        inner.order.insert(tick, ck);
        inner.n_hits += 1;
        Ok(Some(hit))
    }

    /// Cache the outcome of a store fetch, `Some` with the id-set, or
    /// `None` to record that the key is absent.
    pub fn put(&self, db: &Db, key: &[u8], idl: Option<&Idl>) -> Result<()> {
        let bytes = key.len() + idl.map(|idl| idl.size_of()).unwrap_or(4);

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.tick += 1;
        let tick = inner.tick;

        let ck = (db.id, key.to_vec());
        let slot = CacheSlot { idl: idl.cloned(), bytes, tick };
        if let Some(old) = inner.slots.insert(ck.clone(), slot) {
            inner.order.remove(&old.tick);
            inner.n_bytes -= old.bytes;
        }
        inner.order.insert(tick, ck);
        inner.n_bytes += bytes;

        self.evict(inner);
        Ok(())
    }

    /// Drop the entry for `(db, key)`, called before every store
    /// write touching the key. Dropping an uncached key succeeds.
    pub fn del(&self, db: &Db, key: &[u8]) -> Result<()> {
        let mut inner = self.lock()?;
        let ck = (db.id, key.to_vec());
        if let Some(slot) = inner.slots.remove(&ck) {
            inner.order.remove(&slot.tick);
            inner.n_bytes -= slot.bytes;
        }
        Ok(())
    }

    /// Gather statistics from this instance.
    pub fn to_stats(&self) -> Result<IdlCacheStats> {
        let inner = self.lock()?;
        Ok(IdlCacheStats {
            n_entries: inner.slots.len(),
            n_bytes: inner.n_bytes,
            n_hits: inner.n_hits,
            n_misses: inner.n_misses,
            n_evicted: inner.n_evicted,
        })
    }

    fn evict(&self, inner: &mut Inner) {
        loop {
            let over_count = inner.slots.len() > self.max_entries;
            let over_bytes = self.max_bytes.map_or(false, |max| inner.n_bytes > max);
            if !(over_count || over_bytes) || inner.slots.is_empty() {
                break;
            }

            let tick = match inner.order.keys().next() {
                Some(tick) => *tick,
                None => break,
            };
            if let Some(ck) = inner.order.remove(&tick) {
                if let Some(slot) = inner.slots.remove(&ck) {
                    inner.n_bytes -= slot.bytes;
                    inner.n_evicted += 1;
                    debug!(target: "idlch ", "evicted key of {} bytes", slot.bytes);
                }
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<Inner>> {
        match self.inner.lock() {
            Ok(inner) => Ok(inner),
            Err(err) => err_at!(RunRecovery, msg: "poisoned idl-cache {}", err),
        }
    }
}

const STATS_VER: u32 = 0x00030001;

/// Statistic type, to capture [IdlCache] metrics.
#[derive(Clone, Debug, Default, Cborize)]
pub struct IdlCacheStats {
    pub n_entries: usize,
    pub n_bytes: usize,
    pub n_hits: usize,
    pub n_misses: usize,
    pub n_evicted: usize,
}

impl IdlCacheStats {
    const ID: u32 = STATS_VER;
}

impl fmt::Display for IdlCacheStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(
            f,
            "{{ n_entries = {}, n_bytes = {}, n_hits = {}, n_misses = {}, n_evicted = {} }}",
            self.n_entries, self.n_bytes, self.n_hits, self.n_misses, self.n_evicted,
        )
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod cache_test;
