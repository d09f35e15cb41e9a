//! Module implement the backend facade, one DN2ID index over one
//! store, behind a chosen layout.

use cbordata::Cborize;
use log::info;

use std::sync::{
    atomic::{AtomicU32, Ordering::SeqCst},
    Arc,
};

use crate::{
    db::{Dn2Id, Entry, EntryInfo, Prefix, ID},
    dn,
    flat::Flat,
    hier::{dup_compare, Hier},
    idl::{Idl, IdlCache, IdlCacheStats},
    store::{Db, Mstore, MstoreStats, Txn},
    util, Error, Result,
};

const STATS_VER: u32 = 0x00020001;

/// Default bound on the idl-cache entry count.
pub const IDL_CACHE_SIZE: usize = 1024;

/// Which index organisation a backend runs on. A whole-database
/// attribute, switching layouts requires a reindex.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Layout {
    /// Entries keyed by `prefix + normalized-dn`, refer [Flat].
    Flat,
    /// Entries keyed by parent-id, refer [Hier].
    Hier,
}

impl Default for Layout {
    fn default() -> Layout {
        Layout::Flat
    }
}

/// Configuration for a DN2ID backend.
///
/// Configuration is used only while opening a backend, it is for the
/// caller to persist and to hand back unchanged, the index does not
/// write it anywhere.
#[derive(Clone, Debug)]
pub struct Config {
    /// Name of the backend, namespaces its database within the store.
    pub name: String,
    /// Index organisation.
    ///
    /// Default: [Layout::Flat]
    pub layout: Layout,
    /// Normalized DNs of the naming-context roots served by this
    /// backend, at least one.
    pub suffixes: Vec<Vec<u8>>,
    /// Carry ancestor walks through a suffix up to the true root, for
    /// backends serving nested naming-contexts. A whole-database
    /// attribute, flipping it requires a reindex.
    ///
    /// Default: false
    pub multiple_suffixes: bool,
    /// Bound on the idl-cache entry count, 0 disables the cache.
    ///
    /// Default: [IDL_CACHE_SIZE]
    pub idl_cache_size: usize,
    /// Optional bound on the total bytes held by the idl-cache.
    ///
    /// Default: None
    pub idl_cache_max_size: Option<usize>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            name: "dn2id".to_string(),
            layout: Layout::default(),
            suffixes: Vec::default(),
            multiple_suffixes: false,
            idl_cache_size: IDL_CACHE_SIZE,
            idl_cache_max_size: None,
        }
    }
}

impl Config {
    pub fn new(name: &str, suffixes: &[&[u8]]) -> Config {
        Config {
            name: name.to_string(),
            suffixes: suffixes.iter().map(|s| s.to_vec()).collect(),
            ..Config::default()
        }
    }

    pub fn set_layout(&mut self, layout: Layout) -> &mut Self {
        self.layout = layout;
        self
    }

    pub fn set_multiple_suffixes(&mut self, multiple: bool) -> &mut Self {
        self.multiple_suffixes = multiple;
        self
    }

    pub fn set_idl_cache(&mut self, size: usize, max_bytes: Option<usize>) -> &mut Self {
        self.idl_cache_size = size;
        self.idl_cache_max_size = max_bytes;
        self
    }
}

// shared state every layout handle hangs on to.
pub(crate) struct Ctx {
    pub(crate) store: Mstore,
    pub(crate) db: Db,
    pub(crate) suffixes: Vec<Vec<u8>>,
    pub(crate) multiple_suffixes: bool,
    pub(crate) cache: Option<IdlCache>,
    // high watermark of indexed ids, bounds the all-ids range.
    lastid: AtomicU32,
}

impl Ctx {
    pub(crate) fn is_suffix(&self, dn: &[u8]) -> bool {
        dn::is_suffix(dn, &self.suffixes)
    }

    pub(crate) fn note_lastid(&self, id: ID) {
        self.lastid.fetch_max(id, SeqCst);
    }

    pub(crate) fn to_lastid(&self) -> ID {
        self.lastid.load(SeqCst)
    }
}

enum Index {
    Flat(Flat),
    Hier(Hier),
}

/// Backend, one DN2ID index over one [Mstore].
///
/// All mutating operations join a caller-supplied transaction, the
/// backend never opens one of its own. The caller decides when to
/// commit and, on `Deadlock` from a contended store, aborts and
/// replays the whole operation.
pub struct Backend {
    config: Config,
    ctx: Arc<Ctx>,
    index: Index,
}

impl Backend {
    /// Open a backend over `store` as per `config`. The database is
    /// created on first open and re-opened otherwise, with the
    /// layout's duplicate comparator in place.
    pub fn open(store: Mstore, config: Config) -> Result<Backend> {
        if config.suffixes.is_empty() {
            err_at!(InvalidInput, msg: "backend without a suffix")?;
        }

        let db_name = format!("{}/dn2id", config.name);
        let db = match config.layout {
            Layout::Flat => store.open_db(&db_name, None)?,
            Layout::Hier => store.open_db(&db_name, Some(dup_compare))?,
        };

        let cache = match config.idl_cache_size {
            0 => None,
            size => Some(IdlCache::new(size, config.idl_cache_max_size)),
        };

        let ctx = Arc::new(Ctx {
            store,
            db,
            suffixes: config.suffixes.clone(),
            multiple_suffixes: config.multiple_suffixes,
            cache,
            lastid: AtomicU32::new(0),
        });

        let index = match config.layout {
            Layout::Flat => Index::Flat(Flat::new(Arc::clone(&ctx))),
            Layout::Hier => Index::Hier(Hier::new(Arc::clone(&ctx))),
        };

        info!(
            target: "dn2id ",
            "{:?}, opened {:?} layout with {} suffixes",
            config.name, config.layout, config.suffixes.len()
        );

        Ok(Backend { config, ctx, index })
    }

    /// Identify this backend.
    #[inline]
    pub fn to_name(&self) -> String {
        self.config.name.clone()
    }

    pub fn to_config(&self) -> Config {
        self.config.clone()
    }

    /// Begin a write transaction on the underlying store, convenience
    /// for callers holding only the backend.
    pub fn begin(&self) -> Result<Txn> {
        self.ctx.store.begin()
    }

    /// Seed the high watermark of indexed ids, for callers re-opening
    /// a store that already holds data. The watermark bounds the
    /// all-ids range and only ever grows.
    pub fn set_lastid(&self, id: ID) {
        self.ctx.note_lastid(id);
    }

    /// The layout behind this backend, as its [Dn2Id] contract.
    pub fn as_dn2id(&self) -> &dyn Dn2Id {
        match &self.index {
            Index::Flat(flat) => flat,
            Index::Hier(hier) => hier,
        }
    }

    /// Gather statistics from this backend.
    pub fn to_stats(&self) -> Result<Stats> {
        let idl_cache = match self.ctx.cache.as_ref() {
            Some(cache) => Some(cache.to_stats()?),
            None => None,
        };
        Ok(Stats {
            name: self.config.name.clone(),
            layout: format!("{:?}", self.config.layout),
            lastid: self.ctx.to_lastid(),
            store: self.ctx.store.to_stats()?,
            idl_cache,
        })
    }
}

impl Backend {
    /// Index the entry `e`, child of `eip`.
    pub fn dn2id_add(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()> {
        self.as_dn2id().add(txn, eip, e)
    }

    /// Remove the entry `e`, child of `eip`, from the index.
    pub fn dn2id_delete(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()> {
        self.as_dn2id().delete(txn, eip, e)
    }

    /// Resolve a normalized DN to its entry-id, filling `ei`.
    pub fn dn2id(
        &self,
        txn: Option<&Txn>,
        eip: &EntryInfo,
        dn: &[u8],
        ei: &mut EntryInfo,
    ) -> Result<()> {
        self.as_dn2id().lookup(txn, eip, dn, ei)
    }

    /// Recover the parent id of `ei`.
    pub fn dn2id_parent(&self, txn: Option<&Txn>, ei: &mut EntryInfo, dn: &[u8]) -> Result<ID> {
        self.as_dn2id().parent_id(txn, ei, dn)
    }

    /// Whether the entry has at least one child.
    pub fn dn2id_children(&self, txn: Option<&Txn>, e: &Entry) -> Result<bool> {
        self.as_dn2id().has_children(txn, e)
    }

    /// Id-set of a search scope anchored at `base`/`dn`.
    pub fn dn2id_idl(
        &self,
        txn: Option<&Txn>,
        base: &EntryInfo,
        dn: &[u8],
        prefix: Prefix,
    ) -> Result<Idl> {
        self.as_dn2id().scope_idl(txn, base, dn, prefix)
    }
}

/// Statistic type, to capture [Backend] metrics. Serializable with
/// [cbordata] for callers that persist them.
#[derive(Clone, Debug, Cborize)]
pub struct Stats {
    pub name: String,
    pub layout: String,
    pub lastid: ID,
    pub store: MstoreStats,
    pub idl_cache: Option<IdlCacheStats>,
}

impl Stats {
    const ID: u32 = STATS_VER;

    /// Serialize into cbor byte-string, for callers persisting
    /// statistics alongside their own state.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        util::into_cbor_bytes(self.clone())
    }

    /// Reverse of [Stats::to_bytes]. Return (value, bytes-consumed).
    pub fn from_bytes(data: &[u8]) -> Result<(Stats, usize)> {
        util::from_cbor_bytes(data)
    }
}

#[cfg(test)]
#[path = "backend_test.rs"]
mod backend_test;
