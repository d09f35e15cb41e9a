//! Traits and types required by rest of the dnidx-modules.

use std::fmt;

use crate::{idl::Idl, store::Txn, Error, Result};

mod info;

pub use info::{Fix, InfoArena, MAX_TREE_DEPTH};

/// Entry-id, a fixed-width unsigned integer handed out by the caller
/// when an entry is written.
pub type ID = u32;

/// Sentinel id marking "no such id", reserved, never assigned to an
/// entry. Id `0` is also reserved, for the synthetic root above the
/// naming-context suffixes.
pub const NOID: ID = ID::MAX;

// raw ID cell, big-endian on disk so byte order is id order.
pub(crate) fn decode_id(data: &[u8]) -> Result<ID> {
    use std::convert::TryFrom;

    match <[u8; 4]>::try_from(data) {
        Ok(bs) => Ok(ID::from_be_bytes(bs)),
        Err(_) => err_at!(Corrupt, msg: "id cell of {} bytes", data.len()),
    }
}

/// Prefix byte, selects which of the three flat-layout record families
/// a key addresses. Values are stable for the lifetime of a database.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Prefix {
    /// Exact-DN lookup, value is a single raw [ID].
    Base,
    /// Children of this DN, value is an id-set.
    One,
    /// Descendants of this DN, subtree inclusive of self, value is an
    /// id-set.
    Sub,
}

impl Prefix {
    pub fn as_byte(&self) -> u8 {
        match self {
            Prefix::Base => 0x00,
            Prefix::One => 0x01,
            Prefix::Sub => 0x02,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Prefix::Base => write!(f, "base"),
            Prefix::One => write!(f, "one"),
            Prefix::Sub => write!(f, "sub"),
        }
    }
}

/// The few fields of a directory entry this index consumes. The full
/// entry record, with its attributes, lives with the entry store and
/// is none of our business.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Entry {
    pub id: ID,
    /// Display DN.
    pub name: Vec<u8>,
    /// Normalized DN, produced by the schema engine.
    pub nname: Vec<u8>,
}

impl Entry {
    pub fn new(id: ID, name: &[u8], nname: &[u8]) -> Entry {
        Entry {
            id,
            name: name.to_vec(),
            nname: nname.to_vec(),
        }
    }
}

/// In-memory handle the index populates for one directory entry.
///
/// The index owns nothing in this record except `id`, `rdn` and
/// `nrdn`, which it writes when it looks a DN up. The `modrdns`
/// counter detects DNs gone stale after a subtree rename, refer
/// [InfoArena::fix_dn].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct EntryInfo {
    pub id: ID,
    /// Parent entry-id, `0` for a naming-context root.
    pub parent: ID,
    /// Display RDN.
    pub rdn: Vec<u8>,
    /// Normalized RDN.
    pub nrdn: Vec<u8>,
    /// Monotonic counter, bumped whenever this entry is renamed.
    pub modrdns: u32,
}

impl EntryInfo {
    pub fn new(id: ID, parent: ID, rdn: &[u8], nrdn: &[u8]) -> EntryInfo {
        EntryInfo {
            id,
            parent,
            rdn: rdn.to_vec(),
            nrdn: nrdn.to_vec(),
            modrdns: 0,
        }
    }

    /// The synthetic root above the naming-context suffixes.
    pub fn root() -> EntryInfo {
        EntryInfo::default()
    }

    pub fn is_root(&self) -> bool {
        self.id == 0
    }
}

/// Contract spoken by both index organisations, [crate::Flat] and
/// [crate::Hier].
///
/// Mutating operations join the caller's transaction, this index never
/// opens one of its own. Reads may pass `txn` as `None` for a
/// committed-snapshot read.
pub trait Dn2Id {
    /// Index the entry `e`, child of `eip`. Writes the records the
    /// layout calls for and fails with `KeyExists` when the DN is
    /// already indexed.
    fn add(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()>;

    /// Remove the entry `e`, child of `eip`, from the index. Exact
    /// mirror of [Dn2Id::add].
    fn delete(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()>;

    /// Resolve the normalized DN `dn`, a child of `eip`, and fill
    /// `ei` with the entry-id and, when the layout records them, the
    /// display and normalized RDN.
    fn lookup(
        &self,
        txn: Option<&Txn>,
        eip: &EntryInfo,
        dn: &[u8],
        ei: &mut EntryInfo,
    ) -> Result<()>;

    /// Recover the parent id of `ei`, filling in `ei.rdn`/`ei.nrdn`
    /// when the layout records them. The flat layout derives the
    /// answer from `dn`, the hierarchical layout ignores `dn` and
    /// reads its self-record.
    fn parent_id(&self, txn: Option<&Txn>, ei: &mut EntryInfo, dn: &[u8]) -> Result<ID>;

    /// Whether the entry has at least one child. A children-check
    /// finding none is `Ok(false)`, not an error.
    fn has_children(&self, txn: Option<&Txn>, e: &Entry) -> Result<bool>;

    /// Id-set of the requested scope anchored at `base`/`dn`,
    /// [Prefix::One] for immediate children, [Prefix::Sub] for the
    /// subtree inclusive of the base itself.
    fn scope_idl(
        &self,
        txn: Option<&Txn>,
        base: &EntryInfo,
        dn: &[u8],
        prefix: Prefix,
    ) -> Result<Idl>;
}
