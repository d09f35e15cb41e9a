use std::collections::HashMap;

use crate::{
    db::{Entry, EntryInfo, ID},
    Error, Result,
};

/// Chain walks refuse to go deeper than this many levels, a longer
/// chain means a cycle or a corrupted arena.
pub const MAX_TREE_DEPTH: usize = 256;

/// What [InfoArena::fix_dn] is asked to do with an entry's DN.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Fix {
    /// Unconditionally rebuild `name`/`nname` from the ancestor
    /// chain, for an entry fresh off the disk.
    Build,
    /// Only check whether a subtree rename left the DN stale, so the
    /// caller can take its lock before fixing.
    Probe,
    /// The caller holds its lock, rebuild if stale.
    Rebuild,
}

/// Arena of [EntryInfo] records, keyed by entry-id.
///
/// The in-memory info graph is a tree with parent back-pointers.
/// Rather than owning references both ways, each record names its
/// parent by id and this arena resolves them, the entry-id is the
/// natural index. The synthetic root above the suffixes is implicit
/// as id `0` and never stored.
#[derive(Default)]
pub struct InfoArena {
    infos: HashMap<ID, EntryInfo>,
}

impl InfoArena {
    pub fn new() -> InfoArena {
        InfoArena::default()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Add, or replace, the record for `info.id`.
    pub fn set(&mut self, info: EntryInfo) {
        self.infos.insert(info.id, info);
    }

    pub fn get(&self, id: ID) -> Option<&EntryInfo> {
        self.infos.get(&id)
    }

    pub fn remove(&mut self, id: ID) -> Option<EntryInfo> {
        self.infos.remove(&id)
    }

    /// Record a rename of entry `id`, bumping its `modrdns` counter.
    /// Descendants notice through [InfoArena::fix_dn], their own
    /// counters now lag the chain maximum.
    pub fn note_modrdn(&mut self, id: ID, rdn: &[u8], nrdn: &[u8]) -> Result<()> {
        match self.infos.get_mut(&id) {
            Some(info) => {
                info.rdn = rdn.to_vec();
                info.nrdn = nrdn.to_vec();
                info.modrdns += 1;
                Ok(())
            }
            None => err_at!(KeyNotFound, msg: "no entry-info {}", id),
        }
    }

    /// Construct, or repair, the full DN of entry `e` from its
    /// ancestor chain.
    ///
    /// With [Fix::Probe] returns `Ok(true)` when a subtree rename
    /// invalidated the entry's DN, without touching anything, and the
    /// caller is expected to come back with [Fix::Rebuild] under its
    /// lock. [Fix::Build] and [Fix::Rebuild] rewrite `e.name` and
    /// `e.nname` so they reflect the current chain, and return
    /// `Ok(false)`.
    pub fn fix_dn(&mut self, e: &mut Entry, fix: Fix) -> Result<bool> {
        let chain = self.to_chain(e.id)?;
        let max = chain.iter().map(|info| info.modrdns).max().unwrap_or(0);

        if fix != Fix::Build {
            let own = match chain.first() {
                Some(info) => info.modrdns,
                None => err_at!(KeyNotFound, msg: "no entry-info {}", e.id)?,
            };
            if own >= max {
                return Ok(false);
            }
            if fix == Fix::Probe {
                // mismatch found, tell the caller to lock it.
                return Ok(true);
            }
        }

        let mut name = Vec::with_capacity(64);
        let mut nname = Vec::with_capacity(64);
        for (i, info) in chain.iter().enumerate() {
            if i > 0 {
                name.push(b',');
                nname.push(b',');
            }
            name.extend_from_slice(&info.rdn);
            nname.extend_from_slice(&info.nrdn);
        }
        e.name = name;
        e.nname = nname;

        if let Some(info) = self.infos.get_mut(&e.id) {
            info.modrdns = max;
        }

        Ok(false)
    }

    // ancestor chain of `id`, self first, suffix-level entry last,
    // the synthetic root excluded.
    fn to_chain(&self, id: ID) -> Result<Vec<&EntryInfo>> {
        let mut chain = vec![];
        let mut cursor = id;
        while cursor != 0 {
            if chain.len() >= MAX_TREE_DEPTH {
                err_at!(Fatal, msg: "entry-info chain from {} too deep", id)?;
            }
            match self.infos.get(&cursor) {
                Some(info) => {
                    chain.push(info);
                    cursor = info.parent;
                }
                None => err_at!(KeyNotFound, msg: "no entry-info {}", cursor)?,
            }
        }
        Ok(chain)
    }
}

#[cfg(test)]
#[path = "info_test.rs"]
mod info_test;
