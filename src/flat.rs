//! Module implement the flat DN2ID layout.
//!
//! Every entry contributes records keyed by
//! `prefix + normalized-dn + NUL`:
//!
//! ```text
//! prefix  value
//! BASE    the entry's id, exact-DN lookup
//! ONE     id-set of the DN's children
//! SUB     id-set of the DN's subtree, inclusive of self
//! ```
//!
//! An add writes BASE and SUB for the entry itself, then ascends the
//! ancestor chain inserting the id into ONE of the parent and SUB of
//! each ancestor. In single-suffix mode the walk stops short of the
//! suffix, whose subtree is answered by the all-ids range instead. In
//! multiple-suffixes mode the walk carries on through the suffix to
//! the empty root DN. Delete mirrors add, in the same order.

use log::debug;

use std::sync::Arc;

use crate::{
    backend::Ctx,
    db::{decode_id, Dn2Id, Entry, EntryInfo, Prefix, ID, NOID},
    dn,
    idl::{CacheHit, Idl},
    store::{idl_delete_key, idl_fetch, idl_insert_key, PutMode, Txn},
    Error, Result,
};

/// Flat DN2ID index, refer module documentation for the on-disk
/// layout.
pub struct Flat {
    ctx: Arc<Ctx>,
}

impl Flat {
    pub(crate) fn new(ctx: Arc<Ctx>) -> Flat {
        Flat { ctx }
    }
}

// Key buffer with a sliding prefix window. The buffer is laid out as
// `_ + dn + NUL` and ascending the ancestor chain moves the single
// prefix byte backwards over the dn instead of copying keys. The
// ancestor whose dn starts at offset `off` takes the byte at
// `buf[off]` for its prefix.
struct KeyBuf {
    buf: Vec<u8>,
}

impl KeyBuf {
    fn new(dn: &[u8]) -> KeyBuf {
        let mut buf = Vec::with_capacity(dn.len() + 2);
        buf.push(0);
        buf.extend_from_slice(dn);
        buf.push(0);
        KeyBuf { buf }
    }

    fn key_at(&mut self, off: usize, prefix: Prefix) -> &[u8] {
        self.buf[off] = prefix.as_byte();
        &self.buf[off..]
    }
}

impl Flat {
    // invalidate the cache entry for an ONE/SUB key, strictly before
    // the store write that touches it.
    fn invalidate(&self, kb: &mut KeyBuf, off: usize, prefix: Prefix) -> Result<()> {
        if let Some(cache) = self.ctx.cache.as_ref() {
            cache.del(&self.ctx.db, kb.key_at(off, prefix))?;
        }
        Ok(())
    }

    // dn-offset of the parent of the ancestor starting at `off`. A
    // suffix steps to the empty root, which sits at `dn.len()`.
    fn parent_off(&self, dn: &[u8], off: usize) -> usize {
        let ptr = &dn[off..];
        if self.ctx.is_suffix(ptr) {
            dn.len()
        } else {
            match dn::parent_offset(ptr) {
                Some(rel) => off + rel,
                None => dn.len(),
            }
        }
    }

    // whether the ancestor walk is done with `ptr`, before writing
    // its SUB record. Single-suffix mode stops short of the suffix,
    // the all-ids range answers for it.
    fn walk_done(&self, ptr: &[u8]) -> bool {
        !self.ctx.multiple_suffixes && (self.ctx.is_suffix(ptr) || ptr.is_empty())
    }
}

impl Dn2Id for Flat {
    fn add(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()> {
        debug!(target: "flat  ", "add {:?} id {}", String::from_utf8_lossy(&e.nname), e.id);
        if e.id == NOID || e.id == 0 {
            err_at!(InvalidInput, msg: "add with reserved id {}", e.id)?;
        }

        let dn: &[u8] = e.nname.as_ref();
        let mut kb = KeyBuf::new(dn);

        let id_cell = e.id.to_be_bytes();
        let db = &self.ctx.db;

        txn.put(db, kb.key_at(0, Prefix::Base), &id_cell, PutMode::NoOverwrite)?;

        if self.ctx.multiple_suffixes || !self.ctx.is_suffix(dn) {
            self.invalidate(&mut kb, 0, Prefix::Sub)?;
            txn.put(db, kb.key_at(0, Prefix::Sub), &id_cell, PutMode::NoOverwrite)?;

            let poff = if eip.is_root() { dn.len() } else { self.parent_off(dn, 0) };
            self.invalidate(&mut kb, poff, Prefix::One)?;
            idl_insert_key(txn, db, kb.key_at(poff, Prefix::One), e.id)?;

            let mut off = poff;
            loop {
                let done = self.walk_done(&dn[off..]);
                if done {
                    break;
                }
                self.invalidate(&mut kb, off, Prefix::Sub)?;
                idl_insert_key(txn, db, kb.key_at(off, Prefix::Sub), e.id)?;
                if dn[off..].is_empty() {
                    break; // the true root, nothing above it
                }
                off = self.parent_off(dn, off);
            }
        }

        self.ctx.note_lastid(e.id);
        Ok(())
    }

    fn delete(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()> {
        debug!(target: "flat  ", "delete {:?} id {}", String::from_utf8_lossy(&e.nname), e.id);

        let dn: &[u8] = e.nname.as_ref();
        let mut kb = KeyBuf::new(dn);
        let db = &self.ctx.db;

        txn.del(db, kb.key_at(0, Prefix::Base))?;

        if self.ctx.multiple_suffixes || !self.ctx.is_suffix(dn) {
            self.invalidate(&mut kb, 0, Prefix::Sub)?;
            txn.del(db, kb.key_at(0, Prefix::Sub))?;

            let poff = if eip.is_root() { dn.len() } else { self.parent_off(dn, 0) };
            self.invalidate(&mut kb, poff, Prefix::One)?;
            idl_delete_key(txn, db, kb.key_at(poff, Prefix::One), e.id)?;

            let mut off = poff;
            loop {
                let done = self.walk_done(&dn[off..]);
                if done {
                    break;
                }
                self.invalidate(&mut kb, off, Prefix::Sub)?;
                idl_delete_key(txn, db, kb.key_at(off, Prefix::Sub), e.id)?;
                if dn[off..].is_empty() {
                    break;
                }
                off = self.parent_off(dn, off);
            }
        }

        Ok(())
    }

    fn lookup(
        &self,
        txn: Option<&Txn>,
        _eip: &EntryInfo,
        dn: &[u8],
        ei: &mut EntryInfo,
    ) -> Result<()> {
        let mut kb = KeyBuf::new(dn);
        let data = self.ctx.store.get(txn, &self.ctx.db, kb.key_at(0, Prefix::Base))?;
        ei.id = decode_id(&data)?;

        debug!(
            target: "flat  ",
            "lookup {:?} got id {}", String::from_utf8_lossy(dn), ei.id
        );
        Ok(())
    }

    fn parent_id(&self, txn: Option<&Txn>, ei: &mut EntryInfo, dn: &[u8]) -> Result<ID> {
        if self.ctx.is_suffix(dn) || dn::parent_offset(dn).is_none() {
            ei.parent = 0;
            return Ok(0);
        }

        let pdn = dn::dn_parent(dn);
        let mut kb = KeyBuf::new(pdn);
        let data = self.ctx.store.get(txn, &self.ctx.db, kb.key_at(0, Prefix::Base))?;
        ei.parent = decode_id(&data)?;
        Ok(ei.parent)
    }

    fn has_children(&self, txn: Option<&Txn>, e: &Entry) -> Result<bool> {
        let mut kb = KeyBuf::new(&e.nname);
        let db = &self.ctx.db;
        let key = kb.key_at(0, Prefix::One);

        if let Some(cache) = self.ctx.cache.as_ref() {
            match cache.get(db, key)? {
                Some(CacheHit::Idl(idl)) => return Ok(!idl.is_empty()),
                Some(CacheHit::NotFound) => return Ok(false),
                None => (),
            }
        }

        let (hit, idl) = match idl_fetch(&self.ctx.store, txn, db, key) {
            Ok(idl) => (!idl.is_empty(), Some(idl)),
            Err(Error::KeyNotFound(_, _)) => (false, None),
            Err(err) => return Err(err),
        };
        if let Some(cache) = self.ctx.cache.as_ref() {
            cache.put(db, key, idl.as_ref())?;
        }

        debug!(
            target: "flat  ",
            "children {:?} {}", String::from_utf8_lossy(&e.nname), hit
        );
        Ok(hit)
    }

    fn scope_idl(
        &self,
        txn: Option<&Txn>,
        _base: &EntryInfo,
        dn: &[u8],
        prefix: Prefix,
    ) -> Result<Idl> {
        if let Prefix::Base = prefix {
            err_at!(InvalidInput, msg: "scope wants one or sub")?;
        }

        // the sole suffix covers everything, no need to hit the store.
        if prefix == Prefix::Sub
            && !self.ctx.multiple_suffixes
            && self.ctx.is_suffix(dn)
        {
            return Ok(Idl::all(self.ctx.to_lastid()));
        }

        let mut kb = KeyBuf::new(dn);
        let idl = idl_fetch(&self.ctx.store, txn, &self.ctx.db, kb.key_at(0, prefix))?;

        debug!(
            target: "flat  ",
            "scope {} {:?} first {:?} last {:?}",
            prefix,
            String::from_utf8_lossy(dn),
            idl.first(),
            idl.last()
        );
        Ok(idl)
    }
}

#[cfg(test)]
#[path = "flat_test.rs"]
mod flat_test;
