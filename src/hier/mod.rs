//! Module implement the hierarchical DN2ID layout.
//!
//! Instead of keying every record by its full DN, each entry is
//! keyed by its parent's id. All children of a node sit under one key
//! as duplicate values sorted by normalized rdn, refer
//! [dup_compare]. The first duplicate under a node's own key is its
//! self-record, carrying the parent's id with the rdn-length negated
//! so it sorts ahead of every child, which buys bottom-up traversal
//! without a separate parent-pointer table.
//!
//! Subtree id-sets are gathered by walking the tree key by key,
//! caching each node's children set on the way. Full DNs are not
//! stored at all, they are reconstructed from the in-memory info
//! chain, and [crate::InfoArena::fix_dn] repairs them after a
//! subtree rename.

mod node;

pub use node::dup_compare;
pub(crate) use node::DiskNode;

use log::{debug, error};

use std::sync::Arc;

use crate::{
    backend::Ctx,
    db::{decode_id, Dn2Id, Entry, EntryInfo, Prefix, ID, NOID},
    dn,
    idl::{CacheHit, Idl},
    store::{PutMode, Txn},
    Error, Result,
};

// duplicates fetched per batched cursor read while walking a scope.
const SCOPE_BATCH: usize = 1024;

/// Hierarchical DN2ID index, refer module documentation for the
/// on-disk layout.
pub struct Hier {
    ctx: Arc<Ctx>,
}

impl Hier {
    pub(crate) fn new(ctx: Arc<Ctx>) -> Hier {
        Hier { ctx }
    }

    fn invalidate(&self, key: &[u8]) -> Result<()> {
        if let Some(cache) = self.ctx.cache.as_ref() {
            cache.del(&self.ctx.db, key)?;
        }
        Ok(())
    }

    // split display and normalized rdn off the entry's DNs. A
    // naming-context root keeps its full DNs.
    fn to_rdns<'a>(&self, e: &'a Entry) -> (&'a [u8], &'a [u8]) {
        let nrlen = dn::rdn_len(&e.nname, &self.ctx.suffixes);
        if nrlen == 0 {
            (e.name.as_ref(), e.nname.as_ref())
        } else {
            let rlen = match dn::parent_offset(&e.name) {
                Some(off) => off - 1,
                None => e.name.len(),
            };
            (&e.name[..rlen], &e.nname[..nrlen])
        }
    }
}

impl Dn2Id for Hier {
    fn add(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()> {
        debug!(target: "hier  ", "add {:?} id {}", String::from_utf8_lossy(&e.nname), e.id);
        if e.id == NOID || e.id == 0 {
            err_at!(InvalidInput, msg: "add with reserved id {}", e.id)?;
        }

        let (rdn, nrdn) = self.to_rdns(e);
        let db = &self.ctx.db;

        // child record under the parent's key.
        let pkey = eip.id.to_be_bytes();
        let node = DiskNode::Child {
            id: e.id,
            nrdn: nrdn.to_vec(),
            rdn: rdn.to_vec(),
        };
        let mut data = vec![];
        node.encode(&mut data)?;

        self.invalidate(&pkey)?;
        txn.put(db, &pkey, &data, PutMode::NoDupData)?;

        // self record under the entry's own key, pointing back at the
        // parent.
        let okey = e.id.to_be_bytes();
        let node = DiskNode::Own {
            parent: eip.id,
            nrdn: nrdn.to_vec(),
            rdn: rdn.to_vec(),
        };
        let mut data = vec![];
        node.encode(&mut data)?;

        self.invalidate(&okey)?;
        txn.put(db, &okey, &data, PutMode::NoDupData)?;

        self.ctx.note_lastid(e.id);
        Ok(())
    }

    fn delete(&self, txn: &mut Txn, eip: &EntryInfo, e: &Entry) -> Result<()> {
        debug!(target: "hier  ", "delete {:?} id {}", String::from_utf8_lossy(&e.nname), e.id);

        let (_rdn, nrdn) = self.to_rdns(e);
        let db = &self.ctx.db;

        let pkey = eip.id.to_be_bytes();
        let okey = e.id.to_be_bytes();
        self.invalidate(&pkey)?;
        self.invalidate(&okey)?;

        // our record off the parent's duplicate list.
        let probe = DiskNode::probe(nrdn)?;
        let mut cur = self.ctx.store.cursor(Some(&*txn), db, &pkey)?;
        cur.get_both(&probe)?;
        cur.del_current(txn)?;

        // our self-record, the first duplicate under our own key.
        // child records staying behind is intentional, a rename
        // replays add which rewrites the parent pointer.
        let mut cur = self.ctx.store.cursor(Some(&*txn), db, &okey)?;
        cur.del_current(txn)?;

        Ok(())
    }

    fn lookup(
        &self,
        txn: Option<&Txn>,
        eip: &EntryInfo,
        dn: &[u8],
        ei: &mut EntryInfo,
    ) -> Result<()> {
        let nrlen = match dn::rdn_len(dn, &self.ctx.suffixes) {
            0 => dn.len(),
            nrlen => nrlen,
        };

        let pkey = eip.id.to_be_bytes();
        let probe = DiskNode::probe(&dn[..nrlen])?;
        let mut cur = self.ctx.store.cursor(txn, &self.ctx.db, &pkey)?;
        let data = cur.get_both(&probe)?;

        match DiskNode::decode(data)? {
            DiskNode::Child { id, nrdn, rdn } => {
                ei.id = id;
                ei.parent = eip.id;
                ei.nrdn = nrdn;
                ei.rdn = rdn;
            }
            DiskNode::Own { .. } => {
                error!(target: "hier  ", "own record matched a child probe");
                err_at!(Corrupt, msg: "own record matched a child probe")?;
            }
        }

        debug!(
            target: "hier  ",
            "lookup {:?} got id {}", String::from_utf8_lossy(dn), ei.id
        );
        Ok(())
    }

    fn parent_id(&self, txn: Option<&Txn>, ei: &mut EntryInfo, _dn: &[u8]) -> Result<ID> {
        let okey = ei.id.to_be_bytes();
        let cur = self.ctx.store.cursor(txn, &self.ctx.db, &okey)?;

        // the first duplicate is the self-record, negative lengths
        // sort ahead of any child. Anything else means the index
        // cannot be trusted.
        match DiskNode::decode(cur.value())? {
            DiskNode::Own { parent, nrdn, rdn } => {
                ei.parent = parent;
                ei.nrdn = nrdn;
                ei.rdn = rdn;
                Ok(parent)
            }
            DiskNode::Child { .. } => {
                error!(target: "hier  ", "first duplicate of {} not a self-record", ei.id);
                err_at!(Corrupt, msg: "first duplicate of {} not a self-record", ei.id)
            }
        }
    }

    fn has_children(&self, txn: Option<&Txn>, e: &Entry) -> Result<bool> {
        let okey = e.id.to_be_bytes();
        let db = &self.ctx.db;

        if let Some(cache) = self.ctx.cache.as_ref() {
            match cache.get(db, &okey)? {
                Some(CacheHit::Idl(idl)) => return Ok(!idl.is_empty()),
                Some(CacheHit::NotFound) => return Ok(false),
                None => (),
            }
        }

        // a second duplicate past the self-record proves a child.
        let hit = match self.ctx.store.cursor(txn, db, &okey) {
            Ok(mut cur) => cur.next_dup().is_ok(),
            Err(Error::KeyNotFound(_, _)) => false,
            Err(err) => return Err(err),
        };

        debug!(target: "hier  ", "children of {} {}", e.id, hit);
        Ok(hit)
    }

    fn scope_idl(
        &self,
        txn: Option<&Txn>,
        base: &EntryInfo,
        _dn: &[u8],
        prefix: Prefix,
    ) -> Result<Idl> {
        if let Prefix::Base = prefix {
            err_at!(InvalidInput, msg: "scope wants one or sub")?;
        }

        // a naming-context root's subtree covers everything there is.
        if prefix == Prefix::Sub && base.parent == 0 && !self.ctx.multiple_suffixes {
            return Ok(Idl::all(self.ctx.to_lastid()));
        }

        let mut ids = Idl::new();
        match prefix {
            Prefix::One => {
                self.visit(txn, base.id, Prefix::One, &mut ids)?;
            }
            _ => {
                ids.insert(base.id);
                match self.visit(txn, base.id, Prefix::Sub, &mut ids) {
                    // a childless base is still a subtree of one.
                    Ok(()) | Err(Error::KeyNotFound(_, _)) => (),
                    Err(err) => return Err(err),
                }
            }
        }

        debug!(
            target: "hier  ",
            "scope {} of {} first {:?} last {:?}",
            prefix,
            base.id,
            ids.first(),
            ids.last()
        );
        Ok(ids)
    }
}

impl Hier {
    // one key visit of the scope walk. Gathers the children id-set of
    // `id` into `tmp` (through the cache when possible), hands it to
    // `ids` and, for subtree scope, descends into every child. The
    // result is ordered by id, not by tree position, callers rely on
    // set semantics only.
    fn visit(&self, txn: Option<&Txn>, id: ID, prefix: Prefix, ids: &mut Idl) -> Result<()> {
        let key = id.to_be_bytes();
        let db = &self.ctx.db;

        let cached = match self.ctx.cache.as_ref() {
            Some(cache) => cache.get(db, &key)?,
            None => None,
        };
        let tmp = match cached {
            Some(CacheHit::Idl(idl)) => idl,
            Some(CacheHit::NotFound) => {
                return err_at!(KeyNotFound, msg: "no node {}", id)
            }
            None => match self.read_children(txn, &key) {
                Ok(tmp) => {
                    if let Some(cache) = self.ctx.cache.as_ref() {
                        cache.put(db, &key, Some(&tmp))?;
                    }
                    tmp
                }
                Err(Error::KeyNotFound(p, m)) => {
                    if let Some(cache) = self.ctx.cache.as_ref() {
                        cache.put(db, &key, None)?;
                    }
                    return Err(Error::KeyNotFound(p, m));
                }
                Err(err) => return Err(err),
            },
        };

        if tmp.is_empty() {
            return err_at!(KeyNotFound, msg: "no children under {}", id);
        }

        match prefix {
            Prefix::One => {
                *ids = tmp;
            }
            _ => {
                ids.union(&tmp);
                for child in tmp.iter() {
                    match self.visit(txn, child, Prefix::Sub, ids) {
                        // leaves report no children, the set carries on.
                        Ok(()) | Err(Error::KeyNotFound(_, _)) => (),
                        Err(err) => return Err(err),
                    }
                }
            }
        }
        Ok(())
    }

    // children id-set of one key, the self-record skipped, duplicates
    // read in batches.
    fn read_children(&self, txn: Option<&Txn>, key: &[u8]) -> Result<Idl> {
        let mut cur = self.ctx.store.cursor(txn, &self.ctx.db, key)?;

        let mut tmp = Idl::new();
        loop {
            let batch = match cur.next_dup_batch(SCOPE_BATCH) {
                Ok(batch) => batch,
                Err(Error::KeyNotFound(_, _)) => break,
                Err(err) => return Err(err),
            };
            for data in batch.iter() {
                if data.len() < 4 {
                    err_at!(Corrupt, msg: "disk node of {} bytes", data.len())?;
                }
                tmp.insert(decode_id(&data[..4])?);
            }
        }
        Ok(tmp)
    }
}
