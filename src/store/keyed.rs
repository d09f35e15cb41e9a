//! Keyed IDL store, the bridge between [Idl] values and keys of the
//! underlying store.
//!
//! An id-set lives under its key as individual duplicate values, one
//! big-endian id per duplicate, so an insert costs one sorted
//! duplicate write instead of rewriting the whole set. Once the set
//! grows past [IDL_MAX] the duplicates are replaced wholesale by a
//! single range record, the wire form of a range [Idl], and the key
//! stays in range form for good.

use log::debug;

use crate::{
    db::{decode_id, ID, NOID},
    idl::{Idl, IDL_MAX},
    store::{Db, Mstore, PutMode, Txn},
    Error, Result,
};

// a range record is the 12-byte wire form (NOID, lo, hi). Keys hold
// either one range record or plain 4-byte id duplicates, never both.
fn is_range_record(data: &[u8]) -> bool {
    data.len() == 12 && data[..4] == NOID.to_be_bytes()
}

/// Read every value under `key` and coalesce them into one [Idl].
/// An absent key is `KeyNotFound`, a present key with zero values is
/// an empty Idl. A duplicate count past [IDL_MAX] coalesces into the
/// covering range.
pub fn idl_fetch(store: &Mstore, txn: Option<&Txn>, db: &Db, key: &[u8]) -> Result<Idl> {
    let dups = store.get_dups(txn, db, key)?;

    if dups.len() == 1 && is_range_record(&dups[0]) {
        return Idl::decode(&dups[0]);
    }

    let mut ids = Vec::with_capacity(dups.len());
    for dup in dups.iter() {
        // big-endian duplicates come back in ascending id order.
        ids.push(decode_id(dup)?);
    }
    if ids.len() > IDL_MAX {
        let (lo, hi) = (ids[0], ids[ids.len() - 1]);
        Ok(Idl::Range { lo, hi })
    } else {
        Ok(Idl::List(ids))
    }
}

/// Add `id` under `key`. Idempotent, adding a member that is already
/// present succeeds without touching the store.
pub fn idl_insert_key(txn: &mut Txn, db: &Db, key: &[u8], id: ID) -> Result<()> {
    if let Some(first) = txn.first_dup(db, key) {
        if is_range_record(&first) {
            let mut idl = Idl::decode(&first)?;
            if idl.contains(id) {
                return Ok(());
            }
            // widen the range, written as one replacement record.
            idl.insert(id);
            let mut buf = vec![];
            idl.encode(&mut buf);
            txn.del_dup(db, key, &first)?;
            return txn.put(db, key, &buf, PutMode::Sorted);
        }

        let n_dups = txn.dup_count(db, key).unwrap_or(0);
        if n_dups >= IDL_MAX {
            // promote. every id duplicate goes, one range record
            // covering the old bounds and the newcomer takes over.
            let last = match txn.last_dup(db, key) {
                Some(last) => last,
                None => err_at!(Fatal, msg: "{} duplicates without a last", n_dups)?,
            };
            let lo = ID::min(decode_id(&first)?, id);
            let hi = ID::max(decode_id(&last)?, id);

            txn.del(db, key)?;
            let mut buf = vec![];
            (Idl::Range { lo, hi }).encode(&mut buf);
            txn.put(db, key, &buf, PutMode::Sorted)?;

            debug!(target: "dnikey", "promoted key of {} ids to [{},{}]", n_dups, lo, hi);
            return Ok(());
        }
    }

    match txn.put(db, key, &id.to_be_bytes(), PutMode::NoDupData) {
        Ok(()) => Ok(()),
        Err(Error::KeyExists(_, _)) => Ok(()), // already a member
        Err(err) => Err(err),
    }
}

/// Remove `id` from under `key`. Idempotent, removing an absent
/// member, or from an absent key, succeeds. Removing the last member
/// leaves the key present with an empty id-set.
pub fn idl_delete_key(txn: &mut Txn, db: &Db, key: &[u8], id: ID) -> Result<()> {
    let first = match txn.first_dup(db, key) {
        Some(first) => first,
        None => return Ok(()),
    };

    if is_range_record(&first) {
        let mut idl = Idl::decode(&first)?;
        if !idl.contains(id) {
            return Ok(());
        }
        match idl.delete(id) {
            Ok(()) => {
                txn.del_dup(db, key, &first)?;
                if !idl.is_empty() {
                    let mut buf = vec![];
                    idl.encode(&mut buf);
                    txn.put(db, key, &buf, PutMode::Sorted)?;
                }
                Ok(())
            }
            // interior member of a live range. The range stays as the
            // covering superset, a range is never demoted to a list.
            Err(Error::NotImplemented(_, _)) => Ok(()),
            Err(err) => Err(err),
        }
    } else {
        txn.del_dup(db, key, &id.to_be_bytes())
    }
}

#[cfg(test)]
#[path = "keyed_test.rs"]
mod keyed_test;
