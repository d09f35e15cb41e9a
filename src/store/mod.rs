//! Module implement the ordered key/value store consumed by the
//! DN2ID layouts.
//!
//! The layouts only assume the contract spelled out here: named
//! databases with duplicate-value keys, transactional writes with
//! no-overwrite / no-dup-data put semantics, duplicate cursors with
//! batched reads, and an optional per-database duplicate comparator.
//! [Mstore] is the bundled in-memory implementation, concurrent
//! readers run against copy-on-write snapshots while one write
//! transaction at a time mutates the committed state.
//!
//! Error surface, as seen by layouts and their callers:
//!
//! * `KeyNotFound`, lookup miss. Never fatal.
//! * `KeyExists`, no-overwrite or no-dup-data conflict.
//! * `Deadlock`, conflict in a multi-writer store, abort the
//!   transaction and retry. [Mstore] serialises writers and cannot
//!   emit it.
//! * `RunRecovery`, the store state cannot be trusted any more.

mod keyed;
mod mstore;

pub use keyed::{idl_delete_key, idl_fetch, idl_insert_key};
pub use mstore::{Cursor, Db, Mstore, MstoreStats, Txn};

use std::cmp;

/// Duplicate comparator, decides sort order and equality of the
/// duplicate values stored under one key.
pub type DupCmp = fn(&[u8], &[u8]) -> cmp::Ordering;

/// Put semantics for [Txn::put].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PutMode {
    /// Insert the value at its sort position among the key's
    /// duplicates. A comparator-equal duplicate is a no-op.
    Sorted,
    /// Fail with `KeyExists` when the key is already present.
    NoOverwrite,
    /// Fail with `KeyExists` when a comparator-equal duplicate is
    /// already present under the key.
    NoDupData,
}

/// Default duplicate comparator, plain byte order.
pub(crate) fn bytes_dup_cmp(a: &[u8], b: &[u8]) -> cmp::Ordering {
    a.cmp(b)
}
