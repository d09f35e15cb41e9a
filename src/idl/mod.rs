//! Module implement ID-Lists, compact sorted sets of entry-ids.
//!
//! An [Idl] is either an explicit sorted list of ids or, once the list
//! would out-grow [IDL_MAX], an inclusive `[lo,hi]` range covering the
//! same ids. Promotion from list to range is one-way, an [Idl] is
//! never demoted back to list form.
//!
//! The [cache] sub-module implements a bounded in-memory cache of
//! `(db, key) -> Idl` used by the DN2ID layouts to short-circuit
//! repeated fetches.

mod cache;
mod idl;

pub use cache::{CacheHit, IdlCache, IdlCacheStats};
pub use idl::{Cursor, Idl, Iter};

/// Maximum number of ids an [Idl] holds in list form. One more insert
/// promotes the list to the range representation.
pub const IDL_MAX: usize = (1 << 16) - 1;
