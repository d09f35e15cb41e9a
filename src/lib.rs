//! Package implement the DN-to-ID index of a directory server's
//! on-disk backend.
//!
//! A directory entry is identified by its distinguished-name, DN, and
//! by a numeric entry-id. This package maintains the mapping between
//! the two and answers the three hierarchical questions the search
//! front-end keeps asking:
//!
//! * what is the id of this DN,
//! * does this DN have children,
//! * give me the id-set of every descendant under this DN.
//!
//! Two index organisations are implemented, selectable per backend:
//!
//! * [Flat], entries keyed by `prefix + normalized-dn`.
//! * [Hier], entries keyed by parent-id with duplicate values sorted
//!   by normalized-rdn.
//!
//! Both organisations speak the [Dn2Id] contract and sit on top of an
//! ordered key/value store with duplicate-value keys, refer [store]
//! module. Id-sets are carried as [Idl] values, a compact sorted set
//! representation with a bounded-size range fallback, refer [idl]
//! module.

use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(KeyNotFound, msg: "missing key {}", key)
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(RunRecovery, store.get(key))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(RunRecovery, store.get(key), "get key {}", key)
/// ```
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err(Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err(Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err(Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

mod backend;
pub mod db;
pub mod dn;
mod flat;
mod hier;
pub mod idl;
pub mod store;
mod util;

pub use crate::backend::{Backend, Config, Layout, Stats};
pub use crate::db::{Dn2Id, Entry, EntryInfo, InfoArena, Prefix, ID, NOID};
pub use crate::flat::Flat;
pub use crate::hier::Hier;
pub use crate::idl::Idl;

/// Type alias for Result return type, used by this package.
pub type Result<T> = result::Result<T, Error>;

/// Error variants that are returned by this package's API.
///
/// Each variant carries a prefix, mostly a code-location, and a
/// message that describe the error in detail.
#[derive(Clone, PartialEq)]
pub enum Error {
    /// Lookup miss, children-check with zero children. Never fatal.
    KeyNotFound(String, String),
    /// Attempt to add a key that already exists, under no-overwrite or
    /// no-dup-data put semantics.
    KeyExists(String, String),
    /// Store-level conflict, caller must abort the transaction and
    /// retry the whole index operation.
    Deadlock(String, String),
    /// Operation is valid but not supported by this representation,
    /// for example deleting an interior member of a range-form [Idl].
    NotImplemented(String, String),
    /// Index invariant violated on disk, the database must not be
    /// trusted any further.
    Corrupt(String, String),
    /// Underlying store needs recovery, propagated unchanged.
    RunRecovery(String, String),
    /// Caller supplied an argument this package cannot work with.
    InvalidInput(String, String),
    FailConvert(String, String),
    FailCbor(String, String),
    Fatal(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            KeyNotFound(p, m) => write!(f, "KeyNotFound {} {}", p, m),
            KeyExists(p, m) => write!(f, "KeyExists {} {}", p, m),
            Deadlock(p, m) => write!(f, "Deadlock {} {}", p, m),
            NotImplemented(p, m) => write!(f, "NotImplemented {} {}", p, m),
            Corrupt(p, m) => write!(f, "Corrupt {} {}", p, m),
            RunRecovery(p, m) => write!(f, "RunRecovery {} {}", p, m),
            InvalidInput(p, m) => write!(f, "InvalidInput {} {}", p, m),
            FailConvert(p, m) => write!(f, "FailConvert {} {}", p, m),
            FailCbor(p, m) => write!(f, "FailCbor {} {}", p, m),
            Fatal(p, m) => write!(f, "Fatal {} {}", p, m),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        write!(f, "{}", self)
    }
}

impl error::Error for Error {}

impl Error {
    /// Whether this error is a plain lookup miss, as opposed to a
    /// failure of the operation itself.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::KeyNotFound(_, _))
    }
}
