use arbitrary::{Arbitrary, Unstructured};

use std::convert::TryFrom;

use crate::{
    db::{ID, NOID},
    idl::IDL_MAX,
    Error, Result,
};

/// Idl, a sorted and deduplicated set of entry-ids.
///
/// Two representations are carried behind one type:
///
/// * `List`, ids in strictly ascending order, at most [IDL_MAX] of
///   them.
/// * `Range`, every id in the inclusive interval `[lo,hi]`, without
///   materialising them.
///
/// An insert that would push a list past [IDL_MAX] promotes it to the
/// covering range. Ranges are never demoted. Two Idl values are equal
/// when they enumerate the same ids, whatever the representation.
#[derive(Clone)]
pub enum Idl {
    List(Vec<ID>),
    Range { lo: ID, hi: ID },
}

impl Default for Idl {
    fn default() -> Idl {
        Idl::List(Vec::default())
    }
}

impl Idl {
    /// New empty value, in list form.
    pub fn new() -> Idl {
        Idl::default()
    }

    /// Range form covering every id the backend has handed out so
    /// far, `[1, lastid]`. Empty when nothing was indexed yet.
    pub fn all(lastid: ID) -> Idl {
        if lastid == 0 {
            Idl::new()
        } else {
            Idl::Range { lo: 1, hi: lastid }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Idl::List(ids) => ids.is_empty(),
            Idl::Range { .. } => false,
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Idl::Range { .. })
    }

    /// Number of ids this value denotes.
    pub fn len(&self) -> usize {
        match self {
            Idl::List(ids) => ids.len(),
            Idl::Range { lo, hi } => (hi - lo) as usize + 1,
        }
    }

    /// Bytes taken by the single-record wire encoding, refer
    /// [Idl::encode].
    pub fn size_of(&self) -> usize {
        match self {
            Idl::List(ids) => (1 + ids.len()) * 4,
            Idl::Range { .. } => 12,
        }
    }

    pub fn first(&self) -> Option<ID> {
        match self {
            Idl::List(ids) => ids.first().copied(),
            Idl::Range { lo, .. } => Some(*lo),
        }
    }

    pub fn last(&self) -> Option<ID> {
        match self {
            Idl::List(ids) => ids.last().copied(),
            Idl::Range { hi, .. } => Some(*hi),
        }
    }

    pub fn contains(&self, id: ID) -> bool {
        match self {
            Idl::List(ids) => ids.binary_search(&id).is_ok(),
            Idl::Range { lo, hi } => (*lo..=*hi).contains(&id),
        }
    }
}

impl Idl {
    /// Add `id` into the set. Adding a member that is already present
    /// is a no-op. A list that would out-grow [IDL_MAX] is promoted to
    /// the covering range.
    pub fn insert(&mut self, id: ID) {
        match self {
            Idl::List(ids) => match ids.binary_search(&id) {
                Ok(_) => (),
                Err(_) if ids.len() >= IDL_MAX => {
                    let lo = ID::min(ids[0], id);
                    let hi = ID::max(ids[ids.len() - 1], id);
                    *self = Idl::Range { lo, hi };
                }
                Err(off) => ids.insert(off, id),
            },
            Idl::Range { lo, hi } => {
                if id < *lo {
                    *lo = id
                } else if id > *hi {
                    *hi = id
                }
            }
        }
    }

    /// Remove `id` from the set. Removing an absent member is a no-op.
    /// On the range form only a boundary member can be removed, the
    /// interior case returns `NotImplemented` and callers shall avoid
    /// it, the keyed store re-materialises the list instead.
    pub fn delete(&mut self, id: ID) -> Result<()> {
        match self {
            Idl::List(ids) => {
                if let Ok(off) = ids.binary_search(&id) {
                    ids.remove(off);
                }
                Ok(())
            }
            Idl::Range { lo, hi } if lo == hi && *lo == id => {
                *self = Idl::new();
                Ok(())
            }
            Idl::Range { lo, .. } if *lo == id => {
                *lo = id + 1;
                Ok(())
            }
            Idl::Range { hi, .. } if *hi == id => {
                *hi = id - 1;
                Ok(())
            }
            Idl::Range { lo, hi } if (*lo..=*hi).contains(&id) => {
                err_at!(NotImplemented, msg: "delete {} interior of [{},{}]", id, lo, hi)
            }
            Idl::Range { .. } => Ok(()),
        }
    }

    /// In-place union with `other`. If either side is a range the
    /// result is the covering range, and so is a merged list past
    /// [IDL_MAX].
    pub fn union(&mut self, other: &Idl) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other.clone();
            return;
        }

        let (a, b) = match (&mut *self, other) {
            (Idl::List(xs), Idl::List(ys)) => {
                let mut ids = Vec::with_capacity(xs.len() + ys.len());
                let (mut i, mut j) = (0, 0);
                while i < xs.len() && j < ys.len() {
                    use std::cmp::Ordering::{Equal, Greater, Less};
                    match xs[i].cmp(&ys[j]) {
                        Less => {
                            ids.push(xs[i]);
                            i += 1;
                        }
                        Greater => {
                            ids.push(ys[j]);
                            j += 1;
                        }
                        Equal => {
                            ids.push(xs[i]);
                            i += 1;
                            j += 1;
                        }
                    }
                }
                ids.extend_from_slice(&xs[i..]);
                ids.extend_from_slice(&ys[j..]);

                *self = if ids.len() > IDL_MAX {
                    let (lo, hi) = (ids[0], ids[ids.len() - 1]);
                    Idl::Range { lo, hi }
                } else {
                    Idl::List(ids)
                };
                return;
            }
            (x, y) => {
                // either side is a range, result is the covering range
                (
                    (x.first().unwrap(), x.last().unwrap()),
                    (y.first().unwrap(), y.last().unwrap()),
                )
            }
        };

        *self = Idl::Range {
            lo: ID::min(a.0, b.0),
            hi: ID::max(a.1, b.1),
        };
    }
}

/// Cursor value for [Idl::first_id]/[Idl::next_id] iteration, opaque
/// to callers.
#[derive(Clone, Copy, Default)]
pub struct Cursor {
    nth: usize,
}

impl Idl {
    /// Position `cur` at the beginning of the set and return the first
    /// id, `None` when empty. Uniform over both representations.
    pub fn first_id(&self, cur: &mut Cursor) -> Option<ID> {
        cur.nth = 0;
        self.next_id(cur)
    }

    /// Return the id under `cur` and step it, `None` past the end.
    pub fn next_id(&self, cur: &mut Cursor) -> Option<ID> {
        let id = match self {
            Idl::List(ids) => ids.get(cur.nth).copied(),
            Idl::Range { lo, hi } => match lo.checked_add(cur.nth as ID) {
                Some(id) if id <= *hi => Some(id),
                _ => None,
            },
        };
        if id.is_some() {
            cur.nth += 1;
        }
        id
    }

    pub fn iter(&self) -> Iter {
        Iter { idl: self, cur: Cursor::default() }
    }
}

/// Iterator over the ids of an [Idl], in ascending order.
pub struct Iter<'a> {
    idl: &'a Idl,
    cur: Cursor,
}

impl<'a> Iterator for Iter<'a> {
    type Item = ID;

    fn next(&mut self) -> Option<ID> {
        self.idl.next_id(&mut self.cur)
    }
}

impl PartialEq for Idl {
    fn eq(&self, other: &Idl) -> bool {
        use Idl::{List, Range};

        match (self, other) {
            (List(xs), List(ys)) => xs == ys,
            (Range { lo: a, hi: b }, Range { lo: x, hi: y }) => a == x && b == y,
            // a list equals a range only when it is exactly the
            // contiguous run [lo..=hi]; strict ascending order makes
            // the length check sufficient.
            (x, y) => {
                x.len() == y.len() && x.first() == y.first() && x.last() == y.last()
            }
        }
    }
}

impl Eq for Idl {}

impl std::fmt::Debug for Idl {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Idl::List(ids) if ids.len() <= 8 => write!(f, "Idl::List{:?}", ids),
            Idl::List(ids) => {
                write!(f, "Idl::List<n:{} first:{} last:{}>", ids.len(), ids[0], ids[ids.len() - 1])
            }
            Idl::Range { lo, hi } => write!(f, "Idl::Range[{},{}]", lo, hi),
        }
    }
}

impl Idl {
    /// Serialize into the single-record wire form, ids as big-endian
    /// 32-bit cells:
    ///
    /// ```text
    /// list : count, id-1, id-2, ...
    /// range: NOID, lo, hi
    /// ```
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Idl::List(ids) => {
                buf.extend_from_slice(&(ids.len() as ID).to_be_bytes());
                for id in ids.iter() {
                    buf.extend_from_slice(&id.to_be_bytes());
                }
            }
            Idl::Range { lo, hi } => {
                buf.extend_from_slice(&NOID.to_be_bytes());
                buf.extend_from_slice(&lo.to_be_bytes());
                buf.extend_from_slice(&hi.to_be_bytes());
            }
        }
    }

    /// Reverse of [Idl::encode]. An out-of-range count, a short
    /// buffer, or ids out of order mean the record cannot be trusted
    /// and decode as `Corrupt`.
    pub fn decode(buf: &[u8]) -> Result<Idl> {
        let cell = |n: usize| -> Result<ID> {
            match buf.get(n * 4..n * 4 + 4) {
                Some(bs) => {
                    let bs = err_at!(FailConvert, <[u8; 4]>::try_from(bs))?;
                    Ok(ID::from_be_bytes(bs))
                }
                None => err_at!(Corrupt, msg: "idl record short at cell {}", n),
            }
        };

        match cell(0)? {
            NOID => {
                let (lo, hi) = (cell(1)?, cell(2)?);
                if lo > hi || lo == 0 {
                    err_at!(Corrupt, msg: "idl bad range [{},{}]", lo, hi)
                } else {
                    Ok(Idl::Range { lo, hi })
                }
            }
            n if (n as usize) > IDL_MAX => {
                err_at!(Corrupt, msg: "idl length {} out of range", n)
            }
            n => {
                let mut ids = Vec::with_capacity(n as usize);
                for i in 0..(n as usize) {
                    ids.push(cell(1 + i)?);
                }
                if ids.windows(2).any(|w| w[0] >= w[1]) {
                    err_at!(Corrupt, msg: "idl ids out of order")
                } else {
                    Ok(Idl::List(ids))
                }
            }
        }
    }
}

impl<'a> Arbitrary<'a> for Idl {
    fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
        let mut ids: Vec<ID> = u.arbitrary()?;
        ids.retain(|id| *id != 0 && *id != NOID);
        ids.sort_unstable();
        ids.dedup();
        if ids.len() > IDL_MAX {
            let (lo, hi) = (ids[0], ids[ids.len() - 1]);
            Ok(Idl::Range { lo, hi })
        } else {
            Ok(Idl::List(ids))
        }
    }
}

#[cfg(test)]
#[path = "idl_test.rs"]
mod idl_test;
