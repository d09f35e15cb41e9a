//! Module implement normalisation-agnostic helpers over DN byte-strings.
//!
//! Every DN handled here is assumed to be already normalized by the
//! schema engine, case/space-folded and comma-separated. None of these
//! helpers allocate, parents and rdns alias the caller's buffer.

/// Offset of the parent DN within `dn`, that is one past the first
/// unescaped top-level comma. `None` when `dn` has no parent portion.
pub fn parent_offset(dn: &[u8]) -> Option<usize> {
    let mut i = 0;
    while i < dn.len() {
        match dn[i] {
            b'\\' => i += 2, // escaped byte, skip both
            b',' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Parent portion of `dn`, aliasing a suffix of the input buffer.
/// Returns the empty slice for a single-component DN.
pub fn dn_parent(dn: &[u8]) -> &[u8] {
    match parent_offset(dn) {
        Some(off) => &dn[off..],
        None => &dn[dn.len()..],
    }
}

/// Byte length of the leading RDN of `dn`.
///
/// Returns 0 when `dn` equals one of the backend's suffixes, which
/// signals "store the full DN, this is a naming-context root".
pub fn rdn_len(dn: &[u8], suffixes: &[Vec<u8>]) -> usize {
    if is_suffix(dn, suffixes) {
        return 0;
    }
    match parent_offset(dn) {
        Some(off) => off - 1,
        None => dn.len(),
    }
}

/// Whether `dn` is one of the naming-context roots served by the
/// backend.
pub fn is_suffix(dn: &[u8], suffixes: &[Vec<u8>]) -> bool {
    suffixes.iter().any(|s| s.as_slice() == dn)
}

#[cfg(test)]
#[path = "dn_test.rs"]
mod dn_test;
