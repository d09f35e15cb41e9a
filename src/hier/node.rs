use std::{cmp, convert::TryFrom};

use crate::{
    db::{decode_id, ID},
    Error, Result,
};

// Layout of one duplicate value under a hierarchical key:
//
//   entry-id : 4 bytes, big-endian
//   nrdnlen  : int16, little-endian, negated for a self-record
//   nrdn     : NUL-terminated bytes
//   rdn      : NUL-terminated bytes
//
// A node's children sit under the parent's key as `Child` records.
// The node's own `Own` record sits first under its own key, pointing
// back at the parent, its nrdnlen stored negated so the duplicate
// comparator sorts it ahead of every child. The sign trick exists
// only at this byte boundary, in memory the two kinds are spelled
// out.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DiskNode {
    /// Child record, stored under the parent's key.
    Child { id: ID, nrdn: Vec<u8>, rdn: Vec<u8> },
    /// Self record, stored under the entry's own key.
    Own { parent: ID, nrdn: Vec<u8>, rdn: Vec<u8> },
}

const HDR: usize = 6; // entry-id and nrdnlen

impl DiskNode {
    pub fn encode(&self, buf: &mut Vec<u8>) -> Result<()> {
        let (id, nrdn, rdn, negate) = match self {
            DiskNode::Child { id, nrdn, rdn } => (*id, nrdn, rdn, false),
            DiskNode::Own { parent, nrdn, rdn } => (*parent, nrdn, rdn, true),
        };

        let nrdnlen = match i16::try_from(nrdn.len()) {
            Ok(len) => len,
            Err(_) => err_at!(InvalidInput, msg: "nrdn of {} bytes", nrdn.len())?,
        };
        if nrdn.contains(&0) || rdn.contains(&0) {
            err_at!(InvalidInput, msg: "rdn with embedded NUL")?;
        }

        buf.extend_from_slice(&id.to_be_bytes());
        let nrdnlen = if negate { -nrdnlen } else { nrdnlen };
        buf.extend_from_slice(&nrdnlen.to_le_bytes());
        buf.extend_from_slice(nrdn);
        buf.push(0);
        buf.extend_from_slice(rdn);
        buf.push(0);
        Ok(())
    }

    pub fn decode(data: &[u8]) -> Result<DiskNode> {
        let nrdnlen = nrdnlen_of(data)?;
        let id = decode_id(&data[..4])?;

        let nlen = nrdnlen.unsigned_abs() as usize;
        match data.get(HDR + nlen) {
            Some(0) => (),
            _ => err_at!(Corrupt, msg: "disk node nrdn not terminated")?,
        }
        let nrdn = data[HDR..HDR + nlen].to_vec();
        if nrdn.contains(&0) {
            err_at!(Corrupt, msg: "disk node nrdn embeds NUL")?;
        }

        let rest = &data[HDR + nlen + 1..];
        let rdn = match rest.split_last() {
            Some((0, rdn)) if !rdn.contains(&0) => rdn.to_vec(),
            _ => err_at!(Corrupt, msg: "disk node rdn not terminated")?,
        };

        if nrdnlen < 0 {
            Ok(DiskNode::Own { parent: id, nrdn, rdn })
        } else {
            Ok(DiskNode::Child { id, nrdn, rdn })
        }
    }

    /// Probe value for positioning a cursor on the child record with
    /// this normalized rdn. The comparator never looks at the id or
    /// the display rdn, zeroes do fine there.
    pub fn probe(nrdn: &[u8]) -> Result<Vec<u8>> {
        let mut buf = vec![];
        let node = DiskNode::Child { id: 0, nrdn: nrdn.to_vec(), rdn: vec![] };
        node.encode(&mut buf)?;
        Ok(buf)
    }
}

fn nrdnlen_of(data: &[u8]) -> Result<i16> {
    match data.get(4..HDR) {
        Some(bs) => {
            let bs = err_at!(FailConvert, <[u8; 2]>::try_from(bs))?;
            Ok(i16::from_le_bytes(bs))
        }
        None => err_at!(Corrupt, msg: "disk node of {} bytes", data.len()),
    }
}

// bytes of a NUL-terminated field, the terminator excluded.
fn cstr(data: &[u8]) -> &[u8] {
    match data.iter().position(|b| *b == 0) {
        Some(n) => &data[..n],
        None => data,
    }
}

/// Sort comparator for the duplicate values of a hierarchical key.
/// Orders by signed nrdnlen first, then by the nrdn bytes, so the
/// negated self-record sorts strictly ahead of every child record.
pub fn dup_compare(a: &[u8], b: &[u8]) -> cmp::Ordering {
    let la = nrdnlen_of(a);
    let lb = nrdnlen_of(b);
    match (la, lb) {
        (Ok(la), Ok(lb)) => la
            .cmp(&lb)
            .then_with(|| cstr(&a[HDR..]).cmp(&cstr(&b[HDR..]))),
        // short buffers cannot reach here through this package's
        // writes, fall back to byte order to stay a total order.
        _ => a.cmp(b),
    }
}

#[cfg(test)]
#[path = "node_test.rs"]
mod node_test;
