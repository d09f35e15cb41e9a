use super::*;

use crate::{
    backend::{Backend, Config, Layout},
    store::Mstore,
};

const SUFFIX: &[u8] = b"dc=example,dc=com";

fn open_flat(name: &str, multiple: bool) -> Backend {
    let store = Mstore::new(name);
    let mut config = Config::new(name, &[SUFFIX]);
    config.set_layout(Layout::Flat).set_multiple_suffixes(multiple);
    Backend::open(store, config).unwrap()
}

fn add_tree(be: &Backend) -> (EntryInfo, EntryInfo, EntryInfo, EntryInfo) {
    let root = EntryInfo::root();
    let e1 = Entry::new(1, b"dc=Example,dc=Com", SUFFIX);
    let e2 = Entry::new(2, b"ou=People,dc=Example,dc=Com", b"ou=people,dc=example,dc=com");
    let e3 = Entry::new(
        3,
        b"uid=Alice,ou=People,dc=Example,dc=Com",
        b"uid=alice,ou=people,dc=example,dc=com",
    );

    let i1 = EntryInfo::new(1, 0, b"dc=Example,dc=Com", SUFFIX);
    let i2 = EntryInfo::new(2, 1, b"ou=People", b"ou=people");
    let i3 = EntryInfo::new(3, 2, b"uid=Alice", b"uid=alice");

    let mut txn = be.begin().unwrap();
    be.dn2id_add(&mut txn, &root, &e1).unwrap();
    be.dn2id_add(&mut txn, &i1, &e2).unwrap();
    be.dn2id_add(&mut txn, &i2, &e3).unwrap();
    txn.commit().unwrap();

    (root, i1, i2, i3)
}

#[test]
fn test_flat_scenario() {
    // the walk carries through the suffix to the empty root DN.
    let be = open_flat("test_flat_scenario", true /*multiple*/);
    let (root, i1, i2, _i3) = add_tree(&be);

    // every DN resolves to the id it was added with.
    let mut ei = EntryInfo::default();
    be.dn2id(None, &root, SUFFIX, &mut ei).unwrap();
    assert_eq!(ei.id, 1);
    be.dn2id(None, &i1, b"ou=people,dc=example,dc=com", &mut ei).unwrap();
    assert_eq!(ei.id, 2);
    be.dn2id(None, &i2, b"uid=alice,ou=people,dc=example,dc=com", &mut ei).unwrap();
    assert_eq!(ei.id, 3);

    // one level under the suffix, and under the synthetic root.
    let idl = be.dn2id_idl(None, &i1, SUFFIX, Prefix::One).unwrap();
    assert_eq!(idl, Idl::List(vec![2]));
    let idl = be.dn2id_idl(None, &root, b"", Prefix::One).unwrap();
    assert_eq!(idl, Idl::List(vec![1]));

    // subtrees, inclusive of self.
    let idl = be.dn2id_idl(None, &i1, SUFFIX, Prefix::Sub).unwrap();
    assert_eq!(idl, Idl::List(vec![1, 2, 3]));
    let idl = be.dn2id_idl(None, &root, b"", Prefix::Sub).unwrap();
    assert_eq!(idl, Idl::List(vec![1, 2, 3]));
    let idl = be
        .dn2id_idl(None, &i2, b"ou=people,dc=example,dc=com", Prefix::Sub)
        .unwrap();
    assert_eq!(idl, Idl::List(vec![2, 3]));

    // a second add of the same DN is a structural error.
    let mut txn = be.begin().unwrap();
    let again = Entry::new(9, b"dc=Example,dc=Com", SUFFIX);
    assert!(matches!(
        be.dn2id_add(&mut txn, &root, &again),
        Err(Error::KeyExists(_, _))
    ));
    txn.abort();
}

#[test]
fn test_flat_delete() {
    let be = open_flat("test_flat_delete", true);
    let (root, _i1, i2, _i3) = add_tree(&be);

    let e3 = Entry::new(
        3,
        b"uid=Alice,ou=People,dc=Example,dc=Com",
        b"uid=alice,ou=people,dc=example,dc=com",
    );
    let mut txn = be.begin().unwrap();
    be.dn2id_delete(&mut txn, &i2, &e3).unwrap();
    txn.commit().unwrap();

    let idl = be.dn2id_idl(None, &root, b"", Prefix::Sub).unwrap();
    assert_eq!(idl, Idl::List(vec![1, 2]));
    // the last child left, the ONE key stays behind, empty.
    let idl = be
        .dn2id_idl(None, &i2, b"ou=people,dc=example,dc=com", Prefix::One)
        .unwrap();
    assert!(idl.is_empty());

    // the entry is gone for lookups.
    let mut ei = EntryInfo::default();
    assert!(be
        .dn2id(None, &i2, b"uid=alice,ou=people,dc=example,dc=com", &mut ei)
        .unwrap_err()
        .is_not_found());

    // deleting an entry that is not indexed reports the miss up
    // front, nothing else is touched.
    let mut txn = be.begin().unwrap();
    assert!(be.dn2id_delete(&mut txn, &i2, &e3).unwrap_err().is_not_found());
    txn.abort();
}

#[test]
fn test_flat_add_delete_mirror() {
    let be = open_flat("test_flat_add_delete_mirror", true);
    let (_root, _i1, i2, _i3) = add_tree(&be);

    let before = {
        let stats = be.to_stats().unwrap();
        (stats.store.n_keys, stats.store.n_values)
    };

    // a sibling comes and goes, the index is back where it was.
    let e4 = Entry::new(
        4,
        b"uid=Bob,ou=People,dc=Example,dc=Com",
        b"uid=bob,ou=people,dc=example,dc=com",
    );
    let mut txn = be.begin().unwrap();
    be.dn2id_add(&mut txn, &i2, &e4).unwrap();
    be.dn2id_delete(&mut txn, &i2, &e4).unwrap();
    txn.commit().unwrap();

    let after = {
        let stats = be.to_stats().unwrap();
        (stats.store.n_keys, stats.store.n_values)
    };
    assert_eq!(before, after);
}

#[test]
fn test_flat_allids() {
    // single-suffix mode, the suffix entry contributes only its BASE
    // record and its subtree is answered by the all-ids range.
    let be = open_flat("test_flat_allids", false);
    let (root, i1, i2, _i3) = add_tree(&be);

    let idl = be.dn2id_idl(None, &i1, SUFFIX, Prefix::Sub).unwrap();
    assert!(idl.is_range());
    assert_eq!(idl, Idl::List(vec![1, 2, 3]));

    // children of the suffix come off the ONE record as usual.
    let idl = be.dn2id_idl(None, &i1, SUFFIX, Prefix::One).unwrap();
    assert_eq!(idl, Idl::List(vec![2]));

    // interior subtrees come off their SUB records.
    let idl = be
        .dn2id_idl(None, &i2, b"ou=people,dc=example,dc=com", Prefix::Sub)
        .unwrap();
    assert_eq!(idl, Idl::List(vec![2, 3]));

    // the suffix wrote no ONE record under the empty root.
    assert!(be
        .dn2id_idl(None, &root, b"", Prefix::One)
        .unwrap_err()
        .is_not_found());
}

#[test]
fn test_flat_children() {
    let be = open_flat("test_flat_children", true);
    let (_root, _i1, i2, _i3) = add_tree(&be);

    let e1 = Entry::new(1, b"dc=Example,dc=Com", SUFFIX);
    let e3 = Entry::new(
        3,
        b"uid=Alice,ou=People,dc=Example,dc=Com",
        b"uid=alice,ou=people,dc=example,dc=com",
    );
    assert_eq!(be.dn2id_children(None, &e1).unwrap(), true);
    assert_eq!(be.dn2id_children(None, &e3).unwrap(), false);

    // ask twice, the second answer comes off the idl-cache.
    assert_eq!(be.dn2id_children(None, &e1).unwrap(), true);
    let stats = be.to_stats().unwrap().idl_cache.unwrap();
    assert!(stats.n_hits >= 1, "{:?}", stats);

    // a write through the same key invalidates, the fresh answer
    // sees the departed child.
    let mut txn = be.begin().unwrap();
    be.dn2id_delete(&mut txn, &i2, &e3).unwrap();
    txn.commit().unwrap();

    let e2 = Entry::new(2, b"ou=People,dc=Example,dc=Com", b"ou=people,dc=example,dc=com");
    assert_eq!(be.dn2id_children(None, &e2).unwrap(), false);
}

#[test]
fn test_flat_parent_id() {
    let be = open_flat("test_flat_parent_id", true);
    let (_root, _i1, _i2, mut i3) = add_tree(&be);

    let parent = be
        .dn2id_parent(None, &mut i3, b"uid=alice,ou=people,dc=example,dc=com")
        .unwrap();
    assert_eq!(parent, 2);

    let mut i1 = EntryInfo::new(1, 0, b"", SUFFIX);
    assert_eq!(be.dn2id_parent(None, &mut i1, SUFFIX).unwrap(), 0);
}

#[test]
fn test_flat_one_disjoint() {
    let be = open_flat("test_flat_one_disjoint", true);
    let (_root, i1, i2, _i3) = add_tree(&be);

    let mut txn = be.begin().unwrap();
    let e4 = Entry::new(4, b"ou=Groups,dc=Example,dc=Com", b"ou=groups,dc=example,dc=com");
    let e5 = Entry::new(
        5,
        b"cn=Staff,ou=Groups,dc=Example,dc=Com",
        b"cn=staff,ou=groups,dc=example,dc=com",
    );
    be.dn2id_add(&mut txn, &i1, &e4).unwrap();
    let i4 = EntryInfo::new(4, 1, b"ou=Groups", b"ou=groups");
    be.dn2id_add(&mut txn, &i4, &e5).unwrap();
    txn.commit().unwrap();

    let a = be.dn2id_idl(None, &i2, b"ou=people,dc=example,dc=com", Prefix::One).unwrap();
    let b = be.dn2id_idl(None, &i4, b"ou=groups,dc=example,dc=com", Prefix::One).unwrap();
    assert!(a.iter().all(|id| !b.contains(id)));
    assert!(!a.is_empty() && !b.is_empty());
}
