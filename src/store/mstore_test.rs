use super::*;

use crate::store::PutMode;

fn open_plain(name: &str) -> (Mstore, Db) {
    let store = Mstore::new(name);
    let db = store.open_db("dn2id", None).unwrap();
    (store, db)
}

#[test]
fn test_mstore_put_get() {
    let (store, db) = open_plain("test_mstore_put_get");

    let mut txn = store.begin().unwrap();
    txn.put(&db, b"alpha", b"1", PutMode::NoOverwrite).unwrap();
    txn.put(&db, b"beta", b"2", PutMode::NoOverwrite).unwrap();

    // uncommitted writes visible to the transaction, not outside.
    assert_eq!(store.get(Some(&txn), &db, b"alpha").unwrap(), b"1");
    assert!(store.get(None, &db, b"alpha").unwrap_err().is_not_found());

    // no-overwrite refuses a live key.
    assert!(matches!(
        txn.put(&db, b"alpha", b"9", PutMode::NoOverwrite),
        Err(Error::KeyExists(_, _))
    ));

    txn.commit().unwrap();
    assert_eq!(store.get(None, &db, b"alpha").unwrap(), b"1");
    assert_eq!(store.get(None, &db, b"beta").unwrap(), b"2");
    assert_eq!(store.to_seqno().unwrap(), 2);
}

#[test]
fn test_mstore_dups() {
    let (store, db) = open_plain("test_mstore_dups");

    let mut txn = store.begin().unwrap();
    for val in [&b"carol"[..], b"alice", b"bob", b"alice"] {
        txn.put(&db, b"key", val, PutMode::Sorted).unwrap();
    }
    // comparator-equal duplicate under no-dup-data refuses.
    assert!(matches!(
        txn.put(&db, b"key", b"bob", PutMode::NoDupData),
        Err(Error::KeyExists(_, _))
    ));
    txn.commit().unwrap();

    // sorted, deduplicated.
    let dups = store.get_dups(None, &db, b"key").unwrap();
    assert_eq!(dups, vec![b"alice".to_vec(), b"bob".to_vec(), b"carol".to_vec()]);
    // get returns the first duplicate.
    assert_eq!(store.get(None, &db, b"key").unwrap(), b"alice");
}

#[test]
fn test_mstore_del() {
    let (store, db) = open_plain("test_mstore_del");

    let mut txn = store.begin().unwrap();
    txn.put(&db, b"key", b"a", PutMode::Sorted).unwrap();
    txn.put(&db, b"key", b"b", PutMode::Sorted).unwrap();
    txn.commit().unwrap();

    let mut txn = store.begin().unwrap();
    txn.del_dup(&db, b"key", b"a").unwrap();
    txn.del_dup(&db, b"key", b"zz").unwrap(); // absent dup, ok
    txn.commit().unwrap();
    assert_eq!(store.get_dups(None, &db, b"key").unwrap(), vec![b"b".to_vec()]);

    // deleting the last duplicate keeps the key, with zero values.
    let mut txn = store.begin().unwrap();
    txn.del_dup(&db, b"key", b"b").unwrap();
    txn.commit().unwrap();
    assert_eq!(store.get_dups(None, &db, b"key").unwrap(), Vec::<Vec<u8>>::new());
    assert!(store.get(None, &db, b"key").unwrap_err().is_not_found());

    // wholesale delete makes the key absent.
    let mut txn = store.begin().unwrap();
    txn.del(&db, b"key").unwrap();
    assert!(matches!(txn.del(&db, b"key"), Err(Error::KeyNotFound(_, _))));
    txn.commit().unwrap();
    assert!(store.get_dups(None, &db, b"key").unwrap_err().is_not_found());
}

#[test]
fn test_mstore_abort() {
    let (store, db) = open_plain("test_mstore_abort");

    let mut txn = store.begin().unwrap();
    txn.put(&db, b"key", b"val", PutMode::Sorted).unwrap();
    txn.abort();

    assert!(store.get(None, &db, b"key").unwrap_err().is_not_found());
    assert_eq!(store.to_seqno().unwrap(), 0);
}

#[test]
fn test_mstore_snapshot_isolation() {
    let (store, db) = open_plain("test_mstore_snapshot_isolation");

    let mut txn = store.begin().unwrap();
    txn.put(&db, b"key", b"val", PutMode::Sorted).unwrap();

    // a reader clone opened before the commit keeps reading the old
    // committed state through its own handle.
    let reader = store.clone();
    assert!(reader.get(None, &db, b"key").unwrap_err().is_not_found());

    txn.commit().unwrap();
    assert_eq!(reader.get(None, &db, b"key").unwrap(), b"val");
}

#[test]
fn test_mstore_cursor() {
    let (store, db) = open_plain("test_mstore_cursor");

    let mut txn = store.begin().unwrap();
    for val in [&b"a"[..], b"b", b"c", b"d", b"e"] {
        txn.put(&db, b"key", val, PutMode::Sorted).unwrap();
    }
    txn.commit().unwrap();

    let mut cur = store.cursor(None, &db, b"key").unwrap();
    assert_eq!(cur.value(), b"a");
    assert_eq!(cur.next_dup().unwrap(), b"b");
    assert_eq!(cur.next_dup_batch(2).unwrap(), vec![b"c".to_vec(), b"d".to_vec()]);
    assert_eq!(cur.next_dup_batch(100).unwrap(), vec![b"e".to_vec()]);
    assert!(cur.next_dup_batch(100).unwrap_err().is_not_found());
    assert!(cur.next_dup().unwrap_err().is_not_found());

    let mut cur = store.cursor(None, &db, b"key").unwrap();
    assert_eq!(cur.get_both(b"c").unwrap(), b"c");
    assert!(cur.get_both(b"zz").unwrap_err().is_not_found());

    assert!(store.cursor(None, &db, b"missing").unwrap_err().is_not_found());
}

#[test]
fn test_mstore_cursor_del() {
    let (store, db) = open_plain("test_mstore_cursor_del");

    let mut txn = store.begin().unwrap();
    for val in [&b"a"[..], b"b", b"c"] {
        txn.put(&db, b"key", val, PutMode::Sorted).unwrap();
    }
    txn.commit().unwrap();

    let mut txn = store.begin().unwrap();
    let mut cur = store.cursor(Some(&txn), &db, b"key").unwrap();
    cur.get_both(b"b").unwrap();
    cur.del_current(&mut txn).unwrap();
    txn.commit().unwrap();

    let dups = store.get_dups(None, &db, b"key").unwrap();
    assert_eq!(dups, vec![b"a".to_vec(), b"c".to_vec()]);
}

#[test]
fn test_mstore_dup_comparator() {
    use std::cmp::Ordering;

    // sort duplicates by length first, then bytes.
    fn by_len(a: &[u8], b: &[u8]) -> Ordering {
        match a.len().cmp(&b.len()) {
            Ordering::Equal => a.cmp(b),
            cmp => cmp,
        }
    }

    let store = Mstore::new("test_mstore_dup_comparator");
    let db = store.open_db("bylen", Some(by_len)).unwrap();

    let mut txn = store.begin().unwrap();
    for val in [&b"ccc"[..], b"a", b"bb"] {
        txn.put(&db, b"key", val, PutMode::Sorted).unwrap();
    }
    txn.commit().unwrap();

    let dups = store.get_dups(None, &db, b"key").unwrap();
    assert_eq!(dups, vec![b"a".to_vec(), b"bb".to_vec(), b"ccc".to_vec()]);

    // re-open by name hands back the same database.
    let db2 = store.open_db("bylen", None).unwrap();
    assert_eq!(store.get(None, &db2, b"key").unwrap(), b"a");
}

#[test]
fn test_mstore_stats() {
    let (store, db) = open_plain("test_mstore_stats");

    let mut txn = store.begin().unwrap();
    txn.put(&db, b"k1", b"a", PutMode::Sorted).unwrap();
    txn.put(&db, b"k1", b"b", PutMode::Sorted).unwrap();
    txn.put(&db, b"k2", b"c", PutMode::Sorted).unwrap();
    txn.commit().unwrap();

    let stats = store.to_stats().unwrap();
    assert_eq!(stats.n_dbs, 1);
    assert_eq!(stats.n_keys, 2);
    assert_eq!(stats.n_values, 3);
    assert_eq!(stats.seqno, 3);
}
