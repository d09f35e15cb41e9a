use super::*;

use crate::store::Mstore;

fn open_db(name: &str) -> (Mstore, Db) {
    let store = Mstore::new(name);
    let db = store.open_db("dn2id", None).unwrap();
    (store, db)
}

#[test]
fn test_cache_get_put() {
    let (_store, db) = open_db("test_cache_get_put");
    let cache = IdlCache::new(16, None);

    assert_eq!(cache.get(&db, b"key").unwrap(), None);

    let idl = Idl::List(vec![1, 2, 3]);
    cache.put(&db, b"key", Some(&idl)).unwrap();
    assert_eq!(cache.get(&db, b"key").unwrap(), Some(CacheHit::Idl(idl)));

    // negative sentinel short-circuits a lookup that missed.
    cache.put(&db, b"ghost", None).unwrap();
    assert_eq!(cache.get(&db, b"ghost").unwrap(), Some(CacheHit::NotFound));

    let stats = cache.to_stats().unwrap();
    assert_eq!(stats.n_entries, 2);
    assert_eq!(stats.n_hits, 2);
    assert_eq!(stats.n_misses, 1);
}

#[test]
fn test_cache_del() {
    let (_store, db) = open_db("test_cache_del");
    let cache = IdlCache::new(16, None);

    cache.put(&db, b"key", Some(&Idl::List(vec![7]))).unwrap();
    cache.del(&db, b"key").unwrap();
    cache.del(&db, b"key").unwrap(); // uncached key, ok
    assert_eq!(cache.get(&db, b"key").unwrap(), None);
    assert_eq!(cache.to_stats().unwrap().n_bytes, 0);
}

#[test]
fn test_cache_evict_count() {
    let (_store, db) = open_db("test_cache_evict_count");
    let cache = IdlCache::new(2, None);

    cache.put(&db, b"k1", Some(&Idl::List(vec![1]))).unwrap();
    cache.put(&db, b"k2", Some(&Idl::List(vec![2]))).unwrap();
    // touch k1 so k2 is the oldest.
    cache.get(&db, b"k1").unwrap();
    cache.put(&db, b"k3", Some(&Idl::List(vec![3]))).unwrap();

    assert!(cache.get(&db, b"k1").unwrap().is_some());
    assert_eq!(cache.get(&db, b"k2").unwrap(), None);
    assert!(cache.get(&db, b"k3").unwrap().is_some());
    assert_eq!(cache.to_stats().unwrap().n_evicted, 1);
}

#[test]
fn test_cache_evict_bytes() {
    let (_store, db) = open_db("test_cache_evict_bytes");
    // each entry is 10 bytes, two fit, a third forces the oldest out.
    let cache = IdlCache::new(100, Some(25));

    cache.put(&db, b"k1", Some(&Idl::List(vec![1]))).unwrap();
    cache.put(&db, b"k2", Some(&Idl::List(vec![2]))).unwrap();
    cache.put(&db, b"k3", Some(&Idl::List(vec![3]))).unwrap();

    let stats = cache.to_stats().unwrap();
    assert!(stats.n_bytes <= 25, "{} bytes cached", stats.n_bytes);
    assert!(stats.n_evicted >= 1);
    assert_eq!(cache.get(&db, b"k1").unwrap(), None);
}

#[test]
fn test_cache_per_db() {
    let store = Mstore::new("test_cache_per_db");
    let db1 = store.open_db("one", None).unwrap();
    let db2 = store.open_db("two", None).unwrap();
    let cache = IdlCache::new(16, None);

    cache.put(&db1, b"key", Some(&Idl::List(vec![1]))).unwrap();
    assert!(cache.get(&db1, b"key").unwrap().is_some());
    // same raw key under another database is a different entry.
    assert_eq!(cache.get(&db2, b"key").unwrap(), None);
}
