//! End-to-end tests for the extendible hash table.
//!
//! The identity hasher makes directory routing scriptable: a key's low
//! bits are its directory slot, so splits and merges can be driven
//! deliberately. Bucket capacity is whatever fits a page for the chosen
//! key/value widths; tests fill buckets by looping to that constant.

use std::sync::Arc;

use stratum::buffer::{BufferPoolConfig, BufferPoolManager};
use stratum::index::{
    DefaultComparator, DefaultKeyHasher, ExtendibleHashTable, FixedKey, FixedKeyComparator,
    IdentityHasher, Rid, bucket_array_size,
};
use stratum::storage::{DiskManager, FileDisk, MemoryDisk};
use tempfile::tempdir;

const CAPACITY: u64 = bucket_array_size::<u64, u64>() as u64;

fn identity_table<D: DiskManager>(
    disk: D,
    pool_size: usize,
) -> ExtendibleHashTable<u64, u64, DefaultComparator, IdentityHasher, D> {
    let pool = Arc::new(BufferPoolManager::new(
        disk,
        BufferPoolConfig {
            pool_size,
            ..Default::default()
        },
    ));
    ExtendibleHashTable::new(pool, DefaultComparator, IdentityHasher).unwrap()
}

#[test]
fn test_point_lookup() {
    let table = identity_table(MemoryDisk::new(), 16);

    assert!(table.insert(&0, &0xA).unwrap());
    assert!(table.insert(&1, &0xB).unwrap());

    assert_eq!(table.get_value(&0).unwrap(), vec![0xA]);
    assert_eq!(table.get_value(&1).unwrap(), vec![0xB]);
    table.verify_integrity().unwrap();
}

#[test]
fn test_duplicate_insert_returns_false() {
    let table = identity_table(MemoryDisk::new(), 16);

    assert!(table.insert(&0, &0xA).unwrap());
    assert!(!table.insert(&0, &0xA).unwrap());
}

#[test]
fn test_overflow_splits_and_routes_by_low_bit() {
    let table = identity_table(MemoryDisk::new(), 16);

    // Fill the single depth-0 bucket, then overflow it.
    for key in 0..CAPACITY {
        assert!(table.insert(&key, &key).unwrap());
    }
    assert_eq!(table.global_depth().unwrap(), 0);

    assert!(table.insert(&CAPACITY, &CAPACITY).unwrap());
    assert_eq!(table.global_depth().unwrap(), 1);
    table.verify_integrity().unwrap();

    // Both sides of the split answer lookups.
    for key in 0..=CAPACITY {
        assert_eq!(table.get_value(&key).unwrap(), vec![key]);
    }
}

#[test]
fn test_drain_merges_back_to_depth_zero() {
    let table = identity_table(MemoryDisk::new(), 16);

    for key in 0..=CAPACITY {
        assert!(table.insert(&key, &key).unwrap());
    }
    assert!(table.global_depth().unwrap() >= 1);

    for key in 0..=CAPACITY {
        assert!(table.remove(&key, &key).unwrap());
        table.verify_integrity().unwrap();
    }

    // The cascade folded every split image away and deleted its page:
    // only the directory and one (empty) bucket remain.
    assert_eq!(table.global_depth().unwrap(), 0);
    for key in 0..=CAPACITY {
        assert!(table.get_value(&key).unwrap().is_empty());
    }
}

#[test]
fn test_merged_pages_do_not_leak_frames() {
    let disk = Arc::new(MemoryDisk::new());
    let pool = Arc::new(BufferPoolManager::new(
        Arc::clone(&disk),
        BufferPoolConfig {
            pool_size: 16,
            ..Default::default()
        },
    ));
    let table: ExtendibleHashTable<u64, u64, _, _, _> =
        ExtendibleHashTable::new(Arc::clone(&pool), DefaultComparator, IdentityHasher).unwrap();

    // Grow to several buckets, then drain completely.
    for key in 0..CAPACITY * 4 {
        assert!(table.insert(&key, &key).unwrap());
    }
    assert!(table.global_depth().unwrap() >= 2);
    for key in 0..CAPACITY * 4 {
        assert!(table.remove(&key, &key).unwrap());
    }

    assert_eq!(table.global_depth().unwrap(), 0);
    // Every split-image page was handed back via delete_page.
    assert_eq!(pool.page_count(), 2);
    table.verify_integrity().unwrap();
}

#[test]
fn test_skewed_keys_cascade_splits() {
    let table = identity_table(MemoryDisk::new(), 32);

    // All keys share their low three bits, so one overflow forces the
    // directory through several doublings before the bucket can split
    // the load.
    for i in 0..=CAPACITY {
        assert!(table.insert(&(i * 8), &i).unwrap());
    }
    assert!(table.global_depth().unwrap() >= 3);
    table.verify_integrity().unwrap();

    for i in 0..=CAPACITY {
        assert_eq!(table.get_value(&(i * 8)).unwrap(), vec![i]);
    }
}

#[test]
fn test_small_pool_forces_eviction_through_index() {
    // Eight frames, working set several times larger: every operation
    // round-trips bucket pages through the device.
    let dir = tempdir().unwrap();
    let disk = FileDisk::open(dir.path().join("index.db")).unwrap();
    let table = identity_table(disk, 8);

    let n = CAPACITY * 3;
    for key in 0..n {
        assert!(table.insert(&key, &(key + 7)).unwrap(), "insert {}", key);
    }
    table.verify_integrity().unwrap();

    for key in 0..n {
        assert_eq!(table.get_value(&key).unwrap(), vec![key + 7], "get {}", key);
    }

    for key in (0..n).step_by(3) {
        assert!(table.remove(&key, &(key + 7)).unwrap(), "remove {}", key);
    }
    table.verify_integrity().unwrap();

    for key in 0..n {
        let expected: Vec<u64> = if key % 3 == 0 { vec![] } else { vec![key + 7] };
        assert_eq!(table.get_value(&key).unwrap(), expected);
    }
}

#[test]
fn test_generic_key_and_rid_values() {
    let pool = Arc::new(BufferPoolManager::new(
        MemoryDisk::new(),
        BufferPoolConfig {
            pool_size: 32,
            ..Default::default()
        },
    ));
    let table: ExtendibleHashTable<FixedKey<16>, Rid, _, _, _> =
        ExtendibleHashTable::new(pool, FixedKeyComparator, DefaultKeyHasher).unwrap();

    let n = bucket_array_size::<FixedKey<16>, Rid>() as u64 * 2;
    for i in 0..n {
        let key = FixedKey::<16>::from_bytes(format!("row-{:08}", i).as_bytes());
        assert!(table.insert(&key, &Rid::new(i / 64, (i % 64) as u32)).unwrap());
    }
    table.verify_integrity().unwrap();

    for i in 0..n {
        let key = FixedKey::<16>::from_bytes(format!("row-{:08}", i).as_bytes());
        assert_eq!(
            table.get_value(&key).unwrap(),
            vec![Rid::new(i / 64, (i % 64) as u32)]
        );
    }

    // Same key, several row locations: non-unique keys are supported.
    let shared = FixedKey::<16>::from_bytes(b"shared");
    assert!(table.insert(&shared, &Rid::new(1, 1)).unwrap());
    assert!(table.insert(&shared, &Rid::new(2, 2)).unwrap());
    assert!(!table.insert(&shared, &Rid::new(2, 2)).unwrap());
    assert_eq!(table.get_value(&shared).unwrap().len(), 2);
}
