//! Extendible hash table over buffer-pool-managed pages.
//!
//! The table owns one directory page and any number of bucket pages, all
//! living in the buffer pool. Every operation pins the pages it touches
//! through [`PageHandle`](crate::buffer::PageHandle)s, so each fetch is
//! matched by exactly one unpin on every exit path.
//!
//! # Concurrency
//!
//! A table-wide reader/writer latch coordinates with per-bucket page
//! latches:
//!
//! - `get_value`, the `insert` fast path, and `remove` (excluding merge)
//!   run under the table latch in *read* mode and latch the one bucket
//!   they touch, so operations on distinct buckets proceed in parallel.
//! - `split_insert` and `merge` take the table latch in *write* mode,
//!   serializing against everything else; this is what makes holding two
//!   bucket latches during redistribution safe.
//!
//! Lock order is table latch, then pool state mutex (inside fetch/unpin),
//! then page latches; bucket latches are always released before the
//! handle that pinned the page is dropped.

use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::{BufferPoolError, BufferPoolManager};
use crate::index::bucket_page::{BucketPage, bucket_array_size};
use crate::index::directory_page::{DIRECTORY_ARRAY_SIZE, DirectoryPage};
use crate::index::key::{FixedCodec, KeyComparator, KeyHasher};
use crate::storage::{DiskManager, PageId};

/// Outcome of the slow insert path.
enum SplitOutcome {
    /// State changed (split performed, or the bucket has room again);
    /// retry the fast path.
    Retry,
    /// The insert cannot succeed: exact duplicate, or the directory is
    /// out of capacity.
    Rejected,
}

/// A disk-backed extendible hash table mapping fixed-width keys to
/// fixed-width values. Supports non-unique keys; exact (key, value)
/// duplicates are rejected.
pub struct ExtendibleHashTable<K, V, C, H, D>
where
    D: DiskManager,
{
    pool: Arc<BufferPoolManager<D>>,
    directory_page_id: PageId,
    comparator: C,
    hasher: H,
    /// Table-wide latch; see the module docs for the protocol.
    table_latch: RwLock<()>,
    _marker: PhantomData<(K, V)>,
}

impl<K, V, C, H, D> ExtendibleHashTable<K, V, C, H, D>
where
    K: FixedCodec,
    V: FixedCodec + PartialEq,
    C: KeyComparator<K>,
    H: KeyHasher<K>,
    D: DiskManager,
{
    /// Creates a new hash table: one empty bucket and a directory at
    /// global depth 0 pointing at it.
    ///
    /// # Errors
    ///
    /// Fails if the pool cannot host the two pages.
    pub fn new(
        pool: Arc<BufferPoolManager<D>>,
        comparator: C,
        hasher: H,
    ) -> Result<Self, BufferPoolError> {
        let bucket_page_id = {
            let handle = pool.new_page()?;
            {
                let mut latch = handle.write();
                BucketPage::<_, K, V>::new(&mut *latch).init();
            }
            handle.mark_dirty();
            handle.page_id()
        };

        let directory_page_id = {
            let handle = pool.new_page()?;
            {
                let mut latch = handle.write();
                DirectoryPage::new(&mut *latch).init(handle.page_id(), bucket_page_id);
            }
            handle.mark_dirty();
            handle.page_id()
        };

        Ok(Self {
            pool,
            directory_page_id,
            comparator,
            hasher,
            table_latch: RwLock::new(()),
            _marker: PhantomData,
        })
    }

    /// Returns the directory's page id.
    pub fn directory_page_id(&self) -> PageId {
        self.directory_page_id
    }

    /// Downcasts the key hash to 32 bits and masks it to a directory slot.
    fn hash_to_index(&self, key: &K, global_depth_mask: usize) -> usize {
        (self.hasher.hash_key(key) as u32 as usize) & global_depth_mask
    }

    /// Collects every value stored under `key`.
    ///
    /// # Errors
    ///
    /// Fails only on pool errors; an absent key yields an empty vector.
    pub fn get_value(&self, key: &K) -> Result<Vec<V>, BufferPoolError> {
        let _table = self.table_latch.read();

        let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
        let bucket_page_id = {
            let dir_latch = dir_handle.read();
            let dir = DirectoryPage::new(&*dir_latch);
            dir.bucket_page_id(self.hash_to_index(key, dir.global_depth_mask()))
        };

        let bucket_handle = self.pool.fetch_page(bucket_page_id)?;
        let bucket_latch = bucket_handle.read();
        let bucket = BucketPage::<_, K, V>::new(&*bucket_latch);
        Ok(bucket.get_value(key, &self.comparator))
    }

    /// Inserts a (key, value) pair.
    ///
    /// Returns `Ok(false)` if the exact pair is already present, or if
    /// the target bucket is full and the directory cannot grow any
    /// further.
    ///
    /// # Errors
    ///
    /// Fails on pool errors (out of frames, device I/O).
    pub fn insert(&self, key: &K, value: &V) -> Result<bool, BufferPoolError> {
        loop {
            if self.try_insert(key, value)? {
                return Ok(true);
            }
            // Full bucket or duplicate pair; the slow path decides which.
            match self.split_insert(key, value)? {
                SplitOutcome::Retry => continue,
                SplitOutcome::Rejected => return Ok(false),
            }
        }
    }

    /// Fast-path insert under the table read latch.
    fn try_insert(&self, key: &K, value: &V) -> Result<bool, BufferPoolError> {
        let _table = self.table_latch.read();

        let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
        let bucket_page_id = {
            let dir_latch = dir_handle.read();
            let dir = DirectoryPage::new(&*dir_latch);
            dir.bucket_page_id(self.hash_to_index(key, dir.global_depth_mask()))
        };

        let bucket_handle = self.pool.fetch_page(bucket_page_id)?;
        let inserted = {
            let mut bucket_latch = bucket_handle.write();
            let mut bucket = BucketPage::<_, K, V>::new(&mut *bucket_latch);
            bucket.insert(key, value, &self.comparator)
        };
        if inserted {
            bucket_handle.mark_dirty();
        }
        Ok(inserted)
    }

    /// Slow-path insert under the table write latch: splits the target
    /// bucket, growing the directory when its local depth has caught up
    /// with the global depth.
    fn split_insert(&self, key: &K, value: &V) -> Result<SplitOutcome, BufferPoolError> {
        let _table = self.table_latch.write();

        let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
        let mut dir_latch = dir_handle.write();
        let mut dir = DirectoryPage::new(&mut *dir_latch);

        // The directory may have changed since the fast path observed it.
        let bucket_idx = self.hash_to_index(key, dir.global_depth_mask());
        let bucket_page_id = dir.bucket_page_id(bucket_idx);
        let bucket_handle = self.pool.fetch_page(bucket_page_id)?;

        {
            let bucket_latch = bucket_handle.read();
            let bucket = BucketPage::<_, K, V>::new(&*bucket_latch);

            if bucket
                .get_value(key, &self.comparator)
                .iter()
                .any(|v| v == value)
            {
                return Ok(SplitOutcome::Rejected);
            }
            // A concurrent remove may have made room; no split needed.
            if !bucket.is_full() {
                return Ok(SplitOutcome::Retry);
            }
        }

        if dir.size() >= DIRECTORY_ARRAY_SIZE {
            return Ok(SplitOutcome::Rejected);
        }

        let new_handle = self.pool.new_page()?;
        let new_bucket_page_id = new_handle.page_id();
        {
            let mut new_latch = new_handle.write();
            BucketPage::<_, K, V>::new(&mut *new_latch).init();
        }
        new_handle.mark_dirty();

        if dir.local_depth(bucket_idx) == dir.global_depth() {
            dir.incr_global_depth();
        }

        // Every slot sharing the bucket's low `local_depth` bits is
        // re-pointed: bit `local_depth` decides which side of the split
        // it lands on.
        let local_depth = dir.local_depth(bucket_idx);
        let low_bits = bucket_idx & ((1usize << local_depth) - 1);
        for i in 0..(1usize << (dir.global_depth() - local_depth)) {
            let slot = (i << local_depth) | low_bits;
            dir.incr_local_depth(slot);
            if i & 1 == 0 {
                dir.set_bucket_page_id(slot, bucket_page_id);
            } else {
                dir.set_bucket_page_id(slot, new_bucket_page_id);
            }
        }
        dir_handle.mark_dirty();

        // Redistribute. The bucket was full, so every slot is live.
        {
            let mut old_latch = bucket_handle.write();
            let mut new_latch = new_handle.write();
            let mut old_bucket = BucketPage::<_, K, V>::new(&mut *old_latch);
            let mut new_bucket = BucketPage::<_, K, V>::new(&mut *new_latch);

            for slot in 0..bucket_array_size::<K, V>() {
                let slot_key = old_bucket.key_at(slot);
                let slot_value = old_bucket.value_at(slot);
                let target_idx = self.hash_to_index(&slot_key, dir.global_depth_mask());
                if dir.bucket_page_id(target_idx) == new_bucket_page_id {
                    old_bucket.remove_at(slot);
                    let moved = new_bucket.insert(&slot_key, &slot_value, &self.comparator);
                    debug_assert!(moved, "fresh split bucket cannot be full");
                }
            }
        }
        bucket_handle.mark_dirty();

        Ok(SplitOutcome::Retry)
    }

    /// Removes a (key, value) pair.
    ///
    /// Returns `Ok(false)` if the pair is absent. After a successful
    /// removal the affected bucket may be merged with its split image.
    ///
    /// # Errors
    ///
    /// Fails on pool errors (out of frames, device I/O).
    pub fn remove(&self, key: &K, value: &V) -> Result<bool, BufferPoolError> {
        {
            let _table = self.table_latch.read();

            let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
            let bucket_page_id = {
                let dir_latch = dir_handle.read();
                let dir = DirectoryPage::new(&*dir_latch);
                dir.bucket_page_id(self.hash_to_index(key, dir.global_depth_mask()))
            };

            let bucket_handle = self.pool.fetch_page(bucket_page_id)?;
            let removed = {
                let mut bucket_latch = bucket_handle.write();
                let mut bucket = BucketPage::<_, K, V>::new(&mut *bucket_latch);
                bucket.remove(key, value, &self.comparator)
            };
            if !removed {
                return Ok(false);
            }
            bucket_handle.mark_dirty();
        }

        // The bucket MIGHT need merging; merge decides.
        self.merge(key)?;
        Ok(true)
    }

    /// Folds empty buckets into their split images under the table write
    /// latch.
    ///
    /// One removal can enable a cascade of merges up multiple depths, so
    /// this loops until a skip condition holds:
    ///
    /// 1. neither the bucket nor its split image is empty;
    /// 2. the bucket has local depth 0 (nothing to fold into);
    /// 3. the two images disagree on local depth (one of them has split
    ///    again and they are no longer partners).
    fn merge(&self, key: &K) -> Result<(), BufferPoolError> {
        let _table = self.table_latch.write();

        let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
        let mut dir_latch = dir_handle.write();
        let mut dir = DirectoryPage::new(&mut *dir_latch);
        let mut directory_changed = false;

        loop {
            let bucket_idx = self.hash_to_index(key, dir.global_depth_mask());
            let local_depth = dir.local_depth(bucket_idx);
            if local_depth == 0 {
                break;
            }

            let split_idx = dir.split_image_index(bucket_idx);
            if dir.local_depth(split_idx) != local_depth {
                break;
            }

            let bucket_page_id = dir.bucket_page_id(bucket_idx);
            let split_page_id = dir.bucket_page_id(split_idx);

            let (bucket_empty, split_empty) = {
                let bucket_handle = self.pool.fetch_page(bucket_page_id)?;
                let split_handle = self.pool.fetch_page(split_page_id)?;
                let bucket_empty =
                    BucketPage::<_, K, V>::new(&*bucket_handle.read()).is_empty();
                let split_empty =
                    BucketPage::<_, K, V>::new(&*split_handle.read()).is_empty();
                (bucket_empty, split_empty)
            };

            if !bucket_empty && !split_empty {
                break;
            }

            // Keep the non-empty side; the empty one is folded away.
            let (keep_idx, keep_page_id, dead_page_id) = if bucket_empty {
                (split_idx, split_page_id, bucket_page_id)
            } else {
                (bucket_idx, bucket_page_id, split_page_id)
            };

            let folded_depth = local_depth - 1;
            let low_bits = keep_idx & ((1usize << folded_depth) - 1);
            for i in 0..(1usize << (dir.global_depth() - folded_depth)) {
                let slot = (i << folded_depth) | low_bits;
                dir.decr_local_depth(slot);
                dir.set_bucket_page_id(slot, keep_page_id);
            }
            if dir.can_shrink() {
                dir.decr_global_depth();
            }
            directory_changed = true;

            let deleted = self.pool.delete_page(dead_page_id)?;
            debug_assert!(deleted, "freed bucket page should not be pinned");
        }

        if directory_changed {
            dir_handle.mark_dirty();
        }
        Ok(())
    }

    /// Returns the directory's current global depth.
    pub fn global_depth(&self) -> Result<u32, BufferPoolError> {
        let _table = self.table_latch.read();
        let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
        let dir_latch = dir_handle.read();
        Ok(DirectoryPage::new(&*dir_latch).global_depth())
    }

    /// Asserts the directory coherence invariants.
    ///
    /// # Panics
    ///
    /// Panics if the directory is incoherent.
    pub fn verify_integrity(&self) -> Result<(), BufferPoolError> {
        let _table = self.table_latch.read();
        let dir_handle = self.pool.fetch_page(self.directory_page_id)?;
        let dir_latch = dir_handle.read();
        DirectoryPage::new(&*dir_latch).verify_integrity();
        Ok(())
    }
}
