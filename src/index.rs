//! Extendible hash index over buffer-pool-managed pages.
//!
//! The index stores opaque fixed-width key/value pairs in bucket pages
//! addressed through a directory page; both page kinds live in the
//! buffer pool like any other page. Splits grow the directory (up to
//! [`MAX_DEPTH`](directory_page::MAX_DEPTH) hash bits), merges of empty
//! buckets shrink it back.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stratum::buffer::{BufferPoolConfig, BufferPoolManager};
//! use stratum::index::{DefaultComparator, DefaultKeyHasher, ExtendibleHashTable};
//! use stratum::storage::MemoryDisk;
//!
//! let pool = Arc::new(BufferPoolManager::new(MemoryDisk::new(), BufferPoolConfig::default()));
//! let table: ExtendibleHashTable<u64, u64, _, _, _> =
//!     ExtendibleHashTable::new(pool, DefaultComparator, DefaultKeyHasher).unwrap();
//!
//! assert!(table.insert(&1, &100).unwrap());
//! assert_eq!(table.get_value(&1).unwrap(), vec![100]);
//! assert!(table.remove(&1, &100).unwrap());
//! ```

pub mod bucket_page;
pub mod directory_page;
pub mod extendible;
pub mod key;

pub use bucket_page::{BucketPage, bucket_array_size};
pub use directory_page::{DIRECTORY_ARRAY_SIZE, DirectoryPage, MAX_DEPTH};
pub use extendible::ExtendibleHashTable;
pub use key::{
    DefaultComparator, DefaultKeyHasher, FixedCodec, FixedKey, FixedKeyComparator, IdentityHasher,
    KeyComparator, KeyHasher, Rid,
};
