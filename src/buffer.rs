//! Buffer pool for page caching.
//!
//! The buffer pool manager provides in-memory caching of pages with an
//! LRU replacement policy and RAII-based access handles.
//!
//! # Example
//!
//! ```no_run
//! use stratum::buffer::{BufferPoolConfig, BufferPoolManager};
//! use stratum::storage::MemoryDisk;
//!
//! let disk = MemoryDisk::new();
//! let pool = BufferPoolManager::new(disk, BufferPoolConfig { pool_size: 64, ..Default::default() });
//!
//! // Allocate and write a new page
//! let handle = pool.new_page().unwrap();
//! let page_id = handle.page_id();
//! handle.write()[0..5].copy_from_slice(b"hello");
//! handle.mark_dirty();
//! drop(handle); // Unpins
//!
//! // Read the page back
//! let handle = pool.fetch_page(page_id).unwrap();
//! assert_eq!(&handle.read()[0..5], b"hello");
//! ```

mod error;
mod frame;
mod guard;
mod manager;
mod replacer;

pub use error::BufferPoolError;
pub use guard::{PageHandle, PageReadLatch, PageWriteLatch};
pub use manager::{BufferPoolConfig, BufferPoolManager};
pub use replacer::{LruReplacer, Replacer};

// Re-export FrameId for testing/debugging (but not Frame internals)
pub use frame::FrameId;
