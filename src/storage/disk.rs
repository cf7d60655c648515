//! Block device implementations.
//!
//! This module provides the `DiskManager` trait for page-granular I/O over
//! a flat page file, along with MemoryDisk and FileDisk implementations.

mod file;
mod memory;

pub use file::FileDisk;
pub use memory::MemoryDisk;

use super::error::StorageError;
use super::page::PageId;

/// Block device trait for page-granular storage.
///
/// This trait defines the interface for reading and writing fixed-size
/// pages using caller-owned buffers. Implementations include:
/// - [`MemoryDisk`]: in-memory storage for tests and development
/// - [`FileDisk`]: a single flat file on disk
///
/// # Design Decisions
///
/// 1. **Sparse address space**: page ids are opaque to the device. A page
///    materializes when first written; reading a page that was never
///    written zero-fills the buffer. This lets callers stripe id
///    allocation across instances without coordinating with the device.
///
/// 2. **Caller-owned buffers**: the device moves raw bytes only. Memory
///    management and caching are the buffer pool's responsibility.
///
/// 3. **Page-level operations**: all I/O is page-sized for alignment with
///    OS page sizes and efficient disk access.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`. The buffer pool handles
/// page-level locking; this trait handles only raw I/O.
pub trait DiskManager: Send + Sync {
    /// Reads a page into a caller-provided buffer.
    ///
    /// A page that has never been written reads back as zeroes.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    /// Returns `StorageError::Io` if the underlying read fails.
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError>;

    /// Writes a page from a caller-provided buffer.
    ///
    /// The backing storage is extended as needed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidBufferSize` if `buf.len() != PAGE_SIZE`.
    /// Returns `StorageError::Io` if the underlying write fails.
    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError>;

    /// Releases the backing storage of a page.
    ///
    /// The id may be handed out again by the allocation layer; a
    /// subsequent read observes zeroes. FileDisk treats this as a no-op
    /// (space reclamation is deferred to offline compaction).
    fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError>;

    /// Syncs all pending writes to physical disk (fsync).
    ///
    /// For MemoryDisk this is a no-op. For FileDisk this calls
    /// `sync_all()` to ensure durability.
    fn sync_all(&self) -> Result<(), StorageError>;
}

impl<D: DiskManager> DiskManager for std::sync::Arc<D> {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        (**self).read_page(page_id, buf)
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        (**self).write_page(page_id, buf)
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError> {
        (**self).deallocate_page(page_id)
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        (**self).sync_all()
    }
}
