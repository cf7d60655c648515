//! File-backed block device implementation.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageId};

/// File-backed block device.
///
/// Stores pages as contiguous 8KB blocks in a single flat file.
///
/// # File Layout
///
/// ```text
/// +------------------+------------------+------------------+
/// | Page 0 (8KB)     | Page 1 (8KB)     | Page 2 (8KB)     | ...
/// +------------------+------------------+------------------+
/// ^ offset 0         ^ offset 8192      ^ offset 16384
/// ```
///
/// # Concurrency
///
/// A `Mutex` around the file handle serializes I/O operations.
///
/// NOTE: For production systems with better concurrency:
/// - Use pread/pwrite for concurrent access to different offsets
/// - Implement Direct I/O to bypass the OS cache
/// - Add I/O retry logic for transient failures (EINTR, etc.)
///
/// # Durability
///
/// `sync_all()` calls `File::sync_all()` to ensure data reaches disk.
/// Without it, data may be lost on crash.
pub struct FileDisk {
    /// Path to the storage file
    path: PathBuf,
    /// File handle, serialized access
    file: Mutex<File>,
}

impl FileDisk {
    /// Opens or creates a storage file at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` if the file size is not a
    /// multiple of PAGE_SIZE.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file size {} is not a multiple of page size {}",
                file_size, PAGE_SIZE
            )));
        }

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path to the storage file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiskManager for FileDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut file = self.file.lock();
        let file_size = file.metadata()?.len();
        let offset = page_id.byte_offset();

        // Reads past the end of the file observe a page that was never
        // written: zeroes.
        if offset >= file_size {
            buf.fill(0);
            return Ok(());
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_id.byte_offset()))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn deallocate_page(&self, _page_id: PageId) -> Result<(), StorageError> {
        // Space reclamation within the flat file is deferred to offline
        // compaction; the id simply becomes dead until reused.
        Ok(())
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        let file = self.file.lock();
        file.sync_all()?;
        Ok(())
    }
}
