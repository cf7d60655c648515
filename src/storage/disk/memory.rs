//! In-memory block device implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::DiskManager;
use crate::storage::error::StorageError;
use crate::storage::page::{PAGE_SIZE, PageData, PageId};

/// In-memory block device for testing and development.
///
/// Pages are stored in a map keyed by page number, so the id space may be
/// sparse. Reading a page that was never written zero-fills the buffer.
pub struct MemoryDisk {
    pages: Mutex<HashMap<u64, PageData>>,
}

impl MemoryDisk {
    /// Creates a new empty in-memory disk.
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the number of materialized pages.
    pub fn page_count(&self) -> usize {
        self.pages.lock().len()
    }
}

impl Default for MemoryDisk {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskManager for MemoryDisk {
    fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let pages = self.pages.lock();
        match pages.get(&page_id.page_num()) {
            Some(page) => buf.copy_from_slice(page.as_slice()),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<(), StorageError> {
        if buf.len() != PAGE_SIZE {
            return Err(StorageError::InvalidBufferSize {
                expected: PAGE_SIZE,
                actual: buf.len(),
            });
        }

        let mut pages = self.pages.lock();
        let page = pages.entry(page_id.page_num()).or_default();
        page.as_mut_slice().copy_from_slice(buf);
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<(), StorageError> {
        self.pages.lock().remove(&page_id.page_num());
        Ok(())
    }

    fn sync_all(&self) -> Result<(), StorageError> {
        // No-op for in-memory storage
        Ok(())
    }
}
