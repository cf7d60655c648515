//! RAII handles for buffer pool page access.
//!
//! Each [`PageHandle`] owns exactly one pin: `fetch_page`/`new_page`
//! produce it and dropping it performs the matching unpin, on every exit
//! path. The handle also exposes the page's reader/writer latch together
//! with the byte view, so callers never reach around the pool to latch a
//! page they have not pinned.

use std::cell::Cell;

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::frame::FrameId;
use super::manager::BufferPoolManager;
use crate::storage::{DiskManager, PageData, PageId};

/// A pinned page in the buffer pool.
///
/// While a handle is alive the page cannot be evicted. Dropping the
/// handle unpins the page, carrying the dirty flag accumulated through
/// [`mark_dirty`](Self::mark_dirty).
///
/// # Latching
///
/// [`read`](Self::read) and [`write`](Self::write) take the page latch
/// and return a guard that dereferences to the page bytes. The latch
/// guard borrows the handle, so it is necessarily released before the
/// unpin that the handle performs on drop.
///
/// Writing through the latch does NOT mark the page dirty by itself;
/// call `mark_dirty()` once a mutation actually happened. This keeps
/// failed in-page operations (e.g. inserting into a full bucket) from
/// dirtying the page.
pub struct PageHandle<'a, D: DiskManager> {
    pool: &'a BufferPoolManager<D>,
    frame_id: FrameId,
    page_id: PageId,
    dirty: Cell<bool>,
}

impl<'a, D: DiskManager> PageHandle<'a, D> {
    /// Creates a new handle for an already-pinned frame.
    pub(super) fn new(pool: &'a BufferPoolManager<D>, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            dirty: Cell::new(false),
        }
    }

    /// Returns the PageId of this page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Records that the page content was modified.
    ///
    /// The flag is handed to the pool when the handle is dropped.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Acquires the page latch in read mode.
    pub fn read(&self) -> PageReadLatch<'_> {
        PageReadLatch {
            guard: self.pool.frame(self.frame_id).data.read(),
        }
    }

    /// Acquires the page latch in write mode.
    pub fn write(&self) -> PageWriteLatch<'_> {
        PageWriteLatch {
            guard: self.pool.frame(self.frame_id).data.write(),
        }
    }
}

impl<'a, D: DiskManager> Drop for PageHandle<'a, D> {
    fn drop(&mut self) {
        self.pool.unpin_frame(self.frame_id, self.dirty.get());
    }
}

/// Shared (read-latched) view of a page's bytes.
pub struct PageReadLatch<'a> {
    guard: RwLockReadGuard<'a, PageData>,
}

impl<'a> std::ops::Deref for PageReadLatch<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.guard.as_slice()
    }
}

/// Exclusive (write-latched) view of a page's bytes.
pub struct PageWriteLatch<'a> {
    guard: RwLockWriteGuard<'a, PageData>,
}

impl<'a> std::ops::Deref for PageWriteLatch<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.guard.as_slice()
    }
}

impl<'a> std::ops::DerefMut for PageWriteLatch<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.as_mut_slice()
    }
}
