//! Buffer Pool Manager implementation.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::error::BufferPoolError;
use super::frame::{Frame, FrameId, FrameMetadata};
use super::guard::PageHandle;
use super::replacer::{LruReplacer, Replacer};
use crate::storage::{DiskManager, PageId};

/// Configuration for the Buffer Pool Manager.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the buffer pool.
    ///
    /// This determines the maximum number of pages that can be cached in
    /// memory simultaneously. Common values:
    /// - 128 frames = 1MB (for testing)
    /// - 1024 frames = 8MB (small database)
    /// - 131072 frames = 1GB (production)
    pub pool_size: usize,

    /// Number of pool instances sharing the page-id space.
    ///
    /// A standalone pool uses 1. When several instances stripe a single
    /// device, each allocates ids congruent to its own index.
    pub num_instances: u32,

    /// This instance's position within the stripe, `< num_instances`.
    pub instance_index: u32,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 1024, // 1024 * 8KB = 8MB
            num_instances: 1,
            instance_index: 0,
        }
    }
}

/// The Buffer Pool Manager caches pages in memory and manages page
/// lifecycles.
///
/// # Architecture
///
/// ```text
/// +-------------------+
/// | fetch_page()      |----> Page Table (PageId -> FrameId)
/// | new_page()        |      Free List / LRU Replacer
/// +-------------------+      Frame Metadata
///          |                        (one state mutex)
///          v
/// +-------------------+     +-------------------+
/// | Frame Array       |---->| DiskManager Trait |
/// | [Frame; pool_sz]  |     +-------------------+
/// +-------------------+
/// ```
///
/// # Concurrency Model
///
/// A single state mutex guards the page table, frame metadata, free list
/// and replacer. Page bytes live behind per-frame `RwLock`s (the page
/// latches), which are taken by *callers* around their accesses — the
/// pool itself only touches a frame's latch while (re)loading a victim,
/// which cannot contend because victims are unpinned.
///
/// # Latch Hierarchy
///
/// To prevent deadlocks, locks must be acquired in strict order:
/// 1. Any caller-level latch (e.g. an index's table latch)
/// 2. The pool state mutex
/// 3. Frame data latches
///
/// **NEVER** acquire the state mutex while holding it already; page
/// latches held by a caller must belong to pinned pages.
///
/// Device I/O during fetch/eviction happens while the state mutex is
/// held. That serializes misses, which is acceptable for this scope; a
/// production pool would stage I/O outside the mutex and re-validate.
///
/// # Thread Safety
///
/// The pool is safe to share across threads via `Arc<BufferPoolManager>`.
pub struct BufferPoolManager<D: DiskManager> {
    /// The underlying block device.
    disk: D,

    /// Frame array - each frame's bytes are behind its own latch.
    frames: Vec<Frame>,

    /// Protected mutable state (page table, metadata, free list, replacer).
    state: Mutex<PoolState>,

    /// Configuration (immutable after construction).
    config: BufferPoolConfig,
}

/// Mutable state protected by the state mutex.
struct PoolState {
    /// Maps PageId -> FrameId for quick lookup.
    page_table: HashMap<PageId, FrameId>,

    /// Metadata for each frame (indexed by FrameId).
    frame_metadata: Vec<FrameMetadata>,

    /// Free frames (not currently holding any page).
    free_list: Vec<FrameId>,

    /// Replacement policy for selecting eviction victims.
    replacer: LruReplacer,

    /// Next page id this instance will hand out.
    next_page_id: u64,
}

impl<D: DiskManager> BufferPoolManager<D> {
    /// Creates a new Buffer Pool Manager.
    ///
    /// # Panics
    ///
    /// Panics if `pool_size` is 0, `num_instances` is 0, or
    /// `instance_index >= num_instances`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use stratum::buffer::{BufferPoolConfig, BufferPoolManager};
    /// use stratum::storage::MemoryDisk;
    ///
    /// let disk = MemoryDisk::new();
    /// let pool = BufferPoolManager::new(disk, BufferPoolConfig::default());
    /// ```
    pub fn new(disk: D, config: BufferPoolConfig) -> Self {
        assert!(config.pool_size > 0, "pool_size must be > 0");
        assert!(config.num_instances > 0, "num_instances must be > 0");
        assert!(
            config.instance_index < config.num_instances,
            "instance_index must be < num_instances"
        );

        let frames: Vec<_> = (0..config.pool_size).map(|_| Frame::new()).collect();
        let frame_metadata: Vec<_> = (0..config.pool_size).map(|_| FrameMetadata::new()).collect();
        let free_list: Vec<_> = (0..config.pool_size).map(FrameId::new).collect();

        let state = PoolState {
            page_table: HashMap::with_capacity(config.pool_size),
            frame_metadata,
            free_list,
            replacer: LruReplacer::new(config.pool_size),
            next_page_id: config.instance_index as u64,
        };

        Self {
            disk,
            frames,
            state: Mutex::new(state),
            config,
        }
    }

    /// Returns the buffer pool configuration.
    pub fn config(&self) -> &BufferPoolConfig {
        &self.config
    }

    /// Returns the number of frames in the buffer pool.
    pub fn pool_size(&self) -> usize {
        self.config.pool_size
    }

    /// Returns the number of pages currently resident in the pool.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Returns the pin count of a resident page, `None` if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(state.frame_metadata[frame_id.as_usize()].pin_count)
    }

    /// Allocates a fresh page and pins it in a frame.
    ///
    /// The page id comes from this instance's stripe: ids start at
    /// `instance_index` and advance by `num_instances`, so every id this
    /// pool hands out satisfies `id % num_instances == instance_index`.
    /// The frame's memory is zeroed; nothing is written to the device
    /// until the page is flushed or evicted dirty.
    ///
    /// # Errors
    ///
    /// Returns `NoFreeFrames` iff every frame has `pin_count > 0`.
    pub fn new_page(&self) -> Result<PageHandle<'_, D>, BufferPoolError> {
        let mut state = self.state.lock();

        let frame_id = self.take_victim_frame(&mut state)?;

        let page_id = PageId::new(state.next_page_id);
        state.next_page_id += self.config.num_instances as u64;
        debug_assert_eq!(
            page_id.stripe_of(self.config.num_instances),
            self.config.instance_index
        );

        // A fresh page starts as all zeroes.
        self.frames[frame_id.as_usize()].data.write().reset();

        state.page_table.insert(page_id, frame_id);
        state.frame_metadata[frame_id.as_usize()].reset(page_id);

        Ok(PageHandle::new(self, frame_id, page_id))
    }

    /// Fetches a page into the buffer pool and returns a pinned handle.
    ///
    /// If the page is resident, its pin count is incremented and the
    /// handle returned immediately. Otherwise a victim frame is found
    /// (free list first, then replacer), the old page written back if
    /// dirty, and the requested page read from the device.
    ///
    /// # Errors
    ///
    /// - `NoFreeFrames` if the page is not resident and all frames are pinned
    /// - `Storage` if device I/O fails
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageHandle<'_, D>, BufferPoolError> {
        let mut state = self.state.lock();

        // Fast path: page is already resident.
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let meta = &mut state.frame_metadata[frame_id.as_usize()];
            meta.pin_count += 1;
            if meta.pin_count == 1 {
                // Transitioned from unpinned to pinned
                state.replacer.pin(frame_id);
            }
            return Ok(PageHandle::new(self, frame_id, page_id));
        }

        // Miss: find a frame and read the page in.
        let frame_id = self.take_victim_frame(&mut state)?;

        let read_result = {
            let mut data = self.frames[frame_id.as_usize()].data.write();
            self.disk.read_page(page_id, data.as_mut_slice())
        };
        if let Err(e) = read_result {
            // Return the frame to the free list to avoid leaking it.
            state.free_list.push(frame_id);
            return Err(e.into());
        }

        state.page_table.insert(page_id, frame_id);
        state.frame_metadata[frame_id.as_usize()].reset(page_id);

        Ok(PageHandle::new(self, frame_id, page_id))
    }

    /// Explicitly unpins a page.
    ///
    /// In normal usage pages are unpinned automatically when their
    /// [`PageHandle`](super::PageHandle) is dropped; this entry point
    /// serves callers that manage pins by page id.
    ///
    /// Decrements the pin count and ORs `is_dirty` into the frame's
    /// dirty flag. When the pin count reaches 0 the frame becomes
    /// evictable.
    ///
    /// Returns `false` if the page is not resident or its pin count is
    /// already 0.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let meta = &mut state.frame_metadata[frame_id.as_usize()];
        if meta.pin_count == 0 {
            return false;
        }

        meta.pin_count -= 1;
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes a page's bytes to the device and clears its dirty flag.
    ///
    /// The write is unconditional for resident pages (even clean ones).
    /// Does not unpin.
    ///
    /// Returns `Ok(false)` if the page is not resident.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the device write fails.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        // Resolve the frame under the state mutex, but release it for
        // the latch + I/O so a caller latching its own pages can never
        // wait on us mid-write.
        let frame_id = {
            let state = self.state.lock();
            match state.page_table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => return Ok(false),
            }
        };

        {
            let data = self.frames[frame_id.as_usize()].data.read();
            self.disk.write_page(page_id, data.as_slice())?;
        }

        let mut state = self.state.lock();
        // The page is pinned by convention when callers flush it, but
        // re-check that the frame still holds it before clearing dirty.
        if state.frame_metadata[frame_id.as_usize()].page_id == Some(page_id) {
            state.frame_metadata[frame_id.as_usize()].is_dirty = false;
        }
        Ok(true)
    }

    /// Flushes every resident dirty page, then syncs the device.
    ///
    /// This is useful for checkpointing or graceful shutdown.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered. Some pages may remain
    /// unflushed if an error occurs.
    pub fn flush_all(&self) -> Result<(), BufferPoolError> {
        // Snapshot the dirty pages, then flush each without holding the
        // state mutex across latch acquisition and I/O.
        let dirty_pages: Vec<(usize, PageId)> = {
            let state = self.state.lock();
            state
                .frame_metadata
                .iter()
                .enumerate()
                .filter_map(|(frame_id, meta)| {
                    if meta.is_dirty {
                        meta.page_id.map(|page_id| (frame_id, page_id))
                    } else {
                        None
                    }
                })
                .collect()
        };

        for (frame_id, page_id) in dirty_pages {
            {
                // Skip frames that were re-targeted since the snapshot.
                let state = self.state.lock();
                if state.frame_metadata[frame_id].page_id != Some(page_id) {
                    continue;
                }
            }

            {
                let data = self.frames[frame_id].data.read();
                self.disk.write_page(page_id, data.as_slice())?;
            }

            let mut state = self.state.lock();
            if state.frame_metadata[frame_id].page_id == Some(page_id) {
                state.frame_metadata[frame_id].is_dirty = false;
            }
        }

        self.disk.sync_all()?;
        Ok(())
    }

    /// Deletes a page from the pool and deallocates its id.
    ///
    /// A page that is not resident is deallocated directly. A resident
    /// page is dropped from the pool *without* write-back (its contents
    /// are dead) and its frame returns to the free list.
    ///
    /// Returns `Ok(false)` if the page is resident with `pin_count > 0`.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the device fails to deallocate.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool, BufferPoolError> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            drop(state);
            self.disk.deallocate_page(page_id)?;
            return Ok(true);
        };

        if state.frame_metadata[frame_id.as_usize()].is_pinned() {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        state.frame_metadata[frame_id.as_usize()].clear();
        // The frame moves to the free list; make sure the replacer
        // forgets it so the two sets stay disjoint.
        state.replacer.pin(frame_id);
        state.free_list.push(frame_id);

        drop(state);
        self.disk.deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the frame holding a pinned page (for handle latching).
    pub(super) fn frame(&self, frame_id: FrameId) -> &Frame {
        &self.frames[frame_id.as_usize()]
    }

    /// Unpins a frame (called from `PageHandle::drop`).
    pub(super) fn unpin_frame(&self, frame_id: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();

        let meta = &mut state.frame_metadata[frame_id.as_usize()];
        if meta.pin_count > 0 {
            meta.pin_count -= 1;
            if is_dirty {
                meta.is_dirty = true;
            }
            if meta.pin_count == 0 {
                state.replacer.unpin(frame_id);
            }
        }
    }

    /// Picks a frame to (re)use: free list first, then an LRU victim.
    ///
    /// A dirty victim is written back to the device before its frame is
    /// handed out. The caller installs the new page in the page table.
    ///
    /// # Errors
    ///
    /// Returns `NoFreeFrames` if all frames are pinned.
    fn take_victim_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .victim()
            .ok_or(BufferPoolError::NoFreeFrames)?;

        let meta = &state.frame_metadata[frame_id.as_usize()];
        let old_page_id = meta.page_id.expect("victim frame should hold a page");

        if meta.is_dirty {
            let data = self.frames[frame_id.as_usize()].data.read();
            self.disk.write_page(old_page_id, data.as_slice())?;
        }

        state.page_table.remove(&old_page_id);
        state.frame_metadata[frame_id.as_usize()].clear();
        Ok(frame_id)
    }
}
