//! Page replacement policies for the buffer pool.
//!
//! The replacer tracks which frames are evictable (unpinned) and selects
//! victims for eviction when the buffer pool needs free frames.

use hashlink::LinkedHashSet;

use super::frame::FrameId;

/// Trait for page replacement policies.
///
/// # Thread Safety
///
/// Implementations need not be internally synchronized: the
/// BufferPoolManager keeps the replacer inside its state mutex.
///
/// # Usage
///
/// ```text
/// // When a page's pin_count drops to 0
/// replacer.unpin(frame_id);
///
/// // When a page's pin_count increases from 0
/// replacer.pin(frame_id);
///
/// // When the buffer pool needs a victim
/// if let Some(victim) = replacer.victim() {
///     // Evict the victim frame
/// }
/// ```
pub trait Replacer: Send {
    /// Selects a victim frame for eviction.
    ///
    /// Returns `Some(frame_id)` if there's an evictable frame, `None` if all
    /// frames are pinned.
    ///
    /// The returned frame is removed from the replacer's tracking.
    fn victim(&mut self) -> Option<FrameId>;

    /// Marks a frame as non-evictable (pinned).
    ///
    /// Called when a frame's pin_count increases from 0 to 1.
    /// If the frame is not in the replacer, this is a no-op.
    fn pin(&mut self, frame_id: FrameId);

    /// Marks a frame as evictable (unpinned).
    ///
    /// Called when a frame's pin_count decreases to 0.
    /// The frame is added as the most recently used entry.
    fn unpin(&mut self, frame_id: FrameId);

    /// Returns the number of evictable frames.
    fn size(&self) -> usize;
}

/// LRU (Least Recently Used) page replacement policy.
///
/// Frames are ordered by recency of unpin. When `victim()` is called,
/// the least recently unpinned frame is selected.
///
/// # Data Structure
///
/// A `LinkedHashSet<FrameId>` gives O(1) membership, O(1) removal, and
/// insertion-ordered iteration: the front is the least recently unpinned
/// frame, the back the most recent.
///
/// # Recency
///
/// `unpin` of a frame that is already tracked is a no-op and does NOT
/// refresh its position. The pin/unpin protocol guarantees at most one
/// unpin per pin-count transition to zero; a second unpin for the same
/// transition is a caller bug, not a recency signal.
///
/// # Example
///
/// ```
/// use stratum::buffer::{FrameId, LruReplacer, Replacer};
///
/// let mut replacer = LruReplacer::new(8);
///
/// // Mark frames as evictable
/// replacer.unpin(FrameId::new(0));
/// replacer.unpin(FrameId::new(1));
/// replacer.unpin(FrameId::new(2));
///
/// // Select victim (oldest)
/// assert_eq!(replacer.victim(), Some(FrameId::new(0)));
///
/// // Pin frame 1
/// replacer.pin(FrameId::new(1));
///
/// // Victim should skip pinned frame 1
/// assert_eq!(replacer.victim(), Some(FrameId::new(2)));
/// ```
pub struct LruReplacer {
    /// Evictable frames in unpin order. Front = least recently unpinned.
    queue: LinkedHashSet<FrameId>,

    /// Maximum number of frames that can be tracked at once.
    capacity: usize,
}

impl LruReplacer {
    /// Creates a new LRU replacer that tracks at most `capacity` frames.
    ///
    /// # Example
    ///
    /// ```
    /// use stratum::buffer::{LruReplacer, Replacer};
    ///
    /// let replacer = LruReplacer::new(100);
    /// assert_eq!(replacer.size(), 0);
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: LinkedHashSet::with_capacity(capacity),
            capacity,
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        self.queue.pop_front()
    }

    fn pin(&mut self, frame_id: FrameId) {
        self.queue.remove(&frame_id);
    }

    fn unpin(&mut self, frame_id: FrameId) {
        // An already-tracked frame keeps its position.
        if self.queue.contains(&frame_id) {
            return;
        }
        if self.queue.len() == self.capacity {
            return;
        }
        self.queue.insert(frame_id);
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}
