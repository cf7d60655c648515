//! Hash directory page for the extendible hash index.
//!
//! The directory maps the low `global_depth` bits of a key's hash to a
//! bucket page id. Each slot also records the bucket's local depth: the
//! number of hash bits that bucket actually distinguishes. Several slots
//! may point at the same bucket whenever its local depth is smaller than
//! the global depth.
//!
//! # Page Layout
//!
//! ```text
//! +--------------------------------+ offset 0
//! | page_id: u64                   |
//! +--------------------------------+ offset 8
//! | global_depth: u32              |
//! +--------------------------------+ offset 12
//! | local_depths: [u8; 512]        |
//! +--------------------------------+ offset 524
//! | bucket_page_ids: [u64; 512]    |
//! +--------------------------------+ offset 4620
//! ```
//!
//! All integers little-endian. The arrays are sized for `MAX_DEPTH`
//! (the largest directory the page can describe); only the first
//! `size()` slots are live.

use std::collections::HashMap;

use crate::storage::{PAGE_SIZE, PageId};

/// Maximum number of hash bits the directory can use.
pub const MAX_DEPTH: u32 = 9;

/// Number of directory slots, `1 << MAX_DEPTH`.
pub const DIRECTORY_ARRAY_SIZE: usize = 1 << MAX_DEPTH;

const PAGE_ID_OFFSET: usize = 0;
const GLOBAL_DEPTH_OFFSET: usize = 8;
const LOCAL_DEPTHS_OFFSET: usize = 12;
const BUCKET_PAGE_IDS_OFFSET: usize = LOCAL_DEPTHS_OFFSET + DIRECTORY_ARRAY_SIZE;
const DIRECTORY_END: usize = BUCKET_PAGE_IDS_OFFSET + DIRECTORY_ARRAY_SIZE * 8;

/// Typed view of a directory page over raw page bytes.
///
/// Like [`BucketPage`](super::BucketPage), the parameter `T` wraps either
/// `&[u8]` or `&mut [u8]`; construction asserts the buffer is one page.
pub struct DirectoryPage<T> {
    data: T,
}

impl<T: AsRef<[u8]>> DirectoryPage<T> {
    /// Creates a directory page view over the given data.
    ///
    /// # Panics
    ///
    /// Panics if `data.as_ref().len() != PAGE_SIZE`.
    pub fn new(data: T) -> Self {
        assert_eq!(
            data.as_ref().len(),
            PAGE_SIZE,
            "DirectoryPage requires exactly {} bytes, got {}",
            PAGE_SIZE,
            data.as_ref().len()
        );
        const { assert!(DIRECTORY_END <= PAGE_SIZE) };
        Self { data }
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn read_u64(&self, offset: usize) -> u64 {
        u64::from_le_bytes(self.data()[offset..offset + 8].try_into().unwrap())
    }

    /// Returns the directory's own page id.
    pub fn page_id(&self) -> PageId {
        PageId::new(self.read_u64(PAGE_ID_OFFSET))
    }

    /// Returns the number of hash bits the whole directory uses.
    pub fn global_depth(&self) -> u32 {
        u32::from_le_bytes(
            self.data()[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
                .try_into()
                .unwrap(),
        )
    }

    /// Mask selecting the low `global_depth` bits of a hash.
    pub fn global_depth_mask(&self) -> usize {
        (1 << self.global_depth()) - 1
    }

    /// Number of live directory slots, `1 << global_depth`.
    pub fn size(&self) -> usize {
        1 << self.global_depth()
    }

    /// Returns the local depth of the bucket at `slot`.
    pub fn local_depth(&self, slot: usize) -> u32 {
        debug_assert!(slot < DIRECTORY_ARRAY_SIZE);
        self.data()[LOCAL_DEPTHS_OFFSET + slot] as u32
    }

    /// Mask selecting the low `local_depth(slot)` bits of a hash.
    pub fn local_depth_mask(&self, slot: usize) -> usize {
        (1 << self.local_depth(slot)) - 1
    }

    /// Returns the bucket page id stored at `slot`.
    pub fn bucket_page_id(&self, slot: usize) -> PageId {
        debug_assert!(slot < DIRECTORY_ARRAY_SIZE);
        PageId::new(self.read_u64(BUCKET_PAGE_IDS_OFFSET + slot * 8))
    }

    /// Returns the slot that pointed at the same bucket before the last
    /// split at this depth: `slot` with bit `local_depth - 1` flipped.
    pub fn split_image_index(&self, slot: usize) -> usize {
        let local_depth = self.local_depth(slot);
        debug_assert!(local_depth > 0, "bucket at depth 0 has no split image");
        slot ^ (1 << (local_depth - 1))
    }

    /// Whether the directory can halve: every live slot's local depth is
    /// strictly below the global depth.
    ///
    /// At global depth 0 this is false (there is nothing to shrink).
    pub fn can_shrink(&self) -> bool {
        let global_depth = self.global_depth();
        (0..self.size()).all(|slot| self.local_depth(slot) < global_depth)
    }

    /// Whether the directory can double again.
    pub fn can_incr_global_depth(&self) -> bool {
        self.global_depth() < MAX_DEPTH
    }

    /// Asserts the directory coherence invariants:
    ///
    /// 1. every live slot's local depth is at most the global depth;
    /// 2. all slots pointing at one bucket agree on its local depth;
    /// 3. each bucket at local depth `ld` is referenced by exactly
    ///    `2^(global_depth - ld)` slots.
    ///
    /// # Panics
    ///
    /// Panics on the first violated invariant.
    pub fn verify_integrity(&self) {
        let global_depth = self.global_depth();
        let mut reference_counts: HashMap<PageId, usize> = HashMap::new();
        let mut local_depths: HashMap<PageId, u32> = HashMap::new();

        for slot in 0..self.size() {
            let bucket_page_id = self.bucket_page_id(slot);
            let local_depth = self.local_depth(slot);

            assert!(
                local_depth <= global_depth,
                "slot {} has local depth {} above global depth {}",
                slot,
                local_depth,
                global_depth
            );

            if let Some(&known) = local_depths.get(&bucket_page_id) {
                assert_eq!(
                    known, local_depth,
                    "bucket {:?} is mapped at local depths {} and {}",
                    bucket_page_id, known, local_depth
                );
            } else {
                local_depths.insert(bucket_page_id, local_depth);
            }

            *reference_counts.entry(bucket_page_id).or_insert(0) += 1;
        }

        for (bucket_page_id, count) in reference_counts {
            let local_depth = local_depths[&bucket_page_id];
            let expected = 1 << (global_depth - local_depth);
            assert_eq!(
                count, expected,
                "bucket {:?} at local depth {} is referenced by {} slots, expected {}",
                bucket_page_id, local_depth, count, expected
            );
        }
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> DirectoryPage<T> {
    fn data_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn write_u64(&mut self, offset: usize, value: u64) {
        self.data_mut()[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    fn set_global_depth(&mut self, global_depth: u32) {
        self.data_mut()[GLOBAL_DEPTH_OFFSET..GLOBAL_DEPTH_OFFSET + 4]
            .copy_from_slice(&global_depth.to_le_bytes());
    }

    /// Initializes an empty directory at global depth 0.
    ///
    /// Every slot (live or not) points at the initial bucket with local
    /// depth 0, so later doublings start from a coherent mirror.
    pub fn init(&mut self, dir_page_id: PageId, initial_bucket_page_id: PageId) {
        self.data_mut().fill(0);
        self.write_u64(PAGE_ID_OFFSET, dir_page_id.page_num());
        self.set_global_depth(0);
        for slot in 0..DIRECTORY_ARRAY_SIZE {
            self.set_bucket_page_id(slot, initial_bucket_page_id);
        }
    }

    /// Doubles the directory: the upper half mirrors the lower half, so
    /// coherence holds before the caller re-points the split bucket's
    /// slots.
    ///
    /// # Panics
    ///
    /// Panics if the directory is already at `MAX_DEPTH`.
    pub fn incr_global_depth(&mut self) {
        assert!(self.can_incr_global_depth(), "directory is at MAX_DEPTH");
        let size = self.size();
        for slot in 0..size {
            let bucket_page_id = self.bucket_page_id(slot);
            let local_depth = self.local_depth(slot);
            self.set_bucket_page_id(size + slot, bucket_page_id);
            self.set_local_depth(size + slot, local_depth);
        }
        self.set_global_depth(self.global_depth() + 1);
    }

    /// Halves the directory.
    ///
    /// # Panics
    ///
    /// Panics if the global depth is already 0.
    pub fn decr_global_depth(&mut self) {
        let global_depth = self.global_depth();
        assert!(global_depth > 0, "directory is at global depth 0");
        self.set_global_depth(global_depth - 1);
    }

    fn set_local_depth(&mut self, slot: usize, local_depth: u32) {
        debug_assert!(slot < DIRECTORY_ARRAY_SIZE);
        debug_assert!(local_depth <= MAX_DEPTH);
        self.data_mut()[LOCAL_DEPTHS_OFFSET + slot] = local_depth as u8;
    }

    /// Increments the local depth recorded at `slot`.
    pub fn incr_local_depth(&mut self, slot: usize) {
        let local_depth = self.local_depth(slot);
        self.set_local_depth(slot, local_depth + 1);
    }

    /// Decrements the local depth recorded at `slot`.
    pub fn decr_local_depth(&mut self, slot: usize) {
        let local_depth = self.local_depth(slot);
        debug_assert!(local_depth > 0);
        self.set_local_depth(slot, local_depth - 1);
    }

    /// Points `slot` at a bucket page.
    pub fn set_bucket_page_id(&mut self, slot: usize, bucket_page_id: PageId) {
        debug_assert!(slot < DIRECTORY_ARRAY_SIZE);
        self.write_u64(
            BUCKET_PAGE_IDS_OFFSET + slot * 8,
            bucket_page_id.page_num(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_directory_data() -> Vec<u8> {
        let mut data = vec![0u8; PAGE_SIZE];
        DirectoryPage::new(&mut data).init(PageId::new(0), PageId::new(1));
        data
    }

    #[test]
    fn test_init_state() {
        let mut data = new_directory_data();
        let dir = DirectoryPage::new(&mut data);

        assert_eq!(dir.page_id(), PageId::new(0));
        assert_eq!(dir.global_depth(), 0);
        assert_eq!(dir.global_depth_mask(), 0);
        assert_eq!(dir.size(), 1);
        assert_eq!(dir.local_depth(0), 0);
        assert_eq!(dir.bucket_page_id(0), PageId::new(1));
        dir.verify_integrity();
    }

    #[test]
    fn test_depth_masks() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        dir.incr_global_depth();
        dir.incr_global_depth();
        assert_eq!(dir.global_depth(), 2);
        assert_eq!(dir.global_depth_mask(), 0b11);
        assert_eq!(dir.size(), 4);

        dir.set_local_depth(0, 2);
        assert_eq!(dir.local_depth_mask(0), 0b11);
    }

    #[test]
    fn test_incr_global_depth_mirrors_lower_half() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        // Split the initial bucket by hand: slot 0 -> page 1, slot 1 -> page 2.
        dir.incr_global_depth();
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        dir.set_bucket_page_id(1, PageId::new(2));
        dir.verify_integrity();

        // Doubling again must mirror both slots upward.
        dir.incr_global_depth();
        assert_eq!(dir.size(), 4);
        assert_eq!(dir.bucket_page_id(2), PageId::new(1));
        assert_eq!(dir.bucket_page_id(3), PageId::new(2));
        assert_eq!(dir.local_depth(2), 1);
        assert_eq!(dir.local_depth(3), 1);
        dir.verify_integrity();
    }

    #[test]
    fn test_decr_global_depth() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        dir.incr_global_depth();
        assert_eq!(dir.global_depth(), 1);
        dir.decr_global_depth();
        assert_eq!(dir.global_depth(), 0);
    }

    #[test]
    #[should_panic(expected = "global depth 0")]
    fn test_decr_global_depth_below_zero_panics() {
        let mut data = new_directory_data();
        DirectoryPage::new(&mut data).decr_global_depth();
    }

    #[test]
    fn test_can_incr_global_depth_bound() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        for _ in 0..MAX_DEPTH {
            assert!(dir.can_incr_global_depth());
            dir.incr_global_depth();
        }
        assert_eq!(dir.global_depth(), MAX_DEPTH);
        assert_eq!(dir.size(), DIRECTORY_ARRAY_SIZE);
        assert!(!dir.can_incr_global_depth());
    }

    #[test]
    fn test_split_image_index() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        dir.incr_global_depth();
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        assert_eq!(dir.split_image_index(0), 1);
        assert_eq!(dir.split_image_index(1), 0);

        dir.incr_global_depth();
        dir.set_local_depth(0b10, 2);
        assert_eq!(dir.split_image_index(0b10), 0b00);
    }

    #[test]
    fn test_can_shrink() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        // Depth 0: nothing to shrink.
        assert!(!dir.can_shrink());

        // Mirrored doubling leaves both slots at local depth 0 < 1.
        dir.incr_global_depth();
        assert!(dir.can_shrink());

        // A real split pins both slots at the global depth.
        dir.set_local_depth(0, 1);
        dir.set_local_depth(1, 1);
        dir.set_bucket_page_id(1, PageId::new(2));
        assert!(!dir.can_shrink());
    }

    #[test]
    #[should_panic(expected = "local depths")]
    fn test_verify_integrity_detects_incoherent_mapping() {
        let mut data = new_directory_data();
        let mut dir = DirectoryPage::new(&mut data);

        dir.incr_global_depth();
        // Claim slot 1 split to depth 1 but leave slot 0 pointing at the
        // same bucket at depth 0: reference counts cannot both be right.
        dir.set_local_depth(1, 1);
        dir.verify_integrity();
    }

    #[test]
    fn test_fields_survive_reload() {
        let mut data = new_directory_data();
        {
            let mut dir = DirectoryPage::new(&mut data);
            dir.incr_global_depth();
            dir.set_local_depth(0, 1);
            dir.set_local_depth(1, 1);
            dir.set_bucket_page_id(1, PageId::new(7));
        }

        // A fresh view over the same bytes sees identical state.
        let dir = DirectoryPage::new(&data[..]);
        assert_eq!(dir.global_depth(), 1);
        assert_eq!(dir.local_depth(1), 1);
        assert_eq!(dir.bucket_page_id(1), PageId::new(7));
        dir.verify_integrity();
    }
}
