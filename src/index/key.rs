//! Key/value contracts for the hash index.
//!
//! Keys and values are opaque to the index: it only needs a stable
//! fixed-width byte encoding (to lay pairs out inside bucket pages), a
//! total-order comparator for keys, byte-equality for values, and a
//! 64-bit key hash that the index downcasts to 32 bits.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use bytes::{Buf, BufMut};

/// Fixed-width byte encoding for keys and values stored in bucket pages.
///
/// The on-page layout of a bucket is a function of `ENCODED_SIZE`, so the
/// encoding must be stable per instantiation: encoding then decoding must
/// round-trip, and every encode must produce exactly `ENCODED_SIZE` bytes.
pub trait FixedCodec: Copy {
    /// Number of bytes `encode` writes and `decode` consumes.
    const ENCODED_SIZE: usize;

    /// Writes exactly `ENCODED_SIZE` bytes.
    fn encode(&self, buf: &mut impl BufMut);

    /// Reads exactly `ENCODED_SIZE` bytes.
    fn decode(buf: &mut impl Buf) -> Self;
}

impl FixedCodec for i32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        buf.get_i32_le()
    }
}

impl FixedCodec for u32 {
    const ENCODED_SIZE: usize = 4;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        buf.get_u32_le()
    }
}

impl FixedCodec for u64 {
    const ENCODED_SIZE: usize = 8;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(*self);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        buf.get_u64_le()
    }
}

/// Record identifier: the canonical index value type.
///
/// Points at a record slot somewhere in a heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rid {
    /// Page holding the record.
    pub page_num: u64,
    /// Slot within the page.
    pub slot: u32,
}

impl Rid {
    /// Creates a new record identifier.
    pub const fn new(page_num: u64, slot: u32) -> Self {
        Self { page_num, slot }
    }
}

impl FixedCodec for Rid {
    const ENCODED_SIZE: usize = 12;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u64_le(self.page_num);
        buf.put_u32_le(self.slot);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        let page_num = buf.get_u64_le();
        let slot = buf.get_u32_le();
        Self { page_num, slot }
    }
}

/// Fixed-width opaque key of `N` bytes.
///
/// Shorter source keys are zero-padded; the padding participates in
/// comparison and hashing, which is sound because it is constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedKey<const N: usize>(pub [u8; N]);

impl<const N: usize> FixedKey<N> {
    /// Builds a key from a byte prefix, zero-padding to `N` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `bytes.len() > N`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() <= N, "key does not fit in {} bytes", N);
        let mut data = [0u8; N];
        data[..bytes.len()].copy_from_slice(bytes);
        Self(data)
    }
}

impl<const N: usize> Default for FixedKey<N> {
    fn default() -> Self {
        Self([0; N])
    }
}

impl<const N: usize> FixedCodec for FixedKey<N> {
    const ENCODED_SIZE: usize = N;

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.0);
    }

    fn decode(buf: &mut impl Buf) -> Self {
        let mut data = [0u8; N];
        buf.copy_to_slice(&mut data);
        Self(data)
    }
}

/// Total-order comparison for index keys.
///
/// Key equality is `compare(a, b) == Ordering::Equal`.
pub trait KeyComparator<K>: Send + Sync + Clone {
    /// Compares two keys.
    fn compare(&self, a: &K, b: &K) -> Ordering;
}

/// Comparator for keys with an intrinsic order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl<K: Ord + Send + Sync> KeyComparator<K> for DefaultComparator {
    fn compare(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Byte-lexicographic comparator for [`FixedKey`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedKeyComparator;

impl<const N: usize> KeyComparator<FixedKey<N>> for FixedKeyComparator {
    fn compare(&self, a: &FixedKey<N>, b: &FixedKey<N>) -> Ordering {
        a.0.cmp(&b.0)
    }
}

/// 64-bit key hash supplier.
///
/// The index downcasts the result to 32 bits and masks with the
/// directory's global depth.
pub trait KeyHasher<K>: Send + Sync + Clone {
    /// Hashes a key to 64 bits.
    fn hash_key(&self, key: &K) -> u64;
}

/// Hasher backed by the standard library's SipHash.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultKeyHasher;

impl<K: Hash + Send + Sync> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> u64 {
        let mut hasher = std::hash::DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// Hasher that returns integer keys unchanged.
///
/// With this hasher the directory slot of a key is just its low bits,
/// which makes split and merge behavior directly scriptable in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHasher;

impl KeyHasher<u64> for IdentityHasher {
    fn hash_key(&self, key: &u64) -> u64 {
        *key
    }
}

impl KeyHasher<u32> for IdentityHasher {
    fn hash_key(&self, key: &u32) -> u64 {
        *key as u64
    }
}

impl KeyHasher<i32> for IdentityHasher {
    fn hash_key(&self, key: &i32) -> u64 {
        *key as u32 as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: FixedCodec + PartialEq + std::fmt::Debug>(value: T) {
        let mut buf = Vec::new();
        value.encode(&mut buf);
        assert_eq!(buf.len(), T::ENCODED_SIZE);

        let mut slice = buf.as_slice();
        assert_eq!(T::decode(&mut slice), value);
        assert!(slice.is_empty());
    }

    #[test]
    fn test_codec_roundtrips() {
        roundtrip(-17i32);
        roundtrip(0xDEAD_BEEFu32);
        roundtrip(u64::MAX - 3);
        roundtrip(Rid::new(42, 7));
        roundtrip(FixedKey::<8>::from_bytes(b"abc"));
    }

    #[test]
    fn test_fixed_key_padding() {
        let key = FixedKey::<8>::from_bytes(b"ab");
        assert_eq!(key.0, [b'a', b'b', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    #[should_panic(expected = "does not fit")]
    fn test_fixed_key_too_long_panics() {
        let _ = FixedKey::<4>::from_bytes(b"too long");
    }

    #[test]
    fn test_default_comparator() {
        let cmp = DefaultComparator;
        assert_eq!(cmp.compare(&1u64, &2u64), Ordering::Less);
        assert_eq!(cmp.compare(&2u64, &2u64), Ordering::Equal);
        assert_eq!(cmp.compare(&3u64, &2u64), Ordering::Greater);
    }

    #[test]
    fn test_fixed_key_comparator() {
        let cmp = FixedKeyComparator;
        let a = FixedKey::<4>::from_bytes(b"aa");
        let b = FixedKey::<4>::from_bytes(b"ab");
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
        assert_eq!(cmp.compare(&a, &a), Ordering::Equal);
    }

    #[test]
    fn test_identity_hasher() {
        assert_eq!(IdentityHasher.hash_key(&42u64), 42);
        assert_eq!(IdentityHasher.hash_key(&7u32), 7);
        assert_eq!(IdentityHasher.hash_key(&-1i32), u32::MAX as u64);
    }

    #[test]
    fn test_default_hasher_is_stable_per_instance() {
        let h = DefaultKeyHasher;
        assert_eq!(h.hash_key(&12345u64), h.hash_key(&12345u64));
    }
}
