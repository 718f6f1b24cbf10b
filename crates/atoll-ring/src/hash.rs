//! Deterministic point hashing.
//!
//! Ring positions come from MD5: a 128-bit digest is split into four
//! little-endian 32-bit values, each usable as an independent ring point,
//! and the lookup-side hash of a key is the first of those segments. MD5 is
//! used for spread, not security: points only need to be deterministic and
//! uniformly distributed over the 32-bit ring space.

use md5::{Digest, Md5};

/// Number of 32-bit ring points carried by one 128-bit digest.
pub const POINTS_PER_DIGEST: usize = 4;

/// Digest an arbitrary byte key into its 128-bit form.
pub fn digest(key: &[u8]) -> [u8; 16] {
    Md5::digest(key).into()
}

/// Split a 128-bit digest into four independent 32-bit ring points.
///
/// Each group of four bytes is read little-endian, so the first point of
/// `digest(key)` equals [`hash32`]`(key)`.
pub fn split_digest(digest: &[u8; 16]) -> [u32; POINTS_PER_DIGEST] {
    let mut points = [0u32; POINTS_PER_DIGEST];
    for (point, chunk) in points.iter_mut().zip(digest.chunks_exact(4)) {
        *point = u32::from_le_bytes(chunk.try_into().expect("4 bytes"));
    }
    points
}

/// Hash a lookup key onto the ring.
pub fn hash32(key: &[u8]) -> u32 {
    let digest = digest(key);
    u32::from_le_bytes(digest[..4].try_into().expect("4 bytes"))
}
