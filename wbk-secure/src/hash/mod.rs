//! MD5 self-hashes and SHA-1 helpers.
//!
//! The save blob and the content header both carry an MD5 of themselves.
//! While hashing, the digest slot holds [`MD5_BLANKER`] rather than zeros;
//! the consuming format checks it the same way, so the constant must not
//! change.

use std::ops::Range;

use md5::Md5;
use sha1::{Digest, Sha1};

/// Placeholder written into an MD5 slot while the surrounding region is hashed.
pub const MD5_BLANKER: [u8; 16] = [
    0x0E, 0x65, 0x37, 0x81, 0x99, 0xBE, 0x45, 0x17, 0xAB, 0x06, 0xEC, 0x22, 0x45, 0x1A, 0x57, 0x93,
];

pub const SHA1_SIZE: usize = 20;

pub fn md5(data: &[u8]) -> [u8; 16] {
    Md5::digest(data).into()
}

pub fn sha1(data: &[u8]) -> [u8; SHA1_SIZE] {
    Sha1::digest(data).into()
}

/// Fill `slot` with the blanker, hash `region`, then store the digest in `slot`.
///
/// Returns the digest. Panics if `slot` is not a 16-byte range inside `region`.
pub fn seal_md5(region: &mut [u8], slot: Range<usize>) -> [u8; 16] {
    region[slot.clone()].copy_from_slice(&MD5_BLANKER);
    let digest = md5(region);
    region[slot].copy_from_slice(&digest);
    digest
}

/// Check a region sealed with [`seal_md5`].
pub fn verify_md5(region: &[u8], slot: Range<usize>) -> bool {
    let mut expected = [0u8; 16];
    expected.copy_from_slice(&region[slot.clone()]);

    let mut scratch = region.to_vec();
    scratch[slot].copy_from_slice(&MD5_BLANKER);
    md5(&scratch) == expected
}
