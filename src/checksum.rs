//! Data integrity checksums for large objects.
//!
//! The exact polynomial is not prescribed by the design, only that it is
//! stable across a process lifetime; this uses `xxhash-rust`'s XXH3 64-bit
//! digest truncated to 32 bits.

use xxhash_rust::xxh3::xxh3_64;

/// Computes the checksum stored in a large-object descriptor.
#[must_use]
pub fn checksum(bytes: &[u8]) -> u32 {
    #[allow(clippy::cast_possible_truncation)]
    let digest = xxh3_64(bytes) as u32;
    digest
}
