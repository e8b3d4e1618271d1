//! Pluggable leaf-compression codecs (component C).
//!
//! A codec compresses and decompresses an opaque byte buffer. Two variants
//! are modeled:
//!
//! - [`CodecKind::Fast`]: a general-purpose, stateless, single-pass codec.
//! - [`CodecKind::Accel`]: a codec that prepares per-job state once per tree
//!   instance (standing in for an accelerator "job handle"); calls are
//!   serialized under a per-tree mutex to reflect single-job ownership.
//!
//! Both variants are backed by `lz4_flex` here: no hardware accelerator
//! crate is available in this environment, and substituting `fast` for
//! `accel` changes nothing externally observable beyond compressed sizes
//! and timings. `Accel` still keeps its own reusable encoder/decoder handle
//! behind a mutex so the concurrency contract (serialized access to one
//! job) is real, not just nominal.

mod accel;
mod fast;

pub use accel::AccelCodec;
pub use fast::FastCodec;

use crate::error::Result;

/// Which codec a DRAM tree instance was configured with.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CodecKind {
    /// See [`FastCodec`].
    Fast,
    /// See [`AccelCodec`].
    Accel,
}

/// A compressor/decompressor for leaf sub-page blocks.
///
/// Implementations may fail to compress (e.g. buffer too small); callers
/// treat that as "leave uncompressed" rather than propagating an error.
pub trait Codec: Send + Sync {
    /// Compresses `src`, returning the compressed bytes.
    fn compress(&self, src: &[u8]) -> Vec<u8>;

    /// Decompresses `src`, which is known to expand to exactly
    /// `uncompressed_len` bytes.
    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

/// Instantiates the codec implementation for a given [`CodecKind`].
#[must_use]
pub fn make_codec(kind: CodecKind) -> Box<dyn Codec> {
    match kind {
        CodecKind::Fast => Box::new(FastCodec::new()),
        CodecKind::Accel => Box::new(AccelCodec::new()),
    }
}
