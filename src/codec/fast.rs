use super::Codec;
use crate::error::{Error, Result};

/// General-purpose, stateless, single-pass codec.
///
/// Backed by `lz4_flex` block-mode compression when the `lz4` feature is
/// enabled (the default); otherwise a pass-through copy is used, trading
/// compression for availability without changing the trait contract.
pub struct FastCodec;

impl FastCodec {
    /// Creates a new stateless fast codec.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for FastCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Codec for FastCodec {
    fn compress(&self, src: &[u8]) -> Vec<u8> {
        compress(src)
    }

    fn decompress(&self, src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        decompress(src, uncompressed_len)
    }
}

#[cfg(feature = "lz4")]
pub(super) fn compress(src: &[u8]) -> Vec<u8> {
    lz4_flex::block::compress(src)
}

#[cfg(feature = "lz4")]
pub(super) fn decompress(src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    lz4_flex::block::decompress(src, uncompressed_len)
        .map_err(|_| Error::Inconsistent("lz4 decompression failed"))
}

#[cfg(not(feature = "lz4"))]
pub(super) fn compress(src: &[u8]) -> Vec<u8> {
    src.to_vec()
}

#[cfg(not(feature = "lz4"))]
pub(super) fn decompress(src: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
    if src.len() != uncompressed_len {
        return Err(Error::Inconsistent("pass-through codec length mismatch"));
    }
    Ok(src.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let codec = FastCodec::new();
        let data = b"the quick brown fox jumps over the lazy dog".repeat(8);
        let compressed = codec.compress(&data);
        let decompressed = codec.decompress(&compressed, data.len()).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn round_trip_empty() {
        let codec = FastCodec::new();
        let compressed = codec.compress(&[]);
        let decompressed = codec.decompress(&compressed, 0).unwrap();
        assert!(decompressed.is_empty());
    }
}
