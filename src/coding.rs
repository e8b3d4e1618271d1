//! Fixed-width (de)serialization for on-disk structures.
//!
//! Sub-pages must round-trip as a dense, zero-padded byte image so that the
//! block device's transparent compression can shrink unused space. Rather
//! than transmuting a `repr(C)` struct (which would require `unsafe`), each
//! on-disk type implements [`Encode`]/[`Decode`] over a fixed-width
//! little-endian wire format that reproduces the same "bitwise image"
//! contract at the serialization boundary.

use crate::error::Result;
use std::io::{Read, Write};

/// Serializes a value into a writer.
pub trait Encode {
    /// Writes `self` into `writer`.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<()>;

    /// Serializes into a freshly allocated vector.
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf)
            .expect("writing to a Vec cannot fail");
        buf
    }
}

/// Deserializes a value from a reader.
pub trait Decode: Sized {
    /// Reads `Self` from `reader`.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self>;
}
