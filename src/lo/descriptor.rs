//! Large-object descriptor: everything needed to locate and verify a
//! payload previously appended to the large-object store.

/// Location, size, and integrity metadata for one stored object.
#[derive(Copy, Clone, Debug)]
pub struct Descriptor {
    /// Byte offset into the storage file.
    pub lba: u64,
    /// Payload length in bytes (excludes 4 KiB padding).
    pub size: u64,
    /// `xxh3`-based checksum of the payload bytes (see [`crate::checksum`]).
    pub checksum: u32,
    /// Unix timestamp, in seconds, of the write.
    pub timestamp: u64,
}
