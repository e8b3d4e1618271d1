//! 4 KiB block addressing for the SSD storage file (components A, B).

pub mod allocator;
pub mod device;

pub use allocator::BlockAllocator;
pub use device::BlockDevice;

/// Size of one addressable block on the SSD file.
pub const BLOCK_SIZE: usize = 4096;

/// Identifies a 4 KiB block on the SSD storage file.
pub type BlockId = u32;

/// Sentinel meaning "no block allocated yet".
pub const INVALID_BLOCK: BlockId = u32::MAX;
