//! Disk manager: block allocator (A) + block device (B) wired together for
//! the SSD tier's super-leaf sub-pages.

use crate::block::{BlockAllocator, BlockDevice, BlockId, BLOCK_SIZE};
use crate::coding::{Decode, Encode};
use crate::error::{Error, Result};
use crate::ssd::sub_page::SubPage;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::path::Path;

/// Bytes of header in a value block: a `u32` payload length.
const VALUE_HEADER_LEN: usize = 4;
/// Largest payload a single value block can hold.
pub const MAX_VALUE_PAYLOAD: usize = BLOCK_SIZE - VALUE_HEADER_LEN;

/// Owns the SSD tree's storage file and its block bitmap.
///
/// Not internally synchronized: the SSD tree is exclusively owned while a
/// router operation is in progress, so `&mut self` access here is
/// sufficient.
pub struct Disk {
    device: BlockDevice,
    allocator: BlockAllocator,
}

impl Disk {
    /// Opens the storage file, sized for `total_blocks` 4 KiB blocks.
    pub fn open<P: AsRef<Path>>(path: P, total_blocks: u32) -> Result<Self> {
        Ok(Self {
            device: BlockDevice::open(path, total_blocks)?,
            allocator: BlockAllocator::new(total_blocks),
        })
    }

    /// Allocates a fresh block.
    pub fn allocate(&mut self) -> Result<BlockId> {
        self.allocator.allocate().ok_or(Error::OutOfMemory)
    }

    /// Allocates `n` fresh blocks, or none of them on exhaustion.
    pub fn allocate_many(&mut self, n: usize) -> Result<Vec<BlockId>> {
        let mut out = Vec::new();
        if self.allocator.allocate_many(n, &mut out) {
            Ok(out)
        } else {
            Err(Error::OutOfMemory)
        }
    }

    /// Number of blocks currently issued.
    #[must_use]
    pub fn allocated_blocks(&self) -> u32 {
        self.allocator.allocated_blocks()
    }

    /// Frees a previously allocated block.
    pub fn free(&mut self, id: BlockId) {
        self.allocator.free(id);
    }

    /// Frees every block in `ids`.
    pub fn free_many(&mut self, ids: &[BlockId]) {
        self.allocator.free_many(ids);
    }

    /// Reads and decodes the sub-page stored at `id`.
    pub fn read_sub_page(&self, id: BlockId) -> Result<SubPage> {
        let bytes = self.device.read_block(id)?;
        SubPage::decode_from(&mut &bytes[..])
    }

    /// Encodes and writes `page` at `id`.
    pub fn write_sub_page(&self, id: BlockId, page: &SubPage) -> Result<()> {
        self.device.write_block(id, &page.encode_into_vec())
    }

    /// Writes `payload` into a single fresh block, length-prefixed.
    /// `payload.len()` must not exceed [`MAX_VALUE_PAYLOAD`].
    pub fn write_value(&mut self, payload: &[u8]) -> Result<BlockId> {
        if payload.len() > MAX_VALUE_PAYLOAD {
            return Err(Error::InvalidSize);
        }
        let id = self.allocate()?;
        let mut block = vec![0u8; BLOCK_SIZE];
        #[allow(clippy::cast_possible_truncation)]
        (&mut block[..VALUE_HEADER_LEN])
            .write_u32::<LittleEndian>(payload.len() as u32)
            .expect("fixed-size header write cannot fail");
        block[VALUE_HEADER_LEN..VALUE_HEADER_LEN + payload.len()].copy_from_slice(payload);
        self.device.write_block(id, &block)?;
        Ok(id)
    }

    /// Reads back a payload previously written by [`Self::write_value`].
    pub fn read_value(&self, id: BlockId) -> Result<Vec<u8>> {
        let block = self.device.read_block(id)?;
        let len = (&block[..VALUE_HEADER_LEN])
            .read_u32::<LittleEndian>()
            .expect("fixed-size header read cannot fail") as usize;
        if len > MAX_VALUE_PAYLOAD {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("value block {id} declares an oversized length {len}"),
            )));
        }
        Ok(block[VALUE_HEADER_LEN..VALUE_HEADER_LEN + len].to_vec())
    }

    /// Flushes the storage file.
    pub fn sync(&self) -> Result<()> {
        self.device.sync()
    }
}
