//! Random-access block device file (component B).

use super::{BlockId, BLOCK_SIZE};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// A file sized to `total_blocks * BLOCK_SIZE`, offering positioned 4 KiB
/// reads and writes at block granularity.
///
/// Positioned I/O uses `read_at`/`write_at` rather than `seek` + `read`,
/// since the device is shared by callers that must not perturb a common
/// cursor.
pub struct BlockDevice {
    file: File,
    total_blocks: u32,
}

impl BlockDevice {
    /// Opens (creating if necessary) the file at `path` and extends it to
    /// cover `total_blocks` blocks if it is currently shorter.
    pub fn open<P: AsRef<Path>>(path: P, total_blocks: u32) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let required_len = u64::from(total_blocks) * BLOCK_SIZE as u64;
        if file.metadata()?.len() < required_len {
            file.set_len(required_len)?;
        }

        Ok(Self { file, total_blocks })
    }

    /// Total number of addressable blocks.
    #[must_use]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    fn offset_of(&self, id: BlockId) -> u64 {
        u64::from(id) * BLOCK_SIZE as u64
    }

    /// Reads exactly one 4 KiB block. A short read is an I/O error.
    pub fn read_block(&self, id: BlockId) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; BLOCK_SIZE];
        let n = self.file.read_at(&mut buf, self.offset_of(id))?;
        if n != BLOCK_SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!("short read of block {id}: got {n} of {BLOCK_SIZE} bytes"),
            )));
        }
        Ok(buf)
    }

    /// Writes exactly one 4 KiB block. `data` must be exactly `BLOCK_SIZE`
    /// bytes; a short write is an I/O error.
    pub fn write_block(&self, id: BlockId, data: &[u8]) -> Result<()> {
        if data.len() != BLOCK_SIZE {
            return Err(Error::InvalidSize);
        }
        let n = self.file.write_at(data, self.offset_of(id))?;
        if n != BLOCK_SIZE {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                format!("short write of block {id}: wrote {n} of {BLOCK_SIZE} bytes"),
            )));
        }
        Ok(())
    }

    /// Flushes and syncs the underlying file.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
