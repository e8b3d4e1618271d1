//! Large-object store (component K): an append-only payload file plus an
//! in-memory key-to-descriptor index.

use crate::block::BLOCK_SIZE;
use crate::checksum::checksum;
use crate::error::{Error, Result};
use crate::lo::descriptor::Descriptor;
use rustc_hash::FxHashMap;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

fn round_up_to_block(len: usize) -> usize {
    (len + BLOCK_SIZE - 1) / BLOCK_SIZE * BLOCK_SIZE
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

/// Descriptor index is a plain hash map keyed by hashed key rather than a
/// third B+tree: every required operation here is a point lookup, and
/// range scans spanning tiers are out of scope, so there is nothing an
/// ordered structure would buy this index.
pub struct LargeObjectStore {
    file: File,
    append_offset: Mutex<u64>,
    index: Mutex<FxHashMap<u32, Descriptor>>,
}

impl LargeObjectStore {
    /// Opens (creating if necessary) the append-only storage file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        let append_offset = file.metadata()?.len();
        Ok(Self {
            file,
            append_offset: Mutex::new(append_offset),
            index: Mutex::new(FxHashMap::default()),
        })
    }

    /// Appends `payload` under `key`, rounding its on-disk footprint up to
    /// a 4 KiB multiple and zero-padding the tail.
    pub fn put(&self, key: u32, payload: &[u8]) -> Result<()> {
        let rounded = round_up_to_block(payload.len());
        let mut buf = vec![0u8; rounded];
        buf[..payload.len()].copy_from_slice(payload);

        let mut offset = self.append_offset.lock().expect("append offset mutex poisoned");
        let lba = *offset;
        self.file.write_at(&buf, lba)?;
        self.file.sync_all()?;
        *offset += rounded as u64;
        drop(offset);

        let descriptor = Descriptor {
            lba,
            #[allow(clippy::cast_possible_truncation)]
            size: payload.len() as u64,
            checksum: checksum(payload),
            timestamp: now_unix(),
        };
        self.index
            .lock()
            .expect("large-object index mutex poisoned")
            .insert(key, descriptor);
        Ok(())
    }

    /// Reads the payload for `key`, verifying its checksum.
    pub fn get(&self, key: u32) -> Result<Option<Vec<u8>>> {
        let descriptor = {
            let index = self.index.lock().expect("large-object index mutex poisoned");
            let Some(&d) = index.get(&key) else {
                return Ok(None);
            };
            d
        };

        #[allow(clippy::cast_possible_truncation)]
        let mut buf = vec![0u8; descriptor.size as usize];
        let n = self.file.read_at(&mut buf, descriptor.lba)?;
        if n as u64 != descriptor.size {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                format!(
                    "short read of large object at lba {}: got {n} of {} bytes",
                    descriptor.lba, descriptor.size
                ),
            )));
        }
        if checksum(&buf) != descriptor.checksum {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("checksum mismatch for large object at lba {}", descriptor.lba),
            )));
        }
        Ok(Some(buf))
    }

    /// Whether `key` currently has a descriptor, without reading the
    /// payload or verifying its checksum.
    #[must_use]
    pub fn contains(&self, key: u32) -> bool {
        self.index
            .lock()
            .expect("large-object index mutex poisoned")
            .contains_key(&key)
    }

    /// Removes `key`'s descriptor. The byte range on disk is not
    /// reclaimed; garbage-collecting the append log is out of scope.
    pub fn delete(&self, key: u32) -> bool {
        self.index
            .lock()
            .expect("large-object index mutex poisoned")
            .remove(&key)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn put_then_get_round_trips() {
        let tmp = NamedTempFile::new().unwrap();
        let store = LargeObjectStore::open(tmp.path()).unwrap();
        store.put(1, b"hello large object").unwrap();
        assert_eq!(store.get(1).unwrap().as_deref(), Some(&b"hello large object"[..]));
    }

    #[test]
    fn delete_then_get_is_none() {
        let tmp = NamedTempFile::new().unwrap();
        let store = LargeObjectStore::open(tmp.path()).unwrap();
        store.put(1, b"payload").unwrap();
        assert!(store.delete(1));
        assert_eq!(store.get(1).unwrap(), None);
        assert!(!store.delete(1));
    }

    #[test]
    fn corrupted_payload_surfaces_checksum_mismatch() {
        let tmp = NamedTempFile::new().unwrap();
        let store = LargeObjectStore::open(tmp.path()).unwrap();
        store.put(7, b"trustworthy bytes").unwrap();

        let descriptor = store.index.lock().unwrap()[&7];
        let corrupted = vec![0xFFu8; descriptor.size as usize];
        store.file.write_at(&corrupted, descriptor.lba).unwrap();

        assert!(matches!(store.get(7), Err(Error::Io(_))));
    }

    #[test]
    fn footprint_is_rounded_up_to_a_block_multiple() {
        assert_eq!(round_up_to_block(1), BLOCK_SIZE);
        assert_eq!(round_up_to_block(BLOCK_SIZE), BLOCK_SIZE);
        assert_eq!(round_up_to_block(BLOCK_SIZE + 1), BLOCK_SIZE * 2);
    }
}
