//! Fixed 4 KiB sub-page layout (component D).

use crate::block::BLOCK_SIZE;
use crate::coding::{Decode, Encode};
use crate::error::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

const HEADER_SIZE: usize = 16;
const ENTRY_SIZE: usize = 4 /* key: u32 */ + 8 /* value: i64 */;

/// Number of (key, value) entries a sub-page can hold.
pub const ENTRIES_PER_SUB_PAGE: usize = (BLOCK_SIZE - HEADER_SIZE) / ENTRY_SIZE;

/// Sentinel for "no next sub-page in this chain".
pub const NO_NEXT_SUB_PAGE: i32 = -1;

/// A fixed-layout 4 KiB page holding a sorted (key, value) array.
///
/// Unused key/value slots are always zero, and `entries` never exceeds
/// [`ENTRIES_PER_SUB_PAGE`]; both are checked by [`SubPage::is_consistent`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubPage {
    /// Index of a logically-chained next sub-page, or [`NO_NEXT_SUB_PAGE`].
    pub next_sub_page: i32,
    keys: [u32; ENTRIES_PER_SUB_PAGE],
    values: [i64; ENTRIES_PER_SUB_PAGE],
    entries: usize,
}

impl Default for SubPage {
    fn default() -> Self {
        Self::new()
    }
}

impl SubPage {
    /// Creates an empty sub-page.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_sub_page: NO_NEXT_SUB_PAGE,
            keys: [0; ENTRIES_PER_SUB_PAGE],
            values: [0; ENTRIES_PER_SUB_PAGE],
            entries: 0,
        }
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
    }

    /// Whether the sub-page holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Whether inserting one more distinct key would not fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries >= ENTRIES_PER_SUB_PAGE
    }

    /// Returns all live (key, value) pairs in sorted order.
    #[must_use]
    pub fn entries(&self) -> Vec<(u32, i64)> {
        self.keys[..self.entries]
            .iter()
            .copied()
            .zip(self.values[..self.entries].iter().copied())
            .collect()
    }

    fn position_of(&self, key: u32) -> std::result::Result<usize, usize> {
        self.keys[..self.entries].binary_search(&key)
    }

    /// Binary search for `key`.
    #[must_use]
    pub fn search(&self, key: u32) -> Option<i64> {
        self.position_of(key).ok().map(|i| self.values[i])
    }

    /// Inserts or updates `key`. Returns `false` if the page is full and
    /// `key` was not already present (caller must treat this as a
    /// "split required" signal).
    pub fn upsert(&mut self, key: u32, value: i64) -> bool {
        match self.position_of(key) {
            Ok(i) => {
                self.values[i] = value;
                true
            }
            Err(i) => {
                if self.is_full() {
                    return false;
                }
                for j in (i..self.entries).rev() {
                    self.keys[j + 1] = self.keys[j];
                    self.values[j + 1] = self.values[j];
                }
                self.keys[i] = key;
                self.values[i] = value;
                self.entries += 1;
                true
            }
        }
    }

    /// Deletes `key` if present, shifting later entries left.
    /// Returns whether a key was removed.
    pub fn delete(&mut self, key: u32) -> bool {
        let Ok(i) = self.position_of(key) else {
            return false;
        };
        for j in i..self.entries - 1 {
            self.keys[j] = self.keys[j + 1];
            self.values[j] = self.values[j + 1];
        }
        self.entries -= 1;
        self.keys[self.entries] = 0;
        self.values[self.entries] = 0;
        true
    }

    /// Zeros all unused key/value slots and any trailing tail, so the
    /// on-disk image is dense where used and zero where unused. Insert and
    /// delete already maintain this, so this is primarily a defensive
    /// pre-write-back step for callers that mutated the arrays directly.
    pub fn prepare_for_compression(&mut self) {
        for i in self.entries..ENTRIES_PER_SUB_PAGE {
            self.keys[i] = 0;
            self.values[i] = 0;
        }
    }

    /// Number of bytes occupied by live entries (excludes the header).
    #[must_use]
    pub fn used_space(&self) -> usize {
        self.entries * ENTRY_SIZE
    }

    /// Number of unused payload bytes (excludes the header).
    #[must_use]
    pub fn unused_space(&self) -> usize {
        (ENTRIES_PER_SUB_PAGE - self.entries) * ENTRY_SIZE
    }

    /// Checks the layout invariants: `entries <= K`, keys strictly sorted,
    /// unused slots are zero.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        if self.entries > ENTRIES_PER_SUB_PAGE {
            return false;
        }
        if !self.keys[..self.entries].windows(2).all(|w| w[0] < w[1]) {
            return false;
        }
        self.keys[self.entries..].iter().all(|&k| k == 0)
            && self.values[self.entries..].iter().all(|&v| v == 0)
    }
}

impl Encode for SubPage {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<()> {
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.entries as u32)?;
        writer.write_i32::<LittleEndian>(self.next_sub_page)?;
        writer.write_u64::<LittleEndian>(0)?; // reserved
        for &key in &self.keys {
            writer.write_u32::<LittleEndian>(key)?;
        }
        for &value in &self.values {
            writer.write_i64::<LittleEndian>(value)?;
        }
        Ok(())
    }
}

impl Decode for SubPage {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self> {
        let entries = reader.read_u32::<LittleEndian>()? as usize;
        if entries > ENTRIES_PER_SUB_PAGE {
            return Err(Error::Inconsistent("sub-page entries exceeds capacity"));
        }
        let next_sub_page = reader.read_i32::<LittleEndian>()?;
        let _reserved = reader.read_u64::<LittleEndian>()?;

        let mut keys = [0u32; ENTRIES_PER_SUB_PAGE];
        for key in &mut keys {
            *key = reader.read_u32::<LittleEndian>()?;
        }
        let mut values = [0i64; ENTRIES_PER_SUB_PAGE];
        for value in &mut values {
            *value = reader.read_i64::<LittleEndian>()?;
        }

        Ok(Self {
            next_sub_page,
            keys,
            values,
            entries,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_sorted_order() {
        let mut page = SubPage::new();
        for &k in &[5, 1, 3, 2, 4] {
            assert!(page.upsert(k, i64::from(k) * 10));
        }
        assert_eq!(
            page.entries(),
            vec![(1, 10), (2, 20), (3, 30), (4, 40), (5, 50)]
        );
        assert!(page.is_consistent());
    }

    #[test]
    fn update_overwrites_in_place() {
        let mut page = SubPage::new();
        page.upsert(1, 100);
        page.upsert(1, 200);
        assert_eq!(page.len(), 1);
        assert_eq!(page.search(1), Some(200));
    }

    #[test]
    fn delete_shifts_left_and_zeros_tail() {
        let mut page = SubPage::new();
        page.upsert(1, 10);
        page.upsert(2, 20);
        page.upsert(3, 30);
        assert!(page.delete(2));
        assert_eq!(page.entries(), vec![(1, 10), (3, 30)]);
        assert!(page.is_consistent());
        assert!(!page.delete(2));
    }

    #[test]
    fn full_page_rejects_new_key() {
        let mut page = SubPage::new();
        for k in 0..ENTRIES_PER_SUB_PAGE as u32 {
            assert!(page.upsert(k, i64::from(k)));
        }
        assert!(page.is_full());
        assert!(!page.upsert(ENTRIES_PER_SUB_PAGE as u32, 0));
        // Updating an existing key still works when full.
        assert!(page.upsert(0, 999));
    }

    #[test]
    fn encode_decode_round_trip_is_bitwise() {
        let mut page = SubPage::new();
        page.upsert(7, 70);
        page.upsert(3, 30);
        page.next_sub_page = 2;

        let bytes = page.encode_into_vec();
        assert_eq!(bytes.len(), BLOCK_SIZE);

        let decoded = SubPage::decode_from(&mut &bytes[..]).unwrap();
        assert_eq!(decoded, page);
        assert_eq!(decoded.encode_into_vec(), bytes);
    }

    #[test]
    fn empty_page_serializes_to_all_zero_payload() {
        let page = SubPage::new();
        let bytes = page.encode_into_vec();
        // entries=0 (4 bytes) + next=-1 (4 bytes) + reserved (8 bytes) = 16-byte header.
        assert!(bytes[16..].iter().all(|&b| b == 0));
    }
}
