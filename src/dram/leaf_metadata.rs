//! Leaf metadata map (component H): compression state keyed by leaf
//! identity.

use crate::dram::node::LeafId;
use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// Upper bound on a leaf's compressed representation; a leaf that would
/// compress larger than this is kept uncompressed instead.
pub const MAX_COMPRESSED_SIZE: usize = 64 * 1024;

/// Offset, length, and uncompressed length of one hashed sub-page's
/// compressed block within a leaf's `compressed_data` buffer.
#[derive(Copy, Clone, Debug, Default)]
pub struct SubPageBlock {
    pub offset: usize,
    pub len: usize,
    pub uncompressed_len: usize,
}

/// Per-leaf compression bookkeeping. A bucket with no entries has no
/// block, so the index entries are optional.
#[derive(Default)]
pub struct LeafMetadata {
    pub compressed: bool,
    pub compressed_data: Vec<u8>,
    pub sub_page_index: Vec<Option<SubPageBlock>>,
    pub original_entries: usize,
    pub uncompressed_bytes: usize,
    pub compressed_bytes: usize,
}

impl LeafMetadata {
    fn new(sub_pages: usize) -> Self {
        Self {
            compressed: false,
            compressed_data: Vec::with_capacity(MAX_COMPRESSED_SIZE),
            sub_page_index: vec![None; sub_pages],
            original_entries: 0,
            uncompressed_bytes: 0,
            compressed_bytes: 0,
        }
    }
}

/// Instance-owned (one per [`crate::dram::compressed_tree::CompressedTree`])
/// mapping from leaf identity to compression state. The original keeps
/// this as a process-wide singleton; here it is owned by the tree so that
/// multiple trees, and tests, never share mutable state implicitly.
#[derive(Default)]
pub struct LeafMetadataMap {
    entries: Mutex<FxHashMap<LeafId, LeafMetadata>>,
}

impl LeafMetadataMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` with a reference to `leaf`'s metadata, if it has an entry.
    pub fn find<R>(&self, leaf: LeafId, f: impl FnOnce(&LeafMetadata) -> R) -> Option<R> {
        let entries = self.entries.lock().expect("leaf metadata mutex poisoned");
        entries.get(&leaf).map(f)
    }

    /// Runs `f` with a mutable reference to `leaf`'s metadata, if it has
    /// an entry.
    pub fn find_mut<R>(&self, leaf: LeafId, f: impl FnOnce(&mut LeafMetadata) -> R) -> Option<R> {
        let mut entries = self.entries.lock().expect("leaf metadata mutex poisoned");
        entries.get_mut(&leaf).map(f)
    }

    /// Allocates a fresh entry for `leaf`, pre-sizing its compressed buffer
    /// and sub-page index. A no-op if an entry already exists.
    pub fn add(&self, leaf: LeafId, sub_pages: usize) {
        let mut entries = self.entries.lock().expect("leaf metadata mutex poisoned");
        entries.entry(leaf).or_insert_with(|| LeafMetadata::new(sub_pages));
    }

    /// Frees `leaf`'s entry, if any.
    pub fn remove(&self, leaf: LeafId) {
        let mut entries = self.entries.lock().expect("leaf metadata mutex poisoned");
        entries.remove(&leaf);
    }

    /// Sum of uncompressed and compressed bytes across all entries.
    #[must_use]
    pub fn totals(&self) -> (usize, usize) {
        let entries = self.entries.lock().expect("leaf metadata mutex poisoned");
        entries.values().fold((0, 0), |(u, c), meta| {
            (u + meta.uncompressed_bytes, c + meta.compressed_bytes)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_find_remove() {
        let map = LeafMetadataMap::new();
        let leaf = LeafId(1);
        assert!(map.find(leaf, |_| ()).is_none());

        map.add(leaf, 16);
        assert!(map.find(leaf, |_| ()).is_some());

        map.find_mut(leaf, |meta| meta.uncompressed_bytes = 128);
        let (uncompressed, _) = map.totals();
        assert_eq!(uncompressed, 128);

        map.remove(leaf);
        assert!(map.find(leaf, |_| ()).is_none());
    }
}
