//! Super-leaf: a logical 64 KiB container of non-contiguous sub-pages
//! (component E), plus the parallel-I/O split algorithm (component F's
//! hardest sub-routine, grounded here because it operates entirely on a
//! single super-leaf's sub-pages).

use crate::block::{BlockId, INVALID_BLOCK};
use crate::error::{Error, Result};
use crate::hash::sub_page_index;
use crate::ssd::disk::Disk;
use crate::ssd::sub_page::{SubPage, ENTRIES_PER_SUB_PAGE};

/// Sub-pages per super-leaf (64 KiB logical capacity at 4 KiB sub-pages).
pub const SUB_PAGES_PER_SUPER_LEAF: usize = 16;

/// Fraction of total capacity at which a super-leaf is considered full
/// enough that the next insertion targeting a full sub-page must split.
const FULLNESS_RATIO: f64 = 0.9;

/// Opaque identity of a super-leaf within its owning tree's arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct SuperLeafId(pub u64);

/// A logical container of `SUB_PAGES_PER_SUPER_LEAF` sub-pages, addressed by
/// independent block IDs and cached lazily in memory.
pub struct SuperLeaf {
    total_entries: usize,
    block_ids: [BlockId; SUB_PAGES_PER_SUPER_LEAF],
    cached: [Option<SubPage>; SUB_PAGES_PER_SUPER_LEAF],
    dirty: [bool; SUB_PAGES_PER_SUPER_LEAF],
    /// Next super-leaf in key order, if any.
    pub next: Option<SuperLeafId>,
    /// Previous super-leaf in key order, if any.
    pub prev: Option<SuperLeafId>,
}

/// Signals that an insertion could not complete because its target
/// sub-page is full; the caller must split this super-leaf and retry.
#[derive(Debug)]
pub struct SplitRequired;

/// The outcome of [`SuperLeaf::split`]: the key promoted to the parent and
/// the freshly created right sibling.
pub struct SplitOutcome {
    /// Median key; everything `< median_key` stayed in the original leaf.
    pub median_key: u32,
    /// The new right super-leaf, already flushed to disk.
    pub right: SuperLeaf,
}

impl Default for SuperLeaf {
    fn default() -> Self {
        Self::new()
    }
}

impl SuperLeaf {
    /// Creates an empty super-leaf with no sub-pages allocated yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_entries: 0,
            block_ids: [INVALID_BLOCK; SUB_PAGES_PER_SUPER_LEAF],
            cached: std::array::from_fn(|_| None),
            dirty: [false; SUB_PAGES_PER_SUPER_LEAF],
            next: None,
            prev: None,
        }
    }

    /// Total entries across all sub-pages (cached or not).
    #[must_use]
    pub fn total_entries(&self) -> usize {
        self.total_entries
    }

    /// Total logical capacity in entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        SUB_PAGES_PER_SUPER_LEAF * ENTRIES_PER_SUB_PAGE
    }

    /// Whether this super-leaf has crossed the fullness threshold at which
    /// the next insertion targeting a full sub-page must trigger a split.
    #[must_use]
    pub fn is_full(&self) -> bool {
        #[allow(clippy::cast_precision_loss)]
        let threshold = FULLNESS_RATIO * self.capacity() as f64;
        #[allow(clippy::cast_precision_loss)]
        let entries = self.total_entries as f64;
        entries >= threshold
    }

    fn load(&mut self, disk: &mut Disk, i: usize) -> Result<()> {
        if self.cached[i].is_some() {
            return Ok(());
        }
        if self.block_ids[i] == INVALID_BLOCK {
            self.block_ids[i] = disk.allocate()?;
            self.cached[i] = Some(SubPage::new());
        } else {
            self.cached[i] = Some(disk.read_sub_page(self.block_ids[i])?);
        }
        Ok(())
    }

    /// Loads (allocating on demand) and returns the sub-page at slot `i`.
    pub fn sub_page_mut(&mut self, disk: &mut Disk, i: usize) -> Result<&mut SubPage> {
        self.load(disk, i)?;
        Ok(self.cached[i].as_mut().expect("just loaded"))
    }

    /// Returns slot `i`'s sub-page for an in-progress redistribution,
    /// creating a genuinely empty page on first touch rather than
    /// consulting disk. Used only by [`Self::split`]: after the cache is
    /// cleared, `block_ids` on the (reused) left side still point at the
    /// pre-split disk image, and `load`'s disk-read branch would resurrect
    /// it instead of starting from nothing.
    fn fresh_sub_page_mut(&mut self, i: usize) -> &mut SubPage {
        self.cached[i].get_or_insert_with(SubPage::new)
    }

    /// Searches for `key`, routing via its hashed sub-page so exactly one
    /// 4 KiB read is required.
    pub fn search_hashed(&mut self, disk: &mut Disk, key: u32) -> Result<Option<i64>> {
        let i = sub_page_index(key, SUB_PAGES_PER_SUPER_LEAF);
        if self.block_ids[i] == INVALID_BLOCK && self.cached[i].is_none() {
            return Ok(None);
        }
        let page = self.sub_page_mut(disk, i)?;
        Ok(page.search(key))
    }

    /// Inserts/updates `key` in its hashed sub-page.
    ///
    /// Returns `Err(SplitRequired)` when the target sub-page is full and
    /// `key` was not already present there.
    pub fn insert_hashed(
        &mut self,
        disk: &mut Disk,
        key: u32,
        value: i64,
    ) -> Result<std::result::Result<(), SplitRequired>> {
        let i = sub_page_index(key, SUB_PAGES_PER_SUPER_LEAF);
        let was_present = {
            let page = self.sub_page_mut(disk, i)?;
            page.search(key).is_some()
        };

        let page = self.sub_page_mut(disk, i)?;
        if !page.upsert(key, value) {
            return Ok(Err(SplitRequired));
        }
        self.dirty[i] = true;
        if !was_present {
            self.total_entries += 1;
        }
        Ok(Ok(()))
    }

    /// Deletes `key` from its hashed sub-page.
    pub fn delete_hashed(&mut self, disk: &mut Disk, key: u32) -> Result<bool> {
        let i = sub_page_index(key, SUB_PAGES_PER_SUPER_LEAF);
        if self.block_ids[i] == INVALID_BLOCK && self.cached[i].is_none() {
            return Ok(false);
        }
        let page = self.sub_page_mut(disk, i)?;
        let removed = page.delete(key);
        if removed {
            self.dirty[i] = true;
            self.total_entries -= 1;
        }
        Ok(removed)
    }

    /// Writes back every cached sub-page whose dirty flag is set, clearing
    /// the flag.
    pub fn flush_dirty(&mut self, disk: &mut Disk) -> Result<()> {
        for i in 0..SUB_PAGES_PER_SUPER_LEAF {
            if !self.dirty[i] {
                continue;
            }
            if self.block_ids[i] == INVALID_BLOCK {
                self.block_ids[i] = disk.allocate()?;
            }
            let Some(page) = self.cached[i].as_mut() else {
                continue;
            };
            page.prepare_for_compression();
            disk.write_sub_page(self.block_ids[i], page)?;
            self.dirty[i] = false;
        }
        Ok(())
    }

    /// Checks the super-leaf invariants: `total_entries` equals the sum of
    /// entries across materialized sub-pages, and every key present hashes
    /// to its containing sub-page index.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut sum = 0;
        for (i, page) in self.cached.iter().enumerate() {
            let Some(page) = page else { continue };
            if !page.is_consistent() {
                return false;
            }
            sum += page.len();
            for (key, _) in page.entries() {
                if sub_page_index(key, SUB_PAGES_PER_SUPER_LEAF) != i {
                    return false;
                }
            }
        }
        sum == self.total_entries
    }

    /// Splits this super-leaf into itself (left) and a new right sibling,
    /// promoting the median key.
    ///
    /// Three phases:
    /// 1. Read phase: materialize every allocated-but-uncached sub-page in
    ///    parallel.
    /// 2. Logical split phase: consolidate, sort, and redistribute by
    ///    hashing each pair into its target super-leaf.
    /// 3. Write phase: allocate fresh blocks for the right side and flush
    ///    both sides.
    pub fn split(&mut self, disk: &mut Disk) -> Result<SplitOutcome> {
        log::debug!("splitting super-leaf with {} entries", self.total_entries);
        // --- Read phase ---
        let to_load: Vec<usize> = (0..SUB_PAGES_PER_SUPER_LEAF)
            .filter(|&i| self.cached[i].is_none() && self.block_ids[i] != INVALID_BLOCK)
            .collect();

        if !to_load.is_empty() {
            let disk_ref: &Disk = disk;
            let loaded: Vec<(usize, Result<SubPage>)> = std::thread::scope(|scope| {
                let handles: Vec<_> = to_load
                    .iter()
                    .map(|&i| {
                        let block_id = self.block_ids[i];
                        scope.spawn(move || (i, disk_ref.read_sub_page(block_id)))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().expect("sub-page read thread panicked"))
                    .collect()
            });
            for (i, result) in loaded {
                self.cached[i] = Some(result?);
            }
        }

        // --- Logical split phase ---
        let mut all: Vec<(u32, i64)> = self
            .cached
            .iter()
            .flatten()
            .flat_map(SubPage::entries)
            .collect();
        all.sort_unstable_by_key(|&(k, _)| k);

        if all.is_empty() {
            return Err(Error::Inconsistent("cannot split an empty super-leaf"));
        }

        let median_index = all.len() / 2;
        let median_key = all[median_index].0;

        let (left_pairs, right_pairs): (Vec<_>, Vec<_>) =
            all.into_iter().partition(|&(k, _)| k < median_key);

        // Clear both sides' caches; block IDs on the left are kept for
        // reuse (their content will be overwritten by `flush_dirty` below),
        // the right side starts fully unallocated. Redistribution below
        // must not reload through `block_ids` — see `fresh_sub_page_mut`.
        self.cached = std::array::from_fn(|_| None);
        self.dirty = [false; SUB_PAGES_PER_SUPER_LEAF];
        self.total_entries = 0;

        let mut right = SuperLeaf::new();

        for (k, v) in left_pairs {
            let i = sub_page_index(k, SUB_PAGES_PER_SUPER_LEAF);
            let page = self.fresh_sub_page_mut(i);
            page.upsert(k, v);
            self.dirty[i] = true;
            self.total_entries += 1;
        }

        for (k, v) in right_pairs {
            let i = sub_page_index(k, SUB_PAGES_PER_SUPER_LEAF);
            let page = right.fresh_sub_page_mut(i);
            page.upsert(k, v);
            right.dirty[i] = true;
            right.total_entries += 1;
        }

        // --- Write phase ---
        self.flush_dirty(disk)?;
        right.flush_dirty(disk)?;

        Ok(SplitOutcome { median_key, right })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn scratch_disk() -> (NamedTempFile, Disk) {
        let tmp = NamedTempFile::new().unwrap();
        let disk = Disk::open(tmp.path(), 4096).unwrap();
        (tmp, disk)
    }

    #[test]
    fn insert_search_delete_round_trip() {
        let (_tmp, mut disk) = scratch_disk();
        let mut leaf = SuperLeaf::new();

        for k in 0..200u32 {
            leaf.insert_hashed(&mut disk, k, i64::from(k) * 2)
                .unwrap()
                .unwrap();
        }
        assert_eq!(leaf.total_entries(), 200);
        assert!(leaf.is_consistent());

        for k in 0..200u32 {
            assert_eq!(
                leaf.search_hashed(&mut disk, k).unwrap(),
                Some(i64::from(k) * 2)
            );
        }

        assert!(leaf.delete_hashed(&mut disk, 50).unwrap());
        assert_eq!(leaf.search_hashed(&mut disk, 50).unwrap(), None);
        assert_eq!(leaf.total_entries(), 199);
    }

    #[test]
    fn flush_then_reload_from_disk_survives() {
        let (_tmp, mut disk) = scratch_disk();
        let mut leaf = SuperLeaf::new();
        leaf.insert_hashed(&mut disk, 42, 4242).unwrap().unwrap();
        leaf.flush_dirty(&mut disk).unwrap();

        // Drop the in-memory cache, forcing a disk read on next access.
        leaf.cached = std::array::from_fn(|_| None);
        assert_eq!(leaf.search_hashed(&mut disk, 42).unwrap(), Some(4242));
    }

    #[test]
    fn split_preserves_all_entries_and_ordering() {
        let (_tmp, mut disk) = scratch_disk();
        let mut leaf = SuperLeaf::new();

        for k in 0..100u32 {
            leaf.insert_hashed(&mut disk, k, i64::from(k)).unwrap().unwrap();
        }

        let outcome = leaf.split(&mut disk).unwrap();
        assert_eq!(leaf.total_entries() + outcome.right.total_entries(), 100);
        assert!(leaf.is_consistent());
        assert!(outcome.right.is_consistent());

        for k in 0..100u32 {
            let found_left = leaf.search_hashed(&mut disk, k).unwrap();
            let mut right = outcome.right.clone_for_test();
            let found_right = right.search_hashed(&mut disk, k).unwrap();
            assert_eq!(
                found_left.or(found_right),
                Some(i64::from(k)),
                "key {k} missing after split"
            );
        }

        for k in 0..100u32 {
            if k < outcome.median_key {
                assert_eq!(leaf.search_hashed(&mut disk, k).unwrap(), Some(i64::from(k)));
            }
        }
    }

    #[test]
    fn second_generation_split_does_not_resurrect_deleted_keys() {
        let (_tmp, mut disk) = scratch_disk();
        let mut leaf = SuperLeaf::new();

        for k in 0..300u32 {
            leaf.insert_hashed(&mut disk, k, i64::from(k)).unwrap().unwrap();
        }

        // The first split is the one that writes real bytes to disk via
        // `flush_dirty`; a never-flushed leaf reads back zero-filled and
        // would mask the bug this test targets.
        let _first = leaf.split(&mut disk).unwrap();

        let delete_key = (0..300u32)
            .find(|&k| leaf.search_hashed(&mut disk, k).unwrap().is_some())
            .expect("left side retains some keys after the first split");
        assert!(leaf.delete_hashed(&mut disk, delete_key).unwrap());
        assert_eq!(leaf.search_hashed(&mut disk, delete_key).unwrap(), None);

        // Insert a further batch so the second split's redistribution
        // revisits every sub-page that has live survivors, including
        // whichever one the deleted key used to occupy.
        for k in 1_000..1_100u32 {
            leaf.insert_hashed(&mut disk, k, i64::from(k)).unwrap().unwrap();
        }

        let second = leaf.split(&mut disk).unwrap();

        assert!(leaf.is_consistent());
        assert!(second.right.is_consistent());
        assert_eq!(leaf.search_hashed(&mut disk, delete_key).unwrap(), None);
        let mut right = second.right.clone_for_test();
        assert_eq!(right.search_hashed(&mut disk, delete_key).unwrap(), None);
    }

    // `SuperLeaf` intentionally has no `Clone` in production code (it owns
    // cached pages that are mutated in place); tests need a cheap way to
    // probe the right side without consuming it.
    impl SuperLeaf {
        fn clone_for_test(&self) -> SuperLeaf {
            SuperLeaf {
                total_entries: self.total_entries,
                block_ids: self.block_ids,
                cached: self.cached.clone(),
                dirty: self.dirty,
                next: self.next,
                prev: self.prev,
            }
        }
    }
}
