//! Bitmap block allocator (component A).

use super::{BlockId, INVALID_BLOCK};

/// Allocates and frees 4 KiB block IDs over a fixed-size bitmap.
///
/// Not internally synchronized: the owning disk manager is responsible for
/// serializing access; no internal locking is required.
pub struct BlockAllocator {
    bitmap: Vec<u64>,
    total_blocks: u32,
    allocated_blocks: u32,
    next_search_hint: u32,
}

const WORD_BITS: u32 = 64;

impl BlockAllocator {
    /// Creates an allocator over `total_blocks` blocks, all initially free.
    #[must_use]
    pub fn new(total_blocks: u32) -> Self {
        let words = (total_blocks as usize).div_ceil(WORD_BITS as usize);
        Self {
            bitmap: vec![0u64; words],
            total_blocks,
            allocated_blocks: 0,
            next_search_hint: 0,
        }
    }

    /// Total number of blocks managed.
    #[must_use]
    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    /// Number of blocks currently issued.
    #[must_use]
    pub fn allocated_blocks(&self) -> u32 {
        self.allocated_blocks
    }

    fn is_set(&self, id: u32) -> bool {
        let word = (id / WORD_BITS) as usize;
        let bit = id % WORD_BITS;
        (self.bitmap[word] >> bit) & 1 == 1
    }

    fn set(&mut self, id: u32) {
        let word = (id / WORD_BITS) as usize;
        let bit = id % WORD_BITS;
        self.bitmap[word] |= 1u64 << bit;
    }

    fn clear(&mut self, id: u32) {
        let word = (id / WORD_BITS) as usize;
        let bit = id % WORD_BITS;
        self.bitmap[word] &= !(1u64 << bit);
    }

    /// Allocates a single block, scanning from the rolling hint and
    /// wrapping around. Returns `None` iff every block is allocated.
    pub fn allocate(&mut self) -> Option<BlockId> {
        if self.allocated_blocks == self.total_blocks {
            return None;
        }

        for offset in 0..self.total_blocks {
            let id = (self.next_search_hint + offset) % self.total_blocks;
            if !self.is_set(id) {
                self.set(id);
                self.allocated_blocks += 1;
                self.next_search_hint = (id + 1) % self.total_blocks;
                return Some(id);
            }
        }

        None
    }

    /// Allocates `n` blocks, appending them to `out`. On partial failure,
    /// rolls back every block allocated during this attempt and returns
    /// `false`; `out` is left unchanged on failure.
    pub fn allocate_many(&mut self, n: usize, out: &mut Vec<BlockId>) -> bool {
        let mut acquired = Vec::with_capacity(n);

        for _ in 0..n {
            match self.allocate() {
                Some(id) => acquired.push(id),
                None => {
                    for id in acquired {
                        self.free(id);
                    }
                    return false;
                }
            }
        }

        out.extend(acquired);
        true
    }

    /// Frees a block. Freeing an already-free block (or [`INVALID_BLOCK`])
    /// is a no-op.
    pub fn free(&mut self, id: BlockId) {
        if id == INVALID_BLOCK || id >= self.total_blocks {
            return;
        }
        if self.is_set(id) {
            self.clear(id);
            self.allocated_blocks -= 1;
        }
    }

    /// Frees every block in `ids`.
    pub fn free_many(&mut self, ids: &[BlockId]) {
        for &id in ids {
            self.free(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_fills_then_exhausts() {
        let mut allocator = BlockAllocator::new(4);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let id = allocator.allocate().expect("should have free blocks");
            assert!(seen.insert(id));
        }
        assert_eq!(allocator.allocate(), None);
        assert_eq!(allocator.allocated_blocks(), 4);
    }

    #[test]
    fn free_then_reallocate() {
        let mut allocator = BlockAllocator::new(2);
        let a = allocator.allocate().unwrap();
        let _b = allocator.allocate().unwrap();
        assert_eq!(allocator.allocate(), None);

        allocator.free(a);
        assert_eq!(allocator.allocated_blocks(), 1);
        let reused = allocator.allocate().unwrap();
        assert_eq!(reused, a);
    }

    #[test]
    fn double_free_is_noop() {
        let mut allocator = BlockAllocator::new(4);
        let id = allocator.allocate().unwrap();
        allocator.free(id);
        allocator.free(id);
        assert_eq!(allocator.allocated_blocks(), 0);
    }

    #[test]
    fn allocate_many_rolls_back_on_exhaustion() {
        let mut allocator = BlockAllocator::new(3);
        let mut out = Vec::new();
        assert!(!allocator.allocate_many(5, &mut out));
        assert!(out.is_empty());
        assert_eq!(allocator.allocated_blocks(), 0);
    }

    #[test]
    fn allocate_many_succeeds_within_capacity() {
        let mut allocator = BlockAllocator::new(8);
        let mut out = Vec::new();
        assert!(allocator.allocate_many(5, &mut out));
        assert_eq!(out.len(), 5);
        assert_eq!(allocator.allocated_blocks(), 5);
    }
}
