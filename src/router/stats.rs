//! Router accounting (component L).
//!
//! Independent `AtomicU64` counters rather than one struct behind a mutex:
//! none of these need to move together, so there is nothing a shared lock
//! would buy beyond contention.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time snapshot of [`Counters`], returned from
/// [`crate::router::ZipCache::stats`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    pub hits_dram: u64,
    pub hits_lo: u64,
    pub hits_ssd: u64,
    pub misses: u64,
    pub puts_tiny: u64,
    pub puts_medium: u64,
    pub puts_large: u64,
    pub evictions: u64,
    pub promotions: u64,
    pub tombstones: u64,
    pub memory_used: u64,
    pub memory_capacity: u64,
}

/// Live counters, each updated with a single atomic read-modify-write.
#[derive(Default)]
pub struct Counters {
    pub hits_dram: AtomicU64,
    pub hits_lo: AtomicU64,
    pub hits_ssd: AtomicU64,
    pub misses: AtomicU64,
    pub puts_tiny: AtomicU64,
    pub puts_medium: AtomicU64,
    pub puts_large: AtomicU64,
    pub evictions: AtomicU64,
    pub promotions: AtomicU64,
    pub tombstones: AtomicU64,
    pub memory_used: AtomicU64,
    pub memory_capacity: AtomicU64,
}

impl Counters {
    #[must_use]
    pub fn new(memory_capacity: u64) -> Self {
        let counters = Self::default();
        counters.memory_capacity.store(memory_capacity, Ordering::Relaxed);
        counters
    }

    #[must_use]
    pub fn snapshot(&self) -> Stats {
        Stats {
            hits_dram: self.hits_dram.load(Ordering::Relaxed),
            hits_lo: self.hits_lo.load(Ordering::Relaxed),
            hits_ssd: self.hits_ssd.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            puts_tiny: self.puts_tiny.load(Ordering::Relaxed),
            puts_medium: self.puts_medium.load(Ordering::Relaxed),
            puts_large: self.puts_large.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            tombstones: self.tombstones.load(Ordering::Relaxed),
            memory_used: self.memory_used.load(Ordering::Relaxed),
            memory_capacity: self.memory_capacity.load(Ordering::Relaxed),
        }
    }

    /// Resets every counter except `memory_used`/`memory_capacity`, which
    /// reflect current occupancy rather than accumulated activity.
    pub fn reset(&self) {
        self.hits_dram.store(0, Ordering::Relaxed);
        self.hits_lo.store(0, Ordering::Relaxed);
        self.hits_ssd.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.puts_tiny.store(0, Ordering::Relaxed);
        self.puts_medium.store(0, Ordering::Relaxed);
        self.puts_large.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
        self.promotions.store(0, Ordering::Relaxed);
        self.tombstones.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = Counters::new(1024);
        counters.hits_dram.fetch_add(3, Ordering::Relaxed);
        counters.misses.fetch_add(1, Ordering::Relaxed);
        let snap = counters.snapshot();
        assert_eq!(snap.hits_dram, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.memory_capacity, 1024);
    }

    #[test]
    fn reset_clears_activity_but_keeps_memory_counters() {
        let counters = Counters::new(1024);
        counters.hits_dram.fetch_add(5, Ordering::Relaxed);
        counters.memory_used.fetch_add(200, Ordering::Relaxed);
        counters.reset();
        let snap = counters.snapshot();
        assert_eq!(snap.hits_dram, 0);
        assert_eq!(snap.memory_used, 200);
        assert_eq!(snap.memory_capacity, 1024);
    }
}
