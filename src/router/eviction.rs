//! Second-chance clock eviction over the DRAM tier's resident objects
//! (component M).
//!
//! Pages are 4 KiB in the source; this rewrite keeps that as the
//! accounting unit but does not require an object to fill its page, since
//! TINY/MEDIUM objects are far smaller than that in the common case. One
//! slot tracks one resident key.

use rustc_hash::FxHashMap;
use std::sync::Mutex;

/// Accounting unit the clock sweeps over, matching the source's 4 KiB
/// DRAM page.
pub const PAGE_SIZE: usize = 4096;

struct Slot {
    key_hash: u32,
    size: usize,
    access_bit: bool,
}

struct State {
    slots: Vec<Option<Slot>>,
    index: FxHashMap<u32, usize>,
    free: Vec<usize>,
    hand: usize,
    memory_used: usize,
    memory_capacity: usize,
}

/// Tracks which hashed keys are DRAM-resident and drives the
/// second-chance sweep used to bring `memory_used` back under the
/// eviction threshold.
pub struct EvictionEngine {
    state: Mutex<State>,
}

impl EvictionEngine {
    #[must_use]
    pub fn new(memory_capacity: usize) -> Self {
        Self {
            state: Mutex::new(State {
                slots: Vec::new(),
                index: FxHashMap::default(),
                free: Vec::new(),
                hand: 0,
                memory_used: 0,
                memory_capacity,
            }),
        }
    }

    /// Records that `key_hash` now occupies `size` bytes of DRAM,
    /// creating a fresh slot or updating an existing one. Either way the
    /// slot's access bit is set, matching a fresh reference.
    pub fn record_access(&self, key_hash: u32, size: usize) {
        let mut state = self.state.lock().expect("eviction state mutex poisoned");
        if let Some(&idx) = state.index.get(&key_hash) {
            let slot = state.slots[idx].as_mut().expect("indexed slot missing");
            let old_size = slot.size;
            slot.size = size;
            slot.access_bit = true;
            state.memory_used = state.memory_used - old_size + size;
            return;
        }
        let idx = state.free.pop().unwrap_or_else(|| {
            state.slots.push(None);
            state.slots.len() - 1
        });
        state.slots[idx] = Some(Slot {
            key_hash,
            size,
            access_bit: true,
        });
        state.index.insert(key_hash, idx);
        state.memory_used += size;
    }

    /// Sets the access bit for `key_hash`'s slot, if tracked. No-op for
    /// keys that were never recorded or have since been evicted.
    pub fn touch(&self, key_hash: u32) {
        let mut state = self.state.lock().expect("eviction state mutex poisoned");
        if let Some(&idx) = state.index.get(&key_hash) {
            if let Some(slot) = state.slots[idx].as_mut() {
                slot.access_bit = true;
            }
        }
    }

    /// Drops `key_hash`'s slot without running it through the clock,
    /// e.g. because the router deleted or overwrote it directly.
    pub fn forget(&self, key_hash: u32) {
        let mut state = self.state.lock().expect("eviction state mutex poisoned");
        if let Some(idx) = state.index.remove(&key_hash) {
            if let Some(slot) = state.slots[idx].take() {
                state.memory_used -= slot.size;
            }
            state.free.push(idx);
        }
    }

    #[must_use]
    pub fn memory_used(&self) -> usize {
        self.state.lock().expect("eviction state mutex poisoned").memory_used
    }

    #[must_use]
    pub fn memory_capacity(&self) -> usize {
        self.state.lock().expect("eviction state mutex poisoned").memory_capacity
    }

    /// Second-chance sweep: advances the clock hand, giving any
    /// recently-accessed slot a pass, until `target_bytes` have been
    /// reclaimed or the hand has covered the table twice without
    /// reclaiming anything (an empty table always returns immediately).
    ///
    /// `on_evict` runs once per victim, after every victim's slot has
    /// already been freed and the internal state lock released — callers
    /// that need to take other locks from `on_evict` must not do so while
    /// holding this engine's lock, to avoid a lock-ordering cycle against
    /// callers of [`Self::record_access`]/[`Self::touch`].
    pub fn evict_towards(&self, target_bytes: usize, mut on_evict: impl FnMut(u32)) -> usize {
        let (victims, reclaimed) = {
            let mut state = self.state.lock().expect("eviction state mutex poisoned");
            let total = state.slots.len();
            if total == 0 {
                return 0;
            }

            let mut victims = Vec::new();
            let mut reclaimed = 0usize;
            let max_steps = total * 2;
            let mut steps = 0usize;
            while reclaimed < target_bytes && steps < max_steps {
                steps += 1;
                let idx = state.hand;
                state.hand = (state.hand + 1) % total;

                let Some(slot) = state.slots[idx].as_mut() else {
                    continue;
                };
                if slot.access_bit {
                    slot.access_bit = false;
                    continue;
                }

                let key_hash = slot.key_hash;
                let size = slot.size;
                state.slots[idx] = None;
                state.index.remove(&key_hash);
                state.free.push(idx);
                state.memory_used -= size;
                reclaimed += size;
                victims.push(key_hash);
            }
            (victims, reclaimed)
        };

        for key_hash in victims {
            on_evict(key_hash);
        }
        reclaimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_forget_tracks_memory_used() {
        let engine = EvictionEngine::new(1 << 20);
        engine.record_access(1, 100);
        engine.record_access(2, 200);
        assert_eq!(engine.memory_used(), 300);
        engine.forget(1);
        assert_eq!(engine.memory_used(), 200);
    }

    #[test]
    fn second_chance_spares_touched_slots() {
        let engine = EvictionEngine::new(1 << 20);
        engine.record_access(1, 100);
        engine.record_access(2, 100);
        engine.touch(1);
        engine.touch(1);

        let mut evicted = Vec::new();
        engine.evict_towards(100, |k| evicted.push(k));

        // Key 1 got a second chance (its access bit was set); key 2 is
        // the only one without one, so it is the one reclaimed first.
        assert_eq!(evicted, vec![2]);
        assert_eq!(engine.memory_used(), 100);
    }

    #[test]
    fn evicts_until_target_reached() {
        let engine = EvictionEngine::new(1 << 20);
        for k in 0..10u32 {
            engine.record_access(k, 50);
        }
        let reclaimed = engine.evict_towards(120, |_| {});
        assert!(reclaimed >= 120);
        assert_eq!(engine.memory_used(), 500 - reclaimed);
    }

    #[test]
    fn empty_table_evicts_nothing() {
        let engine = EvictionEngine::new(1 << 20);
        assert_eq!(engine.evict_towards(100, |_| {}), 0);
    }

    #[test]
    fn reused_slots_do_not_duplicate_memory_accounting() {
        let engine = EvictionEngine::new(1 << 20);
        engine.record_access(1, 100);
        engine.record_access(1, 50);
        assert_eq!(engine.memory_used(), 50);
    }
}
