//! Side store backing [`crate::dram::Handle`]: the compressed DRAM tree
//! never holds payload bytes itself, only a small integer handle into
//! this map.

use crate::dram::value::Handle;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Owns the actual bytes for every TINY/MEDIUM object currently resident
/// in DRAM.
#[derive(Default)]
pub struct DramObjectStore {
    next_handle: AtomicU64,
    entries: Mutex<FxHashMap<Handle, Vec<u8>>>,
}

impl DramObjectStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `bytes` under a fresh handle.
    pub fn insert(&self, bytes: Vec<u8>) -> Handle {
        let handle = Handle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.entries
            .lock()
            .expect("object store mutex poisoned")
            .insert(handle, bytes);
        handle
    }

    /// Fetches a copy of the bytes stored under `handle`.
    #[must_use]
    pub fn get(&self, handle: Handle) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .expect("object store mutex poisoned")
            .get(&handle)
            .cloned()
    }

    /// Returns the byte length stored under `handle`, without cloning.
    #[must_use]
    pub fn len_of(&self, handle: Handle) -> Option<usize> {
        self.entries
            .lock()
            .expect("object store mutex poisoned")
            .get(&handle)
            .map(Vec::len)
    }

    /// Removes `handle`, returning its bytes if it was present.
    pub fn remove(&self, handle: Handle) -> Option<Vec<u8>> {
        self.entries
            .lock()
            .expect("object store mutex poisoned")
            .remove(&handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let store = DramObjectStore::new();
        let handle = store.insert(b"hello".to_vec());
        assert_eq!(store.get(handle), Some(b"hello".to_vec()));
        assert_eq!(store.len_of(handle), Some(5));
    }

    #[test]
    fn remove_drops_the_entry() {
        let store = DramObjectStore::new();
        let handle = store.insert(b"bye".to_vec());
        assert_eq!(store.remove(handle), Some(b"bye".to_vec()));
        assert_eq!(store.get(handle), None);
    }

    #[test]
    fn distinct_inserts_get_distinct_handles() {
        let store = DramObjectStore::new();
        let a = store.insert(b"a".to_vec());
        let b = store.insert(b"b".to_vec());
        assert_ne!(a, b);
    }
}
