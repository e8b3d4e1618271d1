//! Compressed DRAM B+tree (component J): wraps the base tree, the
//! leaf-metadata map, and the write buffer/flusher behind a single public
//! `put`/`get`/`delete` surface.

use crate::codec::{make_codec, Codec};
use crate::config::DramTreeConfig;
use crate::dram::base_tree::BaseTree;
use crate::dram::leaf_metadata::{LeafMetadataMap, SubPageBlock, MAX_COMPRESSED_SIZE};
use crate::dram::node::LeafId;
use crate::dram::value::Value;
use crate::dram::write_buffer::{BufferOp, LeafBuffer};
use crate::error::Result;
use crate::hash::sub_page_index;
use crate::stop_signal::StopSignal;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

struct Inner {
    base: BaseTree,
    buffers: FxHashMap<LeafId, LeafBuffer>,
}

/// The DRAM tier's compressed B+tree. Reads acquire a shared lock, writes
/// an exclusive one.
pub struct CompressedTree {
    inner: RwLock<Inner>,
    metadata: LeafMetadataMap,
    codec: Box<dyn Codec>,
    config: DramTreeConfig,
    queue: Mutex<VecDeque<LeafId>>,
    queue_cv: Condvar,
    stop: StopSignal,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CompressedTree {
    /// Creates a tree and, if lazy compression is enabled, starts its
    /// background flusher thread.
    #[must_use]
    pub fn open(config: DramTreeConfig) -> Arc<Self> {
        let tree = Arc::new(Self {
            inner: RwLock::new(Inner {
                base: BaseTree::new(config.order, config.leaf_entries),
                buffers: FxHashMap::default(),
            }),
            metadata: LeafMetadataMap::new(),
            codec: make_codec(config.algo),
            config,
            queue: Mutex::new(VecDeque::new()),
            queue_cv: Condvar::new(),
            stop: StopSignal::default(),
            worker: Mutex::new(None),
        });

        if tree.config.lazy_compression {
            let worker_tree = Arc::clone(&tree);
            let handle = std::thread::spawn(move || worker_tree.run_flusher());
            *tree.worker.lock().expect("worker mutex poisoned") = Some(handle);
        }

        tree
    }

    fn run_flusher(self: Arc<Self>) {
        loop {
            let leaf = {
                let mut queue = self.queue.lock().expect("queue mutex poisoned");
                loop {
                    if let Some(leaf) = queue.pop_front() {
                        break Some(leaf);
                    }
                    if self.stop.is_stopped() {
                        break None;
                    }
                    queue = self
                        .queue_cv
                        .wait(queue)
                        .expect("queue condition variable poisoned");
                }
            };
            let Some(leaf) = leaf else { break };
            if let Err(e) = self.flush_buffer_to_leaf(leaf) {
                log::error!("background flush of leaf {leaf:?} failed, will retry on next read/flush: {e}");
            }
        }
    }

    /// Inserts or updates `key`.
    pub fn put(&self, key: u32, value: Value) -> Result<()> {
        let raw = value.to_raw();
        let mut inner = self.inner.write().expect("tree rwlock poisoned");

        let leaf_id = match inner.base.find_leaf_for_key(key) {
            Some(id) => id,
            None => {
                inner.base.put(key, raw);
                let id = inner
                    .base
                    .find_leaf_for_key(key)
                    .expect("just inserted into an empty tree");
                if self.config.lazy_compression {
                    self.metadata.add(id, self.config.sub_pages);
                }
                return Ok(());
            }
        };

        if !self.config.lazy_compression {
            self.direct_insert(&mut inner, key, raw);
            return Ok(());
        }

        self.metadata.add(leaf_id, self.config.sub_pages);
        let should_flush = {
            let buffer = inner.buffers.entry(leaf_id).or_default();
            buffer.add(key, BufferOp::Put(raw));
            buffer.len() >= self.config.flush_threshold
        };

        if should_flush {
            drop(inner);
            self.flush_buffer_to_leaf(leaf_id)?;
        } else {
            let mut queue = self.queue.lock().expect("queue mutex poisoned");
            if !queue.contains(&leaf_id) {
                queue.push_back(leaf_id);
            }
            self.queue_cv.notify_one();
        }
        Ok(())
    }

    /// Deletes `key`, using the same buffered path as `put`.
    pub fn delete(&self, key: u32) -> Result<bool> {
        let mut inner = self.inner.write().expect("tree rwlock poisoned");
        let Some(leaf_id) = inner.base.find_leaf_for_key(key) else {
            return Ok(false);
        };

        let was_present = self.lookup_resident(&inner, leaf_id, key).is_some()
            || inner
                .buffers
                .get(&leaf_id)
                .and_then(|b| b.peek(key))
                .is_some_and(|op| matches!(op, BufferOp::Put(_)));

        if !self.config.lazy_compression {
            return Ok(inner.base.delete(key));
        }

        let buffer = inner.buffers.entry(leaf_id).or_default();
        buffer.add(key, BufferOp::Delete);
        let should_flush = buffer.len() >= self.config.flush_threshold;
        drop(inner);
        if should_flush {
            self.flush_buffer_to_leaf(leaf_id)?;
        }
        Ok(was_present)
    }

    /// Looks up `key`. Consults the leaf's write buffer first: a buffered
    /// record is guaranteed newer than whatever is compressed into the
    /// leaf, since the buffer is only drained by a flush that also
    /// updates the leaf.
    pub fn get(&self, key: u32) -> Result<Option<Value>> {
        let inner = self.inner.read().expect("tree rwlock poisoned");
        let Some(leaf_id) = inner.base.find_leaf_for_key(key) else {
            return Ok(None);
        };

        if let Some(op) = inner.buffers.get(&leaf_id).and_then(|b| b.peek(key)) {
            return Ok(match op {
                BufferOp::Put(raw) => Some(Value::from_raw(raw)),
                BufferOp::Delete => None,
            });
        }

        Ok(self.lookup_resident(&inner, leaf_id, key).map(Value::from_raw))
    }

    /// Looks up `key` in its leaf, ignoring any buffered record: either a
    /// raw array search or a single-bucket decompress-and-search,
    /// depending on whether the leaf is currently compressed.
    fn lookup_resident(&self, inner: &Inner, leaf_id: LeafId, key: u32) -> Option<i64> {
        let compressed = self
            .metadata
            .find(leaf_id, |meta| meta.compressed)
            .unwrap_or(false);

        if !compressed {
            return inner.base.leaf(leaf_id).search(key);
        }

        let bucket = sub_page_index(key, self.config.sub_pages);
        self.metadata
            .find(leaf_id, |meta| {
                let block = meta.sub_page_index.get(bucket).copied().flatten()?;
                let bytes = &meta.compressed_data[block.offset..block.offset + block.len];
                let decompressed = self.codec.decompress(bytes, block.uncompressed_len).ok()?;
                decode_bucket(&decompressed)
                    .into_iter()
                    .find(|&(k, _)| k == key)
                    .map(|(_, v)| v)
            })
            .flatten()
    }

    fn direct_insert(&self, inner: &mut Inner, key: u32, raw: i64) {
        if let Some(new_leaf) = inner.base.put(key, raw) {
            if self.config.lazy_compression {
                self.metadata.add(new_leaf, self.config.sub_pages);
            }
        }
    }

    /// Runs flush semantics for `leaf_id`: decompress if needed, apply
    /// every buffered record in arrival order, then re-compress.
    fn flush_buffer_to_leaf(&self, leaf_id: LeafId) -> Result<()> {
        let mut inner = self.inner.write().expect("tree rwlock poisoned");
        let drained = match inner.buffers.get_mut(&leaf_id) {
            Some(buffer) if !buffer.is_empty() => buffer.drain(),
            _ => return Ok(()),
        };
        log::debug!("flushing {} buffered records for leaf {leaf_id:?}", drained.len());

        let compressed = self
            .metadata
            .find(leaf_id, |meta| meta.compressed)
            .unwrap_or(false);
        if compressed {
            self.decompress_into_base(&mut inner, leaf_id)?;
        }

        // Re-route every buffered record through the base tree's own
        // put/delete rather than touching `leaf_id`'s arrays directly: an
        // earlier record in this same batch may have already split
        // `leaf_id`, moving the key-space boundary for later records.
        let mut new_leaves = Vec::new();
        for (key, op) in drained {
            match op {
                BufferOp::Put(raw) => {
                    if let Some(new_leaf) = inner.base.put(key, raw) {
                        new_leaves.push(new_leaf);
                    }
                }
                BufferOp::Delete => {
                    inner.base.delete(key);
                }
            }
        }

        for leaf in new_leaves {
            self.metadata.add(leaf, self.config.sub_pages);
        }

        self.compress_leaf(&mut inner, leaf_id)?;
        Ok(())
    }

    fn decompress_into_base(&self, inner: &mut Inner, leaf_id: LeafId) -> Result<()> {
        let mut pairs = Vec::new();
        let result = self.metadata.find_mut(leaf_id, |meta| -> Result<()> {
            for block in meta.sub_page_index.iter_mut().flatten() {
                let bytes = &meta.compressed_data[block.offset..block.offset + block.len];
                let raw = self.codec.decompress(bytes, block.uncompressed_len).map_err(|e| {
                    log::error!("leaf {leaf_id:?}: decompression failed, leaf stays marked compressed: {e}");
                    e
                })?;
                pairs.extend(decode_bucket(&raw));
            }
            meta.compressed = false;
            meta.compressed_data.clear();
            for block in &mut meta.sub_page_index {
                *block = None;
            }
            Ok(())
        });
        result.unwrap_or(Ok(()))?;

        pairs.sort_unstable_by_key(|&(k, _)| k);
        let leaf = inner.base.leaf_mut(leaf_id);
        leaf.keys = pairs.iter().map(|&(k, _)| k).collect();
        leaf.values = pairs.iter().map(|&(_, v)| v).collect();
        Ok(())
    }

    /// Partitions the leaf's (key, value) pairs by `hash(key) mod
    /// sub_pages` and compresses each non-empty bucket independently, so
    /// a point lookup decompresses at most one block.
    fn compress_leaf(&self, inner: &mut Inner, leaf_id: LeafId) -> Result<()> {
        let leaf = inner.base.leaf(leaf_id);
        let mut buckets: Vec<Vec<(u32, i64)>> = vec![Vec::new(); self.config.sub_pages];
        for (&key, &value) in leaf.keys.iter().zip(leaf.values.iter()) {
            buckets[sub_page_index(key, self.config.sub_pages)].push((key, value));
        }
        let original_entries = leaf.keys.len();
        let uncompressed_bytes = original_entries * 12;

        let mut compressed_data = Vec::new();
        let mut sub_page_index_blocks = vec![None; self.config.sub_pages];
        for (i, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let raw = encode_bucket(&bucket);
            let compressed = self.codec.compress(&raw);
            let offset = compressed_data.len();
            compressed_data.extend_from_slice(&compressed);
            sub_page_index_blocks[i] = Some(SubPageBlock {
                offset,
                len: compressed.len(),
                uncompressed_len: raw.len(),
            });
        }

        let fits = compressed_data.len() <= MAX_COMPRESSED_SIZE;
        if !fits {
            log::warn!(
                "leaf {leaf_id:?}: compressed size {} exceeds {MAX_COMPRESSED_SIZE}, leaving uncompressed",
                compressed_data.len()
            );
        }
        self.metadata.find_mut(leaf_id, |meta| {
            meta.original_entries = original_entries;
            meta.uncompressed_bytes = uncompressed_bytes;
            if fits {
                meta.compressed = true;
                meta.compressed_bytes = compressed_data.len();
                meta.compressed_data = compressed_data;
                meta.sub_page_index = sub_page_index_blocks;
            } else {
                meta.compressed = false;
                meta.compressed_bytes = 0;
                meta.compressed_data.clear();
                meta.sub_page_index = vec![None; self.config.sub_pages];
            }
        });

        if fits {
            // The compressed blocks are now authoritative; drop the
            // now-redundant raw copy so compression actually saves memory.
            let leaf = inner.base.leaf_mut(leaf_id);
            leaf.keys.clear();
            leaf.values.clear();
        }
        Ok(())
    }

    /// Sums uncompressed and compressed bytes across all leaves.
    #[must_use]
    pub fn compression_stats(&self) -> (usize, usize) {
        self.metadata.totals()
    }

    /// Synchronously drains every leaf's pending write buffer without
    /// touching the background flusher, which keeps running afterwards.
    pub fn flush_pending(&self) {
        let pending: Vec<LeafId> = {
            let inner = self.inner.read().expect("tree rwlock poisoned");
            inner
                .buffers
                .iter()
                .filter(|(_, b)| !b.is_empty())
                .map(|(&id, _)| id)
                .collect()
        };
        for leaf_id in pending {
            if let Err(e) = self.flush_buffer_to_leaf(leaf_id) {
                log::error!("synchronous flush of leaf {leaf_id:?} failed: {e}");
            }
        }
    }

    /// Signals the background flusher to stop, joins it, and performs a
    /// final synchronous flush of every leaf with a non-empty buffer.
    pub fn shutdown(&self) {
        self.stop.send();
        self.queue_cv.notify_all();
        if let Some(handle) = self.worker.lock().expect("worker mutex poisoned").take() {
            let _ = handle.join();
        }
        self.flush_pending();
    }
}

impl Drop for CompressedTree {
    fn drop(&mut self) {
        self.stop.send();
        self.queue_cv.notify_all();
        if let Some(handle) = self.worker.lock().expect("worker mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

fn encode_bucket(pairs: &[(u32, i64)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pairs.len() * 12);
    for &(k, v) in pairs {
        out.write_u32::<LittleEndian>(k).expect("writing to a Vec cannot fail");
        out.write_i64::<LittleEndian>(v).expect("writing to a Vec cannot fail");
    }
    out
}

fn decode_bucket(bytes: &[u8]) -> Vec<(u32, i64)> {
    let mut reader = bytes;
    let mut out = Vec::with_capacity(bytes.len() / 12);
    while reader.len() >= 12 {
        let k = reader.read_u32::<LittleEndian>().expect("length checked above");
        let v = reader.read_i64::<LittleEndian>().expect("length checked above");
        out.push((k, v));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dram::value::Handle;
    use test_log::test;

    fn tree_with(sub_pages: usize, flush_threshold: usize) -> Arc<CompressedTree> {
        CompressedTree::open(DramTreeConfig {
            order: 8,
            leaf_entries: 16,
            sub_pages,
            algo: crate::codec::CodecKind::Fast,
            flush_threshold,
            lazy_compression: true,
        })
    }

    #[test]
    fn put_then_get_sees_buffered_write_before_flush() {
        let tree = tree_with(4, 32);
        tree.put(1, Value::Live(Handle(100))).unwrap();
        assert_eq!(tree.get(1).unwrap(), Some(Value::Live(Handle(100))));
        tree.shutdown();
    }

    #[test]
    fn flush_then_get_reads_compressed_leaf() {
        let tree = tree_with(4, 4);
        for k in 0..20u32 {
            tree.put(k, Value::Live(Handle(u64::from(k)))).unwrap();
        }
        for k in 0..20u32 {
            assert_eq!(
                tree.get(k).unwrap(),
                Some(Value::Live(Handle(u64::from(k)))),
                "missing key {k}"
            );
        }
        tree.shutdown();
    }

    #[test]
    fn delete_then_get_is_none() {
        let tree = tree_with(4, 4);
        tree.put(5, Value::Live(Handle(50))).unwrap();
        assert!(tree.delete(5).unwrap());
        assert_eq!(tree.get(5).unwrap(), None);
        tree.shutdown();
    }

    #[test]
    fn without_lazy_compression_writes_are_immediately_visible() {
        let tree = CompressedTree::open(DramTreeConfig {
            order: 8,
            leaf_entries: 16,
            sub_pages: 4,
            algo: crate::codec::CodecKind::Fast,
            flush_threshold: 4,
            lazy_compression: false,
        });
        tree.put(9, Value::Live(Handle(90))).unwrap();
        assert_eq!(tree.get(9).unwrap(), Some(Value::Live(Handle(90))));
    }
}
