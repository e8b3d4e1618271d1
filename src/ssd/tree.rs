//! SSD-resident B+tree (component F): internal nodes route to other
//! internal nodes; leaf-parents route directly to super-leaves.

use crate::config::SsdTreeConfig;
use crate::error::Result;
use crate::ssd::disk::Disk;
use crate::ssd::node::{Node, NodeId};
use crate::ssd::super_leaf::{SuperLeaf, SuperLeafId};
use rustc_hash::FxHashMap;
use std::path::Path;

enum Root {
    Empty,
    Leaf(SuperLeafId),
    Node(NodeId),
}

enum Child {
    Node(NodeId),
    Leaf(SuperLeafId),
}

/// A disk-backed B+tree whose leaf level is made of super-leaves rather
/// than ordinary leaf nodes.
pub struct SsdTree {
    disk: Disk,
    nodes: FxHashMap<NodeId, Node>,
    super_leaves: FxHashMap<SuperLeafId, SuperLeaf>,
    root: Root,
    order: usize,
    next_node_id: u64,
    next_super_leaf_id: u64,
}

impl SsdTree {
    /// Opens (creating if necessary) the storage file backing this tree.
    pub fn open<P: AsRef<Path>>(
        path: P,
        total_blocks: u32,
        config: &SsdTreeConfig,
    ) -> Result<Self> {
        Ok(Self {
            disk: Disk::open(path, total_blocks)?,
            nodes: FxHashMap::default(),
            super_leaves: FxHashMap::default(),
            root: Root::Empty,
            order: config.order,
            next_node_id: 0,
            next_super_leaf_id: 0,
        })
    }

    fn alloc_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn alloc_super_leaf_id(&mut self) -> SuperLeafId {
        let id = SuperLeafId(self.next_super_leaf_id);
        self.next_super_leaf_id += 1;
        id
    }

    fn child_at(&self, node_id: NodeId, key: u32) -> (usize, Child) {
        let node = &self.nodes[&node_id];
        let idx = node.child_index(key);
        match node {
            Node::Internal { children, .. } => (idx, Child::Node(children[idx])),
            Node::LeafParent { children, .. } => (idx, Child::Leaf(children[idx])),
        }
    }

    /// Looks up `key`.
    pub fn get(&mut self, key: u32) -> Result<Option<i64>> {
        match self.root {
            Root::Empty => Ok(None),
            Root::Leaf(id) => {
                let leaf = self.super_leaves.get_mut(&id).expect("root leaf missing");
                leaf.search_hashed(&mut self.disk, key)
            }
            Root::Node(root_id) => {
                let mut node_id = root_id;
                loop {
                    match self.child_at(node_id, key).1 {
                        Child::Node(next) => node_id = next,
                        Child::Leaf(leaf_id) => {
                            let leaf = self
                                .super_leaves
                                .get_mut(&leaf_id)
                                .expect("leaf-parent child missing");
                            return leaf.search_hashed(&mut self.disk, key);
                        }
                    }
                }
            }
        }
    }

    /// Inserts or updates `key`.
    pub fn put(&mut self, key: u32, value: i64) -> Result<()> {
        match self.root {
            Root::Empty => {
                let mut leaf = SuperLeaf::new();
                leaf.insert_hashed(&mut self.disk, key, value)?
                    .expect("a brand-new super-leaf cannot require a split");
                let id = self.alloc_super_leaf_id();
                self.super_leaves.insert(id, leaf);
                self.root = Root::Leaf(id);
                Ok(())
            }
            Root::Leaf(leaf_id) => {
                let split = {
                    let leaf = self
                        .super_leaves
                        .get_mut(&leaf_id)
                        .expect("root leaf missing");
                    leaf.insert_hashed(&mut self.disk, key, value)?
                };
                if split.is_ok() {
                    return Ok(());
                }
                let (median_key, right_id) = self.split_leaf(leaf_id)?;
                let node_id = self.alloc_node_id();
                self.nodes.insert(
                    node_id,
                    Node::LeafParent {
                        keys: vec![median_key],
                        children: vec![leaf_id, right_id],
                    },
                );
                self.root = Root::Node(node_id);
                Ok(())
            }
            Root::Node(root_id) => {
                if let Some((promoted_key, new_id)) = self.insert_into(root_id, key, value)? {
                    let new_root_id = self.alloc_node_id();
                    self.nodes.insert(
                        new_root_id,
                        Node::Internal {
                            keys: vec![promoted_key],
                            children: vec![root_id, new_id],
                        },
                    );
                    self.root = Root::Node(new_root_id);
                }
                Ok(())
            }
        }
    }

    fn insert_into(&mut self, node_id: NodeId, key: u32, value: i64) -> Result<Option<(u32, NodeId)>> {
        let (idx, child) = self.child_at(node_id, key);
        match child {
            Child::Node(child_id) => {
                let Some((promoted_key, new_child_id)) = self.insert_into(child_id, key, value)?
                else {
                    return Ok(None);
                };
                if let Some(Node::Internal { keys, children }) = self.nodes.get_mut(&node_id) {
                    keys.insert(idx, promoted_key);
                    children.insert(idx + 1, new_child_id);
                }
                self.maybe_split_node(node_id)
            }
            Child::Leaf(leaf_id) => {
                let split = {
                    let leaf = self
                        .super_leaves
                        .get_mut(&leaf_id)
                        .expect("leaf-parent child missing");
                    leaf.insert_hashed(&mut self.disk, key, value)?
                };
                if split.is_ok() {
                    return Ok(None);
                }
                let (median_key, right_id) = self.split_leaf(leaf_id)?;
                if let Some(Node::LeafParent { keys, children }) = self.nodes.get_mut(&node_id) {
                    keys.insert(idx, median_key);
                    children.insert(idx + 1, right_id);
                }
                self.maybe_split_node(node_id)
            }
        }
    }

    /// Splits a super-leaf and wires up the sibling linked list, matching
    /// [`SuperLeaf::split`]'s contract.
    fn split_leaf(&mut self, leaf_id: SuperLeafId) -> Result<(u32, SuperLeafId)> {
        let old_next = self
            .super_leaves
            .get(&leaf_id)
            .expect("leaf missing")
            .next;

        let outcome = {
            let leaf = self.super_leaves.get_mut(&leaf_id).expect("leaf missing");
            leaf.split(&mut self.disk)?
        };

        let right_id = self.alloc_super_leaf_id();
        let mut right = outcome.right;
        right.prev = Some(leaf_id);
        right.next = old_next;
        if let Some(next_id) = old_next {
            if let Some(next_leaf) = self.super_leaves.get_mut(&next_id) {
                next_leaf.prev = Some(right_id);
            }
        }
        self.super_leaves
            .get_mut(&leaf_id)
            .expect("leaf missing")
            .next = Some(right_id);
        self.super_leaves.insert(right_id, right);

        Ok((outcome.median_key, right_id))
    }

    /// If `node_id` has overflowed past `order` children, splits it with
    /// median-key promotion and returns `(promoted_key, new_sibling_id)`.
    fn maybe_split_node(&mut self, node_id: NodeId) -> Result<Option<(u32, NodeId)>> {
        let over = self
            .nodes
            .get(&node_id)
            .is_some_and(|n| n.key_count() >= self.order);
        if !over {
            return Ok(None);
        }

        let node = self.nodes.remove(&node_id).expect("checked above");
        let (left, right, promoted_key) = match node {
            Node::Internal {
                mut keys,
                mut children,
            } => {
                let mid = keys.len() / 2;
                let promoted_key = keys[mid];
                let right_keys = keys.split_off(mid + 1);
                keys.truncate(mid);
                let right_children = children.split_off(mid + 1);
                (
                    Node::Internal { keys, children },
                    Node::Internal {
                        keys: right_keys,
                        children: right_children,
                    },
                    promoted_key,
                )
            }
            Node::LeafParent {
                mut keys,
                mut children,
            } => {
                let mid = keys.len() / 2;
                let promoted_key = keys[mid];
                let right_keys = keys.split_off(mid + 1);
                keys.truncate(mid);
                let right_children = children.split_off(mid + 1);
                (
                    Node::LeafParent { keys, children },
                    Node::LeafParent {
                        keys: right_keys,
                        children: right_children,
                    },
                    promoted_key,
                )
            }
        };

        self.nodes.insert(node_id, left);
        let right_id = self.alloc_node_id();
        self.nodes.insert(right_id, right);
        Ok(Some((promoted_key, right_id)))
    }

    /// Deletes `key`. No rebalancing/merging is performed on underflow;
    /// sparse leaf-parents and super-leaves are left in place.
    pub fn delete(&mut self, key: u32) -> Result<bool> {
        match self.root {
            Root::Empty => Ok(false),
            Root::Leaf(id) => {
                let leaf = self.super_leaves.get_mut(&id).expect("root leaf missing");
                leaf.delete_hashed(&mut self.disk, key)
            }
            Root::Node(root_id) => {
                let mut node_id = root_id;
                loop {
                    match self.child_at(node_id, key).1 {
                        Child::Node(next) => node_id = next,
                        Child::Leaf(leaf_id) => {
                            let leaf = self
                                .super_leaves
                                .get_mut(&leaf_id)
                                .expect("leaf-parent child missing");
                            return leaf.delete_hashed(&mut self.disk, key);
                        }
                    }
                }
            }
        }
    }

    /// Checks every resident super-leaf's internal invariants (component
    /// E). Leaves that have never been touched since `open` are not
    /// loaded into memory and are trivially consistent.
    #[must_use]
    pub fn validate_consistency(&self) -> bool {
        self.super_leaves.values().all(SuperLeaf::is_consistent)
    }

    /// Stores `payload` under `key`, freeing whatever value block `key`
    /// previously pointed at. `payload` must fit in one value block (see
    /// [`crate::ssd::disk::MAX_VALUE_PAYLOAD`]).
    pub fn put_value(&mut self, key: u32, payload: &[u8]) -> Result<()> {
        let previous = self.get(key)?;
        let new_block = self.disk.write_value(payload)?;
        self.put(key, i64::from(new_block))?;
        if let Some(old) = previous {
            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            self.disk.free(old as u32);
        }
        Ok(())
    }

    /// Reads back the payload stored by [`Self::put_value`]. Callers that
    /// only need the size for a promotion decision can use `.len()` on
    /// the result; value blocks are small enough that reading the full
    /// payload up front is cheaper than a second round trip.
    pub fn get_value(&mut self, key: u32) -> Result<Option<Vec<u8>>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let block_id = raw as u32;
        Ok(Some(self.disk.read_value(block_id)?))
    }

    /// Deletes `key` and frees its value block, if any.
    pub fn delete_value(&mut self, key: u32) -> Result<bool> {
        let Some(raw) = self.get(key)? else {
            return Ok(false);
        };
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        self.disk.free(raw as u32);
        self.delete(key)
    }

    /// Flushes every super-leaf's dirty sub-pages and syncs the storage
    /// file.
    pub fn flush(&mut self) -> Result<()> {
        for leaf in self.super_leaves.values_mut() {
            leaf.flush_dirty(&mut self.disk)?;
        }
        self.disk.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SsdTreeConfig;
    use tempfile::NamedTempFile;

    fn scratch_tree(order: usize) -> (NamedTempFile, SsdTree) {
        let tmp = NamedTempFile::new().unwrap();
        let config = SsdTreeConfig {
            order,
            ..SsdTreeConfig::default()
        };
        let tree = SsdTree::open(tmp.path(), 1 << 16, &config).unwrap();
        (tmp, tree)
    }

    #[test]
    fn put_get_delete_on_a_single_super_leaf() {
        let (_tmp, mut tree) = scratch_tree(16);
        for k in 0..500u32 {
            tree.put(k, i64::from(k) * 3).unwrap();
        }
        for k in 0..500u32 {
            assert_eq!(tree.get(k).unwrap(), Some(i64::from(k) * 3));
        }
        assert!(tree.delete(250).unwrap());
        assert_eq!(tree.get(250).unwrap(), None);
        assert!(!tree.delete(250).unwrap());
    }

    #[test]
    fn forces_super_leaf_split_and_keeps_all_keys_reachable() {
        let (_tmp, mut tree) = scratch_tree(16);
        for k in 0..6000u32 {
            tree.put(k, i64::from(k)).unwrap();
        }
        assert!(matches!(tree.root, Root::Node(_)));
        for k in 0..6000u32 {
            assert_eq!(tree.get(k).unwrap(), Some(i64::from(k)), "missing key {k}");
        }
    }

    #[test]
    fn grows_multiple_internal_levels_under_a_small_order() {
        let (_tmp, mut tree) = scratch_tree(4);
        for k in 0..20_000u32 {
            tree.put(k, i64::from(k)).unwrap();
        }
        for k in (0..20_000u32).step_by(97) {
            assert_eq!(tree.get(k).unwrap(), Some(i64::from(k)), "missing key {k}");
        }
        tree.flush().unwrap();
    }

    #[test]
    fn update_overwrites_existing_key() {
        let (_tmp, mut tree) = scratch_tree(16);
        tree.put(7, 70).unwrap();
        tree.put(7, 700).unwrap();
        assert_eq!(tree.get(7).unwrap(), Some(700));
    }

    #[test]
    fn put_value_get_value_round_trip_and_free_old_block() {
        let (_tmp, mut tree) = scratch_tree(16);
        tree.put_value(1, b"first payload").unwrap();
        assert_eq!(tree.get_value(1).unwrap().as_deref(), Some(&b"first payload"[..]));

        let allocated_before = tree.disk.allocated_blocks();
        tree.put_value(1, b"second, different payload").unwrap();
        assert_eq!(
            tree.get_value(1).unwrap().as_deref(),
            Some(&b"second, different payload"[..])
        );
        assert_eq!(
            tree.disk.allocated_blocks(),
            allocated_before,
            "overwriting a value must free the stale block"
        );

        assert!(tree.delete_value(1).unwrap());
        assert_eq!(tree.get_value(1).unwrap(), None);
    }
}
