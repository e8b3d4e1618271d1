//! In-memory base B+tree keyed by a 32-bit hashed key (component G).

use crate::dram::node::{Child, InternalNode, Leaf, LeafId, NodeId};
use rustc_hash::FxHashMap;

enum Root {
    Empty,
    Leaf(LeafId),
    Node(NodeId),
}

/// A conventional in-memory B+tree. Splits create new leaves; inserts
/// preserve sorted order within a leaf. No merging/rebalancing on delete.
pub struct BaseTree {
    nodes: FxHashMap<NodeId, InternalNode>,
    leaves: FxHashMap<LeafId, Leaf>,
    root: Root,
    order: usize,
    leaf_entries: usize,
    next_node_id: u64,
    next_leaf_id: u64,
}

impl BaseTree {
    #[must_use]
    pub fn new(order: usize, leaf_entries: usize) -> Self {
        Self {
            nodes: FxHashMap::default(),
            leaves: FxHashMap::default(),
            root: Root::Empty,
            order,
            leaf_entries,
            next_node_id: 0,
            next_leaf_id: 0,
        }
    }

    fn alloc_node_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        id
    }

    fn alloc_leaf_id(&mut self) -> LeafId {
        let id = LeafId(self.next_leaf_id);
        self.next_leaf_id += 1;
        id
    }

    /// Read-only access to a leaf's arrays, e.g. for compression.
    #[must_use]
    pub fn leaf(&self, id: LeafId) -> &Leaf {
        &self.leaves[&id]
    }

    /// Mutable access to a leaf's arrays, e.g. to rewrite it after a flush.
    pub fn leaf_mut(&mut self, id: LeafId) -> &mut Leaf {
        self.leaves.get_mut(&id).expect("unknown leaf id")
    }

    /// Returns the unique leaf that would own `key`, if the tree is
    /// non-empty.
    #[must_use]
    pub fn find_leaf_for_key(&self, key: u32) -> Option<LeafId> {
        match self.root {
            Root::Empty => None,
            Root::Leaf(id) => Some(id),
            Root::Node(root_id) => {
                let mut node_id = root_id;
                loop {
                    let node = &self.nodes[&node_id];
                    match node.children[node.child_index(key)] {
                        Child::Node(next) => node_id = next,
                        Child::Leaf(leaf_id) => return Some(leaf_id),
                    }
                }
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: u32) -> Option<i64> {
        let leaf_id = self.find_leaf_for_key(key)?;
        self.leaves[&leaf_id].search(key)
    }

    /// Inserts or updates `key`. Returns the id of a freshly created
    /// sibling leaf, if this insertion caused a split.
    pub fn put(&mut self, key: u32, value: i64) -> Option<LeafId> {
        match self.root {
            Root::Empty => {
                let mut leaf = Leaf::new();
                leaf.upsert(key, value);
                let id = self.alloc_leaf_id();
                self.leaves.insert(id, leaf);
                self.root = Root::Leaf(id);
                None
            }
            Root::Leaf(leaf_id) => {
                let grew = self.leaves.get_mut(&leaf_id).expect("root leaf missing").upsert(key, value);
                if !grew || self.leaves[&leaf_id].keys.len() <= self.leaf_entries {
                    return None;
                }
                let (promoted_key, right_id) = self.split_leaf(leaf_id);
                let node_id = self.alloc_node_id();
                self.nodes.insert(
                    node_id,
                    InternalNode {
                        keys: vec![promoted_key],
                        children: vec![Child::Leaf(leaf_id), Child::Leaf(right_id)],
                    },
                );
                self.root = Root::Node(node_id);
                Some(right_id)
            }
            Root::Node(root_id) => {
                let (promotion, new_leaf) = self.insert_into(root_id, key, value);
                if let Some((promoted_key, new_child_id)) = promotion {
                    let new_root_id = self.alloc_node_id();
                    self.nodes.insert(
                        new_root_id,
                        InternalNode {
                            keys: vec![promoted_key],
                            children: vec![Child::Node(root_id), new_child_id],
                        },
                    );
                    self.root = Root::Node(new_root_id);
                }
                new_leaf
            }
        }
    }

    fn insert_into(
        &mut self,
        node_id: NodeId,
        key: u32,
        value: i64,
    ) -> (Option<(u32, Child)>, Option<LeafId>) {
        let (idx, child) = {
            let node = &self.nodes[&node_id];
            let idx = node.child_index(key);
            (idx, node.children[idx])
        };

        let (promotion, new_leaf) = match child {
            Child::Node(child_id) => {
                let (promotion, new_leaf) = self.insert_into(child_id, key, value);
                (promotion, new_leaf)
            }
            Child::Leaf(leaf_id) => {
                let grew = self
                    .leaves
                    .get_mut(&leaf_id)
                    .expect("leaf missing")
                    .upsert(key, value);
                if !grew || self.leaves[&leaf_id].keys.len() <= self.leaf_entries {
                    (None, None)
                } else {
                    let (promoted_key, right_id) = self.split_leaf(leaf_id);
                    (Some((promoted_key, Child::Leaf(right_id))), Some(right_id))
                }
            }
        };

        let Some((promoted_key, new_child)) = promotion else {
            return (None, new_leaf);
        };

        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.keys.insert(idx, promoted_key);
            node.children.insert(idx + 1, new_child);
        }

        (self.maybe_split_node(node_id), new_leaf)
    }

    /// Classic sorted-leaf split: the right half (including its first key)
    /// is promoted into the parent as a routing separator; unlike the SSD
    /// super-leaf split, the separator key stays resident in the right
    /// leaf too, since ordinary reads always land directly on a leaf here.
    fn split_leaf(&mut self, leaf_id: LeafId) -> (u32, LeafId) {
        let leaf = self.leaves.get_mut(&leaf_id).expect("leaf missing");
        let mid = leaf.keys.len() / 2;
        let right_keys = leaf.keys.split_off(mid);
        let right_values = leaf.values.split_off(mid);
        let promoted_key = right_keys[0];
        let old_next = leaf.next;

        let right_id = self.alloc_leaf_id();
        let right = Leaf {
            keys: right_keys,
            values: right_values,
            next: old_next,
        };
        self.leaves.get_mut(&leaf_id).expect("leaf missing").next = Some(right_id);
        self.leaves.insert(right_id, right);
        (promoted_key, right_id)
    }

    fn maybe_split_node(&mut self, node_id: NodeId) -> Option<(u32, Child)> {
        if self.nodes[&node_id].keys.len() < self.order {
            return None;
        }
        let node = self.nodes.remove(&node_id).expect("checked above");
        let InternalNode {
            mut keys,
            mut children,
        } = node;
        let mid = keys.len() / 2;
        let promoted_key = keys[mid];
        let right_keys = keys.split_off(mid + 1);
        keys.truncate(mid);
        let right_children = children.split_off(mid + 1);

        self.nodes.insert(node_id, InternalNode { keys, children });
        let right_id = self.alloc_node_id();
        self.nodes.insert(
            right_id,
            InternalNode {
                keys: right_keys,
                children: right_children,
            },
        );
        Some((promoted_key, Child::Node(right_id)))
    }

    /// Deletes `key`. No rebalancing on underflow.
    pub fn delete(&mut self, key: u32) -> bool {
        let Some(leaf_id) = self.find_leaf_for_key(key) else {
            return false;
        };
        self.leaves.get_mut(&leaf_id).expect("leaf missing").delete(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_delete() {
        let mut tree = BaseTree::new(4, 8);
        for k in 0..200u32 {
            tree.put(k, i64::from(k) * 2);
        }
        for k in 0..200u32 {
            assert_eq!(tree.get(k), Some(i64::from(k) * 2));
        }
        assert!(tree.delete(100));
        assert_eq!(tree.get(100), None);
        assert!(!tree.delete(100));
    }

    #[test]
    fn update_does_not_grow_leaf() {
        let mut tree = BaseTree::new(4, 8);
        tree.put(1, 10);
        assert_eq!(tree.put(1, 20), None);
        assert_eq!(tree.get(1), Some(20));
    }

    #[test]
    fn find_leaf_for_key_is_stable_across_unrelated_splits() {
        let mut tree = BaseTree::new(4, 4);
        tree.put(1, 1);
        let leaf_for_1 = tree.find_leaf_for_key(1).unwrap();
        for k in 100..300u32 {
            tree.put(k, i64::from(k));
        }
        assert_eq!(tree.find_leaf_for_key(1).unwrap(), leaf_for_1);
        assert_eq!(tree.get(1), Some(1));
    }
}
