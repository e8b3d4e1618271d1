//! Internal-node representation for the SSD B+tree.

use crate::ssd::super_leaf::SuperLeafId;

/// Opaque identity of an internal node within its owning tree's arena.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub u64);

/// An internal node. Re-architected as a tagged sum rather than an
/// inheritance hierarchy: ordinary internal nodes route to other internal
/// nodes, while leaf-parents route directly to super-leaves.
pub enum Node {
    /// Routes to other internal nodes. `children.len() == keys.len() + 1`.
    Internal {
        keys: Vec<u32>,
        children: Vec<NodeId>,
    },
    /// The lowest level of internal node; routes directly to super-leaves.
    /// `children.len() == keys.len() + 1`.
    LeafParent {
        keys: Vec<u32>,
        children: Vec<SuperLeafId>,
    },
}

impl Node {
    /// Number of separator keys.
    pub fn key_count(&self) -> usize {
        match self {
            Node::Internal { keys, .. } | Node::LeafParent { keys, .. } => keys.len(),
        }
    }

    /// Index of the child to descend into for `key`: the count of
    /// separator keys that are `<= key`.
    pub fn child_index(&self, key: u32) -> usize {
        let keys = match self {
            Node::Internal { keys, .. } | Node::LeafParent { keys, .. } => keys,
        };
        keys.partition_point(|&k| k <= key)
    }
}
