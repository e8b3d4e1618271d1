//! Node representation for the DRAM base B+tree (component G).

/// Stable identity of a leaf over its lifetime, generated from a per-tree
/// monotonic counter rather than a raw pointer (the crate forbids unsafe
/// code, and the leaf-metadata map keys on this identity across the
/// leaf's life).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct LeafId(pub u64);

/// Identity of an internal node.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct NodeId(pub u64);

/// An internal routing node. `children.len() == keys.len() + 1`.
pub struct InternalNode {
    pub keys: Vec<u32>,
    pub children: Vec<Child>,
}

/// Either a routing child or a leaf, mirroring the SSD tree's
/// `Internal`/`LeafParent` split but collapsed into one node type here
/// since DRAM leaves hold raw arrays rather than a further container.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Child {
    Node(NodeId),
    Leaf(LeafId),
}

impl InternalNode {
    /// Index of the child to descend into for `key`.
    pub fn child_index(&self, key: u32) -> usize {
        self.keys.partition_point(|&k| k <= key)
    }
}

/// A leaf: a sorted, parallel (key, value) array plus a sibling link.
pub struct Leaf {
    pub keys: Vec<u32>,
    pub values: Vec<i64>,
    pub next: Option<LeafId>,
}

impl Leaf {
    #[must_use]
    pub fn new() -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        }
    }

    #[must_use]
    pub fn search(&self, key: u32) -> Option<i64> {
        self.keys.binary_search(&key).ok().map(|i| self.values[i])
    }

    /// Inserts or updates `key`. Returns whether the leaf grew (i.e. `key`
    /// was not already present).
    pub fn upsert(&mut self, key: u32, value: i64) -> bool {
        match self.keys.binary_search(&key) {
            Ok(i) => {
                self.values[i] = value;
                false
            }
            Err(i) => {
                self.keys.insert(i, key);
                self.values.insert(i, value);
                true
            }
        }
    }

    /// Deletes `key` if present. Returns whether a key was removed.
    pub fn delete(&mut self, key: u32) -> bool {
        let Ok(i) = self.keys.binary_search(&key) else {
            return false;
        };
        self.keys.remove(i);
        self.values.remove(i);
        true
    }
}

impl Default for Leaf {
    fn default() -> Self {
        Self::new()
    }
}
