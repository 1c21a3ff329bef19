//! This module provides the implicit, array-indexed complete binary tree used
//! as the cluster scheme's local lookup tree.
//!
//! The main types are:
//! - `BinaryTree<T>`: A dense binary tree stored in a vector
//! - `LocalTree`: A `BinaryTree<KeySpan>` over cluster boundaries, answering
//!   "which cluster owns value v" in O(log n)

use serde::{Deserialize, Serialize};

use crate::dtypes::{Direction, KeySpan, Path};

/// A binary tree implementation that stores values of type T.
///
/// The tree is stored as a vector where:
/// - Index 0 is unused
/// - Index 1 is the root node
/// - For any node at index i:
///   - Left child is at index 2i
///   - Right child is at index 2i + 1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryTree<T> {
    /// Vector storing the tree nodes, with None representing empty nodes
    pub value: Vec<Option<T>>,
}

impl<T: Clone> BinaryTree<T> {
    /// Creates a new empty binary tree with space for the specified depth
    pub fn new_with_depth(depth: usize) -> Self {
        // A tree of depth d has 2^(d+1) - 1 nodes; index 0 stays unused.
        BinaryTree {
            value: vec![None; 1 << (depth + 1)],
        }
    }

    /// Builds a complete tree bottom-up over `leaves`.
    ///
    /// The leaf level is padded to the next power of two by repeating the
    /// last leaf; every internal node holds `merge(left, right)`.
    pub fn from_leaves<F>(mut leaves: Vec<T>, merge: F) -> Option<Self>
    where
        F: Fn(&T, &T) -> T,
    {
        let padding = leaves.last()?.clone();
        let width = leaves.len().next_power_of_two();
        leaves.resize(width, padding);

        let depth = width.trailing_zeros() as usize;
        let mut tree = BinaryTree::new_with_depth(depth);
        for (offset, leaf) in leaves.into_iter().enumerate() {
            tree.write(leaf, &Path::from(width + offset));
        }
        for idx in (1..width).rev() {
            let merged = match (&tree.value[2 * idx], &tree.value[2 * idx + 1]) {
                (Some(left), Some(right)) => Some(merge(left, right)),
                _ => None,
            };
            if let Some(merged) = merged {
                tree.write(merged, &Path::from(idx));
            }
        }
        Some(tree)
    }

    /// Returns the height of the tree
    pub fn height(&self) -> usize {
        (self.value.len().max(2).trailing_zeros() as usize) - 1
    }

    /// Number of slots on the leaf level.
    pub fn leaf_count(&self) -> usize {
        1 << self.height()
    }

    /// Gets the root value
    pub fn root(&self) -> Option<&T> {
        self.value.get(1).and_then(Option::as_ref)
    }

    /// Gets the index for a given path
    pub fn get_index(&self, path: &Path) -> usize {
        path.into_iter()
            .fold(1, |idx, &direction| 2 * idx + u8::from(direction) as usize)
    }

    /// Gets the value at a given path
    pub fn get(&self, path: &Path) -> Option<&T> {
        self.value
            .get(self.get_index(path))
            .and_then(Option::as_ref)
    }

    /// Writes a value at a given path
    pub fn write(&mut self, value: T, path: &Path) {
        let idx = self.get_index(path);
        if idx >= self.value.len() {
            self.value.resize((idx + 1).next_power_of_two(), None);
        }
        self.value[idx] = Some(value);
    }
}

/// Local tree over cluster boundaries.
pub type LocalTree = BinaryTree<KeySpan>;

impl LocalTree {
    /// Builds the tree over `(first, last)` keyword of each cluster.
    pub fn from_boundaries(boundaries: Vec<KeySpan>) -> Option<Self> {
        BinaryTree::from_leaves(boundaries, KeySpan::merge)
    }

    /// Descends to the leaf owning `value` and returns the path to it.
    ///
    /// A value in a gap between two clusters descends to the cluster on its
    /// right. Values outside the root span have no owner.
    pub fn locate(&self, value: u64) -> Option<Path> {
        if !self.root()?.contains(value) {
            return None;
        }
        let mut path = Path::default();
        while path.len() < self.height() {
            let mut left_child = path.clone();
            left_child.push(Direction::Left);
            let left = self.get(&left_child)?;
            path.push(if value > left.max {
                Direction::Right
            } else {
                Direction::Left
            });
        }
        Some(path)
    }

    /// Cluster index owning `value`, see [`LocalTree::locate`].
    pub fn cluster_of(&self, value: u64) -> Option<usize> {
        self.locate(value).map(|path| path.position())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_leaves_pads_with_last_boundary() {
        let tree = LocalTree::from_boundaries(vec![
            KeySpan::new(1, 3),
            KeySpan::new(4, 50),
            KeySpan::new(60, 70),
        ])
        .unwrap();
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.value[7], Some(KeySpan::new(60, 70)));
        assert_eq!(tree.root(), Some(&KeySpan::new(1, 70)));
    }

    #[test]
    fn test_empty_leaves() {
        assert!(LocalTree::from_boundaries(Vec::new()).is_none());
    }
}
