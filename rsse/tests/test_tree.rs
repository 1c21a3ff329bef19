use rsse::{
    dtypes::{Direction, KeySpan, Path},
    tree::{BinaryTree, LocalTree},
};

#[cfg(test)]
mod tree_tests {
    use super::*;

    fn spans() -> Vec<KeySpan> {
        vec![
            KeySpan::new(1, 3),
            KeySpan::new(4, 50),
            KeySpan::new(60, 61),
            KeySpan::new(70, 90),
            KeySpan::new(100, 100),
        ]
    }

    #[test]
    fn test_new_with_depth() {
        let tree = BinaryTree::<u32>::new_with_depth(2);
        assert_eq!(tree.value.len(), 8);
        assert_eq!(tree.height(), 2);
        assert_eq!(tree.leaf_count(), 4);
        assert!(tree.root().is_none());
    }

    #[test]
    fn test_write_and_get() {
        let mut tree = BinaryTree::new_with_depth(2);
        let path = Path::new(vec![Direction::Right, Direction::Left]);
        tree.write(7u32, &path);
        assert_eq!(tree.get_index(&path), 6);
        assert_eq!(tree.get(&path), Some(&7));
        assert_eq!(tree.get(&Path::from(6usize)), Some(&7));
        assert_eq!(tree.get(&Path::new(vec![Direction::Left])), None);

        // Writing below the leaves grows the arena.
        let deep = Path::new(vec![Direction::Right; 3]);
        tree.write(9, &deep);
        assert_eq!(tree.get(&deep), Some(&9));
        assert_eq!(tree.height(), 3);
    }

    #[test]
    fn test_internal_nodes_hold_subtree_spans() {
        let tree = LocalTree::from_boundaries(spans()).unwrap();
        // Five clusters pad to eight leaves.
        assert_eq!(tree.height(), 3);
        assert_eq!(tree.root(), Some(&KeySpan::new(1, 100)));
        assert_eq!(tree.value[2], Some(KeySpan::new(1, 90)));
        assert_eq!(tree.value[3], Some(KeySpan::new(100, 100)));
        assert_eq!(tree.value[5], Some(KeySpan::new(60, 90)));
        for leaf in 13..16 {
            assert_eq!(tree.value[leaf], Some(KeySpan::new(100, 100)));
        }
    }

    #[test]
    fn test_locate_inside_clusters() {
        let tree = LocalTree::from_boundaries(spans()).unwrap();
        for (value, cluster) in [(1, 0), (3, 0), (4, 1), (50, 1), (61, 2), (80, 3), (100, 4)] {
            assert_eq!(tree.cluster_of(value), Some(cluster), "value {}", value);
        }
    }

    #[test]
    fn test_locate_gaps_go_right() {
        let tree = LocalTree::from_boundaries(spans()).unwrap();
        assert_eq!(tree.cluster_of(55), Some(2));
        assert_eq!(tree.cluster_of(65), Some(3));
        assert_eq!(tree.cluster_of(95), Some(4));
        assert_eq!(tree.cluster_of(0), None);
        assert_eq!(tree.cluster_of(101), None);
    }

    #[test]
    fn test_located_path_reads_back_cluster_span() {
        let tree = LocalTree::from_boundaries(spans()).unwrap();
        for (cluster, span) in spans().into_iter().enumerate() {
            let path = tree.locate(span.max).unwrap();
            assert_eq!(path.len(), tree.height());
            assert_eq!(tree.get(&path), Some(&span));
            // Leaf `cluster` sits at array index 8 + cluster.
            assert_eq!(path, Path::from(8 + cluster));
            assert_eq!(tree.get_index(&path), 8 + cluster);
        }
    }

    #[test]
    fn test_single_cluster() {
        let tree = LocalTree::from_boundaries(vec![KeySpan::new(5, 9)]).unwrap();
        assert_eq!(tree.height(), 0);
        assert_eq!(tree.locate(7), Some(Path::default()));
        assert_eq!(tree.cluster_of(5), Some(0));
    }
}
