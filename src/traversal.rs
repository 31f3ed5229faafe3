//! Subtree collection and link marking for highlighted clusters.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::layout::DendrogramLayout;
use crate::tree::{ClusterTree, NodeIdx};

/// Object ids of every leaf under `node`, leaves in in-order, objects in file order.
pub fn collect_leaves(tree: &ClusterTree, node: NodeIdx) -> Vec<String> {
    tree.leaves_under(node)
        .flat_map(|leaf| tree.node(leaf).objects.iter().cloned())
        .collect()
}

/// Maps each column-tree leaf to its logical column index.
///
/// Ranks come from sorting the leaves' leaf-axis coordinates ascending, so they
/// follow on-screen order whichever way the axis runs.
pub fn column_ranks(layout: &DendrogramLayout) -> FxHashMap<NodeIdx, usize> {
    let mut by_position: Vec<(NodeIdx, f64)> = layout.leaves().to_vec();
    by_position.sort_by(|a, b| a.1.total_cmp(&b.1));
    by_position
        .into_iter()
        .enumerate()
        .map(|(rank, (leaf, _))| (leaf, rank))
        .collect()
}

/// Logical column indices under `node`, in traversal order. Leaves missing from
/// `ranks` are skipped.
pub fn collect_columns(
    tree: &ClusterTree,
    node: NodeIdx,
    ranks: &FxHashMap<NodeIdx, usize>,
) -> Vec<usize> {
    tree.leaves_under(node)
        .filter_map(|leaf| ranks.get(&leaf).copied())
        .collect()
}

/// Internal nodes whose links are painted in the highlight color.
#[derive(Debug, Clone, Default)]
pub struct LinkMarks {
    marked: FxHashSet<NodeIdx>,
}

impl LinkMarks {
    /// Marks every link from `node` down.
    pub fn mark(&mut self, tree: &ClusterTree, node: NodeIdx) {
        self.marked.extend(tree.descendants(node).filter(|&i| !tree.node(i).is_leaf()));
    }

    pub fn unmark(&mut self, tree: &ClusterTree, node: NodeIdx) {
        for idx in tree.descendants(node) {
            self.marked.remove(&idx);
        }
    }

    pub fn clear(&mut self) {
        self.marked.clear();
    }

    pub fn is_marked(&self, node: NodeIdx) -> bool {
        self.marked.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.marked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marked.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{layout, DistanceAxis, LayoutParams, LeafAxis};
    use crate::tree::tests::three_leaf_nodes;
    use crate::tree::Axis;

    #[test]
    fn collects_objects_left_to_right() {
        let tree = ClusterTree::build(Axis::Row, three_leaf_nodes()).unwrap();
        assert_eq!(collect_leaves(&tree, tree.root()), vec!["a", "b1", "b2", "c"]);
        let c = tree.index_of("C").unwrap();
        assert_eq!(collect_leaves(&tree, c), vec!["c"]);
    }

    #[test]
    fn mirrored_columns_rank_by_screen_position() {
        let tree = ClusterTree::build(Axis::Column, three_leaf_nodes()).unwrap();
        let params = LayoutParams {
            leaf_axis: LeafAxis::mirrored(0.0, 10.0),
            distance_axis: DistanceAxis { span: 150.0, unified: false },
        };
        let ranks = column_ranks(&layout(&tree, tree.root(), &params));
        let rank = |id: &str| ranks[&tree.index_of(id).unwrap()];
        assert_eq!((rank("A"), rank("B"), rank("C")), (2, 1, 0));
        let n1 = tree.index_of("N1").unwrap();
        assert_eq!(collect_columns(&tree, n1, &ranks), vec![2, 1]);
    }

    #[test]
    fn marks_follow_the_subtree() {
        let tree = ClusterTree::build(Axis::Row, three_leaf_nodes()).unwrap();
        let n1 = tree.index_of("N1").unwrap();
        let mut marks = LinkMarks::default();
        marks.mark(&tree, tree.root());
        assert_eq!(marks.len(), 2);
        marks.unmark(&tree, n1);
        assert!(marks.is_marked(tree.root()));
        assert!(!marks.is_marked(n1));
        marks.clear();
        assert!(marks.is_empty());
    }
}
