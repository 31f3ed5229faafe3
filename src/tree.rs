//! Merge tree storage.
//!
//! Nodes live in a flat arena indexed by [`NodeIdx`]; every walk over the tree
//! uses an explicit stack so that trees tens of thousands of leaves deep never
//! touch the call stack.

use std::fmt;

use log::debug;
use rustc_hash::FxHashMap;

use crate::document::RawNode;
use crate::error::{HeatmapError, Result, Violation, ViolationKind};
use crate::value::Value;

/// Which heatmap axis a tree orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => f.write_str("row"),
            Axis::Column => f.write_str("column"),
        }
    }
}

/// Position of a node in its tree's arena.
pub type NodeIdx = usize;

#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub id: String,
    /// Number of leaves under this node, 1 for a leaf.
    pub count: usize,
    pub distance: f64,
    pub parent: Option<NodeIdx>,
    /// `(left, right)` for internal nodes.
    pub children: Option<(NodeIdx, NodeIdx)>,
    pub objects: Vec<String>,
    pub features: Vec<Value>,
    pub label: Option<String>,
    /// Longest path, in edges, from this node down to a leaf.
    pub level: usize,
}

impl ClusterNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn left(&self) -> Option<NodeIdx> {
        self.children.map(|(l, _)| l)
    }

    pub fn right(&self) -> Option<NodeIdx> {
        self.children.map(|(_, r)| r)
    }

    /// Text shown next to the row: the label override, else the joined objects.
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None if self.objects.is_empty() => self.id.clone(),
            None => self.objects.join(", "),
        }
    }
}

/// A validated, immutable merge tree.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    axis: Axis,
    nodes: Vec<ClusterNode>,
    index: FxHashMap<String, NodeIdx>,
    root: NodeIdx,
    leaves: Vec<NodeIdx>,
}

impl ClusterTree {
    /// Validates the raw node map and builds the arena.
    ///
    /// Every node must resolve its references, exactly one node may lack a
    /// parent, and every internal node's count must equal the sum of its
    /// children's counts. All violations are collected before failing.
    pub fn build(axis: Axis, raw: Vec<(String, RawNode)>) -> Result<Self> {
        let mut violations = Vec::new();
        let mut index: FxHashMap<String, NodeIdx> = FxHashMap::default();
        index.reserve(raw.len());

        for (i, (id, _)) in raw.iter().enumerate() {
            if index.insert(id.clone(), i).is_some() {
                violations.push(Violation { node_id: id.clone(), kind: ViolationKind::DuplicateId });
            }
        }

        let resolve = |owner: &str, reference: &Option<String>, violations: &mut Vec<Violation>| {
            reference.as_ref().and_then(|r| match index.get(r) {
                Some(&idx) => Some(idx),
                None => {
                    violations.push(Violation {
                        node_id: owner.to_string(),
                        kind: ViolationKind::DanglingReference(r.clone()),
                    });
                    None
                }
            })
        };

        let mut nodes = Vec::with_capacity(raw.len());
        for (id, node) in &raw {
            let parent = resolve(id, &node.parent, &mut violations);
            let children = if node.count > 1 {
                let left = resolve(id, &node.left_child, &mut violations);
                let right = resolve(id, &node.right_child, &mut violations);
                match (left, right) {
                    (Some(l), Some(r)) => Some((l, r)),
                    _ => {
                        if node.left_child.is_none() || node.right_child.is_none() {
                            violations.push(Violation {
                                node_id: id.clone(),
                                kind: ViolationKind::MissingChild,
                            });
                        }
                        None
                    }
                }
            } else {
                None
            };

            if node.count == 0 {
                violations.push(Violation { node_id: id.clone(), kind: ViolationKind::ZeroCount });
            }
            if axis == Axis::Row && node.count == 1 && node.objects.is_empty() {
                violations.push(Violation { node_id: id.clone(), kind: ViolationKind::NoObjects });
            }

            nodes.push(ClusterNode {
                id: id.clone(),
                count: node.count,
                distance: if node.count > 1 { node.distance.max(0.0) } else { 0.0 },
                parent,
                children,
                objects: node.objects.clone(),
                features: node.features.clone(),
                label: node.label.clone(),
                level: 0,
            });
        }

        for (i, node) in nodes.iter().enumerate() {
            if let Some((l, r)) = node.children {
                let expected = nodes[l].count + nodes[r].count;
                if expected != node.count {
                    violations.push(Violation {
                        node_id: node.id.clone(),
                        kind: ViolationKind::CountMismatch { expected, found: node.count },
                    });
                }
                for child in [l, r] {
                    if nodes[child].parent != Some(i) {
                        violations.push(Violation {
                            node_id: nodes[child].id.clone(),
                            kind: ViolationKind::ParentMismatch,
                        });
                    }
                }
            }
            if let Some(p) = node.parent {
                let listed = nodes[p].children.is_some_and(|(l, r)| l == i || r == i);
                if !listed {
                    violations.push(Violation {
                        node_id: node.id.clone(),
                        kind: ViolationKind::ParentMismatch,
                    });
                }
            }
        }

        let roots: Vec<NodeIdx> = raw
            .iter()
            .enumerate()
            .filter(|(_, (_, node))| node.parent.is_none())
            .map(|(i, _)| i)
            .collect();
        if roots.is_empty() {
            violations.push(Violation { node_id: String::new(), kind: ViolationKind::NoRoot });
        }
        for &extra in roots.iter().skip(1) {
            violations.push(Violation {
                node_id: nodes[extra].id.clone(),
                kind: ViolationKind::ExtraRoot,
            });
        }

        if !violations.is_empty() {
            return Err(HeatmapError::TreeIntegrity { axis, violations });
        }

        let root = roots[0];
        let order = preorder(&nodes, root, &mut violations);
        if !violations.is_empty() {
            return Err(HeatmapError::TreeIntegrity { axis, violations });
        }

        // Children precede parents in reversed pre-order.
        for &idx in order.iter().rev() {
            if let Some((l, r)) = nodes[idx].children {
                nodes[idx].level = 1 + nodes[l].level.max(nodes[r].level);
            }
        }

        let leaves: Vec<NodeIdx> = (0..nodes.len()).filter(|&i| nodes[i].is_leaf()).collect();

        debug!(
            "Built {} tree: {} nodes, {} leaves, depth {}",
            axis,
            nodes.len(),
            leaves.len(),
            nodes[root].level
        );

        Ok(ClusterTree { axis, nodes, index, root, leaves })
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn root_node(&self) -> &ClusterNode {
        &self.nodes[self.root]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: NodeIdx) -> &ClusterNode {
        &self.nodes[idx]
    }

    pub fn get(&self, id: &str) -> Option<&ClusterNode> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIdx> {
        self.index.get(id).copied()
    }

    /// Like [`index_of`](Self::index_of) but unknown ids are an error.
    pub fn resolve(&self, id: &str) -> Result<NodeIdx> {
        self.index_of(id).ok_or_else(|| HeatmapError::UnknownNode {
            axis: self.axis,
            id: id.to_string(),
        })
    }

    /// Leaves in document insertion order.
    pub fn leaves(&self) -> impl Iterator<Item = &ClusterNode> + '_ {
        self.leaves.iter().map(move |&i| &self.nodes[i])
    }

    pub fn leaf_indices(&self) -> &[NodeIdx] {
        &self.leaves
    }

    /// Number of data columns, read from the first leaf.
    pub fn dimensions(&self) -> usize {
        self.leaves().next().map_or(0, |leaf| leaf.features.len())
    }

    /// `start` and every node below it, parent before children, left before right.
    ///
    /// The returned iterator is lazy; call again to restart.
    pub fn descendants(&self, start: NodeIdx) -> Descendants<'_> {
        Descendants { tree: self, stack: vec![start] }
    }

    /// Leaves under `start` in in-order (left to right).
    pub fn leaves_under(&self, start: NodeIdx) -> impl Iterator<Item = NodeIdx> + '_ {
        self.descendants(start).filter(move |&i| self.nodes[i].is_leaf())
    }
}

/// Lazy pre-order walk over a subtree.
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    tree: &'a ClusterTree,
    stack: Vec<NodeIdx>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeIdx;

    fn next(&mut self) -> Option<NodeIdx> {
        let idx = self.stack.pop()?;
        if let Some((l, r)) = self.tree.nodes[idx].children {
            self.stack.push(r);
            self.stack.push(l);
        }
        Some(idx)
    }
}

fn preorder(nodes: &[ClusterNode], root: NodeIdx, violations: &mut Vec<Violation>) -> Vec<NodeIdx> {
    let mut seen = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());
    let mut stack = vec![root];
    while let Some(idx) = stack.pop() {
        if seen[idx] {
            violations.push(Violation { node_id: nodes[idx].id.clone(), kind: ViolationKind::Revisited });
            continue;
        }
        seen[idx] = true;
        order.push(idx);
        if let Some((l, r)) = nodes[idx].children {
            stack.push(r);
            stack.push(l);
        }
    }
    order
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn leaf(id: &str, parent: &str, objects: &[&str], features: &[f64]) -> (String, RawNode) {
        (
            id.to_string(),
            RawNode {
                count: 1,
                parent: Some(parent.to_string()),
                objects: objects.iter().map(|s| s.to_string()).collect(),
                features: features.iter().map(|&f| Value::Number(f)).collect(),
                ..Default::default()
            },
        )
    }

    pub(crate) fn internal(
        id: &str,
        parent: Option<&str>,
        count: usize,
        distance: f64,
        left: &str,
        right: &str,
    ) -> (String, RawNode) {
        (
            id.to_string(),
            RawNode {
                count,
                distance,
                parent: parent.map(str::to_string),
                left_child: Some(left.to_string()),
                right_child: Some(right.to_string()),
                ..Default::default()
            },
        )
    }

    /// `{A,B}->N1, {N1,C}->root`
    pub(crate) fn three_leaf_nodes() -> Vec<(String, RawNode)> {
        vec![
            leaf("A", "N1", &["a"], &[1.0, 10.0]),
            leaf("B", "N1", &["b1", "b2"], &[2.0, 20.0]),
            leaf("C", "root", &["c"], &[3.0, 30.0]),
            internal("N1", Some("root"), 2, 1.0, "A", "B"),
            internal("root", None, 3, 2.0, "N1", "C"),
        ]
    }

    #[test]
    fn builds_three_leaf_tree() {
        let tree = ClusterTree::build(Axis::Row, three_leaf_nodes()).unwrap();
        assert_eq!(tree.root_node().id, "root");
        let leaves: Vec<&str> = tree.leaves().map(|n| n.id.as_str()).collect();
        assert_eq!(leaves, vec!["A", "B", "C"]);
        assert_eq!(tree.root_node().level, 2);
        assert_eq!(tree.get("N1").unwrap().level, 1);
        assert_eq!(tree.get("C").unwrap().level, 0);
        assert_eq!(tree.dimensions(), 2);
    }

    #[test]
    fn counts_add_up() {
        let tree = ClusterTree::build(Axis::Row, three_leaf_nodes()).unwrap();
        for idx in tree.descendants(tree.root()) {
            let node = tree.node(idx);
            if let Some((l, r)) = node.children {
                assert_eq!(node.count, tree.node(l).count + tree.node(r).count);
            }
        }
    }

    #[test]
    fn descendants_restart_and_walk_left_first() {
        let tree = ClusterTree::build(Axis::Row, three_leaf_nodes()).unwrap();
        let walk = tree.descendants(tree.root());
        let ids: Vec<&str> = walk.clone().map(|i| tree.node(i).id.as_str()).collect();
        assert_eq!(ids, vec!["root", "N1", "A", "B", "C"]);
        assert_eq!(walk.count(), 5);
        let n1 = tree.index_of("N1").unwrap();
        let under: Vec<&str> = tree.leaves_under(n1).map(|i| tree.node(i).id.as_str()).collect();
        assert_eq!(under, vec!["A", "B"]);
    }

    #[test]
    fn rejects_count_mismatch() {
        let mut nodes = three_leaf_nodes();
        nodes[4].1.count = 4;
        let err = ClusterTree::build(Axis::Row, nodes).unwrap_err();
        assert_eq!(err.violating_ids(), vec!["root"]);
    }

    #[test]
    fn rejects_two_roots() {
        let mut nodes = three_leaf_nodes();
        nodes.push((
            "stray".into(),
            RawNode { count: 1, objects: vec!["s".into()], ..Default::default() },
        ));
        let err = ClusterTree::build(Axis::Row, nodes).unwrap_err();
        assert_eq!(err.violating_ids(), vec!["stray"]);
    }

    #[test]
    fn rejects_dangling_child() {
        let mut nodes = three_leaf_nodes();
        nodes[3].1.right_child = Some("ghost".into());
        let err = ClusterTree::build(Axis::Row, nodes).unwrap_err();
        match err {
            HeatmapError::TreeIntegrity { violations, .. } => {
                assert!(violations.iter().any(|v| v.node_id == "N1"
                    && v.kind == ViolationKind::DanglingReference("ghost".into())));
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn column_leaves_need_no_objects() {
        let nodes = vec![
            ("0".to_string(), RawNode { count: 1, parent: Some("2".into()), ..Default::default() }),
            ("1".to_string(), RawNode { count: 1, parent: Some("2".into()), ..Default::default() }),
            internal("2", None, 2, 0.5, "0", "1"),
        ];
        assert!(ClusterTree::build(Axis::Row, nodes.clone()).is_err());
        let tree = ClusterTree::build(Axis::Column, nodes).unwrap();
        assert_eq!(tree.leaves().count(), 2);
    }

    #[test]
    fn single_leaf_tree() {
        let nodes = vec![(
            "only".to_string(),
            RawNode { count: 1, objects: vec!["x".into()], ..Default::default() },
        )];
        let tree = ClusterTree::build(Axis::Row, nodes).unwrap();
        assert_eq!(tree.root_node().id, "only");
        assert_eq!(tree.root_node().level, 0);
    }

    /// A caterpillar tree `depth` levels deep: `i{k}` joins `i{k-1}` with leaf `l{k}`.
    pub(crate) fn caterpillar(depth: usize) -> Vec<(String, RawNode)> {
        let mut nodes = Vec::with_capacity(2 * depth + 1);
        nodes.push(("l0".to_string(), RawNode {
            count: 1,
            parent: Some("i1".into()),
            objects: vec!["o0".into()],
            ..Default::default()
        }));
        for k in 1..=depth {
            let parent = if k == depth { None } else { Some(format!("i{}", k + 1)) };
            let left = if k == 1 { "l0".to_string() } else { format!("i{}", k - 1) };
            nodes.push((format!("l{k}"), RawNode {
                count: 1,
                parent: Some(format!("i{k}")),
                objects: vec![format!("o{k}")],
                ..Default::default()
            }));
            nodes.push((format!("i{k}"), RawNode {
                count: k + 1,
                distance: k as f64,
                parent,
                left_child: Some(left),
                right_child: Some(format!("l{k}")),
                ..Default::default()
            }));
        }
        nodes
    }

    #[test]
    fn deep_chain_does_not_overflow() {
        let depth = 50_000;
        let tree = ClusterTree::build(Axis::Row, caterpillar(depth)).unwrap();
        assert_eq!(tree.root_node().level, depth);
        assert_eq!(tree.leaves_under(tree.root()).count(), depth + 1);
    }
}
