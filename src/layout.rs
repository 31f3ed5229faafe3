//! Dendrogram coordinate assignment.
//!
//! Leaves are spaced evenly along the leaf axis in in-order. Internal links are
//! anchored with a neighbourhood-smoothed estimate: instead of the centroid of a
//! child's leaves, each anchor blends the counts of the child's children and
//! grandchildren (a leaf contributes `0.5` on each side). The result coincides
//! with the leaf position when the child is a leaf, equals the centroid for
//! balanced subtrees and stays close to it otherwise. It is a heuristic: exact
//! pixel positions are not a compatibility contract.

use log::debug;
use rustc_hash::FxHashMap;

use crate::color::round_half_up;
use crate::tree::{ClusterTree, NodeIdx};

/// Distance-axis coordinates below this are pushed out to it so the root link stays visible.
pub const MIN_DISTANCE_COORDINATE: f64 = 2.0;

/// Leaf counts of a node's two children, `0.5` each for a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChildCounts {
    pub left_count: f64,
    pub right_count: f64,
}

impl ChildCounts {
    const LEAF: ChildCounts = ChildCounts { left_count: 0.5, right_count: 0.5 };

    fn of(tree: &ClusterTree, idx: NodeIdx) -> Self {
        match tree.node(idx).children {
            Some((l, r)) => ChildCounts {
                left_count: tree.node(l).count as f64,
                right_count: tree.node(r).count as f64,
            },
            None => ChildCounts::LEAF,
        }
    }
}

/// One child's side of a [`Neighbourhood`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Branch {
    pub left_count: f64,
    pub right_count: f64,
    /// Counts one level further down; zero when this child is a leaf.
    pub left_node: ChildCounts,
    pub right_node: ChildCounts,
}

impl Branch {
    fn of(tree: &ClusterTree, idx: NodeIdx) -> Self {
        match tree.node(idx).children {
            Some((l, r)) => {
                let counts = ChildCounts::of(tree, idx);
                Branch {
                    left_count: counts.left_count,
                    right_count: counts.right_count,
                    left_node: ChildCounts::of(tree, l),
                    right_node: ChildCounts::of(tree, r),
                }
            }
            None => Branch {
                left_count: 0.5,
                right_count: 0.5,
                left_node: ChildCounts::default(),
                right_node: ChildCounts::default(),
            },
        }
    }
}

/// Two-level lookahead of child counts below an internal node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbourhood {
    pub left_count: f64,
    pub right_count: f64,
    pub left_node: Branch,
    pub right_node: Branch,
}

impl Neighbourhood {
    /// `None` for leaves.
    pub fn of(tree: &ClusterTree, idx: NodeIdx) -> Option<Self> {
        let (l, r) = tree.node(idx).children?;
        Some(Neighbourhood {
            left_count: tree.node(l).count as f64,
            right_count: tree.node(r).count as f64,
            left_node: Branch::of(tree, l),
            right_node: Branch::of(tree, r),
        })
    }

    /// Left branch anchor, in leaf units from the start of the leaf axis.
    pub fn left_anchor(&self, current_left_count: f64) -> f64 {
        let ln = &self.left_node;
        let adj = current_left_count - ln.right_count - ln.left_node.right_count;
        adj + (ln.left_node.right_count + ln.right_node.left_count) / 2.0
    }

    /// Right branch anchor, in leaf units, before the half-leaf shift applied
    /// when the right child is a leaf.
    pub fn right_anchor(&self, current_left_count: f64) -> f64 {
        let rn = &self.right_node;
        let adj = current_left_count + rn.left_node.left_count;
        adj + (rn.left_node.right_count + rn.right_node.left_count) / 2.0
    }
}

/// Placement of the axis leaves are spread along.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeafAxis {
    /// Pixel coordinate where the first leaf slot starts.
    pub origin: f64,
    pub pixels_per_leaf: f64,
    /// Count leaf slots back from `origin + leaves * pixels_per_leaf` instead of
    /// forward from `origin`. Column dendrograms are drawn this way.
    pub mirrored: bool,
}

impl LeafAxis {
    pub fn new(origin: f64, pixels_per_leaf: f64) -> Self {
        LeafAxis { origin, pixels_per_leaf, mirrored: false }
    }

    pub fn mirrored(origin: f64, pixels_per_leaf: f64) -> Self {
        LeafAxis { origin, pixels_per_leaf, mirrored: true }
    }

    fn to_pixels(&self, units: f64, leaves: usize) -> f64 {
        if self.mirrored {
            self.origin + (leaves as f64 - units) * self.pixels_per_leaf
        } else {
            self.origin + units * self.pixels_per_leaf
        }
    }
}

/// The axis proportional to merge height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceAxis {
    /// Pixels between the root link and the leaves.
    pub span: f64,
    /// Step by tree level instead of merge distance.
    pub unified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub leaf_axis: LeafAxis,
    pub distance_axis: DistanceAxis,
}

enum DistanceScale {
    ByDistance { span: f64, step: f64 },
    ByLevel { span: f64, step: f64 },
}

impl DistanceScale {
    fn new(tree: &ClusterTree, root: NodeIdx, axis: &DistanceAxis) -> Self {
        let node = tree.node(root);
        if axis.unified {
            let step = if node.level > 0 { axis.span / node.level as f64 } else { 0.0 };
            DistanceScale::ByLevel { span: axis.span, step }
        } else {
            let step = if node.distance > 0.0 { axis.span / node.distance } else { 0.0 };
            DistanceScale::ByDistance { span: axis.span, step }
        }
    }

    fn coordinate(&self, tree: &ClusterTree, idx: NodeIdx) -> f64 {
        let node = tree.node(idx);
        match *self {
            DistanceScale::ByDistance { span, step } => span - step * node.distance,
            DistanceScale::ByLevel { span, step } => span - step * node.level as f64,
        }
    }
}

/// The bracket joining an internal node's two children.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub node: NodeIdx,
    pub left: NodeIdx,
    pub right: NodeIdx,
    /// Distance-axis coordinate of the junction.
    pub distance: f64,
    pub left_anchor: f64,
    pub right_anchor: f64,
    /// Distance-axis coordinates where each branch meets its child.
    pub left_end: f64,
    pub right_end: f64,
}

/// Coordinates for one laid out (sub)tree.
#[derive(Debug, Clone)]
pub struct DendrogramLayout {
    root: NodeIdx,
    params: LayoutParams,
    links: Vec<Link>,
    link_index: FxHashMap<NodeIdx, usize>,
    leaves: Vec<(NodeIdx, f64)>,
    leaf_index: FxHashMap<NodeIdx, usize>,
    distance_represented: f64,
}

impl DendrogramLayout {
    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn params(&self) -> &LayoutParams {
        &self.params
    }

    /// Links in pre-order, parent first.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn link(&self, node: NodeIdx) -> Option<&Link> {
        self.link_index.get(&node).map(|&i| &self.links[i])
    }

    /// Leaves with their leaf-axis coordinate, in in-order.
    pub fn leaves(&self) -> &[(NodeIdx, f64)] {
        &self.leaves
    }

    pub fn leaf_position(&self, leaf: NodeIdx) -> Option<f64> {
        self.leaf_index.get(&leaf).map(|&i| self.leaves[i].1)
    }

    /// In-order rank of a laid out leaf.
    pub fn leaf_rank(&self, leaf: NodeIdx) -> Option<usize> {
        self.leaf_index.get(&leaf).copied()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Merge distance spanned by the distance axis, for a scale bar.
    pub fn distance_represented(&self) -> f64 {
        self.distance_represented
    }

    /// Pixel extent `(start, end)` covered by the leaf slots.
    pub fn leaf_extent(&self) -> (f64, f64) {
        let axis = &self.params.leaf_axis;
        (axis.origin, axis.origin + self.leaves.len() as f64 * axis.pixels_per_leaf)
    }
}

struct Pending {
    idx: NodeIdx,
    current_left_count: f64,
    current_right_count: f64,
}

/// Lays out the subtree of `tree` rooted at `root`.
///
/// A single top-down pass with an explicit stack; each node costs O(1).
pub fn layout(tree: &ClusterTree, root: NodeIdx, params: &LayoutParams) -> DendrogramLayout {
    let root_node = tree.node(root);
    let total = root_node.count;
    let scale = DistanceScale::new(tree, root, &params.distance_axis);
    let axis = &params.leaf_axis;

    let mut links = Vec::with_capacity(total.saturating_sub(1));
    let mut link_index = FxHashMap::default();
    let mut leaves = Vec::with_capacity(total);
    let mut leaf_index = FxHashMap::default();

    let (cl, cr) = match root_node.children {
        Some((l, r)) => (tree.node(l).count as f64, tree.node(r).count as f64),
        None => (0.0, 0.0),
    };
    let mut stack = vec![Pending { idx: root, current_left_count: cl, current_right_count: cr }];

    while let Some(Pending { idx, current_left_count, current_right_count }) = stack.pop() {
        let Some(hood) = Neighbourhood::of(tree, idx) else {
            leaf_index.insert(idx, leaves.len());
            let units = leaves.len() as f64 + 0.5;
            leaves.push((idx, axis.to_pixels(units, total)));
            continue;
        };
        debug_assert_eq!(current_left_count + current_right_count, total as f64);

        let Some((l, r)) = tree.node(idx).children else { continue };
        let mut right_units = hood.right_anchor(current_left_count);
        if tree.node(r).is_leaf() {
            right_units += 0.5;
        }

        let junction = round_half_up(scale.coordinate(tree, idx));
        link_index.insert(idx, links.len());
        links.push(Link {
            node: idx,
            left: l,
            right: r,
            distance: if junction <= 0.0 { MIN_DISTANCE_COORDINATE } else { junction },
            left_anchor: axis.to_pixels(hood.left_anchor(current_left_count), total),
            right_anchor: axis.to_pixels(right_units, total),
            left_end: scale.coordinate(tree, l),
            right_end: scale.coordinate(tree, r),
        });

        // Right first so the left subtree pops next.
        stack.push(Pending {
            idx: r,
            current_left_count: current_left_count + hood.right_node.left_count,
            current_right_count: current_right_count - hood.right_node.left_count,
        });
        stack.push(Pending {
            idx: l,
            current_left_count: current_left_count - hood.left_node.right_count,
            current_right_count: current_right_count + hood.left_node.right_count,
        });
    }

    debug!(
        "Laid out {} tree from {}: {} leaves, {} links, {:.2} px per leaf",
        tree.axis(),
        root_node.id,
        leaves.len(),
        links.len(),
        axis.pixels_per_leaf
    );

    DendrogramLayout {
        root,
        params: *params,
        links,
        link_index,
        leaves,
        leaf_index,
        distance_represented: root_node.distance,
    }
}
