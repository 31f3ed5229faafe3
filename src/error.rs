use std::fmt;

use thiserror::Error;

use crate::tree::Axis;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HeatmapError>;

/// The structural rule a node breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// More than one node has no parent.
    ExtraRoot,
    /// No node without a parent exists.
    NoRoot,
    /// `count` is zero.
    ZeroCount,
    /// `count(node) != count(left) + count(right)`.
    CountMismatch { expected: usize, found: usize },
    /// An internal node is missing one of its children.
    MissingChild,
    /// A referenced child or parent id is absent from the node map.
    DanglingReference(String),
    /// A child names a different parent than the node pointing at it.
    ParentMismatch,
    /// A row leaf without objects.
    NoObjects,
    /// The node is reachable along more than one path.
    Revisited,
    /// The id appears twice in the node map.
    DuplicateId,
}

/// One violating node and the rule it broke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub node_id: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::ExtraRoot => write!(f, "{}: second parentless node", self.node_id),
            ViolationKind::NoRoot => write!(f, "no parentless node"),
            ViolationKind::ZeroCount => write!(f, "{}: count is zero", self.node_id),
            ViolationKind::CountMismatch { expected, found } => write!(
                f,
                "{}: count {} but children sum to {}",
                self.node_id, found, expected
            ),
            ViolationKind::MissingChild => write!(f, "{}: internal node lacks a child", self.node_id),
            ViolationKind::DanglingReference(id) => {
                write!(f, "{}: references unknown node {}", self.node_id, id)
            }
            ViolationKind::ParentMismatch => write!(f, "{}: parent link disagrees", self.node_id),
            ViolationKind::NoObjects => write!(f, "{}: leaf has no objects", self.node_id),
            ViolationKind::Revisited => write!(f, "{}: reachable more than once", self.node_id),
            ViolationKind::DuplicateId => write!(f, "{}: duplicate node id", self.node_id),
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum HeatmapError {
    #[error("{axis} tree integrity violated: {}", join_violations(.violations))]
    TreeIntegrity {
        axis: Axis,
        violations: Vec<Violation>,
    },

    #[error("unknown color scale: {0}")]
    UnknownColorScale(String),

    #[error("{name} percentile must lie within [0, 100], got {value}")]
    InvalidPercentile { name: &'static str, value: f64 },

    #[error("unknown {axis} node: {id}")]
    UnknownNode { axis: Axis, id: String },

    #[error("column {index} out of range (table has {len} columns)")]
    ColumnOutOfRange { index: usize, len: usize },

    #[error("no column dendrogram loaded")]
    MissingColumnDendrogram,

    #[error("failed to parse input document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl HeatmapError {
    /// Ids of every node named by a `TreeIntegrity` error.
    pub fn violating_ids(&self) -> Vec<&str> {
        match self {
            HeatmapError::TreeIntegrity { violations, .. } => {
                violations.iter().map(|v| v.node_id.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}
