//! Flat row table used when rows are not ordered by a dendrogram.

use std::cmp::Ordering;

use log::debug;

use crate::error::{HeatmapError, Result};
use crate::layout::LeafAxis;
use crate::tree::{ClusterTree, NodeIdx};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub leaf: NodeIdx,
    /// Data features followed by metadata values.
    pub values: Vec<Value>,
}

/// Sorts `rows` by `column`, or reverses them when `column` is the column they
/// were last sorted by.
///
/// The first row's value decides the comparison: numeric when it is a number,
/// lexicographic otherwise. Nulls sort before everything. The sort is stable.
pub fn reorder_rows(rows: &mut [TableRow], column: usize, previous: Option<usize>) -> Result<()> {
    let Some(first) = rows.first() else {
        return Ok(());
    };
    if column >= first.values.len() {
        return Err(HeatmapError::ColumnOutOfRange { index: column, len: first.values.len() });
    }

    if previous == Some(column) {
        rows.reverse();
        return Ok(());
    }

    let numeric = first.values[column].is_numeric();
    rows.sort_by(|a, b| match (cell(a, column), cell(b, column)) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) if numeric => a.cmp_numeric(b),
        (Some(a), Some(b)) => a.cmp_lexical(b),
    });
    Ok(())
}

fn cell(row: &TableRow, column: usize) -> Option<&Value> {
    row.values.get(column).filter(|v| !v.is_null())
}

/// The row table and the column it is currently sorted by.
#[derive(Debug, Clone, Default)]
pub struct RowTable {
    rows: Vec<TableRow>,
    ordered_by: Option<usize>,
}

impl RowTable {
    /// One row per leaf in insertion order. `metadata` looks up a leaf's extra values.
    pub fn from_tree<'a, F>(tree: &ClusterTree, metadata: F) -> Self
    where
        F: Fn(NodeIdx) -> Option<&'a [Value]>,
    {
        let rows = tree
            .leaf_indices()
            .iter()
            .map(|&leaf| {
                let node = tree.node(leaf);
                let mut values = node.features.clone();
                if let Some(extra) = metadata(leaf) {
                    values.extend_from_slice(extra);
                }
                TableRow { leaf, values }
            })
            .collect();
        RowTable { rows, ordered_by: None }
    }

    pub fn rows(&self) -> &[TableRow] {
        &self.rows
    }

    pub fn ordered_by(&self) -> Option<usize> {
        self.ordered_by
    }

    pub fn reorder(&mut self, column: usize) -> Result<()> {
        reorder_rows(&mut self.rows, column, self.ordered_by)?;
        debug!(
            "Rows {} by column {}",
            if self.ordered_by == Some(column) { "reversed" } else { "sorted" },
            column
        );
        self.ordered_by = Some(column);
        Ok(())
    }

    /// Leaf-axis coordinates in table order, one leaf slot apart.
    pub fn positions(&self, axis: &LeafAxis) -> Vec<(NodeIdx, f64)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.leaf, axis.origin + (i as f64 + 0.5) * axis.pixels_per_leaf))
            .collect()
    }
}
