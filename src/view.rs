//! The cluster heatmap controller.
//!
//! [`ClusterHeatmap`] owns the loaded trees, the settings, the zoom and highlight
//! state of both axes and everything derived from them. Every state change
//! recomputes the derived layout in full before returning.

use log::{debug, info};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::color::{
    compute_descriptors, global_descriptor, ColorScale, ColorScales, ColumnDescriptor,
    DescribeAlong, Rgb,
};
use crate::document::{ColumnMetadataSection, InputDocument};
use crate::error::{HeatmapError, Result};
use crate::events::{CellClick, HeatmapEvents, NoopEvents};
use crate::layout::{layout, DendrogramLayout, DistanceAxis, LayoutParams, LeafAxis};
use crate::order::RowTable;
use crate::settings::{Settings, SettingsPatch};
use crate::sizing::{horizontal_sizes, pixels_per_leaf, Frame, HorizontalSizes, HEADER_HEIGHT};
use crate::traversal::{collect_columns, collect_leaves, column_ranks, LinkMarks};
use crate::tree::{Axis, ClusterTree, NodeIdx};
use crate::value::Value;

/// One on-screen heatmap column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    Data(usize),
    Metadata(usize),
    Count,
}

/// Zoomed-into subtree roots, most recent last. Empty means the whole tree.
#[derive(Debug, Clone, Default)]
pub struct ZoomStack {
    stack: Vec<NodeIdx>,
}

impl ZoomStack {
    pub fn push(&mut self, node: NodeIdx) {
        self.stack.push(node);
    }

    pub fn pop(&mut self) -> Option<NodeIdx> {
        self.stack.pop()
    }

    pub fn top(&self) -> Option<NodeIdx> {
        self.stack.last().copied()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// A laid out row: its leaf and the leaf-axis coordinate of its centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowSlot {
    pub leaf: NodeIdx,
    pub y: f64,
}

/// Values stored for the leaf that holds an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectFeatures<'a> {
    pub leaf_id: &'a str,
    pub data: &'a [Value],
    pub metadata: Option<&'a [Value]>,
}

#[derive(Debug, Clone, Default)]
struct AxisState {
    zoom: ZoomStack,
    highlighted: Option<NodeIdx>,
    marks: LinkMarks,
}

/// Everything read from the input document, indexed for lookups.
#[derive(Debug, Clone)]
struct HeatmapData {
    rows: ClusterTree,
    columns: Option<ClusterTree>,
    feature_names: Vec<String>,
    data_width: usize,
    metadata: FxHashMap<NodeIdx, Vec<Value>>,
    metadata_names: Vec<String>,
    metadata_width: usize,
    column_metadata: Option<ColumnMetadataSection>,
    alternative: FxHashMap<NodeIdx, Vec<Value>>,
    object_index: FxHashMap<String, NodeIdx>,
    column_ranks: FxHashMap<NodeIdx, usize>,
}

impl HeatmapData {
    fn from_document(doc: InputDocument) -> Result<Self> {
        let rows = ClusterTree::build(Axis::Row, doc.data.nodes)?;
        let columns = doc
            .column_dendrogram
            .map(|section| ClusterTree::build(Axis::Column, section.nodes))
            .transpose()?;

        let by_leaf = |entries: Vec<(String, Vec<Value>)>, section: &str| {
            entries
                .into_iter()
                .filter_map(|(id, values)| match rows.index_of(&id) {
                    Some(idx) if rows.node(idx).is_leaf() => Some((idx, values)),
                    _ => {
                        debug!("Ignoring {} entry for unknown leaf {}", section, id);
                        None
                    }
                })
                .collect::<FxHashMap<NodeIdx, Vec<Value>>>()
        };

        let (metadata, metadata_names) = match doc.metadata {
            Some(section) => (by_leaf(section.nodes, "metadata"), section.feature_names),
            None => (FxHashMap::default(), Vec::new()),
        };
        let metadata_width = metadata
            .values()
            .map(Vec::len)
            .max()
            .unwrap_or(0)
            .max(metadata_names.len());
        let alternative = doc
            .alternative_data
            .map(|entries| by_leaf(entries, "alternative data"))
            .unwrap_or_default();

        let mut object_index = FxHashMap::default();
        for &leaf in rows.leaf_indices() {
            for object in &rows.node(leaf).objects {
                object_index.insert(object.clone(), leaf);
            }
        }

        let column_ranks = match &columns {
            Some(tree) => {
                let params = LayoutParams {
                    leaf_axis: LeafAxis::mirrored(0.0, 1.0),
                    distance_axis: DistanceAxis { span: 1.0, unified: false },
                };
                column_ranks(&layout(tree, tree.root(), &params))
            }
            None => FxHashMap::default(),
        };

        let data_width = rows.dimensions();
        info!(
            "Loaded {} rows x {} columns ({} metadata columns)",
            rows.leaf_indices().len(),
            data_width,
            metadata_width
        );

        Ok(HeatmapData {
            rows,
            columns,
            feature_names: doc.data.feature_names,
            data_width,
            metadata,
            metadata_names,
            metadata_width,
            column_metadata: doc.column_metadata,
            alternative,
            object_index,
            column_ranks,
        })
    }

    /// Switches off features whose input sections are missing.
    fn restrict(&self, mut settings: Settings) -> Settings {
        settings.metadata &= self.metadata_width > 0;
        settings.column_dendrogram &= self.columns.is_some() && settings.dendrogram;
        settings.column_metadata &= self.column_metadata.is_some();
        settings.alternative_data &= !self.alternative.is_empty();
        settings
    }

    fn tree(&self, axis: Axis) -> Result<&ClusterTree> {
        match axis {
            Axis::Row => Ok(&self.rows),
            Axis::Column => self.columns.as_ref().ok_or(HeatmapError::MissingColumnDendrogram),
        }
    }

    /// Logical columns under a column-tree node, ascending.
    fn columns_under(&self, tree: &ClusterTree, node: NodeIdx) -> Vec<usize> {
        let mut columns = collect_columns(tree, node, &self.column_ranks);
        columns.sort_unstable();
        columns
    }
}

/// Geometry and color domains recomputed after every state change.
#[derive(Debug, Clone, Default)]
struct Derived {
    frame: Frame,
    sizes: HorizontalSizes,
    pixels_per_leaf: f64,
    row_layout: Option<DendrogramLayout>,
    rows: Vec<RowSlot>,
    row_slots: FxHashMap<NodeIdx, usize>,
    column_layout: Option<DendrogramLayout>,
    visible_columns: Vec<ColumnRef>,
    data_descriptors: Vec<ColumnDescriptor>,
    metadata_descriptors: Vec<ColumnDescriptor>,
    column_metadata_descriptors: Vec<ColumnDescriptor>,
    count_descriptor: ColumnDescriptor,
    highlighted_rows: Vec<NodeIdx>,
}

/// Interactive cluster heatmap state.
#[derive(Debug)]
pub struct ClusterHeatmap<E: HeatmapEvents = NoopEvents> {
    requested: Settings,
    settings: Settings,
    scales: ColorScales,
    events: E,
    data: HeatmapData,
    row_table: RowTable,
    hidden_columns: FxHashSet<usize>,
    row_state: AxisState,
    column_state: AxisState,
    derived: Derived,
}

fn check_scales(scales: &ColorScales, settings: &Settings) -> Result<()> {
    for name in settings.colors.names() {
        scales.get(name)?;
    }
    Ok(())
}

impl ClusterHeatmap<NoopEvents> {
    /// A heatmap with default settings and no observer.
    pub fn from_document(doc: InputDocument) -> Result<Self> {
        Self::new(doc, Settings::default(), NoopEvents)
    }
}

impl<E: HeatmapEvents> ClusterHeatmap<E> {
    pub fn new(doc: InputDocument, settings: Settings, events: E) -> Result<Self> {
        Self::with_scales(doc, settings, ColorScales::default(), events)
    }

    /// Like [`new`](Self::new) with a prepared color scale registry.
    pub fn with_scales(
        doc: InputDocument,
        settings: Settings,
        scales: ColorScales,
        events: E,
    ) -> Result<Self> {
        settings.percentiles.validate()?;
        check_scales(&scales, &settings)?;
        let data = HeatmapData::from_document(doc)?;
        let mut heatmap = ClusterHeatmap {
            settings: data.restrict(settings.clone()),
            requested: settings,
            scales,
            events,
            data,
            row_table: RowTable::default(),
            hidden_columns: FxHashSet::default(),
            row_state: AxisState::default(),
            column_state: AxisState::default(),
            derived: Derived::default(),
        };
        heatmap.reset_rows()?;
        heatmap.refresh();
        Ok(heatmap)
    }

    /// Replaces the loaded document. Settings and color scales are kept; zoom,
    /// highlight and the column filter start over.
    pub fn load_data(&mut self, doc: InputDocument) -> Result<()> {
        let data = HeatmapData::from_document(doc)?;
        self.settings = data.restrict(self.requested.clone());
        self.data = data;
        self.hidden_columns.clear();
        self.row_state = AxisState::default();
        self.column_state = AxisState::default();
        self.reset_rows()?;
        self.refresh();
        Ok(())
    }

    fn reset_rows(&mut self) -> Result<()> {
        let data = &self.data;
        self.row_table = RowTable::from_tree(&data.rows, |leaf| {
            data.metadata.get(&leaf).map(Vec::as_slice)
        });
        if !self.settings.dendrogram && data.data_width > 0 {
            self.row_table.reorder(0)?;
        }
        Ok(())
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    pub fn tree(&self, axis: Axis) -> Result<&ClusterTree> {
        self.data.tree(axis)
    }

    pub fn row_tree(&self) -> &ClusterTree {
        &self.data.rows
    }

    pub fn column_tree(&self) -> Option<&ClusterTree> {
        self.data.columns.as_ref()
    }

    /// Root of the subtree currently shown on `axis`; `None` for columns
    /// without a column dendrogram.
    pub fn effective_root(&self, axis: Axis) -> Option<NodeIdx> {
        match axis {
            Axis::Row => Some(self.row_state.zoom.top().unwrap_or(self.data.rows.root())),
            Axis::Column => {
                let tree = self.data.columns.as_ref()?;
                Some(self.column_state.zoom.top().unwrap_or(tree.root()))
            }
        }
    }

    pub fn zoom_depth(&self, axis: Axis) -> usize {
        self.axis_state(axis).zoom.depth()
    }

    pub fn highlighted(&self, axis: Axis) -> Option<NodeIdx> {
        self.axis_state(axis).highlighted
    }

    /// Whether the link of internal node `node` is painted as highlighted.
    pub fn is_link_marked(&self, axis: Axis, node: NodeIdx) -> bool {
        self.axis_state(axis).marks.is_marked(node)
    }

    fn axis_state(&self, axis: Axis) -> &AxisState {
        match axis {
            Axis::Row => &self.row_state,
            Axis::Column => &self.column_state,
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.derived.frame
    }

    pub fn sizes(&self) -> &HorizontalSizes {
        &self.derived.sizes
    }

    pub fn pixels_per_leaf(&self) -> f64 {
        self.derived.pixels_per_leaf
    }

    pub fn image_height(&self) -> f64 {
        self.derived.frame.height(self.derived.rows.len(), self.derived.pixels_per_leaf)
    }

    /// Laid out rows, top to bottom.
    pub fn rows(&self) -> &[RowSlot] {
        &self.derived.rows
    }

    pub fn row_y(&self, leaf: NodeIdx) -> Option<f64> {
        self.derived.row_slots.get(&leaf).map(|&i| self.derived.rows[i].y)
    }

    pub fn row_layout(&self) -> Option<&DendrogramLayout> {
        self.derived.row_layout.as_ref()
    }

    pub fn column_layout(&self) -> Option<&DendrogramLayout> {
        self.derived.column_layout.as_ref()
    }

    pub fn visible_columns(&self) -> &[ColumnRef] {
        &self.derived.visible_columns
    }

    /// Leaves painted with the highlight scale, top to bottom.
    pub fn highlighted_rows(&self) -> &[NodeIdx] {
        &self.derived.highlighted_rows
    }

    pub fn data_descriptors(&self) -> &[ColumnDescriptor] {
        &self.derived.data_descriptors
    }

    pub fn column_metadata_rows(&self) -> usize {
        match (&self.data.column_metadata, self.settings.column_metadata) {
            (Some(section), true) => section.features.len(),
            _ => 0,
        }
    }

    pub fn column_metadata_name(&self, row: usize) -> Option<&str> {
        self.data.column_metadata.as_ref()?.feature_names.get(row).map(String::as_str)
    }

    /// Lays out `axis` rooted at `root_id` without touching the zoom stack.
    ///
    /// The next state change lays the axis out from its effective root again.
    pub fn compute_layout(&mut self, root_id: &str, axis: Axis) -> Result<()> {
        let root = self.data.tree(axis)?.resolve(root_id)?;
        match axis {
            Axis::Row => self.relayout(root, self.effective_root(Axis::Column)),
            Axis::Column => {
                let row_root = self.effective_root(Axis::Row).unwrap_or(self.data.rows.root());
                self.relayout(row_root, Some(root));
            }
        }
        Ok(())
    }

    /// Leaves every zoom and clears both highlights, then lays the view out
    /// from the full trees. Settings and the column filter are kept.
    pub fn reset_view(&mut self) {
        self.row_state = AxisState::default();
        self.column_state = AxisState::default();
        self.refresh();
        debug!("View reset to the full trees");
        self.events.on_refresh();
    }

    /// Drops column zoom and highlight once the column dendrogram is off screen.
    fn drop_hidden_column_state(&mut self) {
        let state = &self.column_state;
        if !self.column_tree_shown() && (!state.zoom.is_empty() || state.highlighted.is_some()) {
            debug!("Column dendrogram hidden; leaving column zoom and highlight");
            self.column_state = AxisState::default();
        }
    }

    fn refresh(&mut self) {
        let row_root = self.row_state.zoom.top().unwrap_or(self.data.rows.root());
        self.relayout(row_root, self.effective_root(Axis::Column));
    }

    fn columns_order(&self) -> Vec<usize> {
        let width = self.data.data_width;
        let order = &self.settings.columns_order;
        let mut seen = vec![false; width];
        let is_permutation = order.len() == width
            && order.iter().all(|&i| i < width && !std::mem::replace(&mut seen[i], true));
        if is_permutation {
            order.clone()
        } else {
            (0..width).collect()
        }
    }

    fn column_tree_shown(&self) -> bool {
        self.settings.column_dendrogram && self.data.columns.is_some()
    }

    fn visible_columns_for(&self, column_root: Option<NodeIdx>) -> Vec<ColumnRef> {
        let width = self.data.data_width;
        let data_columns = match (&self.data.columns, column_root, self.column_tree_shown()) {
            (Some(tree), Some(root), true) => {
                let mut columns = self.data.columns_under(tree, root);
                columns.retain(|&i| i < width);
                columns
            }
            _ => self.columns_order(),
        };

        let shown = |index: usize| !self.hidden_columns.contains(&index);
        let mut visible: Vec<ColumnRef> =
            data_columns.into_iter().filter(|&i| shown(i)).map(ColumnRef::Data).collect();
        if self.settings.metadata {
            visible.extend(
                (0..self.data.metadata_width)
                    .filter(|&j| shown(width + j))
                    .map(ColumnRef::Metadata),
            );
        }
        if self.settings.count_column && shown(width + self.data.metadata_width) {
            visible.push(ColumnRef::Count);
        }
        visible
    }

    fn relayout(&mut self, row_root: NodeIdx, column_root: Option<NodeIdx>) {
        let settings = &self.settings;
        let column_tree_shown = self.column_tree_shown();
        let visible_columns = self.visible_columns_for(column_root);

        let tall_footer = column_tree_shown && !self.data.feature_names.is_empty();
        let frame = Frame::new(settings, self.column_metadata_rows(), tall_footer);
        let sizes = horizontal_sizes(settings, visible_columns.len());

        let (row_layout, rows, ppl) = if settings.dendrogram {
            let count = self.data.rows.node(row_root).count;
            let ppl = pixels_per_leaf(settings, &frame, count);
            let params = LayoutParams {
                leaf_axis: LeafAxis::new(frame.top_heatmap_offset, ppl),
                distance_axis: DistanceAxis { span: sizes.distance, unified: settings.unified_distance },
            };
            let row_layout = layout(&self.data.rows, row_root, &params);
            let rows: Vec<RowSlot> =
                row_layout.leaves().iter().map(|&(leaf, y)| RowSlot { leaf, y }).collect();
            (Some(row_layout), rows, ppl)
        } else {
            let ppl = pixels_per_leaf(settings, &frame, self.row_table.rows().len());
            let axis = LeafAxis::new(frame.top_heatmap_offset, ppl);
            let rows: Vec<RowSlot> = self
                .row_table
                .positions(&axis)
                .into_iter()
                .map(|(leaf, y)| RowSlot { leaf, y })
                .collect();
            (None, rows, ppl)
        };
        let row_slots: FxHashMap<NodeIdx, usize> =
            rows.iter().enumerate().map(|(i, slot)| (slot.leaf, i)).collect();

        let column_layout = match (&self.data.columns, column_root, column_tree_shown) {
            (Some(tree), Some(root), true) => {
                let params = LayoutParams {
                    leaf_axis: LeafAxis::mirrored(sizes.heatmap_x, sizes.pixels_per_column),
                    distance_axis: DistanceAxis { span: HEADER_HEIGHT, unified: settings.unified_distance },
                };
                Some(layout(tree, root, &params))
            }
            _ => None,
        };

        let percentiles = &settings.percentiles;
        let features: Vec<&[Value]> =
            rows.iter().map(|slot| self.data.rows.node(slot.leaf).features.as_slice()).collect();
        let data_descriptors = if settings.independent_columns {
            compute_descriptors(&features, DescribeAlong::Columns, percentiles)
        } else {
            vec![global_descriptor(&features, percentiles); self.data.data_width]
        };
        let metadata_rows: Vec<&[Value]> = rows
            .iter()
            .filter_map(|slot| self.data.metadata.get(&slot.leaf).map(Vec::as_slice))
            .collect();
        let metadata_descriptors =
            compute_descriptors(&metadata_rows, DescribeAlong::Columns, percentiles);
        let column_metadata_descriptors = match &self.data.column_metadata {
            Some(section) => {
                let matrix: Vec<&[Value]> = section.features.iter().map(Vec::as_slice).collect();
                compute_descriptors(&matrix, DescribeAlong::Rows, percentiles)
            }
            None => Vec::new(),
        };
        let counts = rows.iter().map(|slot| self.data.rows.node(slot.leaf).objects.len());
        let (min, max) = counts.fold((usize::MAX, 0), |(lo, hi), n| (lo.min(n), hi.max(n)));
        let count_descriptor = if rows.is_empty() {
            ColumnDescriptor::default()
        } else {
            ColumnDescriptor::numeric(min as f64, max as f64, (min + max) as f64 / 2.0)
        };

        debug!(
            "Relayout: {} rows from {}, {} visible columns",
            rows.len(),
            self.data.rows.node(row_root).id,
            visible_columns.len()
        );

        self.derived = Derived {
            frame,
            sizes,
            pixels_per_leaf: ppl,
            row_layout,
            rows,
            row_slots,
            column_layout,
            visible_columns,
            data_descriptors,
            metadata_descriptors,
            column_metadata_descriptors,
            count_descriptor,
            highlighted_rows: Vec::new(),
        };
        self.resolve_highlighted_rows();
    }

    fn resolve_highlighted_rows(&mut self) {
        let mut leaves: Vec<NodeIdx> = self
            .settings
            .highlighted_rows
            .iter()
            .filter_map(|object| self.data.object_index.get(object).copied())
            .filter(|leaf| self.derived.row_slots.contains_key(leaf))
            .collect::<FxHashSet<_>>()
            .into_iter()
            .collect();
        leaves.sort_by_key(|leaf| self.derived.row_slots[leaf]);
        self.derived.highlighted_rows = leaves;
    }

    /// Zooms `axis` into the subtree at `node_id`.
    ///
    /// Returns `false` without doing anything when the node is already the
    /// effective root.
    pub fn zoom_into(&mut self, axis: Axis, node_id: &str) -> Result<bool> {
        let idx = self.data.tree(axis)?.resolve(node_id)?;
        if axis == Axis::Column && !self.column_tree_shown() {
            debug!("Column dendrogram hidden; not zooming into {}", node_id);
            return Ok(false);
        }
        if Some(idx) == self.effective_root(axis) {
            debug!("{} is already the {} root", node_id, axis);
            return Ok(false);
        }

        let state = match axis {
            Axis::Row => &mut self.row_state,
            Axis::Column => &mut self.column_state,
        };
        state.zoom.push(idx);
        state.highlighted = None;
        state.marks.clear();
        let depth = state.zoom.depth();
        self.refresh();

        let tree = self.data.tree(axis)?;
        let id = tree.node(idx).id.clone();
        match axis {
            Axis::Row => {
                let object_ids = collect_leaves(tree, idx);
                self.events.on_zoom(&object_ids, &id);
            }
            Axis::Column => {
                let columns = self.data.columns_under(tree, idx);
                self.events.on_columns_zoom(&columns, &id);
            }
        }
        debug!("Zoomed {} axis into {} (depth {})", axis, id, depth);
        Ok(true)
    }

    /// Leaves the innermost zoom on `axis` and highlights the subtree just left,
    /// keeping the highlight if it is already on.
    ///
    /// Returns `false` when `axis` is not zoomed.
    pub fn unzoom(&mut self, axis: Axis) -> Result<bool> {
        self.data.tree(axis)?;
        let state = match axis {
            Axis::Row => &mut self.row_state,
            Axis::Column => &mut self.column_state,
        };
        let Some(popped) = state.zoom.pop() else {
            return Ok(false);
        };
        self.refresh();

        let id = self.data.tree(axis)?.node(popped).id.clone();
        match axis {
            Axis::Row => self.events.on_unzoom(&id),
            Axis::Column => self.events.on_columns_unzoom(&id),
        }
        debug!("Unzoomed {} axis from {} (depth {})", axis, id, self.zoom_depth(axis));
        if self.axis_state(axis).highlighted != Some(popped) {
            self.highlight_node(axis, popped)?;
        }
        Ok(true)
    }

    /// Highlights the cluster at `node_id`, or clears it when it is already highlighted.
    /// Column clusters cannot be highlighted while the column dendrogram is hidden.
    pub fn highlight(&mut self, axis: Axis, node_id: &str) -> Result<()> {
        let idx = self.data.tree(axis)?.resolve(node_id)?;
        if axis == Axis::Column && !self.column_tree_shown() {
            debug!("Column dendrogram hidden; not highlighting {}", node_id);
            return Ok(());
        }
        self.highlight_node(axis, idx)
    }

    fn highlight_node(&mut self, axis: Axis, idx: NodeIdx) -> Result<()> {
        if self.axis_state(axis).highlighted == Some(idx) {
            self.unhighlight(axis)?;
            return Ok(());
        }
        self.unhighlight(axis)?;

        let tree = self.data.tree(axis)?;
        let state = match axis {
            Axis::Row => &mut self.row_state,
            Axis::Column => &mut self.column_state,
        };
        state.marks.mark(tree, idx);
        state.highlighted = Some(idx);

        let id = tree.node(idx).id.clone();
        match axis {
            Axis::Row => {
                let object_ids = collect_leaves(tree, idx);
                self.events.on_cluster_highlight(&object_ids, &id);
            }
            Axis::Column => {
                let columns = self.data.columns_under(tree, idx);
                self.events.on_column_cluster_highlight(&columns, &id);
            }
        }
        Ok(())
    }

    /// Clears the highlight on `axis`; `false` when nothing was highlighted.
    pub fn unhighlight(&mut self, axis: Axis) -> Result<bool> {
        let tree = self.data.tree(axis)?;
        let state = match axis {
            Axis::Row => &mut self.row_state,
            Axis::Column => &mut self.column_state,
        };
        let Some(idx) = state.highlighted.take() else {
            return Ok(false);
        };
        state.marks.unmark(tree, idx);

        let id = tree.node(idx).id.clone();
        match axis {
            Axis::Row => self.events.on_cluster_unhighlight(&id),
            Axis::Column => self.events.on_column_cluster_unhighlight(&id),
        }
        Ok(true)
    }

    /// Paints the rows holding `object_ids` with the highlight scale. Unknown
    /// ids are ignored; an empty list clears. Returns the number of rows painted.
    pub fn highlight_rows(&mut self, object_ids: Vec<String>) -> usize {
        self.requested.highlighted_rows = object_ids.clone();
        self.settings.highlighted_rows = object_ids;
        self.resolve_highlighted_rows();
        self.derived.highlighted_rows.len()
    }

    /// Sorts the flat row table by table column `column` (data columns first,
    /// then metadata). Rows ordered by a dendrogram are left alone and `false`
    /// is returned.
    pub fn reorder_rows(&mut self, column: usize) -> Result<bool> {
        if self.settings.dendrogram {
            debug!("Rows follow the dendrogram; not sorting by column {}", column);
            return Ok(false);
        }
        self.row_table.reorder(column)?;
        self.refresh();
        Ok(true)
    }

    /// Table column the flat row table is sorted by.
    pub fn rows_ordered_by(&self) -> Option<usize> {
        self.row_table.ordered_by()
    }

    pub fn register_color_scale(&mut self, name: impl Into<String>, scale: ColorScale) {
        self.scales.register(name, scale);
    }

    pub fn color_scales(&self) -> &ColorScales {
        &self.scales
    }

    /// Merges `patch` into the settings and recomputes the view. On error the
    /// previous settings stay in force.
    pub fn update_settings(&mut self, patch: &SettingsPatch) -> Result<()> {
        let requested = self.requested.merge(patch)?;
        check_scales(&self.scales, &requested)?;
        self.settings = self.data.restrict(requested.clone());
        self.requested = requested;
        if !self.settings.dendrogram && self.row_table.ordered_by().is_none() && self.data.data_width > 0 {
            self.row_table.reorder(0)?;
        }
        self.drop_hidden_column_state();
        self.refresh();
        Ok(())
    }

    /// Shows exactly the listed table columns: data column `i` is `i`, metadata
    /// column `j` is `data_width + j` and the count column follows the metadata.
    ///
    /// Hiding a data column switches the column dendrogram off, and with it
    /// any column zoom or highlight.
    pub fn set_visible_columns(&mut self, visible: &[usize]) -> Result<()> {
        let total = self.data.data_width + self.data.metadata_width + 1;
        if let Some(&index) = visible.iter().find(|&&i| i >= total) {
            return Err(HeatmapError::ColumnOutOfRange { index, len: total });
        }
        let shown: FxHashSet<usize> = visible.iter().copied().collect();
        self.hidden_columns = (0..total).filter(|i| !shown.contains(i)).collect();

        let data_hidden = self.hidden_columns.iter().any(|&i| i < self.data.data_width);
        if data_hidden && self.settings.column_dendrogram {
            info!("Column filter active; hiding the column dendrogram");
            self.settings.column_dendrogram = false;
            self.requested.column_dendrogram = false;
        }
        self.drop_hidden_column_state();
        self.refresh();
        Ok(())
    }

    pub fn features_for_object(&self, object_id: &str) -> Option<ObjectFeatures<'_>> {
        let leaf = *self.data.object_index.get(object_id)?;
        let node = self.data.rows.node(leaf);
        Some(ObjectFeatures {
            leaf_id: &node.id,
            data: &node.features,
            metadata: self.data.metadata.get(&leaf).map(Vec::as_slice),
        })
    }

    pub fn column_header(&self, column: ColumnRef) -> String {
        match column {
            ColumnRef::Data(i) => self.data.feature_names.get(i).cloned().unwrap_or_default(),
            ColumnRef::Metadata(j) => self.data.metadata_names.get(j).cloned().unwrap_or_default(),
            ColumnRef::Count => "Count".to_string(),
        }
    }

    /// The stored value behind a cell.
    pub fn value(&self, leaf: NodeIdx, column: ColumnRef) -> Value {
        let node = self.data.rows.node(leaf);
        match column {
            ColumnRef::Data(i) => node.features.get(i).cloned().unwrap_or(Value::Null),
            ColumnRef::Metadata(j) => self
                .data
                .metadata
                .get(&leaf)
                .and_then(|values| values.get(j))
                .cloned()
                .unwrap_or(Value::Null),
            ColumnRef::Count => Value::Number(node.objects.len() as f64),
        }
    }

    /// The value shown in a cell: the alternative value for data cells when
    /// alternative data is enabled, the stored value otherwise.
    pub fn display_value(&self, leaf: NodeIdx, column: ColumnRef) -> Value {
        if let (ColumnRef::Data(i), true) = (column, self.settings.alternative_data) {
            if let Some(value) = self.data.alternative.get(&leaf).and_then(|values| values.get(i)) {
                return value.clone();
            }
        }
        self.value(leaf, column)
    }

    /// Fill color of a cell, `None` for empty cells.
    pub fn cell_color(&self, leaf: NodeIdx, column: ColumnRef) -> Result<Option<Rgb>> {
        let colors = &self.settings.colors;
        let derived = &self.derived;
        let (descriptor, scale_name) = match column {
            ColumnRef::Data(i) => {
                let highlighted = derived.highlighted_rows.contains(&leaf);
                let scale = if highlighted { &colors.highlight } else { &colors.heatmap };
                (derived.data_descriptors.get(i), scale)
            }
            ColumnRef::Metadata(j) => (derived.metadata_descriptors.get(j), &colors.metadata),
            ColumnRef::Count => (Some(&derived.count_descriptor), &colors.count_column),
        };
        let scale = self.scales.get(scale_name)?;
        let value = self.value(leaf, column);
        Ok(descriptor.and_then(|d| d.color(&value, scale)))
    }

    /// Fill color of column metadata row `row` above data column `column`.
    pub fn column_metadata_color(&self, row: usize, column: usize) -> Result<Option<Rgb>> {
        let scale = self.scales.get(&self.settings.colors.column_metadata)?;
        let Some(section) = &self.data.column_metadata else {
            return Ok(None);
        };
        let value = section.features.get(row).and_then(|values| values.get(column));
        let descriptor = self.derived.column_metadata_descriptors.get(row);
        Ok(match (value, descriptor) {
            (Some(value), Some(descriptor)) => descriptor.color(value, scale),
            _ => None,
        })
    }

    /// Reports a click on the row of `leaf_id`.
    pub fn row_click(&mut self, leaf_id: &str) -> Result<()> {
        let leaf = self.data.rows.resolve(leaf_id)?;
        let objects = self.data.rows.node(leaf).objects.clone();
        self.events.on_row_click(&objects);
        Ok(())
    }

    /// Reports a click on the cell of `leaf_id` in visible column `position`.
    pub fn cell_click(&mut self, leaf_id: &str, position: usize) -> Result<CellClick> {
        let leaf = self.data.rows.resolve(leaf_id)?;
        let visible = &self.derived.visible_columns;
        let column = *visible.get(position).ok_or(HeatmapError::ColumnOutOfRange {
            index: position,
            len: visible.len(),
        })?;
        let click = CellClick {
            value: self.display_value(leaf, column),
            header: self.column_header(column),
            object_ids: self.data.rows.node(leaf).objects.clone(),
        };
        self.events.on_cell_click(&click);
        Ok(click)
    }
}
