//! Hierarchical-clustering heatmap core.
//!
//! Load an [`InputDocument`], wrap it in a [`ClusterHeatmap`] and drive zoom,
//! highlight and sorting through the controller. [`render`] draws the result.

pub mod color;
pub mod document;
pub mod error;
pub mod events;
pub mod layout;
pub mod order;
pub mod render;
pub mod settings;
pub mod sizing;
pub mod traversal;
pub mod tree;
pub mod value;
pub mod view;

pub use color::{ColorScale, ColorScales, ColumnDescriptor, Percentiles, Rgb};
pub use document::InputDocument;
pub use error::{HeatmapError, Result};
pub use events::{CellClick, EventLog, HeatmapEvent, HeatmapEvents, LoggingEvents, NoopEvents};
pub use layout::{layout, DendrogramLayout, LayoutParams};
pub use settings::{Settings, SettingsPatch};
pub use tree::{Axis, ClusterNode, ClusterTree, NodeIdx};
pub use value::Value;
pub use view::{ClusterHeatmap, ColumnRef};
