//! View settings and partial overrides.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::color::Percentiles;
use crate::error::Result;

/// Color scale names per heatmap part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorSettings {
    pub heatmap: String,
    pub metadata: String,
    pub column_metadata: String,
    pub count_column: String,
    pub highlight: String,
}

impl Default for ColorSettings {
    fn default() -> Self {
        ColorSettings {
            heatmap: "Greens".into(),
            metadata: "Reds".into(),
            column_metadata: "RdLrBu".into(),
            count_column: "Reds".into(),
            highlight: "Oranges".into(),
        }
    }
}

impl ColorSettings {
    pub fn names(&self) -> [&str; 5] {
        [
            self.heatmap.as_str(),
            self.metadata.as_str(),
            self.column_metadata.as_str(),
            self.count_column.as_str(),
            self.highlight.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub colors: ColorSettings,
    pub percentiles: Percentiles,
    pub dendrogram: bool,
    pub column_dendrogram: bool,
    pub metadata: bool,
    pub column_metadata: bool,
    pub count_column: bool,
    /// Describe every data column on its own; otherwise one global domain.
    pub independent_columns: bool,
    pub unified_distance: bool,
    pub alternative_data: bool,
    pub width: f64,
    pub max_height: f64,
    pub min_row_height: f64,
    pub max_row_height: f64,
    pub max_column_width: Option<f64>,
    pub heatmap_part_width: f64,
    pub column_metadata_row_height: f64,
    pub columns_order: Vec<usize>,
    pub highlighted_rows: Vec<String>,
}

pub const MAX_HEATMAP_PART_WIDTH: f64 = 0.9;

impl Default for Settings {
    fn default() -> Self {
        Settings {
            colors: ColorSettings::default(),
            percentiles: Percentiles::default(),
            dendrogram: true,
            column_dendrogram: true,
            metadata: true,
            column_metadata: true,
            count_column: false,
            independent_columns: true,
            unified_distance: false,
            alternative_data: false,
            width: 1000.0,
            max_height: 800.0,
            min_row_height: 0.0,
            max_row_height: 25.0,
            max_column_width: Some(150.0),
            heatmap_part_width: 0.7,
            column_metadata_row_height: 8.0,
            columns_order: Vec::new(),
            highlighted_rows: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorSettingsPatch {
    pub heatmap: Option<String>,
    pub metadata: Option<String>,
    pub column_metadata: Option<String>,
    pub count_column: Option<String>,
    pub highlight: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PercentilesPatch {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub middle: Option<f64>,
}

/// A partial [`Settings`]: every field optional, nested groups merge field by field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    pub colors: Option<ColorSettingsPatch>,
    pub percentiles: Option<PercentilesPatch>,
    pub dendrogram: Option<bool>,
    pub column_dendrogram: Option<bool>,
    pub metadata: Option<bool>,
    pub column_metadata: Option<bool>,
    pub count_column: Option<bool>,
    pub independent_columns: Option<bool>,
    pub unified_distance: Option<bool>,
    pub alternative_data: Option<bool>,
    pub width: Option<f64>,
    pub max_height: Option<f64>,
    pub min_row_height: Option<f64>,
    pub max_row_height: Option<f64>,
    pub max_column_width: Option<f64>,
    pub heatmap_part_width: Option<f64>,
    pub column_metadata_row_height: Option<f64>,
    pub columns_order: Option<Vec<usize>>,
    pub highlighted_rows: Option<Vec<String>>,
}

impl SettingsPatch {
    pub fn from_path(path: &Path) -> Result<Self> {
        info!("Reading settings from {:?}", path);
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Overlays `other` on `self`; fields set in `other` win.
    pub fn overlay(self, other: SettingsPatch) -> SettingsPatch {
        fn pick<T>(base: Option<T>, top: Option<T>) -> Option<T> {
            top.or(base)
        }
        let colors = match (self.colors, other.colors) {
            (Some(base), Some(top)) => Some(ColorSettingsPatch {
                heatmap: pick(base.heatmap, top.heatmap),
                metadata: pick(base.metadata, top.metadata),
                column_metadata: pick(base.column_metadata, top.column_metadata),
                count_column: pick(base.count_column, top.count_column),
                highlight: pick(base.highlight, top.highlight),
            }),
            (base, top) => top.or(base),
        };
        let percentiles = match (self.percentiles, other.percentiles) {
            (Some(base), Some(top)) => Some(PercentilesPatch {
                min: pick(base.min, top.min),
                max: pick(base.max, top.max),
                middle: pick(base.middle, top.middle),
            }),
            (base, top) => top.or(base),
        };
        SettingsPatch {
            colors,
            percentiles,
            dendrogram: pick(self.dendrogram, other.dendrogram),
            column_dendrogram: pick(self.column_dendrogram, other.column_dendrogram),
            metadata: pick(self.metadata, other.metadata),
            column_metadata: pick(self.column_metadata, other.column_metadata),
            count_column: pick(self.count_column, other.count_column),
            independent_columns: pick(self.independent_columns, other.independent_columns),
            unified_distance: pick(self.unified_distance, other.unified_distance),
            alternative_data: pick(self.alternative_data, other.alternative_data),
            width: pick(self.width, other.width),
            max_height: pick(self.max_height, other.max_height),
            min_row_height: pick(self.min_row_height, other.min_row_height),
            max_row_height: pick(self.max_row_height, other.max_row_height),
            max_column_width: pick(self.max_column_width, other.max_column_width),
            heatmap_part_width: pick(self.heatmap_part_width, other.heatmap_part_width),
            column_metadata_row_height: pick(
                self.column_metadata_row_height,
                other.column_metadata_row_height,
            ),
            columns_order: pick(self.columns_order, other.columns_order),
            highlighted_rows: pick(self.highlighted_rows, other.highlighted_rows),
        }
    }
}

fn set<T: Clone>(target: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *target = value.clone();
    }
}

impl Settings {
    /// Applies `patch` and returns the merged settings. `self` is left untouched,
    /// so a rejected patch keeps the previous settings in force.
    pub fn merge(&self, patch: &SettingsPatch) -> Result<Settings> {
        let mut merged = self.clone();

        if let Some(colors) = &patch.colors {
            set(&mut merged.colors.heatmap, &colors.heatmap);
            set(&mut merged.colors.metadata, &colors.metadata);
            set(&mut merged.colors.column_metadata, &colors.column_metadata);
            set(&mut merged.colors.count_column, &colors.count_column);
            set(&mut merged.colors.highlight, &colors.highlight);
        }
        if let Some(p) = &patch.percentiles {
            set(&mut merged.percentiles.min, &p.min);
            set(&mut merged.percentiles.max, &p.max);
            set(&mut merged.percentiles.middle, &p.middle);
        }
        merged.percentiles.validate()?;

        set(&mut merged.dendrogram, &patch.dendrogram);
        set(&mut merged.column_dendrogram, &patch.column_dendrogram);
        set(&mut merged.metadata, &patch.metadata);
        set(&mut merged.column_metadata, &patch.column_metadata);
        set(&mut merged.count_column, &patch.count_column);
        set(&mut merged.independent_columns, &patch.independent_columns);
        set(&mut merged.unified_distance, &patch.unified_distance);
        set(&mut merged.alternative_data, &patch.alternative_data);
        set(&mut merged.width, &patch.width);
        set(&mut merged.max_height, &patch.max_height);
        set(&mut merged.min_row_height, &patch.min_row_height);
        set(&mut merged.max_row_height, &patch.max_row_height);
        if patch.max_column_width.is_some() {
            merged.max_column_width = patch.max_column_width.filter(|w| *w > 0.0);
        }
        set(&mut merged.heatmap_part_width, &patch.heatmap_part_width);
        merged.heatmap_part_width = merged.heatmap_part_width.min(MAX_HEATMAP_PART_WIDTH);
        set(&mut merged.column_metadata_row_height, &patch.column_metadata_row_height);
        set(&mut merged.columns_order, &patch.columns_order);
        set(&mut merged.highlighted_rows, &patch.highlighted_rows);

        Ok(merged)
    }
}
