//! Pixel budget for the heatmap frame.

use log::debug;

use crate::settings::Settings;

pub const HEADER_HEIGHT: f64 = 150.0;
pub const FOOTER_HEIGHT: f64 = 70.0;
/// Footer when column dendrogram and header both show; column labels move below.
pub const TALL_FOOTER_HEIGHT: f64 = 150.0;
pub const RIGHT_MARGIN: f64 = 100.0;
pub const DENDROGRAM_HEATMAP_GAP: f64 = 5.0;

/// Vertical frame around the heatmap rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    pub header_height: f64,
    pub footer_height: f64,
    pub column_metadata_height: f64,
    /// Where the first row slot starts.
    pub top_heatmap_offset: f64,
}

impl Frame {
    pub fn new(settings: &Settings, column_metadata_rows: usize, tall_footer: bool) -> Self {
        let column_metadata_height = column_metadata_rows as f64 * settings.column_metadata_row_height;
        Frame {
            header_height: HEADER_HEIGHT,
            footer_height: if tall_footer { TALL_FOOTER_HEIGHT } else { FOOTER_HEIGHT },
            column_metadata_height,
            top_heatmap_offset: HEADER_HEIGHT
                + column_metadata_height
                + settings.column_metadata_row_height / 2.0,
        }
    }

    /// Total image height for `leaves` rows.
    pub fn height(&self, leaves: usize, pixels_per_leaf: f64) -> f64 {
        leaves as f64 * pixels_per_leaf
            + self.header_height
            + self.footer_height
            + self.column_metadata_height
    }
}

/// Row height: the available height shared by `leaves`, clamped to the row height bounds.
pub fn pixels_per_leaf(settings: &Settings, frame: &Frame, leaves: usize) -> f64 {
    let available = settings.max_height
        - frame.header_height
        - frame.footer_height
        - frame.column_metadata_height
        - 5.0;
    let mut size = if leaves > 0 { available / leaves as f64 } else { settings.max_row_height };
    if size > settings.max_row_height {
        size = settings.max_row_height;
    }
    if settings.min_row_height > size {
        size = settings.min_row_height;
    }
    debug!("{} leaves get {:.2} px each", leaves, size);
    size
}

/// Horizontal split between the row dendrogram and the heatmap.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HorizontalSizes {
    pub heatmap_width: f64,
    /// Distance-axis span of the row dendrogram (or the left margin without one).
    pub distance: f64,
    /// Left edge of the heatmap.
    pub heatmap_x: f64,
    pub pixels_per_column: f64,
    pub right_margin: f64,
}

pub fn horizontal_sizes(settings: &Settings, visible_columns: usize) -> HorizontalSizes {
    let part = if visible_columns > 0 { settings.heatmap_part_width } else { 0.0 };
    let mut right_margin = RIGHT_MARGIN;
    let (mut heatmap_width, mut distance, mut heatmap_x) = if settings.dendrogram {
        let width = (settings.width - right_margin - DENDROGRAM_HEATMAP_GAP) * part;
        let distance = settings.width - width - right_margin;
        (width, distance, distance + DENDROGRAM_HEATMAP_GAP)
    } else {
        (settings.width - right_margin, right_margin / 2.0, right_margin / 2.0)
    };

    let mut pixels_per_column =
        if visible_columns > 0 { heatmap_width / visible_columns as f64 } else { 0.0 };

    if let Some(max) = settings.max_column_width {
        if max < pixels_per_column {
            pixels_per_column = max;
            heatmap_width = visible_columns as f64 * pixels_per_column;
            if settings.dendrogram {
                distance = settings.width - heatmap_width - right_margin - DENDROGRAM_HEATMAP_GAP;
                heatmap_x = distance + DENDROGRAM_HEATMAP_GAP;
            } else {
                distance = ((settings.width - heatmap_width) / 2.0).round();
                right_margin = distance;
                heatmap_x = distance;
            }
        }
    }

    HorizontalSizes { heatmap_width, distance, heatmap_x, pixels_per_column, right_margin }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_height_is_clamped() {
        let settings = Settings::default();
        let frame = Frame::new(&settings, 0, false);
        // 800 - 150 - 70 - 0 - 5 = 575
        assert_eq!(pixels_per_leaf(&settings, &frame, 115), 5.0);
        assert_eq!(pixels_per_leaf(&settings, &frame, 3), 25.0);

        let floor = Settings { min_row_height: 8.0, ..Settings::default() };
        assert_eq!(pixels_per_leaf(&floor, &frame, 1000), 8.0);
    }

    #[test]
    fn frame_offsets() {
        let settings = Settings::default();
        let frame = Frame::new(&settings, 2, true);
        assert_eq!(frame.column_metadata_height, 16.0);
        assert_eq!(frame.top_heatmap_offset, 150.0 + 16.0 + 4.0);
        assert_eq!(frame.footer_height, TALL_FOOTER_HEIGHT);
        assert_eq!(frame.height(10, 5.0), 50.0 + 150.0 + 150.0 + 16.0);
    }

    #[test]
    fn dendrogram_takes_the_rest_of_the_width() {
        let settings = Settings { max_column_width: None, ..Settings::default() };
        let sizes = horizontal_sizes(&settings, 5);
        assert_eq!(sizes.heatmap_width, (1000.0 - 100.0 - 5.0) * 0.7);
        assert_eq!(sizes.distance, 1000.0 - sizes.heatmap_width - 100.0);
        assert_eq!(sizes.heatmap_x, sizes.distance + 5.0);
        assert_eq!(sizes.pixels_per_column, sizes.heatmap_width / 5.0);
    }

    #[test]
    fn column_width_cap_widens_the_dendrogram() {
        let settings = Settings::default();
        let sizes = horizontal_sizes(&settings, 2);
        assert_eq!(sizes.pixels_per_column, 150.0);
        assert_eq!(sizes.heatmap_width, 300.0);
        assert_eq!(sizes.distance, 1000.0 - 300.0 - 100.0 - 5.0);
    }

    #[test]
    fn centred_without_dendrogram() {
        let settings = Settings { dendrogram: false, ..Settings::default() };
        let sizes = horizontal_sizes(&settings, 2);
        assert_eq!(sizes.heatmap_width, 300.0);
        assert_eq!(sizes.heatmap_x, 350.0);
        assert_eq!(sizes.right_margin, 350.0);
    }

    #[test]
    fn no_columns() {
        let sizes = horizontal_sizes(&Settings::default(), 0);
        assert_eq!(sizes.heatmap_width, 0.0);
        assert_eq!(sizes.pixels_per_column, 0.0);
        assert_eq!(sizes.distance, 900.0);
    }
}
