//! Reference renderer: draws a [`ClusterHeatmap`] to PNG or SVG.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use log::info;

use crate::color::Rgb;
use crate::error::Result;
use crate::events::HeatmapEvents;
use crate::layout::DendrogramLayout;
use crate::tree::{Axis, NodeIdx};
use crate::view::{ClusterHeatmap, ColumnRef};

pub const BACKGROUND: Rgb = Rgb::new(255, 255, 255);
pub const LINK_COLOR: Rgb = Rgb::new(0, 0, 0);
pub const MARKED_LINK_COLOR: Rgb = Rgb::new(255, 0, 0);
const LABEL_GAP: f64 = 4.0;
const FONT_SIZE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Png,
    Svg,
}

impl OutputFormat {
    /// SVG for `.svg` files, PNG for everything else.
    pub fn from_path(path: &Path) -> Self {
        let is_svg = path
            .extension()
            .map(|ext| ext.to_ascii_lowercase() == "svg")
            .unwrap_or(false);
        if is_svg {
            OutputFormat::Svg
        } else {
            OutputFormat::Png
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDirection {
    Horizontal,
    /// Rotated to read top to bottom.
    Vertical,
}

/// Drawing surface. Coordinates are pixels from the top-left corner.
pub trait Canvas {
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb);

    /// Axis-aligned line one pixel wide.
    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Rgb);

    /// Surfaces without fonts ignore text.
    fn text(&mut self, _x: f64, _y: f64, _text: &str, _direction: TextDirection) {}
}

/// Raster canvas backed by an [`RgbImage`].
pub struct PixelCanvas {
    image: RgbImage,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let background = image::Rgb([BACKGROUND.r, BACKGROUND.g, BACKGROUND.b]);
        PixelCanvas { image: RgbImage::from_pixel(width, height, background) }
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Pixel range covered by `[start, start + length)`, at least one pixel wide.
    fn span(start: f64, length: f64, limit: u32) -> Option<(u32, u32)> {
        let limit = limit as f64;
        let from = start.round().max(0.0);
        let to = (start + length).round().max(from + 1.0).min(limit);
        if from >= limit || to <= from {
            return None;
        }
        Some((from as u32, to as u32))
    }
}

impl Canvas for PixelCanvas {
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
        let (Some((x0, x1)), Some((y0, y1))) = (
            Self::span(x, width, self.image.width()),
            Self::span(y, height, self.image.height()),
        ) else {
            return;
        };
        let pixel = image::Rgb([color.r, color.g, color.b]);
        for py in y0..y1 {
            for px in x0..x1 {
                self.image.put_pixel(px, py, pixel);
            }
        }
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Rgb) {
        let (x, y) = (from.0.min(to.0), from.1.min(to.1));
        let (width, height) = ((from.0 - to.0).abs(), (from.1 - to.1).abs());
        self.fill_rect(x, y, width.max(1.0), height.max(1.0), color);
    }
}

/// Vector canvas that accumulates SVG elements.
pub struct SvgCanvas {
    width: f64,
    height: f64,
    body: String,
}

impl SvgCanvas {
    pub fn new(width: f64, height: f64) -> Self {
        SvgCanvas { width, height, body: String::new() }
    }

    pub fn finish(self) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
  .label {{ font-family: 'DejaVu Sans', Arial, sans-serif; font-size: {}px; }}
</style>
<rect width="100%" height="100%" fill="{}"/>
"#,
            self.width, self.height, self.width, self.height, FONT_SIZE, BACKGROUND
        ));
        svg.push_str(&self.body);
        svg.push_str("</svg>\n");
        svg
    }
}

impl Canvas for SvgCanvas {
    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgb) {
        let _ = writeln!(
            self.body,
            r#"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}"/>"#,
            x, y, width, height, color
        );
    }

    fn line(&mut self, from: (f64, f64), to: (f64, f64), color: Rgb) {
        let _ = writeln!(
            self.body,
            r#"<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" stroke="{}" stroke-width="1"/>"#,
            from.0, from.1, to.0, to.1, color
        );
    }

    fn text(&mut self, x: f64, y: f64, text: &str, direction: TextDirection) {
        let transform = match direction {
            TextDirection::Horizontal => String::new(),
            TextDirection::Vertical => format!(r#" transform="rotate(90 {:.2} {:.2})""#, x, y),
        };
        let _ = writeln!(
            self.body,
            r#"<text class="label" x="{:.2}" y="{:.2}" dominant-baseline="middle"{}>{}</text>"#,
            x,
            y,
            transform,
            escape_xml(text)
        );
    }
}

/// Label text made safe for SVG text nodes and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn draw_links<C: Canvas>(
    canvas: &mut C,
    layout: &DendrogramLayout,
    is_marked: impl Fn(NodeIdx) -> bool,
    point: fn(f64, f64) -> (f64, f64),
) {
    for link in layout.links() {
        let color = if is_marked(link.node) { MARKED_LINK_COLOR } else { LINK_COLOR };
        let left = point(link.distance, link.left_anchor);
        let right = point(link.distance, link.right_anchor);
        canvas.line(left, right, color);
        canvas.line(left, point(link.left_end, link.left_anchor), color);
        canvas.line(right, point(link.right_end, link.right_anchor), color);
    }
}

/// Draws the current view of `heatmap` onto `canvas`.
pub fn draw<E: HeatmapEvents, C: Canvas>(heatmap: &ClusterHeatmap<E>, canvas: &mut C) -> Result<()> {
    let sizes = heatmap.sizes();
    let frame = heatmap.frame();
    let ppl = heatmap.pixels_per_leaf();
    let columns = heatmap.visible_columns();
    let rows = heatmap.rows();
    let column_x = |position: usize| sizes.heatmap_x + position as f64 * sizes.pixels_per_column;
    let label_x = column_x(columns.len()) + LABEL_GAP;

    for slot in rows {
        let top = slot.y - ppl / 2.0;
        for (position, &column) in columns.iter().enumerate() {
            if let Some(color) = heatmap.cell_color(slot.leaf, column)? {
                canvas.fill_rect(column_x(position), top, sizes.pixels_per_column, ppl, color);
            }
        }
        let name = heatmap.row_tree().node(slot.leaf).display_name();
        canvas.text(label_x, slot.y, &name, TextDirection::Horizontal);
    }

    let row_height = heatmap.settings().column_metadata_row_height;
    for row in 0..heatmap.column_metadata_rows() {
        let y = frame.header_height + row as f64 * row_height;
        for (position, &column) in columns.iter().enumerate() {
            let ColumnRef::Data(index) = column else { continue };
            if let Some(color) = heatmap.column_metadata_color(row, index)? {
                canvas.fill_rect(column_x(position), y, sizes.pixels_per_column, row_height, color);
            }
        }
        if let Some(name) = heatmap.column_metadata_name(row) {
            canvas.text(label_x, y + row_height / 2.0, name, TextDirection::Horizontal);
        }
    }

    if let Some(layout) = heatmap.row_layout() {
        draw_links(canvas, layout, |node| heatmap.is_link_marked(Axis::Row, node), |d, l| (d, l));
    }
    if let Some(layout) = heatmap.column_layout() {
        draw_links(canvas, layout, |node| heatmap.is_link_marked(Axis::Column, node), |d, l| (l, d));
    }

    let footer_y = frame.top_heatmap_offset + rows.len() as f64 * ppl + LABEL_GAP;
    for (position, &column) in columns.iter().enumerate() {
        let header = heatmap.column_header(column);
        if !header.is_empty() {
            let x = column_x(position) + sizes.pixels_per_column / 2.0;
            canvas.text(x, footer_y, &header, TextDirection::Vertical);
        }
    }

    if let Some(layout) = heatmap.row_layout() {
        let y = footer_y + LABEL_GAP;
        canvas.line((0.0, y), (sizes.distance, y), LINK_COLOR);
        let scale = format!("{:.3}", layout.distance_represented());
        canvas.text(0.0, y + FONT_SIZE, &scale, TextDirection::Horizontal);
    }
    Ok(())
}

fn image_size<E: HeatmapEvents>(heatmap: &ClusterHeatmap<E>) -> (u32, u32) {
    let width = heatmap.settings().width.ceil().max(1.0) as u32;
    let height = heatmap.image_height().ceil().max(1.0) as u32;
    (width, height)
}

pub fn render_png<E: HeatmapEvents>(heatmap: &ClusterHeatmap<E>) -> Result<RgbImage> {
    let (width, height) = image_size(heatmap);
    let mut canvas = PixelCanvas::new(width, height);
    draw(heatmap, &mut canvas)?;
    Ok(canvas.into_image())
}

pub fn render_svg<E: HeatmapEvents>(heatmap: &ClusterHeatmap<E>) -> Result<String> {
    let (width, height) = image_size(heatmap);
    let mut canvas = SvgCanvas::new(width as f64, height as f64);
    draw(heatmap, &mut canvas)?;
    Ok(canvas.finish())
}

/// Renders to `path`, picking the format from its extension.
pub fn save<E: HeatmapEvents>(heatmap: &ClusterHeatmap<E>, path: &Path) -> Result<()> {
    match OutputFormat::from_path(path) {
        OutputFormat::Svg => {
            info!("Rendering SVG...");
            let svg = render_svg(heatmap)?;
            info!("Saving to {:?}...", path);
            fs::write(path, svg)?;
        }
        OutputFormat::Png => {
            info!("Rendering image...");
            let image = render_png(heatmap)?;
            info!("Saving to {:?}...", path);
            image.save(path)?;
        }
    }
    Ok(())
}

/// Writes the visible rows next to `output_path`: foo.png -> foo.rows.tsv
pub fn write_rows_tsv<E: HeatmapEvents>(heatmap: &ClusterHeatmap<E>, output_path: &Path) -> Result<PathBuf> {
    let tsv_path = output_path.with_extension("rows.tsv");
    let mut content = String::from("leaf\tobjects\ty\n");
    for slot in heatmap.rows() {
        let node = heatmap.row_tree().node(slot.leaf);
        let _ = writeln!(content, "{}\t{}\t{:.2}", node.id, node.objects.join(","), slot.y);
    }
    fs::write(&tsv_path, content)?;
    info!("Row order saved to {:?}", tsv_path);
    Ok(tsv_path)
}
