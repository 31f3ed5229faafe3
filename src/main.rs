use clap::Parser;
use log::{info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use heatlook::color::ColorScales;
use heatlook::render;
use heatlook::settings::{ColorSettingsPatch, PercentilesPatch, Settings, SettingsPatch};
use heatlook::{Axis, ClusterHeatmap, InputDocument, LoggingEvents, Result};

#[derive(Parser)]
#[command(name = "heatlook")]
#[command(about = "Draw a hierarchical-clustering heatmap.", long_about = None)]
struct Args {
    // MANDATORY OPTIONS
    /// Load the clustered matrix in cluster heatmap JSON format from this FILE.
    #[arg(short = 'i', long = "input", value_name = "FILE")]
    input: PathBuf,

    /// Write the visualization to this FILE (PNG or SVG based on extension).
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    out: PathBuf,

    // Configuration
    /// Read settings from this JSON FILE; command line options win over it.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    // Sizing Options
    /// Set the width in pixels of the output image.
    #[arg(short = 'x', long = "width", value_name = "N")]
    width: Option<f64>,

    /// Set the maximum height in pixels of the output image.
    #[arg(short = 'y', long = "max-height", value_name = "N")]
    max_height: Option<f64>,

    /// Smallest row height in pixels.
    #[arg(long = "min-row-height", value_name = "N")]
    min_row_height: Option<f64>,

    /// Largest row height in pixels.
    #[arg(short = 'a', long = "max-row-height", value_name = "N")]
    max_row_height: Option<f64>,

    /// Widest column in pixels (0 removes the cap).
    #[arg(long = "max-column-width", value_name = "N")]
    max_column_width: Option<f64>,

    // Color Options
    /// Color scale for the data cells.
    #[arg(long = "heatmap-colors", value_name = "NAME")]
    heatmap_colors: Option<String>,

    /// Color scale for metadata columns.
    #[arg(long = "metadata-colors", value_name = "NAME")]
    metadata_colors: Option<String>,

    /// Color scale for column metadata rows.
    #[arg(long = "column-metadata-colors", value_name = "NAME")]
    column_metadata_colors: Option<String>,

    /// Color scale for the object count column.
    #[arg(long = "count-colors", value_name = "NAME")]
    count_colors: Option<String>,

    /// Color scale for highlighted rows.
    #[arg(long = "highlight-colors", value_name = "NAME")]
    highlight_colors: Option<String>,

    /// Read extra color scales from FILE (name, start, end and optional middle, tab separated).
    #[arg(short = 'F', long = "color-scales", value_name = "FILE")]
    color_scales: Option<PathBuf>,

    /// Percentile mapped to the start color.
    #[arg(long = "min-percentile", value_name = "P")]
    min_percentile: Option<f64>,

    /// Percentile mapped to the end color.
    #[arg(long = "max-percentile", value_name = "P")]
    max_percentile: Option<f64>,

    /// Percentile mapped to the middle color of three-stop scales.
    #[arg(long = "middle-percentile", value_name = "P")]
    middle_percentile: Option<f64>,

    /// Use one value range for all data columns.
    #[arg(short = 'g', long = "global-scaling")]
    global_scaling: bool,

    // Layout Options
    /// Space dendrogram levels evenly instead of by merge distance.
    #[arg(short = 'u', long = "unified-distance")]
    unified_distance: bool,

    /// Draw rows as a flat table instead of a dendrogram.
    #[arg(short = 'n', long = "no-dendrogram")]
    no_dendrogram: bool,

    /// Sort the flat table by this column (data columns first, then metadata).
    #[arg(short = 's', long = "sort-column", value_name = "N", requires = "no_dendrogram")]
    sort_column: Option<usize>,

    /// Show the object count column.
    #[arg(short = 'C', long = "count-column")]
    count_column: bool,

    /// Show alternative data values in place of data values.
    #[arg(short = 'A', long = "alternative-data")]
    alternative_data: bool,

    // Navigation Options
    /// Zoom the rows into the subtree of this node id.
    #[arg(short = 'z', long = "zoom", value_name = "ID")]
    zoom: Option<String>,

    /// Zoom the columns into the subtree of this column node id.
    #[arg(short = 'Z', long = "zoom-columns", value_name = "ID")]
    zoom_columns: Option<String>,

    /// Highlight the row cluster below this node id.
    #[arg(short = 'J', long = "highlight", value_name = "ID")]
    highlight: Option<String>,

    /// Highlight the column cluster below this column node id.
    #[arg(long = "highlight-columns", value_name = "ID")]
    highlight_columns: Option<String>,

    /// Paint rows holding the object ids listed in FILE with the highlight colors.
    #[arg(short = 'H', long = "highlight-rows", value_name = "FILE")]
    highlight_rows: Option<PathBuf>,

    // Threading
    /// Number of threads to use for parallel operations.
    #[arg(short = 't', long = "threads", value_name = "N")]
    threads: Option<usize>,

    // Logging
    /// Verbosity level (0 = error, 1 = info, 2 = debug).
    #[arg(short = 'v', long = "verbose", value_name = "N", default_value_t = 1)]
    verbose: u8,
}

/// Settings given on the command line.
fn patch_from_args(args: &Args) -> SettingsPatch {
    SettingsPatch {
        colors: Some(ColorSettingsPatch {
            heatmap: args.heatmap_colors.clone(),
            metadata: args.metadata_colors.clone(),
            column_metadata: args.column_metadata_colors.clone(),
            count_column: args.count_colors.clone(),
            highlight: args.highlight_colors.clone(),
        }),
        percentiles: Some(PercentilesPatch {
            min: args.min_percentile,
            max: args.max_percentile,
            middle: args.middle_percentile,
        }),
        dendrogram: args.no_dendrogram.then_some(false),
        count_column: args.count_column.then_some(true),
        independent_columns: args.global_scaling.then_some(false),
        unified_distance: args.unified_distance.then_some(true),
        alternative_data: args.alternative_data.then_some(true),
        width: args.width,
        max_height: args.max_height,
        min_row_height: args.min_row_height,
        max_row_height: args.max_row_height,
        max_column_width: args.max_column_width,
        ..SettingsPatch::default()
    }
}

/// Object ids listed one per line; blank lines are skipped.
fn load_object_ids(path: &Path) -> std::io::Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    let mut ids = Vec::new();
    for line in reader.lines() {
        let id = line?.trim().to_string();
        if !id.is_empty() {
            ids.push(id);
        }
    }
    info!("Read {} object ids from {}", ids.len(), path.display());
    Ok(ids)
}

fn run(args: &Args) -> Result<()> {
    let file_patch = match &args.config {
        Some(path) => SettingsPatch::from_path(path)?,
        None => SettingsPatch::default(),
    };
    let settings = Settings::default().merge(&file_patch.overlay(patch_from_args(args)))?;

    let mut scales = ColorScales::default();
    if let Some(path) = &args.color_scales {
        scales.load_path(path)?;
    }

    let doc = InputDocument::from_path(&args.input)?;
    let mut heatmap = ClusterHeatmap::with_scales(doc, settings, scales, LoggingEvents)?;

    // The flat table starts out sorted by the first column; sorting it again would reverse it.
    if let Some(column) = args.sort_column.filter(|&c| Some(c) != heatmap.rows_ordered_by()) {
        heatmap.reorder_rows(column)?;
    }
    if let Some(id) = &args.zoom {
        heatmap.zoom_into(Axis::Row, id)?;
    }
    if let Some(id) = &args.zoom_columns {
        heatmap.zoom_into(Axis::Column, id)?;
    }
    if let Some(id) = &args.highlight {
        heatmap.highlight(Axis::Row, id)?;
    }
    if let Some(id) = &args.highlight_columns {
        heatmap.highlight(Axis::Column, id)?;
    }
    if let Some(path) = &args.highlight_rows {
        let ids = load_object_ids(path)?;
        let requested = ids.len();
        let painted = heatmap.highlight_rows(ids);
        info!("Highlighting {} rows for {} object ids", painted, requested);
    }

    if heatmap.rows().is_empty() {
        warn!("No rows to draw.");
    }

    render::save(&heatmap, &args.out)?;
    render::write_rows_tsv(&heatmap, &args.out)?;
    Ok(())
}

fn main() {
    let args = Args::parse();

    // Initialize logger based on verbosity
    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if let Some(threads) = args.threads {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global() {
            eprintln!("Warning: could not configure {} threads: {}", threads, e);
        }
    }

    info!("Starting visualization...");

    if let Err(e) = run(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    info!("Done.");
}
