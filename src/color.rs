//! Percentile descriptors and value-to-color mapping.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info, warn};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{HeatmapError, Result};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Rgb { r, g, b }
    }

    /// Parses `#rrggbb` or `r,g,b`.
    pub fn parse(text: &str) -> Option<Rgb> {
        let text = text.trim();
        if let Some(hex) = text.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return None;
            }
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            return Some(Rgb::new(r, g, b));
        }
        let parts: Vec<u8> = text
            .split(',')
            .map(|s| s.trim().parse().ok())
            .collect::<Option<Vec<u8>>>()?;
        match parts.as_slice() {
            [r, g, b] => Some(Rgb::new(*r, *g, *b)),
            _ => None,
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({},{},{})", self.r, self.g, self.b)
    }
}

/// Two- or three-stop linear color scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScale {
    pub start: Rgb,
    pub end: Rgb,
    #[serde(default)]
    pub middle: Option<Rgb>,
}

impl ColorScale {
    pub const fn two(start: Rgb, end: Rgb) -> Self {
        ColorScale { start, end, middle: None }
    }

    pub const fn three(start: Rgb, middle: Rgb, end: Rgb) -> Self {
        ColorScale { start, end, middle: Some(middle) }
    }
}

const BUILTIN_SCALES: [(&str, ColorScale); 31] = [
    ("YlGn", ColorScale::two(Rgb::new(255, 255, 204), Rgb::new(35, 132, 67))),
    ("GnBu", ColorScale::two(Rgb::new(240, 249, 232), Rgb::new(43, 140, 190))),
    ("BuGn", ColorScale::two(Rgb::new(237, 248, 251), Rgb::new(35, 139, 69))),
    ("PuBu", ColorScale::two(Rgb::new(241, 238, 246), Rgb::new(5, 112, 176))),
    ("BuPu", ColorScale::two(Rgb::new(237, 248, 251), Rgb::new(136, 65, 157))),
    ("RdPu", ColorScale::two(Rgb::new(254, 235, 226), Rgb::new(174, 1, 126))),
    ("PuRd", ColorScale::two(Rgb::new(241, 238, 246), Rgb::new(206, 18, 86))),
    ("OrRd", ColorScale::two(Rgb::new(254, 240, 217), Rgb::new(215, 48, 31))),
    ("Purples2", ColorScale::two(Rgb::new(242, 240, 247), Rgb::new(106, 81, 163))),
    ("Blues", ColorScale::two(Rgb::new(239, 243, 255), Rgb::new(33, 113, 181))),
    ("Greens", ColorScale::two(Rgb::new(237, 248, 233), Rgb::new(35, 139, 69))),
    ("Oranges", ColorScale::two(Rgb::new(254, 237, 222), Rgb::new(217, 71, 1))),
    ("Reds", ColorScale::two(Rgb::new(254, 229, 217), Rgb::new(203, 24, 29))),
    ("Greys", ColorScale::two(Rgb::new(247, 247, 247), Rgb::new(82, 82, 82))),
    ("PuOr", ColorScale::two(Rgb::new(230, 97, 1), Rgb::new(94, 60, 153))),
    ("BrBG", ColorScale::two(Rgb::new(166, 97, 26), Rgb::new(1, 133, 113))),
    ("RdBu", ColorScale::two(Rgb::new(202, 0, 32), Rgb::new(5, 113, 176))),
    ("RdGy", ColorScale::two(Rgb::new(202, 0, 32), Rgb::new(64, 64, 64))),
    ("BuYl", ColorScale::two(Rgb::new(5, 113, 176), Rgb::new(250, 233, 42))),
    ("YlOrR", ColorScale::three(Rgb::new(255, 255, 178), Rgb::new(204, 76, 2), Rgb::new(227, 26, 28))),
    ("YlOrB", ColorScale::three(Rgb::new(255, 255, 212), Rgb::new(204, 76, 2), Rgb::new(5, 112, 176))),
    ("PRGn2", ColorScale::three(Rgb::new(123, 50, 148), Rgb::new(202, 0, 32), Rgb::new(0, 136, 55))),
    ("PiYG2", ColorScale::three(Rgb::new(208, 28, 139), Rgb::new(255, 255, 178), Rgb::new(77, 172, 38))),
    ("YlGnBu", ColorScale::three(Rgb::new(255, 255, 204), Rgb::new(35, 132, 67), Rgb::new(34, 94, 168))),
    ("RdYlBu", ColorScale::three(Rgb::new(215, 25, 28), Rgb::new(255, 255, 178), Rgb::new(44, 123, 182))),
    ("RdYlGn", ColorScale::three(Rgb::new(215, 25, 28), Rgb::new(255, 255, 178), Rgb::new(26, 150, 65))),
    ("BuWhRd", ColorScale::three(Rgb::new(33, 113, 181), Rgb::new(255, 255, 255), Rgb::new(215, 25, 28))),
    ("RdLrBu", ColorScale::three(Rgb::new(215, 25, 28), Rgb::new(254, 229, 217), Rgb::new(44, 123, 182))),
    ("RdBkGr", ColorScale::three(Rgb::new(215, 25, 28), Rgb::new(0, 0, 0), Rgb::new(35, 139, 69))),
    ("RdLrGr", ColorScale::three(Rgb::new(215, 25, 28), Rgb::new(254, 229, 217), Rgb::new(35, 139, 69))),
    ("GrBkRd", ColorScale::three(Rgb::new(35, 139, 69), Rgb::new(0, 0, 0), Rgb::new(215, 25, 28))),
];

/// Named color scales; starts with the built-in palette and accepts more at runtime.
#[derive(Debug, Clone)]
pub struct ColorScales {
    scales: FxHashMap<String, ColorScale>,
}

impl Default for ColorScales {
    fn default() -> Self {
        let scales = BUILTIN_SCALES
            .iter()
            .map(|(name, scale)| (name.to_string(), *scale))
            .collect();
        ColorScales { scales }
    }
}

impl ColorScales {
    /// Adds or replaces a scale.
    pub fn register(&mut self, name: impl Into<String>, scale: ColorScale) {
        let name = name.into();
        debug!("Registered color scale {}", name);
        self.scales.insert(name, scale);
    }

    pub fn get(&self, name: &str) -> Result<&ColorScale> {
        self.scales
            .get(name)
            .ok_or_else(|| HeatmapError::UnknownColorScale(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scales.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.scales.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registers scales listed as `name<TAB>start<TAB>end[<TAB>middle]`, colors
    /// written `#rrggbb` or `r,g,b`. Blank lines and `#` comments are skipped,
    /// malformed lines are logged and skipped. Returns how many were registered.
    pub fn read_tsv<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut registered = 0;
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parts: Vec<&str> = line.split('\t').collect();
            let colors: Option<Vec<Rgb>> = parts.iter().skip(1).map(|s| Rgb::parse(s)).collect();
            let scale = match colors.as_deref() {
                Some(&[start, end]) => ColorScale::two(start, end),
                Some(&[start, end, middle]) => ColorScale::three(start, middle, end),
                _ => {
                    warn!("Skipping malformed color scale on line {}: {}", number + 1, line);
                    continue;
                }
            };
            self.register(parts[0], scale);
            registered += 1;
        }
        Ok(registered)
    }

    pub fn load_path(&mut self, path: &Path) -> Result<usize> {
        let file = File::open(path)?;
        let registered = self.read_tsv(BufReader::new(file))?;
        info!("Loaded {} color scales from {:?}", registered, path);
        Ok(registered)
    }
}

/// Percentile cut points used when describing a value distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub min: f64,
    pub max: f64,
    pub middle: f64,
}

impl Default for Percentiles {
    fn default() -> Self {
        Percentiles { min: 0.0, max: 100.0, middle: 50.0 }
    }
}

impl Percentiles {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("min", self.min), ("max", self.max), ("middle", self.middle)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(HeatmapError::InvalidPercentile { name, value });
            }
        }
        Ok(())
    }
}

/// Categorical values numbered in order of first appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryMap {
    index: FxHashMap<String, usize>,
    order: Vec<String>,
}

impl CategoryMap {
    fn from_values<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut map = CategoryMap::default();
        for value in values {
            let label = value.label();
            if !map.index.contains_key(label.as_ref()) {
                map.index.insert(label.to_string(), map.order.len());
                map.order.push(label.into_owned());
            }
        }
        map
    }

    pub fn get(&self, label: &str) -> Option<usize> {
        self.index.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn categories(&self) -> &[String] {
        &self.order
    }
}

/// Value domain of one column (or row) of the heatmap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnDescriptor {
    pub min: f64,
    pub max: f64,
    pub middle: f64,
    pub str2num: Option<CategoryMap>,
}

impl ColumnDescriptor {
    pub fn numeric(min: f64, max: f64, middle: f64) -> Self {
        ColumnDescriptor { min, max, middle, str2num: None }
    }

    /// The number a cell is colored by, `None` for nulls and unknown categories.
    pub fn position_of(&self, value: &Value) -> Option<f64> {
        if value.is_null() {
            return None;
        }
        match &self.str2num {
            Some(categories) => categories.get(&value.label()).map(|i| i as f64),
            None => value.as_number(),
        }
    }

    pub fn color(&self, value: &Value, scale: &ColorScale) -> Option<Rgb> {
        self.position_of(value).map(|v| color_for(v, self, scale))
    }
}

/// Which way the matrix is sliced into value distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescribeAlong {
    /// One descriptor per column (heatmap data and metadata).
    Columns,
    /// One descriptor per row (column metadata rows).
    Rows,
}

/// Rounds halves up, so 2.5 becomes 3 and 1.5 becomes 2.
pub fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

/// Index of a percentile in a sorted sample of `n` values: `round(n * p / 100)`,
/// clamped to the sample.
pub fn percentile_index(n: usize, percentile: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let index = round_half_up(n as f64 * percentile / 100.0).max(0.0) as usize;
    index.min(n - 1)
}

fn describe_sorted(sorted: &[f64], percentiles: &Percentiles) -> ColumnDescriptor {
    let n = sorted.len();
    if n == 0 {
        return ColumnDescriptor::numeric(0.0, 0.0, 0.0);
    }
    let min = if percentiles.min > 0.0 {
        sorted[percentile_index(n, percentiles.min)]
    } else {
        sorted[0]
    };
    let max = if percentiles.max < 100.0 {
        sorted[percentile_index(n, percentiles.max)]
    } else {
        sorted[n - 1]
    };
    let middle = if percentiles.middle != 50.0 {
        sorted[percentile_index(n, percentiles.middle)]
    } else {
        sorted[(round_half_up((n - 1) as f64 / 2.0) as usize).min(n - 1)]
    };
    ColumnDescriptor::numeric(min, max, middle)
}

/// Describes one column's values (nulls already removed).
///
/// The first value decides the kind: numeric columns get percentile cut points,
/// anything else is numbered by first occurrence over `[0, distinct - 1]`.
pub fn describe(values: &[&Value], percentiles: &Percentiles) -> ColumnDescriptor {
    match values.first() {
        Some(first) if !first.is_numeric() => {
            let categories = CategoryMap::from_values(values.iter().copied());
            let max = categories.len().saturating_sub(1) as f64;
            ColumnDescriptor { min: 0.0, max, middle: max / 2.0, str2num: Some(categories) }
        }
        _ => {
            let mut numbers: Vec<f64> = values.iter().filter_map(|v| v.as_number()).collect();
            numbers.sort_by(f64::total_cmp);
            describe_sorted(&numbers, percentiles)
        }
    }
}

/// One descriptor per column (or per row) of `matrix`.
///
/// Rows shorter than the widest row contribute nothing to the missing columns.
pub fn compute_descriptors(
    matrix: &[&[Value]],
    along: DescribeAlong,
    percentiles: &Percentiles,
) -> Vec<ColumnDescriptor> {
    let descriptors: Vec<ColumnDescriptor> = match along {
        DescribeAlong::Columns => {
            let width = matrix.iter().map(|row| row.len()).max().unwrap_or(0);
            (0..width)
                .into_par_iter()
                .map(|col| {
                    let values: Vec<&Value> = matrix
                        .iter()
                        .filter_map(|row| row.get(col))
                        .filter(|v| !v.is_null())
                        .collect();
                    describe(&values, percentiles)
                })
                .collect()
        }
        DescribeAlong::Rows => matrix
            .par_iter()
            .map(|row| {
                let values: Vec<&Value> = row.iter().filter(|v| !v.is_null()).collect();
                describe(&values, percentiles)
            })
            .collect(),
    };
    debug!("Computed {} value descriptors", descriptors.len());
    descriptors
}

/// A single descriptor over every numeric value in `matrix`.
pub fn global_descriptor(matrix: &[&[Value]], percentiles: &Percentiles) -> ColumnDescriptor {
    let mut numbers: Vec<f64> = matrix
        .iter()
        .flat_map(|row| row.iter())
        .filter_map(Value::as_number)
        .collect();
    numbers.sort_by(f64::total_cmp);
    describe_sorted(&numbers, percentiles)
}

fn lerp_channel(from: u8, to: u8, position: f64) -> u8 {
    let value = from as f64 + position * (to as f64 - from as f64);
    round_half_up(value).clamp(0.0, 255.0) as u8
}

fn lerp(from: Rgb, to: Rgb, position: f64) -> Rgb {
    Rgb::new(
        lerp_channel(from.r, to.r, position),
        lerp_channel(from.g, to.g, position),
        lerp_channel(from.b, to.b, position),
    )
}

/// Maps `value` onto `scale` within the descriptor's domain.
///
/// Values above `max` take the end color, values below `min` (or any value
/// in a degenerate domain) the start color. Three-stop scales interpolate
/// within `[min, middle]` or `[middle, max]`.
pub fn color_for(value: f64, descriptor: &ColumnDescriptor, scale: &ColorScale) -> Rgb {
    let (min, max) = (descriptor.min, descriptor.max);
    if value > max {
        return scale.end;
    }
    if value < min || min == max {
        return scale.start;
    }

    let (low, high, from, to) = match scale.middle {
        Some(mid_color) => {
            let middle = descriptor.middle.max(min).min(max);
            if value >= middle {
                if middle == max {
                    return scale.end;
                }
                if value == min {
                    return scale.start;
                }
                (middle, max, mid_color, scale.end)
            } else {
                (min, middle, scale.start, mid_color)
            }
        }
        None => (min, max, scale.start, scale.end),
    };

    lerp(from, to, (value - low) / (high - low))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(values: &[f64]) -> Vec<Value> {
        values.iter().map(|&v| Value::Number(v)).collect()
    }

    fn refs(values: &[Value]) -> Vec<&Value> {
        values.iter().collect()
    }

    const RED_BLUE: ColorScale = ColorScale::two(Rgb::new(255, 0, 0), Rgb::new(0, 0, 255));

    #[test]
    fn percentile_indices_round_half_up() {
        assert_eq!(percentile_index(4, 25.0), 1);
        assert_eq!(percentile_index(4, 75.0), 3);
        assert_eq!(percentile_index(5, 50.0), 3);
        assert_eq!(percentile_index(3, 50.0), 2);
        assert_eq!(percentile_index(4, 100.0), 3);
        assert_eq!(percentile_index(0, 30.0), 0);
    }

    #[test]
    fn quartile_descriptor() {
        let values = column(&[40.0, 10.0, 30.0, 20.0]);
        let p = Percentiles { min: 25.0, max: 75.0, middle: 50.0 };
        let d = describe(&refs(&values), &p);
        assert_eq!(d.min, 20.0);
        assert_eq!(d.max, 40.0);
        // (n - 1) / 2 = 1.5 rounds up to index 2.
        assert_eq!(d.middle, 30.0);
    }

    #[test]
    fn default_percentiles_use_true_extremes() {
        let values = column(&[5.0, -3.0, 12.0]);
        let d = describe(&refs(&values), &Percentiles::default());
        assert_eq!((d.min, d.max, d.middle), (-3.0, 12.0, 5.0));
    }

    #[test]
    fn categorical_column() {
        let values: Vec<Value> = ["b", "a", "b", "c"].iter().map(|&s| Value::from(s)).collect();
        let d = describe(&refs(&values), &Percentiles::default());
        let categories = d.str2num.as_ref().unwrap();
        assert_eq!(categories.categories(), &["b", "a", "c"]);
        assert_eq!((d.min, d.max, d.middle), (0.0, 2.0, 1.0));
        assert_eq!(d.position_of(&Value::from("c")), Some(2.0));
        assert_eq!(d.position_of(&Value::Null), None);
    }

    #[test]
    fn descriptors_per_column_skip_nulls() {
        let rows = vec![
            vec![Value::Number(1.0), Value::from("x")],
            vec![Value::Null, Value::from("y")],
            vec![Value::Number(3.0), Value::Null],
        ];
        let matrix: Vec<&[Value]> = rows.iter().map(Vec::as_slice).collect();
        let d = compute_descriptors(&matrix, DescribeAlong::Columns, &Percentiles::default());
        assert_eq!(d.len(), 2);
        assert_eq!((d[0].min, d[0].max), (1.0, 3.0));
        assert_eq!(d[1].max, 1.0);

        let by_row = compute_descriptors(&matrix, DescribeAlong::Rows, &Percentiles::default());
        assert_eq!(by_row.len(), 3);
        assert!(by_row[0].str2num.is_none());
        assert_eq!(by_row[1].str2num.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn global_descriptor_pools_values() {
        let rows = vec![column(&[1.0, 9.0]), column(&[4.0, 5.0])];
        let matrix: Vec<&[Value]> = rows.iter().map(Vec::as_slice).collect();
        let d = global_descriptor(&matrix, &Percentiles::default());
        assert_eq!((d.min, d.max, d.middle), (1.0, 9.0, 5.0));
    }

    #[test]
    fn midpoint_interpolation() {
        let d = ColumnDescriptor::numeric(0.0, 10.0, 5.0);
        assert_eq!(color_for(5.0, &d, &RED_BLUE), Rgb::new(128, 0, 128));
    }

    #[test]
    fn endpoints_hit_scale_ends() {
        let d = ColumnDescriptor::numeric(-2.0, 7.0, 1.0);
        assert_eq!(color_for(-2.0, &d, &RED_BLUE), RED_BLUE.start);
        assert_eq!(color_for(7.0, &d, &RED_BLUE), RED_BLUE.end);
        assert_eq!(color_for(99.0, &d, &RED_BLUE), RED_BLUE.end);
        assert_eq!(color_for(-99.0, &d, &RED_BLUE), RED_BLUE.start);
    }

    #[test]
    fn degenerate_domain_is_start() {
        let d = ColumnDescriptor::numeric(3.0, 3.0, 3.0);
        assert_eq!(color_for(3.0, &d, &RED_BLUE), RED_BLUE.start);
    }

    #[test]
    fn three_stop_scale() {
        let scales = ColorScales::default();
        let scale = scales.get("BuWhRd").unwrap();
        let d = ColumnDescriptor::numeric(0.0, 10.0, 4.0);
        assert_eq!(color_for(4.0, &d, scale), Rgb::new(255, 255, 255));
        assert_eq!(color_for(0.0, &d, scale), scale.start);
        assert_eq!(color_for(10.0, &d, scale), scale.end);
        assert_eq!(color_for(2.0, &d, scale), Rgb::new(144, 184, 218));
    }

    #[test]
    fn three_stop_middle_on_boundary() {
        let scale = ColorScale::three(Rgb::new(0, 0, 0), Rgb::new(100, 100, 100), Rgb::new(200, 200, 200));
        let at_max = ColumnDescriptor::numeric(0.0, 10.0, 10.0);
        assert_eq!(color_for(10.0, &at_max, &scale), scale.end);
        assert_eq!(color_for(5.0, &at_max, &scale), Rgb::new(50, 50, 50));
        let at_min = ColumnDescriptor::numeric(0.0, 10.0, 0.0);
        assert_eq!(color_for(0.0, &at_min, &scale), scale.start);
        assert_eq!(color_for(5.0, &at_min, &scale), Rgb::new(150, 150, 150));
    }

    #[test]
    fn registry_rejects_unknown_names() {
        let mut scales = ColorScales::default();
        assert!(matches!(scales.get("Nope"), Err(HeatmapError::UnknownColorScale(name)) if name == "Nope"));
        scales.register("Nope", RED_BLUE);
        assert_eq!(scales.get("Nope").unwrap(), &RED_BLUE);
        assert!(scales.contains("Greens"));
        assert!(scales.names().contains(&"RdLrGr"));
    }

    #[test]
    fn percentiles_validate_range() {
        assert!(Percentiles::default().validate().is_ok());
        let bad = Percentiles { min: -1.0, ..Percentiles::default() };
        assert!(matches!(bad.validate(), Err(HeatmapError::InvalidPercentile { name: "min", .. })));
    }

    #[test]
    fn parses_colors() {
        assert_eq!(Rgb::parse("#ff8000"), Some(Rgb::new(255, 128, 0)));
        assert_eq!(Rgb::parse("1, 2,3"), Some(Rgb::new(1, 2, 3)));
        assert_eq!(Rgb::parse("#fff"), None);
        assert_eq!(Rgb::parse("1,2"), None);
    }

    #[test]
    fn reads_scale_table() {
        let table = "# name\tstart\tend\tmiddle\n\
                     Mono\t#000000\t255,255,255\n\
                     \n\
                     Tri\t0,0,255\t#ff0000\t255,255,255\n\
                     Broken\t#00\n";
        let mut scales = ColorScales::default();
        assert_eq!(scales.read_tsv(table.as_bytes()).unwrap(), 2);
        assert_eq!(scales.get("Mono").unwrap(), &ColorScale::two(Rgb::new(0, 0, 0), Rgb::new(255, 255, 255)));
        let tri = scales.get("Tri").unwrap();
        assert_eq!(tri.middle, Some(Rgb::new(255, 255, 255)));
        assert_eq!(tri.end, Rgb::new(255, 0, 0));
        assert!(!scales.contains("Broken"));
    }
}
