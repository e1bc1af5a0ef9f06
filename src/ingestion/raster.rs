use std::fs;
use std::path::Path;

use tracing::debug;

use crate::geometry::Vector;
use crate::tiles::TileError;

/// Upper bound on decoded samples, guards against malformed coordinates.
const MAX_SAMPLES: usize = 64_000_000;

/// A decoded elevation/surface raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterGrid {
    pub width: usize,
    /// South-west corner of sample (0, 0).
    pub origin: Vector,
    pub cell_size: f64,
    /// Row-major samples, rows northward; missing samples are NaN.
    pub data: Vec<f32>,
    pub name: String,
}

/// Decodes a raw raster file into a [`RasterGrid`].
pub trait RasterDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<RasterGrid, TileError>;
}

/// Decoder for ASCII `x y z` grids as published by survey agencies.
///
/// Each line holds one sample at its cell centre; the spacing is inferred
/// from the coordinates.
#[derive(Debug, Clone, Copy, Default)]
pub struct XyzRasterDecoder;

impl RasterDecoder for XyzRasterDecoder {
    fn decode(&self, path: &Path) -> Result<RasterGrid, TileError> {
        let content = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        parse_xyz(&content, name)
    }
}

/// Parse the text of an `x y z` grid.
pub fn parse_xyz(content: &str, name: &str) -> Result<RasterGrid, TileError> {
    let mut samples = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values: Vec<f64> = line
            .split(|c: char| c.is_whitespace() || c == ',' || c == ';')
            .filter(|s| !s.is_empty())
            .map(str::parse::<f64>)
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| TileError::Decode(format!("{name}: line {}: {e}", lineno + 1)))?;
        if values.len() < 3 {
            return Err(TileError::Decode(format!(
                "{name}: line {} has {} values, expected 3",
                lineno + 1,
                values.len()
            )));
        }
        samples.push([values[0], values[1], values[2]]);
    }

    if samples.is_empty() {
        return Err(TileError::Decode(format!("{name}: no samples")));
    }

    let xs = distinct_sorted(samples.iter().map(|s| s[0]));
    let ys = distinct_sorted(samples.iter().map(|s| s[1]));
    let step = min_spacing(&xs)
        .into_iter()
        .chain(min_spacing(&ys))
        .reduce(f64::min)
        .ok_or_else(|| TileError::Decode(format!("{name}: cannot infer sample spacing")))?;

    let (min_x, max_x) = (xs[0], xs[xs.len() - 1]);
    let (min_y, max_y) = (ys[0], ys[ys.len() - 1]);
    let width = ((max_x - min_x) / step).round() as usize + 1;
    let rows = ((max_y - min_y) / step).round() as usize + 1;
    if width.saturating_mul(rows) > MAX_SAMPLES {
        return Err(TileError::Decode(format!(
            "{name}: {width}x{rows} samples exceed the raster limit"
        )));
    }

    let mut data = vec![f32::NAN; width * rows];
    for [x, y, z] in samples {
        let col = ((x - min_x) / step).round() as usize;
        let row = ((y - min_y) / step).round() as usize;
        data[row * width + col] = z as f32;
    }

    debug!(name, width, rows, step, "Decoded XYZ raster");

    Ok(RasterGrid {
        width,
        origin: Vector::new(min_x - step / 2.0, min_y - step / 2.0, 0.0),
        cell_size: step,
        data,
        name: name.to_string(),
    })
}

fn distinct_sorted(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut v: Vec<f64> = values.collect();
    v.sort_by(f64::total_cmp);
    v.dedup();
    v
}

fn min_spacing(sorted: &[f64]) -> Option<f64> {
    sorted
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|d| *d > 0.0)
        .reduce(f64::min)
}
