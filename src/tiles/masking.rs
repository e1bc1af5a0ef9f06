//! Excision of building footprints from a surface grid.

use tracing::debug;

use crate::geometry::{PipMode, Polygon, SurfaceType, Vector};

use super::{GridTile, MASKED_VALUE, TileError};

/// Upper bound of the footprint sampling step in metres.
const FINE_STEP: f64 = 0.5;

/// Cells around each hit that are masked as well.
const NEIGHBOURHOOD: i64 = 1;

/// Copy of `dom` with every cell under a ground footprint in `polygons`
/// set to [`MASKED_VALUE`].
///
/// Polygons are split into contiguous index ranges, one per worker. Workers
/// only collect hit cells; the copy is written after all of them joined.
pub fn mask_tile(dom: &GridTile, polygons: &[Polygon], threads: usize) -> Result<GridTile, TileError> {
    let footprints: Vec<&Polygon> = polygons
        .iter()
        .filter(|p| p.surface() == SurfaceType::Ground && p.len() >= 3)
        .collect();

    let mut masked = dom.clone();
    if footprints.is_empty() {
        return Ok(masked);
    }

    let workers = threads.clamp(1, footprints.len());
    let chunk = footprints.len().div_ceil(workers);

    let partitions = crossbeam::thread::scope(|s| {
        let handles: Vec<_> = footprints
            .chunks(chunk)
            .map(|range| s.spawn(move |_| footprint_cells(dom, range)))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join())
            .collect::<Vec<_>>()
    })
    .map_err(|_| TileError::Worker("masking scope panicked".into()))?;

    let mut cells = 0usize;
    for partition in partitions {
        let hits = partition.map_err(|_| TileError::Worker("masking worker panicked".into()))?;
        for (row, col) in hits {
            masked.set(row, col, MASKED_VALUE)?;
            cells += 1;
        }
    }

    debug!(
        tile = dom.name(),
        footprints = footprints.len(),
        workers,
        cells,
        "Masked building footprints"
    );
    Ok(masked)
}

/// In-tile cells covered by `footprints`, each widened by the neighbourhood.
fn footprint_cells(tile: &GridTile, footprints: &[&Polygon]) -> Vec<(i64, i64)> {
    let step = FINE_STEP.min(tile.cell_size() / 2.0);
    let rows = tile.rows() as i64;
    let width = tile.width() as i64;

    let mut hits = Vec::new();
    for polygon in footprints {
        let Some((lo, hi)) = polygon.bounds() else {
            continue;
        };
        let Some((xs, ys)) = sample_range(tile, lo, hi, step) else {
            continue;
        };

        for iy in ys {
            let y = lo.y + iy as f64 * step;
            for ix in xs.clone() {
                let x = lo.x + ix as f64 * step;
                if !polygon.is_point_in_polygon(&Vector::new(x, y, 0.0), PipMode::Flat) {
                    continue;
                }
                let (row, col) = tile.cell_of(x, y);
                for r in row - NEIGHBOURHOOD..=row + NEIGHBOURHOOD {
                    for c in col - NEIGHBOURHOOD..=col + NEIGHBOURHOOD {
                        if (0..rows).contains(&r) && (0..width).contains(&c) {
                            hits.push((r, c));
                        }
                    }
                }
            }
        }
    }
    hits.sort_unstable();
    hits.dedup();
    hits
}

type SampleRange = std::ops::RangeInclusive<usize>;

/// Lattice indices `lo + i * step` of the footprint box `lo..hi` that can
/// still touch the tile, or `None` when the box misses it entirely.
///
/// The tile extent is widened by the neighbourhood so hits just outside
/// the edge still mask their in-tile neighbours.
fn sample_range(tile: &GridTile, lo: Vector, hi: Vector, step: f64) -> Option<(SampleRange, SampleRange)> {
    let margin = NEIGHBOURHOOD as f64 * tile.cell_size();
    let origin = tile.origin();
    let x_max = origin.x + tile.width() as f64 * tile.cell_size() + margin;
    let y_max = origin.y + tile.rows() as f64 * tile.cell_size() + margin;

    let axis = |lo: f64, hi: f64, min: f64, max: f64| -> Option<SampleRange> {
        if max < lo {
            return None;
        }
        let count = ((hi - lo) / step).ceil() as usize;
        let first = ((min - lo) / step).ceil().max(0.0) as usize;
        let last = (((max - lo) / step).floor() as usize).min(count);
        (first <= last).then_some(first..=last)
    };

    Some((
        axis(lo.x, hi.x, origin.x - margin, x_max)?,
        axis(lo.y, hi.y, origin.y - margin, y_max)?,
    ))
}
