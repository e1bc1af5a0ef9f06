//! Pseudo-3D grid traversal.
//!
//! Paths are walked with a three-axis Bresenham in grid-cell units
//! (easting, northing and altitude each divided by the grid resolution).
//! The axis with the largest delta drives the walk; the other two step
//! when their error term crosses zero.

use crate::geometry::Vector;
use crate::tiles::{TileCache, TileError, TileKey, TileKind, tiles_on_ray};

/// One sampled grid column of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaySample {
    /// Cell centre easting.
    pub x: f64,
    /// Cell centre northing.
    pub y: f64,
    /// Ray altitude in this column, linearly interpolated along the path.
    pub z: f64,
}

fn cell(v: &Vector, resolution: f64) -> [i64; 3] {
    [
        (v.x / resolution).floor() as i64,
        (v.y / resolution).floor() as i64,
        (v.z / resolution).floor() as i64,
    ]
}

/// Columns crossed between `start` and `end`, excluding the columns of both
/// end points.
///
/// When the walk stays in one column for several vertical steps, the
/// lowest ray altitude of that column is kept.
pub fn walk(start: &Vector, end: &Vector, resolution: f64) -> Vec<RaySample> {
    let from = cell(start, resolution);
    let to = cell(end, resolution);

    let delta = [
        (to[0] - from[0]).abs(),
        (to[1] - from[1]).abs(),
        (to[2] - from[2]).abs(),
    ];
    let sign = [
        (to[0] - from[0]).signum(),
        (to[1] - from[1]).signum(),
        (to[2] - from[2]).signum(),
    ];

    let driving = if delta[0] >= delta[1] && delta[0] >= delta[2] {
        0
    } else if delta[1] >= delta[2] {
        1
    } else {
        2
    };
    let (a, b) = match driving {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };
    let steps = delta[driving];

    let mut samples: Vec<RaySample> = Vec::with_capacity(steps as usize);
    let mut current = from;
    let mut err_a = 2 * delta[a] - steps;
    let mut err_b = 2 * delta[b] - steps;

    for step in 1..steps {
        current[driving] += sign[driving];
        if err_a >= 0 {
            current[a] += sign[a];
            err_a -= 2 * steps;
        }
        if err_b >= 0 {
            current[b] += sign[b];
            err_b -= 2 * steps;
        }
        err_a += 2 * delta[a];
        err_b += 2 * delta[b];

        let column = [current[0], current[1]];
        if column == [from[0], from[1]] || column == [to[0], to[1]] {
            continue;
        }

        let t = step as f64 / steps as f64;
        let z = start.z + (end.z - start.z) * t;
        let x = (column[0] as f64 + 0.5) * resolution;
        let y = (column[1] as f64 + 0.5) * resolution;

        match samples.last_mut() {
            Some(last) if last.x == x && last.y == y => last.z = last.z.min(z),
            _ => samples.push(RaySample { x, y, z }),
        }
    }
    samples
}

/// Grid tiles of `kind` a walk between `start` and `end` reads.
pub fn required_tiles(start: &Vector, end: &Vector, samples: &[RaySample], kind: TileKind) -> Vec<TileKey> {
    let mut keys = tiles_on_ray(start, end, kind.width_km());
    for s in samples {
        let key = TileKey::for_point(s.x, s.y, kind);
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

/// Per-sample obstruction flags against the resident `kind` grid.
///
/// A sample is blocked when the ray is at or below the stored value;
/// cells without data never block. With `stop_at_first` the result ends at
/// the first blocked sample.
pub fn blocked(
    cache: &TileCache,
    kind: TileKind,
    samples: &[RaySample],
    stop_at_first: bool,
) -> Result<Vec<bool>, TileError> {
    let mut flags = Vec::with_capacity(samples.len());
    for s in samples {
        let surface = cache.sample(kind, s.x, s.y)?;
        let hit = !surface.is_nan() && s.z <= surface as f64;
        flags.push(hit);
        if hit && stop_at_first {
            break;
        }
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn horizontal_walk_visits_every_column() {
        let samples = walk(
            &Vector::new(0.5, 0.5, 10.0),
            &Vector::new(10.5, 0.5, 10.0),
            1.0,
        );
        assert_eq!(samples.len(), 9);
        assert_eq!((samples[0].x, samples[0].y), (1.5, 0.5));
        assert_eq!((samples[8].x, samples[8].y), (9.5, 0.5));
        assert!(samples.iter().all(|s| s.z == 10.0));
    }

    #[test]
    fn diagonal_walk_and_interpolated_altitude() {
        let samples = walk(
            &Vector::new(0.5, 0.5, 0.0),
            &Vector::new(4.5, 4.5, 40.0),
            1.0,
        );
        // altitude dominates: 40 vertical steps over 4 columns
        let columns: Vec<(f64, f64)> = samples.iter().map(|s| (s.x, s.y)).collect();
        assert_eq!(columns, vec![(1.5, 1.5), (2.5, 2.5), (3.5, 3.5)]);
        for pair in samples.windows(2) {
            assert!(pair[0].z < pair[1].z);
        }
        assert!(samples[0].z > 0.0 && samples[2].z < 40.0);
    }

    #[test]
    fn westward_descending_walk() {
        let samples = walk(
            &Vector::new(20.0, 3.0, 30.0),
            &Vector::new(0.0, 1.0, 10.0),
            2.0,
        );
        assert_eq!(samples.len(), 9);
        assert_eq!(samples[0].x, 19.0);
        assert_eq!(samples[8].x, 3.0);
        assert_abs_diff_eq!(samples[0].z, 28.0, epsilon = 1e-9);
        assert_abs_diff_eq!(samples[8].z, 12.0, epsilon = 1e-9);
    }

    #[test]
    fn endpoints_in_adjacent_cells_have_no_samples() {
        assert!(walk(&Vector::new(0.2, 0.2, 0.0), &Vector::new(1.2, 0.2, 0.0), 1.0).is_empty());
        assert!(walk(&Vector::new(0.2, 0.2, 0.0), &Vector::new(0.3, 0.4, 9.0), 1.0).is_empty());
    }

    #[test]
    fn required_tiles_cover_path() {
        let start = Vector::new(352_900.0, 5_650_500.0, 100.0);
        let end = Vector::new(353_100.0, 5_650_500.0, 100.0);
        let samples = walk(&start, &end, 1.0);
        let keys = required_tiles(&start, &end, &samples, TileKind::Dgm);
        assert_eq!(keys, vec![TileKey::new(352, 5650), TileKey::new(353, 5650)]);
    }
}
