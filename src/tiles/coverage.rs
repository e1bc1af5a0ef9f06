//! Resolution of paths and ground footprints to tile keys.

use crate::geometry::{PipMode, Polygon, Vector};

use super::TileKey;

fn push_unique(keys: &mut Vec<TileKey>, key: TileKey) {
    if !keys.contains(&key) {
        keys.push(key);
    }
}

/// Every tile of `tile_width_km` the horizontal projection of `p1`-`p2`
/// touches, walked column by column from west to east, plus the tile of the
/// destination.
pub fn tiles_on_ray(p1: &Vector, p2: &Vector, tile_width_km: i32) -> Vec<TileKey> {
    let w = tile_width_km as f64 * 1000.0;
    let (x_min, x_max) = (p1.x.min(p2.x), p1.x.max(p2.x));
    let dx = p2.x - p1.x;

    let first_col = (x_min / w).floor() as i32;
    let last_col = (x_max / w).floor() as i32;

    let mut keys = Vec::new();
    for col in first_col..=last_col {
        let cx0 = (col as f64 * w).max(x_min);
        let cx1 = ((col + 1) as f64 * w).min(x_max);

        // y = y1 + m (x - x1) bounds the rows crossed inside this column.
        let (ya, yb) = if dx == 0.0 {
            (p1.y, p2.y)
        } else {
            let m = (p2.y - p1.y) / dx;
            (p1.y + m * (cx0 - p1.x), p1.y + m * (cx1 - p1.x))
        };
        let first_row = (ya.min(yb) / w).floor() as i32;
        let last_row = (ya.max(yb) / w).floor() as i32;

        for row in first_row..=last_row {
            push_unique(
                &mut keys,
                TileKey::new(col * tile_width_km, row * tile_width_km),
            );
        }
    }

    let destination = TileKey::new(
        (p2.x / w).floor() as i32 * tile_width_km,
        (p2.y / w).floor() as i32 * tile_width_km,
    );
    push_unique(&mut keys, destination);
    keys
}

/// Tiles of `tile_width_km` covered by a horizontal footprint polygon.
///
/// A tile qualifies when the footprint contains one of its corners or one
/// of the footprint's vertices lies inside it.
pub fn tiles_in_ground_area(footprint: &Polygon, tile_width_km: i32) -> Vec<TileKey> {
    let Some((lo, hi)) = footprint.bounds() else {
        return Vec::new();
    };
    let w = tile_width_km as f64 * 1000.0;

    let mut keys = Vec::new();
    for col in (lo.x / w).floor() as i32..=(hi.x / w).floor() as i32 {
        for row in (lo.y / w).floor() as i32..=(hi.y / w).floor() as i32 {
            let (x0, y0) = (col as f64 * w, row as f64 * w);
            let (x1, y1) = (x0 + w, y0 + w);

            let corner_inside = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)]
                .iter()
                .any(|&(x, y)| footprint.is_point_in_polygon(&Vector::new(x, y, 0.0), PipMode::Flat));
            let vertex_inside = footprint
                .points()
                .iter()
                .any(|p| p.x >= x0 && p.x < x1 && p.y >= y0 && p.y < y1);

            if corner_inside || vertex_inside {
                keys.push(TileKey::new(col * tile_width_km, row * tile_width_km));
            }
        }
    }
    keys
}
