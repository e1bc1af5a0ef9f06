pub mod cache;
pub mod coverage;
pub mod fetch;
pub mod grid;
pub mod masking;
pub mod vector_tile;

use std::io;

use crate::geometry::GeometryError;

pub use cache::{CacheStats, TileCache};
pub use coverage::{tiles_in_ground_area, tiles_on_ray};
pub use fetch::{Fetcher, OfflineFetcher};
pub use grid::{GridTile, MASKED_VALUE};
pub use vector_tile::VectorTile;

/// Edge length of a grid tile in metres.
pub const GRID_TILE_EXTENT: f64 = 1000.0;

/// Tile kinds served by the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Bare terrain.
    Dgm,
    /// Terrain plus surface objects.
    Dom,
    /// DOM with building footprints removed.
    DomMasked,
    /// Building surfaces.
    Lod2,
}

impl TileKind {
    pub const GRIDS: [TileKind; 3] = [TileKind::Dgm, TileKind::Dom, TileKind::DomMasked];

    /// Tile edge length in kilometres.
    pub fn width_km(self) -> i32 {
        match self {
            TileKind::Lod2 => 2,
            _ => 1,
        }
    }

    pub fn is_grid(self) -> bool {
        self != TileKind::Lod2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TileKind::Dgm => "dgm",
            TileKind::Dom => "dom",
            TileKind::DomMasked => "dom_masked",
            TileKind::Lod2 => "lod2",
        }
    }

    /// File extension of the raw source for this kind.
    pub fn raw_extension(self) -> &'static str {
        match self {
            TileKind::Lod2 => "gml",
            _ => "xyz",
        }
    }
}

impl std::fmt::Display for TileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tile address in whole kilometres of UTM easting/northing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub easting_km: i32,
    pub northing_km: i32,
}

impl TileKey {
    pub const fn new(easting_km: i32, northing_km: i32) -> Self {
        Self {
            easting_km,
            northing_km,
        }
    }

    /// Key of the tile of `kind` containing the UTM point `(x, y)`.
    pub fn for_point(x: f64, y: f64, kind: TileKind) -> Self {
        let e = (x / 1000.0).floor() as i32;
        let n = (y / 1000.0).floor() as i32;
        Self::new(e, n).snapped(kind.width_km())
    }

    /// Round both components down to a multiple of `width_km`.
    pub fn snapped(self, width_km: i32) -> Self {
        Self::new(
            self.easting_km - self.easting_km.rem_euclid(width_km),
            self.northing_km - self.northing_km.rem_euclid(width_km),
        )
    }

    /// Lower-left corner in metres.
    pub fn origin(&self) -> (f64, f64) {
        (
            self.easting_km as f64 * 1000.0,
            self.northing_km as f64 * 1000.0,
        )
    }
}

impl std::fmt::Display for TileKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.easting_km, self.northing_km)
    }
}

/// Failures of tile acquisition and access.
#[derive(thiserror::Error, Debug)]
pub enum TileError {
    #[error("tile {kind} {key} not available")]
    NotAvailable { key: TileKey, kind: TileKind },
    #[error("corrupt tile cache: {0}")]
    CorruptCache(String),
    #[error("cell ({row}, {col}) outside tile")]
    OutOfBounds { row: i64, col: i64 },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
