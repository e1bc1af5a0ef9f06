use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;

use crate::geometry::Vector;
use crate::ingestion::raster::RasterGrid;

use super::{GRID_TILE_EXTENT, TileError, TileKey};

/// Sample value of cells excised by building masking. Lower than any
/// terrain, so a masked cell never blocks a ray.
pub const MASKED_VALUE: f32 = -9999.0;

const MAGIC: &[u8; 4] = b"GTL1";
const HEADER_LEN: usize = 4 + 4 + 3 * 8;

/// Dense elevation/surface grid covering one 1 km tile.
///
/// Samples are row-major, `data[row * width + col]`; rows run northward from
/// `origin`, the south-west corner of cell (0, 0).
#[derive(Debug, Clone, PartialEq)]
pub struct GridTile {
    width: usize,
    origin: Vector,
    data: Vec<f32>,
    name: String,
}

impl GridTile {
    pub fn new(
        width: usize,
        origin: Vector,
        data: Vec<f32>,
        name: impl Into<String>,
    ) -> Result<Self, TileError> {
        if width == 0 || data.is_empty() || data.len() % width != 0 {
            return Err(TileError::CorruptCache(format!(
                "{} samples do not form rows of width {width}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            origin,
            data,
            name: name.into(),
        })
    }

    /// Square tile with every sample set to `value`.
    pub fn filled(width: usize, origin: Vector, value: f32, name: impl Into<String>) -> Self {
        Self {
            width,
            origin,
            data: vec![value; width * width],
            name: name.into(),
        }
    }

    /// Build the canonical tile for `key` at `width` cells per side from a
    /// decoded raster.
    pub fn from_raster(raster: &RasterGrid, key: TileKey, width: usize, name: &str) -> Self {
        let (ox, oy) = key.origin();
        let origin = Vector::new(ox, oy, 0.0);
        let data = regrid(
            &raster.data,
            raster.width,
            raster.origin,
            raster.cell_size,
            origin,
            width,
            GRID_TILE_EXTENT / width as f64,
        );
        Self {
            width,
            origin,
            data,
            name: name.to_string(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.width
    }

    pub fn origin(&self) -> Vector {
        self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Cell edge length in metres.
    pub fn cell_size(&self) -> f64 {
        GRID_TILE_EXTENT / self.width as f64
    }

    fn index(&self, row: i64, col: i64) -> Result<usize, TileError> {
        if row < 0 || col < 0 || row as usize >= self.rows() || col as usize >= self.width {
            return Err(TileError::OutOfBounds { row, col });
        }
        Ok(row as usize * self.width + col as usize)
    }

    pub fn get(&self, row: i64, col: i64) -> Result<f32, TileError> {
        self.index(row, col).map(|i| self.data[i])
    }

    pub fn set(&mut self, row: i64, col: i64, value: f32) -> Result<(), TileError> {
        let i = self.index(row, col)?;
        self.data[i] = value;
        Ok(())
    }

    /// Cell `(row, col)` containing the world point, possibly outside the
    /// tile.
    pub fn cell_of(&self, x: f64, y: f64) -> (i64, i64) {
        let cs = self.cell_size();
        (
            ((y - self.origin.y) / cs).floor() as i64,
            ((x - self.origin.x) / cs).floor() as i64,
        )
    }

    /// Centre of cell `(row, col)` in world coordinates.
    pub fn cell_center(&self, row: i64, col: i64) -> (f64, f64) {
        let cs = self.cell_size();
        (
            self.origin.x + (col as f64 + 0.5) * cs,
            self.origin.y + (row as f64 + 0.5) * cs,
        )
    }

    pub fn sample_at(&self, x: f64, y: f64) -> Result<f32, TileError> {
        let (row, col) = self.cell_of(x, y);
        self.get(row, col)
    }

    /// Re-grid to `target_width` cells per side over the same extent.
    ///
    /// Downsampling keeps the block maximum; upsampling takes the nearest
    /// sample.
    pub fn resample(&self, target_width: usize) -> GridTile {
        if target_width == self.width {
            return self.clone();
        }
        let data = regrid(
            &self.data,
            self.width,
            self.origin,
            self.cell_size(),
            self.origin,
            target_width,
            GRID_TILE_EXTENT / target_width as f64,
        );
        GridTile {
            width: target_width,
            origin: self.origin,
            data,
            name: self.name.clone(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<(), TileError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(self.width as u32).to_le_bytes());
        for c in self.origin.as_array() {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        buf.extend_from_slice(bytemuck::cast_slice(&self.data));
        fs::write(path, buf)?;
        Ok(())
    }

    pub fn read_from(path: &Path, name: &str) -> Result<Self, TileError> {
        let file = File::open(path)?;
        // SAFETY: cache files are written whole before being mapped and are
        // never modified in place.
        let map = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&map, name)
    }

    fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TileError> {
        if bytes.len() < HEADER_LEN || &bytes[..4] != MAGIC {
            return Err(TileError::CorruptCache("bad grid header".into()));
        }
        let width = u32::from_le_bytes(le_array(&bytes[4..8])) as usize;
        let read_f64 = |at: usize| f64::from_le_bytes(le_array(&bytes[at..at + 8]));
        let origin = Vector::new(read_f64(8), read_f64(16), read_f64(24));

        let payload = &bytes[HEADER_LEN..];
        if payload.len() % 4 != 0 {
            return Err(TileError::CorruptCache(format!(
                "payload of {} bytes is not a float array",
                payload.len()
            )));
        }
        let data: Vec<f32> = payload
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<f32>)
            .collect();
        Self::new(width, origin, data, name)
    }
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}

/// Resample a row-major source grid onto a square destination lattice.
fn regrid(
    src: &[f32],
    src_width: usize,
    src_origin: Vector,
    src_cell: f64,
    dst_origin: Vector,
    dst_width: usize,
    dst_cell: f64,
) -> Vec<f32> {
    let src_rows = if src_width == 0 { 0 } else { src.len() / src_width };
    let mut out = Vec::with_capacity(dst_width * dst_width);

    // Source indices whose cell centres fall into [lo, hi).
    let span = |lo: f64, hi: f64, origin: f64, count: usize| -> Option<(usize, usize)> {
        if count == 0 {
            return None;
        }
        let first = ((lo - origin) / src_cell - 0.5).ceil().max(0.0);
        let last = (((hi - origin) / src_cell - 0.5).ceil() - 1.0).min(count as f64 - 1.0);
        (first <= last).then(|| (first as usize, last as usize))
    };

    for row in 0..dst_width {
        let y0 = dst_origin.y + row as f64 * dst_cell;
        for col in 0..dst_width {
            let x0 = dst_origin.x + col as f64 * dst_cell;
            let rows = span(y0, y0 + dst_cell, src_origin.y, src_rows);
            let cols = span(x0, x0 + dst_cell, src_origin.x, src_width);

            let value = match (rows, cols) {
                (Some((r0, r1)), Some((c0, c1))) => (r0..=r1)
                    .flat_map(|r| (c0..=c1).map(move |c| r * src_width + c))
                    .map(|i| src[i])
                    .fold(f32::NAN, f32::max),
                _ => {
                    let c = ((x0 + dst_cell / 2.0 - src_origin.x) / src_cell).floor();
                    let r = ((y0 + dst_cell / 2.0 - src_origin.y) / src_cell).floor();
                    if c >= 0.0 && r >= 0.0 && (c as usize) < src_width && (r as usize) < src_rows {
                        src[r as usize * src_width + c as usize]
                    } else {
                        f32::NAN
                    }
                }
            };
            out.push(value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ramp(width: usize) -> GridTile {
        let data = (0..width * width).map(|i| i as f32).collect();
        GridTile::new(width, Vector::new(352_000.0, 5_650_000.0, 0.0), data, "ramp").unwrap()
    }

    #[test]
    fn accessor_validates_bounds() {
        let mut tile = ramp(4);
        assert_eq!(tile.get(1, 2).unwrap(), 6.0);
        assert!(matches!(
            tile.get(4, 0),
            Err(TileError::OutOfBounds { row: 4, col: 0 })
        ));
        assert!(tile.get(0, -1).is_err());
        tile.set(3, 3, -1.0).unwrap();
        assert_eq!(tile.get(3, 3).unwrap(), -1.0);
        assert!(tile.set(0, 4, 1.0).is_err());
    }

    #[test]
    fn rejects_ragged_data() {
        assert!(GridTile::new(3, Vector::ZERO, vec![0.0; 7], "x").is_err());
        assert!(GridTile::new(0, Vector::ZERO, vec![], "x").is_err());
    }

    #[test]
    fn world_lookup_rows_grow_northward() {
        let tile = ramp(4); // 250 m cells
        assert_eq!(tile.cell_size(), 250.0);
        assert_eq!(tile.cell_of(352_010.0, 5_650_260.0), (1, 0));
        assert_eq!(tile.sample_at(352_760.0, 5_650_999.0).unwrap(), 15.0);
        assert!(tile.sample_at(353_000.5, 5_650_500.0).is_err());
        assert_eq!(tile.cell_center(0, 0), (352_125.0, 5_650_125.0));
    }

    #[test]
    fn downsampling_keeps_block_maximum() {
        let tile = ramp(4);
        let small = tile.resample(2);
        assert_eq!(small.width(), 2);
        assert_eq!(small.data(), &[5.0, 7.0, 13.0, 15.0]);
    }

    #[test]
    fn upsampling_takes_nearest() {
        let tile = ramp(2);
        let big = tile.resample(4);
        assert_eq!(big.get(0, 0).unwrap(), 0.0);
        assert_eq!(big.get(0, 3).unwrap(), 1.0);
        assert_eq!(big.get(3, 0).unwrap(), 2.0);
        assert_eq!(big.get(2, 2).unwrap(), 3.0);
    }

    #[test]
    fn from_raster_aligns_to_key() {
        let raster = RasterGrid {
            width: 2,
            origin: Vector::new(0.0, 0.0, 0.0),
            cell_size: 500.0,
            data: vec![1.0, 2.0, 3.0, 4.0],
            name: "raw".into(),
        };
        let tile = GridTile::from_raster(&raster, TileKey::new(0, 0), 4, "dgm_0_0");
        assert_eq!(tile.origin(), Vector::new(0.0, 0.0, 0.0));
        assert_eq!(tile.sample_at(100.0, 100.0).unwrap(), 1.0);
        assert_eq!(tile.sample_at(900.0, 900.0).unwrap(), 4.0);
        assert_eq!(tile.name(), "dgm_0_0");
    }

    #[test]
    fn binary_cache_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dgm").join("352_5650.bin");
        let tile = ramp(8);
        tile.write_to(&path).unwrap();
        let back = GridTile::read_from(&path, "ramp").unwrap();
        assert_eq!(back, tile);
    }

    #[test]
    fn truncated_cache_file_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.bin");
        ramp(4).write_to(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 6]).unwrap();
        assert!(matches!(
            GridTile::read_from(&path, "t"),
            Err(TileError::CorruptCache(_))
        ));

        fs::write(&path, b"nonsense").unwrap();
        assert!(GridTile::read_from(&path, "t").is_err());
    }
}
