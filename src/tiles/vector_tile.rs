use std::fs;
use std::path::Path;

use tracing::debug;

use crate::geometry::{GeometryError, Plane, Polygon, SurfaceType, Vector};
use crate::ingestion::BuildingSurface;

use super::{TileError, TileKey, TileKind};

const MAGIC: &[u8; 4] = b"VTL1";

/// Building surfaces of one 2 km tile.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorTile {
    polygons: Vec<Polygon>,
    lower: Vector,
    upper: Vector,
}

impl VectorTile {
    pub fn new(polygons: Vec<Polygon>, lower: Vector, upper: Vector) -> Self {
        Self {
            polygons,
            lower,
            upper,
        }
    }

    /// Build polygons from parsed building records.
    ///
    /// Closing duplicates and points off the spanning plane are dropped;
    /// records that keep fewer than three points are skipped.
    pub fn from_records(records: &[BuildingSurface], key: TileKey) -> Self {
        let mut skipped_points = 0usize;
        let polygons: Vec<Polygon> = records
            .iter()
            .filter_map(|record| {
                let (polygon, skipped) = polygon_from_record(record)?;
                skipped_points += skipped;
                Some(polygon)
            })
            .collect();

        if skipped_points > 0 || polygons.len() < records.len() {
            debug!(
                key = %key,
                records = records.len(),
                polygons = polygons.len(),
                skipped_points,
                "Dropped non-planar building geometry"
            );
        }

        let (lower, upper) = bounds_of(&polygons).unwrap_or_else(|| {
            let (x, y) = key.origin();
            let extent = TileKind::Lod2.width_km() as f64 * 1000.0;
            (Vector::new(x, y, 0.0), Vector::new(x + extent, y + extent, 0.0))
        });

        Self {
            polygons,
            lower,
            upper,
        }
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn lower(&self) -> Vector {
        self.lower
    }

    pub fn upper(&self) -> Vector {
        self.upper
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    pub fn write_to(&self, path: &Path) -> Result<(), TileError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let planar: Vec<(&Polygon, &Plane)> = self
            .polygons
            .iter()
            .filter_map(|p| p.plane().map(|plane| (p, plane)))
            .collect();

        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(planar.len() as u32).to_le_bytes());
        put_vector(&mut buf, self.lower);
        put_vector(&mut buf, self.upper);

        for (polygon, plane) in planar {
            buf.push(polygon.surface().as_u8());
            match polygon.id() {
                Some(id) => {
                    buf.push(1);
                    buf.extend_from_slice(&(id.len() as u32).to_le_bytes());
                    buf.extend_from_slice(id.as_bytes());
                }
                None => buf.push(0),
            }
            for c in plane.coefficients() {
                buf.extend_from_slice(&c.to_le_bytes());
            }
            buf.extend_from_slice(&(polygon.len() as u32).to_le_bytes());
            for p in polygon.points() {
                put_vector(&mut buf, *p);
            }
        }

        fs::write(path, buf)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self, TileError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, TileError> {
        let mut cur = Cursor { bytes, at: 0 };
        if cur.take(4)? != MAGIC {
            return Err(TileError::CorruptCache("bad vector tile header".into()));
        }
        let count = cur.u32()? as usize;
        let lower = cur.vector()?;
        let upper = cur.vector()?;

        let mut polygons = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let surface = SurfaceType::from_u8(cur.u8()?)
                .ok_or_else(|| TileError::CorruptCache("unknown surface tag".into()))?;
            let id = match cur.u8()? {
                0 => None,
                _ => {
                    let len = cur.u32()? as usize;
                    let raw = cur.take(len)?;
                    Some(String::from_utf8_lossy(raw).into_owned())
                }
            };
            let coefficients = [cur.f64()?, cur.f64()?, cur.f64()?, cur.f64()?];
            let plane = Plane::from_unit_coefficients(coefficients).map_err(corrupt)?;

            let mut polygon = Polygon::new(plane, surface);
            if let Some(id) = id {
                polygon = polygon.with_id(id);
            }
            let points = cur.u32()? as usize;
            for _ in 0..points {
                polygon.add_point(cur.vector()?).map_err(corrupt)?;
            }
            polygons.push(polygon);
        }

        if cur.at != bytes.len() {
            return Err(TileError::CorruptCache(format!(
                "{} trailing bytes",
                bytes.len() - cur.at
            )));
        }

        Ok(Self {
            polygons,
            lower,
            upper,
        })
    }
}

fn corrupt(e: GeometryError) -> TileError {
    TileError::CorruptCache(format!("invalid polygon: {e}"))
}

fn polygon_from_record(record: &BuildingSurface) -> Option<(Polygon, usize)> {
    let plane = spanning_plane(&record.points)?;
    let mut polygon = Polygon::new(plane, record.surface);
    if let Some(id) = &record.id {
        polygon = polygon.with_id(id.clone());
    }

    let mut skipped = 0;
    for p in &record.points {
        match polygon.add_point(*p) {
            Ok(()) | Err(GeometryError::PointDuplicate) => {}
            Err(_) => skipped += 1,
        }
    }
    (polygon.len() >= 3).then_some((polygon, skipped))
}

/// Plane through the first point and the first non-degenerate pair after it.
fn spanning_plane(points: &[Vector]) -> Option<Plane> {
    let p0 = *points.first()?;
    let p1 = *points.iter().find(|p| **p != p0)?;
    points
        .iter()
        .find_map(|p2| Plane::from_three_points(p0, p1, *p2).ok())
}

fn bounds_of(polygons: &[Polygon]) -> Option<(Vector, Vector)> {
    polygons
        .iter()
        .filter_map(Polygon::bounds)
        .reduce(|(lo, hi), (l, h)| {
            (
                Vector::new(lo.x.min(l.x), lo.y.min(l.y), lo.z.min(l.z)),
                Vector::new(hi.x.max(h.x), hi.y.max(h.y), hi.z.max(h.z)),
            )
        })
}

fn put_vector(buf: &mut Vec<u8>, v: Vector) {
    for c in v.as_array() {
        buf.extend_from_slice(&c.to_le_bytes());
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], TileError> {
        let end = self
            .at
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| TileError::CorruptCache("unexpected end of vector tile".into()))?;
        let slice = &self.bytes[self.at..end];
        self.at = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, TileError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, TileError> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn f64(&mut self) -> Result<f64, TileError> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(b))
    }

    fn vector(&mut self) -> Result<Vector, TileError> {
        Ok(Vector::new(self.f64()?, self.f64()?, self.f64()?))
    }
}
