use std::f64::consts::FRAC_PI_2;
use std::sync::OnceLock;

use super::{GeometryError, Line, Plane, PlaneIntersection, SEGMENT_EPSILON, Vector};

/// Building surface classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SurfaceType {
    Ground,
    Roof,
    Wall,
    #[default]
    Other,
}

impl SurfaceType {
    pub fn as_u8(self) -> u8 {
        match self {
            SurfaceType::Ground => 0,
            SurfaceType::Roof => 1,
            SurfaceType::Wall => 2,
            SurfaceType::Other => 3,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(SurfaceType::Ground),
            1 => Some(SurfaceType::Roof),
            2 => Some(SurfaceType::Wall),
            3 => Some(SurfaceType::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for SurfaceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceType::Ground => write!(f, "ground"),
            SurfaceType::Roof => write!(f, "roof"),
            SurfaceType::Wall => write!(f, "wall"),
            SurfaceType::Other => write!(f, "other"),
        }
    }
}

/// Frame used by the point-in-polygon test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipMode {
    /// Rotate the polygon's plane to horizontal before casting the ray.
    Spatial,
    /// Use x/y as-is (footprints already in a horizontal plane).
    Flat,
}

/// Planar polygon bound to a base plane.
///
/// Points are appended during a build phase with [`Polygon::add_point`];
/// centroid and area are computed on first use and cached.
#[derive(Debug, Clone, Default)]
pub struct Polygon {
    plane: Option<Plane>,
    points: Vec<Vector>,
    surface: SurfaceType,
    id: Option<String>,
    centroid: OnceLock<Vector>,
    area: OnceLock<f64>,
}

impl Polygon {
    pub fn new(plane: Plane, surface: SurfaceType) -> Self {
        Self {
            plane: Some(plane),
            surface,
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Bind an uninitialized polygon to its base plane.
    pub fn init(&mut self, plane: Plane) {
        self.plane = Some(plane);
        self.invalidate();
    }

    pub fn plane(&self) -> Option<&Plane> {
        self.plane.as_ref()
    }

    pub fn points(&self) -> &[Vector] {
        &self.points
    }

    pub fn surface(&self) -> SurfaceType {
        self.surface
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn add_point(&mut self, p: Vector) -> Result<(), GeometryError> {
        let plane = self.plane.ok_or(GeometryError::PolygonNotInitialized)?;
        if !plane.is_point_on_plane(&p) {
            return Err(GeometryError::PointNotOnBasePlane);
        }
        if self.points.contains(&p) {
            return Err(GeometryError::PointDuplicate);
        }
        self.points.push(p);
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        self.centroid = OnceLock::new();
        self.area = OnceLock::new();
    }

    /// Mean of all points.
    pub fn centroid(&self) -> Vector {
        *self.centroid.get_or_init(|| {
            if self.points.is_empty() {
                return Vector::ZERO;
            }
            let sum = self
                .points
                .iter()
                .fold(Vector::ZERO, |acc, p| acc + *p);
            sum / self.points.len() as f64
        })
    }

    /// Planar area (Newell's method projected on the base normal).
    pub fn area(&self) -> f64 {
        *self.area.get_or_init(|| {
            let Some(plane) = self.plane else {
                return 0.0;
            };
            if self.points.len() < 3 {
                return 0.0;
            }
            let origin = self.points[0];
            let mut sum = Vector::ZERO;
            for (a, b) in self.edges() {
                sum = sum + (*a - origin).cross(&(*b - origin));
            }
            0.5 * plane.normal().dot(&sum).abs()
        })
    }

    /// Axis-aligned footprint `(min, max)` of the points.
    pub fn bounds(&self) -> Option<(Vector, Vector)> {
        let first = *self.points.first()?;
        Some(self.points.iter().skip(1).fold((first, first), |(lo, hi), p| {
            (
                Vector::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Vector::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        }))
    }

    fn edges(&self) -> impl Iterator<Item = (&Vector, &Vector)> {
        self.points
            .iter()
            .zip(self.points.iter().cycle().skip(1))
    }

    /// Ray-casting parity test.
    pub fn is_point_in_polygon(&self, p: &Vector, mode: PipMode) -> bool {
        if self.points.len() < 3 {
            return false;
        }

        let (points, probe): (Vec<[f64; 2]>, [f64; 2]) = match mode {
            PipMode::Flat => (
                self.points.iter().map(|v| [v.x, v.y]).collect(),
                [p.x, p.y],
            ),
            PipMode::Spatial => {
                let Some(plane) = self.plane else {
                    return false;
                };
                if !plane.is_point_on_plane(p) {
                    return false;
                }
                let n = plane.normal();
                let alpha = n.y.atan2(n.x);
                let beta = FRAC_PI_2 - n.z.atan2(n.x.hypot(n.y));
                let rotate = |v: &Vector| {
                    let r = v.rotate(-alpha, -beta);
                    [r.x, r.y]
                };
                (self.points.iter().map(rotate).collect(), rotate(p))
            }
        };

        let mut inside = false;
        for i in 0..points.len() {
            let a = points[i];
            let b = points[(i + 1) % points.len()];
            if crosses_ray(a, b, probe) {
                inside = !inside;
            }
        }
        inside
    }

    /// Intersection of `line` with the polygon's surface, if the plane hit
    /// lies inside the polygon.
    pub fn line_intersection(&self, line: &Line) -> Option<(Vector, f64)> {
        let plane = self.plane?;
        match plane.line_intersection(line) {
            PlaneIntersection::Point { point, parameter }
                if self.is_point_in_polygon(&point, PipMode::Spatial) =>
            {
                Some((point, parameter))
            }
            _ => None,
        }
    }
}

/// Whether the edge `a`-`b` is crossed by the ray running from `p` towards
/// +x.
fn crosses_ray(a: [f64; 2], b: [f64; 2], p: [f64; 2]) -> bool {
    if a[1] == b[1] {
        return false;
    }
    // Half-open in y so a vertex on the ray is counted once.
    if (a[1] > p[1]) == (b[1] > p[1]) {
        return false;
    }

    let x = if a[0] == b[0] {
        a[0]
    } else {
        let slope = (b[1] - a[1]) / (b[0] - a[0]);
        let intercept = a[1] - slope * a[0];
        (p[1] - intercept) / slope
    };
    if x < p[0] {
        return false;
    }

    let hit = [x, p[1]];
    let dist = |u: [f64; 2], v: [f64; 2]| (u[0] - v[0]).hypot(u[1] - v[1]);
    (dist(a, hit) + dist(hit, b) - dist(a, b)).abs() < SEGMENT_EPSILON
}

impl PartialEq for Polygon {
    fn eq(&self, other: &Self) -> bool {
        self.points == other.points && self.plane == other.plane && self.surface == other.surface
    }
}
