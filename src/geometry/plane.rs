use super::{GeometryError, Line, PARALLEL_EPSILON, PLANE_EPSILON, Vector};

/// Outcome of intersecting a line with a plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaneIntersection {
    /// Single intersection `point` at line parameter `parameter`.
    Point { point: Vector, parameter: f64 },
    LineOnPlane,
    Parallel,
}

/// Plane `a*x + b*y + c*z + n = 0`, always stored with a unit normal so
/// that [`Plane::distance_to_point`] is in metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    normal: Vector,
    n: f64,
}

impl Plane {
    pub fn from_three_points(p1: Vector, p2: Vector, p3: Vector) -> Result<Self, GeometryError> {
        Self::from_base_and_vectors(p1, p2 - p1, p3 - p1)
    }

    /// Plane through `base` spanned by `v1` and `v2`.
    pub fn from_base_and_vectors(
        base: Vector,
        v1: Vector,
        v2: Vector,
    ) -> Result<Self, GeometryError> {
        if v1.length() == 0.0 || v2.length() == 0.0 {
            return Err(GeometryError::ZeroLength);
        }
        if v1.linear_dependant(&v2) {
            return Err(GeometryError::LinearlyDependent);
        }
        let normal = v1
            .cross(&v2)
            .normalized()
            .ok_or(GeometryError::LinearlyDependent)?;

        Ok(Self {
            normal,
            n: -normal.dot(&base),
        })
    }

    /// Plane from raw coefficients; they are rescaled to a unit normal.
    pub fn from_coefficients(a: f64, b: f64, c: f64, n: f64) -> Result<Self, GeometryError> {
        let raw = Vector::new(a, b, c);
        let len = raw.length();
        if len == 0.0 {
            return Err(GeometryError::ZeroLength);
        }
        Ok(Self {
            normal: raw / len,
            n: n / len,
        })
    }

    /// Plane from already normalized stored coefficients, as written by
    /// [`Plane::coefficients`]. Fails unless the normal has unit length.
    pub(crate) fn from_unit_coefficients(coefficients: [f64; 4]) -> Result<Self, GeometryError> {
        let [a, b, c, n] = coefficients;
        let normal = Vector::new(a, b, c);
        if (normal.length() - 1.0).abs() > 1e-9 {
            return Err(GeometryError::ZeroLength);
        }
        Ok(Self { normal, n })
    }

    /// The horizontal plane `z = height`.
    pub fn horizontal(height: f64) -> Self {
        Self {
            normal: Vector::new(0.0, 0.0, 1.0),
            n: -height,
        }
    }

    pub fn normal(&self) -> Vector {
        self.normal
    }

    pub fn offset(&self) -> f64 {
        self.n
    }

    /// Coefficients `[a, b, c, n]`.
    pub fn coefficients(&self) -> [f64; 4] {
        [self.normal.x, self.normal.y, self.normal.z, self.n]
    }

    pub fn distance_to_point(&self, p: &Vector) -> f64 {
        (self.normal.dot(p) + self.n).abs()
    }

    pub fn is_point_on_plane(&self, p: &Vector) -> bool {
        self.distance_to_point(p) < PLANE_EPSILON
    }

    pub fn line_intersection(&self, line: &Line) -> PlaneIntersection {
        let denom = self.normal.dot(&line.direction());
        if denom.abs() < PARALLEL_EPSILON {
            return if self.is_point_on_plane(&line.base()) {
                PlaneIntersection::LineOnPlane
            } else {
                PlaneIntersection::Parallel
            };
        }

        let parameter = -(self.normal.dot(&line.base()) + self.n) / denom;
        PlaneIntersection::Point {
            point: line.point_at(parameter),
            parameter,
        }
    }

    /// Mirror `incoming` at this plane.
    ///
    /// The reflected line starts at the hit point and runs through the
    /// mirror image of a point one parameter unit past the hit.
    pub fn reflect_line(&self, incoming: &Line) -> Result<Line, GeometryError> {
        let (hit, parameter) = match self.line_intersection(incoming) {
            PlaneIntersection::Point { point, parameter } => (point, parameter),
            PlaneIntersection::LineOnPlane => return Err(GeometryError::LineOnPlane),
            PlaneIntersection::Parallel => return Err(GeometryError::LineParallelToPlane),
        };

        let aux = incoming.point_at(parameter + 1.0);
        let plumb = Line::from_base_and_vector(aux, self.normal)?;
        let foot = match self.line_intersection(&plumb) {
            PlaneIntersection::Point { point, .. } => point,
            _ => return Err(GeometryError::NoIntersection),
        };

        let mirrored = foot + (foot - aux);
        Line::from_two_points(hit, mirrored)
    }
}
