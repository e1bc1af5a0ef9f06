use super::{COORD_EPSILON, GeometryError, PARAMETER_EPSILON, SEGMENT_EPSILON, Vector};

/// Outcome of intersecting two lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineIntersection {
    /// The lines meet at `point`, reached at `parameter` on the local line.
    Point { point: Vector, parameter: f64 },
    /// Same direction, different lines.
    Parallel,
    /// Both describe the same infinite line.
    Identical,
    /// Skew lines.
    Disjoint,
}

/// Infinite line `base + t * direction`.
///
/// Equality compares the described point sets: two lines are equal when
/// their directions are linearly dependent and each base lies on the other.
#[derive(Debug, Clone, Copy)]
pub struct Line {
    base: Vector,
    direction: Vector,
}

impl Line {
    pub fn from_two_points(p1: Vector, p2: Vector) -> Result<Self, GeometryError> {
        if p1 == p2 {
            return Err(GeometryError::PointsIdentical);
        }
        Ok(Self {
            base: p1,
            direction: p2 - p1,
        })
    }

    pub fn from_base_and_vector(base: Vector, direction: Vector) -> Result<Self, GeometryError> {
        if direction.length() == 0.0 {
            return Err(GeometryError::ZeroLength);
        }
        Ok(Self { base, direction })
    }

    pub fn base(&self) -> Vector {
        self.base
    }

    pub fn direction(&self) -> Vector {
        self.direction
    }

    /// Point at parameter `t`.
    pub fn point_at(&self, t: f64) -> Vector {
        self.base + self.direction * t
    }

    /// Whether `p` lies on the line, i.e. within [`SEGMENT_EPSILON`] metres
    /// of it.
    ///
    /// Measured as the perpendicular distance `|(p - base) x dir| / |dir|`.
    pub fn point_on_line(&self, p: &Vector) -> bool {
        let offset = *p - self.base;
        let distance = offset.cross(&self.direction).length() / self.direction.length();
        distance <= SEGMENT_EPSILON
    }

    /// Intersect with `other`.
    pub fn intersect(&self, other: &Line) -> LineIntersection {
        if self.direction.linear_dependant(&other.direction) {
            return if self.point_on_line(&other.base) {
                LineIntersection::Identical
            } else {
                LineIntersection::Parallel
            };
        }

        // Pick the best-conditioned pair of axes and solve
        // t*d1 - s*d2 = b2 - b1 for the other line's parameter s.
        let d1 = self.direction.as_array();
        let d2 = other.direction.as_array();
        let delta = (other.base - self.base).as_array();

        let mut best: Option<(f64, f64)> = None;
        for (i, j) in [(0, 1), (0, 2), (1, 2)] {
            let det = d2[i] * d1[j] - d1[i] * d2[j];
            if det == 0.0 {
                continue;
            }
            let s = (d1[i] * delta[j] - d1[j] * delta[i]) / det;
            if best.is_none_or(|(best_det, _)| det.abs() > best_det.abs()) {
                best = Some((det, s));
            }
        }
        let Some((_, s)) = best else {
            return LineIntersection::Disjoint;
        };

        let point = other.point_at(s);
        let p = point.as_array();
        let b1 = self.base.as_array();
        let scale = self.direction.length();

        let mut parameters = Vec::with_capacity(3);
        for axis in 0..3 {
            if d1[axis].abs() <= COORD_EPSILON * scale {
                if (p[axis] - b1[axis]).abs() > PARAMETER_EPSILON {
                    return LineIntersection::Disjoint;
                }
            } else {
                parameters.push((p[axis] - b1[axis]) / d1[axis]);
            }
        }

        let Some(&first) = parameters.first() else {
            return LineIntersection::Disjoint;
        };
        if parameters
            .iter()
            .any(|t| (t - first).abs() > PARAMETER_EPSILON)
        {
            return LineIntersection::Disjoint;
        }

        LineIntersection::Point {
            point,
            parameter: first,
        }
    }
}

impl PartialEq for Line {
    fn eq(&self, other: &Self) -> bool {
        self.direction.linear_dependant(&other.direction)
            && self.point_on_line(&other.base)
            && other.point_on_line(&self.base)
    }
}
