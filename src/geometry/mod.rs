//! Epsilon-tolerant 3-D geometry kernel: vectors, lines, planes and planar
//! polygons.
//!
//! All values are `f64` UTM metres (x = easting, y = northing, z = altitude).

pub mod line;
pub mod plane;
pub mod polygon;
pub mod vector;

pub use line::{Line, LineIntersection};
pub use plane::{Plane, PlaneIntersection};
pub use polygon::{PipMode, Polygon, SurfaceType};
pub use vector::Vector;

/// Distance below which a point counts as lying on a plane (metres).
pub const PLANE_EPSILON: f64 = 0.01;

/// `|direction · normal|` below which a line counts as parallel to a plane.
pub const PARALLEL_EPSILON: f64 = 0.001;

/// Agreement required between per-axis line parameters of an intersection.
pub const PARAMETER_EPSILON: f64 = 0.01;

/// Tolerance of the sub-segment length test in point-in-polygon, and the
/// distance within which a point lies on a line (metres).
pub const SEGMENT_EPSILON: f64 = 0.001;

/// Share of a direction's length below which one of its components
/// counts as zero.
pub const COORD_EPSILON: f64 = 1e-9;

/// Failures of geometric constructions and queries.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    #[error("vector has zero length")]
    ZeroLength,
    #[error("points are identical")]
    PointsIdentical,
    #[error("spanning vectors are linearly dependent")]
    LinearlyDependent,
    #[error("line is parallel to plane")]
    LineParallelToPlane,
    #[error("line lies on plane")]
    LineOnPlane,
    #[error("no intersection found")]
    NoIntersection,
    #[error("polygon has no base plane")]
    PolygonNotInitialized,
    #[error("point is not on the polygon's base plane")]
    PointNotOnBasePlane,
    #[error("point already part of polygon")]
    PointDuplicate,
}
