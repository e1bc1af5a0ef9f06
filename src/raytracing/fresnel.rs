//! Ground-projected Fresnel-zone search footprint.

use crate::geometry::{GeometryError, Plane, Polygon, SurfaceType, Vector};

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Angular step between footprint vertices in degrees.
pub const ELLIPSE_STEP_DEG: f64 = 5.0;

/// Radius of Fresnel zone `zone` at the midpoint of a path of length
/// `distance` metres for a carrier of `frequency` Hz.
pub fn fresnel_radius(zone: u32, frequency: f64, distance: f64) -> f64 {
    let wavelength = SPEED_OF_LIGHT / frequency;
    (zone as f64 * wavelength * distance / 4.0).sqrt()
}

/// Ellipse around the path `start`-`end` on the plane `z = 0`.
///
/// The semi-major axis `sqrt(r² + (d/2)²)` runs along the path azimuth
/// through its midpoint, the semi-minor axis is `radius`.
pub fn fresnel_zone(start: &Vector, end: &Vector, radius: f64) -> Result<Polygon, GeometryError> {
    let d = start.distance(end);
    if d == 0.0 {
        return Err(GeometryError::PointsIdentical);
    }
    if !(radius > 0.0) {
        return Err(GeometryError::ZeroLength);
    }

    let semi_major = (radius * radius + (d / 2.0).powi(2)).sqrt();
    let semi_minor = radius;
    let azimuth = (end.y - start.y).atan2(end.x - start.x);
    let (sin_az, cos_az) = azimuth.sin_cos();
    let mid = (*start + *end) / 2.0;

    let mut footprint = Polygon::new(Plane::horizontal(0.0), SurfaceType::Other);
    let vertices = (360.0 / ELLIPSE_STEP_DEG) as usize;
    for k in 0..vertices {
        let theta = (k as f64 * ELLIPSE_STEP_DEG).to_radians();
        let u = semi_major * theta.cos();
        let v = semi_minor * theta.sin();
        footprint.add_point(Vector::new(
            mid.x + u * cos_az - v * sin_az,
            mid.y + u * sin_az + v * cos_az,
            0.0,
        ))?;
    }
    Ok(footprint)
}
