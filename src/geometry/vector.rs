use std::ops::{Add, Div, Mul, Neg, Sub};

use glam::{DMat3, DVec3};
use serde::Serialize;

/// Per-axis magnitude below which two unit components are treated as
/// having the same sign in [`Vector::linear_dependant`].
const NEAR_ZERO: f64 = 0.02;

/// Relative mismatch allowed between absolute unit components in
/// [`Vector::linear_dependant`].
const DIRECTION_TOLERANCE: f64 = 0.05;

/// Absolute mismatch between unit components that is always accepted;
/// rounding noise on components that should be zero.
const COMPONENT_NOISE: f64 = 1e-9;

/// A 3-D point or direction.
///
/// Equality is exact per axis. Use [`Vector::linear_dependant`] for the
/// tolerant directional comparison.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector {
    pub const ZERO: Vector = Vector::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn dot(&self, other: &Vector) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector) -> Vector {
        Vector::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Unit-length copy, or `None` for the zero vector.
    pub fn normalized(&self) -> Option<Vector> {
        let len = self.length();
        (len > 0.0).then(|| *self / len)
    }

    /// Euclidean distance between two points.
    pub fn distance(&self, other: &Vector) -> f64 {
        (*self - *other).length()
    }

    /// Horizontal (x/y) distance between two points.
    pub fn distance_2d(&self, other: &Vector) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Rotate about the vertical axis by `alpha`, then about the horizontal
    /// y axis by `beta` (radians).
    ///
    /// `rotate(-alpha, -beta)` with `alpha = atan2(n.y, n.x)` and
    /// `beta = π/2 - atan2(n.z, |n.xy|)` maps the unit normal `n` onto +z.
    pub fn rotate(&self, alpha: f64, beta: f64) -> Vector {
        let m = DMat3::from_rotation_y(beta) * DMat3::from_rotation_z(alpha);
        Vector::from(m * DVec3::from(*self))
    }

    /// Whether the two vectors point in the same or opposite direction
    /// within tolerance.
    pub fn linear_dependant(&self, other: &Vector) -> bool {
        let (Some(a), Some(b)) = (self.normalized(), other.normalized()) else {
            return false;
        };

        let mut all_nonneg = true;
        let mut all_nonpos = true;
        for (ai, bi) in a.as_array().into_iter().zip(b.as_array()) {
            let (aa, ba) = (ai.abs(), bi.abs());
            let allowed = (DIRECTION_TOLERANCE * aa.max(ba)).max(COMPONENT_NOISE);
            if (aa - ba).abs() > allowed {
                return false;
            }

            // Both near zero: the sign is noise.
            if aa < NEAR_ZERO && ba < NEAR_ZERO {
                continue;
            }
            let product = ai * bi;
            all_nonneg &= product >= 0.0;
            all_nonpos &= product <= 0.0;
        }

        all_nonneg || all_nonpos
    }
}

impl From<DVec3> for Vector {
    fn from(v: DVec3) -> Self {
        Vector::new(v.x, v.y, v.z)
    }
}

impl From<Vector> for DVec3 {
    fn from(v: Vector) -> Self {
        DVec3::new(v.x, v.y, v.z)
    }
}

impl std::fmt::Display for Vector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, rhs: f64) -> Vector {
        Vector::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl Div<f64> for Vector {
    type Output = Vector;

    fn div(self, rhs: f64) -> Vector {
        Vector::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl Neg for Vector {
    type Output = Vector;

    fn neg(self) -> Vector {
        Vector::new(-self.x, -self.y, -self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn arithmetic() {
        let a = Vector::new(1.0, 2.0, 3.0);
        let b = Vector::new(-1.0, 0.5, 2.0);
        assert_eq!(a + b, Vector::new(0.0, 2.5, 5.0));
        assert_eq!(a - b, Vector::new(2.0, 1.5, 1.0));
        assert_eq!(a * 2.0, Vector::new(2.0, 4.0, 6.0));
        assert_eq!(a / 2.0, Vector::new(0.5, 1.0, 1.5));
        assert_eq!(-a, Vector::new(-1.0, -2.0, -3.0));
    }

    #[test]
    fn equality_is_exact() {
        let a = Vector::new(1.0, 2.0, 3.0);
        assert_eq!(a, Vector::new(1.0, 2.0, 3.0));
        assert_ne!(a, Vector::new(1.0, 2.0, 3.000_000_1));
    }

    #[test]
    fn length_and_cross() {
        assert_abs_diff_eq!(Vector::new(3.0, 4.0, 12.0).length(), 13.0);
        let x = Vector::new(1.0, 0.0, 0.0);
        let y = Vector::new(0.0, 1.0, 0.0);
        assert_eq!(x.cross(&y), Vector::new(0.0, 0.0, 1.0));
        assert_eq!(Vector::ZERO.normalized(), None);
    }

    #[test]
    fn linear_dependant_self_and_scaled() {
        let v = Vector::new(0.3, -1.7, 2.2);
        assert!(v.linear_dependant(&v));
        for k in [2.5, -1.0, -0.001, 1e6] {
            assert!(v.linear_dependant(&(v * k)), "k = {k}");
            assert!((v * k).linear_dependant(&v), "symmetric, k = {k}");
        }
    }

    #[test]
    fn linear_dependant_rejects_other_directions() {
        let a = Vector::new(1.0, 1.0, 0.0);
        assert!(!a.linear_dependant(&Vector::new(1.0, -1.0, 0.0)));
        assert!(!a.linear_dependant(&Vector::new(1.0, 0.0, 0.0)));
        assert!(!Vector::new(1.0, 0.0, 0.0).linear_dependant(&Vector::new(0.0, 1.0, 0.0)));
        assert!(!a.linear_dependant(&Vector::ZERO));
    }

    #[test]
    fn linear_dependant_ignores_noise_near_zero() {
        let a = Vector::new(1.0, 0.0, 0.001);
        let b = Vector::new(-2.0, 0.0, 0.002);
        assert!(a.linear_dependant(&b));
    }

    #[test]
    fn linear_dependant_compares_small_components() {
        let x = Vector::new(1.0, 0.0, 0.0);
        assert!(!x.linear_dependant(&Vector::new(1.0, 0.0, 0.019)));
        assert!(!Vector::new(1.0, 0.0, 0.015).linear_dependant(&Vector::new(1.0, 0.0, -0.001)));
        assert!(x.linear_dependant(&Vector::new(1.0, 1e-14, -1e-14)));
        assert!(Vector::new(1.0, 0.0, 0.01).linear_dependant(&Vector::new(-1.0, 0.0, 0.0101)));
    }

    #[test]
    fn rotation_aligns_normal_with_vertical() {
        let n = Vector::new(-1.0, 1.0, 1.0).normalized().unwrap();
        let alpha = n.y.atan2(n.x);
        let beta = FRAC_PI_2 - n.z.atan2(n.x.hypot(n.y));
        let r = n.rotate(-alpha, -beta);
        assert_abs_diff_eq!(r.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.y, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn rotation_preserves_length() {
        let v = Vector::new(3.0, -2.0, 7.0);
        let r = v.rotate(0.7, -1.3);
        assert_abs_diff_eq!(r.length(), v.length(), epsilon = 1e-12);
    }
}
