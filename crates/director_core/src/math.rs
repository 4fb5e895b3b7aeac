//! Planar vector math for steering, tethers and spawn placement.
//!
//! The director works on the ground plane only; height is the host's concern.
//! All director math runs on the single authoritative server, so plain `f32`
//! is sufficient. Reproducibility across runs comes from the seeded RNG and the
//! fixed tick order, not from fixed-point arithmetic.

use serde::{Deserialize, Serialize};

/// 2D vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate (ground-plane depth).
    pub y: f32,
}

impl Vec2 {
    /// Zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` radians (0 = +X, counter-clockwise).
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize, returning zero for degenerate input.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= f32::EPSILON || !len.is_finite() {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len)
    }

    /// Rotate counter-clockwise by `angle` radians.
    #[must_use]
    pub fn rotate(self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Counter-clockwise perpendicular.
    #[must_use]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Multiply by a scalar.
    #[must_use]
    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    /// Shorten the vector to `max_len` if it is longer.
    #[must_use]
    pub fn clamp_length(self, max_len: f32) -> Self {
        let len = self.length();
        if len > max_len && len > f32::EPSILON {
            self.scale(max_len / len)
        } else {
            self
        }
    }

    /// Whether both components are finite.
    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Mean of a set of points, `None` when the set is empty.
    pub fn centroid<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        let mut sum = Self::ZERO;
        let mut count = 0_u32;
        for p in points {
            sum = sum + p;
            count += 1;
        }
        (count > 0).then(|| sum.scale(1.0 / count as f32))
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Clamp into `[0, 1]`, mapping NaN to 0.
#[must_use]
pub fn clamp01(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Scalar linear interpolation.
#[must_use]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-4
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2::new(3.0, 0.0);
        let b = Vec2::new(0.0, 4.0);
        // 3² + 4² = 25
        assert!(approx(a.distance_squared(b), 25.0));
        assert!(approx(a.distance(b), 5.0));
    }

    #[test]
    fn test_vec2_normalize() {
        let n = Vec2::new(3.0, 4.0).normalize();
        assert!(approx(n.length(), 1.0));
        assert!(approx(n.x * 4.0, n.y * 3.0), "direction not preserved");
        assert_eq!(Vec2::ZERO.normalize(), Vec2::ZERO);
    }

    #[test]
    fn test_vec2_rotate_quarter_turn() {
        let r = Vec2::new(1.0, 0.0).rotate(std::f32::consts::FRAC_PI_2);
        assert!(approx(r.x, 0.0));
        assert!(approx(r.y, 1.0));
    }

    #[test]
    fn test_clamp_length() {
        let v = Vec2::new(10.0, 0.0).clamp_length(4.0);
        assert!(approx(v.x, 4.0));
        let short = Vec2::new(1.0, 1.0);
        assert_eq!(short.clamp_length(4.0), short);
    }

    #[test]
    fn test_centroid() {
        assert_eq!(Vec2::centroid(std::iter::empty()), None);
        let c = Vec2::centroid([Vec2::new(0.0, 0.0), Vec2::new(4.0, 2.0)]);
        assert_eq!(c, Some(Vec2::new(2.0, 1.0)));
    }

    #[test]
    fn test_clamp01_handles_nan() {
        assert_eq!(clamp01(f32::NAN), 0.0);
        assert_eq!(clamp01(1.7), 1.0);
        assert_eq!(clamp01(-0.2), 0.0);
    }
}
