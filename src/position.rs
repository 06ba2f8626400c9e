use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub};

/// A point or direction in world space. `y` is the world-up axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    pub const UP: Self = Self::new(0.0, 1.0, 0.0);
    pub const DOWN: Self = Self::new(0.0, -1.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).length()
    }

    pub fn distance_squared(&self, other: &Self) -> f64 {
        (*self - *other).length_squared()
    }

    /// Distance ignoring the vertical axis.
    pub fn distance_xz(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.z - other.z)
    }

    pub fn dot(&self, other: &Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(&self) -> f64 {
        self.x.powi(2) + self.y.powi(2) + self.z.powi(2)
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len == 0.0 {
            return Self::ZERO;
        }
        Self::new(self.x / len, self.y / len, self.z / len)
    }

    pub fn lerp(&self, other: &Self, t: f64) -> Self {
        *self + (*other - *self) * t
    }

    pub fn midpoint(&self, other: &Self) -> Self {
        (*self + *other) * 0.5
    }

    /// Projection onto the ground plane, `y` zeroed.
    pub const fn flatten(&self) -> Self {
        Self::new(self.x, 0.0, self.z)
    }

    pub fn approx_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.distance(other) <= tolerance
    }

    /// Moves `self` toward `target` by `max_step`, never overshooting it.
    pub fn move_towards(&self, target: &Self, max_step: f64) -> Self {
        let delta = *target - *self;
        let len = delta.length();
        if len <= max_step || len == 0.0 {
            return *target;
        }
        *self + delta * (max_step / len)
    }
}

impl Add for Position {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl AddAssign for Position {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for Position {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Mul<f64> for Position {
    type Output = Self;

    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar, self.z * scalar)
    }
}

impl Div<f64> for Position {
    type Output = Self;

    fn div(self, scalar: f64) -> Self {
        Self::new(self.x / scalar, self.y / scalar, self.z / scalar)
    }
}

impl Neg for Position {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Closest point to `point` on the segment `a`-`b`.
pub fn closest_point_on_segment(point: &Position, a: &Position, b: &Position) -> Position {
    let ab = *b - *a;
    let len_sq = ab.length_squared();
    if len_sq < f64::EPSILON {
        return *a;
    }
    let t = ((*point - *a).dot(&ab) / len_sq).clamp(0.0, 1.0);
    *a + ab * t
}

/// Distance from `point` to the infinite line through `a` and `b`.
/// Degenerates to the distance to `a` when the line has no length.
pub fn distance_to_line(point: &Position, a: &Position, b: &Position) -> f64 {
    let line = *b - *a;
    let to_point = *point - *a;
    let len_sq = line.length_squared();
    if len_sq < f64::EPSILON {
        return to_point.length();
    }
    to_point.cross(&line).length() / len_sq.sqrt()
}

#[allow(clippy::cast_precision_loss)]
/// Average of all points.
pub fn centroid(points: &[Position]) -> Position {
    if points.is_empty() {
        return Position::ZERO;
    }
    let sum = points.iter().fold(Position::ZERO, |acc, p| acc + *p);
    sum / points.len() as f64
}
