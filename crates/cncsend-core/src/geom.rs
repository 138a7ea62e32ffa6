//! 3-axis geometry primitives
//!
//! All coordinates are canonical millimeters once they leave the
//! interpreter; the device reports the same three axes.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Sub};

/// A point (or vector) in machine space, millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A straight segment between two points.
pub type Segment = [Point3; 2];

impl Point3 {
    pub const ZERO: Point3 = Point3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    /// Create a new point
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean length of this vector
    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Euclidean distance to another point
    pub fn distance_to(&self, other: &Point3) -> f64 {
        (*other - *self).length()
    }

    /// Copy with z forced to zero (projection onto the XY plane)
    pub fn flattened(&self) -> Point3 {
        Point3::new(self.x, self.y, 0.0)
    }

    /// Z component of the cross product (sufficient for planar winding tests)
    pub fn cross_z(&self, other: &Point3) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Unsigned angle to another vector, radians.
    ///
    /// Returns 0.0 when either vector is degenerate so callers never see NaN.
    pub fn angle_to(&self, other: &Point3) -> f64 {
        let denom = self.length() * other.length();
        if denom == 0.0 {
            return 0.0;
        }
        let dot = self.x * other.x + self.y * other.y + self.z * other.z;
        (dot / denom).clamp(-1.0, 1.0).acos()
    }

    /// Rotate about the Z axis by `theta` radians (counter-clockwise positive)
    pub fn rotated_z(&self, theta: f64) -> Point3 {
        let (sin, cos) = theta.sin_cos();
        Point3::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
            self.z,
        )
    }

    /// Per-axis component access by index (0=X, 1=Y, 2=Z)
    pub fn axis(&self, index: usize) -> f64 {
        match index {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Per-axis component update by index (0=X, 1=Y, 2=Z)
    pub fn set_axis(&mut self, index: usize, value: f64) {
        match index {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
    }

    /// Component-wise minimum
    pub fn min(&self, other: &Point3) -> Point3 {
        Point3::new(
            self.x.min(other.x),
            self.y.min(other.y),
            self.z.min(other.z),
        )
    }

    /// Component-wise maximum
    pub fn max(&self, other: &Point3) -> Point3 {
        Point3::new(
            self.x.max(other.x),
            self.y.max(other.y),
            self.z.max(other.z),
        )
    }
}

impl Add for Point3 {
    type Output = Point3;

    fn add(self, rhs: Point3) -> Point3 {
        Point3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Point3 {
    fn add_assign(&mut self, rhs: Point3) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Point3 {
    type Output = Point3;

    fn sub(self, rhs: Point3) -> Point3 {
        Point3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Point3 {
    type Output = Point3;

    fn mul(self, rhs: f64) -> Point3 {
        Point3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::fmt::Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3},{:.3},{:.3})", self.x, self.y, self.z)
    }
}
