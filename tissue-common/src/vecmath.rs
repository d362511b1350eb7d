use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};

/// One of the three coordinate axes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];
}

/// A simple 3D vector struct.
#[derive(Debug, Copy, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// Creates a new Vec3.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vec3 { x, y, z }
    }

    /// Creates a zero vector.
    pub fn zero() -> Self {
        Vec3 { x: 0.0, y: 0.0, z: 0.0 }
    }

    /// Creates a vector with all three components set to `value`.
    pub fn splat(value: f64) -> Self {
        Vec3 { x: value, y: value, z: value }
    }

    pub fn from_array(v: [f64; 3]) -> Self {
        Vec3 { x: v[0], y: v[1], z: v[2] }
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Returns the component along `axis`.
    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Sets the component along `axis`.
    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }

    /// Calculates the squared length (magnitude) of the vector.
    pub fn length_squared(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Calculates the length (magnitude) of the vector.
    pub fn length(&self) -> f64 {
        self.length_squared().sqrt()
    }

    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn scale(&self, scalar: f64) -> Self {
        Vec3 { x: self.x * scalar, y: self.y * scalar, z: self.z * scalar }
    }

    /// Clamps every component into `[min, max]`.
    pub fn clamp_components(&self, min: f64, max: f64) -> Self {
        Vec3 {
            x: clamp(self.x, min, max),
            y: clamp(self.y, min, max),
            z: clamp(self.z, min, max),
        }
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self { x: self.x + other.x, y: self.y + other.y, z: self.z + other.z }
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, other: Self) -> Self {
        Self { x: self.x - other.x, y: self.y - other.y, z: self.z - other.z }
    }
}

impl Mul<f64> for Vec3 {
    type Output = Self;
    fn mul(self, scalar: f64) -> Self {
        self.scale(scalar)
    }
}

/// Clamps a value between a minimum and maximum.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.max(min).min(max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_accessors_address_the_right_component() {
        let mut v = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(v.get(Axis::Y), 2.0);
        v.set(Axis::Z, -4.0);
        assert_eq!(v, Vec3::new(1.0, 2.0, -4.0));
    }

    #[test]
    fn length_of_a_pythagorean_triple() {
        assert_eq!(Vec3::new(3.0, 0.0, 4.0).length(), 5.0);
        assert_eq!((Vec3::splat(2.0) - Vec3::splat(2.0)).length(), 0.0);
    }

    #[test]
    fn clamp_components_keeps_inside_box() {
        let v = Vec3::new(-5.0, 50.0, 700.0).clamp_components(0.0, 600.0);
        assert_eq!(v, Vec3::new(0.0, 50.0, 600.0));
    }
}
