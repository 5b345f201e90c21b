//! Coordinate types and conversions.

use cgmath::{Point2, Point3, Vector3};
use std::f64::consts::PI;

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 3D point
pub type Point3d = Point3<f64>;

/// A 3D vector
pub type Vector3d = Vector3<f64>;

/// Computes the unit heading vector of an object facing `angle` (yaw, counter-clockwise
/// from east) and pitched by `elevation`, both in radians.
///
/// The y component is negated since world coordinates grow downwards.
pub fn heading_vector(angle: f64, elevation: f64) -> Vector3d {
    Vector3d::new(
        elevation.cos() * angle.cos(),
        -elevation.cos() * angle.sin(),
        elevation.sin(),
    )
}

/// Wraps an angle in radians into `[-π, π)`.
pub fn normalize_angle(mut angle: f64) -> f64 {
    while angle < -PI {
        angle += 2.0 * PI;
    }
    while angle >= PI {
        angle -= 2.0 * PI;
    }
    angle
}
