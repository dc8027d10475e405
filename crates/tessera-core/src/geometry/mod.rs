//! Geometric primitives for diagram layout and connection resolution.
//!
//! This module provides the pure value types used throughout Tessera for
//! positioning cells, resolving where links attach to shapes, and
//! hit-testing rendered nodes.
//!
//! # Overview
//!
//! - [`Point`] - A 2D coordinate in diagram space
//! - [`Size`] - Width and height dimensions
//! - [`Line`] - A directed segment between two points
//! - [`Rect`] - An axis-aligned rectangle
//! - [`Ellipse`] - An axis-aligned ellipse given by center and radii
//! - [`Polyline`] - An ordered list of points, optionally treated as a polygon
//! - [`Curve`] / [`Path`] - Cubic Bézier curves and SVG-like paths
//! - [`Matrix`] - Affine transforms with SVG semantics
//! - [`Shape`] - The closed set of outlines a drawable node can have
//!
//! # Coordinate System
//!
//! Tessera uses a coordinate system consistent with SVG:
//!
//! ```text
//!   (0,0) ────────► +X
//!     │
//!     │
//!     ▼
//!    +Y
//! ```
//!
//! Angles are expressed in degrees. A positive angle rotates clockwise on
//! screen, which is what SVG's `rotate()` transform does.
//!
//! # Degenerate Input
//!
//! Intersection routines never panic. A zero-length line or a zero-area
//! rectangle simply yields no intersection.

mod curve;
mod ellipse;
mod line;
mod matrix;
mod path;
mod point;
mod polyline;
mod rect;
mod shape;

pub use curve::Curve;
pub use ellipse::Ellipse;
pub use line::Line;
pub use matrix::{Matrix, TransformParseError};
pub use path::{Path, PathError, PathSegment, Segment};
pub use point::Point;
pub use polyline::Polyline;
pub use rect::{Rect, Side, Size};
pub use shape::Shape;

/// Tolerance under which lengths and determinants are treated as zero.
pub const EPSILON: f64 = 1e-9;

/// Default number of significant decimals used when subdividing curves.
pub const DEFAULT_PRECISION: u32 = 3;

/// Converts degrees to radians.
pub fn to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

/// Converts radians to degrees.
pub fn to_deg(rad: f64) -> f64 {
    rad.to_degrees()
}

/// Normalizes an angle in degrees into the half-open range `[0, 360)`.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::normalize_angle;
/// assert_eq!(normalize_angle(-90.0), 270.0);
/// assert_eq!(normalize_angle(720.0), 0.0);
/// ```
pub fn normalize_angle(deg: f64) -> f64 {
    let normalized = deg % 360.0;
    if normalized < 0.0 {
        normalized + 360.0
    } else if normalized == 0.0 {
        // Avoids -0.0 leaking out
        0.0
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_normalize_angle() {
        assert_approx_eq!(f64, normalize_angle(0.0), 0.0);
        assert_approx_eq!(f64, normalize_angle(360.0), 0.0);
        assert_approx_eq!(f64, normalize_angle(-45.0), 315.0);
        assert_approx_eq!(f64, normalize_angle(405.0), 45.0);
    }

    #[test]
    fn test_rad_deg_round_trip() {
        assert_approx_eq!(f64, to_deg(to_rad(123.0)), 123.0, epsilon = 1e-9);
    }
}
