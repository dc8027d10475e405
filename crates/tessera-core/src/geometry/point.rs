use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EPSILON, normalize_angle, to_deg, to_rad};

/// A 2D point representing a position in diagram coordinate space.
///
/// Points use `f64` coordinates and provide operations for basic vector math.
/// The coordinate system has origin at top-left with Y increasing downward,
/// (see [module documentation](super) for details).
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::Point;
/// let p1 = Point::new(10.0, 20.0);
/// let p2 = Point::new(5.0, 5.0);
///
/// // Vector addition
/// let sum = p1.add_point(p2);
/// assert_eq!(sum.x(), 15.0);
/// assert_eq!(sum.y(), 25.0);
///
/// // Midpoint calculation
/// let mid = p1.midpoint(p2);
/// assert_eq!(mid.x(), 7.5);
/// assert_eq!(mid.y(), 12.5);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    x: f64,
    y: f64,
}

impl Point {
    /// Creates a new point with the specified coordinates
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Returns the x-coordinate of the point
    pub fn x(self) -> f64 {
        self.x
    }

    /// Returns the y-coordinate of the point
    pub fn y(self) -> f64 {
        self.y
    }

    /// Creates a new point with the specified x-coordinate
    pub fn with_x(mut self, x: f64) -> Self {
        self.x = x;
        self
    }

    /// Creates a new point with the specified y-coordinate
    pub fn with_y(mut self, y: f64) -> Self {
        self.y = y;
        self
    }

    /// Checks if both x and y coordinates are zero
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Returns `true` when both coordinates are finite numbers.
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Adds another point to this point, returning a new point.
    pub fn add_point(self, other: Point) -> Self {
        Self {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Subtracts another point from this point, returning a new point
    pub fn sub_point(self, other: Point) -> Self {
        Self {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    /// Moves the point by the given deltas.
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Calculates the midpoint between this point and another point
    pub fn midpoint(self, other: Point) -> Self {
        Self {
            x: (self.x + other.x) / 2.0,
            y: (self.y + other.y) / 2.0,
        }
    }

    /// Calculates the hypotenuse (Euclidean distance from origin)
    pub fn hypot(self) -> f64 {
        self.x.hypot(self.y)
    }

    /// Multiplies both coordinates by the given factor.
    pub fn scale(self, factor: f64) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    /// Scales the point relative to `origin` by independent factors.
    pub fn scale_around(self, sx: f64, sy: f64, origin: Point) -> Self {
        Self {
            x: origin.x + (self.x - origin.x) * sx,
            y: origin.y + (self.y - origin.y) * sy,
        }
    }

    /// Euclidean distance to another point.
    pub fn distance(self, other: Point) -> f64 {
        self.sub_point(other).hypot()
    }

    /// Squared Euclidean distance, cheaper when only comparing distances.
    pub fn squared_distance(self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Dot product treating both points as vectors.
    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// 2D cross product (z component) treating both points as vectors.
    pub fn cross(self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Linear interpolation between this point (`t = 0`) and `other` (`t = 1`).
    pub fn lerp(self, other: Point, t: f64) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Angle in degrees of the vector from this point to `other`, in `[0, 360)`.
    ///
    /// Measured from the positive x-axis, clockwise on screen.
    pub fn theta(self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        if dx.abs() < EPSILON && dy.abs() < EPSILON {
            return 0.0;
        }
        normalize_angle(to_deg(dy.atan2(dx)))
    }

    /// Rotates the point around `origin` by `angle` degrees.
    ///
    /// Positive angles rotate clockwise on screen, matching SVG `rotate()`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use tessera_core::geometry::Point;
    /// let p = Point::new(10.0, 0.0).rotate(Point::new(0.0, 0.0), 90.0);
    /// assert!((p.x() - 0.0).abs() < 1e-9);
    /// assert!((p.y() - 10.0).abs() < 1e-9);
    /// ```
    pub fn rotate(self, origin: Point, angle: f64) -> Self {
        if angle == 0.0 {
            return self;
        }
        let (sin, cos) = to_rad(angle).sin_cos();
        let dx = self.x - origin.x;
        let dy = self.y - origin.y;
        Self {
            x: origin.x + dx * cos - dy * sin,
            y: origin.y + dx * sin + dy * cos,
        }
    }

    /// Moves the point by `distance` along the direction from `from` to this point.
    ///
    /// A negative distance moves the point toward `from`. When both points
    /// coincide the direction is undefined and the point is returned as is.
    pub fn move_along(self, from: Point, distance: f64) -> Self {
        let length = self.distance(from);
        if length < EPSILON {
            return self;
        }
        let ratio = distance / length;
        Self {
            x: self.x + (self.x - from.x) * ratio,
            y: self.y + (self.y - from.y) * ratio,
        }
    }

    /// Returns the point from `candidates` closest to this one.
    ///
    /// Ties keep the earliest candidate. Returns `None` for an empty slice.
    pub fn choose_closest(self, candidates: &[Point]) -> Option<Point> {
        candidates.iter().copied().fold(None, |closest, candidate| {
            match closest {
                Some(best) if self.squared_distance(best) <= self.squared_distance(candidate) => {
                    Some(best)
                }
                _ => Some(candidate),
            }
        })
    }

    /// Rounds both coordinates to the given number of decimals.
    pub fn round(self, decimals: u32) -> Self {
        let factor = 10f64.powi(decimals as i32);
        Self {
            x: (self.x * factor).round() / factor,
            y: (self.y * factor).round() / factor,
        }
    }

    /// Snaps the point to the nearest multiple of the grid sizes.
    pub fn snap_to_grid(self, grid_x: f64, grid_y: f64) -> Self {
        let snap = |value: f64, grid: f64| {
            if grid <= 0.0 {
                value
            } else {
                (value / grid).round() * grid
            }
        };
        Self {
            x: snap(self.x, grid_x),
            y: snap(self.y, grid_y),
        }
    }

    /// Compares two points allowing for floating-point noise.
    pub fn approx_eq(self, other: Point, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon && (self.y - other.y).abs() <= epsilon
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_point_new_and_accessors() {
        let p = Point::new(3.0, -4.0);
        assert_approx_eq!(f64, p.x(), 3.0);
        assert_approx_eq!(f64, p.y(), -4.0);
        assert_approx_eq!(f64, p.hypot(), 5.0);
    }

    #[test]
    fn test_point_theta() {
        let origin = Point::new(0.0, 0.0);
        assert_approx_eq!(f64, origin.theta(Point::new(10.0, 0.0)), 0.0);
        assert_approx_eq!(f64, origin.theta(Point::new(0.0, 10.0)), 90.0);
        assert_approx_eq!(f64, origin.theta(Point::new(-10.0, 0.0)), 180.0);
        assert_approx_eq!(f64, origin.theta(Point::new(0.0, -10.0)), 270.0);
    }

    #[test]
    fn test_point_rotate_round_trip() {
        let center = Point::new(50.0, 50.0);
        let p = Point::new(80.0, 60.0);
        let back = p.rotate(center, 37.0).rotate(center, -37.0);
        assert!(back.approx_eq(p, 1e-9));
    }

    #[test]
    fn test_point_move_along() {
        let p = Point::new(10.0, 0.0);
        let moved = p.move_along(Point::new(0.0, 0.0), 5.0);
        assert!(moved.approx_eq(Point::new(15.0, 0.0), 1e-9));

        let toward = p.move_along(Point::new(0.0, 0.0), -4.0);
        assert!(toward.approx_eq(Point::new(6.0, 0.0), 1e-9));
    }

    #[test]
    fn test_point_move_along_coincident() {
        let p = Point::new(1.0, 1.0);
        assert_eq!(p.move_along(p, 10.0), p);
    }

    #[test]
    fn test_choose_closest() {
        let p = Point::new(0.0, 0.0);
        let candidates = [
            Point::new(5.0, 5.0),
            Point::new(1.0, 1.0),
            Point::new(-1.0, -1.0),
        ];
        assert_eq!(p.choose_closest(&candidates), Some(Point::new(1.0, 1.0)));
        assert_eq!(p.choose_closest(&[]), None);
    }

    #[test]
    fn test_snap_to_grid() {
        let p = Point::new(14.0, 26.0).snap_to_grid(10.0, 10.0);
        assert_eq!(p, Point::new(10.0, 30.0));
        let untouched = Point::new(14.0, 26.0).snap_to_grid(0.0, 0.0);
        assert_eq!(untouched, Point::new(14.0, 26.0));
    }
}

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    fn point_strategy() -> impl Strategy<Value = Point> {
        (-1000.0f64..1000.0, -1000.0f64..1000.0).prop_map(|(x, y)| Point::new(x, y))
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Rotation preserves the distance to the rotation origin.
    fn check_rotation_preserves_distance(
        p: Point,
        origin: Point,
        angle: f64,
    ) -> Result<(), TestCaseError> {
        let rotated = p.rotate(origin, angle);
        let before = p.distance(origin);
        let after = rotated.distance(origin);
        prop_assert!((before - after).abs() < 1e-6, "{before} != {after}");
        Ok(())
    }

    /// Rotating by the angle toward a point lands on the positive x-axis.
    fn check_theta_matches_rotation(p: Point, origin: Point) -> Result<(), TestCaseError> {
        prop_assume!(p.distance(origin) > 1e-3);
        let theta = origin.theta(p);
        let aligned = p.rotate(origin, -theta);
        prop_assert!((aligned.y() - origin.y()).abs() < 1e-6);
        prop_assert!(aligned.x() >= origin.x());
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn rotation_preserves_distance(p in point_strategy(), origin in point_strategy(), angle in -720.0f64..720.0) {
            check_rotation_preserves_distance(p, origin, angle)?;
        }

        #[test]
        fn theta_matches_rotation(p in point_strategy(), origin in point_strategy()) {
            check_theta_matches_rotation(p, origin)?;
        }
    }
}
