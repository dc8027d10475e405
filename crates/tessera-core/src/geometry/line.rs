use super::{EPSILON, Point, Rect};

/// A directed line segment from `start` to `end`.
///
/// Lines are the workhorse of connection resolution: a link end is resolved
/// by intersecting the line from the opposite reference point toward the
/// anchor with the outline of the connected shape.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::{Line, Point};
/// let a = Line::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
/// let b = Line::new(Point::new(0.0, 10.0), Point::new(10.0, 0.0));
///
/// let hit = a.intersection_with_line(&b).unwrap();
/// assert!(hit.approx_eq(Point::new(5.0, 5.0), 1e-9));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Line {
    start: Point,
    end: Point,
}

impl Line {
    /// Creates a new line between two points.
    pub fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Returns the starting point.
    pub fn start(&self) -> Point {
        self.start
    }

    /// Returns the ending point.
    pub fn end(&self) -> Point {
        self.end
    }

    /// Returns the line with its endpoints swapped.
    pub fn reversed(&self) -> Self {
        Self::new(self.end, self.start)
    }

    /// Returns the direction vector `end - start`.
    pub fn vector(&self) -> Point {
        self.end.sub_point(self.start)
    }

    /// Length of the segment.
    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Squared length of the segment.
    pub fn squared_length(&self) -> f64 {
        self.start.squared_distance(self.end)
    }

    /// Returns `true` when the segment has (numerically) zero length.
    pub fn is_degenerate(&self) -> bool {
        self.squared_length() < EPSILON * EPSILON
    }

    /// Angle of the line direction in degrees, in `[0, 360)`.
    pub fn angle(&self) -> f64 {
        self.start.theta(self.end)
    }

    /// Midpoint of the segment.
    pub fn midpoint(&self) -> Point {
        self.start.midpoint(self.end)
    }

    /// Point at the normalized position `t`, clamped to `[0, 1]`.
    pub fn point_at(&self, t: f64) -> Point {
        self.start.lerp(self.end, t.clamp(0.0, 1.0))
    }

    /// Point at the given distance from the start.
    ///
    /// A negative length is measured backwards from the end. The result is
    /// clamped to the segment.
    pub fn point_at_length(&self, length: f64) -> Point {
        let total = self.length();
        if total < EPSILON {
            return self.start;
        }
        let from_start = if length < 0.0 { total + length } else { length };
        self.point_at(from_start / total)
    }

    /// Normalized position of the point on the segment closest to `p`.
    pub fn closest_point_normalized_length(&self, p: Point) -> f64 {
        let squared = self.squared_length();
        if squared < EPSILON * EPSILON {
            return 0.0;
        }
        let t = p.sub_point(self.start).dot(self.vector()) / squared;
        t.clamp(0.0, 1.0)
    }

    /// Point on the segment closest to `p`.
    pub fn closest_point(&self, p: Point) -> Point {
        self.point_at(self.closest_point_normalized_length(p))
    }

    /// Distance from `p` to the segment.
    pub fn distance_to_point(&self, p: Point) -> f64 {
        self.closest_point(p).distance(p)
    }

    /// Intersection point of two segments.
    ///
    /// Returns `None` for parallel, collinear or degenerate segments and when
    /// the crossing lies outside either segment.
    pub fn intersection_with_line(&self, other: &Line) -> Option<Point> {
        if self.is_degenerate() || other.is_degenerate() {
            return None;
        }
        let r = self.vector();
        let s = other.vector();
        let denominator = r.cross(s);
        if denominator.abs() < EPSILON {
            return None;
        }
        let qp = other.start.sub_point(self.start);
        let t = qp.cross(s) / denominator;
        let u = qp.cross(r) / denominator;
        // Small slack keeps hits exactly on a shared vertex
        const SLACK: f64 = 1e-12;
        if !(-SLACK..=1.0 + SLACK).contains(&t) || !(-SLACK..=1.0 + SLACK).contains(&u) {
            return None;
        }
        Some(self.start.lerp(self.end, t))
    }

    /// All intersections with the outline of a rectangle, ordered by distance
    /// from the line start. Duplicates at corners are removed.
    pub fn intersection_with_rect(&self, rect: &Rect) -> Vec<Point> {
        rect.intersection_with_line(self)
    }

    /// Returns a copy whose end is moved so the segment has the given length.
    ///
    /// A degenerate line is returned unchanged.
    pub fn set_length(&self, length: f64) -> Self {
        let current = self.length();
        if current < EPSILON {
            return *self;
        }
        let end = self.start.lerp(self.end, length / current);
        Self::new(self.start, end)
    }

    /// Rotates both endpoints around `origin` by `angle` degrees.
    pub fn rotate(&self, origin: Point, angle: f64) -> Self {
        Self::new(self.start.rotate(origin, angle), self.end.rotate(origin, angle))
    }

    /// Translates both endpoints.
    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.start.offset(dx, dy), self.end.offset(dx, dy))
    }

    /// A parallel segment shifted by `distance` along the right-hand normal.
    ///
    /// With Y pointing down, a positive distance shifts a left-to-right line
    /// downward.
    pub fn parallel(&self, distance: f64) -> Self {
        let length = self.length();
        if length < EPSILON {
            return *self;
        }
        let v = self.vector();
        let nx = -v.y() / length * distance;
        let ny = v.x() / length * distance;
        self.translate(nx, ny)
    }

    /// Axis-aligned bounding box of the segment.
    pub fn bbox(&self) -> Rect {
        Rect::from_points(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Line {
        Line::new(Point::new(x1, y1), Point::new(x2, y2))
    }

    #[test]
    fn test_line_length_and_angle() {
        let l = line(0.0, 0.0, 3.0, 4.0);
        assert_approx_eq!(f64, l.length(), 5.0);
        assert_approx_eq!(f64, line(0.0, 0.0, 0.0, 10.0).angle(), 90.0);
    }

    #[test]
    fn test_point_at_length_negative() {
        let l = line(0.0, 0.0, 10.0, 0.0);
        assert!(l.point_at_length(-2.0).approx_eq(Point::new(8.0, 0.0), 1e-9));
        assert!(l.point_at_length(25.0).approx_eq(Point::new(10.0, 0.0), 1e-9));
    }

    #[test]
    fn test_intersection_parallel_is_none() {
        let a = line(0.0, 0.0, 10.0, 0.0);
        let b = line(0.0, 5.0, 10.0, 5.0);
        assert_eq!(a.intersection_with_line(&b), None);
    }

    #[test]
    fn test_intersection_degenerate_is_none() {
        let a = line(5.0, 5.0, 5.0, 5.0);
        let b = line(0.0, 0.0, 10.0, 10.0);
        assert_eq!(a.intersection_with_line(&b), None);
        assert_eq!(b.intersection_with_line(&a), None);
    }

    #[test]
    fn test_intersection_outside_segment_is_none() {
        let a = line(0.0, 0.0, 1.0, 1.0);
        let b = line(0.0, 10.0, 10.0, 0.0);
        assert_eq!(a.intersection_with_line(&b), None);
    }

    #[test]
    fn test_closest_point() {
        let l = line(0.0, 0.0, 10.0, 0.0);
        assert!(l.closest_point(Point::new(4.0, 7.0)).approx_eq(Point::new(4.0, 0.0), 1e-9));
        assert!(l.closest_point(Point::new(-4.0, 7.0)).approx_eq(Point::new(0.0, 0.0), 1e-9));
    }

    #[test]
    fn test_set_length() {
        let l = line(0.0, 0.0, 1.0, 0.0).set_length(100.0);
        assert!(l.end().approx_eq(Point::new(100.0, 0.0), 1e-9));
    }

    #[test]
    fn test_parallel() {
        let l = line(0.0, 0.0, 10.0, 0.0).parallel(5.0);
        assert!(l.start().approx_eq(Point::new(0.0, 5.0), 1e-9));
        assert!(l.end().approx_eq(Point::new(10.0, 5.0), 1e-9));
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
        (-500.0f64..500.0, -500.0f64..500.0).prop_map(|(x, y)| Point::new(x, y))
    }

    fn line_strategy() -> impl Strategy<Value = Line> {
        (point_strategy(), point_strategy()).prop_map(|(a, b)| Line::new(a, b))
    }

    // ===================
    // Property Test Functions
    // ===================

    /// An intersection, when found, lies on both segments.
    fn check_intersection_lies_on_both(a: Line, b: Line) -> Result<(), TestCaseError> {
        if let Some(p) = a.intersection_with_line(&b) {
            prop_assert!(p.is_finite());
            prop_assert!(a.distance_to_point(p) < 1e-6);
            prop_assert!(b.distance_to_point(p) < 1e-6);
        }
        Ok(())
    }

    /// The closest point never lies farther than either endpoint.
    fn check_closest_point_is_closest(l: Line, p: Point) -> Result<(), TestCaseError> {
        let closest = l.closest_point(p).distance(p);
        prop_assert!(closest <= l.start().distance(p) + 1e-9);
        prop_assert!(closest <= l.end().distance(p) + 1e-9);
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn intersection_lies_on_both(a in line_strategy(), b in line_strategy()) {
            check_intersection_lies_on_both(a, b)?;
        }

        #[test]
        fn closest_point_is_closest(l in line_strategy(), p in point_strategy()) {
            check_closest_point_is_closest(l, p)?;
        }
    }
}
