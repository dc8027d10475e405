use super::{EPSILON, Line, Point, Rect};

/// An axis-aligned ellipse given by its center and the two radii.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::{Ellipse, Point};
/// let ellipse = Ellipse::new(Point::new(0.0, 0.0), 20.0, 10.0);
/// assert!(ellipse.contains_point(Point::new(19.0, 0.0)));
/// assert!(!ellipse.contains_point(Point::new(0.0, 11.0)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ellipse {
    center: Point,
    a: f64,
    b: f64,
}

impl Ellipse {
    /// Creates a new ellipse. Negative radii are treated as their absolute value.
    pub fn new(center: Point, a: f64, b: f64) -> Self {
        Self {
            center,
            a: a.abs(),
            b: b.abs(),
        }
    }

    /// The ellipse inscribed in a rectangle.
    pub fn from_rect(rect: &Rect) -> Self {
        Self::new(rect.center(), rect.width() / 2.0, rect.height() / 2.0)
    }

    pub fn center(&self) -> Point {
        self.center
    }

    /// Horizontal radius.
    pub fn a(&self) -> f64 {
        self.a
    }

    /// Vertical radius.
    pub fn b(&self) -> f64 {
        self.b
    }

    /// Whether either radius is zero.
    pub fn is_degenerate(&self) -> bool {
        self.a < EPSILON || self.b < EPSILON
    }

    /// Bounding box of the ellipse.
    pub fn bbox(&self) -> Rect {
        Rect::new(
            self.center.x() - self.a,
            self.center.y() - self.b,
            2.0 * self.a,
            2.0 * self.b,
        )
    }

    /// Grows both radii.
    pub fn inflate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.center, self.a + dx, self.b + dy)
    }

    /// `(x-cx)²/a² + (y-cy)²/b²`: `1` on the outline, below inside.
    pub fn normalized_distance(&self, p: Point) -> f64 {
        if self.is_degenerate() {
            return f64::INFINITY;
        }
        let dx = p.x() - self.center.x();
        let dy = p.y() - self.center.y();
        (dx * dx) / (self.a * self.a) + (dy * dy) / (self.b * self.b)
    }

    /// Whether the point is inside or on the ellipse.
    pub fn contains_point(&self, p: Point) -> bool {
        self.normalized_distance(p) <= 1.0
    }

    /// Point on the outline at the given angle (degrees, clockwise from +x).
    pub fn point_at_angle(&self, angle: f64) -> Point {
        let (sin, cos) = angle.to_radians().sin_cos();
        Point::new(
            self.center.x() + self.a * cos,
            self.center.y() + self.b * sin,
        )
    }

    /// Intersections of a segment with the outline, sorted by distance from
    /// the line start. A degenerate line or ellipse yields none.
    pub fn intersection_with_line(&self, line: &Line) -> Vec<Point> {
        if line.is_degenerate() || self.is_degenerate() {
            return Vec::new();
        }
        // Scale to the unit circle and solve |o + t·d|² = 1
        let o = Point::new(
            (line.start().x() - self.center.x()) / self.a,
            (line.start().y() - self.center.y()) / self.b,
        );
        let v = line.vector();
        let d = Point::new(v.x() / self.a, v.y() / self.b);

        let qa = d.dot(d);
        let qb = 2.0 * o.dot(d);
        let qc = o.dot(o) - 1.0;
        let discriminant = qb * qb - 4.0 * qa * qc;
        if discriminant < 0.0 || qa < EPSILON * EPSILON {
            return Vec::new();
        }

        let root = discriminant.sqrt();
        let mut ts = vec![(-qb - root) / (2.0 * qa), (-qb + root) / (2.0 * qa)];
        if root < EPSILON {
            ts.truncate(1);
        }
        ts.into_iter()
            .filter(|t| (0.0..=1.0).contains(t))
            .map(|t| line.start().lerp(line.end(), t))
            .collect()
    }

    /// Intersection of the outline with the ray from the center toward `p`.
    ///
    /// `angle` is the rotation of the ellipse around its center. When `p` is
    /// vertically aligned with the center, the nearest point of the bounding
    /// box is used instead.
    pub fn intersection_with_line_from_center_to_point(&self, p: Point, angle: f64) -> Point {
        let p = p.rotate(self.center, -angle);
        let dx = p.x() - self.center.x();
        let dy = p.y() - self.center.y();
        let result = if dx.abs() < EPSILON {
            self.bbox().point_nearest_to_point(p)
        } else {
            let m = dy / dx;
            let a2 = self.a * self.a;
            let b2 = self.b * self.b;
            let mut x = (1.0 / (1.0 / a2 + (m * m) / b2)).sqrt();
            if dx < 0.0 {
                x = -x;
            }
            Point::new(self.center.x() + x, self.center.y() + m * x)
        };
        result.rotate(self.center, angle)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_ellipse_bbox() {
        let e = Ellipse::new(Point::new(50.0, 50.0), 20.0, 10.0);
        assert_eq!(e.bbox(), Rect::new(30.0, 40.0, 40.0, 20.0));
    }

    #[test]
    fn test_intersection_with_horizontal_line() {
        let e = Ellipse::new(Point::new(0.0, 0.0), 20.0, 10.0);
        let line = Line::new(Point::new(-100.0, 0.0), Point::new(100.0, 0.0));
        let hits = e.intersection_with_line(&line);
        assert_eq!(hits.len(), 2);
        assert!(hits[0].approx_eq(Point::new(-20.0, 0.0), 1e-9));
        assert!(hits[1].approx_eq(Point::new(20.0, 0.0), 1e-9));
    }

    #[test]
    fn test_intersection_line_inside_has_none() {
        let e = Ellipse::new(Point::new(0.0, 0.0), 20.0, 10.0);
        let line = Line::new(Point::new(-1.0, 0.0), Point::new(1.0, 0.0));
        assert!(e.intersection_with_line(&line).is_empty());
    }

    #[test]
    fn test_degenerate_ellipse_has_no_intersection() {
        let e = Ellipse::new(Point::new(0.0, 0.0), 0.0, 10.0);
        let line = Line::new(Point::new(-100.0, 0.0), Point::new(100.0, 0.0));
        assert!(e.intersection_with_line(&line).is_empty());
    }

    #[test]
    fn test_center_ray_vertical() {
        let e = Ellipse::new(Point::new(0.0, 0.0), 20.0, 10.0);
        let p = e.intersection_with_line_from_center_to_point(Point::new(0.0, 50.0), 0.0);
        assert!(p.approx_eq(Point::new(0.0, 10.0), 1e-9));
    }

    #[test]
    fn test_center_ray_diagonal_on_outline() {
        let e = Ellipse::new(Point::new(10.0, 10.0), 20.0, 10.0);
        let p = e.intersection_with_line_from_center_to_point(Point::new(40.0, 40.0), 0.0);
        assert_approx_eq!(f64, e.normalized_distance(p), 1.0, epsilon = 1e-9);
    }
}
