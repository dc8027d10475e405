use super::{EPSILON, Line, Point, Rect};

/// Upper bound on halving rounds when subdividing a curve.
const MAX_SUBDIVISION_ROUNDS: u32 = 12;

/// A cubic Bézier curve.
///
/// Lengths, intersections and closest points are computed over a list of
/// subdivisions whose chords approximate the curve to a requested number of
/// significant decimals. Callers that query the same curve repeatedly should
/// compute the subdivisions once with [`Curve::subdivisions`] and reuse them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Curve {
    start: Point,
    control1: Point,
    control2: Point,
    end: Point,
}

impl Curve {
    pub fn new(start: Point, control1: Point, control2: Point, end: Point) -> Self {
        Self {
            start,
            control1,
            control2,
            end,
        }
    }

    /// A cubic equivalent to the quadratic curve with a single control point.
    pub fn from_quadratic(start: Point, control: Point, end: Point) -> Self {
        let c1 = start.lerp(control, 2.0 / 3.0);
        let c2 = end.lerp(control, 2.0 / 3.0);
        Self::new(start, c1, c2, end)
    }

    pub fn start(&self) -> Point {
        self.start
    }

    pub fn control1(&self) -> Point {
        self.control1
    }

    pub fn control2(&self) -> Point {
        self.control2
    }

    pub fn end(&self) -> Point {
        self.end
    }

    /// Point at parameter `t` in `[0, 1]`.
    pub fn point_at_t(&self, t: f64) -> Point {
        let t = t.clamp(0.0, 1.0);
        let mt = 1.0 - t;
        let a = mt * mt * mt;
        let b = 3.0 * mt * mt * t;
        let c = 3.0 * mt * t * t;
        let d = t * t * t;
        Point::new(
            a * self.start.x() + b * self.control1.x() + c * self.control2.x() + d * self.end.x(),
            a * self.start.y() + b * self.control1.y() + c * self.control2.y() + d * self.end.y(),
        )
    }

    /// First derivative at `t`.
    pub fn derivative_at_t(&self, t: f64) -> Point {
        let t = t.clamp(0.0, 1.0);
        let mt = 1.0 - t;
        let p0 = self.control1.sub_point(self.start).scale(3.0 * mt * mt);
        let p1 = self.control2.sub_point(self.control1).scale(6.0 * mt * t);
        let p2 = self.end.sub_point(self.control2).scale(3.0 * t * t);
        p0.add_point(p1).add_point(p2)
    }

    /// Tangent line at `t`, whose length is the derivative magnitude.
    ///
    /// Falls back to the chord direction when the derivative vanishes (e.g.
    /// a control point coinciding with an endpoint). Returns `None` for a
    /// curve collapsed into a single point.
    pub fn tangent_at_t(&self, t: f64) -> Option<Line> {
        let at = self.point_at_t(t);
        let mut direction = self.derivative_at_t(t);
        if direction.hypot() < EPSILON {
            direction = self.end.sub_point(self.start);
        }
        if direction.hypot() < EPSILON {
            return None;
        }
        Some(Line::new(at, at.add_point(direction)))
    }

    /// Splits the curve at `t` using de Casteljau's algorithm.
    pub fn divide(&self, t: f64) -> (Curve, Curve) {
        let t = t.clamp(0.0, 1.0);
        let p01 = self.start.lerp(self.control1, t);
        let p12 = self.control1.lerp(self.control2, t);
        let p23 = self.control2.lerp(self.end, t);
        let p012 = p01.lerp(p12, t);
        let p123 = p12.lerp(p23, t);
        let mid = p012.lerp(p123, t);
        (
            Curve::new(self.start, p01, p012, mid),
            Curve::new(mid, p123, p23, self.end),
        )
    }

    /// Distance between the two endpoints.
    pub fn chord_length(&self) -> f64 {
        self.start.distance(self.end)
    }

    /// Whether the whole curve collapses into a single point.
    pub fn is_degenerate(&self) -> bool {
        self.start.approx_eq(self.control1, EPSILON)
            && self.start.approx_eq(self.control2, EPSILON)
            && self.start.approx_eq(self.end, EPSILON)
    }

    /// Subdivides the curve until the sum of chord lengths stabilizes to
    /// `precision` significant decimals.
    ///
    /// A precision of zero returns the curve itself.
    pub fn subdivisions(&self, precision: u32) -> Vec<Curve> {
        let mut subdivisions = vec![*self];
        if precision == 0 || self.is_degenerate() {
            return subdivisions;
        }
        let threshold = 10f64.powi(-(precision as i32));
        let mut previous_length = self.chord_length();

        for round in 1..=MAX_SUBDIVISION_ROUNDS {
            let next: Vec<Curve> = subdivisions
                .iter()
                .flat_map(|curve| {
                    let (a, b) = curve.divide(0.5);
                    [a, b]
                })
                .collect();
            let length: f64 = next.iter().map(Curve::chord_length).sum();
            let observed = if length > 0.0 {
                (length - previous_length) / length
            } else {
                0.0
            };
            subdivisions = next;
            // The first round can be fooled by symmetric curves whose halves
            // add up to the chord exactly
            if round > 1 && observed < threshold {
                break;
            }
            previous_length = length;
        }
        subdivisions
    }

    /// Approximate arc length at the given precision.
    pub fn length(&self, precision: u32) -> f64 {
        Self::length_of(&self.subdivisions(precision))
    }

    /// Arc length of precomputed subdivisions.
    pub fn length_of(subdivisions: &[Curve]) -> f64 {
        subdivisions.iter().map(Curve::chord_length).sum()
    }

    /// Parameter `t` of the point at the given arc length along precomputed
    /// subdivisions. Negative lengths measure from the end.
    pub fn t_at_length(&self, length: f64, subdivisions: &[Curve]) -> f64 {
        let total = Self::length_of(subdivisions);
        if total < EPSILON {
            return 0.0;
        }
        let target = if length < 0.0 { total + length } else { length }.clamp(0.0, total);
        let count = subdivisions.len() as f64;
        let mut travelled = 0.0;
        for (index, subdivision) in subdivisions.iter().enumerate() {
            let chord = subdivision.chord_length();
            if travelled + chord >= target {
                let local = if chord > 0.0 {
                    (target - travelled) / chord
                } else {
                    0.0
                };
                return (index as f64 + local) / count;
            }
            travelled += chord;
        }
        1.0
    }

    /// Point at the given arc length along precomputed subdivisions.
    pub fn point_at_length(&self, length: f64, subdivisions: &[Curve]) -> Point {
        self.point_at_t(self.t_at_length(length, subdivisions))
    }

    /// Chord polyline of the subdivisions, starting at the curve start.
    pub fn to_points(subdivisions: &[Curve]) -> Vec<Point> {
        let mut points = Vec::with_capacity(subdivisions.len() + 1);
        if let Some(first) = subdivisions.first() {
            points.push(first.start);
        }
        points.extend(subdivisions.iter().map(|c| c.end));
        points
    }

    /// Intersections of a line with the curve, approximated over the chords
    /// of precomputed subdivisions.
    pub fn intersection_with_line(line: &Line, subdivisions: &[Curve]) -> Vec<Point> {
        let mut points: Vec<Point> = Vec::new();
        for subdivision in subdivisions {
            let chord = Line::new(subdivision.start, subdivision.end);
            let Some(p) = chord.intersection_with_line(line) else {
                continue;
            };
            if !points.iter().any(|q| q.approx_eq(p, 1e-9)) {
                points.push(p);
            }
        }
        points
    }

    /// Point on the curve closest to `p`, over precomputed subdivisions.
    pub fn closest_point(p: Point, subdivisions: &[Curve]) -> Option<Point> {
        subdivisions
            .iter()
            .map(|c| Line::new(c.start, c.end).closest_point(p))
            .min_by(|a, b| p.squared_distance(*a).total_cmp(&p.squared_distance(*b)))
    }

    /// Tight bounding box, computed from the curve extrema.
    pub fn bbox(&self) -> Rect {
        let mut points = vec![self.start, self.end];
        for t in self.extrema_ts() {
            points.push(self.point_at_t(t));
        }
        Rect::bounding(points).unwrap_or_default()
    }

    /// Parameters in `(0, 1)` where the derivative of either coordinate is zero.
    fn extrema_ts(&self) -> Vec<f64> {
        let axis = |p0: f64, p1: f64, p2: f64, p3: f64| -> Vec<f64> {
            // Derivative coefficients: a t² + b t + c
            let a = -3.0 * p0 + 9.0 * p1 - 9.0 * p2 + 3.0 * p3;
            let b = 6.0 * p0 - 12.0 * p1 + 6.0 * p2;
            let c = 3.0 * (p1 - p0);
            let mut roots = Vec::new();
            if a.abs() < EPSILON {
                if b.abs() > EPSILON {
                    roots.push(-c / b);
                }
            } else {
                let disc = b * b - 4.0 * a * c;
                if disc >= 0.0 {
                    let sq = disc.sqrt();
                    roots.push((-b + sq) / (2.0 * a));
                    roots.push((-b - sq) / (2.0 * a));
                }
            }
            roots
        };
        let mut ts = axis(
            self.start.x(),
            self.control1.x(),
            self.control2.x(),
            self.end.x(),
        );
        ts.extend(axis(
            self.start.y(),
            self.control1.y(),
            self.control2.y(),
            self.end.y(),
        ));
        ts.retain(|t| *t > 0.0 && *t < 1.0);
        ts
    }

    /// Applies a point mapping to all four points.
    pub fn map_points(&self, f: impl Fn(Point) -> Point) -> Curve {
        Curve::new(f(self.start), f(self.control1), f(self.control2), f(self.end))
    }

    /// Cubic curves through the given points using Catmull-Rom tangents.
    ///
    /// Returns an empty list for fewer than two points.
    pub fn through_points(points: &[Point]) -> Vec<Curve> {
        if points.len() < 2 {
            return Vec::new();
        }
        let last = points.len() - 1;
        (0..last)
            .map(|i| {
                let p0 = if i == 0 { points[0] } else { points[i - 1] };
                let p1 = points[i];
                let p2 = points[i + 1];
                let p3 = if i + 2 > last { points[last] } else { points[i + 2] };
                let c1 = p1.add_point(p2.sub_point(p0).scale(1.0 / 6.0));
                let c2 = p2.sub_point(p3.sub_point(p1).scale(1.0 / 6.0));
                Curve::new(p1, c1, c2, p2)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn straight() -> Curve {
        Curve::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(20.0, 0.0),
            Point::new(30.0, 0.0),
        )
    }

    fn arch() -> Curve {
        Curve::new(
            Point::new(0.0, 0.0),
            Point::new(0.0, -40.0),
            Point::new(100.0, -40.0),
            Point::new(100.0, 0.0),
        )
    }

    #[test]
    fn test_straight_curve_length() {
        assert_approx_eq!(f64, straight().length(3), 30.0, epsilon = 1e-6);
    }

    #[test]
    fn test_divide_shares_midpoint() {
        let (a, b) = arch().divide(0.5);
        assert_eq!(a.end(), b.start());
        assert!(a.end().approx_eq(arch().point_at_t(0.5), 1e-9));
    }

    #[test]
    fn test_arch_bbox_includes_apex() {
        let bbox = arch().bbox();
        assert_approx_eq!(f64, bbox.y(), -30.0, epsilon = 1e-9);
        assert_approx_eq!(f64, bbox.width(), 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_intersection_with_vertical_line() {
        let curve = arch();
        let subdivisions = curve.subdivisions(3);
        let line = Line::new(Point::new(50.0, 10.0), Point::new(50.0, -100.0));
        let hits = Curve::intersection_with_line(&line, &subdivisions);
        assert_eq!(hits.len(), 1);
        assert_approx_eq!(f64, hits[0].y(), -30.0, epsilon = 0.05);
    }

    #[test]
    fn test_point_at_length_negative() {
        let curve = straight();
        let subdivisions = curve.subdivisions(3);
        let p = curve.point_at_length(-10.0, &subdivisions);
        assert!(p.approx_eq(Point::new(20.0, 0.0), 1e-6));
    }

    #[test]
    fn test_through_points_interpolates() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(50.0, 50.0),
            Point::new(100.0, 0.0),
        ];
        let curves = Curve::through_points(&points);
        assert_eq!(curves.len(), 2);
        assert_eq!(curves[0].end(), points[1]);
        assert_eq!(curves[1].end(), points[2]);
    }

    #[test]
    fn test_degenerate_curve_has_no_tangent() {
        let p = Point::new(3.0, 3.0);
        let curve = Curve::new(p, p, p, p);
        assert!(curve.tangent_at_t(0.5).is_none());
        assert_eq!(curve.subdivisions(3).len(), 1);
    }
}
