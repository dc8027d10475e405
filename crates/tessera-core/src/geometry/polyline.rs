use std::fmt;

use super::{EPSILON, Line, Point, Rect};

/// An ordered list of points joined by straight segments.
///
/// A polyline is open; use [`Polyline::closing_segments`] when the outline
/// should wrap back to the first point, as an SVG `<polygon>` does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Polyline {
    points: Vec<Point>,
}

impl Polyline {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Parses an SVG `points` attribute such as `"0,0 10,0 10,10"`.
    ///
    /// Numbers may be separated by commas or whitespace. A trailing odd
    /// coordinate is ignored, matching how browsers render such input.
    pub fn parse(points: &str) -> Option<Self> {
        let numbers: Vec<f64> = points
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .map(|token| token.parse::<f64>().ok())
            .collect::<Option<_>>()?;
        Some(Self::new(
            numbers
                .chunks_exact(2)
                .map(|pair| Point::new(pair[0], pair[1]))
                .collect(),
        ))
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<Point> {
        self.points.first().copied()
    }

    pub fn last(&self) -> Option<Point> {
        self.points.last().copied()
    }

    /// Segments between consecutive points.
    pub fn segments(&self) -> Vec<Line> {
        self.points
            .windows(2)
            .map(|pair| Line::new(pair[0], pair[1]))
            .collect()
    }

    /// Segments including the one from the last point back to the first.
    pub fn closing_segments(&self) -> Vec<Line> {
        let mut segments = self.segments();
        if let (Some(first), Some(last)) = (self.first(), self.last()) {
            if self.points.len() > 2 && !first.approx_eq(last, EPSILON) {
                segments.push(Line::new(last, first));
            }
        }
        segments
    }

    pub fn length(&self) -> f64 {
        self.segments().iter().map(Line::length).sum()
    }

    pub fn bbox(&self) -> Option<Rect> {
        Rect::bounding(self.points.iter().copied())
    }

    /// Point at the given distance along the polyline. Negative lengths are
    /// measured from the end.
    pub fn point_at_length(&self, length: f64) -> Option<Point> {
        let segments = self.segments();
        if segments.is_empty() {
            return self.first();
        }
        let total: f64 = segments.iter().map(Line::length).sum();
        let target = if length < 0.0 { total + length } else { length }.clamp(0.0, total);
        let mut travelled = 0.0;
        for segment in &segments {
            let l = segment.length();
            if travelled + l >= target {
                return Some(segment.point_at_length(target - travelled));
            }
            travelled += l;
        }
        self.last()
    }

    /// Point on the polyline closest to `p`.
    pub fn closest_point(&self, p: Point) -> Option<Point> {
        if self.points.len() == 1 {
            return self.first();
        }
        self.segments()
            .iter()
            .map(|segment| segment.closest_point(p))
            .min_by(|a, b| p.squared_distance(*a).total_cmp(&p.squared_distance(*b)))
    }

    /// Intersections of `line` with the segments, sorted by distance from
    /// the line start. Set `closed` to include the closing segment.
    pub fn intersection_with_line(&self, line: &Line, closed: bool) -> Vec<Point> {
        let segments = if closed {
            self.closing_segments()
        } else {
            self.segments()
        };
        let mut points: Vec<Point> = Vec::new();
        for segment in segments {
            let Some(p) = segment.intersection_with_line(line) else {
                continue;
            };
            if !points.iter().any(|q| q.approx_eq(p, 1e-9)) {
                points.push(p);
            }
        }
        let start = line.start();
        points.sort_by(|a, b| {
            start
                .squared_distance(*a)
                .total_cmp(&start.squared_distance(*b))
        });
        points
    }

    /// Even-odd containment, treating the polyline as a closed polygon.
    pub fn contains_point(&self, p: Point) -> bool {
        let n = self.points.len();
        if n < 3 {
            return false;
        }
        let mut inside = false;
        for i in 0..n {
            let a = self.points[i];
            let b = self.points[(i + 1) % n];
            if (a.y() > p.y()) != (b.y() > p.y()) {
                let x = a.x() + (p.y() - a.y()) / (b.y() - a.y()) * (b.x() - a.x());
                if p.x() < x {
                    inside = !inside;
                }
            }
        }
        inside
    }

    /// Drops points that lie on the straight segment between their neighbours.
    pub fn simplify(&self, threshold: f64) -> Polyline {
        if self.points.len() < 3 {
            return self.clone();
        }
        let mut kept: Vec<Point> = vec![self.points[0]];
        for window in self.points.windows(3) {
            let (prev, current, next) = (window[0], window[1], window[2]);
            let chord = Line::new(prev, next);
            if chord.distance_to_point(current) > threshold {
                kept.push(current);
            }
        }
        if let Some(last) = self.last() {
            kept.push(last);
        }
        Polyline::new(kept)
    }
}

impl fmt::Display for Polyline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.points.iter().map(Point::to_string).collect();
        f.write_str(&parts.join(" "))
    }
}

impl From<Vec<Point>> for Polyline {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    fn square() -> Polyline {
        Polyline::parse("0,0 10,0 10,10 0,10").unwrap()
    }

    #[test]
    fn test_parse_points() {
        let p = Polyline::parse("0,0 10 0, 10,10").unwrap();
        assert_eq!(p.points().len(), 3);
        assert!(Polyline::parse("0,0 a,b").is_none());
    }

    #[test]
    fn test_length_and_point_at_length() {
        let p = square();
        assert_approx_eq!(f64, p.length(), 30.0);
        assert!(p.point_at_length(15.0).unwrap().approx_eq(Point::new(10.0, 5.0), 1e-9));
        assert!(p.point_at_length(-5.0).unwrap().approx_eq(Point::new(5.0, 10.0), 1e-9));
    }

    #[test]
    fn test_closed_intersection() {
        let p = square();
        let line = Line::new(Point::new(-5.0, 5.0), Point::new(5.0, 5.0));
        assert!(p.intersection_with_line(&line, false).is_empty());
        assert_eq!(p.intersection_with_line(&line, true).len(), 1);
    }

    #[test]
    fn test_contains_point() {
        assert!(square().contains_point(Point::new(5.0, 5.0)));
        assert!(!square().contains_point(Point::new(15.0, 5.0)));
    }

    #[test]
    fn test_simplify_drops_collinear() {
        let p = Polyline::new(vec![
            Point::new(0.0, 0.0),
            Point::new(5.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
        ]);
        assert_eq!(p.simplify(1e-6).points().len(), 3);
    }
}
