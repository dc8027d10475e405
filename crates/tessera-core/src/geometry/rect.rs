use std::fmt;

use serde::{Deserialize, Serialize};

use super::{EPSILON, Line, Point};

/// A size with width and height dimensions.
///
/// Used to represent the dimensions of elements and bounding boxes.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::Size;
/// let size = Size::new(100.0, 50.0);
/// assert_eq!(size.width(), 100.0);
/// assert_eq!(size.height(), 50.0);
/// assert!(!size.is_zero());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    width: f64,
    height: f64,
}

impl Size {
    /// Creates a new size. Negative components are clamped to zero.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Returns the width component
    pub fn width(self) -> f64 {
        self.width
    }

    /// Returns the height component
    pub fn height(self) -> f64 {
        self.height
    }

    /// Checks if either dimension is zero
    pub fn is_zero(self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }

    /// Length of the diagonal.
    pub fn diagonal(self) -> f64 {
        self.width.hypot(self.height)
    }
}

/// One of the four sides of a rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
    Top,
    Bottom,
}

/// An axis-aligned rectangle given by its top-left corner and size.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::{Line, Point, Rect};
/// let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
/// assert_eq!(rect.center(), Point::new(50.0, 25.0));
///
/// let line = Line::new(Point::new(-50.0, 25.0), rect.center());
/// let hits = rect.intersection_with_line(&line);
/// assert_eq!(hits, vec![Point::new(0.0, 25.0)]);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Rect {
    /// Creates a rectangle. Negative dimensions are normalized so that
    /// `(x, y)` is always the top-left corner.
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        let (x, width) = if width < 0.0 { (x + width, -width) } else { (x, width) };
        let (y, height) = if height < 0.0 {
            (y + height, -height)
        } else {
            (y, height)
        };
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Creates the smallest rectangle containing both points.
    pub fn from_points(a: Point, b: Point) -> Self {
        let x = a.x().min(b.x());
        let y = a.y().min(b.y());
        Self::new(x, y, (a.x() - b.x()).abs(), (a.y() - b.y()).abs())
    }

    /// Creates a rectangle centered at `center` with the given size.
    pub fn from_center(center: Point, size: Size) -> Self {
        Self::new(
            center.x() - size.width() / 2.0,
            center.y() - size.height() / 2.0,
            size.width(),
            size.height(),
        )
    }

    /// Bounding box of a set of points, `None` for an empty iterator.
    pub fn bounding<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Point>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min = Point::new(min.x().min(p.x()), min.y().min(p.y()));
            max = Point::new(max.x().max(p.x()), max.y().max(p.y()));
        }
        Some(Self::from_points(min, max))
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Returns the rectangle dimensions as a [`Size`].
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Top-left corner.
    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Bottom-right corner.
    pub fn corner(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height)
    }

    pub fn top_right(&self) -> Point {
        Point::new(self.x + self.width, self.y)
    }

    pub fn bottom_left(&self) -> Point {
        Point::new(self.x, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn top_middle(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y)
    }

    pub fn bottom_middle(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height)
    }

    pub fn left_middle(&self) -> Point {
        Point::new(self.x, self.y + self.height / 2.0)
    }

    pub fn right_middle(&self) -> Point {
        Point::new(self.x + self.width, self.y + self.height / 2.0)
    }

    /// Midpoint of the given side.
    pub fn side_middle(&self, side: Side) -> Point {
        match side {
            Side::Left => self.left_middle(),
            Side::Right => self.right_middle(),
            Side::Top => self.top_middle(),
            Side::Bottom => self.bottom_middle(),
        }
    }

    /// The four sides as lines, clockwise from the top.
    pub fn sides(&self) -> [Line; 4] {
        let tl = self.origin();
        let tr = self.top_right();
        let br = self.corner();
        let bl = self.bottom_left();
        [
            Line::new(tl, tr),
            Line::new(tr, br),
            Line::new(br, bl),
            Line::new(bl, tl),
        ]
    }

    /// Returns `true` when the rectangle has zero area.
    pub fn is_empty(&self) -> bool {
        self.width < EPSILON || self.height < EPSILON
    }

    /// Whether the point lies inside or on the border.
    pub fn contains_point(&self, p: Point) -> bool {
        p.x() >= self.x
            && p.x() <= self.x + self.width
            && p.y() >= self.y
            && p.y() <= self.y + self.height
    }

    /// Whether `other` lies completely inside this rectangle.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.contains_point(other.origin()) && self.contains_point(other.corner())
    }

    /// Whether the two rectangles overlap (touching borders count).
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.x + other.width
            && other.x <= self.x + self.width
            && self.y <= other.y + other.height
            && other.y <= self.y + self.height
    }

    /// The overlapping area of two rectangles.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        Some(Rect::new(x, y, right - x, bottom - y))
    }

    /// The smallest rectangle containing both rectangles.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Grows the rectangle by `dx` on the left and right and by `dy` on the
    /// top and bottom. Negative values shrink it, never below zero size.
    pub fn inflate(&self, dx: f64, dy: f64) -> Rect {
        let width = (self.width + 2.0 * dx).max(0.0);
        let height = (self.height + 2.0 * dy).max(0.0);
        let center = self.center();
        Rect::from_center(center, Size::new(width, height))
    }

    /// Moves the rectangle by the given offsets.
    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Scales the rectangle relative to `origin`.
    pub fn scale(&self, sx: f64, sy: f64, origin: Point) -> Rect {
        let a = self.origin().scale_around(sx, sy, origin);
        let b = self.corner().scale_around(sx, sy, origin);
        Rect::from_points(a, b)
    }

    /// Bounding box of this rectangle rotated around its center by `angle` degrees.
    pub fn rotated_bbox(&self, angle: f64) -> Rect {
        if angle % 360.0 == 0.0 {
            return *self;
        }
        let center = self.center();
        let corners = [
            self.origin(),
            self.top_right(),
            self.corner(),
            self.bottom_left(),
        ]
        .map(|p| p.rotate(center, angle));
        Rect::bounding(corners).unwrap_or(*self)
    }

    /// The side of the rectangle nearest to `p`.
    ///
    /// Uses signed distances, so a point left of the rectangle always reports
    /// [`Side::Left`]. Ties favour left, right, top, then bottom.
    pub fn side_nearest_to_point(&self, p: Point) -> Side {
        let distances = [
            (p.x() - self.x, Side::Left),
            (self.x + self.width - p.x(), Side::Right),
            (p.y() - self.y, Side::Top),
            (self.y + self.height - p.y(), Side::Bottom),
        ];
        let mut nearest = distances[0];
        for candidate in &distances[1..] {
            if candidate.0 < nearest.0 {
                nearest = *candidate;
            }
        }
        nearest.1
    }

    /// The point on the rectangle outline nearest to `p`.
    ///
    /// Points inside are projected onto the nearest side; points outside are
    /// clamped onto the rectangle.
    pub fn point_nearest_to_point(&self, p: Point) -> Point {
        if self.contains_point(p) {
            return match self.side_nearest_to_point(p) {
                Side::Right => Point::new(self.x + self.width, p.y()),
                Side::Left => Point::new(self.x, p.y()),
                Side::Bottom => Point::new(p.x(), self.y + self.height),
                Side::Top => Point::new(p.x(), self.y),
            };
        }
        Point::new(
            p.x().clamp(self.x, self.x + self.width),
            p.y().clamp(self.y, self.y + self.height),
        )
    }

    /// Intersections of a segment with the rectangle outline.
    ///
    /// Points are deduplicated and sorted by distance from the line start.
    /// A degenerate line or rectangle yields no intersections.
    pub fn intersection_with_line(&self, line: &Line) -> Vec<Point> {
        if line.is_degenerate() || self.is_empty() {
            return Vec::new();
        }
        let mut points: Vec<Point> = Vec::with_capacity(2);
        for side in self.sides() {
            let Some(p) = side.intersection_with_line(line) else {
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

    /// Intersection of the outline with the ray from the center toward `p`.
    ///
    /// `angle` is the rotation of the rectangle around its center. Returns
    /// `None` when `p` coincides with the center or the rectangle is empty.
    pub fn intersection_with_line_from_center_to_point(
        &self,
        p: Point,
        angle: f64,
    ) -> Option<Point> {
        let center = self.center();
        let p = p.rotate(center, -angle);
        if p.approx_eq(center, EPSILON) {
            return None;
        }
        let diagonal = self.size().diagonal().max(1.0);
        let ray = Line::new(center, p).set_length(diagonal * 2.0);
        self.intersection_with_line(&ray)
            .first()
            .map(|hit| hit.rotate(center, angle))
    }

    /// Compares two rectangles allowing for floating-point noise.
    pub fn approx_eq(&self, other: &Rect, epsilon: f64) -> bool {
        self.origin().approx_eq(other.origin(), epsilon)
            && (self.width - other.width).abs() <= epsilon
            && (self.height - other.height).abs() <= epsilon
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x, self.y, self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_size_clamps_negative() {
        let size = Size::new(-5.0, 10.0);
        assert_approx_eq!(f64, size.width(), 0.0);
        assert!(size.is_zero());
    }

    #[test]
    fn test_rect_normalizes_negative_dimensions() {
        let rect = Rect::new(10.0, 10.0, -5.0, -4.0);
        assert_eq!(rect.origin(), Point::new(5.0, 6.0));
        assert_approx_eq!(f64, rect.width(), 5.0);
        assert_approx_eq!(f64, rect.height(), 4.0);
    }

    #[test]
    fn test_side_nearest_to_point() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        assert_eq!(rect.side_nearest_to_point(Point::new(-10.0, 20.0)), Side::Left);
        assert_eq!(rect.side_nearest_to_point(Point::new(95.0, 20.0)), Side::Right);
        assert_eq!(rect.side_nearest_to_point(Point::new(50.0, 2.0)), Side::Top);
        assert_eq!(rect.side_nearest_to_point(Point::new(50.0, 90.0)), Side::Bottom);
    }

    #[test]
    fn test_point_nearest_to_point_inside_and_outside() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        assert_eq!(
            rect.point_nearest_to_point(Point::new(90.0, 20.0)),
            Point::new(100.0, 20.0)
        );
        assert_eq!(
            rect.point_nearest_to_point(Point::new(150.0, -20.0)),
            Point::new(100.0, 0.0)
        );
    }

    #[test]
    fn test_intersection_with_line_sorted() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let line = Line::new(Point::new(-5.0, 5.0), Point::new(15.0, 5.0));
        let hits = rect.intersection_with_line(&line);
        assert_eq!(hits, vec![Point::new(0.0, 5.0), Point::new(10.0, 5.0)]);
    }

    #[test]
    fn test_intersection_with_line_corner_deduplicated() {
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        let line = Line::new(Point::new(-5.0, -5.0), Point::new(0.0, 0.0));
        let hits = rect.intersection_with_line(&line);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_intersection_zero_area_rect() {
        let rect = Rect::new(5.0, 5.0, 0.0, 0.0);
        let line = Line::new(Point::new(0.0, 0.0), Point::new(10.0, 10.0));
        assert!(rect.intersection_with_line(&line).is_empty());
    }

    #[test]
    fn test_rotated_bbox() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        let rotated = rect.rotated_bbox(90.0);
        assert!(rotated.approx_eq(&Rect::new(30.0, -30.0, 40.0, 100.0), 1e-9));
    }

    #[test]
    fn test_union_and_intersection() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
        assert_eq!(a.intersection(&b), Some(Rect::new(5.0, 5.0, 5.0, 5.0)));
        assert_eq!(a.intersection(&Rect::new(50.0, 50.0, 1.0, 1.0)), None);
    }

    #[test]
    fn test_center_ray_intersection() {
        let rect = Rect::new(0.0, 0.0, 100.0, 40.0);
        let hit = rect
            .intersection_with_line_from_center_to_point(Point::new(200.0, 20.0), 0.0)
            .unwrap();
        assert!(hit.approx_eq(Point::new(100.0, 20.0), 1e-9));
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

    fn rect_strategy() -> impl Strategy<Value = Rect> {
        (
            -200.0f64..200.0,
            -200.0f64..200.0,
            0.0f64..300.0,
            0.0f64..300.0,
        )
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Every reported intersection lies on the rectangle outline.
    fn check_intersections_on_outline(rect: Rect, a: Point, b: Point) -> Result<(), TestCaseError> {
        let line = Line::new(a, b);
        for p in rect.intersection_with_line(&line) {
            let on_outline = rect.sides().iter().any(|side| side.distance_to_point(p) < 1e-6);
            prop_assert!(on_outline, "{p:?} not on outline of {rect:?}");
        }
        Ok(())
    }

    /// The nearest outline point is always contained in the rectangle.
    fn check_nearest_point_contained(rect: Rect, p: Point) -> Result<(), TestCaseError> {
        let nearest = rect.point_nearest_to_point(p);
        prop_assert!(rect.inflate(1e-9, 1e-9).contains_point(nearest));
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn intersections_on_outline(rect in rect_strategy(), a in point_strategy(), b in point_strategy()) {
            check_intersections_on_outline(rect, a, b)?;
        }

        #[test]
        fn nearest_point_contained(rect in rect_strategy(), p in point_strategy()) {
            check_nearest_point_contained(rect, p)?;
        }
    }
}
