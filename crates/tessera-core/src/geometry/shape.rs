use super::{Ellipse, Line, Matrix, Path, Point, Polyline, Rect};

/// The outline of a drawable node.
///
/// Connection points and hit-testing work against these outlines in the
/// node's local coordinate space. Each variant corresponds to an SVG element:
/// `rect`, `circle`/`ellipse`, `line`, `polyline`, `polygon` and `path`.
/// Anything else (groups, text, images) is treated as its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Rect(Rect),
    Ellipse(Ellipse),
    Line(Line),
    Polyline(Polyline),
    Polygon(Polyline),
    Path(Path),
}

impl Shape {
    /// Bounding box of the outline.
    pub fn bbox(&self) -> Rect {
        match self {
            Shape::Rect(rect) => *rect,
            Shape::Ellipse(ellipse) => ellipse.bbox(),
            Shape::Line(line) => line.bbox(),
            Shape::Polyline(polyline) | Shape::Polygon(polyline) => {
                polyline.bbox().unwrap_or_default()
            }
            Shape::Path(path) => path.bbox().unwrap_or_default(),
        }
    }

    /// Intersections of a segment with the outline, nearest to the line
    /// start first.
    pub fn intersection_with_line(&self, line: &Line, precision: u32) -> Vec<Point> {
        match self {
            Shape::Rect(rect) => rect.intersection_with_line(line),
            Shape::Ellipse(ellipse) => ellipse.intersection_with_line(line),
            Shape::Line(segment) => segment.intersection_with_line(line).into_iter().collect(),
            Shape::Polyline(polyline) => polyline.intersection_with_line(line, false),
            Shape::Polygon(polyline) => polyline.intersection_with_line(line, true),
            Shape::Path(path) => path.intersection_with_line(line, precision),
        }
    }

    /// Whether the point is inside the filled area of the shape. Open shapes
    /// (lines) contain nothing.
    pub fn contains_point(&self, p: Point) -> bool {
        match self {
            Shape::Rect(rect) => rect.contains_point(p),
            Shape::Ellipse(ellipse) => ellipse.contains_point(p),
            Shape::Line(_) => false,
            Shape::Polyline(polyline) | Shape::Polygon(polyline) => polyline.contains_point(p),
            Shape::Path(path) => path.contains_point(p),
        }
    }

    /// Point on the outline nearest to `p`.
    pub fn closest_point(&self, p: Point, precision: u32) -> Point {
        match self {
            Shape::Rect(rect) => rect.point_nearest_to_point(p),
            Shape::Ellipse(ellipse) => {
                if ellipse.is_degenerate() || p.approx_eq(ellipse.center(), 1e-9) {
                    ellipse.bbox().point_nearest_to_point(p)
                } else {
                    ellipse.intersection_with_line_from_center_to_point(p, 0.0)
                }
            }
            Shape::Line(line) => line.closest_point(p),
            Shape::Polyline(polyline) => polyline.closest_point(p).unwrap_or(p),
            Shape::Polygon(polyline) => {
                let mut closed = polyline.points().to_vec();
                if let Some(first) = polyline.first() {
                    closed.push(first);
                }
                Polyline::new(closed).closest_point(p).unwrap_or(p)
            }
            Shape::Path(path) => path.closest_point(p, precision).unwrap_or(p),
        }
    }

    /// The outline as a path.
    pub fn to_path(&self) -> Path {
        match self {
            Shape::Rect(rect) => {
                let mut path = Path::from_points(&[
                    rect.origin(),
                    rect.top_right(),
                    rect.corner(),
                    rect.bottom_left(),
                ]);
                path.close();
                path
            }
            Shape::Ellipse(ellipse) => Path::ellipse(ellipse.center(), ellipse.a(), ellipse.b()),
            Shape::Line(line) => Path::from_points(&[line.start(), line.end()]),
            Shape::Polyline(polyline) => Path::from_points(polyline.points()),
            Shape::Polygon(polyline) => {
                let mut path = Path::from_points(polyline.points());
                path.close();
                path
            }
            Shape::Path(path) => path.clone(),
        }
    }

    /// Applies a transform. Rectangles and ellipses that stay axis-aligned
    /// keep their kind; anything rotated or skewed becomes a path.
    pub fn transform(&self, matrix: &Matrix) -> Shape {
        let axis_aligned = matrix.b().abs() < 1e-12 && matrix.c().abs() < 1e-12;
        match self {
            Shape::Rect(rect) if axis_aligned => Shape::Rect(matrix.apply_rect(rect)),
            Shape::Ellipse(ellipse) if axis_aligned => Shape::Ellipse(Ellipse::new(
                matrix.apply(ellipse.center()),
                ellipse.a() * matrix.a().abs(),
                ellipse.b() * matrix.d().abs(),
            )),
            Shape::Line(line) => Shape::Line(Line::new(
                matrix.apply(line.start()),
                matrix.apply(line.end()),
            )),
            Shape::Polyline(polyline) => Shape::Polyline(Polyline::new(
                polyline.points().iter().map(|p| matrix.apply(*p)).collect(),
            )),
            Shape::Polygon(polyline) => Shape::Polygon(Polyline::new(
                polyline.points().iter().map(|p| matrix.apply(*p)).collect(),
            )),
            other => Shape::Path(other.to_path().transform(matrix)),
        }
    }
}
