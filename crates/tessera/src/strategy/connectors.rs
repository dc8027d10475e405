//! Connectors.

use tessera_core::geometry::{Curve, Path, Point};

use crate::{
    error::TesseraError,
    strategy::{Args, Connector},
};

const DEFAULT_RADIUS: f64 = 10.0;

/// Straight segments through the route.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalConnector;

impl Connector for NormalConnector {
    fn connect(
        &self,
        source: Point,
        target: Point,
        route: &[Point],
        _args: &Args<'_>,
    ) -> Result<Path, TesseraError> {
        Ok(Path::from_points(&all_points(source, target, route)))
    }
}

/// Straight segments with each corner replaced by a cubic arc of at most
/// `radius` (default 10). The arc never eats more than half of a segment.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundedConnector;

impl Connector for RoundedConnector {
    fn connect(
        &self,
        source: Point,
        target: Point,
        route: &[Point],
        args: &Args<'_>,
    ) -> Result<Path, TesseraError> {
        let radius = args.number("radius").filter(|r| *r >= 0.0).unwrap_or(DEFAULT_RADIUS);
        let points = all_points(source, target, route);
        let mut path = Path::new();
        path.move_to(source);
        for corner in points.windows(3) {
            let (previous, current, next) = (corner[0], corner[1], corner[2]);
            let start_move = radius.min(current.distance(previous) / 2.0);
            let end_move = radius.min(current.distance(next) / 2.0);
            let rounded_start = current.move_along(previous, -start_move);
            let rounded_end = current.move_along(next, -end_move);
            let control1 = rounded_start.lerp(current, 2.0 / 3.0);
            let control2 = rounded_end.lerp(current, 2.0 / 3.0);
            path.line_to(rounded_start)
                .curve_to(control1, control2, rounded_end);
        }
        path.line_to(target);
        Ok(path)
    }
}

/// A smooth cubic spline through the route.
///
/// Without a route the single curve bends along the dominant axis.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothConnector;

impl Connector for SmoothConnector {
    fn connect(
        &self,
        source: Point,
        target: Point,
        route: &[Point],
        _args: &Args<'_>,
    ) -> Result<Path, TesseraError> {
        let mut path = Path::new();
        path.move_to(source);
        if route.is_empty() {
            let (dx, dy) = ((target.x() - source.x()).abs(), (target.y() - source.y()).abs());
            if dx >= dy {
                let mid = (source.x() + target.x()) / 2.0;
                path.curve_to(Point::new(mid, source.y()), Point::new(mid, target.y()), target);
            } else {
                let mid = (source.y() + target.y()) / 2.0;
                path.curve_to(Point::new(source.x(), mid), Point::new(target.x(), mid), target);
            }
            return Ok(path);
        }
        for curve in Curve::through_points(&all_points(source, target, route)) {
            path.curve_to(curve.control1(), curve.control2(), curve.end());
        }
        Ok(path)
    }
}

fn all_points(source: Point, target: Point, route: &[Point]) -> Vec<Point> {
    let mut points = Vec::with_capacity(route.len() + 2);
    points.push(source);
    points.extend_from_slice(route);
    points.push(target);
    points
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::{Value, json};

    use tessera_core::geometry::DEFAULT_PRECISION;

    use super::*;

    #[test]
    fn test_normal_connector() {
        let none = Value::Null;
        let path = NormalConnector
            .connect(
                Point::new(0.0, 0.0),
                Point::new(10.0, 10.0),
                &[Point::new(10.0, 0.0)],
                &Args::new(&none),
            )
            .unwrap();
        assert_eq!(path.to_string(), "M 0 0 L 10 0 L 10 10");
    }

    #[test]
    fn test_rounded_corner_respects_radius() {
        let args = json!({ "radius": 5 });
        let path = RoundedConnector
            .connect(
                Point::new(0.0, 0.0),
                Point::new(100.0, 100.0),
                &[Point::new(100.0, 0.0)],
                &Args::new(&args),
            )
            .unwrap();
        let text = path.to_string();
        assert!(text.starts_with("M 0 0 L 95 0 C"), "{text}");
        assert!(text.ends_with("100 5 L 100 100"), "{text}");
        // Shorter than the sharp corner
        assert!(path.length(DEFAULT_PRECISION) < 200.0);
    }

    #[test]
    fn test_rounded_clamps_to_half_segment() {
        let args = json!({ "radius": 50 });
        let path = RoundedConnector
            .connect(
                Point::new(0.0, 0.0),
                Point::new(10.0, 10.0),
                &[Point::new(10.0, 0.0)],
                &Args::new(&args),
            )
            .unwrap();
        assert!(path.to_string().starts_with("M 0 0 L 5 0 C"));
    }

    #[test]
    fn test_smooth_connector_ends() {
        let none = Value::Null;
        let source = Point::new(0.0, 0.0);
        let target = Point::new(100.0, 20.0);
        let path = SmoothConnector
            .connect(source, target, &[], &Args::new(&none))
            .unwrap();
        assert_eq!(path.to_string(), "M 0 0 C 50 0 50 20 100 20");

        let path = SmoothConnector
            .connect(source, target, &[Point::new(50.0, 80.0)], &Args::new(&none))
            .unwrap();
        let end = path.end().unwrap();
        assert_approx_eq!(f64, end.x(), 100.0);
        assert_approx_eq!(f64, end.y(), 20.0);
    }
}
