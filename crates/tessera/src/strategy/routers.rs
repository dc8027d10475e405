//! Routers.

use tessera_core::geometry::{Point, Rect};

use crate::{
    error::TesseraError,
    strategy::{Args, RouteEnd, Router},
};

/// The link's vertices, unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalRouter;

impl Router for NormalRouter {
    fn route(
        &self,
        vertices: &[Point],
        _source: &RouteEnd,
        _target: &RouteEnd,
        _args: &Args<'_>,
    ) -> Result<Vec<Point>, TesseraError> {
        Ok(vertices.to_vec())
    }
}

/// Inserts elbows so that every segment is horizontal or vertical.
///
/// Between two points that are not aligned one elbow is added. The elbow
/// leaves along the longer axis unless that corner falls inside one of the
/// end boxes, in which case the other corner is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrthogonalRouter;

impl Router for OrthogonalRouter {
    fn route(
        &self,
        vertices: &[Point],
        source: &RouteEnd,
        target: &RouteEnd,
        _args: &Args<'_>,
    ) -> Result<Vec<Point>, TesseraError> {
        let mut points = Vec::with_capacity(vertices.len() + 2);
        points.push(source.anchor());
        points.extend_from_slice(vertices);
        points.push(target.anchor());

        let boxes: Vec<Rect> = [source.bbox(), target.bbox()].into_iter().flatten().collect();
        let mut route = Vec::with_capacity(vertices.len() * 2 + 1);
        for (index, pair) in points.windows(2).enumerate() {
            let (from, to) = (pair[0], pair[1]);
            if index > 0 {
                route.push(from);
            }
            if let Some(elbow) = elbow(from, to, &boxes) {
                route.push(elbow);
            }
        }
        Ok(route)
    }
}

fn elbow(from: Point, to: Point, boxes: &[Rect]) -> Option<Point> {
    let (dx, dy) = ((to.x() - from.x()).abs(), (to.y() - from.y()).abs());
    if dx < 1e-9 || dy < 1e-9 {
        return None;
    }
    let horizontal_first = Point::new(to.x(), from.y());
    let vertical_first = Point::new(from.x(), to.y());
    let (preferred, other) = if dx >= dy {
        (horizontal_first, vertical_first)
    } else {
        (vertical_first, horizontal_first)
    };
    let blocked = |p: Point| boxes.iter().any(|bbox| strictly_inside(bbox, p));
    if blocked(preferred) && !blocked(other) {
        Some(other)
    } else {
        Some(preferred)
    }
}

fn strictly_inside(bbox: &Rect, p: Point) -> bool {
    p.x() > bbox.x()
        && p.x() < bbox.x() + bbox.width()
        && p.y() > bbox.y()
        && p.y() < bbox.y() + bbox.height()
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn end(x: f64, y: f64) -> RouteEnd {
        RouteEnd::new(Point::new(x, y), None)
    }

    #[test]
    fn test_normal_router_keeps_vertices() {
        let none = Value::Null;
        let vertices = [Point::new(5.0, 5.0)];
        let route = NormalRouter
            .route(&vertices, &end(0.0, 0.0), &end(10.0, 10.0), &Args::new(&none))
            .unwrap();
        assert_eq!(route, vertices.to_vec());
    }

    #[test]
    fn test_orthogonal_segments_are_axis_aligned() {
        let none = Value::Null;
        let source = end(0.0, 0.0);
        let target = end(100.0, 40.0);
        let vertices = [Point::new(30.0, 80.0)];
        let route = OrthogonalRouter
            .route(&vertices, &source, &target, &Args::new(&none))
            .unwrap();
        let mut points = vec![source.anchor()];
        points.extend(route.iter().copied());
        points.push(target.anchor());
        for pair in points.windows(2) {
            let aligned = (pair[0].x() - pair[1].x()).abs() < 1e-9 || (pair[0].y() - pair[1].y()).abs() < 1e-9;
            assert!(aligned, "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(route.contains(&Point::new(30.0, 80.0)));
    }

    #[test]
    fn test_orthogonal_avoids_end_box() {
        let none = Value::Null;
        // Horizontal-first would turn inside the source box
        let source = RouteEnd::new(Point::new(10.0, 50.0), Some(Rect::new(0.0, 0.0, 100.0, 100.0)));
        let target = end(90.0, 110.0);
        let route = OrthogonalRouter
            .route(&[], &source, &target, &Args::new(&none))
            .unwrap();
        assert_eq!(route, vec![Point::new(10.0, 110.0)]);

        let aligned = OrthogonalRouter
            .route(&[], &end(0.0, 0.0), &end(0.0, 50.0), &Args::new(&none))
            .unwrap();
        assert!(aligned.is_empty());
    }
}
