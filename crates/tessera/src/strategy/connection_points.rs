//! Connection points: where the drawn link meets the magnet.
//!
//! Every strategy receives the line from the reference point to the anchor
//! and answers with a point on (or near) the magnet. The `offset` option
//! moves the answer back toward the reference.

use serde_json::Value;

use tessera_core::{
    geometry::{Line, Point, Shape},
    scene::NodeId,
};

use crate::{
    error::TesseraError,
    strategy::{Args, ConnectionPoint, MagnetView, offset_point_with},
};

const FAR: f64 = 1e6;

/// The anchor itself.
///
/// `align` (`left`, `right`, `top`, `bottom`) snaps the line so its last
/// segment runs straight along that direction, shifted by `alignOffset`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchorPoint;

impl ConnectionPoint for AnchorPoint {
    fn connection_point(
        &self,
        line: &Line,
        _magnet: &MagnetView<'_>,
        args: &Args<'_>,
    ) -> Result<Point, TesseraError> {
        let line = match args.string("align") {
            Some(align) => align_line(line, align, args.number_or("alignOffset", 0.0)),
            None => *line,
        };
        Ok(offset_point_with(line.end(), line.start(), args.get("offset")))
    }
}

fn align_line(line: &Line, align: &str, offset: f64) -> Line {
    let (mut start, mut end) = (line.start(), line.end());
    match align {
        "left" | "right" => {
            let direction = if align == "left" { -1.0 } else { 1.0 };
            let x = if align == "left" {
                start.x().min(end.x())
            } else {
                start.x().max(end.x())
            } + direction * offset;
            start = start.with_x(x);
            end = end.with_x(x);
        }
        "top" | "bottom" => {
            let direction = if align == "top" { -1.0 } else { 1.0 };
            let y = if align == "top" {
                start.y().min(end.y())
            } else {
                start.y().max(end.y())
            } + direction * offset;
            start = start.with_y(y);
            end = end.with_y(y);
        }
        _ => {}
    }
    Line::new(start, end)
}

/// Intersection with the magnet's box, nearest to the reference.
/// With `stroke` the box is inflated by half the stroke width.
#[derive(Debug, Clone, Copy, Default)]
pub struct BBoxPoint;

impl ConnectionPoint for BBoxPoint {
    fn connection_point(
        &self,
        line: &Line,
        magnet: &MagnetView<'_>,
        args: &Args<'_>,
    ) -> Result<Point, TesseraError> {
        let mut bbox = magnet.bbox();
        if args.flag("stroke") {
            let half = magnet.stroke_width(magnet.magnet()) / 2.0;
            bbox = bbox.inflate(half, half);
        }
        let intersections = bbox.intersection_with_line(line);
        let point = line
            .start()
            .choose_closest(&intersections)
            .unwrap_or(line.end());
        Ok(offset_point_with(point, line.start(), args.get("offset")))
    }
}

/// Like [`BBoxPoint`], but against the unrotated box so rotated elements
/// get a point on their actual outline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RectanglePoint;

impl ConnectionPoint for RectanglePoint {
    fn connection_point(
        &self,
        line: &Line,
        magnet: &MagnetView<'_>,
        args: &Args<'_>,
    ) -> Result<Point, TesseraError> {
        let angle = magnet.angle();
        if angle == 0.0 {
            return BBoxPoint.connection_point(line, magnet, args);
        }
        let mut bbox = magnet.unrotated_bbox();
        if args.flag("stroke") {
            let half = magnet.stroke_width(magnet.magnet()) / 2.0;
            bbox = bbox.inflate(half, half);
        }
        let center = bbox.center();
        let unrotated = line.rotate(center, -angle);
        let extended = unrotated.set_length(FAR);
        let point = unrotated
            .start()
            .choose_closest(&bbox.intersection_with_line(&extended))
            .map(|p| p.rotate(center, angle))
            .unwrap_or(line.end());
        Ok(offset_point_with(point, line.start(), args.get("offset")))
    }
}

/// Intersection with the actual outline of the shape node.
///
/// Options:
/// - `selector`: the node to intersect (default: the first shape inside the magnet)
/// - `insideout`: when `false`, a reference inside the shape keeps the anchor
/// - `extrapolate`: extend the line past the anchor
/// - `sticky`: without an intersection, use the outline point nearest to the reference
/// - `precision`: curve subdivision precision (default 2)
/// - `offset`, `stroke`: as for the other strategies
///
/// # Errors
///
/// [`TesseraError::NoIntersection`] when the line misses the outline;
/// callers fall back to the anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Boundary;

impl ConnectionPoint for Boundary {
    fn connection_point(
        &self,
        line: &Line,
        magnet: &MagnetView<'_>,
        args: &Args<'_>,
    ) -> Result<Point, TesseraError> {
        let anchor = line.end();
        let Some((node, shape)) = boundary_node(magnet, args) else {
            return Ok(anchor);
        };

        let matrix = magnet.node_matrix(node);
        let Some(inverse) = matrix.inverse() else {
            return Ok(anchor);
        };
        let mut local = Line::new(inverse.apply(line.start()), inverse.apply(line.end()));
        let local_reference = local.start();

        if !args.flag_or("insideout", true) && shape.bbox().contains_point(local_reference) {
            return Ok(anchor);
        }
        if args.flag("extrapolate") {
            local = local.set_length(FAR);
        }

        let precision = args
            .number("precision")
            .filter(|p| *p >= 0.0)
            .map(|p| p as u32)
            .unwrap_or(2);
        let intersections = match &shape {
            Shape::Path(_) => magnet
                .subpaths(node, precision)
                .iter()
                .flat_map(|polyline| polyline.intersection_with_line(&local, false))
                .collect(),
            other => other.intersection_with_line(&local, precision),
        };
        let mut intersection = local_reference.choose_closest(&intersections);
        if intersection.is_none() && args.flag("sticky") {
            intersection = Some(sticky_point(&shape, magnet, node, local_reference, precision));
        }
        let Some(intersection) = intersection else {
            return Err(TesseraError::NoIntersection(format!(
                "the line from {} to {} misses the outline of `{}`",
                fmt_point(line.start()),
                fmt_point(anchor),
                magnet.cell().id()
            )));
        };

        let point = matrix.apply(intersection);
        let mut offset = args.get("offset").cloned().unwrap_or(Value::Null);
        if args.flag("stroke") {
            let half = magnet.stroke_width(node) / 2.0;
            offset = match offset {
                Value::Object(mut object) => {
                    let x = object.get("x").and_then(Value::as_f64).unwrap_or(0.0);
                    object.insert("x".to_string(), Value::from(x + half));
                    Value::Object(object)
                }
                other => Value::from(other.as_f64().unwrap_or(0.0) + half),
            };
        }
        Ok(offset_point_with(point, line.start(), Some(&offset)))
    }
}

/// The node to intersect and its outline. Falls back to the magnet when
/// the selected node has no outline.
fn boundary_node(magnet: &MagnetView<'_>, args: &Args<'_>) -> Option<(NodeId, Shape)> {
    let node = match args.get("selector") {
        Some(Value::String(selector)) => magnet.find(selector),
        Some(Value::Bool(false)) => Some(magnet.magnet()),
        _ => Some(magnet.shape_node(magnet.magnet())),
    };
    if let Some(node) = node {
        if let Some(shape) = magnet.shape(node) {
            return Some((node, shape));
        }
        if node == magnet.magnet() {
            return None;
        }
    }
    let fallback = magnet.magnet();
    magnet.shape(fallback).map(|shape| (fallback, shape))
}

fn sticky_point(shape: &Shape, magnet: &MagnetView<'_>, node: NodeId, reference: Point, precision: u32) -> Point {
    match shape {
        Shape::Path(_) => magnet
            .subpaths(node, precision)
            .iter()
            .filter_map(|polyline| polyline.closest_point(reference))
            .min_by(|a, b| {
                reference
                    .squared_distance(*a)
                    .total_cmp(&reference.squared_distance(*b))
            })
            .unwrap_or(reference),
        other => other.closest_point(reference, precision),
    }
}

fn fmt_point(p: Point) -> String {
    format!("({}, {})", p.x(), p.y())
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use tessera_core::geometry::Size;

    use super::*;
    use crate::strategy::anchors::test_support::fixture;

    #[test]
    fn test_anchor_point_offset_and_align() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(10.0, 10.0), 0.0);
        let line = Line::new(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
        let offset = json!({ "offset": 10 });
        let p = AnchorPoint
            .connection_point(&line, &f.magnet(), &Args::new(&offset))
            .unwrap();
        assert!(p.approx_eq(Point::new(90.0, 0.0), 1e-9));

        let line = Line::new(Point::new(0.0, 0.0), Point::new(50.0, 80.0));
        let align = json!({ "align": "top", "alignOffset": 5 });
        let p = AnchorPoint
            .connection_point(&line, &f.magnet(), &Args::new(&align))
            .unwrap();
        assert!(p.approx_eq(Point::new(50.0, -5.0), 1e-9));
    }

    #[test]
    fn test_bbox_point() {
        let f = fixture(Point::new(100.0, 0.0), Size::new(100.0, 100.0), 0.0);
        let line = Line::new(Point::new(0.0, 50.0), Point::new(150.0, 50.0));
        let none = Value::Null;
        let p = BBoxPoint
            .connection_point(&line, &f.magnet(), &Args::new(&none))
            .unwrap();
        assert!(p.approx_eq(Point::new(100.0, 50.0), 1e-9));
    }

    #[test]
    fn test_rectangle_point_on_rotated_element() {
        // A 100x20 bar turned upright: its outline is 20 wide, not 100
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 20.0), 90.0);
        let line = Line::new(Point::new(-200.0, 10.0), Point::new(50.0, 10.0));
        let none = Value::Null;
        let p = RectanglePoint
            .connection_point(&line, &f.magnet(), &Args::new(&none))
            .unwrap();
        assert_approx_eq!(f64, p.x(), 40.0, epsilon = 1e-6);
        assert_approx_eq!(f64, p.y(), 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_boundary_on_rotated_rect() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 20.0), 90.0);
        let line = Line::new(Point::new(-200.0, 10.0), Point::new(50.0, 10.0));
        let none = Value::Null;
        let p = Boundary
            .connection_point(&line, &f.magnet(), &Args::new(&none))
            .unwrap();
        assert_approx_eq!(f64, p.x(), 40.0, epsilon = 1e-6);
    }

    #[test]
    fn test_boundary_stroke_and_offset() {
        let mut f = fixture(Point::new(100.0, 0.0), Size::new(100.0, 100.0), 0.0);
        f.scene.set_attribute(f.body, "stroke-width", "4").unwrap();
        let line = Line::new(Point::new(0.0, 50.0), Point::new(150.0, 50.0));
        let args = json!({ "stroke": true, "offset": 3 });
        let p = Boundary
            .connection_point(&line, &f.magnet(), &Args::new(&args))
            .unwrap();
        assert!(p.approx_eq(Point::new(95.0, 50.0), 1e-9));
    }

    #[test]
    fn test_boundary_degenerate_line_reports_no_intersection() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 100.0), 0.0);
        let anchor = Point::new(50.0, 50.0);
        let line = Line::new(anchor, anchor);
        let none = Value::Null;
        let err = Boundary
            .connection_point(&line, &f.magnet(), &Args::new(&none))
            .unwrap_err();
        assert!(matches!(err, TesseraError::NoIntersection(_)));
    }

    #[test]
    fn test_boundary_insideout_and_sticky() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 100.0), 0.0);
        let line = Line::new(Point::new(20.0, 50.0), Point::new(50.0, 50.0));
        let outside_only = json!({ "insideout": false });
        let p = Boundary
            .connection_point(&line, &f.magnet(), &Args::new(&outside_only))
            .unwrap();
        assert_eq!(p, Point::new(50.0, 50.0));

        let sticky = json!({ "sticky": true });
        let p = Boundary
            .connection_point(&line, &f.magnet(), &Args::new(&sticky))
            .unwrap();
        assert!(p.approx_eq(Point::new(0.0, 50.0), 1e-9));
    }

    #[test]
    fn test_boundary_on_path_outline() {
        let mut f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 100.0), 0.0);
        let diamond = f.scene.create_element("path");
        f.scene
            .set_attribute(diamond, "d", "M 50 0 L 100 50 L 50 100 L 0 50 Z")
            .unwrap();
        f.scene.append_child(f.root, diamond).unwrap();
        f.selectors.insert("diamond", diamond).unwrap();
        let line = Line::new(Point::new(-100.0, 25.0), Point::new(50.0, 25.0));
        let args = json!({ "selector": "diamond" });
        let p = Boundary
            .connection_point(&line, &f.magnet(), &Args::new(&args))
            .unwrap();
        assert!(p.approx_eq(Point::new(25.0, 25.0), 1e-9));
    }
}
