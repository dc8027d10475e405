//! Element anchors.

use serde_json::Value;

use tessera_core::geometry::{Point, Rect, Side};

use crate::{
    error::TesseraError,
    strategy::{Anchor, Args, MagnetView},
    view::calc,
};

/// Anchors at a fixed point of the magnet box, shifted by `dx`/`dy`.
///
/// Options:
/// - `rotate`: work on the unrotated box and rotate the result with the element
/// - `dx`, `dy`: a number, `"n%"` of the box size or a `calc()` over the box
/// - `useModelGeometry`: use the model box (or the port) instead of the rendered node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BBoxAnchor {
    Center,
    Top,
    Bottom,
    Left,
    Right,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl BBoxAnchor {
    /// Every variant with its registered name.
    pub fn all() -> [(&'static str, BBoxAnchor); 9] {
        [
            ("center", Self::Center),
            ("top", Self::Top),
            ("bottom", Self::Bottom),
            ("left", Self::Left),
            ("right", Self::Right),
            ("topLeft", Self::TopLeft),
            ("topRight", Self::TopRight),
            ("bottomLeft", Self::BottomLeft),
            ("bottomRight", Self::BottomRight),
        ]
    }

    fn point_of(self, bbox: &Rect) -> Point {
        match self {
            Self::Center => bbox.center(),
            Self::Top => bbox.top_middle(),
            Self::Bottom => bbox.bottom_middle(),
            Self::Left => bbox.left_middle(),
            Self::Right => bbox.right_middle(),
            Self::TopLeft => bbox.origin(),
            Self::TopRight => bbox.top_right(),
            Self::BottomLeft => bbox.bottom_left(),
            Self::BottomRight => bbox.corner(),
        }
    }
}

impl Anchor for BBoxAnchor {
    fn anchor(&self, magnet: &MagnetView<'_>, _reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let rotate = args.flag("rotate");
        let bbox = if args.flag("useModelGeometry") {
            magnet.model_bbox(!rotate)
        } else if rotate {
            magnet.unrotated_bbox()
        } else {
            magnet.bbox()
        };
        let dx = shift(args.get("dx"), bbox.width(), &bbox)?;
        let dy = shift(args.get("dy"), bbox.height(), &bbox)?;
        let anchor = self.point_of(&bbox).offset(dx, dy);
        if rotate {
            Ok(anchor.rotate(magnet.center(), magnet.angle()))
        } else {
            Ok(anchor)
        }
    }
}

fn shift(value: Option<&Value>, extent: f64, bbox: &Rect) -> Result<f64, TesseraError> {
    match value {
        None => Ok(0.0),
        Some(value) => {
            let shift = calc::length(value, extent, bbox)?;
            Ok(if shift.is_finite() { shift } else { 0.0 })
        }
    }
}

/// Anchors at the middle of the side facing the reference point.
///
/// `mode` picks the candidate sides:
/// - `auto` (default): the side nearest to the reference
/// - `horizontal` / `vertical`: left or right, top or bottom
/// - `prefer-horizontal` / `prefer-vertical`: top or bottom (left or right)
///   while the reference is within the box's horizontal (vertical) extent
///   widened by `preferenceThreshold`, else the other pair
#[derive(Debug, Clone, Copy, Default)]
pub struct MidSide;

impl Anchor for MidSide {
    fn anchor(&self, magnet: &MagnetView<'_>, reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let rotate = args.flag("rotate");
        let angle = magnet.angle();
        let center = magnet.center();
        let mut bbox = if args.flag("useModelGeometry") {
            magnet.model_bbox(!rotate)
        } else if rotate {
            magnet.unrotated_bbox()
        } else {
            magnet.bbox()
        };
        if let Some(padding) = args.number("padding").filter(|p| p.is_finite()) {
            bbox = bbox.inflate(padding, padding);
        }
        let reference = if rotate {
            reference.rotate(center, -angle)
        } else {
            reference
        };
        let threshold = Thresholds::from_value(args.get("preferenceThreshold"));
        let side = middle_side(&bbox, reference, args.string("mode").unwrap_or("auto"), &threshold);
        let anchor = bbox.side_middle(side);
        if rotate {
            Ok(anchor.rotate(center, angle))
        } else {
            Ok(anchor)
        }
    }
}

/// Per-side widening of the preference zone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Thresholds {
    left: f64,
    right: f64,
    top: f64,
    bottom: f64,
}

impl Thresholds {
    fn from_value(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Number(n)) => {
                let n = n.as_f64().unwrap_or(0.0);
                Self {
                    left: n,
                    right: n,
                    top: n,
                    bottom: n,
                }
            }
            Some(Value::Object(sides)) => {
                let read = |keys: &[&str]| {
                    keys.iter()
                        .find_map(|key| sides.get(*key).and_then(Value::as_f64))
                        .unwrap_or(0.0)
                };
                Self {
                    left: read(&["left", "horizontal"]),
                    right: read(&["right", "horizontal"]),
                    top: read(&["top", "vertical"]),
                    bottom: read(&["bottom", "vertical"]),
                }
            }
            _ => Self::default(),
        }
    }
}

fn middle_side(bbox: &Rect, p: Point, mode: &str, threshold: &Thresholds) -> Side {
    let horizontal = || {
        if p.x() < bbox.center().x() {
            Side::Left
        } else {
            Side::Right
        }
    };
    let vertical = || {
        if p.y() < bbox.center().y() {
            Side::Top
        } else {
            Side::Bottom
        }
    };
    match mode {
        "prefer-vertical" => {
            let top = bbox.y() - threshold.top;
            let bottom = bbox.y() + bbox.height() + threshold.bottom;
            if p.y() > top && p.y() < bottom {
                horizontal()
            } else {
                vertical()
            }
        }
        "vertical" => vertical(),
        "prefer-horizontal" => {
            let left = bbox.x() - threshold.left;
            let right = bbox.x() + bbox.width() + threshold.right;
            if p.x() > left && p.x() < right {
                vertical()
            } else {
                horizontal()
            }
        }
        "horizontal" => horizontal(),
        _ => bbox.side_nearest_to_point(p),
    }
}

/// Anchors on the box where a horizontal or vertical line through the
/// reference meets it, so the link leaves perpendicular to the side.
///
/// The reference must lie within the box's extent shrunk by `padding`;
/// otherwise the center is used.
#[derive(Debug, Clone, Copy, Default)]
pub struct Perpendicular;

impl Anchor for Perpendicular {
    fn anchor(&self, magnet: &MagnetView<'_>, reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let angle = magnet.angle();
        let bbox = if args.flag("useModelGeometry") {
            magnet.model_bbox(true)
        } else {
            magnet.bbox()
        };
        let padding = args.number("padding").filter(|p| p.is_finite()).unwrap_or(0.0);
        let center = bbox.center();
        let (top_left, bottom_right) = (bbox.origin(), bbox.corner());
        let mut anchor = center;
        if top_left.y() + padding <= reference.y() && reference.y() <= bottom_right.y() - padding {
            let dy = reference.y() - center.y();
            let dx = if angle == 0.0 || angle == 180.0 {
                0.0
            } else {
                dy / angle.to_radians().tan()
            };
            anchor = anchor.offset(dx, dy);
        } else if top_left.x() + padding <= reference.x() && reference.x() <= bottom_right.x() - padding {
            let dx = reference.x() - center.x();
            let dy = if angle == 90.0 || angle == 270.0 {
                0.0
            } else {
                dx * angle.to_radians().tan()
            };
            anchor = anchor.offset(dx, dy);
        }
        Ok(anchor)
    }
}

/// Anchors at the model center of the element, or of the port the end
/// targets, shifted by `dx`/`dy`. Ignores the rendered nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelCenter;

impl Anchor for ModelCenter {
    fn anchor(&self, magnet: &MagnetView<'_>, _reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let center = magnet
            .port_center(true)
            .unwrap_or_else(|| magnet.center());
        Ok(center.offset(args.number_or("dx", 0.0), args.number_or("dy", 0.0)))
    }
}


#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use tessera_core::geometry::Size;

    use super::{test_support::fixture, *};

    fn args(value: &Value) -> Args<'_> {
        Args::new(value)
    }

    #[test]
    fn test_bbox_anchors() {
        let f = fixture(Point::new(10.0, 20.0), Size::new(100.0, 40.0), 0.0);
        let magnet = f.magnet();
        let none = Value::Null;
        let far = Point::new(500.0, 500.0);
        let center = BBoxAnchor::Center.anchor(&magnet, far, &args(&none)).unwrap();
        assert!(center.approx_eq(Point::new(60.0, 40.0), 1e-9));
        let corner = BBoxAnchor::BottomRight.anchor(&magnet, far, &args(&none)).unwrap();
        assert!(corner.approx_eq(Point::new(110.0, 60.0), 1e-9));

        let shifted = json!({ "dx": "10%", "dy": "calc(h / 4)" });
        let p = BBoxAnchor::TopLeft.anchor(&magnet, far, &args(&shifted)).unwrap();
        assert!(p.approx_eq(Point::new(20.0, 30.0), 1e-9));
    }

    #[test]
    fn test_bbox_anchor_rotate() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 40.0), 90.0);
        let magnet = f.magnet();
        let rotate = json!({ "rotate": true });
        // The right middle of the unrotated box turns to the bottom
        let p = BBoxAnchor::Right.anchor(&magnet, Point::new(0.0, 0.0), &args(&rotate)).unwrap();
        assert!(p.approx_eq(Point::new(50.0, 70.0), 1e-6));

        // Without rotate the rotated box is used as is
        let none = Value::Null;
        let p = BBoxAnchor::Right.anchor(&magnet, Point::new(0.0, 0.0), &args(&none)).unwrap();
        assert!(p.approx_eq(Point::new(70.0, 20.0), 1e-6));
    }

    #[test]
    fn test_mid_side_modes() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 100.0), 0.0);
        let magnet = f.magnet();
        let auto = Value::Null;
        let p = MidSide.anchor(&magnet, Point::new(200.0, 60.0), &args(&auto)).unwrap();
        assert!(p.approx_eq(Point::new(100.0, 50.0), 1e-9));

        let vertical = json!({ "mode": "vertical" });
        let p = MidSide.anchor(&magnet, Point::new(200.0, 60.0), &args(&vertical)).unwrap();
        assert!(p.approx_eq(Point::new(50.0, 100.0), 1e-9));

        // Above the box but horizontally inside it: top/bottom are preferred
        let prefer = json!({ "mode": "prefer-horizontal" });
        let p = MidSide.anchor(&magnet, Point::new(40.0, -80.0), &args(&prefer)).unwrap();
        assert!(p.approx_eq(Point::new(50.0, 0.0), 1e-9));
        let p = MidSide.anchor(&magnet, Point::new(-40.0, 20.0), &args(&prefer)).unwrap();
        assert!(p.approx_eq(Point::new(0.0, 50.0), 1e-9));

        let padded = json!({ "padding": 10 });
        let p = MidSide.anchor(&magnet, Point::new(-40.0, 50.0), &args(&padded)).unwrap();
        assert!(p.approx_eq(Point::new(-10.0, 50.0), 1e-9));
    }

    #[test]
    fn test_mid_side_stable_under_rotation() {
        let rotate = json!({ "rotate": true });
        let straight = fixture(Point::new(0.0, 0.0), Size::new(80.0, 40.0), 0.0);
        let reference = Point::new(200.0, 25.0);
        let expected = MidSide
            .anchor(&straight.magnet(), reference, &args(&rotate))
            .unwrap();

        for angle in [30.0, 90.0, 135.0, 270.0] {
            let rotated = fixture(Point::new(0.0, 0.0), Size::new(80.0, 40.0), angle);
            let center = Point::new(40.0, 20.0);
            let turned_reference = reference.rotate(center, angle);
            let anchor = MidSide
                .anchor(&rotated.magnet(), turned_reference, &args(&rotate))
                .unwrap();
            let back = anchor.rotate(center, -angle);
            assert!(back.approx_eq(expected, 1e-6), "angle {angle}: {back:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_perpendicular() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 50.0), 0.0);
        let magnet = f.magnet();
        let none = Value::Null;
        let p = Perpendicular.anchor(&magnet, Point::new(300.0, 10.0), &args(&none)).unwrap();
        assert_approx_eq!(f64, p.y(), 10.0);
        assert_approx_eq!(f64, p.x(), 50.0);
        let p = Perpendicular.anchor(&magnet, Point::new(30.0, 300.0), &args(&none)).unwrap();
        assert_approx_eq!(f64, p.x(), 30.0);
        let p = Perpendicular.anchor(&magnet, Point::new(300.0, 300.0), &args(&none)).unwrap();
        assert!(p.approx_eq(Point::new(50.0, 25.0), 1e-9));
    }

    #[test]
    fn test_model_center_with_port() {
        let f = fixture(Point::new(0.0, 0.0), Size::new(100.0, 50.0), 0.0);
        let magnet = f.magnet();
        let none = Value::Null;
        let p = ModelCenter.anchor(&magnet, Point::new(0.0, 0.0), &args(&none)).unwrap();
        assert!(p.approx_eq(Point::new(50.0, 25.0), 1e-9));
        let on_port = magnet.with_port(Some("p1"));
        let p = ModelCenter.anchor(&on_port, Point::new(0.0, 0.0), &args(&none)).unwrap();
        assert!(p.approx_eq(Point::new(100.0, 25.0), 1e-9));
    }
}

#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;
    use serde_json::json;

    use tessera_core::geometry::Size;

    use super::{test_support::fixture, *};

    // ===================
    // Strategies
    // ===================

    fn angle_strategy() -> impl Strategy<Value = f64> {
        -360.0f64..360.0
    }

    fn reference_strategy() -> impl Strategy<Value = Point> {
        (-300.0f64..300.0, -300.0f64..300.0).prop_map(|(x, y)| Point::new(x, y))
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Rotating the element and the reference together rotates the anchor.
    fn check_mid_side_rotation(angle: f64, reference: Point) -> Result<(), TestCaseError> {
        let rotate = json!({ "rotate": true });
        let size = Size::new(80.0, 40.0);
        let center = Point::new(40.0, 20.0);
        let straight = fixture(Point::new(0.0, 0.0), size, 0.0);
        let expected = MidSide
            .anchor(&straight.magnet(), reference, &Args::new(&rotate))
            .map_err(|err| TestCaseError::fail(err.to_string()))?;

        let rotated = fixture(Point::new(0.0, 0.0), size, angle);
        let anchor = MidSide
            .anchor(&rotated.magnet(), reference.rotate(center, angle), &Args::new(&rotate))
            .map_err(|err| TestCaseError::fail(err.to_string()))?;
        let back = anchor.rotate(center, -angle);
        prop_assert!(back.approx_eq(expected, 1e-6), "{back:?} vs {expected:?}");
        Ok(())
    }

    /// Every bbox anchor lies on or inside the element box.
    fn check_bbox_anchor_inside(reference: Point) -> Result<(), TestCaseError> {
        let f = fixture(Point::new(10.0, 10.0), Size::new(60.0, 30.0), 0.0);
        let magnet = f.magnet();
        let none = Value::Null;
        let bbox = magnet.bbox().inflate(1e-9, 1e-9);
        for anchor in [BBoxAnchor::Center, BBoxAnchor::Top, BBoxAnchor::BottomLeft] {
            let p = anchor
                .anchor(&magnet, reference, &Args::new(&none))
                .map_err(|err| TestCaseError::fail(err.to_string()))?;
            prop_assert!(bbox.contains_point(p));
        }
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn mid_side_rotation(angle in angle_strategy(), reference in reference_strategy()) {
            check_mid_side_rotation(angle, reference)?;
        }

        #[test]
        fn bbox_anchor_inside(reference in reference_strategy()) {
            check_bbox_anchor_inside(reference)?;
        }
    }
}
