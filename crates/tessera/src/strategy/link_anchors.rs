//! Anchors on another link's path.

use tessera_core::geometry::{DEFAULT_PRECISION, Line, Path, Point};

use crate::{
    error::TesseraError,
    strategy::{Args, LinkAnchor},
};

const FAR: f64 = 1e6;

fn empty_path() -> TesseraError {
    TesseraError::NoIntersection("the link has no path to anchor on".to_string())
}

/// Point at `ratio` (default 0.5) of the path length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionRatio;

impl LinkAnchor for ConnectionRatio {
    fn anchor(&self, connection: &Path, _reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let ratio = args.number_or("ratio", 0.5);
        connection
            .point_at_ratio(ratio, DEFAULT_PRECISION)
            .ok_or_else(empty_path)
    }
}

/// Point at `length` (default 20) along the path; negative lengths
/// measure from the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionLength;

impl LinkAnchor for ConnectionLength {
    fn anchor(&self, connection: &Path, _reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let length = args.number_or("length", 20.0);
        connection
            .point_at_length(length, DEFAULT_PRECISION)
            .ok_or_else(empty_path)
    }
}

/// Point where a horizontal or vertical line through the reference meets
/// the path, nearest to the reference.
///
/// Without such a point the anchor falls back to `fallbackAt` (a length,
/// or `"n%"` of the path) or else to the closest point of the path.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionPerpendicular;

impl LinkAnchor for ConnectionPerpendicular {
    fn anchor(&self, connection: &Path, reference: Point, args: &Args<'_>) -> Result<Point, TesseraError> {
        let vertical = Line::new(reference.offset(0.0, FAR), reference.offset(0.0, -FAR));
        let horizontal = Line::new(reference.offset(FAR, 0.0), reference.offset(-FAR, 0.0));
        let mut intersections = connection.intersection_with_line(&vertical, DEFAULT_PRECISION);
        intersections.extend(connection.intersection_with_line(&horizontal, DEFAULT_PRECISION));
        if let Some(closest) = reference.choose_closest(&intersections) {
            return Ok(closest);
        }
        if let Some(fallback) = args.get("fallbackAt") {
            let point = match fallback.as_str().and_then(|s| s.trim().strip_suffix('%')) {
                Some(percent) => {
                    let ratio = percent.trim().parse::<f64>().unwrap_or(50.0) / 100.0;
                    connection.point_at_ratio(ratio, DEFAULT_PRECISION)
                }
                None => {
                    let length = args.number_or("fallbackAt", 0.0);
                    connection.point_at_length(length, DEFAULT_PRECISION)
                }
            };
            return point.ok_or_else(empty_path);
        }
        ConnectionClosest.anchor(connection, reference, args)
    }
}

/// Point of the path closest to the reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionClosest;

impl LinkAnchor for ConnectionClosest {
    fn anchor(&self, connection: &Path, reference: Point, _args: &Args<'_>) -> Result<Point, TesseraError> {
        connection
            .closest_point(reference, DEFAULT_PRECISION)
            .ok_or_else(empty_path)
    }
}
