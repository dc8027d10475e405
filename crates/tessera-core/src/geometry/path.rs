//! SVG-like paths made of line and cubic curve segments.
//!
//! A [`Path`] stores drawing commands ([`PathSegment`]) the same way SVG path
//! data does, and exposes the geometric view of those commands as
//! [`Segment`]s for measuring and intersecting.
//!
//! Path data strings are parsed with the `svg` crate's path-data parser.
//! Relative commands, shorthand curves, quadratic curves and elliptical arcs
//! are all normalized into absolute moves, lines and cubic curves.

use std::fmt::{self, Write as _};

use svg::node::element::path::{Command, Data, Position};
use thiserror::Error;

use super::{Curve, DEFAULT_PRECISION, EPSILON, Line, Matrix, Point, Rect};

/// Errors raised while reading path data.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("invalid path data: {0}")]
    Parse(String),

    #[error("path data must start with a move command")]
    MissingMoveTo,
}

/// A drawing command in absolute coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    Close,
}

/// A geometric piece of a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Segment {
    Line(Line),
    Curve(Curve),
}

impl Segment {
    pub fn start(&self) -> Point {
        match self {
            Segment::Line(line) => line.start(),
            Segment::Curve(curve) => curve.start(),
        }
    }

    pub fn end(&self) -> Point {
        match self {
            Segment::Line(line) => line.end(),
            Segment::Curve(curve) => curve.end(),
        }
    }
}

/// Segment geometry paired with the curve subdivisions used to measure it.
#[derive(Debug, Clone)]
struct MeasuredSegment {
    segment: Segment,
    subdivisions: Vec<Curve>,
    length: f64,
}

/// A path made of moves, lines, cubic curves and closes.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::{Path, Point};
/// let path = Path::parse("M 0 0 H 100 V 50 Z").unwrap();
/// assert_eq!(path.to_string(), "M 0 0 L 100 0 L 100 50 Z");
/// assert!((path.length(3) - (150.0 + 100f64.hypot(50.0))).abs() < 1e-6);
/// assert!(path.contains_point(Point::new(90.0, 10.0)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    commands: Vec<PathSegment>,
}

impl Path {
    /// Creates an empty path.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a path from absolute commands.
    pub fn from_commands(commands: Vec<PathSegment>) -> Self {
        Self { commands }
    }

    /// Creates an open polyline path through the points.
    pub fn from_points(points: &[Point]) -> Self {
        let mut path = Self::new();
        for (index, p) in points.iter().enumerate() {
            if index == 0 {
                path.move_to(*p);
            } else {
                path.line_to(*p);
            }
        }
        path
    }

    /// Parses SVG path data.
    ///
    /// # Errors
    ///
    /// Returns [`PathError`] when the data cannot be parsed or does not start
    /// with a move command.
    pub fn parse(data: &str) -> Result<Self, PathError> {
        let data = Data::parse(data).map_err(|err| PathError::Parse(err.to_string()))?;
        let mut builder = PathBuilder::default();
        for command in data.iter() {
            builder.apply(command)?;
        }
        Ok(builder.path)
    }

    pub fn move_to(&mut self, p: Point) -> &mut Self {
        self.commands.push(PathSegment::MoveTo(p));
        self
    }

    pub fn line_to(&mut self, p: Point) -> &mut Self {
        self.commands.push(PathSegment::LineTo(p));
        self
    }

    pub fn curve_to(&mut self, c1: Point, c2: Point, end: Point) -> &mut Self {
        self.commands.push(PathSegment::CurveTo(c1, c2, end));
        self
    }

    pub fn close(&mut self) -> &mut Self {
        self.commands.push(PathSegment::Close);
        self
    }

    /// The drawing commands.
    pub fn commands(&self) -> &[PathSegment] {
        &self.commands
    }

    /// Whether the path draws nothing.
    pub fn is_empty(&self) -> bool {
        self.segments().is_empty()
    }

    /// First point of the path.
    pub fn start(&self) -> Option<Point> {
        self.commands.iter().find_map(|command| match command {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => Some(*p),
            PathSegment::CurveTo(_, _, p) => Some(*p),
            PathSegment::Close => None,
        })
    }

    /// Last drawn point of the path.
    pub fn end(&self) -> Option<Point> {
        self.segments().last().map(Segment::end).or_else(|| self.start())
    }

    /// Geometric segments, with closes expanded into lines back to the
    /// subpath start. Zero-length closes are skipped.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut current: Option<Point> = None;
        let mut subpath_start: Option<Point> = None;
        for command in &self.commands {
            match *command {
                PathSegment::MoveTo(p) => {
                    current = Some(p);
                    subpath_start = Some(p);
                }
                PathSegment::LineTo(p) => {
                    let from = current.unwrap_or(p);
                    segments.push(Segment::Line(Line::new(from, p)));
                    current = Some(p);
                }
                PathSegment::CurveTo(c1, c2, p) => {
                    let from = current.unwrap_or(p);
                    segments.push(Segment::Curve(Curve::new(from, c1, c2, p)));
                    current = Some(p);
                }
                PathSegment::Close => {
                    if let (Some(from), Some(to)) = (current, subpath_start) {
                        if !from.approx_eq(to, EPSILON) {
                            segments.push(Segment::Line(Line::new(from, to)));
                        }
                        current = Some(to);
                    }
                }
            }
        }
        segments
    }

    /// Polylines approximating each subpath at the given precision.
    pub fn subpath_polylines(&self, precision: u32) -> Vec<Vec<Point>> {
        let mut polylines: Vec<Vec<Point>> = Vec::new();
        let mut current: Vec<Point> = Vec::new();
        let mut cursor: Option<Point> = None;
        let mut subpath_start: Option<Point> = None;
        for command in &self.commands {
            match *command {
                PathSegment::MoveTo(p) => {
                    if current.len() > 1 {
                        polylines.push(std::mem::take(&mut current));
                    }
                    current.clear();
                    current.push(p);
                    cursor = Some(p);
                    subpath_start = Some(p);
                }
                PathSegment::LineTo(p) => {
                    if current.is_empty() {
                        current.push(cursor.unwrap_or(p));
                    }
                    current.push(p);
                    cursor = Some(p);
                }
                PathSegment::CurveTo(c1, c2, p) => {
                    let from = cursor.unwrap_or(p);
                    if current.is_empty() {
                        current.push(from);
                    }
                    let subdivisions = Curve::new(from, c1, c2, p).subdivisions(precision);
                    current.extend(subdivisions.iter().map(Curve::end));
                    cursor = Some(p);
                }
                PathSegment::Close => {
                    if let Some(start) = subpath_start {
                        current.push(start);
                        cursor = Some(start);
                    }
                }
            }
        }
        if current.len() > 1 {
            polylines.push(current);
        }
        polylines
    }

    fn measured(&self, precision: u32) -> Vec<MeasuredSegment> {
        self.segments()
            .into_iter()
            .map(|segment| match segment {
                Segment::Line(line) => MeasuredSegment {
                    segment,
                    subdivisions: Vec::new(),
                    length: line.length(),
                },
                Segment::Curve(curve) => {
                    let subdivisions = curve.subdivisions(precision);
                    let length = Curve::length_of(&subdivisions);
                    MeasuredSegment {
                        segment,
                        subdivisions,
                        length,
                    }
                }
            })
            .collect()
    }

    /// Total length at the given precision.
    pub fn length(&self, precision: u32) -> f64 {
        self.measured(precision).iter().map(|m| m.length).sum()
    }

    /// Point at the given length from the start. A negative length measures
    /// from the end. Lengths beyond the path clamp to its ends.
    pub fn point_at_length(&self, length: f64, precision: u32) -> Option<Point> {
        let (measured, local) = self.locate(length, precision)?;
        Some(match measured.segment {
            Segment::Line(line) => line.point_at_length(local),
            Segment::Curve(curve) => curve.point_at_length(local, &measured.subdivisions),
        })
    }

    /// Point at the normalized position `ratio` of the total length.
    pub fn point_at_ratio(&self, ratio: f64, precision: u32) -> Option<Point> {
        let total = self.length(precision);
        self.point_at_length(ratio.clamp(0.0, 1.0) * total, precision)
    }

    /// Tangent line at the given length. `None` when the path is empty or
    /// the tangent is undefined (zero-length segment).
    pub fn tangent_at_length(&self, length: f64, precision: u32) -> Option<Line> {
        let (measured, local) = self.locate(length, precision)?;
        match measured.segment {
            Segment::Line(line) => {
                if line.is_degenerate() {
                    return None;
                }
                let at = line.point_at_length(local);
                Some(Line::new(at, at.add_point(line.vector())))
            }
            Segment::Curve(curve) => {
                let t = curve.t_at_length(local, &measured.subdivisions);
                curve.tangent_at_t(t)
            }
        }
    }

    /// Finds the segment containing the given length and the length local to it.
    fn locate(&self, length: f64, precision: u32) -> Option<(MeasuredSegment, f64)> {
        let measured = self.measured(precision);
        let total: f64 = measured.iter().map(|m| m.length).sum();
        let last = measured.last()?.clone();
        let target = if length < 0.0 { total + length } else { length }.clamp(0.0, total);
        let mut travelled = 0.0;
        for m in measured {
            if travelled + m.length >= target && m.length > 0.0 {
                return Some((m, target - travelled));
            }
            travelled += m.length;
        }
        let local = last.length;
        Some((last, local))
    }

    /// Intersections with a line, sorted by distance from the line start.
    pub fn intersection_with_line(&self, line: &Line, precision: u32) -> Vec<Point> {
        if line.is_degenerate() {
            return Vec::new();
        }
        let mut points: Vec<Point> = Vec::new();
        for measured in self.measured(precision) {
            let hits = match measured.segment {
                Segment::Line(segment) => segment.intersection_with_line(line).into_iter().collect(),
                Segment::Curve(_) => Curve::intersection_with_line(line, &measured.subdivisions),
            };
            for p in hits {
                if !points.iter().any(|q| q.approx_eq(p, 1e-9)) {
                    points.push(p);
                }
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

    /// Intersections with another path, sorted by length along `self`.
    ///
    /// Both paths are flattened to polylines at the given precision, so
    /// crossings on curves are approximate. Collinear overlaps yield no
    /// points.
    pub fn intersection_with_path(&self, other: &Path, precision: u32) -> Vec<Point> {
        let others: Vec<Line> = other
            .subpath_polylines(precision)
            .iter()
            .flat_map(|points| points.windows(2).map(|pair| Line::new(pair[0], pair[1])))
            .collect();
        let mut hits: Vec<(f64, Point)> = Vec::new();
        let mut travelled = 0.0;
        for points in self.subpath_polylines(precision) {
            for pair in points.windows(2) {
                let chord = Line::new(pair[0], pair[1]);
                for segment in &others {
                    let Some(p) = chord.intersection_with_line(segment) else {
                        continue;
                    };
                    if !hits.iter().any(|(_, q)| q.approx_eq(p, 1e-9)) {
                        hits.push((travelled + chord.start().distance(p), p));
                    }
                }
                travelled += chord.length();
            }
        }
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));
        hits.into_iter().map(|(_, p)| p).collect()
    }

    /// Point on the path closest to `p`.
    pub fn closest_point(&self, p: Point, precision: u32) -> Option<Point> {
        self.measured(precision)
            .iter()
            .filter_map(|measured| match measured.segment {
                Segment::Line(line) => Some(line.closest_point(p)),
                Segment::Curve(_) => Curve::closest_point(p, &measured.subdivisions),
            })
            .min_by(|a, b| p.squared_distance(*a).total_cmp(&p.squared_distance(*b)))
    }

    /// Length along the path of the point closest to `p`.
    pub fn closest_point_length(&self, p: Point, precision: u32) -> f64 {
        let mut best = (f64::INFINITY, 0.0);
        let mut travelled = 0.0;
        for measured in self.measured(precision) {
            let points = match measured.segment {
                Segment::Line(line) => vec![line.start(), line.end()],
                Segment::Curve(_) => Curve::to_points(&measured.subdivisions),
            };
            let mut along = 0.0;
            for pair in points.windows(2) {
                let chord = Line::new(pair[0], pair[1]);
                let t = chord.closest_point_normalized_length(p);
                let candidate = chord.point_at(t);
                let distance = candidate.squared_distance(p);
                if distance < best.0 {
                    best = (distance, travelled + along + t * chord.length());
                }
                along += chord.length();
            }
            travelled += measured.length;
        }
        best.1
    }

    /// Whether the point is inside the area enclosed by the path.
    ///
    /// Uses the even-odd rule; open subpaths are treated as implicitly closed.
    pub fn contains_point(&self, p: Point) -> bool {
        let mut inside = false;
        for polyline in self.subpath_polylines(DEFAULT_PRECISION) {
            let n = polyline.len();
            for i in 0..n {
                let a = polyline[i];
                let b = polyline[(i + 1) % n];
                if (a.y() > p.y()) != (b.y() > p.y()) {
                    let x = a.x() + (p.y() - a.y()) / (b.y() - a.y()) * (b.x() - a.x());
                    if p.x() < x {
                        inside = !inside;
                    }
                }
            }
        }
        inside
    }

    /// Bounding box of the path, `None` when it draws nothing.
    pub fn bbox(&self) -> Option<Rect> {
        let segments = self.segments();
        if segments.is_empty() {
            return self.start().map(|p| Rect::new(p.x(), p.y(), 0.0, 0.0));
        }
        segments
            .iter()
            .map(|segment| match segment {
                Segment::Line(line) => line.bbox(),
                Segment::Curve(curve) => curve.bbox(),
            })
            .reduce(|a, b| a.union(&b))
    }

    /// Applies an affine transform. Cubic curves are closed under affine
    /// maps, so the result is exact.
    pub fn transform(&self, matrix: &Matrix) -> Path {
        let commands = self
            .commands
            .iter()
            .map(|command| match *command {
                PathSegment::MoveTo(p) => PathSegment::MoveTo(matrix.apply(p)),
                PathSegment::LineTo(p) => PathSegment::LineTo(matrix.apply(p)),
                PathSegment::CurveTo(c1, c2, p) => {
                    PathSegment::CurveTo(matrix.apply(c1), matrix.apply(c2), matrix.apply(p))
                }
                PathSegment::Close => PathSegment::Close,
            })
            .collect();
        Path { commands }
    }

    /// Path outlining an ellipse with four cubic arcs.
    pub fn ellipse(center: Point, rx: f64, ry: f64) -> Path {
        // Control distance for a quarter circle
        const KAPPA: f64 = 0.552_284_749_831;
        let (cx, cy) = (center.x(), center.y());
        let (ox, oy) = (rx * KAPPA, ry * KAPPA);
        let mut path = Path::new();
        path.move_to(Point::new(cx + rx, cy))
            .curve_to(
                Point::new(cx + rx, cy + oy),
                Point::new(cx + ox, cy + ry),
                Point::new(cx, cy + ry),
            )
            .curve_to(
                Point::new(cx - ox, cy + ry),
                Point::new(cx - rx, cy + oy),
                Point::new(cx - rx, cy),
            )
            .curve_to(
                Point::new(cx - rx, cy - oy),
                Point::new(cx - ox, cy - ry),
                Point::new(cx, cy - ry),
            )
            .curve_to(
                Point::new(cx + ox, cy - ry),
                Point::new(cx + rx, cy - oy),
                Point::new(cx + rx, cy),
            )
            .close();
        path
    }
}

/// Formats a number without trailing noise.
fn fmt_number(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        // Avoids "-0"
        return "0".to_string();
    }
    format!("{rounded}")
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        for command in &self.commands {
            if !out.is_empty() {
                out.push(' ');
            }
            match *command {
                PathSegment::MoveTo(p) => {
                    let _ = write!(out, "M {} {}", fmt_number(p.x()), fmt_number(p.y()));
                }
                PathSegment::LineTo(p) => {
                    let _ = write!(out, "L {} {}", fmt_number(p.x()), fmt_number(p.y()));
                }
                PathSegment::CurveTo(c1, c2, p) => {
                    let _ = write!(
                        out,
                        "C {} {} {} {} {} {}",
                        fmt_number(c1.x()),
                        fmt_number(c1.y()),
                        fmt_number(c2.x()),
                        fmt_number(c2.y()),
                        fmt_number(p.x()),
                        fmt_number(p.y())
                    );
                }
                PathSegment::Close => out.push('Z'),
            }
        }
        f.write_str(&out)
    }
}

// =============================================================================
// Path data normalization
// =============================================================================

/// Accumulates absolute commands while walking parsed path data.
#[derive(Default)]
struct PathBuilder {
    path: Path,
    current: Option<Point>,
    subpath_start: Option<Point>,
    /// Second control point of the previous cubic, for `S` reflection.
    last_cubic_control: Option<Point>,
    /// Control point of the previous quadratic, for `T` reflection.
    last_quadratic_control: Option<Point>,
}

impl PathBuilder {
    fn apply(&mut self, command: &Command) -> Result<(), PathError> {
        match command {
            Command::Move(position, params) => {
                for (index, pair) in params.chunks_exact(2).enumerate() {
                    let p = self.resolve(position, pair[0] as f64, pair[1] as f64);
                    if index == 0 {
                        self.path.move_to(p);
                        self.subpath_start = Some(p);
                    } else {
                        self.path.line_to(p);
                    }
                    self.current = Some(p);
                }
                self.reset_controls();
            }
            Command::Line(position, params) => {
                self.require_current()?;
                for pair in params.chunks_exact(2) {
                    let p = self.resolve(position, pair[0] as f64, pair[1] as f64);
                    self.path.line_to(p);
                    self.current = Some(p);
                }
                self.reset_controls();
            }
            Command::HorizontalLine(position, params) => {
                let mut current = self.require_current()?;
                for x in params.iter() {
                    let x = *x as f64;
                    let x = match position {
                        Position::Absolute => x,
                        Position::Relative => current.x() + x,
                    };
                    current = current.with_x(x);
                    self.path.line_to(current);
                }
                self.current = Some(current);
                self.reset_controls();
            }
            Command::VerticalLine(position, params) => {
                let mut current = self.require_current()?;
                for y in params.iter() {
                    let y = *y as f64;
                    let y = match position {
                        Position::Absolute => y,
                        Position::Relative => current.y() + y,
                    };
                    current = current.with_y(y);
                    self.path.line_to(current);
                }
                self.current = Some(current);
                self.reset_controls();
            }
            Command::CubicCurve(position, params) => {
                self.require_current()?;
                for chunk in params.chunks_exact(6) {
                    let c1 = self.resolve(position, chunk[0] as f64, chunk[1] as f64);
                    let c2 = self.resolve(position, chunk[2] as f64, chunk[3] as f64);
                    let end = self.resolve(position, chunk[4] as f64, chunk[5] as f64);
                    self.push_cubic(c1, c2, end);
                }
            }
            Command::SmoothCubicCurve(position, params) => {
                for chunk in params.chunks_exact(4) {
                    let current = self.require_current()?;
                    let c1 = self
                        .last_cubic_control
                        .map(|c| current.add_point(current.sub_point(c)))
                        .unwrap_or(current);
                    let c2 = self.resolve(position, chunk[0] as f64, chunk[1] as f64);
                    let end = self.resolve(position, chunk[2] as f64, chunk[3] as f64);
                    self.push_cubic(c1, c2, end);
                }
            }
            Command::QuadraticCurve(position, params) => {
                for chunk in params.chunks_exact(4) {
                    let current = self.require_current()?;
                    let control = self.resolve(position, chunk[0] as f64, chunk[1] as f64);
                    let end = self.resolve(position, chunk[2] as f64, chunk[3] as f64);
                    self.push_quadratic(current, control, end);
                }
            }
            Command::SmoothQuadraticCurve(position, params) => {
                for chunk in params.chunks_exact(2) {
                    let current = self.require_current()?;
                    let control = self
                        .last_quadratic_control
                        .map(|c| current.add_point(current.sub_point(c)))
                        .unwrap_or(current);
                    let end = self.resolve(position, chunk[0] as f64, chunk[1] as f64);
                    self.push_quadratic(current, control, end);
                }
            }
            Command::EllipticalArc(position, params) => {
                for chunk in params.chunks_exact(7) {
                    let current = self.require_current()?;
                    let end = self.resolve(position, chunk[5] as f64, chunk[6] as f64);
                    let arc = ArcParameters {
                        rx: chunk[0] as f64,
                        ry: chunk[1] as f64,
                        rotation: chunk[2] as f64,
                        large_arc: chunk[3] != 0.0,
                        sweep: chunk[4] != 0.0,
                    };
                    for curve in arc_to_curves(current, end, arc) {
                        self.path.curve_to(curve.control1(), curve.control2(), curve.end());
                    }
                    self.current = Some(end);
                }
                self.reset_controls();
            }
            Command::Close => {
                self.path.close();
                self.current = self.subpath_start;
                self.reset_controls();
            }
        }
        Ok(())
    }

    fn require_current(&self) -> Result<Point, PathError> {
        self.current.ok_or(PathError::MissingMoveTo)
    }

    fn resolve(&self, position: &Position, x: f64, y: f64) -> Point {
        match position {
            Position::Absolute => Point::new(x, y),
            Position::Relative => {
                let base = self.current.unwrap_or_default();
                Point::new(base.x() + x, base.y() + y)
            }
        }
    }

    fn push_cubic(&mut self, c1: Point, c2: Point, end: Point) {
        self.path.curve_to(c1, c2, end);
        self.current = Some(end);
        self.last_cubic_control = Some(c2);
        self.last_quadratic_control = None;
    }

    fn push_quadratic(&mut self, start: Point, control: Point, end: Point) {
        let curve = Curve::from_quadratic(start, control, end);
        self.path
            .curve_to(curve.control1(), curve.control2(), curve.end());
        self.current = Some(end);
        self.last_quadratic_control = Some(control);
        self.last_cubic_control = None;
    }

    fn reset_controls(&mut self) {
        self.last_cubic_control = None;
        self.last_quadratic_control = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct ArcParameters {
    rx: f64,
    ry: f64,
    rotation: f64,
    large_arc: bool,
    sweep: bool,
}

/// Converts an SVG elliptical arc into cubic curves (endpoint to center
/// parameterization, then at most 90° per curve).
fn arc_to_curves(start: Point, end: Point, arc: ArcParameters) -> Vec<Curve> {
    if start.approx_eq(end, EPSILON) {
        return Vec::new();
    }
    let mut rx = arc.rx.abs();
    let mut ry = arc.ry.abs();
    if rx < EPSILON || ry < EPSILON {
        // Degenerate radii draw a straight line
        return vec![Curve::new(start, start, end, end)];
    }

    let phi = arc.rotation.to_radians();
    let (sin_phi, cos_phi) = phi.sin_cos();
    let dx = (start.x() - end.x()) / 2.0;
    let dy = (start.y() - end.y()) / 2.0;
    let x1p = cos_phi * dx + sin_phi * dy;
    let y1p = -sin_phi * dx + cos_phi * dy;

    let lambda = (x1p * x1p) / (rx * rx) + (y1p * y1p) / (ry * ry);
    if lambda > 1.0 {
        let scale = lambda.sqrt();
        rx *= scale;
        ry *= scale;
    }

    let numerator = rx * rx * ry * ry - rx * rx * y1p * y1p - ry * ry * x1p * x1p;
    let denominator = rx * rx * y1p * y1p + ry * ry * x1p * x1p;
    let mut coefficient = if denominator.abs() < EPSILON {
        0.0
    } else {
        (numerator / denominator).max(0.0).sqrt()
    };
    if arc.large_arc == arc.sweep {
        coefficient = -coefficient;
    }
    let cxp = coefficient * (rx * y1p / ry);
    let cyp = coefficient * -(ry * x1p / rx);
    let cx = cos_phi * cxp - sin_phi * cyp + (start.x() + end.x()) / 2.0;
    let cy = sin_phi * cxp + cos_phi * cyp + (start.y() + end.y()) / 2.0;

    let angle = |ux: f64, uy: f64, vx: f64, vy: f64| -> f64 {
        let dot = ux * vx + uy * vy;
        let len = (ux * ux + uy * uy).sqrt() * (vx * vx + vy * vy).sqrt();
        let mut a = (dot / len).clamp(-1.0, 1.0).acos();
        if ux * vy - uy * vx < 0.0 {
            a = -a;
        }
        a
    };
    let theta1 = angle(1.0, 0.0, (x1p - cxp) / rx, (y1p - cyp) / ry);
    let mut delta = angle(
        (x1p - cxp) / rx,
        (y1p - cyp) / ry,
        (-x1p - cxp) / rx,
        (-y1p - cyp) / ry,
    );
    if !arc.sweep && delta > 0.0 {
        delta -= std::f64::consts::TAU;
    } else if arc.sweep && delta < 0.0 {
        delta += std::f64::consts::TAU;
    }

    let pieces = (delta.abs() / std::f64::consts::FRAC_PI_2).ceil().max(1.0) as usize;
    let step = delta / pieces as f64;
    let k = 4.0 / 3.0 * (step / 4.0).tan();

    let point_at = |theta: f64| -> (Point, Point) {
        let (sin_t, cos_t) = theta.sin_cos();
        let x = rx * cos_t;
        let y = ry * sin_t;
        let dx = -rx * sin_t;
        let dy = ry * cos_t;
        let p = Point::new(
            cx + cos_phi * x - sin_phi * y,
            cy + sin_phi * x + cos_phi * y,
        );
        let d = Point::new(cos_phi * dx - sin_phi * dy, sin_phi * dx + cos_phi * dy);
        (p, d)
    };

    let mut curves = Vec::with_capacity(pieces);
    let mut theta = theta1;
    let (mut from, mut from_d) = point_at(theta);
    from = start.approx_eq(from, 1e-6).then_some(start).unwrap_or(from);
    for index in 0..pieces {
        let next = theta + step;
        let (mut to, to_d) = point_at(next);
        if index + 1 == pieces {
            to = end;
        }
        curves.push(Curve::new(
            from,
            from.add_point(from_d.scale(k)),
            to.sub_point(to_d.scale(k)),
            to,
        ));
        theta = next;
        from = to;
        from_d = to_d;
    }
    curves
}
