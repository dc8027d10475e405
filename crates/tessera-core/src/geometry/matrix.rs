use std::fmt;

use thiserror::Error;

use super::{EPSILON, Point, Rect, to_rad};

/// Errors raised while reading an SVG `transform` attribute.
#[derive(Debug, Error, PartialEq)]
pub enum TransformParseError {
    #[error("unknown transform function `{0}`")]
    UnknownFunction(String),

    #[error("transform function `{name}` expects {expected} arguments, got {found}")]
    ArgumentCount {
        name: String,
        expected: &'static str,
        found: usize,
    },

    #[error("invalid number `{0}` in transform")]
    InvalidNumber(String),

    #[error("unterminated transform function `{0}`")]
    Unterminated(String),
}

/// A 2D affine transform in SVG order.
///
/// ```text
/// | a c e |
/// | b d f |
/// | 0 0 1 |
/// ```
///
/// Composition follows SVG: `m1.multiply(&m2)` applies `m2` first and then
/// `m1`, so a transform list `"translate(..) rotate(..)"` is the product of
/// its functions from left to right.
///
/// # Examples
///
/// ```
/// # use tessera_core::geometry::{Matrix, Point};
/// let m = Matrix::parse_transform_list("translate(10, 20) scale(2)").unwrap();
/// assert_eq!(m.apply(Point::new(1.0, 1.0)), Point::new(12.0, 22.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::identity()
    }
}

impl Matrix {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self::new(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    /// Rotation by `angle` degrees; positive angles turn clockwise on screen.
    pub fn rotate(angle: f64) -> Self {
        let (sin, cos) = to_rad(angle).sin_cos();
        Self::new(cos, sin, -sin, cos, 0.0, 0.0)
    }

    /// Rotation by `angle` degrees around `origin`.
    pub fn rotate_around(angle: f64, origin: Point) -> Self {
        Self::translate(origin.x(), origin.y())
            .multiply(&Self::rotate(angle))
            .multiply(&Self::translate(-origin.x(), -origin.y()))
    }

    pub fn skew_x(angle: f64) -> Self {
        Self::new(1.0, 0.0, to_rad(angle).tan(), 1.0, 0.0, 0.0)
    }

    pub fn skew_y(angle: f64) -> Self {
        Self::new(1.0, to_rad(angle).tan(), 0.0, 1.0, 0.0, 0.0)
    }

    pub fn a(&self) -> f64 {
        self.a
    }

    pub fn b(&self) -> f64 {
        self.b
    }

    pub fn c(&self) -> f64 {
        self.c
    }

    pub fn d(&self) -> f64 {
        self.d
    }

    pub fn e(&self) -> f64 {
        self.e
    }

    pub fn f(&self) -> f64 {
        self.f
    }

    /// Returns `self × other`: `other` is applied first.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix::new(
            self.a * other.a + self.c * other.b,
            self.b * other.a + self.d * other.b,
            self.a * other.c + self.c * other.d,
            self.b * other.c + self.d * other.d,
            self.a * other.e + self.c * other.f + self.e,
            self.b * other.e + self.d * other.f + self.f,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    /// The inverse transform, `None` for singular matrices.
    pub fn inverse(&self) -> Option<Matrix> {
        let det = self.determinant();
        if det.abs() < EPSILON * EPSILON {
            return None;
        }
        Some(Matrix::new(
            self.d / det,
            -self.b / det,
            -self.c / det,
            self.a / det,
            (self.c * self.f - self.d * self.e) / det,
            (self.b * self.e - self.a * self.f) / det,
        ))
    }

    pub fn is_identity(&self) -> bool {
        self.approx_eq(&Matrix::identity(), EPSILON)
    }

    pub fn approx_eq(&self, other: &Matrix, epsilon: f64) -> bool {
        [
            self.a - other.a,
            self.b - other.b,
            self.c - other.c,
            self.d - other.d,
            self.e - other.e,
            self.f - other.f,
        ]
        .iter()
        .all(|delta| delta.abs() <= epsilon)
    }

    /// Transforms a point.
    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x() + self.c * p.y() + self.e,
            self.b * p.x() + self.d * p.y() + self.f,
        )
    }

    /// Bounding box of a transformed rectangle.
    pub fn apply_rect(&self, rect: &Rect) -> Rect {
        let corners = [
            rect.origin(),
            rect.top_right(),
            rect.corner(),
            rect.bottom_left(),
        ];
        Rect::bounding(corners.iter().map(|p| self.apply(*p))).unwrap_or(*rect)
    }

    /// Horizontal scale factor.
    pub fn scale_x(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Vertical scale factor.
    pub fn scale_y(&self) -> f64 {
        self.c.hypot(self.d)
    }

    /// Rotation component in degrees.
    pub fn rotation(&self) -> f64 {
        super::normalize_angle(self.b.atan2(self.a).to_degrees())
    }

    /// Translation component.
    pub fn translation(&self) -> Point {
        Point::new(self.e, self.f)
    }

    /// Formats as an SVG `matrix(...)` transform.
    pub fn to_transform_string(&self) -> String {
        format!(
            "matrix({},{},{},{},{},{})",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }

    /// Parses an SVG transform list such as `"translate(10 20) rotate(45)"`.
    ///
    /// An empty or blank string yields the identity matrix.
    ///
    /// # Errors
    ///
    /// Returns [`TransformParseError`] for unknown functions, malformed
    /// numbers, wrong argument counts and unterminated parentheses.
    pub fn parse_transform_list(input: &str) -> Result<Matrix, TransformParseError> {
        let mut result = Matrix::identity();
        let mut rest = input.trim_start_matches(is_separator);
        while !rest.is_empty() {
            let open = rest
                .find('(')
                .ok_or_else(|| TransformParseError::Unterminated(rest.trim().to_string()))?;
            let name = rest[..open].trim().to_string();
            let close = rest[open..]
                .find(')')
                .map(|index| open + index)
                .ok_or_else(|| TransformParseError::Unterminated(name.clone()))?;
            let args = parse_numbers(&rest[open + 1..close])?;
            result = result.multiply(&transform_function(&name, &args)?);
            rest = rest[close + 1..].trim_start_matches(is_separator);
        }
        Ok(result)
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == ','
}

fn parse_numbers(args: &str) -> Result<Vec<f64>, TransformParseError> {
    args.split(is_separator)
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<f64>()
                .map_err(|_| TransformParseError::InvalidNumber(token.to_string()))
        })
        .collect()
}

fn transform_function(name: &str, args: &[f64]) -> Result<Matrix, TransformParseError> {
    let count_error = |expected: &'static str| TransformParseError::ArgumentCount {
        name: name.to_string(),
        expected,
        found: args.len(),
    };
    match name {
        "matrix" => match args {
            [a, b, c, d, e, f] => Ok(Matrix::new(*a, *b, *c, *d, *e, *f)),
            _ => Err(count_error("6")),
        },
        "translate" => match args {
            [tx] => Ok(Matrix::translate(*tx, 0.0)),
            [tx, ty] => Ok(Matrix::translate(*tx, *ty)),
            _ => Err(count_error("1 or 2")),
        },
        "scale" => match args {
            [s] => Ok(Matrix::scale(*s, *s)),
            [sx, sy] => Ok(Matrix::scale(*sx, *sy)),
            _ => Err(count_error("1 or 2")),
        },
        "rotate" => match args {
            [angle] => Ok(Matrix::rotate(*angle)),
            [angle, cx, cy] => Ok(Matrix::rotate_around(*angle, Point::new(*cx, *cy))),
            _ => Err(count_error("1 or 3")),
        },
        "skewX" => match args {
            [angle] => Ok(Matrix::skew_x(*angle)),
            _ => Err(count_error("1")),
        },
        "skewY" => match args {
            [angle] => Ok(Matrix::skew_y(*angle)),
            _ => Err(count_error("1")),
        },
        other => Err(TransformParseError::UnknownFunction(other.to_string())),
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_transform_string())
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;

    use super::*;

    #[test]
    fn test_rotate_is_clockwise() {
        let p = Matrix::rotate(90.0).apply(Point::new(1.0, 0.0));
        assert!(p.approx_eq(Point::new(0.0, 1.0), 1e-12));
    }

    #[test]
    fn test_rotate_matches_point_rotate() {
        let origin = Point::new(10.0, 10.0);
        let p = Point::new(30.0, 15.0);
        let by_matrix = Matrix::rotate_around(30.0, origin).apply(p);
        assert!(by_matrix.approx_eq(p.rotate(origin, 30.0), 1e-9));
    }

    #[test]
    fn test_inverse() {
        let m = Matrix::parse_transform_list("translate(5,7) rotate(33) scale(2,3)").unwrap();
        let inv = m.inverse().unwrap();
        assert!(m.multiply(&inv).is_identity());
        assert!(Matrix::scale(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Matrix::parse_transform_list("wobble(1)"),
            Err(TransformParseError::UnknownFunction(_))
        ));
        assert!(matches!(
            Matrix::parse_transform_list("translate(1,2,3)"),
            Err(TransformParseError::ArgumentCount { .. })
        ));
        assert!(matches!(
            Matrix::parse_transform_list("translate(1"),
            Err(TransformParseError::Unterminated(_))
        ));
        assert!(matches!(
            Matrix::parse_transform_list("scale(x)"),
            Err(TransformParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_parse_empty_is_identity() {
        assert!(Matrix::parse_transform_list("  ").unwrap().is_identity());
    }

    #[test]
    fn test_apply_rect() {
        let r = Rect::new(0.0, 0.0, 10.0, 20.0);
        let bbox = Matrix::rotate(90.0).apply_rect(&r);
        assert!(bbox.approx_eq(&Rect::new(-20.0, 0.0, 20.0, 10.0), 1e-9));
    }

    #[test]
    fn test_scale_factors() {
        let m = Matrix::rotate(30.0).multiply(&Matrix::scale(2.0, 3.0));
        assert_approx_eq!(f64, m.scale_x(), 2.0, epsilon = 1e-12);
        assert_approx_eq!(f64, m.scale_y(), 3.0, epsilon = 1e-12);
        assert_approx_eq!(f64, m.rotation(), 30.0, epsilon = 1e-9);
    }
}
