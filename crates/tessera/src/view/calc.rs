//! `calc()` expressions relative to a reference box.
//!
//! Attribute values may embed `calc(<expr>)` anywhere in a string, e.g.
//! `"M 0 0 L calc(w) calc(h / 2)"`. Expressions are arithmetic over numbers
//! and the box variables:
//!
//! - `w` width, `h` height
//! - `s` the shorter side, `l` the longer side
//! - `d` the diagonal

use tessera_core::geometry::Rect;

use crate::error::TesseraError;

/// Whether `value` contains a `calc()` expression.
pub fn is_calc(value: &str) -> bool {
    value.contains("calc(")
}

/// Evaluates a bare expression (without the `calc(` wrapper).
///
/// # Errors
///
/// Returns [`TesseraError::InvalidAttribute`] for malformed expressions.
pub fn evaluate(expression: &str, bbox: &Rect) -> Result<f64, TesseraError> {
    let mut parser = Parser {
        input: expression.as_bytes(),
        position: 0,
        bbox,
    };
    let value = parser.expression()?;
    parser.skip_whitespace();
    if parser.position != parser.input.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(value)
}

/// Replaces every `calc(...)` in `value` with its result.
///
/// # Errors
///
/// Returns [`TesseraError::InvalidAttribute`] for unbalanced parentheses or
/// malformed expressions.
pub fn substitute(value: &str, bbox: &Rect) -> Result<String, TesseraError> {
    let mut output = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("calc(") {
        output.push_str(&rest[..start]);
        let body_start = start + "calc(".len();
        let mut depth = 1usize;
        let mut end = None;
        for (offset, c) in rest[body_start..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(body_start + offset);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else {
            return Err(TesseraError::invalid_attribute(
                "calc",
                format!("unbalanced parentheses in `{value}`"),
            ));
        };
        let result = evaluate(&rest[body_start..end], bbox)?;
        output.push_str(&format_number(result));
        rest = &rest[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

/// Formats a number the way SVG attributes are written: no trailing `.0`.
pub fn format_number(value: f64) -> String {
    let rounded = (value * 1e6).round() / 1e6;
    if rounded == 0.0 {
        // Avoids "-0"
        return "0".to_string();
    }
    format!("{rounded}")
}

/// A length that may be a number, `"n%"` of `extent` or a `calc()`.
pub fn length(value: &serde_json::Value, extent: f64, bbox: &Rect) -> Result<f64, TesseraError> {
    match value {
        serde_json::Value::Number(number) => Ok(number.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(text) => {
            let text = text.trim();
            if let Some(percent) = text.strip_suffix('%') {
                return percent
                    .trim()
                    .parse::<f64>()
                    .map(|percent| percent / 100.0 * extent)
                    .map_err(|_| TesseraError::invalid_attribute("length", format!("`{text}`")));
            }
            if let Some(body) = text.strip_prefix("calc(").and_then(|body| body.strip_suffix(')')) {
                return evaluate(body, bbox);
            }
            text.parse::<f64>()
                .map_err(|_| TesseraError::invalid_attribute("length", format!("`{text}`")))
        }
        serde_json::Value::Null => Ok(0.0),
        other => Err(TesseraError::invalid_attribute(
            "length",
            format!("expected a number or string, found {other}"),
        )),
    }
}

struct Parser<'a> {
    input: &'a [u8],
    position: usize,
    bbox: &'a Rect,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> TesseraError {
        TesseraError::invalid_attribute(
            "calc",
            format!(
                "{reason} at {} in `{}`",
                self.position,
                String::from_utf8_lossy(self.input)
            ),
        )
    }

    fn skip_whitespace(&mut self) {
        while self
            .input
            .get(self.position)
            .is_some_and(u8::is_ascii_whitespace)
        {
            self.position += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.position).copied()
    }

    fn expression(&mut self) -> Result<f64, TesseraError> {
        let mut value = self.term()?;
        while let Some(op @ (b'+' | b'-')) = self.peek() {
            self.position += 1;
            let rhs = self.term()?;
            value = if op == b'+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<f64, TesseraError> {
        let mut value = self.factor()?;
        while let Some(op @ (b'*' | b'/')) = self.peek() {
            self.position += 1;
            let rhs = self.factor()?;
            value = if op == b'*' {
                value * rhs
            } else if rhs == 0.0 {
                return Err(self.error("division by zero"));
            } else {
                value / rhs
            };
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<f64, TesseraError> {
        match self.peek() {
            Some(b'-') => {
                self.position += 1;
                Ok(-self.factor()?)
            }
            Some(b'+') => {
                self.position += 1;
                self.factor()
            }
            Some(b'(') => {
                self.position += 1;
                let value = self.expression()?;
                if self.peek() != Some(b')') {
                    return Err(self.error("expected `)`"));
                }
                self.position += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() => self.variable(),
            Some(_) => Err(self.error("unexpected character")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> Result<f64, TesseraError> {
        let start = self.position;
        while let Some(c) = self.input.get(self.position) {
            let exponent_sign = (*c == b'-' || *c == b'+')
                && self.position > start
                && matches!(self.input[self.position - 1], b'e' | b'E');
            if c.is_ascii_digit() || *c == b'.' || *c == b'e' || *c == b'E' || exponent_sign {
                self.position += 1;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.position]).unwrap_or_default();
        text.parse::<f64>().map_err(|_| self.error("invalid number"))
    }

    fn variable(&mut self) -> Result<f64, TesseraError> {
        let start = self.position;
        while self
            .input
            .get(self.position)
            .is_some_and(u8::is_ascii_alphabetic)
        {
            self.position += 1;
        }
        let (width, height) = (self.bbox.width(), self.bbox.height());
        match &self.input[start..self.position] {
            b"w" => Ok(width),
            b"h" => Ok(height),
            b"s" => Ok(width.min(height)),
            b"l" => Ok(width.max(height)),
            b"d" => Ok(width.hypot(height)),
            _ => {
                self.position = start;
                Err(self.error("unknown variable"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use super::*;

    fn bbox() -> Rect {
        Rect::new(0.0, 0.0, 30.0, 40.0)
    }

    #[test]
    fn test_evaluate_variables() {
        assert_approx_eq!(f64, evaluate("w", &bbox()).unwrap(), 30.0);
        assert_approx_eq!(f64, evaluate("0.5 * h + 10", &bbox()).unwrap(), 30.0);
        assert_approx_eq!(f64, evaluate("d", &bbox()).unwrap(), 50.0);
        assert_approx_eq!(f64, evaluate("l - s", &bbox()).unwrap(), 10.0);
        assert_approx_eq!(f64, evaluate("-(w - 10) / 2", &bbox()).unwrap(), -10.0);
        assert_approx_eq!(f64, evaluate("1e1", &bbox()).unwrap(), 10.0);
    }

    #[test]
    fn test_evaluate_rejects_garbage() {
        assert!(evaluate("w +", &bbox()).is_err());
        assert!(evaluate("q", &bbox()).is_err());
        assert!(evaluate("w / 0", &bbox()).is_err());
        assert!(evaluate("(w", &bbox()).is_err());
    }

    #[test]
    fn test_substitute_in_path_data() {
        let data = substitute("M 0 0 L calc(w) calc(h / 2)", &bbox()).unwrap();
        assert_eq!(data, "M 0 0 L 30 20");
        assert!(substitute("calc(w", &bbox()).is_err());
        assert_eq!(substitute("plain", &bbox()).unwrap(), "plain");
    }

    #[test]
    fn test_length_forms() {
        assert_approx_eq!(f64, length(&json!(4), 30.0, &bbox()).unwrap(), 4.0);
        assert_approx_eq!(f64, length(&json!("50%"), 30.0, &bbox()).unwrap(), 15.0);
        assert_approx_eq!(f64, length(&json!("calc(h - 5)"), 30.0, &bbox()).unwrap(), 35.0);
        assert!(length(&json!("wide"), 30.0, &bbox()).is_err());
    }
}
