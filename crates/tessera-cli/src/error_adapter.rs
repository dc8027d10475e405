//! Error adapter for converting TesseraError to miette diagnostics.
//!
//! This module provides the bridge between the library's standard error types
//! and miette's rich diagnostic formatting used in the CLI.
//!
//! JSON syntax errors carry a line and column; when the input text is at
//! hand they are rendered with a labeled snippet of it.

use std::fmt;

use miette::{Diagnostic as MietteDiagnostic, LabeledSpan, SourceSpan};

use tessera::TesseraError;

/// Adapter for a JSON syntax error in the input document.
pub struct JsonAdapter<'a> {
    /// The wrapped error
    err: &'a serde_json::Error,
    /// Source code for displaying snippets
    src: &'a str,
}

impl<'a> JsonAdapter<'a> {
    /// Create a new JSON error adapter.
    pub fn new(err: &'a serde_json::Error, src: &'a str) -> Self {
        Self { err, src }
    }

    /// Byte offset of the error position in the source.
    fn offset(&self) -> usize {
        let line = self.err.line().saturating_sub(1);
        let column = self.err.column().saturating_sub(1);
        let start: usize = self.src.split_inclusive('\n').take(line).map(str::len).sum();
        (start + column).min(self.src.len())
    }
}

impl fmt::Debug for JsonAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonAdapter").field("err", &self.err).finish()
    }
}

impl fmt::Display for JsonAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid graph document")
    }
}

impl std::error::Error for JsonAdapter<'_> {}

impl MietteDiagnostic for JsonAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("tessera::json"))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&self.src as &dyn miette::SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = SourceSpan::new(self.offset().into(), 0);
        let label = LabeledSpan::new_primary_with_span(Some(self.err.to_string()), span);
        Some(Box::new(std::iter::once(label)))
    }
}

/// Adapter for [`TesseraError`] variants without source locations.
pub struct ErrorAdapter<'a>(pub &'a TesseraError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(self.0)
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            TesseraError::Io(_) => "tessera::io",
            TesseraError::Json(_) => "tessera::json",
            TesseraError::DuplicateIdentifier(_)
            | TesseraError::CyclicEmbedding { .. }
            | TesseraError::AlreadyEmbedded { .. }
            | TesseraError::DanglingReference { .. }
            | TesseraError::UnknownCell(_)
            | TesseraError::UnknownCellType(_)
            | TesseraError::WrongKind { .. }
            | TesseraError::DuplicatePortIdentifier { .. } => "tessera::graph",
            TesseraError::InvalidSelector { .. } | TesseraError::InvalidAttribute { .. } => "tessera::attribute",
            TesseraError::UnknownStrategy { .. } | TesseraError::NoIntersection(_) => "tessera::strategy",
            TesseraError::Scene(_) => "tessera::scene",
            TesseraError::Config(_) => "tessera::config",
        };
        Some(Box::new(code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let help = match &self.0 {
            TesseraError::UnknownCellType(_) => {
                "built-in types are element, link, standard.Rectangle, standard.Ellipse, \
                 standard.Circle, standard.Path and standard.Link"
            }
            TesseraError::DanglingReference { .. } => "every link end must name a cell (and port) of the document",
            TesseraError::InvalidAttribute { name, .. } if name == "cells" => {
                "a graph document looks like {\"cells\": [...]}"
            }
            _ => return None,
        };
        Some(Box::new(help))
    }
}

/// A reportable error that can be rendered by miette.
#[derive(Debug)]
pub enum Reportable<'a> {
    /// A JSON error pointing into the input.
    Json(JsonAdapter<'a>),
    /// A simple error without source location.
    Error(ErrorAdapter<'a>),
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Json(j) => fmt::Display::fmt(j, f),
            Reportable::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Reportable::Json(_) => None,
            Reportable::Error(e) => e.source(),
        }
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Json(j) => j.code(),
            Reportable::Error(e) => e.code(),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Json(j) => j.help(),
            Reportable::Error(e) => e.help(),
        }
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        match self {
            Reportable::Json(j) => j.source_code(),
            Reportable::Error(e) => e.source_code(),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        match self {
            Reportable::Json(j) => j.labels(),
            Reportable::Error(e) => e.labels(),
        }
    }
}

/// Convert a [`TesseraError`] into a reportable error.
///
/// Syntax errors of the input document point into `src` when it is given
/// and non-empty.
pub fn to_reportable<'a>(err: &'a TesseraError, src: Option<&'a str>) -> Reportable<'a> {
    match (err, src) {
        (TesseraError::Json(json), Some(src)) if json.is_syntax() || json.is_eof() => {
            if src.is_empty() {
                Reportable::Error(ErrorAdapter(err))
            } else {
                Reportable::Json(JsonAdapter::new(json, src))
            }
        }
        _ => Reportable::Error(ErrorAdapter(err)),
    }
}

#[cfg(test)]
mod tests {
    use tessera::identifier::Id;

    use super::*;

    fn json_error(src: &str) -> TesseraError {
        TesseraError::Json(serde_json::from_str::<serde_json::Value>(src).unwrap_err())
    }

    #[test]
    fn test_json_error_points_into_source() {
        let src = "{\n  \"cells\": [\n    { \"type\": }\n  ]\n}";
        let err = json_error(src);
        let reportable = to_reportable(&err, Some(src));
        let Reportable::Json(adapter) = &reportable else {
            panic!("Expected Json");
        };
        // On the third line, past the colon
        let offset = adapter.offset();
        assert_eq!(src[..offset].matches('\n').count(), 2);
        assert!(offset > src.rfind(':').unwrap());
        let labels: Vec<_> = reportable.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);
        assert!(labels[0].primary());
        assert_eq!(reportable.code().unwrap().to_string(), "tessera::json");
    }

    #[test]
    fn test_json_error_without_source() {
        let err = json_error("{");
        let reportable = to_reportable(&err, None);
        assert!(matches!(reportable, Reportable::Error(_)));
        assert_eq!(reportable.code().unwrap().to_string(), "tessera::json");
    }

    #[test]
    fn test_graph_error_codes() {
        let err = TesseraError::DuplicateIdentifier(Id::new("a"));
        let reportable = to_reportable(&err, Some("{}"));
        assert_eq!(reportable.code().unwrap().to_string(), "tessera::graph");
        assert_eq!(reportable.to_string(), "a cell with id `a` already exists");
        assert!(reportable.help().is_none());
        assert!(reportable.labels().is_none());

        let err = TesseraError::UnknownCellType("fancy.Shape".to_string());
        let reportable = to_reportable(&err, None);
        assert!(reportable.help().unwrap().to_string().contains("standard.Rectangle"));
    }

    #[test]
    fn test_other_error_codes() {
        let cases = [
            (TesseraError::Config("bad".to_string()), "tessera::config"),
            (
                TesseraError::UnknownStrategy {
                    kind: "router",
                    name: "manhattan".to_string(),
                },
                "tessera::strategy",
            ),
            (TesseraError::invalid_attribute("size", "not an object"), "tessera::attribute"),
        ];
        for (err, code) in &cases {
            assert_eq!(ErrorAdapter(err).code().unwrap().to_string(), *code);
        }
    }
}
