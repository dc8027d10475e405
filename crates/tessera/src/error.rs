//! Error types for Tessera operations.
//!
//! This module provides the main error type [`TesseraError`]. Model
//! operations return it synchronously and never apply a change partially;
//! view failures are wrapped into paper events instead of being returned.

use std::io;

use thiserror::Error;

use tessera_core::{identifier::Id, scene::SceneError};

use crate::model::CellKind;

/// The main error type for Tessera operations.
#[derive(Debug, Error)]
pub enum TesseraError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("a cell with id `{0}` already exists")]
    DuplicateIdentifier(Id),

    #[error("embedding `{child}` into `{parent}` would create a cycle")]
    CyclicEmbedding { parent: Id, child: Id },

    #[error("`{child}` is already embedded in `{parent}`")]
    AlreadyEmbedded { parent: Id, child: Id },

    #[error("link `{link}` references missing `{target}`")]
    DanglingReference { link: Id, target: String },

    #[error("no cell with id `{0}`")]
    UnknownCell(Id),

    #[error("unknown cell type `{0}`")]
    UnknownCellType(String),

    #[error("cell `{id}` is not an {expected}")]
    WrongKind { id: Id, expected: CellKind },

    #[error("port `{port}` is defined more than once on `{element}`")]
    DuplicatePortIdentifier { element: Id, port: String },

    #[error("invalid selector `{selector}` on `{cell}`: {reason}")]
    InvalidSelector {
        cell: Id,
        selector: String,
        reason: String,
    },

    #[error("invalid attribute `{name}`: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("no {kind} named `{name}` is registered")]
    UnknownStrategy { kind: &'static str, name: String },

    #[error("no intersection: {0}")]
    NoIntersection(String),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TesseraError {
    /// Create an `InvalidAttribute` error.
    pub fn invalid_attribute(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAttribute {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
