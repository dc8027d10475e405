//! JSON import and export of a whole [`Graph`].
//!
//! The document form is `{"cells": [...]}` with cells listed in paint order.
//! Each cell is `{type, id, ...attributes}`; unknown attributes survive a
//! round trip untouched.

use log::info;
use serde_json::{Map, Value};

use crate::{
    error::TesseraError,
    model::{Cell, CellRegistry, Graph, Options},
};

impl Graph {
    /// Serializes every cell in paint order.
    pub fn to_json(&self) -> Value {
        let cells: Vec<Value> = self.cells().into_iter().map(Cell::to_json).collect();
        let mut document = Map::new();
        document.insert("cells".to_string(), Value::Array(cells));
        Value::Object(document)
    }

    /// Builds a graph from a document, instantiating cells through
    /// `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] when `cells` is missing,
    /// or any error of [`CellRegistry::instantiate`] and
    /// [`Graph::reset_cells`].
    pub fn from_json(value: &Value, registry: CellRegistry) -> Result<Graph, TesseraError> {
        let mut graph = Graph::new(registry);
        graph.load_json(value, Options::default())?;
        Ok(graph)
    }

    /// Replaces the content of this graph with a document. Emits a single
    /// `reset` event.
    ///
    /// # Errors
    ///
    /// See [`Graph::from_json`]. The graph is untouched on error.
    pub fn load_json(&mut self, value: &Value, options: Options) -> Result<(), TesseraError> {
        let Some(items) = value.get("cells").and_then(Value::as_array) else {
            return Err(TesseraError::invalid_attribute(
                "cells",
                "document has no `cells` array",
            ));
        };
        let cells = items
            .iter()
            .map(|item| self.registry().instantiate(item))
            .collect::<Result<Vec<_>, _>>()?;
        info!(cells = cells.len(); "Loading graph document");
        self.reset_cells(cells, options)
    }

    /// Parses a JSON document and loads it. See [`Graph::load_json`].
    ///
    /// # Errors
    ///
    /// [`TesseraError::Json`] for malformed text, then the errors of
    /// [`Graph::load_json`].
    pub fn load_str(&mut self, text: &str, options: Options) -> Result<(), TesseraError> {
        let value: Value = serde_json::from_str(text)?;
        self.load_json(&value, options)
    }
}
