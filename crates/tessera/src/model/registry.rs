//! Cell type registry with layered defaults.
//!
//! A type names its kind, an optional parent type and a defaults map.
//! Effective defaults are the deep merge of the chain from the root type
//! down to the type itself, and instance attributes are merged over them.
//! Objects merge key by key; arrays and scalars replace.

use indexmap::IndexMap;
use log::debug;
use serde_json::{Map, Value, json};

use tessera_core::identifier::Id;

use crate::{
    error::TesseraError,
    model::{Cell, CellKind},
};

#[derive(Debug, Clone)]
struct CellType {
    kind: CellKind,
    parent: Option<String>,
    defaults: Map<String, Value>,
}

/// Maps type names to their kind and defaults.
#[derive(Debug, Clone)]
pub struct CellRegistry {
    types: IndexMap<String, CellType>,
}

impl Default for CellRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl CellRegistry {
    /// A registry with no types at all.
    pub fn empty() -> Self {
        Self {
            types: IndexMap::new(),
        }
    }

    /// A registry with the built-in `element`, `link` and `standard.*`
    /// types.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for (name, kind, parent, defaults) in builtin_types() {
            registry.types.insert(
                name.to_string(),
                CellType {
                    kind,
                    parent: parent.map(str::to_string),
                    defaults: defaults.as_object().cloned().unwrap_or_default(),
                },
            );
        }
        registry
    }

    /// Registers (or replaces) a type.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownCellType`] for an unknown parent and
    /// [`TesseraError::InvalidAttribute`] when `defaults` is not an object or
    /// the parent has the other kind.
    pub fn register(
        &mut self,
        name: &str,
        kind: CellKind,
        parent: Option<&str>,
        defaults: Value,
    ) -> Result<(), TesseraError> {
        if let Some(parent) = parent {
            let parent_kind = self
                .kind_of(parent)
                .ok_or_else(|| TesseraError::UnknownCellType(parent.to_string()))?;
            if parent_kind != kind {
                return Err(TesseraError::invalid_attribute(
                    "type",
                    format!("`{name}` is an {kind} but its parent `{parent}` is an {parent_kind}"),
                ));
            }
        }
        let Value::Object(defaults) = defaults else {
            return Err(TesseraError::invalid_attribute(
                "defaults",
                format!("defaults of `{name}` must be an object"),
            ));
        };
        debug!(cell_type = name, kind = kind.as_str(); "Registering cell type");
        self.types.insert(
            name.to_string(),
            CellType {
                kind,
                parent: parent.map(str::to_string),
                defaults,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<CellKind> {
        self.types.get(name).map(|cell_type| cell_type.kind)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Effective defaults of a type, merged from its root type down.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownCellType`] when the type or one of its
    /// ancestors is not registered.
    pub fn defaults_for(&self, name: &str) -> Result<Map<String, Value>, TesseraError> {
        let mut chain = Vec::new();
        let mut current = Some(name);
        while let Some(type_name) = current {
            let cell_type = self
                .types
                .get(type_name)
                .ok_or_else(|| TesseraError::UnknownCellType(type_name.to_string()))?;
            if chain.len() > self.types.len() {
                return Err(TesseraError::UnknownCellType(name.to_string()));
            }
            chain.push(cell_type);
            current = cell_type.parent.as_deref();
        }
        let mut merged = Map::new();
        for cell_type in chain.into_iter().rev() {
            merge_into(&mut merged, &cell_type.defaults);
        }
        Ok(merged)
    }

    /// Merges the type defaults under the cell's own attributes. Applying
    /// defaults twice yields the same attributes.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownCellType`] for an unregistered type and
    /// [`TesseraError::WrongKind`] when the cell kind disagrees with the type.
    pub fn apply_defaults(&self, cell: &mut Cell) -> Result<(), TesseraError> {
        let kind = self
            .kind_of(cell.cell_type())
            .ok_or_else(|| TesseraError::UnknownCellType(cell.cell_type().to_string()))?;
        if kind != cell.kind() {
            return Err(TesseraError::WrongKind {
                id: cell.id(),
                expected: kind,
            });
        }
        let mut merged = self.defaults_for(cell.cell_type())?;
        merge_into(&mut merged, cell.attributes());
        *cell.attributes_mut() = merged;
        Ok(())
    }

    /// Builds a cell from its JSON form `{type, id?, ...attributes}`.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] when the value is not an
    /// object or has no string `type`, and the errors of
    /// [`CellRegistry::apply_defaults`].
    pub fn instantiate(&self, value: &Value) -> Result<Cell, TesseraError> {
        let Value::Object(object) = value else {
            return Err(TesseraError::invalid_attribute(
                "cell",
                "a cell must be a JSON object",
            ));
        };
        let cell_type = object
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| TesseraError::invalid_attribute("type", "missing cell type"))?;
        let kind = self
            .kind_of(cell_type)
            .ok_or_else(|| TesseraError::UnknownCellType(cell_type.to_string()))?;
        let id = match object.get("id") {
            Some(Value::String(id)) => Id::new(id),
            Some(Value::Number(id)) => Id::new(&id.to_string()),
            Some(other) => {
                return Err(TesseraError::invalid_attribute(
                    "id",
                    format!("expected a string, found {other}"),
                ));
            }
            None => Id::new(&uuid::Uuid::new_v4().to_string()),
        };
        let mut cell = Cell::new(id, cell_type, kind, object.clone());
        self.apply_defaults(&mut cell)?;
        Ok(cell)
    }
}

/// Deep-merges `overlay` into `base`.
pub(crate) fn merge_into(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn label_attrs() -> Value {
    json!({
        "textVerticalAnchor": "middle",
        "textAnchor": "middle",
        "x": "calc(w/2)",
        "y": "calc(h/2)",
        "fontSize": 14,
        "fill": "#333333"
    })
}

fn body_and_label_markup(body: &str) -> Value {
    json!([
        { "tagName": body, "selector": "body" },
        { "tagName": "text", "selector": "label" }
    ])
}

fn builtin_types() -> Vec<(&'static str, CellKind, Option<&'static str>, Value)> {
    vec![
        (
            "element",
            CellKind::Element,
            None,
            json!({
                "position": { "x": 0, "y": 0 },
                "size": { "width": 1, "height": 1 },
                "angle": 0
            }),
        ),
        (
            "link",
            CellKind::Link,
            None,
            json!({
                "markup": [
                    {
                        "tagName": "path",
                        "selector": "wrapper",
                        "attributes": {
                            "fill": "none",
                            "stroke": "transparent",
                            "stroke-width": 10,
                            "stroke-linecap": "round"
                        }
                    },
                    {
                        "tagName": "path",
                        "selector": "line",
                        "attributes": { "fill": "none", "pointer-events": "none" }
                    }
                ],
                "attrs": {
                    "wrapper": { "connection": true },
                    "line": { "connection": true, "stroke": "#000000", "strokeWidth": 1 }
                }
            }),
        ),
        (
            "standard.Rectangle",
            CellKind::Element,
            Some("element"),
            json!({
                "attrs": {
                    "root": { "cursor": "move" },
                    "body": {
                        "width": "calc(w)",
                        "height": "calc(h)",
                        "strokeWidth": 2,
                        "stroke": "#000000",
                        "fill": "#FFFFFF"
                    },
                    "label": label_attrs()
                },
                "markup": body_and_label_markup("rect")
            }),
        ),
        (
            "standard.Ellipse",
            CellKind::Element,
            Some("element"),
            json!({
                "attrs": {
                    "root": { "cursor": "move" },
                    "body": {
                        "cx": "calc(w/2)",
                        "cy": "calc(h/2)",
                        "rx": "calc(w/2)",
                        "ry": "calc(h/2)",
                        "strokeWidth": 2,
                        "stroke": "#333333",
                        "fill": "#FFFFFF"
                    },
                    "label": label_attrs()
                },
                "markup": body_and_label_markup("ellipse")
            }),
        ),
        (
            "standard.Circle",
            CellKind::Element,
            Some("element"),
            json!({
                "attrs": {
                    "root": { "cursor": "move" },
                    "body": {
                        "cx": "calc(s/2)",
                        "cy": "calc(s/2)",
                        "r": "calc(s/2)",
                        "strokeWidth": 2,
                        "stroke": "#333333",
                        "fill": "#FFFFFF"
                    },
                    "label": label_attrs()
                },
                "markup": body_and_label_markup("circle")
            }),
        ),
        (
            "standard.Path",
            CellKind::Element,
            Some("element"),
            json!({
                "attrs": {
                    "root": { "cursor": "move" },
                    "body": {
                        "d": "M 0 0 H calc(w) V calc(h) H 0 Z",
                        "strokeWidth": 2,
                        "stroke": "#333333",
                        "fill": "#FFFFFF"
                    },
                    "label": label_attrs()
                },
                "markup": body_and_label_markup("path")
            }),
        ),
        (
            "standard.Link",
            CellKind::Link,
            Some("link"),
            json!({
                "attrs": {
                    "line": {
                        "connection": true,
                        "stroke": "#333333",
                        "strokeWidth": 2,
                        "strokeLinejoin": "round",
                        "targetMarker": { "type": "path", "d": "M 10 -5 0 0 10 5 z" }
                    },
                    "wrapper": {
                        "connection": true,
                        "strokeWidth": 10,
                        "strokeLinejoin": "round"
                    }
                },
                "markup": [
                    {
                        "tagName": "path",
                        "selector": "wrapper",
                        "attributes": {
                            "fill": "none",
                            "cursor": "pointer",
                            "stroke": "transparent",
                            "stroke-linecap": "round"
                        }
                    },
                    {
                        "tagName": "path",
                        "selector": "line",
                        "attributes": { "fill": "none", "pointer-events": "none" }
                    }
                ]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_merge_base_then_subtype() {
        let registry = CellRegistry::standard();
        let defaults = registry.defaults_for("standard.Rectangle").unwrap();
        assert_eq!(defaults["position"], json!({ "x": 0, "y": 0 }));
        assert_eq!(defaults["attrs"]["body"]["fill"], json!("#FFFFFF"));
    }

    #[test]
    fn test_instantiate_overlays_instance() {
        let registry = CellRegistry::standard();
        let cell = registry
            .instantiate(&json!({
                "type": "standard.Rectangle",
                "id": "a",
                "attrs": { "body": { "fill": "red" } }
            }))
            .unwrap();
        assert_eq!(cell.id(), "a");
        assert_eq!(cell.prop("attrs/body/fill"), Some(&json!("red")));
        assert_eq!(cell.prop("attrs/body/stroke"), Some(&json!("#000000")));
        assert!(cell.is_element());
    }

    #[test]
    fn test_apply_defaults_is_idempotent() {
        let registry = CellRegistry::standard();
        let mut cell = registry
            .instantiate(&json!({ "type": "standard.Link", "id": "l" }))
            .unwrap();
        let once = cell.clone();
        registry.apply_defaults(&mut cell).unwrap();
        assert_eq!(cell, once);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let registry = CellRegistry::standard();
        assert!(matches!(
            registry.instantiate(&json!({ "type": "custom.Thing" })),
            Err(TesseraError::UnknownCellType(name)) if name == "custom.Thing"
        ));
    }

    #[test]
    fn test_register_custom_type_with_parent() {
        let mut registry = CellRegistry::standard();
        registry
            .register(
                "app.Task",
                CellKind::Element,
                Some("standard.Rectangle"),
                json!({ "attrs": { "body": { "rx": 6 } } }),
            )
            .unwrap();
        let defaults = registry.defaults_for("app.Task").unwrap();
        assert_eq!(defaults["attrs"]["body"]["rx"], json!(6));
        assert_eq!(defaults["attrs"]["body"]["stroke"], json!("#000000"));

        assert!(
            registry
                .register("app.Edge", CellKind::Link, Some("standard.Rectangle"), json!({}))
                .is_err()
        );
    }
}
