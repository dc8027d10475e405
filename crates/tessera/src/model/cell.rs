//! The [`Cell`] entity shared by elements and links.

use std::fmt;

use serde_json::{Map, Value};

use tessera_core::{
    geometry::{Point, Rect, Size},
    identifier::Id,
    scene::MarkupNode,
};

use crate::{
    error::TesseraError,
    model::{Endpoint, Label, Ports},
    strategy::StrategyRef,
};

/// The two variants of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellKind {
    Element,
    Link,
}

impl CellKind {
    /// Name used in qualified event names such as `element:add`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Element => "element",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node or an edge of the graph.
///
/// A cell is an identifier, a type tag and an ordered attribute bag. The
/// typed accessors below read well-known attributes (`position`, `source`,
/// `z`, ...) and fall back to neutral values when an attribute is absent.
///
/// Cells are only mutated through [`Graph`](crate::model::Graph), which
/// validates every write and emits change events.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    id: Id,
    cell_type: String,
    kind: CellKind,
    attributes: Map<String, Value>,
}

impl Cell {
    /// Creates a cell from its parts. `id` and `type` entries in
    /// `attributes` are dropped, they live outside the bag.
    pub fn new(
        id: impl Into<Id>,
        cell_type: &str,
        kind: CellKind,
        mut attributes: Map<String, Value>,
    ) -> Self {
        attributes.remove("id");
        attributes.remove("type");
        Self {
            id: id.into(),
            cell_type: cell_type.to_string(),
            kind,
            attributes,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn cell_type(&self) -> &str {
        &self.cell_type
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn is_element(&self) -> bool {
        self.kind == CellKind::Element
    }

    pub fn is_link(&self) -> bool {
        self.kind == CellKind::Link
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Reads a nested value. Path segments are separated by `/` or `.`;
    /// numeric segments index into arrays.
    pub fn prop(&self, path: &str) -> Option<&Value> {
        let mut segments = split_path(path).into_iter();
        let first = segments.next()?;
        let mut current = self.attributes.get(first)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Paint order key. Cells get one when they are added to a graph.
    pub fn z(&self) -> i64 {
        self.attributes
            .get("z")
            .and_then(|z| z.as_i64().or_else(|| z.as_f64().map(|f| f as i64)))
            .unwrap_or(0)
    }

    pub fn has_z(&self) -> bool {
        self.attributes.get("z").is_some_and(Value::is_number)
    }

    pub fn parent(&self) -> Option<Id> {
        self.attributes
            .get("parent")
            .and_then(Value::as_str)
            .map(Id::new)
    }

    pub fn embeds(&self) -> Vec<Id> {
        self.attributes
            .get("embeds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(Id::new).collect())
            .unwrap_or_default()
    }

    /// The `attrs` map, selector to attribute map.
    pub fn attrs(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("attrs").and_then(Value::as_object)
    }

    /// The markup descriptor, if the cell declares one.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::Scene`] when the descriptor is malformed.
    pub fn markup(&self) -> Result<Option<Vec<MarkupNode>>, TesseraError> {
        match self.attributes.get("markup") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(MarkupNode::from_value(value)?)),
        }
    }

    // =========================================================================
    // Element attributes
    // =========================================================================

    pub fn position(&self) -> Point {
        self.attributes
            .get("position")
            .and_then(point_from_value)
            .unwrap_or_default()
    }

    pub fn size(&self) -> Size {
        let Some(size) = self.attributes.get("size") else {
            return Size::default();
        };
        let read = |key: &str| size.get(key).and_then(Value::as_f64).unwrap_or(0.0);
        Size::new(read("width").max(0.0), read("height").max(0.0))
    }

    /// Rotation in degrees, clockwise on screen.
    pub fn angle(&self) -> f64 {
        self.attributes
            .get("angle")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    }

    /// Unrotated model box. Links report the box around their endpoints
    /// and vertices; endpoints attached to cells are not resolved here.
    pub fn bbox(&self) -> Rect {
        match self.kind {
            CellKind::Element => {
                let position = self.position();
                let size = self.size();
                Rect::new(position.x(), position.y(), size.width(), size.height())
            }
            CellKind::Link => {
                let mut points = self.vertices();
                if let Endpoint::Point(p) = self.source() {
                    points.push(p);
                }
                if let Endpoint::Point(p) = self.target() {
                    points.push(p);
                }
                Rect::bounding(points).unwrap_or_default()
            }
        }
    }

    pub fn center(&self) -> Point {
        self.bbox().center()
    }

    /// The element's box at the origin, the frame port layouts work in.
    pub(crate) fn size_box(&self) -> Rect {
        let size = self.size();
        Rect::new(0.0, 0.0, size.width(), size.height())
    }

    pub fn ports(&self) -> Ports {
        self.attributes
            .get("ports")
            .and_then(|ports| Ports::from_value(ports).ok())
            .unwrap_or_default()
    }

    pub fn has_port(&self, port: &str) -> bool {
        self.ports().item(port).is_some()
    }

    // =========================================================================
    // Link attributes
    // =========================================================================

    pub fn source(&self) -> Endpoint {
        Endpoint::from_value(self.attributes.get("source"))
    }

    pub fn target(&self) -> Endpoint {
        Endpoint::from_value(self.attributes.get("target"))
    }

    pub fn vertices(&self) -> Vec<Point> {
        self.attributes
            .get("vertices")
            .and_then(Value::as_array)
            .map(|points| points.iter().filter_map(point_from_value).collect())
            .unwrap_or_default()
    }

    pub fn labels(&self) -> Vec<Label> {
        self.attributes
            .get("labels")
            .and_then(Value::as_array)
            .map(|labels| labels.iter().filter_map(Label::from_value).collect())
            .unwrap_or_default()
    }

    /// A strategy descriptor stored under `key` (`router`, `connector`, ...).
    pub fn strategy(&self, key: &str) -> Option<StrategyRef> {
        self.attributes
            .get(key)
            .and_then(|value| StrategyRef::from_value(value).ok())
    }

    // =========================================================================
    // Serialization and crate-internal mutation
    // =========================================================================

    /// JSON form `{type, id, ...attributes}`.
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        object.insert("type".to_string(), Value::String(self.cell_type.clone()));
        object.insert("id".to_string(), Value::String(self.id.to_string()));
        for (key, value) in &self.attributes {
            object.insert(key.clone(), value.clone());
        }
        Value::Object(object)
    }

    /// Replaces an attribute and returns the previous value.
    pub(crate) fn set(&mut self, key: &str, value: Value) -> Option<Value> {
        self.attributes.insert(key.to_string(), value)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Value> {
        self.attributes.shift_remove(key)
    }

    pub(crate) fn attributes_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attributes
    }

    pub(crate) fn set_id(&mut self, id: Id) {
        self.id = id;
    }
}

/// Splits a property path on `/` or `.`.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    path.split(['/', '.'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

/// Reads `{x, y}` into a point.
pub(crate) fn point_from_value(value: &Value) -> Option<Point> {
    let x = value.get("x")?.as_f64()?;
    let y = value.get("y")?.as_f64()?;
    Some(Point::new(x, y))
}

pub(crate) fn point_to_value(p: Point) -> Value {
    serde_json::json!({ "x": p.x(), "y": p.y() })
}

/// Deep equality where numbers compare by value, so `1` equals `1.0`.
pub(crate) fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| same_value(a, b))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| same_value(value, other)))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use super::*;

    fn element() -> Cell {
        let attributes = json!({
            "position": { "x": 10, "y": 20 },
            "size": { "width": 100, "height": -5 },
            "angle": 30,
            "attrs": { "body": { "fill": "red" } },
            "z": 3
        });
        Cell::new(
            "a",
            "standard.Rectangle",
            CellKind::Element,
            attributes.as_object().cloned().unwrap(),
        )
    }

    #[test]
    fn test_element_accessors() {
        let cell = element();
        assert_eq!(cell.id(), "a");
        assert_eq!(cell.position(), Point::new(10.0, 20.0));
        assert_approx_eq!(f64, cell.size().width(), 100.0);
        assert_approx_eq!(f64, cell.size().height(), 0.0);
        assert_approx_eq!(f64, cell.angle(), 30.0);
        assert_eq!(cell.z(), 3);
    }

    #[test]
    fn test_prop_paths() {
        let cell = element();
        assert_eq!(cell.prop("attrs/body/fill"), Some(&json!("red")));
        assert_eq!(cell.prop("attrs.body.fill"), Some(&json!("red")));
        assert_eq!(cell.prop("attrs/label"), None);
    }

    #[test]
    fn test_to_json_puts_type_and_id_first() {
        let json = element().to_json();
        let keys: Vec<&String> = json.as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "type");
        assert_eq!(keys[1], "id");
    }

    #[test]
    fn test_same_value_ignores_number_representation() {
        assert!(same_value(&json!({ "x": 1, "y": [2] }), &json!({ "x": 1.0, "y": [2.0] })));
        assert!(!same_value(&json!({ "x": 1 }), &json!({ "x": 1, "y": 0 })));
        assert!(!same_value(&json!("1"), &json!(1)));
    }

    #[test]
    fn test_link_bbox_from_points() {
        let attributes = json!({
            "source": { "x": 0, "y": 0 },
            "target": { "x": 100, "y": 50 },
            "vertices": [ { "x": 50, "y": 80 } ]
        });
        let link = Cell::new(
            "l",
            "link",
            CellKind::Link,
            attributes.as_object().cloned().unwrap(),
        );
        let bbox = link.bbox();
        assert_approx_eq!(f64, bbox.width(), 100.0);
        assert_approx_eq!(f64, bbox.height(), 80.0);
    }
}
