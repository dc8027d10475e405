//! Link endpoints, labels and the [`Link`] builder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tessera_core::{geometry::Point, identifier::Id};

use crate::{
    model::{Cell, CellKind, cell::point_to_value},
    strategy::StrategyRef,
};

/// A link end attached to a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellEnd {
    id: Id,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor: Option<StrategyRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    connection_point: Option<StrategyRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    priority: bool,
}

impl CellEnd {
    pub fn new(id: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            port: None,
            selector: None,
            anchor: None,
            connection_point: None,
            priority: false,
        }
    }

    pub fn with_port(mut self, port: &str) -> Self {
        self.port = Some(port.to_string());
        self
    }

    pub fn with_selector(mut self, selector: &str) -> Self {
        self.selector = Some(selector.to_string());
        self
    }

    pub fn with_anchor(mut self, anchor: StrategyRef) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_connection_point(mut self, connection_point: StrategyRef) -> Self {
        self.connection_point = Some(connection_point);
        self
    }

    pub fn with_priority(mut self, priority: bool) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn anchor(&self) -> Option<&StrategyRef> {
        self.anchor.as_ref()
    }

    pub fn connection_point(&self) -> Option<&StrategyRef> {
        self.connection_point.as_ref()
    }

    /// Whether the end keeps its anchor as the connection point regardless
    /// of the route.
    pub fn priority(&self) -> bool {
        self.priority
    }
}

/// One end of a link: a fixed point or a cell reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Cell(CellEnd),
    Point(Point),
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Point(Point::default())
    }
}

impl Endpoint {
    /// Reads an endpoint attribute. Anything that is neither a reference nor
    /// a point is read as the origin.
    pub fn from_value(value: Option<&Value>) -> Self {
        value
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Point(p) => point_to_value(*p),
            Self::Cell(end) => serde_json::to_value(end).unwrap_or(Value::Null),
        }
    }

    pub fn cell_id(&self) -> Option<Id> {
        match self {
            Self::Cell(end) => Some(end.id()),
            Self::Point(_) => None,
        }
    }

    pub fn as_cell(&self) -> Option<&CellEnd> {
        match self {
            Self::Cell(end) => Some(end),
            Self::Point(_) => None,
        }
    }
}

impl From<Point> for Endpoint {
    fn from(p: Point) -> Self {
        Self::Point(p)
    }
}

impl From<CellEnd> for Endpoint {
    fn from(end: CellEnd) -> Self {
        Self::Cell(end)
    }
}

/// Offset of a label from its point on the connection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LabelOffset {
    /// Distance along the normal of the connection at that point.
    Normal(f64),
    /// Absolute displacement.
    Absolute(Point),
}

/// Where a label sits along a link.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelPosition {
    distance: f64,
    offset: LabelOffset,
    angle: f64,
    keep_gradient: bool,
    ensure_legibility: bool,
    absolute_distance: bool,
    reverse_distance: bool,
}

impl Default for LabelPosition {
    fn default() -> Self {
        Self {
            distance: 0.5,
            offset: LabelOffset::Normal(0.0),
            angle: 0.0,
            keep_gradient: false,
            ensure_legibility: false,
            absolute_distance: false,
            reverse_distance: false,
        }
    }
}

impl LabelPosition {
    /// Reads a position that is either a bare distance or
    /// `{distance, offset, angle, args}`.
    pub fn from_value(value: Option<&Value>) -> Self {
        let mut position = Self::default();
        match value {
            Some(Value::Number(distance)) => {
                position.distance = distance.as_f64().unwrap_or(0.5);
            }
            Some(Value::Object(map)) => {
                if let Some(distance) = map.get("distance").and_then(Value::as_f64) {
                    position.distance = distance;
                }
                match map.get("offset") {
                    Some(Value::Number(offset)) => {
                        position.offset = LabelOffset::Normal(offset.as_f64().unwrap_or(0.0));
                    }
                    Some(offset @ Value::Object(_)) => {
                        let read = |key: &str| offset.get(key).and_then(Value::as_f64).unwrap_or(0.0);
                        position.offset = LabelOffset::Absolute(Point::new(read("x"), read("y")));
                    }
                    _ => {}
                }
                position.angle = map.get("angle").and_then(Value::as_f64).unwrap_or(0.0);
                if let Some(args) = map.get("args") {
                    let flag = |key: &str| args.get(key).and_then(Value::as_bool).unwrap_or(false);
                    position.keep_gradient = flag("keepGradient");
                    position.ensure_legibility = flag("ensureLegibility");
                    position.absolute_distance = flag("absoluteDistance");
                    position.reverse_distance = flag("reverseDistance");
                }
            }
            _ => {}
        }
        position
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn offset(&self) -> LabelOffset {
        self.offset
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn keep_gradient(&self) -> bool {
        self.keep_gradient
    }

    pub fn ensure_legibility(&self) -> bool {
        self.ensure_legibility
    }

    /// Length along a connection of `total` length where the label sits.
    ///
    /// Distances in `(0, 1]` are ratios unless `absoluteDistance` is set.
    /// Negative distances, or `reverseDistance`, count from the end.
    pub fn length_along(&self, total: f64) -> f64 {
        let distance = self.distance;
        let relative = !self.absolute_distance && distance > 0.0 && distance <= 1.0;
        if relative {
            if self.reverse_distance {
                return total * (1.0 - distance);
            }
            return total * distance;
        }
        if distance < 0.0 || self.reverse_distance {
            return (total - distance.abs()).max(0.0);
        }
        distance.min(total)
    }
}

/// A text (or arbitrary markup) label attached to a link.
#[derive(Debug, Clone, PartialEq)]
pub struct Label {
    attrs: Map<String, Value>,
    position: LabelPosition,
    markup: Option<Value>,
}

impl Label {
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        Some(Self {
            attrs: object
                .get("attrs")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            position: LabelPosition::from_value(object.get("position")),
            markup: object.get("markup").cloned(),
        })
    }

    /// A plain text label at `distance` along the link.
    pub fn text(text: &str, distance: f64) -> Value {
        serde_json::json!({
            "attrs": { "text": { "text": text } },
            "position": { "distance": distance }
        })
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn position(&self) -> &LabelPosition {
        &self.position
    }

    pub fn markup(&self) -> Option<&Value> {
        self.markup.as_ref()
    }
}

/// Builder for link cells.
///
/// # Examples
///
/// ```
/// use tessera::model::{CellEnd, Link};
/// use tessera::geometry::Point;
///
/// let link = Link::new("standard.Link")
///     .with_id("l1")
///     .with_source(CellEnd::new("a"))
///     .with_target(Point::new(100.0, 0.0))
///     .build();
/// assert!(link.is_link());
/// assert_eq!(link.source().cell_id().unwrap(), "a");
/// ```
#[derive(Debug, Clone)]
pub struct Link {
    cell_type: String,
    id: Option<String>,
    attributes: Map<String, Value>,
}

impl Link {
    pub fn new(cell_type: &str) -> Self {
        Self {
            cell_type: cell_type.to_string(),
            id: None,
            attributes: Map::new(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_source(mut self, source: impl Into<Endpoint>) -> Self {
        self.attributes
            .insert("source".to_string(), source.into().to_value());
        self
    }

    pub fn with_target(mut self, target: impl Into<Endpoint>) -> Self {
        self.attributes
            .insert("target".to_string(), target.into().to_value());
        self
    }

    pub fn with_vertices(mut self, vertices: &[Point]) -> Self {
        let vertices = vertices.iter().map(|p| point_to_value(*p)).collect();
        self.attributes
            .insert("vertices".to_string(), Value::Array(vertices));
        self
    }

    pub fn with_label(mut self, label: Value) -> Self {
        let labels = self
            .attributes
            .entry("labels")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(labels) = labels {
            labels.push(label);
        }
        self
    }

    pub fn with_router(mut self, router: StrategyRef) -> Self {
        self.attributes
            .insert("router".to_string(), router.to_value());
        self
    }

    pub fn with_connector(mut self, connector: StrategyRef) -> Self {
        self.attributes
            .insert("connector".to_string(), connector.to_value());
        self
    }

    pub fn with_attrs(mut self, attrs: Value) -> Self {
        self.attributes.insert("attrs".to_string(), attrs);
        self
    }

    pub fn with_z(mut self, z: i64) -> Self {
        self.attributes.insert("z".to_string(), Value::from(z));
        self
    }

    /// Sets an arbitrary attribute.
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Finishes the cell. A random id is generated when none was given.
    pub fn build(self) -> Cell {
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Cell::new(id.as_str(), &self.cell_type, CellKind::Link, self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_endpoint_from_value() {
        let end = Endpoint::from_value(Some(&json!({ "id": "a", "port": "out" })));
        let cell_end = end.as_cell().unwrap();
        assert_eq!(cell_end.id(), "a");
        assert_eq!(cell_end.port(), Some("out"));

        let point = Endpoint::from_value(Some(&json!({ "x": 5, "y": 6 })));
        assert_eq!(point, Endpoint::Point(Point::new(5.0, 6.0)));
        assert_eq!(Endpoint::from_value(None), Endpoint::Point(Point::default()));
    }

    #[test]
    fn test_cell_end_strategies() {
        let end = Endpoint::from_value(Some(&json!({
            "id": "a",
            "anchor": { "name": "midSide", "args": { "padding": 5 } },
            "connectionPoint": "bbox"
        })));
        let cell_end = end.as_cell().unwrap();
        assert_eq!(cell_end.anchor().unwrap().name(), "midSide");
        assert_eq!(cell_end.connection_point().unwrap().name(), "bbox");
    }

    #[test]
    fn test_label_position_variants() {
        let bare = LabelPosition::from_value(Some(&json!(0.25)));
        assert_approx_eq!(f64, bare.length_along(200.0), 50.0);

        let absolute = LabelPosition::from_value(Some(&json!({ "distance": 30 })));
        assert_approx_eq!(f64, absolute.length_along(200.0), 30.0);

        let reverse = LabelPosition::from_value(Some(&json!({ "distance": -30 })));
        assert_approx_eq!(f64, reverse.length_along(200.0), 170.0);

        let offset = LabelPosition::from_value(Some(&json!({ "offset": { "x": 1, "y": 2 } })));
        assert_eq!(offset.offset(), LabelOffset::Absolute(Point::new(1.0, 2.0)));
    }

    #[test]
    fn test_link_builder_generates_id() {
        let link = Link::new("link")
            .with_source(Point::new(0.0, 0.0))
            .with_target(Point::new(10.0, 0.0))
            .build();
        assert!(!link.id().to_string().is_empty());
        assert_eq!(link.target(), Endpoint::Point(Point::new(10.0, 0.0)));
    }
}
