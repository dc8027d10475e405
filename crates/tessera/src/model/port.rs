//! Element ports and their layouts.
//!
//! Ports are stored on an element as
//! `{groups: {<name>: {position, attrs, markup}}, items: [{id, group, args, attrs, markup}]}`.
//! A group's `position` names the layout that places its ports inside the
//! element box; per-port `args` override the group's layout arguments.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use tessera_core::geometry::{Ellipse, Line, Point, Rect, normalize_angle};

use crate::{error::TesseraError, strategy::StrategyRef};

/// Shared settings of a port group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<StrategyRef>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attrs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    markup: Option<Value>,
}

impl PortGroup {
    pub fn position(&self) -> Option<&StrategyRef> {
        self.position.as_ref()
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn markup(&self) -> Option<&Value> {
        self.markup.as_ref()
    }
}

/// A single port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    args: Value,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    attrs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    markup: Option<Value>,
}

impl Port {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            group: None,
            args: Value::Null,
            attrs: Map::new(),
            markup: None,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_string());
        self
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn with_attrs(mut self, attrs: Map<String, Value>) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn markup(&self) -> Option<&Value> {
        self.markup.as_ref()
    }
}

/// Where a port lands, relative to the element's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortPlacement {
    position: Point,
    angle: f64,
}

impl PortPlacement {
    pub fn position(&self) -> Point {
        self.position
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    /// `transform` attribute value for the port group node.
    pub fn to_transform(&self) -> String {
        if self.angle == 0.0 {
            format!("translate({},{})", self.position.x(), self.position.y())
        } else {
            format!(
                "translate({},{}) rotate({})",
                self.position.x(),
                self.position.y(),
                self.angle
            )
        }
    }
}

/// The ports of an element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ports {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    groups: IndexMap<String, PortGroup>,
    #[serde(default)]
    items: Vec<Port>,
}

impl Ports {
    /// Reads and validates a `ports` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] for a malformed value. Port
    /// id uniqueness is checked separately by [`Ports::duplicate_id`].
    pub fn from_value(value: &Value) -> Result<Self, TesseraError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value.clone())
            .map_err(|err| TesseraError::invalid_attribute("ports", err.to_string()))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn groups(&self) -> &IndexMap<String, PortGroup> {
        &self.groups
    }

    pub fn items(&self) -> &[Port] {
        &self.items
    }

    pub fn item(&self, id: &str) -> Option<&Port> {
        self.items.iter().find(|port| port.id == id)
    }

    pub fn group(&self, name: &str) -> Option<&PortGroup> {
        self.groups.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The first port id that appears twice, if any.
    pub fn duplicate_id(&self) -> Option<&str> {
        self.items.iter().enumerate().find_map(|(i, port)| {
            self.items[..i]
                .iter()
                .any(|other| other.id == port.id)
                .then_some(port.id.as_str())
        })
    }

    pub(crate) fn push(&mut self, port: Port) {
        self.items.push(port);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<Port> {
        let index = self.items.iter().position(|port| port.id == id)?;
        Some(self.items.remove(index))
    }

    pub(crate) fn insert_group(&mut self, name: &str, group: PortGroup) {
        self.groups.insert(name.to_string(), group);
    }

    /// Port attributes merged over their group's.
    pub fn merged_attrs(&self, port: &Port) -> Map<String, Value> {
        let mut attrs = port
            .group
            .as_deref()
            .and_then(|group| self.groups.get(group))
            .map(|group| group.attrs.clone())
            .unwrap_or_default();
        for (selector, value) in &port.attrs {
            match (attrs.get_mut(selector), value) {
                (Some(Value::Object(base)), Value::Object(overlay)) => {
                    for (key, value) in overlay {
                        base.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    attrs.insert(selector.clone(), value.clone());
                }
            }
        }
        attrs
    }

    /// Computes the placement of every port inside a `size` box, in item
    /// order.
    pub fn layout(&self, bbox: &Rect) -> IndexMap<String, PortPlacement> {
        let mut placements = IndexMap::new();
        // Ports of one group share a layout; ungrouped ports are absolute
        let mut by_group: IndexMap<Option<&str>, Vec<&Port>> = IndexMap::new();
        for port in &self.items {
            by_group.entry(port.group.as_deref()).or_default().push(port);
        }
        for (group, ports) in by_group {
            let position = group
                .and_then(|group| self.groups.get(group))
                .and_then(|group| group.position.clone());
            let (name, group_args) = match &position {
                Some(position) => (position.name(), position.args().clone()),
                None => ("absolute", Value::Null),
            };
            let count = ports.len();
            for (index, port) in ports.into_iter().enumerate() {
                let args = merge_args(&group_args, &port.args);
                let placement = place(name, &args, bbox, index, count);
                placements.insert(port.id.clone(), placement);
            }
        }
        placements
    }
}

fn merge_args(group: &Value, port: &Value) -> Value {
    let mut merged = group.as_object().cloned().unwrap_or_default();
    if let Some(port) = port.as_object() {
        for (key, value) in port {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

/// Reads a number or an `"n%"` string relative to `extent`.
fn length_arg(args: &Value, key: &str, extent: f64) -> Option<f64> {
    match args.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(percent) => percent.trim().parse::<f64>().ok().map(|p| p / 100.0 * extent),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    }
}

fn number_arg(args: &Value, key: &str) -> f64 {
    args.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

fn point_arg(args: &Value, key: &str, bbox: &Rect) -> Option<Point> {
    let value = args.get(key)?;
    let x = length_arg(value, "x", bbox.width()).unwrap_or(0.0);
    let y = length_arg(value, "y", bbox.height()).unwrap_or(0.0);
    Some(Point::new(bbox.x() + x, bbox.y() + y))
}

fn place(name: &str, args: &Value, bbox: &Rect, index: usize, count: usize) -> PortPlacement {
    let ratio = (index as f64 + 0.5) / count.max(1) as f64;
    let on_line = |start: Point, end: Point| {
        let p = Line::new(start, end).point_at(ratio);
        PortPlacement {
            position: p.offset(number_arg(args, "dx"), number_arg(args, "dy")),
            angle: number_arg(args, "angle"),
        }
    };
    match name {
        "left" => on_line(bbox.origin(), bbox.bottom_left()),
        "right" => on_line(bbox.top_right(), bbox.corner()),
        "top" => on_line(bbox.origin(), bbox.top_right()),
        "bottom" => on_line(bbox.bottom_left(), bbox.corner()),
        "line" => {
            let start = point_arg(args, "start", bbox).unwrap_or(bbox.origin());
            let end = point_arg(args, "end", bbox).unwrap_or(bbox.corner());
            on_line(start, end)
        }
        "ellipseSpread" | "ellipse" => {
            let start_angle = number_arg(args, "startAngle");
            let step = args
                .get("step")
                .and_then(Value::as_f64)
                .unwrap_or(360.0 / count.max(1) as f64);
            let theta = start_angle + step * index as f64;
            let center = bbox.center();
            let ellipse = Ellipse::from_rect(bbox);
            // Angle 0 is the top of the ellipse, growing clockwise
            let mut p = ellipse.point_at_angle(theta - 90.0);
            let dr = number_arg(args, "dr");
            if dr != 0.0 {
                p = p.move_along(center, dr);
            }
            let compensate = args
                .get("compensateRotation")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            PortPlacement {
                position: p.offset(number_arg(args, "dx"), number_arg(args, "dy")),
                angle: if compensate {
                    normalize_angle(theta)
                } else {
                    number_arg(args, "angle")
                },
            }
        }
        _ => {
            let x = length_arg(args, "x", bbox.width()).unwrap_or(0.0);
            let y = length_arg(args, "y", bbox.height()).unwrap_or(0.0);
            PortPlacement {
                position: Point::new(bbox.x() + x, bbox.y() + y),
                angle: number_arg(args, "angle"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use super::*;

    fn ports(layout: Value, count: usize) -> Ports {
        let items: Vec<Value> = (0..count)
            .map(|i| json!({ "id": format!("p{i}"), "group": "g" }))
            .collect();
        Ports::from_value(&json!({
            "groups": { "g": { "position": layout } },
            "items": items
        }))
        .unwrap()
    }

    #[test]
    fn test_left_layout_spreads_evenly() {
        let placements = ports(json!("left"), 2).layout(&Rect::new(0.0, 0.0, 100.0, 100.0));
        assert_eq!(placements["p0"].position(), Point::new(0.0, 25.0));
        assert_eq!(placements["p1"].position(), Point::new(0.0, 75.0));
    }

    #[test]
    fn test_bottom_layout_with_offset() {
        let placements = ports(json!({ "name": "bottom", "args": { "dy": 5 } }), 1)
            .layout(&Rect::new(0.0, 0.0, 80.0, 40.0));
        assert_eq!(placements["p0"].position(), Point::new(40.0, 45.0));
    }

    #[test]
    fn test_absolute_layout_percentages() {
        let value = json!({
            "groups": { "g": { "position": "absolute" } },
            "items": [ { "id": "a", "group": "g", "args": { "x": "50%", "y": 10 } } ]
        });
        let placements = Ports::from_value(&value)
            .unwrap()
            .layout(&Rect::new(0.0, 0.0, 200.0, 100.0));
        assert_eq!(placements["a"].position(), Point::new(100.0, 10.0));
    }

    #[test]
    fn test_ellipse_spread_starts_at_top_clockwise() {
        let placements = ports(json!("ellipseSpread"), 4).layout(&Rect::new(0.0, 0.0, 100.0, 100.0));
        let top = placements["p0"].position();
        assert_approx_eq!(f64, top.x(), 50.0, epsilon = 1e-9);
        assert_approx_eq!(f64, top.y(), 0.0, epsilon = 1e-9);
        let right = placements["p1"].position();
        assert_approx_eq!(f64, right.x(), 100.0, epsilon = 1e-9);
        assert_approx_eq!(f64, right.y(), 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_duplicate_port_ids_are_detected() {
        let value = json!({ "items": [ { "id": "a" }, { "id": "b" }, { "id": "a" } ] });
        let ports = Ports::from_value(&value).unwrap();
        assert_eq!(ports.duplicate_id(), Some("a"));
    }

    #[test]
    fn test_merged_attrs_overlay_group() {
        let value = json!({
            "groups": { "in": { "attrs": { "circle": { "fill": "red", "r": 5 } } } },
            "items": [ { "id": "a", "group": "in", "attrs": { "circle": { "fill": "blue" } } } ]
        });
        let ports = Ports::from_value(&value).unwrap();
        let attrs = ports.merged_attrs(&ports.items()[0]);
        assert_eq!(attrs["circle"], json!({ "fill": "blue", "r": 5 }));
    }
}
