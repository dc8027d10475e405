//! The [`Element`] builder.

use serde_json::{Map, Value};

use tessera_core::geometry::{Point, Size};

use crate::model::{Cell, CellKind, Port, Ports, cell::point_to_value};

/// Builder for element cells.
///
/// # Examples
///
/// ```
/// use tessera::model::Element;
/// use tessera::geometry::{Point, Size};
///
/// let cell = Element::new("standard.Rectangle")
///     .with_id("a")
///     .with_position(Point::new(10.0, 10.0))
///     .with_size(Size::new(80.0, 40.0))
///     .build();
/// assert!(cell.is_element());
/// assert_eq!(cell.bbox().center(), Point::new(50.0, 30.0));
/// ```
#[derive(Debug, Clone)]
pub struct Element {
    cell_type: String,
    id: Option<String>,
    attributes: Map<String, Value>,
    ports: Ports,
}

impl Element {
    pub fn new(cell_type: &str) -> Self {
        Self {
            cell_type: cell_type.to_string(),
            id: None,
            attributes: Map::new(),
            ports: Ports::default(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.attributes
            .insert("position".to_string(), point_to_value(position));
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.attributes.insert(
            "size".to_string(),
            serde_json::json!({ "width": size.width(), "height": size.height() }),
        );
        self
    }

    pub fn with_angle(mut self, angle: f64) -> Self {
        self.attributes.insert("angle".to_string(), Value::from(angle));
        self
    }

    /// Sets the `attrs` map (selector to attributes).
    pub fn with_attrs(mut self, attrs: Value) -> Self {
        self.attributes.insert("attrs".to_string(), attrs);
        self
    }

    pub fn with_z(mut self, z: i64) -> Self {
        self.attributes.insert("z".to_string(), Value::from(z));
        self
    }

    pub fn with_markup(mut self, markup: Value) -> Self {
        self.attributes.insert("markup".to_string(), markup);
        self
    }

    /// Declares a port group laid out by the named layout.
    pub fn with_port_group(mut self, name: &str, group: Value) -> Self {
        if let Ok(group) = serde_json::from_value(group) {
            self.ports.insert_group(name, group);
        }
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    /// Sets an arbitrary attribute.
    pub fn with_attribute(mut self, key: &str, value: Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    /// Finishes the cell. A random id is generated when none was given.
    pub fn build(mut self) -> Cell {
        if !self.ports.is_empty() || !self.ports.groups().is_empty() {
            self.attributes
                .insert("ports".to_string(), self.ports.to_value());
        }
        let id = self
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Cell::new(id.as_str(), &self.cell_type, CellKind::Element, self.attributes)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_build_with_ports() {
        let cell = Element::new("element")
            .with_id("e")
            .with_port_group("in", json!({ "position": "left" }))
            .with_port(Port::new("a").with_group("in"))
            .build();
        assert!(cell.has_port("a"));
        assert!(!cell.has_port("b"));
        assert!(cell.ports().group("in").is_some());
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Element::new("element").build();
        let b = Element::new("element").build();
        assert_ne!(a.id(), b.id());
    }
}
