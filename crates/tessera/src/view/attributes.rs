//! Application of `attrs` objects to scene nodes.
//!
//! Attribute names are written in camelCase in cell JSON and converted to
//! SVG's kebab-case. String values may embed `calc()` expressions evaluated
//! against a reference box (the element size, or the link's connection box).
//!
//! A few names are not plain attributes:
//!
//! - `text` replaces the node's content with one `<tspan>` per line
//! - `textVerticalAnchor` (`top`, `middle`, `bottom`) shifts the first line
//! - `connection: true` sets `d` to the link's resolved path
//! - `sourceMarker` / `targetMarker` define a `<marker>` and reference it

use indexmap::IndexMap;
use log::trace;
use serde_json::{Map, Value};

use tessera_core::{
    geometry::{Path, Rect},
    scene::{NodeId, Scene, value_to_attribute},
};

use crate::{error::TesseraError, view::calc};

/// SVG attributes that keep their camelCase spelling.
const CAMEL_CASE_ATTRIBUTES: &[&str] = &[
    "viewBox",
    "preserveAspectRatio",
    "markerWidth",
    "markerHeight",
    "markerUnits",
    "refX",
    "refY",
    "gradientUnits",
    "gradientTransform",
    "patternUnits",
    "patternTransform",
    "textLength",
    "lengthAdjust",
    "startOffset",
    "pathLength",
];

const SPECIAL_ATTRIBUTES: &[&str] = &[
    "text",
    "textVerticalAnchor",
    "connection",
    "sourceMarker",
    "targetMarker",
];

const LINE_HEIGHT_EM: f64 = 1.2;

/// Converts `strokeWidth` to `stroke-width`. Names that already contain a
/// `-` or `:` and the camelCase SVG attributes are kept.
pub fn kebab_case(name: &str) -> String {
    if name.contains(['-', ':']) || CAMEL_CASE_ATTRIBUTES.contains(&name) {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Marker definitions shared by all links of a paper, keyed by content.
#[derive(Debug)]
pub struct MarkerDefs {
    defs: NodeId,
    defined: IndexMap<String, (String, NodeId)>,
    next: usize,
}

impl MarkerDefs {
    pub fn new(defs: NodeId) -> Self {
        Self {
            defs,
            defined: IndexMap::new(),
            next: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.defined.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defined.is_empty()
    }

    /// Returns the id of a `<marker>` drawing `marker`, creating it the
    /// first time. `stroke` is the stroke of the referencing node, used as
    /// the marker's default paint. Target markers are turned around so one
    /// descriptor points outward at both ends.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] for a non-object marker.
    pub fn define(
        &mut self,
        scene: &mut Scene,
        marker: &Value,
        stroke: Option<&str>,
        is_target: bool,
    ) -> Result<String, TesseraError> {
        let Value::Object(descriptor) = marker else {
            return Err(TesseraError::invalid_attribute(
                if is_target { "targetMarker" } else { "sourceMarker" },
                format!("expected an object, found {marker}"),
            ));
        };
        let key = format!("{}|{}|{}", is_target, stroke.unwrap_or_default(), marker);
        if let Some((id, node)) = self.defined.get(&key) {
            if scene.contains(*node) {
                return Ok(id.clone());
            }
        }

        let id = format!("tessera-marker-{}", self.next);
        self.next += 1;
        let node = scene.create_element("marker");
        scene.set_attribute(node, "id", id.as_str())?;
        scene.set_attribute(node, "orient", "auto")?;
        scene.set_attribute(node, "overflow", "visible")?;
        scene.set_attribute(node, "markerUnits", "userSpaceOnUse")?;

        let tag = descriptor.get("type").and_then(Value::as_str).unwrap_or("path");
        let content = scene.create_element(tag);
        let mut attributes: Map<String, Value> = Map::new();
        if let Some(stroke) = stroke {
            attributes.insert("fill".to_string(), Value::from(stroke));
            attributes.insert("stroke".to_string(), Value::from(stroke));
        }
        if is_target {
            attributes.insert("transform".to_string(), Value::from("rotate(180)"));
        }
        for (name, value) in descriptor {
            if name != "type" && name != "markup" {
                attributes.insert(kebab_case(name), value.clone());
            }
        }
        for (name, value) in &attributes {
            if let Some(value) = value_to_attribute(value) {
                scene.set_attribute(content, name, value)?;
            }
        }
        scene.append_child(node, content)?;
        scene.append_child(self.defs, node)?;
        trace!(marker = id.as_str(); "Defined marker");
        self.defined.insert(key, (id.clone(), node));
        Ok(id)
    }
}

/// Inputs shared by every attribute of one application pass.
pub struct AttrContext<'a> {
    bbox: Rect,
    connection: Option<&'a Path>,
    markers: Option<&'a mut MarkerDefs>,
}

impl<'a> AttrContext<'a> {
    pub fn new(bbox: Rect) -> Self {
        Self {
            bbox,
            connection: None,
            markers: None,
        }
    }

    pub fn with_connection(mut self, connection: Option<&'a Path>) -> Self {
        self.connection = connection;
        self
    }

    pub fn with_markers(mut self, markers: &'a mut MarkerDefs) -> Self {
        self.markers = Some(markers);
        self
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }
}

/// Applies one selector's `attrs` object to `node`.
///
/// Writing a value equal to the current one is not a scene mutation, so
/// re-applying unchanged attributes costs no scene work.
///
/// # Errors
///
/// Returns [`TesseraError::InvalidAttribute`] for values that cannot be
/// written and [`TesseraError::Scene`] for stale nodes.
pub fn apply(
    scene: &mut Scene,
    node: NodeId,
    attrs: &Map<String, Value>,
    context: &mut AttrContext<'_>,
) -> Result<(), TesseraError> {
    for (name, value) in attrs {
        if SPECIAL_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        apply_plain(scene, node, &kebab_case(name), value, &context.bbox)?;
    }

    if let Some(text) = attrs.get("text") {
        let text = match text {
            Value::Null => None,
            Value::String(text) => Some(text.clone()),
            other => value_to_attribute(other),
        };
        match text {
            Some(text) => apply_text(scene, node, &text, attrs.get("textVerticalAnchor"))?,
            None => {
                scene.clear_children(node)?;
                scene.set_text(node, None)?;
            }
        }
    }

    if let Some(connection) = attrs.get("connection") {
        let enabled = match connection {
            Value::Bool(enabled) => *enabled,
            Value::Null => false,
            _ => true,
        };
        if enabled {
            let data = context
                .connection
                .map(|path| path.to_string())
                .unwrap_or_default();
            scene.set_attribute(node, "d", data)?;
        }
    }

    for (name, attribute, is_target) in [
        ("sourceMarker", "marker-start", false),
        ("targetMarker", "marker-end", true),
    ] {
        let Some(marker) = attrs.get(name) else {
            continue;
        };
        if marker.is_null() {
            scene.remove_attribute(node, attribute)?;
            continue;
        }
        let Some(markers) = context.markers.as_deref_mut() else {
            continue;
        };
        let stroke = scene.attribute(node, "stroke").map(str::to_string);
        let id = markers.define(scene, marker, stroke.as_deref(), is_target)?;
        scene.set_attribute(node, attribute, format!("url(#{id})"))?;
    }
    Ok(())
}

fn apply_plain(
    scene: &mut Scene,
    node: NodeId,
    name: &str,
    value: &Value,
    bbox: &Rect,
) -> Result<(), TesseraError> {
    match value {
        Value::Null => {
            scene.remove_attribute(node, name)?;
        }
        Value::Object(_) | Value::Array(_) => {
            return Err(TesseraError::invalid_attribute(
                name,
                format!("expected a scalar value, found {value}"),
            ));
        }
        scalar => {
            let Some(mut text) = value_to_attribute(scalar) else {
                return Ok(());
            };
            if calc::is_calc(&text) {
                text = calc::substitute(&text, bbox)?;
            }
            scene.set_attribute(node, name, text)?;
        }
    }
    Ok(())
}

/// Dy of the first line for a vertical anchor and line count.
fn first_line_dy(anchor: Option<&Value>, lines: usize) -> String {
    let extra = (lines.saturating_sub(1)) as f64 * LINE_HEIGHT_EM;
    let em = match anchor.and_then(Value::as_str) {
        Some("top") => 0.8,
        Some("middle") => 0.3 - extra / 2.0,
        Some("bottom") => -0.2 - extra,
        _ => match anchor.and_then(Value::as_f64) {
            Some(number) => return calc::format_number(number),
            None => 0.0,
        },
    };
    format!("{}em", calc::format_number(em))
}

fn apply_text(scene: &mut Scene, node: NodeId, text: &str, anchor: Option<&Value>) -> Result<(), TesseraError> {
    let lines: Vec<&str> = text.split('\n').collect();
    let x = scene.attribute(node, "x").unwrap_or("0").to_string();
    let children = scene.children(node).to_vec();
    let reusable = children.len() == lines.len()
        && children.iter().all(|child| scene.tag(*child) == Some("tspan"));
    let tspans = if reusable {
        children
    } else {
        scene.clear_children(node)?;
        let mut created = Vec::with_capacity(lines.len());
        for _ in &lines {
            let tspan = scene.create_element("tspan");
            scene.append_child(node, tspan)?;
            created.push(tspan);
        }
        created
    };
    scene.set_text(node, None)?;
    let first_dy = first_line_dy(anchor, lines.len());
    let next_dy = format!("{}em", calc::format_number(LINE_HEIGHT_EM));
    for (index, (tspan, line)) in tspans.iter().zip(&lines).enumerate() {
        scene.set_attribute(*tspan, "x", x.as_str())?;
        let dy = if index == 0 { first_dy.as_str() } else { next_dy.as_str() };
        scene.set_attribute(*tspan, "dy", dy)?;
        scene.set_text(*tspan, Some(line))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attrs(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("strokeWidth"), "stroke-width");
        assert_eq!(kebab_case("fill"), "fill");
        assert_eq!(kebab_case("stroke-dasharray"), "stroke-dasharray");
        assert_eq!(kebab_case("xlink:href"), "xlink:href");
        assert_eq!(kebab_case("viewBox"), "viewBox");
    }

    #[test]
    fn test_plain_and_calc_attributes() {
        let mut scene = Scene::new();
        let rect = scene.create_element("rect");
        let mut context = AttrContext::new(Rect::new(0.0, 0.0, 120.0, 40.0));
        apply(
            &mut scene,
            rect,
            &attrs(json!({ "width": "calc(w)", "height": "calc(h - 10)", "strokeWidth": 2 })),
            &mut context,
        )
        .unwrap();
        assert_eq!(scene.attribute(rect, "width"), Some("120"));
        assert_eq!(scene.attribute(rect, "height"), Some("30"));
        assert_eq!(scene.attribute(rect, "stroke-width"), Some("2"));

        apply(&mut scene, rect, &attrs(json!({ "strokeWidth": null })), &mut context).unwrap();
        assert_eq!(scene.attribute(rect, "stroke-width"), None);

        let err = apply(&mut scene, rect, &attrs(json!({ "fill": { "a": 1 } })), &mut context).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidAttribute { .. }));
    }

    #[test]
    fn test_reapplying_is_not_a_mutation() {
        let mut scene = Scene::new();
        let text = scene.create_element("text");
        let mut context = AttrContext::new(Rect::new(0.0, 0.0, 100.0, 50.0));
        let label = attrs(json!({
            "x": "calc(w/2)",
            "text": "two\nlines",
            "textVerticalAnchor": "middle"
        }));
        apply(&mut scene, text, &label, &mut context).unwrap();
        assert_eq!(scene.children(text).len(), 2);
        let first = scene.children(text)[0];
        assert_eq!(scene.attribute(first, "dy"), Some("-0.3em"));
        assert_eq!(scene.attribute(first, "x"), Some("50"));

        let before = scene.mutation_count();
        apply(&mut scene, text, &label, &mut context).unwrap();
        assert_eq!(scene.mutation_count(), before);
    }

    #[test]
    fn test_connection_and_markers() {
        let mut scene = Scene::new();
        let defs = scene.create_element("defs");
        scene.append_child(scene.root(), defs).unwrap();
        let mut markers = MarkerDefs::new(defs);
        let line = scene.create_element("path");
        let connection = Path::parse("M 0 0 L 10 0").unwrap();
        let descriptor = attrs(json!({
            "connection": true,
            "stroke": "#333333",
            "targetMarker": { "type": "path", "d": "M 10 -5 0 0 10 5 z" }
        }));
        {
            let mut context = AttrContext::new(Rect::default())
                .with_connection(Some(&connection))
                .with_markers(&mut markers);
            apply(&mut scene, line, &descriptor, &mut context).unwrap();
            apply(&mut scene, line, &descriptor, &mut context).unwrap();
        }
        assert_eq!(scene.attribute(line, "d"), Some("M 0 0 L 10 0"));
        assert_eq!(scene.attribute(line, "marker-end"), Some("url(#tessera-marker-0)"));
        assert_eq!(markers.len(), 1);
        let marker = scene.children(defs)[0];
        let content = scene.children(marker)[0];
        assert_eq!(scene.attribute(content, "transform"), Some("rotate(180)"));
        assert_eq!(scene.attribute(content, "fill"), Some("#333333"));
    }
}
