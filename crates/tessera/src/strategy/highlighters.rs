//! Highlighters.
//!
//! A highlighter decorates a node of a rendered view and returns a
//! [`HighlightState`] describing everything it changed, so the decoration
//! can be undone exactly.

use serde_json::{Map, Value};

use tessera_core::{
    color::Color,
    geometry::{Path, Rect},
    scene::{NodeId, Scene, value_to_attribute},
};

use crate::{
    error::TesseraError,
    strategy::{Args, Highlighter},
    view::attributes::kebab_case,
};

/// What a highlighter changed on the scene.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightState {
    created: Vec<NodeId>,
    attributes: Vec<(NodeId, String, Option<String>)>,
    classes: Vec<(NodeId, String)>,
}

impl HighlightState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes added by the highlighter.
    pub fn created(&self) -> &[NodeId] {
        &self.created
    }

    /// Sets an attribute and remembers its previous value.
    pub fn set_attribute(
        &mut self,
        scene: &mut Scene,
        node: NodeId,
        name: &str,
        value: &str,
    ) -> Result<(), TesseraError> {
        let previous = scene.attribute(node, name).map(str::to_string);
        scene.set_attribute(node, name, value)?;
        self.attributes.push((node, name.to_string(), previous));
        Ok(())
    }

    /// Adds a class, remembering it only when it was not already set.
    pub fn add_class(&mut self, scene: &mut Scene, node: NodeId, class: &str) -> Result<(), TesseraError> {
        if scene.add_class(node, class)? {
            self.classes.push((node, class.to_string()));
        }
        Ok(())
    }

    pub fn push_created(&mut self, node: NodeId) {
        self.created.push(node);
    }

    /// Reverts every recorded change. Nodes that no longer exist (the view
    /// re-rendered) are skipped.
    ///
    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn restore(&self, scene: &mut Scene) -> Result<(), TesseraError> {
        for node in self.created.iter().rev() {
            if scene.contains(*node) {
                scene.remove(*node)?;
            }
        }
        for (node, name, previous) in self.attributes.iter().rev() {
            if !scene.contains(*node) {
                continue;
            }
            match previous {
                Some(value) => {
                    scene.set_attribute(*node, name, value.as_str())?;
                }
                None => {
                    scene.remove_attribute(*node, name)?;
                }
            }
        }
        for (node, class) in &self.classes {
            if scene.contains(*node) {
                scene.remove_class(*node, class)?;
            }
        }
        Ok(())
    }
}

/// Outlines the node with a stroked path drawn on top of the view.
///
/// Options:
/// - `padding` (default 3): outline the node's box grown by this much
///   instead of its exact shape; `0` follows the shape
/// - `rx`, `ry`: corner radii of the padded box
/// - `attrs`: presentation attributes of the outline
#[derive(Debug, Clone, Copy, Default)]
pub struct StrokeHighlighter;

pub const STROKE_CLASS: &str = "tessera-highlight-stroke";

impl Highlighter for StrokeHighlighter {
    fn highlight(
        &self,
        scene: &mut Scene,
        root: NodeId,
        node: NodeId,
        args: &Args<'_>,
    ) -> Result<HighlightState, TesseraError> {
        let mut attributes: Map<String, Value> = Map::new();
        attributes.insert("stroke".to_string(), Value::from("#FEB663"));
        attributes.insert("stroke-width".to_string(), Value::from(3));
        attributes.insert("fill".to_string(), Value::from("none"));
        attributes.insert("pointer-events".to_string(), Value::from("none"));
        if let Some(Value::Object(overrides)) = args.get("attrs") {
            for (name, value) in overrides {
                attributes.insert(kebab_case(name), value.clone());
            }
        }
        if let Some(stroke) = attributes.get("stroke").and_then(Value::as_str) {
            Color::new(stroke).map_err(|err| TesseraError::invalid_attribute("stroke", err))?;
        }

        let padding = args.number_or("padding", 3.0);
        let data = if padding > 0.0 {
            let bbox = scene
                .local_bbox(node)
                .unwrap_or_default()
                .inflate(padding, padding);
            rect_path_data(&bbox, args.number_or("rx", 0.0), args.number_or("ry", 0.0))
        } else {
            match scene.node_shape(node) {
                Some(shape) => shape.to_path().to_string(),
                None => rect_path_data(&scene.local_bbox(node).unwrap_or_default(), 0.0, 0.0),
            }
        };

        let outline = scene.create_element("path");
        let mut state = HighlightState::new();
        state.push_created(outline);
        scene.set_attribute(outline, "d", data)?;
        let matrix = scene.transform_to(node, root);
        if !matrix.is_identity() {
            scene.set_attribute(outline, "transform", matrix.to_transform_string())?;
        }
        for (name, value) in &attributes {
            if let Some(value) = value_to_attribute(value) {
                scene.set_attribute(outline, name, value)?;
            }
        }
        scene.add_class(outline, STROKE_CLASS)?;
        scene.append_child(root, outline)?;
        Ok(state)
    }
}

fn rect_path_data(bbox: &Rect, rx: f64, ry: f64) -> String {
    if rx <= 0.0 && ry <= 0.0 {
        let mut path = Path::from_points(&[bbox.origin(), bbox.top_right(), bbox.corner(), bbox.bottom_left()]);
        path.close();
        return path.to_string();
    }
    let rx = (if rx > 0.0 { rx } else { ry }).min(bbox.width() / 2.0);
    let ry = (if ry > 0.0 { ry } else { rx }).min(bbox.height() / 2.0);
    let (x, y, w, h) = (bbox.x(), bbox.y(), bbox.width(), bbox.height());
    format!(
        "M {} {} L {} {} A {rx} {ry} 0 0 1 {} {} L {} {} A {rx} {ry} 0 0 1 {} {} L {} {} A {rx} {ry} 0 0 1 {} {} L {} {} A {rx} {ry} 0 0 1 {} {} Z",
        x + rx,
        y,
        x + w - rx,
        y,
        x + w,
        y + ry,
        x + w,
        y + h - ry,
        x + w - rx,
        y + h,
        x + rx,
        y + h,
        x,
        y + h - ry,
        x,
        y + ry,
        x + rx,
        y
    )
}

/// Toggles a class on the node (`className`, default `tessera-highlighted`).
#[derive(Debug, Clone, Copy, Default)]
pub struct AddClass;

pub const DEFAULT_HIGHLIGHT_CLASS: &str = "tessera-highlighted";

impl Highlighter for AddClass {
    fn highlight(
        &self,
        scene: &mut Scene,
        _root: NodeId,
        node: NodeId,
        args: &Args<'_>,
    ) -> Result<HighlightState, TesseraError> {
        let class = args.string("className").unwrap_or(DEFAULT_HIGHLIGHT_CLASS);
        if class.trim().is_empty() || class.contains(char::is_whitespace) {
            return Err(TesseraError::invalid_attribute(
                "className",
                format!("`{class}` is not a single class name"),
            ));
        }
        let mut state = HighlightState::new();
        state.add_class(scene, node, class)?;
        Ok(state)
    }
}

/// Fades the node to `alphaValue` (default 0.3).
#[derive(Debug, Clone, Copy, Default)]
pub struct Opacity;

impl Highlighter for Opacity {
    fn highlight(
        &self,
        scene: &mut Scene,
        _root: NodeId,
        node: NodeId,
        args: &Args<'_>,
    ) -> Result<HighlightState, TesseraError> {
        let alpha = args.number_or("alphaValue", 0.3);
        if !(0.0..=1.0).contains(&alpha) {
            return Err(TesseraError::invalid_attribute(
                "alphaValue",
                format!("{alpha} is outside 0..=1"),
            ));
        }
        let mut state = HighlightState::new();
        state.set_attribute(scene, node, "opacity", &alpha.to_string())?;
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn scene_with_rect() -> (Scene, NodeId, NodeId) {
        let mut scene = Scene::new();
        let root = scene.create_element("g");
        scene.append_child(scene.root(), root).unwrap();
        let rect = scene.create_element("rect");
        scene.append_child(root, rect).unwrap();
        scene.set_attribute(rect, "width", "40").unwrap();
        scene.set_attribute(rect, "height", "20").unwrap();
        (scene, root, rect)
    }

    #[test]
    fn test_stroke_adds_and_removes_outline() {
        let (mut scene, root, rect) = scene_with_rect();
        let before = scene.to_svg_string();
        let none = Value::Null;
        let state = StrokeHighlighter
            .highlight(&mut scene, root, rect, &Args::new(&none))
            .unwrap();
        assert_eq!(scene.children(root).len(), 2);
        let outline = state.created()[0];
        assert_eq!(scene.attribute(outline, "stroke"), Some("#FEB663"));
        assert_eq!(scene.attribute(outline, "pointer-events"), Some("none"));
        assert!(scene.has_class(outline, STROKE_CLASS));

        StrokeHighlighter.unhighlight(&mut scene, &state).unwrap();
        assert_eq!(scene.children(root).len(), 1);
        assert_eq!(scene.to_svg_string(), before);
    }

    #[test]
    fn test_stroke_rejects_bad_color() {
        let (mut scene, root, rect) = scene_with_rect();
        let args = json!({ "attrs": { "stroke": "not-a-color" } });
        let err = StrokeHighlighter
            .highlight(&mut scene, root, rect, &Args::new(&args))
            .unwrap_err();
        assert!(matches!(err, TesseraError::InvalidAttribute { .. }));
        assert_eq!(scene.children(root).len(), 1);
    }

    #[test]
    fn test_add_class_round_trip() {
        let (mut scene, root, rect) = scene_with_rect();
        let args = json!({ "className": "selected" });
        let state = AddClass.highlight(&mut scene, root, rect, &Args::new(&args)).unwrap();
        assert!(scene.has_class(rect, "selected"));
        AddClass.unhighlight(&mut scene, &state).unwrap();
        assert!(!scene.has_class(rect, "selected"));
    }

    #[test]
    fn test_opacity_restores_previous_value() {
        let (mut scene, root, rect) = scene_with_rect();
        scene.set_attribute(rect, "opacity", "0.9").unwrap();
        let none = Value::Null;
        let state = Opacity.highlight(&mut scene, root, rect, &Args::new(&none)).unwrap();
        assert_eq!(scene.attribute(rect, "opacity"), Some("0.3"));
        Opacity.unhighlight(&mut scene, &state).unwrap();
        assert_eq!(scene.attribute(rect, "opacity"), Some("0.9"));
    }
}
