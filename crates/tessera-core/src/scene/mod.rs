//! A retained drawable tree that mirrors an SVG document.
//!
//! Views never talk to a real DOM. They build and mutate nodes in a
//! [`Scene`], an arena of SVG-like elements addressed by generational
//! [`NodeId`]s. The scene answers the geometric questions the renderer needs
//! (node shapes, bounding boxes, accumulated transforms) and serializes to
//! SVG text.
//!
//! # Overview
//!
//! - [`Scene`] - The arena and its tree operations
//! - [`NodeId`] - A handle that becomes stale when its node is removed
//! - [`MarkupNode`] - Declarative descriptors views expand into subtrees
//! - [`Selectors`] - Selector name to node lookup produced by markup expansion
//! - [`TextMeasurer`] - Font-backed measurement for `<text>` nodes
//!
//! # Mutation Accounting
//!
//! Every effective change (a new node, a moved node, an attribute that
//! actually changes value) bumps [`Scene::mutation_count`]. Writing an
//! attribute with its current value is not a mutation.

mod markup;
mod svg;
mod text;

use indexmap::IndexMap;
use log::warn;
use thiserror::Error;

pub use markup::{MarkupNode, Selectors, value_to_attribute};
pub use text::TextMeasurer;

use crate::geometry::{Ellipse, Line, Matrix, Path, Point, Polyline, Rect, Shape};

/// Errors produced by scene operations.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene node {0} no longer exists")]
    StaleNode(NodeId),

    #[error("selector `{0}` is defined more than once")]
    DuplicateSelector(String),

    #[error("selector `{0}` does not match any node")]
    UnknownSelector(String),

    #[error("invalid markup: {0}")]
    InvalidMarkup(String),

    #[error("a node cannot be inserted into itself or one of its descendants")]
    CyclicInsert,
}

/// Generational handle of a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

/// A single element of the drawable tree.
#[derive(Debug, Clone)]
pub struct SceneNode {
    tag: String,
    attributes: IndexMap<String, String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    text: Option<String>,
}

impl SceneNode {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: IndexMap::new(),
            children: Vec::new(),
            parent: None,
            text: None,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attributes(&self) -> &IndexMap<String, String> {
        &self.attributes
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<SceneNode>,
}

/// Arena of scene nodes with a single `<svg>` root.
#[derive(Debug)]
pub struct Scene {
    slots: Vec<Slot>,
    free: Vec<u32>,
    root: NodeId,
    mutations: u64,
    text: TextMeasurer,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    /// Creates a scene containing only the `<svg>` root.
    pub fn new() -> Self {
        let mut scene = Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: NodeId {
                index: 0,
                generation: 0,
            },
            mutations: 0,
            text: TextMeasurer::new(),
        };
        let root = scene.create_element("svg");
        scene.root = root;
        scene.mutations = 0;
        scene
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of effective mutations applied since creation.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    /// Number of live nodes, including the root.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn text_measurer(&self) -> &TextMeasurer {
        &self.text
    }

    // =========================================================================
    // Node access
    // =========================================================================

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node(&self, id: NodeId) -> Option<&SceneNode> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode, SceneError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
            .ok_or(SceneError::StaleNode(id))
    }

    fn get(&self, id: NodeId) -> Result<&SceneNode, SceneError> {
        self.node(id).ok_or(SceneError::StaleNode(id))
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.node(id).map(SceneNode::tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).and_then(SceneNode::parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map(SceneNode::children).unwrap_or(&[])
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)
            .and_then(|node| node.attributes.get(name))
            .map(String::as_str)
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.node(id).and_then(SceneNode::text)
    }

    /// The node and all of its descendants in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Whether `node` is `ancestor` or lies below it.
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Whether the node is attached (directly or indirectly) to the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.contains(id) && self.is_descendant_of(id, self.root)
    }

    // =========================================================================
    // Tree mutation
    // =========================================================================

    /// Creates a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.mutations += 1;
        let node = SceneNode::new(tag);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        let index = self.get(parent)?.children.len();
        self.insert_at(parent, child, index)
    }

    /// Inserts `child` before `reference`, or appends when `reference` is
    /// `None` or not a child of `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), SceneError> {
        if reference == Some(child) {
            return Ok(());
        }
        self.detach(child)?;
        let children = &self.get(parent)?.children;
        let index = reference
            .and_then(|r| children.iter().position(|c| *c == r))
            .unwrap_or(children.len());
        self.insert_at(parent, child, index)
    }

    /// Inserts `child` at `index` among the children of `parent`.
    pub fn insert_at(
        &mut self,
        parent: NodeId,
        child: NodeId,
        index: usize,
    ) -> Result<(), SceneError> {
        self.get(child)?;
        self.get(parent)?;
        if self.is_descendant_of(parent, child) {
            return Err(SceneError::CyclicInsert);
        }
        let previous = self.parent(child);
        if previous == Some(parent) {
            let siblings = &self.get(parent)?.children;
            if siblings.get(index) == Some(&child)
                || (index > 0 && siblings.get(index - 1) == Some(&child))
            {
                return Ok(());
            }
        }
        let mut index = index;
        if let Some(old_parent) = previous {
            let siblings = &mut self.node_mut(old_parent)?.children;
            if let Some(position) = siblings.iter().position(|c| *c == child) {
                siblings.remove(position);
                if old_parent == parent && position < index {
                    index -= 1;
                }
            }
        }
        let siblings = &mut self.node_mut(parent)?.children;
        let index = index.min(siblings.len());
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        self.mutations += 1;
        Ok(())
    }

    /// Detaches a node from its parent, keeping the node and its subtree alive.
    pub fn detach(&mut self, id: NodeId) -> Result<(), SceneError> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.node_mut(id)?.parent = None;
        self.mutations += 1;
        Ok(())
    }

    /// Removes a node and its whole subtree. Handles to removed nodes become stale.
    pub fn remove(&mut self, id: NodeId) -> Result<(), SceneError> {
        if id == self.root {
            return self.clear_children(id);
        }
        self.detach(id)?;
        for node in self.descendants(id) {
            let slot = &mut self.slots[node.index as usize];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
        }
        self.mutations += 1;
        Ok(())
    }

    /// Removes every child of a node.
    pub fn clear_children(&mut self, id: NodeId) -> Result<(), SceneError> {
        let children = self.get(id)?.children.clone();
        for child in children {
            self.remove(child)?;
        }
        Ok(())
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Sets an attribute. Returns `true` when the value actually changed.
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> Result<bool, SceneError> {
        let value = value.into();
        let node = self.node_mut(id)?;
        if node.attributes.get(name) == Some(&value) {
            return Ok(false);
        }
        node.attributes.insert(name.to_string(), value);
        self.mutations += 1;
        Ok(true)
    }

    /// Removes an attribute. Returns `true` when it was present.
    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<bool, SceneError> {
        let removed = self.node_mut(id)?.attributes.shift_remove(name).is_some();
        if removed {
            self.mutations += 1;
        }
        Ok(removed)
    }

    /// Replaces the text content of a node. Children are left untouched.
    pub fn set_text(&mut self, id: NodeId, text: Option<&str>) -> Result<bool, SceneError> {
        let node = self.node_mut(id)?;
        if node.text.as_deref() == text {
            return Ok(false);
        }
        node.text = text.map(str::to_string);
        self.mutations += 1;
        Ok(true)
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attribute(id, "class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<bool, SceneError> {
        if self.has_class(id, class) {
            return Ok(false);
        }
        let classes = match self.attribute(id, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {class}", existing.trim()),
            _ => class.to_string(),
        };
        self.set_attribute(id, "class", classes)
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<bool, SceneError> {
        if !self.has_class(id, class) {
            return Ok(false);
        }
        let classes: Vec<&str> = self
            .attribute(id, "class")
            .unwrap_or_default()
            .split_whitespace()
            .filter(|c| *c != class)
            .collect();
        let classes = classes.join(" ");
        if classes.is_empty() {
            self.remove_attribute(id, "class")
        } else {
            self.set_attribute(id, "class", classes)
        }
    }

    /// Whether the node or any ancestor is hidden with `display="none"`.
    pub fn is_hidden(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if self.attribute(node, "display") == Some("none") {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Transform declared on the node itself. An unparsable transform is
    /// reported and treated as the identity.
    pub fn local_transform(&self, id: NodeId) -> Matrix {
        let Some(value) = self.attribute(id, "transform") else {
            return Matrix::identity();
        };
        match Matrix::parse_transform_list(value) {
            Ok(matrix) => matrix,
            Err(err) => {
                warn!(node:? = id, value, err = err.to_string(); "Ignoring invalid transform");
                Matrix::identity()
            }
        }
    }

    /// Transform from the node's user space to scene (root) space, including
    /// the node's own transform.
    pub fn ctm(&self, id: NodeId) -> Matrix {
        let mut chain = Vec::new();
        let mut current = Some(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.parent(node);
        }
        chain
            .iter()
            .rev()
            .fold(Matrix::identity(), |acc, node| {
                acc.multiply(&self.local_transform(*node))
            })
    }

    /// Transform from the node's user space into the user space of `ancestor`.
    ///
    /// Falls back to the scene transform when `ancestor` is not above `id`.
    pub fn transform_to(&self, id: NodeId, ancestor: NodeId) -> Matrix {
        let mut matrix = Matrix::identity();
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return matrix;
            }
            matrix = self.local_transform(node).multiply(&matrix);
            current = self.parent(node);
        }
        matrix
    }

    /// Outline of a node in its own user space, for the SVG shapes that have
    /// one. Text and images report their box.
    pub fn node_shape(&self, id: NodeId) -> Option<Shape> {
        let node = self.node(id)?;
        let number = |name: &str| parse_length(node.attributes.get(name).map(String::as_str));
        match node.tag.as_str() {
            "rect" | "image" | "foreignObject" | "use" => Some(Shape::Rect(Rect::new(
                number("x"),
                number("y"),
                number("width"),
                number("height"),
            ))),
            "circle" => {
                let r = number("r");
                Some(Shape::Ellipse(Ellipse::new(
                    Point::new(number("cx"), number("cy")),
                    r,
                    r,
                )))
            }
            "ellipse" => Some(Shape::Ellipse(Ellipse::new(
                Point::new(number("cx"), number("cy")),
                number("rx"),
                number("ry"),
            ))),
            "line" => Some(Shape::Line(Line::new(
                Point::new(number("x1"), number("y1")),
                Point::new(number("x2"), number("y2")),
            ))),
            "polyline" | "polygon" => {
                let points = node
                    .attributes
                    .get("points")
                    .and_then(|points| Polyline::parse(points))
                    .unwrap_or_default();
                if node.tag == "polygon" {
                    Some(Shape::Polygon(points))
                } else {
                    Some(Shape::Polyline(points))
                }
            }
            "path" => {
                let data = node.attributes.get("d")?;
                match Path::parse(data) {
                    Ok(path) => Some(Shape::Path(path)),
                    Err(err) => {
                        warn!(node:? = id, err = err.to_string(); "Ignoring invalid path data");
                        None
                    }
                }
            }
            "text" => self.text_bbox(id).map(Shape::Rect),
            _ => None,
        }
    }

    /// Bounding box of a node in its own user space (its own transform is
    /// not applied). Groups report the union of their visible children.
    pub fn local_bbox(&self, id: NodeId) -> Option<Rect> {
        let node = self.node(id)?;
        if node.attributes.get("display").map(String::as_str) == Some("none") {
            return None;
        }
        if let Some(shape) = self.node_shape(id) {
            return Some(shape.bbox());
        }
        node.children
            .iter()
            .filter_map(|child| {
                let bbox = self.local_bbox(*child)?;
                Some(self.local_transform(*child).apply_rect(&bbox))
            })
            .reduce(|a, b| a.union(&b))
    }

    /// Bounding box of a node in scene space.
    pub fn global_bbox(&self, id: NodeId) -> Option<Rect> {
        let bbox = self.local_bbox(id)?;
        Some(self.ctm(id).apply_rect(&bbox))
    }

    /// Bounding box of a node in the user space of `ancestor`.
    pub fn bbox_relative_to(&self, id: NodeId, ancestor: NodeId) -> Option<Rect> {
        let bbox = self.local_bbox(id)?;
        Some(self.transform_to(id, ancestor).apply_rect(&bbox))
    }

    /// Whether a scene-space point hits the rendered node or one of its
    /// descendants.
    ///
    /// Filled shapes are hit inside their area, strokes within
    /// `max(tolerance, stroke-width / 2)` of the outline. Nodes with
    /// `pointer-events="none"` are skipped.
    pub fn hit_test(&self, id: NodeId, p: Point, tolerance: f64) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let attribute = |name: &str| node.attributes.get(name).map(String::as_str);
        if attribute("display") == Some("none") {
            return false;
        }
        if let Some(shape) = self.node_shape(id) {
            if attribute("pointer-events") != Some("none") {
                if let Some(inverse) = self.ctm(id).inverse() {
                    let local = inverse.apply(p);
                    let filled = attribute("fill") != Some("none")
                        && !matches!(shape, Shape::Line(_) | Shape::Polyline(_));
                    if filled && shape.contains_point(local) {
                        return true;
                    }
                    let stroke = if attribute("stroke").is_some_and(|s| s != "none") {
                        parse_length(attribute("stroke-width").or(Some("1"))) / 2.0
                    } else {
                        0.0
                    };
                    let reach = stroke.max(tolerance);
                    if reach > 0.0 {
                        let nearest = shape.closest_point(local, 2);
                        if nearest.distance(local) <= reach {
                            return true;
                        }
                    }
                }
            }
        }
        node.children
            .iter()
            .any(|child| self.hit_test(*child, p, tolerance))
    }

    /// Measured box of a `<text>` node. Each `<tspan>` child is a line; a
    /// text node without children uses its own content split on newlines.
    fn text_bbox(&self, id: NodeId) -> Option<Rect> {
        let node = self.node(id)?;
        let font_size = match node.attributes.get("font-size") {
            Some(size) => parse_length(Some(size)),
            None => text::DEFAULT_FONT_SIZE,
        };
        let family = node
            .attributes
            .get("font-family")
            .map(String::as_str)
            .unwrap_or(text::DEFAULT_FONT_FAMILY);
        let mut lines: Vec<String> = node
            .children
            .iter()
            .filter_map(|child| self.node(*child))
            .filter(|child| child.tag == "tspan")
            .map(|child| child.text.clone().unwrap_or_default())
            .collect();
        if lines.is_empty() {
            lines = node
                .text
                .as_deref()
                .unwrap_or_default()
                .split('\n')
                .map(str::to_string)
                .collect();
        }
        let content = lines.join("\n");
        if content.is_empty() {
            return None;
        }
        let size = self.text.measure(&content, family, font_size);
        let x = parse_length(node.attributes.get("x").map(String::as_str));
        let y = parse_length(node.attributes.get("y").map(String::as_str));
        let left = match node.attributes.get("text-anchor").map(String::as_str) {
            Some("middle") => x - size.width() / 2.0,
            Some("end") => x - size.width(),
            _ => x,
        };
        // Vertical alignment is expressed as a `dy` shift of the first line
        let shift = node
            .children
            .iter()
            .filter_map(|child| self.node(*child))
            .find(|child| child.tag == "tspan")
            .and_then(|tspan| tspan.attributes.get("dy"))
            .map(|dy| match dy.trim().strip_suffix("em") {
                Some(em) => em.trim().parse::<f64>().unwrap_or(0.0) * font_size,
                None => parse_length(Some(dy)),
            })
            .unwrap_or(0.0);
        // Approximate ascent of the first line above the baseline
        let top = y + shift - font_size * 0.8;
        Some(Rect::new(left, top, size.width(), size.height()))
    }
}

/// Reads the leading number of an SVG length such as `"10"`, `"10px"` or
/// `"1.5e2"`. Missing or unparsable values are zero.
pub fn parse_length(value: Option<&str>) -> f64 {
    let Some(value) = value else {
        return 0.0;
    };
    let trimmed = value.trim();
    let numeric = trimmed
        .strip_suffix("px")
        .unwrap_or(trimmed)
        .trim();
    numeric.parse::<f64>().unwrap_or_else(|_| {
        let end = numeric
            .char_indices()
            .find(|(i, c)| !(c.is_ascii_digit() || *c == '.' || ((*c == '-' || *c == '+') && *i == 0)))
            .map(|(i, _)| i)
            .unwrap_or(numeric.len());
        numeric[..end].parse::<f64>().unwrap_or(0.0)
    })
}
