//! Pluggable geometry strategies.
//!
//! Links pick their anchors, connection points, router and connector by
//! name; highlighters are picked the same way by the paper. Every strategy
//! is a trait object registered in a [`StrategyRegistry`] and selected with a
//! [`StrategyRef`], a name plus free-form JSON arguments.
//!
//! # Overview
//!
//! - [`Anchor`] - Where a link end attaches on an element (`center`, `midSide`, ...)
//! - [`LinkAnchor`] - Where a link end attaches on another link
//! - [`ConnectionPoint`] - Where the drawn line meets the shape (`boundary`, ...)
//! - [`Router`] - The points a link passes through
//! - [`Connector`] - The path drawn through the route
//! - [`Highlighter`] - A reversible visual decoration of a node
//!
//! Element-side strategies look at the rendered view through a
//! [`MagnetView`], which exposes node boxes, outlines and transforms in
//! paper coordinates.

mod anchors;
mod connection_points;
mod connectors;
mod highlighters;
mod link_anchors;
mod routers;

use std::{fmt, rc::Rc};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tessera_core::{
    geometry::{Line, Matrix, Path, Point, Polyline, Rect, Shape},
    scene::{NodeId, Scene, Selectors, parse_length},
};

use crate::{error::TesseraError, model::Cell, view::NodeCache};

pub use anchors::{BBoxAnchor, MidSide, ModelCenter, Perpendicular};
pub use connection_points::{AnchorPoint, BBoxPoint, Boundary, RectanglePoint};
pub use connectors::{NormalConnector, RoundedConnector, SmoothConnector};
pub use highlighters::{AddClass, HighlightState, Opacity, StrokeHighlighter};
pub use link_anchors::{ConnectionClosest, ConnectionLength, ConnectionPerpendicular, ConnectionRatio};
pub use routers::{NormalRouter, OrthogonalRouter};

// =============================================================================
// Strategy references
// =============================================================================

/// A strategy selection: a registered name and its arguments.
///
/// In JSON it is either a bare name (`"orthogonal"`) or an object
/// (`{"name": "rounded", "args": {"radius": 20}}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StrategyRepr", into = "StrategyRepr")]
pub struct StrategyRef {
    name: String,
    args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum StrategyRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default, skip_serializing_if = "Value::is_null")]
        args: Value,
    },
}

impl From<StrategyRepr> for StrategyRef {
    fn from(repr: StrategyRepr) -> Self {
        match repr {
            StrategyRepr::Name(name) => Self::new(&name),
            StrategyRepr::Full { name, args } => Self { name, args },
        }
    }
}

impl From<StrategyRef> for StrategyRepr {
    fn from(strategy: StrategyRef) -> Self {
        if strategy.args.is_null() {
            StrategyRepr::Name(strategy.name)
        } else {
            StrategyRepr::Full {
                name: strategy.name,
                args: strategy.args,
            }
        }
    }
}

impl StrategyRef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            args: Value::Null,
        }
    }

    pub fn with_args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    /// Reads a strategy attribute.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::InvalidAttribute`] when the value is neither a
    /// name nor a `{name, args}` object.
    pub fn from_value(value: &Value) -> Result<Self, TesseraError> {
        serde_json::from_value(value.clone()).map_err(|_| {
            TesseraError::invalid_attribute("strategy", format!("expected a name or {{name, args}}, found {value}"))
        })
    }

    pub fn to_value(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(value) => value,
            Err(_) => Value::String(self.name.clone()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &Value {
        &self.args
    }
}

/// Typed reads over a strategy's JSON arguments.
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    value: &'a Value,
}

static NULL: Value = Value::Null;

impl<'a> Args<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    pub fn empty() -> Args<'static> {
        Args { value: &NULL }
    }

    pub fn value(&self) -> &'a Value {
        self.value
    }

    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.value.get(key).filter(|value| !value.is_null())
    }

    /// A number, also accepted as a numeric string.
    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key)? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    pub fn string(&self, key: &str) -> Option<&'a str> {
        self.get(key).and_then(Value::as_str)
    }

    /// A boolean flag; numbers and strings follow their truthiness.
    pub fn flag_or(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            None => default,
            Some(Value::Bool(flag)) => *flag,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(text)) => !text.is_empty(),
            Some(_) => true,
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        self.flag_or(key, false)
    }
}

// =============================================================================
// Magnet view
// =============================================================================

/// Read access to the rendered view a link end is attached to.
///
/// All boxes and points are in paper (model) coordinates, the user space of
/// the paper's viewport group.
#[derive(Clone, Copy)]
pub struct MagnetView<'a> {
    scene: &'a Scene,
    cell: &'a Cell,
    root: NodeId,
    magnet: NodeId,
    frame: NodeId,
    port: Option<&'a str>,
    selectors: &'a Selectors,
    cache: &'a NodeCache,
    connection: Option<&'a Path>,
}

impl fmt::Debug for MagnetView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MagnetView")
            .field("cell", &self.cell.id())
            .field("root", &self.root)
            .field("magnet", &self.magnet)
            .field("port", &self.port)
            .finish()
    }
}

impl<'a> MagnetView<'a> {
    pub fn new(
        scene: &'a Scene,
        cell: &'a Cell,
        root: NodeId,
        frame: NodeId,
        selectors: &'a Selectors,
        cache: &'a NodeCache,
    ) -> Self {
        Self {
            scene,
            cell,
            root,
            magnet: root,
            frame,
            port: None,
            selectors,
            cache,
            connection: None,
        }
    }

    pub fn with_magnet(mut self, magnet: NodeId) -> Self {
        self.magnet = magnet;
        self
    }

    pub fn with_port(mut self, port: Option<&'a str>) -> Self {
        self.port = port;
        self
    }

    /// The resolved path of a link view, for ends attached to links.
    pub fn with_connection(mut self, connection: Option<&'a Path>) -> Self {
        self.connection = connection;
        self
    }

    pub fn scene(&self) -> &'a Scene {
        self.scene
    }

    pub fn cell(&self) -> &'a Cell {
        self.cell
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn magnet(&self) -> NodeId {
        self.magnet
    }

    pub fn port(&self) -> Option<&'a str> {
        self.port
    }

    pub fn connection(&self) -> Option<&'a Path> {
        self.connection
    }

    /// Node named by a selector of the view; `root` is the view root.
    pub fn find(&self, selector: &str) -> Option<NodeId> {
        if selector == "root" {
            return Some(self.root);
        }
        self.selectors.get(selector)
    }

    /// Rotation of the element, zero for links.
    pub fn angle(&self) -> f64 {
        if self.cell.is_element() {
            self.cell.angle()
        } else {
            0.0
        }
    }

    /// Center of the model box, the rotation origin of the element.
    pub fn center(&self) -> Point {
        self.cell.center()
    }

    /// Transform from the node's user space to paper coordinates.
    pub fn node_matrix(&self, node: NodeId) -> Matrix {
        self.scene.transform_to(node, self.frame)
    }

    pub fn local_bbox(&self, node: NodeId) -> Option<Rect> {
        self.cache.local_bbox(self.scene, node)
    }

    /// Box of a node in paper coordinates, rotation included.
    pub fn node_bbox(&self, node: NodeId) -> Rect {
        match self.local_bbox(node) {
            Some(bbox) => self.node_matrix(node).apply_rect(&bbox),
            None => self.cell.bbox().rotated_bbox(self.angle()),
        }
    }

    /// Box of the magnet in paper coordinates, rotation included.
    pub fn bbox(&self) -> Rect {
        self.node_bbox(self.magnet)
    }

    /// Box of the magnet as if the element was not rotated.
    pub fn unrotated_bbox(&self) -> Rect {
        let unrotate = Matrix::rotate_around(-self.angle(), self.center());
        match self.local_bbox(self.magnet) {
            Some(bbox) => unrotate
                .multiply(&self.node_matrix(self.magnet))
                .apply_rect(&bbox),
            None => self.cell.bbox(),
        }
    }

    /// Model box of the end: the port's center as an empty box when the end
    /// targets a port, else the element box (rotated with `rotate`).
    pub fn model_bbox(&self, rotate: bool) -> Rect {
        if let Some(center) = self.port_center(rotate) {
            return Rect::new(center.x(), center.y(), 0.0, 0.0);
        }
        let bbox = self.cell.bbox();
        if rotate {
            bbox.rotated_bbox(self.angle())
        } else {
            bbox
        }
    }

    /// Center of the end's port in paper coordinates.
    pub fn port_center(&self, rotate: bool) -> Option<Point> {
        let port = self.port?;
        let placements = self.cell.ports().layout(&self.cell.size_box());
        let placement = placements.get(port)?;
        let position = self.cell.position();
        let center = placement.position().offset(position.x(), position.y());
        if rotate {
            Some(center.rotate(self.center(), self.angle()))
        } else {
            Some(center)
        }
    }

    /// Outline of a node in its own user space.
    pub fn shape(&self, node: NodeId) -> Option<Shape> {
        self.cache.shape(self.scene, node)
    }

    /// Flattened subpaths of a `path` node, cached per precision.
    pub fn subpaths(&self, node: NodeId, precision: u32) -> Rc<Vec<Polyline>> {
        self.cache.subpaths(self.scene, node, precision)
    }

    /// The node's `stroke-width` attribute, 0 when unset.
    pub fn stroke_width(&self, node: NodeId) -> f64 {
        parse_length(self.scene.attribute(node, "stroke-width"))
    }

    /// The node that carries the outline of `node`: groups resolve to their
    /// first child, `title` nodes are skipped.
    pub fn shape_node(&self, node: NodeId) -> NodeId {
        let mut current = node;
        loop {
            match self.scene.tag(current) {
                Some("g") => {
                    let Some(first) = self.scene.children(current).first() else {
                        return current;
                    };
                    current = *first;
                }
                Some("title") => {
                    let Some(parent) = self.scene.parent(current) else {
                        return current;
                    };
                    let siblings = self.scene.children(parent);
                    let next = siblings
                        .iter()
                        .position(|sibling| *sibling == current)
                        .and_then(|index| siblings.get(index + 1));
                    match next {
                        Some(next) => current = *next,
                        None => return current,
                    }
                }
                _ => return current,
            }
        }
    }
}

// =============================================================================
// Strategy traits
// =============================================================================

/// Resolves where a link end attaches on an element.
pub trait Anchor: fmt::Debug {
    /// `reference` is the point the link comes from: the nearest vertex or
    /// the center of the other end.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::NoIntersection`] when no point can be found;
    /// the caller falls back to the element center.
    fn anchor(&self, magnet: &MagnetView<'_>, reference: Point, args: &Args<'_>) -> Result<Point, TesseraError>;
}

/// Resolves where a link end attaches on another link's path.
pub trait LinkAnchor: fmt::Debug {
    /// # Errors
    ///
    /// Returns [`TesseraError::NoIntersection`] for an empty path.
    fn anchor(&self, connection: &Path, reference: Point, args: &Args<'_>) -> Result<Point, TesseraError>;
}

/// Resolves where the drawn line meets the magnet.
pub trait ConnectionPoint: fmt::Debug {
    /// `line` runs from the reference point (first route point or the other
    /// anchor) to this end's anchor.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::NoIntersection`] when the line misses the
    /// shape; the caller falls back to `line.end()`.
    fn connection_point(
        &self,
        line: &Line,
        magnet: &MagnetView<'_>,
        args: &Args<'_>,
    ) -> Result<Point, TesseraError>;
}

/// One end of a route: its anchor and, for cell ends, the magnet box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEnd {
    anchor: Point,
    bbox: Option<Rect>,
}

impl RouteEnd {
    pub fn new(anchor: Point, bbox: Option<Rect>) -> Self {
        Self { anchor, bbox }
    }

    pub fn anchor(&self) -> Point {
        self.anchor
    }

    pub fn bbox(&self) -> Option<Rect> {
        self.bbox
    }
}

/// Computes the points a link passes through between its anchors.
pub trait Router: fmt::Debug {
    /// Returns the route without the anchors.
    ///
    /// # Errors
    ///
    /// Router specific; the link view reports them as paper errors.
    fn route(
        &self,
        vertices: &[Point],
        source: &RouteEnd,
        target: &RouteEnd,
        args: &Args<'_>,
    ) -> Result<Vec<Point>, TesseraError>;
}

/// Draws the path of a link.
pub trait Connector: fmt::Debug {
    /// # Errors
    ///
    /// Connector specific; the link view reports them as paper errors.
    fn connect(
        &self,
        source: Point,
        target: Point,
        route: &[Point],
        args: &Args<'_>,
    ) -> Result<Path, TesseraError>;
}

/// A reversible decoration applied to a node of a view.
pub trait Highlighter: fmt::Debug {
    /// Decorates `node`, a node of the view rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`TesseraError::InvalidAttribute`] for bad arguments and
    /// [`TesseraError::Scene`] for stale nodes.
    fn highlight(
        &self,
        scene: &mut Scene,
        root: NodeId,
        node: NodeId,
        args: &Args<'_>,
    ) -> Result<HighlightState, TesseraError>;

    /// Undoes what [`Highlighter::highlight`] did.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Scene`] when a recorded node is gone.
    fn unhighlight(&self, scene: &mut Scene, state: &HighlightState) -> Result<(), TesseraError> {
        state.restore(scene)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Named strategies of every kind.
pub struct StrategyRegistry {
    anchors: IndexMap<String, Box<dyn Anchor>>,
    link_anchors: IndexMap<String, Box<dyn LinkAnchor>>,
    connection_points: IndexMap<String, Box<dyn ConnectionPoint>>,
    routers: IndexMap<String, Box<dyn Router>>,
    connectors: IndexMap<String, Box<dyn Connector>>,
    highlighters: IndexMap<String, Box<dyn Highlighter>>,
}

impl fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("anchors", &self.anchors.keys().collect::<Vec<_>>())
            .field("link_anchors", &self.link_anchors.keys().collect::<Vec<_>>())
            .field(
                "connection_points",
                &self.connection_points.keys().collect::<Vec<_>>(),
            )
            .field("routers", &self.routers.keys().collect::<Vec<_>>())
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .field("highlighters", &self.highlighters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl StrategyRegistry {
    /// A registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            anchors: IndexMap::new(),
            link_anchors: IndexMap::new(),
            connection_points: IndexMap::new(),
            routers: IndexMap::new(),
            connectors: IndexMap::new(),
            highlighters: IndexMap::new(),
        }
    }

    /// The built-in strategies.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        for (name, anchor) in BBoxAnchor::all() {
            registry.register_anchor(name, anchor);
        }
        registry.register_anchor("midSide", MidSide);
        registry.register_anchor("perpendicular", Perpendicular);
        registry.register_anchor("modelCenter", ModelCenter);

        registry.register_link_anchor("connectionRatio", ConnectionRatio);
        registry.register_link_anchor("connectionLength", ConnectionLength);
        registry.register_link_anchor("connectionPerpendicular", ConnectionPerpendicular);
        registry.register_link_anchor("connectionClosest", ConnectionClosest);

        registry.register_connection_point("anchor", AnchorPoint);
        registry.register_connection_point("bbox", BBoxPoint);
        registry.register_connection_point("rectangle", RectanglePoint);
        registry.register_connection_point("boundary", Boundary);

        registry.register_router("normal", NormalRouter);
        registry.register_router("orthogonal", OrthogonalRouter);

        registry.register_connector("normal", NormalConnector);
        registry.register_connector("rounded", RoundedConnector);
        registry.register_connector("smooth", SmoothConnector);

        registry.register_highlighter("stroke", StrokeHighlighter);
        registry.register_highlighter("addClass", AddClass);
        registry.register_highlighter("opacity", Opacity);
        registry
    }

    pub fn register_anchor(&mut self, name: &str, anchor: impl Anchor + 'static) {
        self.anchors.insert(name.to_string(), Box::new(anchor));
    }

    pub fn register_link_anchor(&mut self, name: &str, anchor: impl LinkAnchor + 'static) {
        self.link_anchors.insert(name.to_string(), Box::new(anchor));
    }

    pub fn register_connection_point(&mut self, name: &str, point: impl ConnectionPoint + 'static) {
        self.connection_points
            .insert(name.to_string(), Box::new(point));
    }

    pub fn register_router(&mut self, name: &str, router: impl Router + 'static) {
        self.routers.insert(name.to_string(), Box::new(router));
    }

    pub fn register_connector(&mut self, name: &str, connector: impl Connector + 'static) {
        self.connectors.insert(name.to_string(), Box::new(connector));
    }

    pub fn register_highlighter(&mut self, name: &str, highlighter: impl Highlighter + 'static) {
        self.highlighters
            .insert(name.to_string(), Box::new(highlighter));
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownStrategy`] for an unregistered name.
    pub fn anchor(&self, name: &str) -> Result<&dyn Anchor, TesseraError> {
        lookup(&self.anchors, "anchor", name).map(|anchor| anchor.as_ref())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownStrategy`] for an unregistered name.
    pub fn link_anchor(&self, name: &str) -> Result<&dyn LinkAnchor, TesseraError> {
        lookup(&self.link_anchors, "link anchor", name).map(|anchor| anchor.as_ref())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownStrategy`] for an unregistered name.
    pub fn connection_point(&self, name: &str) -> Result<&dyn ConnectionPoint, TesseraError> {
        lookup(&self.connection_points, "connection point", name).map(|point| point.as_ref())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownStrategy`] for an unregistered name.
    pub fn router(&self, name: &str) -> Result<&dyn Router, TesseraError> {
        lookup(&self.routers, "router", name).map(|router| router.as_ref())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownStrategy`] for an unregistered name.
    pub fn connector(&self, name: &str) -> Result<&dyn Connector, TesseraError> {
        lookup(&self.connectors, "connector", name).map(|connector| connector.as_ref())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownStrategy`] for an unregistered name.
    pub fn highlighter(&self, name: &str) -> Result<&dyn Highlighter, TesseraError> {
        lookup(&self.highlighters, "highlighter", name).map(|highlighter| highlighter.as_ref())
    }
}

fn lookup<'r, T: ?Sized>(
    map: &'r IndexMap<String, Box<T>>,
    kind: &'static str,
    name: &str,
) -> Result<&'r Box<T>, TesseraError> {
    map.get(name).ok_or_else(|| TesseraError::UnknownStrategy {
        kind,
        name: name.to_string(),
    })
}

/// Moves `p` toward `reference` by `offset`, never past one unit short of
/// the reference.
pub(crate) fn offset_point(p: Point, reference: Point, offset: f64) -> Point {
    let length = p.distance(reference);
    if offset == 0.0 || length == 0.0 {
        return p;
    }
    let offset = offset.min(length - 1.0);
    p.move_along(reference, -offset)
}

/// Offset given as a number (along the line) or `{x, y}` (`y` shifts the
/// line sideways first).
pub(crate) fn offset_point_with(p: Point, reference: Point, offset: Option<&Value>) -> Point {
    match offset {
        Some(Value::Object(object)) => {
            let x = object.get("x").and_then(Value::as_f64).unwrap_or(0.0);
            let y = object.get("y").and_then(Value::as_f64).unwrap_or(0.0);
            let line = Line::new(reference, p).parallel(y);
            offset_point(line.end(), line.start(), x)
        }
        Some(value) => offset_point(p, reference, value.as_f64().unwrap_or(0.0)),
        None => p,
    }
}

#[cfg(test)]
mod tests {
    use float_cmp::assert_approx_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_strategy_ref_forms() {
        let short: StrategyRef = serde_json::from_value(json!("orthogonal")).unwrap();
        assert_eq!(short.name(), "orthogonal");
        assert!(short.args().is_null());
        assert_eq!(short.to_value(), json!("orthogonal"));

        let full = StrategyRef::from_value(&json!({ "name": "rounded", "args": { "radius": 4 } })).unwrap();
        assert_eq!(full.name(), "rounded");
        assert_eq!(full.args()["radius"], json!(4));
        assert_eq!(full.to_value(), json!({ "name": "rounded", "args": { "radius": 4 } }));

        assert!(StrategyRef::from_value(&json!(12)).is_err());
    }

    #[test]
    fn test_args_reads() {
        let value = json!({ "n": 3, "s": "2.5", "flag": 1, "text": "x", "none": null });
        let args = Args::new(&value);
        assert_approx_eq!(f64, args.number_or("n", 0.0), 3.0);
        assert_approx_eq!(f64, args.number_or("s", 0.0), 2.5);
        assert_approx_eq!(f64, args.number_or("none", 7.0), 7.0);
        assert!(args.flag("flag"));
        assert!(!args.flag("missing"));
        assert_eq!(args.string("text"), Some("x"));
    }

    #[test]
    fn test_unknown_strategy() {
        let registry = StrategyRegistry::standard();
        assert!(registry.router("orthogonal").is_ok());
        let err = registry.connector("zigzag").unwrap_err();
        assert!(matches!(err, TesseraError::UnknownStrategy { kind: "connector", .. }));
    }

    #[test]
    fn test_offset_point_stops_short_of_reference() {
        let p = Point::new(10.0, 0.0);
        let reference = Point::new(0.0, 0.0);
        assert_eq!(offset_point(p, reference, 4.0), Point::new(6.0, 0.0));
        assert_eq!(offset_point(p, reference, 50.0), Point::new(1.0, 0.0));
        assert_eq!(offset_point(p, reference, 0.0), p);
    }
}
