//! Link views: endpoint resolution, routing, the connection path and labels.
//!
//! # Pipeline
//!
//! A link update resolves, in order:
//!
//! 1. the anchor of each end (the end with `priority` first)
//! 2. the route through the vertices
//! 3. the connection point of each end, on the line from the nearest route
//!    point to the anchor
//! 4. the connector path through the connection points and the route
//!
//! Strategies that cannot compute a point fall back (the magnet center for
//! anchors, the anchor for connection points) and report a warning.

use indexmap::IndexMap;
use log::{debug, trace};
use serde_json::{Map, Value, json};

use tessera_core::{
    geometry::{DEFAULT_PRECISION, Line, Path, Point, Rect},
    identifier::Id,
    scene::{MarkupNode, NodeId, Scene},
};

use crate::{
    config::PaperConfig,
    error::TesseraError,
    model::{Cell, CellEnd, Endpoint, Graph, Label, LabelOffset, merge_into},
    strategy::{Args, MagnetView, RouteEnd, StrategyRef, StrategyRegistry},
    view::{
        CellView, UpdateFlags,
        attributes::{AttrContext, MarkerDefs},
        calc::format_number,
        cell_view::{LabelView, resolve_targets, selector_error},
    },
};

/// The resolved shape of a link.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkGeometry {
    source_anchor: Point,
    target_anchor: Point,
    source_point: Point,
    target_point: Point,
    route: Vec<Point>,
    path: Path,
}

impl LinkGeometry {
    pub fn source_anchor(&self) -> Point {
        self.source_anchor
    }

    pub fn target_anchor(&self) -> Point {
        self.target_anchor
    }

    /// Where the path starts.
    pub fn source_point(&self) -> Point {
        self.source_point
    }

    /// Where the path ends.
    pub fn target_point(&self) -> Point {
        self.target_point
    }

    /// Points the router produced between the two ends.
    pub fn route(&self) -> &[Point] {
        &self.route
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of a link resolution.
#[derive(Debug)]
pub(crate) enum Resolution {
    Ready {
        geometry: LinkGeometry,
        warnings: Vec<TesseraError>,
    },
    /// An end view is not rendered yet.
    Postponed(Id),
}

/// The rendered thing a link end attaches to.
enum EndTarget<'e> {
    Point(Point),
    Element {
        magnet: MagnetView<'e>,
        end: &'e CellEnd,
    },
    Link {
        connection: &'e Path,
        end: &'e CellEnd,
    },
}

impl EndTarget<'_> {
    /// The point the opposite end aims at before any anchor is known.
    fn reference(&self) -> Point {
        match self {
            Self::Point(p) => *p,
            Self::Element { magnet, .. } => magnet.bbox().center(),
            Self::Link { connection, .. } => connection
                .point_at_ratio(0.5, DEFAULT_PRECISION)
                .unwrap_or_default(),
        }
    }

    fn bbox(&self) -> Option<Rect> {
        match self {
            Self::Element { magnet, .. } => Some(magnet.bbox()),
            _ => None,
        }
    }

    fn priority(&self) -> bool {
        match self {
            Self::Element { end, .. } | Self::Link { end, .. } => end.priority(),
            Self::Point(_) => false,
        }
    }
}

/// Read-only inputs of a link resolution.
pub(crate) struct Resolver<'a> {
    scene: &'a Scene,
    views: &'a IndexMap<Id, CellView>,
    graph: &'a Graph,
    strategies: &'a StrategyRegistry,
    config: &'a PaperConfig,
    /// Node whose user space is the paper coordinate system.
    frame: NodeId,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        scene: &'a Scene,
        views: &'a IndexMap<Id, CellView>,
        graph: &'a Graph,
        strategies: &'a StrategyRegistry,
        config: &'a PaperConfig,
        frame: NodeId,
    ) -> Self {
        Self {
            scene,
            views,
            graph,
            strategies,
            config,
            frame,
        }
    }

    /// Resolves the geometry of `link`.
    ///
    /// # Errors
    ///
    /// Unknown strategies, missing selectors and strategy failures other
    /// than [`TesseraError::NoIntersection`].
    pub(crate) fn resolve(&self, link: &Cell) -> Result<Resolution, TesseraError> {
        let source = link.source();
        let target = link.target();
        let source_target = match self.end_target(&source)? {
            Ok(end) => end,
            Err(waiting) => return Ok(Resolution::Postponed(waiting)),
        };
        let target_target = match self.end_target(&target)? {
            Ok(end) => end,
            Err(waiting) => return Ok(Resolution::Postponed(waiting)),
        };

        let vertices = link.vertices();
        let mut warnings = Vec::new();

        // Anchors
        let first_reference = vertices.first().copied();
        let last_reference = vertices.last().copied();
        let (source_anchor, target_anchor) = if target_target.priority() && !source_target.priority() {
            let target_anchor = self.anchor(
                link,
                &target_target,
                last_reference.unwrap_or_else(|| source_target.reference()),
                &mut warnings,
            )?;
            let source_anchor = self.anchor(
                link,
                &source_target,
                first_reference.unwrap_or(target_anchor),
                &mut warnings,
            )?;
            (source_anchor, target_anchor)
        } else {
            let source_anchor = self.anchor(
                link,
                &source_target,
                first_reference.unwrap_or_else(|| target_target.reference()),
                &mut warnings,
            )?;
            let target_anchor = self.anchor(
                link,
                &target_target,
                last_reference.unwrap_or(source_anchor),
                &mut warnings,
            )?;
            (source_anchor, target_anchor)
        };

        // Route
        let router_ref = link
            .strategy("router")
            .unwrap_or_else(|| self.config.router().clone());
        let router = self.strategies.router(router_ref.name())?;
        let route = router.route(
            &vertices,
            &RouteEnd::new(source_anchor, source_target.bbox()),
            &RouteEnd::new(target_anchor, target_target.bbox()),
            &Args::new(router_ref.args()),
        )?;

        // Connection points
        let source_line = Line::new(route.first().copied().unwrap_or(target_anchor), source_anchor);
        let source_point = self.connection_point(link, &source_target, &source_line, &mut warnings)?;
        let target_line = Line::new(route.last().copied().unwrap_or(source_anchor), target_anchor);
        let target_point = self.connection_point(link, &target_target, &target_line, &mut warnings)?;

        // Connector
        let connector_ref = link
            .strategy("connector")
            .unwrap_or_else(|| self.config.connector().clone());
        let connector = self.strategies.connector(connector_ref.name())?;
        let path = connector.connect(source_point, target_point, &route, &Args::new(connector_ref.args()))?;

        trace!(
            link_id = link.id().to_string(),
            router = router_ref.name(),
            connector = connector_ref.name();
            "Link resolved"
        );
        Ok(Resolution::Ready {
            geometry: LinkGeometry {
                source_anchor,
                target_anchor,
                source_point,
                target_point,
                route,
                path,
            },
            warnings,
        })
    }

    /// The inner `Err` names the cell whose view is not ready.
    fn end_target<'e>(&'e self, end: &'e Endpoint) -> Result<Result<EndTarget<'e>, Id>, TesseraError> {
        let end = match end {
            Endpoint::Point(p) => return Ok(Ok(EndTarget::Point(*p))),
            Endpoint::Cell(end) => end,
        };
        let id = end.id();
        let (Some(cell), Some(view)) = (self.graph.cell(id), self.views.get(&id)) else {
            return Ok(Err(id));
        };
        if !view.is_rendered() {
            return Ok(Err(id));
        }
        if cell.is_link() {
            let Some(connection) = view.connection() else {
                return Ok(Err(id));
            };
            return Ok(Ok(EndTarget::Link { connection, end }));
        }

        let mut magnet_node = view.root();
        if let Some(port) = end.port() {
            if let Some(node) = view.port_node(port) {
                magnet_node = node;
            }
        } else if let Some(selector) = end.selector() {
            magnet_node = match selector {
                "root" => view.root(),
                _ => view
                    .selectors()
                    .get(selector)
                    .ok_or_else(|| TesseraError::InvalidSelector {
                        cell: id,
                        selector: selector.to_string(),
                        reason: "link end magnet does not match any node".to_string(),
                    })?,
            };
        }
        let magnet = MagnetView::new(self.scene, cell, view.root(), self.frame, view.selectors(), view.cache())
            .with_magnet(magnet_node)
            .with_port(end.port());
        Ok(Ok(EndTarget::Element { magnet, end }))
    }

    fn anchor(
        &self,
        link: &Cell,
        target: &EndTarget<'_>,
        reference: Point,
        warnings: &mut Vec<TesseraError>,
    ) -> Result<Point, TesseraError> {
        match target {
            EndTarget::Point(p) => Ok(*p),
            EndTarget::Element { magnet, end } => {
                let strategy = pick(end.anchor(), link.strategy("anchor"), self.config.anchor());
                let anchor = self.strategies.anchor(strategy.name())?;
                match anchor.anchor(magnet, reference, &Args::new(strategy.args())) {
                    Err(TesseraError::NoIntersection(reason)) => {
                        warnings.push(TesseraError::NoIntersection(reason));
                        Ok(magnet.bbox().center())
                    }
                    other => other,
                }
            }
            EndTarget::Link { connection, end } => {
                let strategy = pick(end.anchor(), link.strategy("linkAnchor"), self.config.link_anchor());
                let anchor = self.strategies.link_anchor(strategy.name())?;
                match anchor.anchor(connection, reference, &Args::new(strategy.args())) {
                    Err(TesseraError::NoIntersection(reason)) => {
                        warnings.push(TesseraError::NoIntersection(reason));
                        Ok(target.reference())
                    }
                    other => other,
                }
            }
        }
    }

    fn connection_point(
        &self,
        link: &Cell,
        target: &EndTarget<'_>,
        line: &Line,
        warnings: &mut Vec<TesseraError>,
    ) -> Result<Point, TesseraError> {
        let EndTarget::Element { magnet, end } = target else {
            return Ok(line.end());
        };
        let strategy = pick(
            end.connection_point(),
            link.strategy("connectionPoint"),
            self.config.connection_point(),
        );
        let connection_point = self.strategies.connection_point(strategy.name())?;
        match connection_point.connection_point(line, magnet, &Args::new(strategy.args())) {
            Err(TesseraError::NoIntersection(reason)) => {
                warnings.push(TesseraError::NoIntersection(reason));
                Ok(line.end())
            }
            other => other,
        }
    }
}

/// End setting, then link setting, then the paper default.
fn pick(end: Option<&StrategyRef>, link: Option<StrategyRef>, paper: &StrategyRef) -> StrategyRef {
    end.cloned().or(link).unwrap_or_else(|| paper.clone())
}

// =============================================================================
// Applying link geometry
// =============================================================================

fn default_label_markup() -> Value {
    json!([
        { "tagName": "rect", "selector": "rect" },
        { "tagName": "text", "selector": "text" }
    ])
}

fn default_label_attrs() -> Value {
    json!({
        "text": {
            "fill": "#000000",
            "fontSize": 14,
            "textAnchor": "middle",
            "textVerticalAnchor": "middle",
            "pointerEvents": "none"
        },
        "rect": {
            "fill": "#FFFFFF",
            "rx": 3,
            "ry": 3
        }
    })
}

impl CellView {
    /// Builds the link markup. Labels are rebuilt on the next apply.
    pub(crate) fn render_link(&mut self, scene: &mut Scene, cell: &Cell) -> Result<(), TesseraError> {
        self.render_markup(scene, cell)?;
        self.mark_rendered();
        Ok(())
    }

    /// Writes resolved geometry to the link's nodes.
    ///
    /// `labels_layer` is the layer label groups go to when they are not
    /// drawn inside the link.
    pub(crate) fn apply_link(
        &mut self,
        scene: &mut Scene,
        cell: &Cell,
        geometry: LinkGeometry,
        flags: UpdateFlags,
        markers: &mut MarkerDefs,
        labels_layer: Option<NodeId>,
    ) -> Result<(), TesseraError> {
        debug!(cell_id = cell.id().to_string(), flags:?; "Updating link view");
        self.cache.clear();
        let bbox = geometry.path.bbox().unwrap_or_default();
        if let Some(attrs) = cell.attrs() {
            let mut context = AttrContext::new(bbox)
                .with_connection(Some(&geometry.path))
                .with_markers(markers);
            self.apply_attrs(scene, cell, attrs, &mut context)?;
        }

        let labels = cell.labels();
        if flags.intersects(UpdateFlags::RENDER | UpdateFlags::LABELS) || labels.len() != self.labels.len() {
            self.render_labels(scene, cell, &labels, labels_layer)?;
        }
        position_labels(scene, &self.labels, &labels, &geometry.path)?;
        self.geometry = Some(geometry);
        Ok(())
    }

    fn render_labels(
        &mut self,
        scene: &mut Scene,
        cell: &Cell,
        labels: &[Label],
        labels_layer: Option<NodeId>,
    ) -> Result<(), TesseraError> {
        for label in self.labels.drain(..) {
            if scene.contains(label.node) {
                scene.remove(label.node)?;
            }
        }
        let parent = match labels_layer {
            Some(layer) => {
                let root = match self.labels_root {
                    Some(root) if scene.contains(root) => root,
                    _ => {
                        let root = scene.create_element("g");
                        scene.set_attribute(root, "model-id", cell.id().to_string())?;
                        scene.add_class(root, "tessera-link-labels")?;
                        self.labels_root = Some(root);
                        root
                    }
                };
                if scene.parent(root) != Some(layer) {
                    scene.append_child(layer, root)?;
                }
                root
            }
            None => self.root,
        };

        let default_markup = default_label_markup();
        for (index, label) in labels.iter().enumerate() {
            let markup = MarkupNode::from_value(label.markup().unwrap_or(&default_markup))?;
            let node = scene.create_element("g");
            let selectors = match scene.build_markup(node, &markup, &["root"]) {
                Ok(selectors) => selectors,
                Err(err) => {
                    scene.remove(node)?;
                    return Err(selector_error(cell.id(), err));
                }
            };
            scene.add_class(node, "label")?;
            scene.set_attribute(node, "label-idx", index.to_string())?;

            let mut attrs: Map<String, Value> = Map::new();
            if label.markup().is_none() {
                if let Value::Object(defaults) = default_label_attrs() {
                    attrs = defaults;
                }
            }
            merge_into(&mut attrs, label.attrs());
            let targets = resolve_targets(cell.id(), node, &selectors, &attrs)?;
            let mut context = AttrContext::new(Rect::default());
            for (nodes, values) in targets {
                for target in nodes {
                    crate::view::attributes::apply(scene, target, values, &mut context)?;
                }
            }
            fit_label_background(scene, &selectors, &attrs)?;
            scene.append_child(parent, node)?;
            self.labels.push(LabelView { node, selectors });
        }
        Ok(())
    }
}

/// Sizes the `rect` of a label to its `text` unless the rect is sized
/// explicitly.
fn fit_label_background(
    scene: &mut Scene,
    selectors: &tessera_core::scene::Selectors,
    attrs: &Map<String, Value>,
) -> Result<(), TesseraError> {
    let (Some(rect), Some(text)) = (selectors.get("rect"), selectors.get("text")) else {
        return Ok(());
    };
    let sized = attrs
        .get("rect")
        .and_then(Value::as_object)
        .is_some_and(|rect| rect.contains_key("width") || rect.contains_key("height"));
    if sized {
        return Ok(());
    }
    let Some(bbox) = scene.local_bbox(text) else {
        return Ok(());
    };
    scene.set_attribute(rect, "x", format_number(bbox.x()))?;
    scene.set_attribute(rect, "y", format_number(bbox.y()))?;
    scene.set_attribute(rect, "width", format_number(bbox.width()))?;
    scene.set_attribute(rect, "height", format_number(bbox.height()))?;
    Ok(())
}

fn position_labels(
    scene: &mut Scene,
    views: &[LabelView],
    labels: &[Label],
    path: &Path,
) -> Result<(), TesseraError> {
    let total = path.length(DEFAULT_PRECISION);
    for (view, label) in views.iter().zip(labels) {
        scene.set_attribute(view.node, "transform", label_transform(label, path, total))?;
    }
    Ok(())
}

/// `translate(x,y)` (and `rotate(a)`) placing a label along `path`.
pub(crate) fn label_transform(label: &Label, path: &Path, total: f64) -> String {
    let position = label.position();
    let length = position.length_along(total);
    let point = path
        .point_at_length(length, DEFAULT_PRECISION)
        .unwrap_or_default();
    let tangent = path.tangent_at_length(length, DEFAULT_PRECISION);

    let point = match position.offset() {
        LabelOffset::Normal(offset) => match tangent {
            Some(tangent) if offset != 0.0 => tangent.parallel(offset).start(),
            _ => point,
        },
        LabelOffset::Absolute(offset) => point.offset(offset.x(), offset.y()),
    };

    let mut angle = position.angle();
    if position.keep_gradient() {
        if let Some(tangent) = tangent {
            angle += tangent.angle();
        }
        if position.ensure_legibility() {
            let normalized = angle.rem_euclid(360.0);
            if normalized > 90.0 && normalized < 270.0 {
                angle += 180.0;
            }
        }
    }
    let angle = angle.rem_euclid(360.0);

    let translate = format!("translate({},{})", format_number(point.x()), format_number(point.y()));
    if angle.abs() < 1e-9 {
        translate
    } else {
        format!("{translate} rotate({})", format_number(angle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(position: Value) -> Label {
        Label::from_value(&json!({ "position": position })).unwrap()
    }

    #[test]
    fn test_label_transform_positions() {
        let path = Path::parse("M 0 0 L 100 0").unwrap();
        assert_eq!(label_transform(&label(json!(0.25)), &path, 100.0), "translate(25,0)");
        assert_eq!(label_transform(&label(json!(-10)), &path, 100.0), "translate(90,0)");
        assert_eq!(
            label_transform(&label(json!({ "distance": 0.5, "offset": 10 })), &path, 100.0),
            "translate(50,10)"
        );
        assert_eq!(
            label_transform(&label(json!({ "distance": 0.5, "offset": { "x": 5, "y": -5 } })), &path, 100.0),
            "translate(55,-5)"
        );
    }

    #[test]
    fn test_label_keeps_gradient_and_legibility() {
        let path = Path::parse("M 0 0 L 0 100").unwrap();
        let kept = label(json!({ "distance": 0.5, "args": { "keepGradient": true } }));
        assert_eq!(label_transform(&kept, &path, 100.0), "translate(0,50) rotate(90)");

        let reversed = Path::parse("M 100 0 L 0 0").unwrap();
        let legible = label(json!({
            "distance": 0.5,
            "args": { "keepGradient": true, "ensureLegibility": true }
        }));
        assert_eq!(label_transform(&legible, &reversed, 100.0), "translate(50,0)");
    }
}
