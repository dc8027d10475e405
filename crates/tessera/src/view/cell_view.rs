//! State shared by element and link views.

use indexmap::IndexMap;
use log::trace;
use serde_json::{Map, Value};

use tessera_core::{
    geometry::{Path, Point, Rect},
    identifier::Id,
    scene::{NodeId, Scene, SceneError, Selectors},
};

use crate::{
    error::TesseraError,
    model::{Cell, CellKind},
    strategy::{HighlightState, StrategyRef},
    view::{
        LinkGeometry, NodeCache, UpdateFlags,
        attributes::{self, AttrContext},
    },
};

/// Lifecycle of a view.
///
/// A view is created dirty, becomes clean once a flush covered all of its
/// flags, and turns dirty again on every change. Removal is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    Unmounted,
    Dirty,
    Clean,
}

#[derive(Debug)]
pub(crate) struct PortView {
    pub(crate) node: NodeId,
    pub(crate) selectors: Selectors,
}

#[derive(Debug)]
pub(crate) struct LabelView {
    pub(crate) node: NodeId,
    pub(crate) selectors: Selectors,
}

#[derive(Debug)]
pub(crate) struct HighlightEntry {
    pub(crate) highlighter: StrategyRef,
    pub(crate) selector: Option<String>,
    pub(crate) state: HighlightState,
}

/// The rendered form of one cell.
#[derive(Debug)]
pub struct CellView {
    id: Id,
    kind: CellKind,
    pub(crate) root: NodeId,
    pub(crate) selectors: Selectors,
    pub(crate) cache: NodeCache,
    flags: UpdateFlags,
    state: ViewState,
    rendered: bool,
    z: i64,
    order: usize,
    pub(crate) ports: IndexMap<String, PortView>,
    pub(crate) labels: Vec<LabelView>,
    pub(crate) labels_root: Option<NodeId>,
    pub(crate) geometry: Option<LinkGeometry>,
    pub(crate) highlights: IndexMap<String, HighlightEntry>,
}

impl CellView {
    /// Creates the (empty) root group of a view. `order` breaks paint-order
    /// ties between cells with the same `z`.
    pub(crate) fn new(scene: &mut Scene, cell: &Cell, order: usize) -> Result<Self, TesseraError> {
        let root = scene.create_element("g");
        scene.set_attribute(root, "model-id", cell.id().to_string())?;
        scene.set_attribute(root, "data-type", cell.cell_type())?;
        scene.add_class(root, "tessera-cell")?;
        scene.add_class(root, &format!("tessera-{}", cell.kind()))?;
        Ok(Self {
            id: cell.id(),
            kind: cell.kind(),
            root,
            selectors: Selectors::new(),
            cache: NodeCache::new(),
            flags: UpdateFlags::mount(cell.kind()),
            state: ViewState::Dirty,
            rendered: false,
            z: cell.z(),
            order,
            ports: IndexMap::new(),
            labels: Vec::new(),
            labels_root: None,
            geometry: None,
            highlights: IndexMap::new(),
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn selectors(&self) -> &Selectors {
        &self.selectors
    }

    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Whether the markup has been built at least once and no rebuild is
    /// pending.
    pub fn is_rendered(&self) -> bool {
        self.rendered && !self.flags.contains(UpdateFlags::RENDER)
    }

    pub fn z(&self) -> i64 {
        self.z
    }

    pub(crate) fn order(&self) -> usize {
        self.order
    }

    pub(crate) fn set_z(&mut self, z: i64) {
        self.z = z;
    }

    /// The group node of a rendered port.
    pub fn port_node(&self, port: &str) -> Option<NodeId> {
        self.ports.get(port).map(|view| view.node)
    }

    /// Group nodes of the rendered labels, in label order.
    pub fn label_nodes(&self) -> Vec<NodeId> {
        self.labels.iter().map(|label| label.node).collect()
    }

    /// Resolved geometry of a link view.
    pub fn geometry(&self) -> Option<&LinkGeometry> {
        self.geometry.as_ref()
    }

    /// Resolved path of a link view.
    pub fn connection(&self) -> Option<&Path> {
        self.geometry.as_ref().map(LinkGeometry::path)
    }

    pub fn highlight_keys(&self) -> impl Iterator<Item = &str> {
        self.highlights.keys().map(String::as_str)
    }

    /// Adds pending work.
    pub(crate) fn request(&mut self, flags: UpdateFlags) {
        if flags.is_empty() || self.state == ViewState::Unmounted {
            return;
        }
        self.flags.insert(flags);
        self.state = ViewState::Dirty;
    }

    /// Takes the pending flags for an update pass.
    pub(crate) fn take_flags(&mut self) -> UpdateFlags {
        let flags = self.flags;
        self.flags = UpdateFlags::NONE;
        self.state = ViewState::Clean;
        flags
    }

    pub(crate) fn mark_rendered(&mut self) {
        self.rendered = true;
    }

    /// Removes the view's nodes. The view must be dropped afterwards.
    pub(crate) fn unmount(&mut self, scene: &mut Scene) -> Result<(), TesseraError> {
        for entry in self.highlights.values() {
            entry.state.restore(scene)?;
        }
        self.highlights.clear();
        if let Some(labels_root) = self.labels_root.take() {
            remove_if_present(scene, labels_root)?;
        }
        remove_if_present(scene, self.root)?;
        self.labels.clear();
        self.ports.clear();
        self.cache.clear();
        self.flags = UpdateFlags::NONE;
        self.state = ViewState::Unmounted;
        trace!(cell_id = self.id.to_string(); "View unmounted");
        Ok(())
    }

    /// Rebuilds the markup under the root. The previous subtree is dropped.
    pub(crate) fn render_markup(&mut self, scene: &mut Scene, cell: &Cell) -> Result<(), TesseraError> {
        // Validate before touching the scene so a bad descriptor keeps the
        // previous rendering
        let markup = cell.markup()?.unwrap_or_default();
        let staging = scene.create_element("g");
        let selectors = match scene.build_markup(staging, &markup, &["root"]) {
            Ok(selectors) => selectors,
            Err(err) => {
                scene.remove(staging)?;
                return Err(selector_error(cell.id(), err));
            }
        };
        scene.clear_children(self.root)?;
        let children = scene.children(staging).to_vec();
        for child in children {
            scene.append_child(self.root, child)?;
        }
        scene.remove(staging)?;
        self.selectors = selectors;
        self.ports.clear();
        self.labels.clear();
        if let Some(labels_root) = self.labels_root {
            scene.clear_children(labels_root)?;
        }
        self.cache.clear();
        trace!(cell_id = self.id.to_string(), nodes = scene.descendants(self.root).len(); "Markup rendered");
        Ok(())
    }

    /// Applies a `{selector: {attribute: value}}` object to the nodes of
    /// this view. Every selector is resolved before anything is written.
    pub(crate) fn apply_attrs(
        &self,
        scene: &mut Scene,
        cell: &Cell,
        attrs: &Map<String, Value>,
        context: &mut AttrContext<'_>,
    ) -> Result<(), TesseraError> {
        let targets = resolve_targets(cell.id(), self.root, &self.selectors, attrs)?;
        for (nodes, values) in targets {
            for node in nodes {
                attributes::apply(scene, node, values, context)?;
            }
        }
        Ok(())
    }
}

/// Matches each selector of `attrs` to its nodes.
pub(crate) fn resolve_targets<'v>(
    cell: Id,
    root: NodeId,
    selectors: &Selectors,
    attrs: &'v Map<String, Value>,
) -> Result<Vec<(Vec<NodeId>, &'v Map<String, Value>)>, TesseraError> {
    let mut targets = Vec::with_capacity(attrs.len());
    for (selector, value) in attrs {
        let Value::Object(values) = value else {
            if value.is_null() {
                continue;
            }
            return Err(TesseraError::invalid_attribute(
                format!("attrs/{selector}"),
                format!("expected an object, found {value}"),
            ));
        };
        let nodes = if selector == "root" {
            vec![root]
        } else {
            selectors.find(selector)
        };
        if nodes.is_empty() {
            return Err(TesseraError::InvalidSelector {
                cell,
                selector: selector.clone(),
                reason: "does not match any node".to_string(),
            });
        }
        targets.push((nodes, values));
    }
    Ok(targets)
}

pub(crate) fn selector_error(cell: Id, err: SceneError) -> TesseraError {
    match err {
        SceneError::DuplicateSelector(selector) => TesseraError::InvalidSelector {
            cell,
            selector,
            reason: "is defined more than once".to_string(),
        },
        other => TesseraError::Scene(other),
    }
}

pub(crate) fn remove_if_present(scene: &mut Scene, node: NodeId) -> Result<(), TesseraError> {
    if scene.contains(node) {
        scene.remove(node)?;
    }
    Ok(())
}

/// `translate(x,y)` followed by `rotate(angle,cx,cy)` when rotated.
pub(crate) fn element_transform(position: Point, angle: f64, size_box: &Rect) -> String {
    use crate::view::calc::format_number as num;
    let translate = format!("translate({},{})", num(position.x()), num(position.y()));
    if angle == 0.0 {
        return translate;
    }
    let center = size_box.center();
    format!(
        "{translate} rotate({},{},{})",
        num(angle),
        num(center.x()),
        num(center.y())
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use tessera_core::geometry::Size;

    use super::*;
    use crate::model::{CellRegistry, Element};

    fn rectangle() -> Cell {
        let mut cell = Element::new("standard.Rectangle")
            .with_id("r")
            .with_position(Point::new(10.0, 20.0))
            .with_size(Size::new(100.0, 40.0))
            .build();
        CellRegistry::standard().apply_defaults(&mut cell).unwrap();
        cell
    }

    #[test]
    fn test_lifecycle() {
        let mut scene = Scene::new();
        let cell = rectangle();
        let mut view = CellView::new(&mut scene, &cell, 0).unwrap();
        assert_eq!(view.state(), ViewState::Dirty);
        assert!(view.flags().contains(UpdateFlags::RENDER));
        assert!(!view.is_rendered());

        view.take_flags();
        view.mark_rendered();
        assert_eq!(view.state(), ViewState::Clean);
        assert!(view.is_rendered());

        view.request(UpdateFlags::TRANSLATE);
        assert_eq!(view.state(), ViewState::Dirty);

        view.unmount(&mut scene).unwrap();
        assert_eq!(view.state(), ViewState::Unmounted);
        view.request(UpdateFlags::UPDATE);
        assert!(view.flags().is_empty());
        assert!(!scene.contains(view.root()));
    }

    #[test]
    fn test_render_markup_and_attrs() {
        let mut scene = Scene::new();
        let cell = rectangle();
        let mut view = CellView::new(&mut scene, &cell, 0).unwrap();
        view.render_markup(&mut scene, &cell).unwrap();
        let body = view.selectors().get("body").unwrap();
        assert_eq!(scene.tag(body), Some("rect"));

        let mut context = AttrContext::new(cell.size_box());
        view.apply_attrs(&mut scene, &cell, cell.attrs().unwrap(), &mut context)
            .unwrap();
        assert_eq!(scene.attribute(body, "width"), Some("100"));
        assert_eq!(scene.attribute(view.root(), "cursor"), Some("move"));
    }

    #[test]
    fn test_unknown_selector_writes_nothing() {
        let mut scene = Scene::new();
        let cell = rectangle();
        let mut view = CellView::new(&mut scene, &cell, 0).unwrap();
        view.render_markup(&mut scene, &cell).unwrap();
        let before = scene.mutation_count();
        let attrs = json!({ "body": { "fill": "red" }, "missing": { "fill": "blue" } });
        let mut context = AttrContext::new(cell.size_box());
        let err = view
            .apply_attrs(&mut scene, &cell, attrs.as_object().unwrap(), &mut context)
            .unwrap_err();
        assert!(matches!(err, TesseraError::InvalidSelector { ref selector, .. } if selector == "missing"));
        assert_eq!(scene.mutation_count(), before);
    }

    #[test]
    fn test_duplicate_selector_keeps_previous_rendering() {
        let mut scene = Scene::new();
        let mut cell = rectangle();
        let mut view = CellView::new(&mut scene, &cell, 0).unwrap();
        view.render_markup(&mut scene, &cell).unwrap();
        cell.set(
            "markup",
            json!([
                { "tagName": "rect", "selector": "body" },
                { "tagName": "circle", "selector": "body" }
            ]),
        );
        let err = view.render_markup(&mut scene, &cell).unwrap_err();
        assert!(matches!(err, TesseraError::InvalidSelector { .. }));
        assert!(view.selectors().contains("label"));
        assert_eq!(scene.children(view.root()).len(), 2);
    }

    #[test]
    fn test_element_transform() {
        let size = Rect::new(0.0, 0.0, 100.0, 40.0);
        assert_eq!(element_transform(Point::new(10.0, 20.0), 0.0, &size), "translate(10,20)");
        assert_eq!(
            element_transform(Point::new(10.0, 20.0), 45.0, &size),
            "translate(10,20) rotate(45,50,20)"
        );
    }
}
