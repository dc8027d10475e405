//! Element views: markup, `attrs`, ports and the root transform.

use log::debug;
use serde_json::{Value, json};

use tessera_core::scene::{MarkupNode, Scene};

use crate::{
    error::TesseraError,
    model::Cell,
    view::{
        CellView, UpdateFlags,
        attributes::AttrContext,
        cell_view::{PortView, element_transform, resolve_targets, selector_error},
    },
};

const PORT_CLASS: &str = "tessera-port";

fn default_port_markup() -> Value {
    json!([{
        "tagName": "circle",
        "selector": "circle",
        "attributes": { "r": 10, "fill": "#FFFFFF", "stroke": "#000000" }
    }])
}

impl CellView {
    /// Performs the work `flags` asks for on an element view.
    ///
    /// Size changes re-apply `attrs` since `calc()` values depend on the
    /// size, and re-position the ports.
    pub(crate) fn update_element(
        &mut self,
        scene: &mut Scene,
        cell: &Cell,
        flags: UpdateFlags,
    ) -> Result<(), TesseraError> {
        debug!(cell_id = cell.id().to_string(), flags:?; "Updating element view");
        let render = flags.contains(UpdateFlags::RENDER);
        if render {
            self.render_markup(scene, cell)?;
            self.mark_rendered();
        }
        if flags.intersects(UpdateFlags::UPDATE | UpdateFlags::RESIZE | UpdateFlags::PORTS) {
            self.cache.clear();
        }
        if render || flags.intersects(UpdateFlags::UPDATE | UpdateFlags::RESIZE) {
            if let Some(attrs) = cell.attrs() {
                let mut context = AttrContext::new(cell.size_box());
                self.apply_attrs(scene, cell, attrs, &mut context)?;
            }
        }
        if render || flags.contains(UpdateFlags::PORTS) {
            self.render_ports(scene, cell)?;
        } else if flags.contains(UpdateFlags::RESIZE) {
            self.layout_ports(scene, cell)?;
        }
        if render || flags.intersects(UpdateFlags::TRANSLATE | UpdateFlags::ROTATE | UpdateFlags::RESIZE) {
            let transform = element_transform(cell.position(), cell.angle(), &cell.size_box());
            scene.set_attribute(self.root, "transform", transform)?;
        }
        Ok(())
    }

    /// Rebuilds every port group node.
    fn render_ports(&mut self, scene: &mut Scene, cell: &Cell) -> Result<(), TesseraError> {
        for port in self.ports.values() {
            if scene.contains(port.node) {
                scene.remove(port.node)?;
            }
        }
        self.ports.clear();

        let ports = cell.ports();
        let default_markup = default_port_markup();
        for port in ports.items() {
            let markup_value = port
                .markup()
                .or_else(|| port.group().and_then(|group| ports.group(group)).and_then(|group| group.markup()))
                .unwrap_or(&default_markup);
            let markup = MarkupNode::from_value(markup_value)?;
            let node = scene.create_element("g");
            let selectors = match scene.build_markup(node, &markup, &["root"]) {
                Ok(selectors) => selectors,
                Err(err) => {
                    scene.remove(node)?;
                    return Err(selector_error(cell.id(), err));
                }
            };
            scene.add_class(node, PORT_CLASS)?;
            scene.set_attribute(node, "port", port.id())?;
            if let Some(group) = port.group() {
                scene.set_attribute(node, "port-group", group)?;
            }

            let attrs = ports.merged_attrs(port);
            let targets = resolve_targets(cell.id(), node, &selectors, &attrs)?;
            let mut context = AttrContext::new(cell.size_box());
            for (nodes, values) in targets {
                for target in nodes {
                    crate::view::attributes::apply(scene, target, values, &mut context)?;
                }
            }
            scene.append_child(self.root, node)?;
            self.ports.insert(port.id().to_string(), PortView { node, selectors });
        }
        self.layout_ports(scene, cell)
    }

    /// Moves the port nodes to their layout positions.
    fn layout_ports(&mut self, scene: &mut Scene, cell: &Cell) -> Result<(), TesseraError> {
        let placements = cell.ports().layout(&cell.size_box());
        for (id, port) in &self.ports {
            if let Some(placement) = placements.get(id) {
                scene.set_attribute(port.node, "transform", placement.to_transform())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tessera_core::geometry::{Point, Size};

    use super::*;
    use crate::model::{CellRegistry, Element, Port};

    fn element() -> Cell {
        let mut cell = Element::new("standard.Rectangle")
            .with_id("e")
            .with_position(Point::new(10.0, 20.0))
            .with_size(Size::new(100.0, 40.0))
            .with_port_group("out", json!({ "position": "right" }))
            .with_port(Port::new("p1").with_group("out"))
            .with_port(Port::new("p2").with_group("out"))
            .build();
        CellRegistry::standard().apply_defaults(&mut cell).unwrap();
        cell
    }

    fn mounted(scene: &mut Scene, cell: &Cell) -> CellView {
        let mut view = CellView::new(scene, cell, 0).unwrap();
        let flags = view.take_flags();
        view.update_element(scene, cell, flags).unwrap();
        view
    }

    #[test]
    fn test_mount_renders_everything() {
        let mut scene = Scene::new();
        let cell = element();
        let view = mounted(&mut scene, &cell);
        assert_eq!(scene.attribute(view.root(), "transform"), Some("translate(10,20)"));
        let p1 = view.port_node("p1").unwrap();
        assert_eq!(scene.attribute(p1, "transform"), Some("translate(100,10)"));
        assert_eq!(scene.attribute(view.port_node("p2").unwrap(), "transform"), Some("translate(100,30)"));
        assert_eq!(scene.tag(scene.children(p1)[0]), Some("circle"));
    }

    #[test]
    fn test_translate_only_touches_transform() {
        let mut scene = Scene::new();
        let mut cell = element();
        let mut view = mounted(&mut scene, &cell);
        cell.set("position", json!({ "x": 50, "y": 60 }));
        let before = scene.mutation_count();
        view.update_element(&mut scene, &cell, UpdateFlags::TRANSLATE).unwrap();
        assert_eq!(scene.mutation_count(), before + 1);
        assert_eq!(scene.attribute(view.root(), "transform"), Some("translate(50,60)"));
    }

    #[test]
    fn test_resize_reapplies_calc_and_ports() {
        let mut scene = Scene::new();
        let mut cell = element();
        let mut view = mounted(&mut scene, &cell);
        cell.set("size", json!({ "width": 200, "height": 80 }));
        view.update_element(&mut scene, &cell, UpdateFlags::RESIZE).unwrap();
        let body = view.selectors().get("body").unwrap();
        assert_eq!(scene.attribute(body, "width"), Some("200"));
        assert_eq!(
            scene.attribute(view.port_node("p1").unwrap(), "transform"),
            Some("translate(200,20)")
        );
    }

    #[test]
    fn test_rotation_transform() {
        let mut scene = Scene::new();
        let mut cell = element();
        let mut view = mounted(&mut scene, &cell);
        cell.set("angle", json!(90));
        view.update_element(&mut scene, &cell, UpdateFlags::ROTATE).unwrap();
        assert_eq!(
            scene.attribute(view.root(), "transform"),
            Some("translate(10,20) rotate(90,50,20)")
        );
    }
}
