//! The fixed node structure of a paper.
//!
//! ```text
//! svg
//! ├── defs
//! ├── rect.tessera-background   (when a background color is configured)
//! └── g.tessera-viewport        (viewport transform)
//!     ├── g[data-layer=back]
//!     ├── g[data-layer=cells]
//!     ├── g[data-layer=labels]
//!     ├── g[data-layer=front]
//!     └── g[data-layer=tools]
//! ```

use tessera_core::{
    color::Color,
    scene::{NodeId, Scene},
};

use crate::{error::TesseraError, view::calc::format_number};

/// Layer names in paint order.
pub const LAYER_NAMES: [&str; 5] = ["back", "cells", "labels", "front", "tools"];

/// Node handles of the paper structure.
#[derive(Debug, Clone, Copy)]
pub struct Layers {
    defs: NodeId,
    viewport: NodeId,
    back: NodeId,
    cells: NodeId,
    labels: NodeId,
    front: NodeId,
    tools: NodeId,
}

impl Layers {
    pub(crate) fn build(
        scene: &mut Scene,
        width: f64,
        height: f64,
        background: Option<&Color>,
    ) -> Result<Self, TesseraError> {
        let root = scene.root();
        scene.set_attribute(root, "width", format_number(width))?;
        scene.set_attribute(root, "height", format_number(height))?;

        let defs = scene.create_element("defs");
        scene.append_child(root, defs)?;

        if let Some(color) = background {
            let rect = scene.create_element("rect");
            scene.add_class(rect, "tessera-background")?;
            scene.set_attribute(rect, "width", "100%")?;
            scene.set_attribute(rect, "height", "100%")?;
            scene.set_attribute(rect, "fill", color.to_string())?;
            scene.append_child(root, rect)?;
        }

        let viewport = scene.create_element("g");
        scene.add_class(viewport, "tessera-viewport")?;
        scene.append_child(root, viewport)?;

        let mut layers = [viewport; 5];
        for (slot, name) in layers.iter_mut().zip(LAYER_NAMES) {
            let layer = scene.create_element("g");
            scene.set_attribute(layer, "data-layer", name)?;
            scene.append_child(viewport, layer)?;
            *slot = layer;
        }
        let [back, cells, labels, front, tools] = layers;
        Ok(Self {
            defs,
            viewport,
            back,
            cells,
            labels,
            front,
            tools,
        })
    }

    pub fn defs(&self) -> NodeId {
        self.defs
    }

    /// The group carrying the viewport transform. Its user space is the
    /// paper's local coordinate system.
    pub fn viewport(&self) -> NodeId {
        self.viewport
    }

    pub fn back(&self) -> NodeId {
        self.back
    }

    pub fn cells(&self) -> NodeId {
        self.cells
    }

    pub fn labels(&self) -> NodeId {
        self.labels
    }

    pub fn front(&self) -> NodeId {
        self.front
    }

    pub fn tools(&self) -> NodeId {
        self.tools
    }

    /// A layer by name.
    pub fn get(&self, name: &str) -> Option<NodeId> {
        match name {
            "back" => Some(self.back),
            "cells" => Some(self.cells),
            "labels" => Some(self.labels),
            "front" => Some(self.front),
            "tools" => Some(self.tools),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layers_in_paint_order() {
        let mut scene = Scene::new();
        let layers = Layers::build(&mut scene, 800.0, 600.0, None).unwrap();
        let names: Vec<&str> = scene
            .children(layers.viewport())
            .iter()
            .filter_map(|layer| scene.attribute(*layer, "data-layer"))
            .collect();
        assert_eq!(names, LAYER_NAMES.to_vec());
        assert_eq!(layers.get("cells"), Some(layers.cells()));
        assert_eq!(layers.get("nope"), None);
        assert_eq!(scene.attribute(scene.root(), "width"), Some("800"));
    }
}
