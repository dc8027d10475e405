//! Cell tools: decorations drawn in the tools layer over a view.
//!
//! Tools follow their cell; the paper redraws them after every update of
//! the view they belong to.

use log::debug;

use tessera_core::{
    geometry::Rect,
    identifier::Id,
    scene::{NodeId, Scene},
};

use crate::{
    error::TesseraError,
    model::Cell,
    paper::Paper,
    strategy::{Args, StrategyRef},
    view::{CellView, UpdateFlags, calc::format_number},
};

const TOOL_STROKE: &str = "#33334F";

/// A tool attached to a cell view.
#[derive(Debug, Clone, PartialEq)]
pub enum Tool {
    /// A dashed box around the cell, grown by `padding`.
    Boundary { padding: f64 },
    /// A handle on each link vertex.
    Vertices { radius: f64 },
}

impl Tool {
    /// Reads `boundary` (`padding`, default 10) or `vertices` (`radius`,
    /// default 6).
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownStrategy`] for other names.
    pub fn from_ref(tool: &StrategyRef) -> Result<Self, TesseraError> {
        let args = Args::new(tool.args());
        match tool.name() {
            "boundary" => Ok(Self::Boundary {
                padding: args.number_or("padding", 10.0),
            }),
            "vertices" => Ok(Self::Vertices {
                radius: args.number_or("radius", 6.0),
            }),
            other => Err(TesseraError::UnknownStrategy {
                kind: "tool",
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Boundary { .. } => "boundary",
            Self::Vertices { .. } => "vertices",
        }
    }
}

/// The tools of one view and their group in the tools layer.
#[derive(Debug)]
pub(crate) struct ToolsView {
    node: NodeId,
    tools: Vec<Tool>,
}

impl ToolsView {
    pub(crate) fn new(scene: &mut Scene, layer: NodeId, id: Id, tools: Vec<Tool>) -> Result<Self, TesseraError> {
        let node = scene.create_element("g");
        scene.add_class(node, "tessera-tools")?;
        scene.set_attribute(node, "model-id", id.to_string())?;
        scene.append_child(layer, node)?;
        Ok(Self { node, tools })
    }

    pub(crate) fn node(&self) -> NodeId {
        self.node
    }

    pub(crate) fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Redraws every tool from the view's current state.
    pub(crate) fn render(&self, scene: &mut Scene, cell: &Cell, view: &CellView) -> Result<(), TesseraError> {
        scene.clear_children(self.node)?;
        for tool in &self.tools {
            let group = scene.create_element("g");
            scene.add_class(group, &format!("tessera-tool-{}", tool.name()))?;
            scene.append_child(self.node, group)?;
            match tool {
                Tool::Boundary { padding } => {
                    let (bbox, transform) = boundary_box(cell, view);
                    let bbox = bbox.inflate(*padding, *padding);
                    let rect = scene.create_element("rect");
                    scene.set_attribute(rect, "x", format_number(bbox.x()))?;
                    scene.set_attribute(rect, "y", format_number(bbox.y()))?;
                    scene.set_attribute(rect, "width", format_number(bbox.width()))?;
                    scene.set_attribute(rect, "height", format_number(bbox.height()))?;
                    scene.set_attribute(rect, "fill", "none")?;
                    scene.set_attribute(rect, "stroke", TOOL_STROKE)?;
                    scene.set_attribute(rect, "stroke-dasharray", "5,5")?;
                    scene.set_attribute(rect, "pointer-events", "none")?;
                    if let Some(transform) = transform {
                        scene.set_attribute(rect, "transform", transform)?;
                    }
                    scene.append_child(group, rect)?;
                }
                Tool::Vertices { radius } => {
                    for (index, vertex) in cell.vertices().iter().enumerate() {
                        let handle = scene.create_element("circle");
                        scene.set_attribute(handle, "idx", index.to_string())?;
                        scene.set_attribute(handle, "cx", format_number(vertex.x()))?;
                        scene.set_attribute(handle, "cy", format_number(vertex.y()))?;
                        scene.set_attribute(handle, "r", format_number(*radius))?;
                        scene.set_attribute(handle, "fill", "#FFFFFF")?;
                        scene.set_attribute(handle, "stroke", TOOL_STROKE)?;
                        scene.append_child(group, handle)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Box to outline and the rotation to draw it with.
fn boundary_box(cell: &Cell, view: &CellView) -> (Rect, Option<String>) {
    if cell.is_element() {
        let bbox = cell.bbox();
        let angle = cell.angle();
        let transform = (angle != 0.0).then(|| {
            let center = bbox.center();
            format!(
                "rotate({},{},{})",
                format_number(angle),
                format_number(center.x()),
                format_number(center.y())
            )
        });
        return (bbox, transform);
    }
    let bbox = view
        .connection()
        .and_then(|path| path.bbox())
        .unwrap_or_else(|| cell.bbox());
    (bbox, None)
}

impl Paper {
    /// Attaches tools to a cell's view, replacing its previous tools. They
    /// are drawn on the next flush.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] when the cell has no view and
    /// [`TesseraError::UnknownStrategy`] for unknown tool names.
    pub fn add_tools(&mut self, id: impl Into<Id>, tools: &[StrategyRef]) -> Result<(), TesseraError> {
        let id = id.into();
        if !self.views.contains_key(&id) {
            return Err(TesseraError::UnknownCell(id));
        }
        let tools = tools.iter().map(Tool::from_ref).collect::<Result<Vec<_>, _>>()?;
        self.remove_tools(id)?;
        debug!(cell_id = id.to_string(), count = tools.len(); "Adding tools");
        let view = ToolsView::new(&mut self.scene, self.layers.tools(), id, tools)?;
        self.tools.insert(id, view);
        // Drawn by the next flush, which has the cell at hand
        if let Some(view) = self.views.get_mut(&id) {
            view.request(UpdateFlags::TOOLS);
        }
        Ok(())
    }

    /// Draws the tools of `id` for the given cell state.
    pub(crate) fn render_tools(&mut self, cell: &Cell) -> Result<(), TesseraError> {
        let id = cell.id();
        let (Some(tools), Some(view)) = (self.tools.get(&id), self.views.get(&id)) else {
            return Ok(());
        };
        tools.render(&mut self.scene, cell, view)
    }

    /// Removes the tools of a view. Returns whether it had any.
    ///
    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn remove_tools(&mut self, id: impl Into<Id>) -> Result<bool, TesseraError> {
        let Some(tools) = self.tools.shift_remove(&id.into()) else {
            return Ok(false);
        };
        if self.scene.contains(tools.node()) {
            self.scene.remove(tools.node())?;
        }
        Ok(true)
    }

    pub fn has_tools(&self, id: impl Into<Id>) -> bool {
        self.tools.contains_key(&id.into())
    }

    /// Names of the tools attached to a view.
    pub fn tool_names(&self, id: impl Into<Id>) -> Vec<&'static str> {
        self.tools
            .get(&id.into())
            .map(|view| view.tools().iter().map(Tool::name).collect())
            .unwrap_or_default()
    }

    /// Hides the whole tools layer.
    ///
    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn hide_tools(&mut self) -> Result<(), TesseraError> {
        self.scene.set_attribute(self.layers.tools(), "display", "none")?;
        Ok(())
    }

    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn show_tools(&mut self) -> Result<(), TesseraError> {
        self.scene.remove_attribute(self.layers.tools(), "display")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_tool_from_ref() {
        let boundary = StrategyRef::new("boundary").with_args(json!({ "padding": 4 }));
        assert_eq!(Tool::from_ref(&boundary).unwrap(), Tool::Boundary { padding: 4.0 });
        assert_eq!(
            Tool::from_ref(&StrategyRef::new("vertices")).unwrap(),
            Tool::Vertices { radius: 6.0 }
        );
        let err = Tool::from_ref(&StrategyRef::new("eraser")).unwrap_err();
        assert!(matches!(err, TesseraError::UnknownStrategy { kind: "tool", .. }));
    }
}
