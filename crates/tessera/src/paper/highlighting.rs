//! Highlights keyed per view.
//!
//! A highlight is remembered with the highlighter and selector that made
//! it, so it survives the view re-rendering its markup.

use log::debug;

use tessera_core::{identifier::Id, scene::NodeId};

use crate::{
    error::TesseraError,
    paper::Paper,
    strategy::{Args, StrategyRef},
    view::{CellView, HighlightEntry},
};

/// The node a highlight decorates.
fn target_node(view: &CellView, selector: Option<&str>) -> Result<NodeId, TesseraError> {
    match selector {
        None | Some("root") => Ok(view.root()),
        Some(selector) => view
            .port_node(selector)
            .or_else(|| view.selectors().get(selector))
            .ok_or_else(|| TesseraError::InvalidSelector {
                cell: view.id(),
                selector: selector.to_string(),
                reason: "does not match any node".to_string(),
            }),
    }
}

impl Paper {
    /// Highlights the node `selector` (or a port id, or the root) of the
    /// view of `id` under `key`. An existing highlight with the same key
    /// is removed first.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] without a view,
    /// [`TesseraError::UnknownStrategy`] for an unknown highlighter and
    /// [`TesseraError::InvalidSelector`] when nothing matches.
    pub fn highlight(
        &mut self,
        id: impl Into<Id>,
        selector: Option<&str>,
        highlighter: &StrategyRef,
        key: &str,
    ) -> Result<(), TesseraError> {
        let id = id.into();
        let strategy = self.strategies.highlighter(highlighter.name())?;
        let view = self.views.get_mut(&id).ok_or(TesseraError::UnknownCell(id))?;
        let node = target_node(view, selector)?;
        if let Some(previous) = view.highlights.shift_remove(key) {
            previous.state.restore(&mut self.scene)?;
        }
        let state = strategy.highlight(&mut self.scene, view.root(), node, &Args::new(highlighter.args()))?;
        debug!(cell_id = id.to_string(), key, highlighter = highlighter.name(); "Highlighted");
        view.highlights.insert(
            key.to_string(),
            HighlightEntry {
                highlighter: highlighter.clone(),
                selector: selector.map(str::to_string),
                state,
            },
        );
        Ok(())
    }

    /// Removes the highlight `key` from the view of `id`. Returns whether
    /// there was one.
    ///
    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn unhighlight(&mut self, id: impl Into<Id>, key: &str) -> Result<bool, TesseraError> {
        let id = id.into();
        let Some(entry) = self
            .views
            .get_mut(&id)
            .and_then(|view| view.highlights.shift_remove(key))
        else {
            return Ok(false);
        };
        match self.strategies.highlighter(entry.highlighter.name()) {
            Ok(strategy) => strategy.unhighlight(&mut self.scene, &entry.state)?,
            Err(_) => entry.state.restore(&mut self.scene)?,
        }
        debug!(cell_id = id.to_string(), key; "Unhighlighted");
        Ok(true)
    }

    pub fn is_highlighted(&self, id: impl Into<Id>, key: &str) -> bool {
        self.views
            .get(&id.into())
            .is_some_and(|view| view.highlights.contains_key(key))
    }

    /// Draws the highlights of `id` again after its markup changed.
    /// Highlights whose node is gone are dropped.
    pub(crate) fn reapply_highlights(&mut self, id: Id) -> Result<(), TesseraError> {
        let Some(view) = self.views.get_mut(&id) else {
            return Ok(());
        };
        if view.highlights.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut view.highlights);
        for (key, entry) in entries {
            entry.state.restore(&mut self.scene)?;
            if let Err(error) = self.highlight(id, entry.selector.as_deref(), &entry.highlighter, &key) {
                debug!(cell_id = id.to_string(), key = key.as_str(), error:%; "Highlight dropped");
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
    use crate::{
        config::PaperConfig,
        model::{CellRegistry, Element, Graph, Options},
    };

    fn diagram() -> (Graph, Paper) {
        let mut graph = Graph::new(CellRegistry::standard());
        let cell = Element::new("standard.Rectangle")
            .with_id("a")
            .with_position(Point::new(10.0, 10.0))
            .with_size(Size::new(100.0, 50.0))
            .build();
        graph.add_cell(cell).unwrap();
        let paper = Paper::new(&mut graph, PaperConfig::default()).unwrap();
        (graph, paper)
    }

    #[test]
    fn test_highlight_and_unhighlight_restore_scene() {
        let (_graph, mut paper) = diagram();
        let before = paper.to_svg();
        let class = StrategyRef::new("addClass").with_args(json!({ "className": "selected" }));
        paper.highlight("a", Some("body"), &class, "selection").unwrap();
        let body = paper.view("a").unwrap().selectors().get("body").unwrap();
        assert!(paper.scene().has_class(body, "selected"));
        assert!(paper.is_highlighted("a", "selection"));

        assert!(paper.unhighlight("a", "selection").unwrap());
        assert!(!paper.unhighlight("a", "selection").unwrap());
        assert_eq!(paper.to_svg(), before);
    }

    #[test]
    fn test_same_key_replaces_highlight() {
        let (_graph, mut paper) = diagram();
        let stroke = StrategyRef::new("stroke");
        paper.highlight("a", None, &stroke, "hover").unwrap();
        paper.highlight("a", None, &stroke, "hover").unwrap();
        let root = paper.view("a").unwrap().root();
        let outlines = paper
            .scene()
            .children(root)
            .iter()
            .filter(|node| paper.scene().has_class(**node, "tessera-highlight-stroke"))
            .count();
        assert_eq!(outlines, 1);
    }

    #[test]
    fn test_highlight_survives_render() {
        let (mut graph, mut paper) = diagram();
        let class = StrategyRef::new("addClass");
        paper.highlight("a", Some("body"), &class, "selection").unwrap();
        graph
            .set_attribute(
                "a",
                "markup",
                json!([
                    { "tagName": "rect", "selector": "body" },
                    { "tagName": "text", "selector": "label" }
                ]),
                Options::new(),
            )
            .unwrap();
        paper.flush(&graph);
        let body = paper.view("a").unwrap().selectors().get("body").unwrap();
        assert!(paper.scene().has_class(body, "tessera-highlighted"));
    }

    #[test]
    fn test_highlight_errors() {
        let (_graph, mut paper) = diagram();
        let stroke = StrategyRef::new("stroke");
        assert!(matches!(
            paper.highlight("missing", None, &stroke, "k"),
            Err(TesseraError::UnknownCell(_))
        ));
        assert!(matches!(
            paper.highlight("a", Some("nope"), &stroke, "k"),
            Err(TesseraError::InvalidSelector { .. })
        ));
        assert!(matches!(
            paper.highlight("a", None, &StrategyRef::new("glow"), "k"),
            Err(TesseraError::UnknownStrategy { .. })
        ));
    }
}
