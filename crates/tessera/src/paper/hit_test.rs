//! Finding views by position.
//!
//! Queries take local (model) coordinates and return cell ids in paint
//! order, bottom-most first.

use tessera_core::{
    geometry::{Point, Rect},
    identifier::Id,
};

use crate::{model::CellKind, paper::Paper, view::CellView};

impl Paper {
    /// Views in the cells layer, in paint order.
    fn painted_views(&self) -> impl Iterator<Item = &CellView> {
        self.scene
            .children(self.layers.cells())
            .iter()
            .filter_map(|node| self.nodes.get(node))
            .filter_map(|id| self.views.get(id))
    }

    fn views_at(&self, p: Point, tolerance: f64, kind: Option<CellKind>) -> Vec<Id> {
        let client = self.local_to_client_point(p);
        self.painted_views()
            .filter(|view| kind.is_none_or(|kind| view.kind() == kind))
            .filter(|view| self.scene.hit_test(view.root(), client, tolerance))
            .map(CellView::id)
            .collect()
    }

    /// Views whose rendering covers `p`.
    pub fn find_views_at_point(&self, p: Point) -> Vec<Id> {
        self.views_at(p, 0.0, None)
    }

    /// Element views whose rendering covers `p`.
    pub fn find_element_views_at_point(&self, p: Point) -> Vec<Id> {
        self.views_at(p, 0.0, Some(CellKind::Element))
    }

    /// Link views passing within `tolerance` (client units) of `p`.
    pub fn find_link_views_at_point(&self, p: Point, tolerance: f64) -> Vec<Id> {
        self.views_at(p, tolerance, Some(CellKind::Link))
    }

    /// Views whose bounding box intersects `area`, or lies inside it when
    /// `strict` is set.
    pub fn find_views_in_area(&self, area: &Rect, strict: bool) -> Vec<Id> {
        let frame = self.layers.viewport();
        self.painted_views()
            .filter(|view| {
                self.scene
                    .bbox_relative_to(view.root(), frame)
                    .is_some_and(|bbox| {
                        if strict {
                            area.contains_rect(&bbox)
                        } else {
                            area.intersects(&bbox)
                        }
                    })
            })
            .map(CellView::id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use tessera_core::geometry::Size;

    use super::*;
    use crate::{
        config::PaperConfig,
        model::{Cell, CellEnd, CellRegistry, Element, Graph, Link},
    };

    fn element(id: &str, x: f64, y: f64) -> Cell {
        Element::new("standard.Rectangle")
            .with_id(id)
            .with_position(Point::new(x, y))
            .with_size(Size::new(100.0, 100.0))
            .build()
    }

    fn diagram() -> (Graph, Paper) {
        let mut graph = Graph::new(CellRegistry::standard());
        graph.add_cell(element("a", 0.0, 0.0)).unwrap();
        graph.add_cell(element("b", 50.0, 50.0)).unwrap();
        graph.add_cell(element("c", 400.0, 50.0)).unwrap();
        graph
            .add_cell(
                Link::new("standard.Link")
                    .with_id("l")
                    .with_source(CellEnd::new("b"))
                    .with_target(CellEnd::new("c"))
                    .build(),
            )
            .unwrap();
        let paper = Paper::new(&mut graph, PaperConfig::default()).unwrap();
        (graph, paper)
    }

    #[test]
    fn test_views_at_point_in_paint_order() {
        let (_graph, paper) = diagram();
        assert_eq!(paper.find_views_at_point(Point::new(75.0, 75.0)), vec![Id::new("a"), Id::new("b")]);
        assert_eq!(paper.find_element_views_at_point(Point::new(10.0, 10.0)), vec![Id::new("a")]);
        assert!(paper.find_views_at_point(Point::new(300.0, 300.0)).is_empty());
    }

    #[test]
    fn test_link_views_within_tolerance() {
        let (_graph, paper) = diagram();
        // The link runs horizontally at y = 100 between b and c
        assert_eq!(paper.find_link_views_at_point(Point::new(300.0, 103.0), 5.0), vec![Id::new("l")]);
        assert!(paper.find_link_views_at_point(Point::new(300.0, 120.0), 5.0).is_empty());
    }

    #[test]
    fn test_views_in_area() {
        let (_graph, paper) = diagram();
        let area = Rect::new(-10.0, -10.0, 130.0, 130.0);
        assert_eq!(paper.find_views_in_area(&area, true), vec![Id::new("a")]);
        let loose = paper.find_views_in_area(&area, false);
        assert!(loose.contains(&Id::new("a")));
        assert!(loose.contains(&Id::new("b")));
        assert!(!loose.contains(&Id::new("c")));
    }

    #[test]
    fn test_hit_test_follows_viewport() {
        let (_graph, mut paper) = diagram();
        paper.set_scale(2.0, 2.0).unwrap();
        paper.set_translate(100.0, 0.0).unwrap();
        assert_eq!(paper.find_element_views_at_point(Point::new(10.0, 10.0)), vec![Id::new("a")]);
        let client = paper.local_to_client_point(Point::new(10.0, 10.0));
        assert!(client.approx_eq(Point::new(120.0, 20.0), 1e-9));
    }
}
