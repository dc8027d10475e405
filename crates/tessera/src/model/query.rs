//! Structural and spatial queries over a [`Graph`].

use std::collections::{HashSet, VecDeque};

use indexmap::{IndexMap, IndexSet};
use serde_json::Value;

use tessera_core::{
    geometry::{Point, Rect},
    identifier::Id,
};

use crate::model::{Cell, Endpoint, Graph};

/// Options for link and neighbor queries and for traversals.
///
/// When neither `inbound` nor `outbound` is set, both directions are used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkQuery {
    inbound: bool,
    outbound: bool,
    deep: bool,
    indirect: bool,
    include_enclosed: bool,
    breadth_first: bool,
}

impl LinkQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only links whose target is the cell.
    pub fn with_inbound(mut self, inbound: bool) -> Self {
        self.inbound = inbound;
        self
    }

    /// Only links whose source is the cell.
    pub fn with_outbound(mut self, outbound: bool) -> Self {
        self.outbound = outbound;
        self
    }

    /// Also consider the links of embedded cells.
    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    /// Follow links attached to links.
    pub fn with_indirect(mut self, indirect: bool) -> Self {
        self.indirect = indirect;
        self
    }

    /// With `deep`, keep links between two cells of the embedding subtree.
    pub fn with_include_enclosed(mut self, include_enclosed: bool) -> Self {
        self.include_enclosed = include_enclosed;
        self
    }

    /// Traversal order for [`Graph::search`].
    pub fn with_breadth_first(mut self, breadth_first: bool) -> Self {
        self.breadth_first = breadth_first;
        self
    }

    fn directions(&self) -> (bool, bool) {
        if !self.inbound && !self.outbound {
            (true, true)
        } else {
            (self.inbound, self.outbound)
        }
    }
}

/// Options for [`Graph::embedded_cells`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedQuery {
    deep: bool,
    breadth_first: bool,
    sort_siblings: bool,
}

impl EmbedQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn with_breadth_first(mut self, breadth_first: bool) -> Self {
        self.breadth_first = breadth_first;
        self
    }

    /// Orders the children of every cell by `z`.
    pub fn with_sort_siblings(mut self, sort_siblings: bool) -> Self {
        self.sort_siblings = sort_siblings;
        self
    }
}

impl Graph {
    // =========================================================================
    // Adjacency
    // =========================================================================

    /// Links attached to a cell.
    ///
    /// With `indirect`, links attached to those links are followed
    /// recursively. With `deep`, the links of every embedded cell are
    /// included; links whose both ends lie in the subtree are dropped unless
    /// `include_enclosed` is set. Each link appears once.
    pub fn connected_links(&self, id: impl Into<Id>, query: LinkQuery) -> Vec<Id> {
        let id = id.into();
        let (inbound, outbound) = query.directions();
        let mut links: IndexSet<Id> = IndexSet::new();
        let mut visited: HashSet<Id> = HashSet::new();

        self.collect_links(id, inbound, outbound, query.indirect, &mut links, &mut visited);

        if query.deep {
            let descendants: HashSet<Id> = self
                .embedded_cells(id, EmbedQuery::new().with_deep(true))
                .into_iter()
                .collect();
            for descendant in &descendants {
                self.collect_links(
                    *descendant,
                    inbound,
                    outbound,
                    query.indirect,
                    &mut links,
                    &mut visited,
                );
            }
            let in_subtree = |id: Id| -> bool { descendants.contains(&id) };
            links.retain(|link| {
                if in_subtree(*link) {
                    return false;
                }
                if query.include_enclosed {
                    return true;
                }
                let Some(cell) = self.cell(*link) else {
                    return false;
                };
                let inside = |end: Endpoint| {
                    end.cell_id()
                        .is_some_and(|end| end == id || in_subtree(end))
                };
                !(inside(cell.source()) && inside(cell.target()))
            });
        }

        links.shift_remove(&id);
        links.into_iter().collect()
    }

    fn collect_links(
        &self,
        id: Id,
        inbound: bool,
        outbound: bool,
        indirect: bool,
        links: &mut IndexSet<Id>,
        visited: &mut HashSet<Id>,
    ) {
        if !visited.insert(id) {
            return;
        }
        let mut found = Vec::new();
        if outbound {
            found.extend(self.outbound_links(id));
        }
        if inbound {
            found.extend(self.inbound_links(id));
        }
        for link in found {
            links.insert(link);
            if indirect {
                self.collect_links(link, inbound, outbound, indirect, links, visited);
            }
        }
    }

    /// Cells at the other end of the links attached to a cell.
    ///
    /// Loop links contribute the cell itself. With `deep`, the cell's own
    /// descendants are not reported.
    pub fn neighbors(&self, id: impl Into<Id>, query: LinkQuery) -> Vec<Id> {
        let id = id.into();
        let (inbound, outbound) = query.directions();
        let subtree: HashSet<Id> = if query.deep {
            self.embedded_cells(id, EmbedQuery::new().with_deep(true))
                .into_iter()
                .collect()
        } else {
            HashSet::new()
        };
        let mut neighbors: IndexSet<Id> = IndexSet::new();
        for link in self.connected_links(id, query) {
            let Some(cell) = self.cell(link) else {
                continue;
            };
            let source = cell.source().cell_id();
            let target = cell.target().cell_id();
            let mine = |end: Option<Id>| end.is_some_and(|end| end == id || subtree.contains(&end));
            if source.is_some() && source == target && mine(source) {
                // Loop
                if let Some(source) = source {
                    neighbors.insert(source);
                }
                continue;
            }
            if inbound && mine(target) {
                if let Some(source) = source {
                    neighbors.insert(source);
                }
            }
            if outbound && mine(source) {
                if let Some(target) = target {
                    neighbors.insert(target);
                }
            }
        }
        if query.deep {
            neighbors.retain(|neighbor| !subtree.contains(neighbor) || *neighbor == id);
        }
        // A cell that is a link also neighbors its own ends
        if let Some(cell) = self.cell(id) {
            if cell.is_link() {
                if inbound {
                    if let Some(source) = cell.source().cell_id() {
                        neighbors.insert(source);
                    }
                }
                if outbound {
                    if let Some(target) = cell.target().cell_id() {
                        neighbors.insert(target);
                    }
                }
            }
        }
        neighbors.into_iter().collect()
    }

    pub fn is_neighbor(&self, id: impl Into<Id>, other: impl Into<Id>, query: LinkQuery) -> bool {
        let other = other.into();
        self.neighbors(id, query).contains(&other)
    }

    /// Elements with no inbound link.
    pub fn sources(&self) -> Vec<Id> {
        self.elements()
            .into_iter()
            .filter(|cell| self.inbound_links(cell.id()).is_empty())
            .map(Cell::id)
            .collect()
    }

    /// Elements with no outbound link.
    pub fn sinks(&self) -> Vec<Id> {
        self.elements()
            .into_iter()
            .filter(|cell| self.outbound_links(cell.id()).is_empty())
            .map(Cell::id)
            .collect()
    }

    pub fn is_source(&self, id: impl Into<Id>) -> bool {
        self.inbound_links(id.into()).is_empty()
    }

    pub fn is_sink(&self, id: impl Into<Id>) -> bool {
        self.outbound_links(id.into()).is_empty()
    }

    /// Cells that are not embedded.
    pub fn roots(&self) -> Vec<Id> {
        self.cells()
            .into_iter()
            .filter(|cell| cell.parent().is_none())
            .map(Cell::id)
            .collect()
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Breadth-first walk over neighbors. `visit` receives the cell and its
    /// distance from `start`; returning `false` stops the walk from going
    /// past that cell.
    pub fn bfs(
        &self,
        start: impl Into<Id>,
        query: LinkQuery,
        mut visit: impl FnMut(&Graph, &Cell, usize) -> bool,
    ) {
        let start = start.into();
        let mut visited: HashSet<Id> = HashSet::new();
        let mut queue: VecDeque<(Id, usize)> = VecDeque::from([(start, 0)]);
        while let Some((id, distance)) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(cell) = self.cell(id) else {
                continue;
            };
            if !visit(self, cell, distance) {
                continue;
            }
            for neighbor in self.neighbors(id, query) {
                if !visited.contains(&neighbor) {
                    queue.push_back((neighbor, distance + 1));
                }
            }
        }
    }

    /// Depth-first walk over neighbors. Same contract as [`Graph::bfs`].
    pub fn dfs(
        &self,
        start: impl Into<Id>,
        query: LinkQuery,
        mut visit: impl FnMut(&Graph, &Cell, usize) -> bool,
    ) {
        let start = start.into();
        let mut visited: HashSet<Id> = HashSet::new();
        let mut stack: Vec<(Id, usize)> = vec![(start, 0)];
        while let Some((id, distance)) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(cell) = self.cell(id) else {
                continue;
            };
            if !visit(self, cell, distance) {
                continue;
            }
            let neighbors = self.neighbors(id, query);
            for neighbor in neighbors.into_iter().rev() {
                if !visited.contains(&neighbor) {
                    stack.push((neighbor, distance + 1));
                }
            }
        }
    }

    /// [`Graph::bfs`] or [`Graph::dfs`], per `breadth_first`.
    pub fn search(
        &self,
        start: impl Into<Id>,
        query: LinkQuery,
        visit: impl FnMut(&Graph, &Cell, usize) -> bool,
    ) {
        if query.breadth_first {
            self.bfs(start, query, visit);
        } else {
            self.dfs(start, query, visit);
        }
    }

    /// Every element reachable following outbound links.
    pub fn successors(&self, id: impl Into<Id>, query: LinkQuery) -> Vec<Id> {
        let id = id.into();
        let mut found = Vec::new();
        let query = query.with_outbound(true).with_inbound(false);
        self.search(id, query, |_, cell, _| {
            if cell.id() != id && cell.is_element() {
                found.push(cell.id());
            }
            true
        });
        found
    }

    /// Every element reachable following inbound links backwards.
    pub fn predecessors(&self, id: impl Into<Id>, query: LinkQuery) -> Vec<Id> {
        let id = id.into();
        let mut found = Vec::new();
        let query = query.with_inbound(true).with_outbound(false);
        self.search(id, query, |_, cell, _| {
            if cell.id() != id && cell.is_element() {
                found.push(cell.id());
            }
            true
        });
        found
    }

    pub fn is_successor(&self, id: impl Into<Id>, other: impl Into<Id>) -> bool {
        let other = other.into();
        self.successors(id, LinkQuery::new()).contains(&other)
    }

    pub fn is_predecessor(&self, id: impl Into<Id>, other: impl Into<Id>) -> bool {
        let other = other.into();
        self.predecessors(id, LinkQuery::new()).contains(&other)
    }

    // =========================================================================
    // Embedding
    // =========================================================================

    /// Ancestors of a cell, nearest first.
    pub fn ancestors(&self, id: impl Into<Id>) -> Vec<Id> {
        let mut ancestors = Vec::new();
        let mut current = self.cell(id).and_then(Cell::parent);
        while let Some(parent) = current {
            if ancestors.contains(&parent) {
                break;
            }
            ancestors.push(parent);
            current = self.cell(parent).and_then(Cell::parent);
        }
        ancestors
    }

    /// Cells embedded in `id`: its children, or with `deep` its whole
    /// subtree in breadth- or depth-first order.
    pub fn embedded_cells(&self, id: impl Into<Id>, query: EmbedQuery) -> Vec<Id> {
        let id = id.into();
        let children = |id: Id| -> Vec<Id> {
            let Some(cell) = self.cell(id) else {
                return Vec::new();
            };
            let mut embeds: Vec<Id> = cell
                .embeds()
                .into_iter()
                .filter(|child| self.contains(*child))
                .collect();
            if query.sort_siblings {
                embeds.sort_by_key(|child| self.cell(*child).map(Cell::z).unwrap_or(0));
            }
            embeds
        };
        if !query.deep {
            return children(id);
        }
        let mut found: Vec<Id> = Vec::new();
        let mut seen: HashSet<Id> = HashSet::from([id]);
        if query.breadth_first {
            let mut queue: VecDeque<Id> = children(id).into();
            while let Some(next) = queue.pop_front() {
                if !seen.insert(next) {
                    continue;
                }
                found.push(next);
                queue.extend(children(next));
            }
        } else {
            let mut stack: Vec<Id> = children(id).into_iter().rev().collect();
            while let Some(next) = stack.pop() {
                if !seen.insert(next) {
                    continue;
                }
                found.push(next);
                stack.extend(children(next).into_iter().rev());
            }
        }
        found
    }

    /// Whether `id` is embedded in `ancestor`, directly or (with `deep`)
    /// through intermediate parents.
    pub fn is_embedded_in(&self, id: impl Into<Id>, ancestor: impl Into<Id>, deep: bool) -> bool {
        let id = id.into();
        let ancestor = ancestor.into();
        if deep {
            self.ancestors(id).contains(&ancestor)
        } else {
            self.cell(id).and_then(Cell::parent) == Some(ancestor)
        }
    }

    /// The nearest cell that is an ancestor of all given cells.
    pub fn common_ancestor(&self, ids: &[Id]) -> Option<Id> {
        let (first, rest) = ids.split_first()?;
        let others: Vec<Vec<Id>> = rest.iter().map(|id| self.ancestors(*id)).collect();
        self.ancestors(*first)
            .into_iter()
            .find(|candidate| others.iter().all(|ancestors| ancestors.contains(candidate)))
    }

    // =========================================================================
    // Subgraphs and cloning
    // =========================================================================

    /// The given cells, plus (with `deep`) their embedded cells, plus every
    /// link connecting two cells of the result.
    pub fn subgraph(&self, ids: &[Id], deep: bool) -> Vec<Id> {
        let mut cells: IndexSet<Id> = IndexSet::new();
        for id in ids {
            if !self.contains(*id) {
                continue;
            }
            cells.insert(*id);
            if deep {
                cells.extend(self.embedded_cells(*id, EmbedQuery::new().with_deep(true)));
            }
        }
        let elements: Vec<Id> = cells
            .iter()
            .copied()
            .filter(|id| self.cell(*id).is_some_and(Cell::is_element))
            .collect();
        let mut candidates: IndexSet<Id> = IndexSet::new();
        for element in elements {
            candidates.extend(self.connected_links(element, LinkQuery::new()));
        }
        for link in candidates {
            let Some(cell) = self.cell(link) else {
                continue;
            };
            let inside = |end: Endpoint| match end.cell_id() {
                Some(id) => cells.contains(&id),
                None => true,
            };
            if inside(cell.source()) && inside(cell.target()) {
                cells.insert(link);
            }
        }
        cells.into_iter().collect()
    }

    /// Deep copies of the given cells under fresh ids, keyed by original id.
    ///
    /// References between copied cells (link ends, `parent`, `embeds`) are
    /// rewritten to the copies; references leaving the set are kept for
    /// link ends and dropped for embedding. The copies keep their `z`.
    ///
    /// Every fresh id is interned for the life of the process, so callers
    /// that clone in a loop grow the global [`Id`] interner accordingly.
    pub fn clone_cells(&self, ids: &[Id]) -> IndexMap<Id, Cell> {
        let mut mapping: IndexMap<Id, Id> = IndexMap::new();
        for id in ids {
            if self.contains(*id) && !mapping.contains_key(id) {
                mapping.insert(*id, Id::new(&uuid::Uuid::new_v4().to_string()));
            }
        }
        let mut clones = IndexMap::new();
        for (original, fresh) in &mapping {
            let Some(cell) = self.cell(*original) else {
                continue;
            };
            let mut clone = cell.clone();
            clone.set_id(*fresh);
            let attributes = clone.attributes_mut();
            for key in ["source", "target"] {
                let Some(Value::Object(end)) = attributes.get_mut(key) else {
                    continue;
                };
                let remapped = end
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|id| mapping.get(&Id::new(id)));
                if let Some(remapped) = remapped {
                    end.insert("id".to_string(), Value::String(remapped.to_string()));
                }
            }
            let parent = attributes
                .get("parent")
                .and_then(Value::as_str)
                .and_then(|id| mapping.get(&Id::new(id)))
                .copied();
            match parent {
                Some(parent) => {
                    attributes.insert("parent".to_string(), Value::String(parent.to_string()));
                }
                None => {
                    attributes.shift_remove("parent");
                }
            }
            if let Some(Value::Array(embeds)) = attributes.get_mut("embeds") {
                *embeds = embeds
                    .iter()
                    .filter_map(Value::as_str)
                    .filter_map(|id| mapping.get(&Id::new(id)))
                    .map(|id| Value::String(id.to_string()))
                    .collect();
            }
            clones.insert(*original, clone);
        }
        clones
    }

    /// [`Graph::clone_cells`] over [`Graph::subgraph`].
    pub fn clone_subgraph(&self, ids: &[Id], deep: bool) -> IndexMap<Id, Cell> {
        self.clone_cells(&self.subgraph(ids, deep))
    }

    // =========================================================================
    // Spatial queries
    // =========================================================================

    /// Elements whose rotated box contains `p`, in paint order.
    pub fn find_elements_at_point(&self, p: Point) -> Vec<Id> {
        self.elements()
            .into_iter()
            .filter(|cell| rotated_bbox(cell).contains_point(p))
            .map(Cell::id)
            .collect()
    }

    /// Elements whose rotated box intersects `area` (or lies inside it,
    /// with `strict`), in paint order.
    pub fn find_elements_in_area(&self, area: &Rect, strict: bool) -> Vec<Id> {
        self.elements()
            .into_iter()
            .filter(|cell| {
                let bbox = rotated_bbox(cell);
                if strict {
                    area.contains_rect(&bbox)
                } else {
                    area.intersects(&bbox)
                }
            })
            .map(Cell::id)
            .collect()
    }

    /// Elements overlapping `id`, excluding itself and its descendants.
    pub fn find_elements_under_element(&self, id: impl Into<Id>) -> Vec<Id> {
        let id = id.into();
        let Some(cell) = self.cell(id) else {
            return Vec::new();
        };
        let bbox = rotated_bbox(cell);
        let descendants: HashSet<Id> = self
            .embedded_cells(id, EmbedQuery::new().with_deep(true))
            .into_iter()
            .collect();
        self.find_elements_in_area(&bbox, false)
            .into_iter()
            .filter(|other| *other != id && !descendants.contains(other))
            .collect()
    }

    /// Union of the rotated boxes of all elements.
    pub fn bbox(&self) -> Option<Rect> {
        self.cells_bbox(None)
    }

    /// Union of the rotated boxes of the given cells, or of all elements.
    pub fn cells_bbox(&self, ids: Option<&[Id]>) -> Option<Rect> {
        let boxes: Vec<Rect> = match ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| self.cell(*id))
                .map(rotated_bbox)
                .collect(),
            None => self.elements().into_iter().map(rotated_bbox).collect(),
        };
        boxes.into_iter().reduce(|a, b| a.union(&b))
    }
}

fn rotated_bbox(cell: &Cell) -> Rect {
    cell.bbox().rotated_bbox(cell.angle())
}

#[cfg(test)]
mod tests {
    use tessera_core::geometry::Size;

    use super::*;
    use crate::model::{CellEnd, Element, Link, Options};

    fn rect(id: &str, x: f64, y: f64) -> Cell {
        Element::new("standard.Rectangle")
            .with_id(id)
            .with_position(Point::new(x, y))
            .with_size(Size::new(10.0, 10.0))
            .build()
    }

    fn link(id: &str, source: &str, target: &str) -> Cell {
        Link::new("standard.Link")
            .with_id(id)
            .with_source(CellEnd::new(source))
            .with_target(CellEnd::new(target))
            .build()
    }

    fn ids(ids: Vec<Id>) -> Vec<String> {
        ids.into_iter().map(|id| id.to_string()).collect()
    }

    /// a -> b -> c, a -> c, plus a link l3 whose target is link l1.
    fn chain() -> Graph {
        let mut graph = Graph::default();
        graph
            .add_cells(
                vec![
                    rect("a", 0.0, 0.0),
                    rect("b", 50.0, 0.0),
                    rect("c", 100.0, 0.0),
                    rect("d", 200.0, 200.0),
                    link("l1", "a", "b"),
                    link("l2", "b", "c"),
                    link("l3", "d", "l1"),
                ],
                Options::new(),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_connected_links_directions() {
        let graph = chain();
        assert_eq!(ids(graph.connected_links("b", LinkQuery::new())), vec!["l2", "l1"]);
        assert_eq!(
            ids(graph.connected_links("b", LinkQuery::new().with_inbound(true))),
            vec!["l1"]
        );
        assert_eq!(
            ids(graph.connected_links("b", LinkQuery::new().with_outbound(true))),
            vec!["l2"]
        );
    }

    #[test]
    fn test_connected_links_indirect() {
        let graph = chain();
        let links = graph.connected_links("a", LinkQuery::new().with_indirect(true));
        assert_eq!(ids(links), vec!["l1", "l3"]);
    }

    #[test]
    fn test_neighbors_and_successors() {
        let graph = chain();
        assert_eq!(ids(graph.neighbors("b", LinkQuery::new())), vec!["c", "a"]);
        assert_eq!(ids(graph.successors("a", LinkQuery::new())), vec!["b", "c"]);
        assert!(graph.is_successor("a", "c"));
        assert!(!graph.is_successor("c", "a"));
        assert!(graph.is_predecessor("c", "a"));
    }

    #[test]
    fn test_loop_link_neighbors_itself() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("a", 0.0, 0.0), link("l", "a", "a")], Options::new())
            .unwrap();
        assert_eq!(ids(graph.neighbors("a", LinkQuery::new())), vec!["a"]);
    }

    #[test]
    fn test_bfs_reports_distances_and_can_stop() {
        let graph = chain();
        let mut seen = Vec::new();
        graph.bfs("a", LinkQuery::new().with_outbound(true), |_, cell, distance| {
            seen.push((cell.id().to_string(), distance));
            true
        });
        assert_eq!(seen, vec![("a".to_string(), 0), ("b".to_string(), 1), ("c".to_string(), 2)]);

        let mut seen = Vec::new();
        graph.bfs("a", LinkQuery::new().with_outbound(true), |_, cell, _| {
            seen.push(cell.id().to_string());
            false
        });
        assert_eq!(seen, vec!["a"]);
    }

    #[test]
    fn test_sources_sinks_roots() {
        let graph = chain();
        assert_eq!(ids(graph.sources()), vec!["a", "d"]);
        assert_eq!(ids(graph.sinks()), vec!["c"]);
        assert_eq!(graph.roots().len(), 7);
        assert!(graph.is_source("a"));
        assert!(!graph.is_sink("a"));
    }

    #[test]
    fn test_embedding_queries() {
        let mut graph = Graph::default();
        graph
            .add_cells(
                vec![rect("p", 0.0, 0.0), rect("c1", 0.0, 0.0), rect("c2", 0.0, 0.0), rect("g", 0.0, 0.0)],
                Options::new(),
            )
            .unwrap();
        graph.embed("p", "c1", Options::new()).unwrap();
        graph.embed("p", "c2", Options::new()).unwrap();
        graph.embed("c1", "g", Options::new()).unwrap();

        assert_eq!(ids(graph.embedded_cells("p", EmbedQuery::new())), vec!["c1", "c2"]);
        let deep = EmbedQuery::new().with_deep(true);
        assert_eq!(ids(graph.embedded_cells("p", deep)), vec!["c1", "g", "c2"]);
        assert_eq!(
            ids(graph.embedded_cells("p", deep.with_breadth_first(true))),
            vec!["c1", "c2", "g"]
        );
        assert_eq!(ids(graph.ancestors("g")), vec!["c1", "p"]);
        assert!(graph.is_embedded_in("g", "p", true));
        assert!(!graph.is_embedded_in("g", "p", false));
        assert_eq!(graph.common_ancestor(&[Id::new("g"), Id::new("c2")]), Some(Id::new("p")));
    }

    #[test]
    fn test_subgraph_adds_inner_links() {
        let graph = chain();
        let cells = graph.subgraph(&[Id::new("a"), Id::new("b")], false);
        assert_eq!(ids(cells), vec!["a", "b", "l1"]);
    }

    #[test]
    fn test_clone_cells_remaps_references() {
        let graph = chain();
        let clones = graph.clone_cells(&[Id::new("a"), Id::new("b"), Id::new("l1")]);
        let a = clones[&Id::new("a")].id();
        let b = clones[&Id::new("b")].id();
        let link = &clones[&Id::new("l1")];
        assert_ne!(a, Id::new("a"));
        assert_eq!(link.source().cell_id(), Some(a));
        assert_eq!(link.target().cell_id(), Some(b));
        assert_eq!(link.z(), graph.cell("l1").unwrap().z());

        let subgraph = graph.clone_subgraph(&[Id::new("b"), Id::new("c")], false);
        assert_eq!(subgraph.len(), 3);
        assert!(subgraph.contains_key(&Id::new("l2")));
    }

    #[test]
    fn test_spatial_queries_use_rotated_boxes() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("a", 0.0, 0.0), rect("b", 5.0, 5.0)], Options::new())
            .unwrap();
        graph.rotate("a", 45.0, true, Options::new()).unwrap();
        // Corner of the rotated square pokes out past the unrotated box
        assert_eq!(ids(graph.find_elements_at_point(Point::new(-1.0, 5.0))), vec!["a"]);
        assert_eq!(ids(graph.find_elements_under_element("a")), vec!["b"]);
        let area = Rect::new(-10.0, -10.0, 30.0, 30.0);
        assert_eq!(graph.find_elements_in_area(&area, true).len(), 2);
    }
}
