//! Per-view geometry cache.

use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

use tessera_core::{
    geometry::{Polyline, Rect, Shape},
    scene::{NodeId, Scene},
};

/// Node outlines, boxes and flattened subpaths of one view.
///
/// Entries are computed lazily on first use and stay valid until the view
/// re-renders or re-applies attributes, which calls [`NodeCache::clear`].
#[derive(Debug, Default)]
pub struct NodeCache {
    shapes: RefCell<HashMap<NodeId, Option<Shape>>>,
    bboxes: RefCell<HashMap<NodeId, Option<Rect>>>,
    subpaths: RefCell<HashMap<(NodeId, u32), Rc<Vec<Polyline>>>>,
    misses: Cell<u64>,
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shape(&self, scene: &Scene, node: NodeId) -> Option<Shape> {
        if let Some(shape) = self.shapes.borrow().get(&node) {
            return shape.clone();
        }
        self.misses.set(self.misses.get() + 1);
        let shape = scene.node_shape(node);
        self.shapes.borrow_mut().insert(node, shape.clone());
        shape
    }

    pub fn local_bbox(&self, scene: &Scene, node: NodeId) -> Option<Rect> {
        if let Some(bbox) = self.bboxes.borrow().get(&node) {
            return *bbox;
        }
        self.misses.set(self.misses.get() + 1);
        let bbox = scene.local_bbox(node);
        self.bboxes.borrow_mut().insert(node, bbox);
        bbox
    }

    /// Flattened subpaths of a node's outline at `precision`.
    pub fn subpaths(&self, scene: &Scene, node: NodeId, precision: u32) -> Rc<Vec<Polyline>> {
        if let Some(subpaths) = self.subpaths.borrow().get(&(node, precision)) {
            return Rc::clone(subpaths);
        }
        self.misses.set(self.misses.get() + 1);
        let subpaths = match self.shape(scene, node) {
            Some(shape) => shape
                .to_path()
                .subpath_polylines(precision)
                .into_iter()
                .map(Polyline::new)
                .collect(),
            None => Vec::new(),
        };
        let subpaths = Rc::new(subpaths);
        self.subpaths
            .borrow_mut()
            .insert((node, precision), Rc::clone(&subpaths));
        subpaths
    }

    pub fn clear(&self) {
        self.shapes.borrow_mut().clear();
        self.bboxes.borrow_mut().clear();
        self.subpaths.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.borrow().is_empty()
            && self.bboxes.borrow().is_empty()
            && self.subpaths.borrow().is_empty()
    }

    /// Number of entries computed since creation.
    pub fn misses(&self) -> u64 {
        self.misses.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_are_computed_once() {
        let mut scene = Scene::new();
        let rect = scene.create_element("rect");
        scene.append_child(scene.root(), rect).unwrap();
        scene.set_attribute(rect, "width", "10").unwrap();
        scene.set_attribute(rect, "height", "5").unwrap();

        let cache = NodeCache::new();
        let first = cache.local_bbox(&scene, rect);
        let second = cache.local_bbox(&scene, rect);
        assert_eq!(first, second);
        assert_eq!(cache.misses(), 1);

        let subpaths = cache.subpaths(&scene, rect, 2);
        assert_eq!(subpaths.len(), 1);
        let _ = cache.subpaths(&scene, rect, 2);
        // shape + subpaths
        assert_eq!(cache.misses(), 3);

        cache.clear();
        assert!(cache.is_empty());
    }
}
