//! The paper: keeps a scene in sync with a graph.
//!
//! A [`Paper`] listens to graph events, turns them into per-view
//! [`UpdateFlags`] and applies them when it is flushed. Views update in a
//! fixed order: elements before links, then by `z` and creation order, so a
//! link always resolves against up-to-date element geometry.
//!
//! # Overview
//!
//! - [`Paper`] - Views, layers, the viewport and the update loop
//! - [`PaperEvent`] - Errors, warnings and flush reports
//! - [`FlushStats`] - What one flush or tick did
//! - [`Layers`] - Fixed node structure of the paper
//! - [`Tool`] - Decorations drawn over views

mod highlighting;
mod hit_test;
mod layers;
mod scheduler;
mod tools;
mod viewport;

pub use layers::{LAYER_NAMES, Layers};
pub use tools::Tool;

use std::{cell::RefCell, collections::HashMap, ops::AddAssign, rc::Rc};

use indexmap::IndexMap;
use log::{debug, info, trace, warn};

use tessera_core::{
    geometry::{DEFAULT_PRECISION, Matrix, Point},
    identifier::Id,
    scene::{NodeId, Scene},
};

use crate::{
    config::{PaperConfig, Sorting, StyleConfig},
    error::TesseraError,
    model::{Cell, CellKind, Graph, LinkQuery, ListenerId},
    strategy::StrategyRegistry,
    view::{CellView, Resolution, Resolver, UpdateFlags, attributes::MarkerDefs},
};

use scheduler::{Request, Scheduler};
use tools::ToolsView;

/// Decides whether a cell gets a view. Cells it rejects are unmounted.
pub type CullingFn = Box<dyn Fn(&Cell) -> bool>;

/// Something a flush reports back.
#[derive(Debug)]
pub enum PaperEvent {
    /// A view could not be updated. The cell keeps its previous rendering.
    Error { id: Id, error: TesseraError },
    /// A view was updated with a fallback.
    Warning { id: Id, error: TesseraError },
    /// A flush or tick finished and did some work.
    RenderDone(FlushStats),
}

/// Counters of one flush or tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    updated: usize,
    postponed: usize,
    mounted: usize,
    unmounted: usize,
    failed: usize,
}

impl FlushStats {
    /// Views whose flags were applied.
    pub fn updated(&self) -> usize {
        self.updated
    }

    /// Links left dirty because an end is not rendered yet.
    pub fn postponed(&self) -> usize {
        self.postponed
    }

    pub fn mounted(&self) -> usize {
        self.mounted
    }

    pub fn unmounted(&self) -> usize {
        self.unmounted
    }

    /// Views whose update failed.
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Whether nothing happened.
    pub fn is_empty(&self) -> bool {
        self.updated + self.mounted + self.unmounted + self.failed == 0
    }
}

impl AddAssign for FlushStats {
    fn add_assign(&mut self, other: Self) {
        self.updated += other.updated;
        self.postponed += other.postponed;
        self.mounted += other.mounted;
        self.unmounted += other.unmounted;
        self.failed += other.failed;
    }
}

/// Result of updating one view.
enum Outcome {
    Updated,
    Postponed,
    Failed,
    Skipped,
}

/// The rendering side of a diagram.
pub struct Paper {
    scene: Scene,
    config: PaperConfig,
    strategies: StrategyRegistry,
    layers: Layers,
    viewport: Matrix,
    views: IndexMap<Id, CellView>,
    nodes: HashMap<NodeId, Id>,
    scheduler: Rc<RefCell<Scheduler>>,
    listener: Option<ListenerId>,
    frozen: bool,
    culling: Option<CullingFn>,
    markers: MarkerDefs,
    tools: IndexMap<Id, ToolsView>,
    events: Vec<PaperEvent>,
    next_order: usize,
}

impl std::fmt::Debug for Paper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paper")
            .field("views", &self.views.len())
            .field("frozen", &self.frozen)
            .field("culling", &self.culling.is_some())
            .field("viewport", &self.viewport)
            .finish_non_exhaustive()
    }
}

impl Paper {
    /// Creates a paper with the standard strategies and no style, attached
    /// to `graph`.
    ///
    /// # Errors
    ///
    /// Scene errors while building the layers.
    pub fn new(graph: &mut Graph, config: PaperConfig) -> Result<Self, TesseraError> {
        Self::with_options(graph, config, &StyleConfig::default(), StrategyRegistry::standard())
    }

    /// Creates a paper attached to `graph`.
    ///
    /// Every cell already in the graph is mounted. Unless the paper is
    /// async or frozen, it is rendered before this returns.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Config`] for an invalid background color.
    pub fn with_options(
        graph: &mut Graph,
        config: PaperConfig,
        style: &StyleConfig,
        strategies: StrategyRegistry,
    ) -> Result<Self, TesseraError> {
        let background = style.background_color().map_err(TesseraError::Config)?;
        let mut scene = Scene::new();
        let layers = Layers::build(&mut scene, config.width(), config.height(), background.as_ref())?;
        let scheduler = Rc::new(RefCell::new(Scheduler::default()));
        let listener = scheduler::listen(graph, Rc::downgrade(&scheduler));
        scheduler.borrow_mut().push(Request::Reset);

        let frozen = config.is_frozen();
        let mut paper = Self {
            scene,
            markers: MarkerDefs::new(layers.defs()),
            config,
            strategies,
            layers,
            viewport: Matrix::identity(),
            views: IndexMap::new(),
            nodes: HashMap::new(),
            scheduler,
            listener: Some(listener),
            frozen,
            culling: None,
            tools: IndexMap::new(),
            events: Vec::new(),
            next_order: 0,
        };
        debug!(cells = graph.len(), frozen, async_mode = paper.config.is_async(); "Paper created");
        if !paper.config.is_async() {
            paper.flush(graph);
        }
        Ok(paper)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn config(&self) -> &PaperConfig {
        &self.config
    }

    pub fn layers(&self) -> &Layers {
        &self.layers
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Registry to add custom strategies to.
    pub fn strategies_mut(&mut self) -> &mut StrategyRegistry {
        &mut self.strategies
    }

    /// The view of a cell, if it is mounted.
    pub fn view(&self, id: impl Into<Id>) -> Option<&CellView> {
        self.views.get(&id.into())
    }

    /// Mounted views in creation order.
    pub fn views(&self) -> impl Iterator<Item = &CellView> {
        self.views.values()
    }

    /// The cell a scene node belongs to, searching up from `node`.
    pub fn find_view_by_node(&self, node: NodeId) -> Option<Id> {
        let mut current = Some(node);
        while let Some(node) = current {
            if let Some(id) = self.nodes.get(&node) {
                return Some(*id);
            }
            current = self.scene.parent(node);
        }
        None
    }

    /// Serializes the scene.
    pub fn to_svg(&self) -> String {
        self.scene.to_svg_string()
    }

    /// Events collected since the last drain.
    pub fn events(&self) -> &[PaperEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<PaperEvent> {
        std::mem::take(&mut self.events)
    }

    /// Whether a flush would do any work.
    pub fn has_scheduled_updates(&self) -> bool {
        !self.scheduler.borrow().is_empty() || self.views.values().any(|view| !view.flags().is_empty())
    }

    // =========================================================================
    // Freezing and culling
    // =========================================================================

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Stops applying updates. Requests keep accumulating.
    pub fn freeze(&mut self) {
        debug!("Paper frozen");
        self.frozen = true;
    }

    /// Resumes updates and applies what accumulated while frozen right
    /// away: everything when sync, one `batch_size` turn when async.
    pub fn unfreeze(&mut self, graph: &Graph) -> FlushStats {
        debug!("Paper unfrozen");
        self.frozen = false;
        if self.config.is_async() {
            return self.tick(graph);
        }
        self.flush(graph)
    }

    /// Installs or clears the culling predicate. Takes effect on the next
    /// [`Paper::check_viewport`].
    pub fn set_culling(&mut self, culling: Option<CullingFn>) {
        self.culling = culling;
    }

    /// Mounts cells the culling predicate accepts and unmounts the rest.
    ///
    /// Newly mounted views render on the next flush.
    pub fn check_viewport(&mut self, graph: &Graph) -> FlushStats {
        let mut stats = FlushStats::default();
        for cell in graph.cells() {
            let visible = self.is_visible(cell);
            let mounted = self.views.contains_key(&cell.id());
            if visible && !mounted {
                if self.mount(cell) {
                    stats.mounted += 1;
                }
            } else if !visible && mounted && self.unmount(cell.id()) {
                stats.unmounted += 1;
            }
        }
        debug!(mounted = stats.mounted, unmounted = stats.unmounted; "Viewport checked");
        stats
    }

    fn is_visible(&self, cell: &Cell) -> bool {
        self.culling.as_ref().is_none_or(|culling| culling(cell))
    }

    /// Detaches from `graph` and removes every view.
    pub fn dispose(&mut self, graph: &mut Graph) {
        if let Some(listener) = self.listener.take() {
            graph.off(listener);
        }
        let ids: Vec<Id> = self.views.keys().copied().collect();
        for id in ids {
            self.unmount(id);
        }
        self.scheduler.borrow_mut().drain();
        debug!("Paper disposed");
    }

    // =========================================================================
    // Update loop
    // =========================================================================

    /// Applies pending requests and at most `batch_size` view updates when
    /// the paper is async, or everything otherwise.
    pub fn tick(&mut self, graph: &Graph) -> FlushStats {
        let mut stats = self.process_requests(graph);
        if !self.frozen {
            let limit = if self.config.is_async() {
                self.config.batch_size().max(1)
            } else {
                usize::MAX
            };
            stats += self.update_views(graph, limit);
        }
        self.report(stats);
        stats
    }

    /// Applies every pending request and update, repeating until links
    /// dirtied along the way are done too. A frozen paper only mounts and
    /// unmounts views.
    pub fn flush(&mut self, graph: &Graph) -> FlushStats {
        let mut total = FlushStats::default();
        // Each pass settles one more level of link-to-link dependencies
        let max_passes = self.views.len() + 2;
        for _ in 0..max_passes {
            let mut stats = self.process_requests(graph);
            if self.frozen {
                total += stats;
                break;
            }
            stats += self.update_views(graph, usize::MAX);
            let postponed = stats.postponed;
            let progress = !stats.is_empty();
            total += stats;
            total.postponed = postponed;
            if !progress || !self.has_scheduled_updates() {
                break;
            }
        }
        self.report(total);
        total
    }

    fn report(&mut self, stats: FlushStats) {
        if stats.is_empty() {
            return;
        }
        info!(
            updated = stats.updated,
            postponed = stats.postponed,
            mounted = stats.mounted,
            unmounted = stats.unmounted,
            failed = stats.failed;
            "Render done"
        );
        self.events.push(PaperEvent::RenderDone(stats));
    }

    fn process_requests(&mut self, graph: &Graph) -> FlushStats {
        let requests = self.scheduler.borrow_mut().drain();
        let mut stats = FlushStats::default();
        for request in requests {
            match request {
                Request::Mount(id) => {
                    let Some(cell) = graph.cell(id) else {
                        continue;
                    };
                    if !self.views.contains_key(&id) && self.is_visible(cell) && self.mount(cell) {
                        stats.mounted += 1;
                    }
                }
                Request::Unmount(id) => {
                    if self.unmount(id) {
                        stats.unmounted += 1;
                    }
                }
                Request::Update(id, flags) => {
                    let Some(view) = self.views.get_mut(&id) else {
                        continue;
                    };
                    if flags.contains(UpdateFlags::INSERT) {
                        if let Some(cell) = graph.cell(id) {
                            view.set_z(cell.z());
                        }
                    }
                    view.request(flags);
                }
                Request::Reset => {
                    let ids: Vec<Id> = self.views.keys().copied().collect();
                    for id in ids {
                        if self.unmount(id) {
                            stats.unmounted += 1;
                        }
                    }
                    for cell in graph.cells() {
                        if self.is_visible(cell) && self.mount(cell) {
                            stats.mounted += 1;
                        }
                    }
                }
            }
        }
        stats
    }

    /// Creates the view of `cell`. It is drawn and inserted by its first
    /// update.
    fn mount(&mut self, cell: &Cell) -> bool {
        let order = self.next_order;
        match CellView::new(&mut self.scene, cell, order) {
            Ok(view) => {
                trace!(cell_id = cell.id().to_string(), order; "Mounting view");
                self.next_order += 1;
                self.nodes.insert(view.root(), cell.id());
                self.views.insert(cell.id(), view);
                true
            }
            Err(error) => {
                self.fail(cell.id(), error);
                false
            }
        }
    }

    fn unmount(&mut self, id: Id) -> bool {
        let Some(mut view) = self.views.shift_remove(&id) else {
            return false;
        };
        trace!(cell_id = id.to_string(); "Unmounting view");
        self.nodes.remove(&view.root());
        if let Err(error) = view.unmount(&mut self.scene) {
            self.fail(id, error);
        }
        if let Err(error) = self.remove_tools(id) {
            self.fail(id, error);
        }
        true
    }

    fn fail(&mut self, id: Id, error: TesseraError) {
        warn!(cell_id = id.to_string(), error:%; "View update failed");
        self.events.push(PaperEvent::Error { id, error });
    }

    /// Dirty views in update order.
    fn dirty_views(&self) -> Vec<Id> {
        let mut dirty: Vec<&CellView> = self
            .views
            .values()
            .filter(|view| !view.flags().is_empty())
            .collect();
        dirty.sort_by_key(|view| {
            let priority = match view.kind() {
                CellKind::Element => 0,
                CellKind::Link => 1,
            };
            (priority, view.z(), view.order())
        });
        dirty.into_iter().map(CellView::id).collect()
    }

    fn update_views(&mut self, graph: &Graph, limit: usize) -> FlushStats {
        let mut stats = FlushStats::default();
        for id in self.dirty_views() {
            if stats.updated + stats.failed >= limit {
                break;
            }
            match self.update_view(graph, id) {
                Outcome::Updated => stats.updated += 1,
                Outcome::Postponed => stats.postponed += 1,
                Outcome::Failed => stats.failed += 1,
                Outcome::Skipped => {}
            }
        }
        stats
    }

    fn update_view(&mut self, graph: &Graph, id: Id) -> Outcome {
        let Some(cell) = graph.cell(id) else {
            // Removed from the graph; the unmount request is still queued
            self.unmount(id);
            return Outcome::Skipped;
        };
        let Some(flags) = self.views.get(&id).map(CellView::flags) else {
            return Outcome::Skipped;
        };
        if flags.is_empty() {
            return Outcome::Skipped;
        }
        let result = match cell.kind() {
            CellKind::Element => self.update_element_view(graph, cell, flags),
            CellKind::Link => self.update_link_view(graph, cell, flags),
        };
        match result {
            Ok(true) => Outcome::Updated,
            Ok(false) => Outcome::Postponed,
            Err(error) => {
                self.fail(id, error);
                Outcome::Failed
            }
        }
    }

    fn update_element_view(&mut self, graph: &Graph, cell: &Cell, flags: UpdateFlags) -> Result<bool, TesseraError> {
        let id = cell.id();
        let Some(view) = self.views.get_mut(&id) else {
            return Ok(false);
        };
        view.take_flags();
        view.update_element(&mut self.scene, cell, flags)?;
        if flags.contains(UpdateFlags::INSERT) {
            self.insert_view(id)?;
        }
        if flags.intersects(UpdateFlags::RENDER | UpdateFlags::PORTS) {
            self.reapply_highlights(id)?;
        }
        let geometry = UpdateFlags::RENDER
            | UpdateFlags::UPDATE
            | UpdateFlags::TRANSLATE
            | UpdateFlags::RESIZE
            | UpdateFlags::ROTATE
            | UpdateFlags::PORTS;
        if flags.intersects(geometry) {
            self.request_connected_links(graph, id);
        }
        self.render_tools(cell)?;
        Ok(true)
    }

    fn update_link_view(&mut self, graph: &Graph, cell: &Cell, flags: UpdateFlags) -> Result<bool, TesseraError> {
        let id = cell.id();
        let geometry = UpdateFlags::RENDER
            | UpdateFlags::UPDATE
            | UpdateFlags::SOURCE
            | UpdateFlags::TARGET
            | UpdateFlags::LABELS;
        let needs_geometry = flags.intersects(geometry);
        let resolution = if needs_geometry {
            let resolver = Resolver::new(
                &self.scene,
                &self.views,
                graph,
                &self.strategies,
                &self.config,
                self.layers.viewport(),
            );
            match resolver.resolve(cell) {
                Ok(Resolution::Postponed(waiting)) => {
                    trace!(cell_id = id.to_string(), waiting = waiting.to_string(); "Link postponed");
                    return Ok(false);
                }
                Ok(Resolution::Ready { geometry, warnings }) => Ok(Some((geometry, warnings))),
                Err(error) => Err(error),
            }
        } else {
            Ok(None)
        };

        let labels_layer = self.config.labels_layer().then(|| self.layers.labels());
        let Some(view) = self.views.get_mut(&id) else {
            return Ok(false);
        };
        view.take_flags();
        if flags.contains(UpdateFlags::RENDER) {
            view.render_link(&mut self.scene, cell)?;
        }
        if flags.contains(UpdateFlags::INSERT) {
            self.insert_view(id)?;
        }
        if let Some((geometry, warnings)) = resolution? {
            for error in warnings {
                debug!(cell_id = id.to_string(), error:%; "Link resolved with a fallback");
                self.events.push(PaperEvent::Warning { id, error });
            }
            if let Some(view) = self.views.get_mut(&id) {
                view.apply_link(&mut self.scene, cell, geometry, flags, &mut self.markers, labels_layer)?;
            }
        }
        if flags.contains(UpdateFlags::RENDER) {
            self.reapply_highlights(id)?;
        }
        if needs_geometry {
            self.request_connected_links(graph, id);
        }
        self.render_tools(cell)?;
        Ok(true)
    }

    /// Marks the links attached to `id` for re-resolution.
    fn request_connected_links(&mut self, graph: &Graph, id: Id) {
        for link in graph.connected_links(id, LinkQuery::new()) {
            if link == id {
                continue;
            }
            if let Some(view) = self.views.get_mut(&link) {
                view.request(UpdateFlags::SOURCE | UpdateFlags::TARGET);
            }
        }
    }

    /// Puts a view root into the cells layer at its paint position.
    fn insert_view(&mut self, id: Id) -> Result<(), TesseraError> {
        let Some(view) = self.views.get(&id) else {
            return Ok(());
        };
        let (root, key) = (view.root(), (view.z(), view.order()));
        let layer = self.layers.cells();
        match self.config.sorting() {
            Sorting::None => {
                if self.scene.parent(root) != Some(layer) {
                    self.scene.append_child(layer, root)?;
                }
            }
            Sorting::Approx => {
                let children = self.scene.children(layer);
                let index = children
                    .iter()
                    .position(|node| {
                        *node != root
                            && self
                                .nodes
                                .get(node)
                                .and_then(|other| self.views.get(other))
                                .is_some_and(|other| (other.z(), other.order()) > key)
                    })
                    .unwrap_or(children.len());
                self.scene.insert_at(layer, root, index)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Index at which a vertex through `p` would be inserted into the
    /// vertices of link `id`, following the rendered path.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] when the link has no view and
    /// [`TesseraError::WrongKind`] for elements.
    pub fn link_vertex_index(&self, graph: &Graph, id: impl Into<Id>, p: Point) -> Result<usize, TesseraError> {
        let id = id.into();
        let cell = graph.cell(id).ok_or(TesseraError::UnknownCell(id))?;
        if !cell.is_link() {
            return Err(TesseraError::WrongKind {
                id,
                expected: CellKind::Link,
            });
        }
        let view = self.views.get(&id).ok_or(TesseraError::UnknownCell(id))?;
        let vertices = cell.vertices();
        let Some(path) = view.connection() else {
            return Ok(vertices.len());
        };
        let length = path.closest_point_length(p, DEFAULT_PRECISION);
        let index = vertices
            .iter()
            .take_while(|vertex| path.closest_point_length(**vertex, DEFAULT_PRECISION) <= length)
            .count();
        Ok(index)
    }
}
