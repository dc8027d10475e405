//! The [`Graph`]: cell storage, adjacency indices, embedding, batching and
//! change events.
//!
//! # Overview
//!
//! Cells are boxed and stored in an insertion-ordered map, so a reference
//! returned by [`Graph::cell`] keeps pointing at the same instance until the
//! cell is removed. Two adjacency indices map a cell id to the links whose
//! source (`outbound`) or target (`inbound`) references it.
//!
//! # Events
//!
//! Every effective mutation emits a [`GraphEvent`]. While a batch is active,
//! change events are coalesced per (cell, top-level attribute) and delivered
//! when the outermost batch stops. Listeners receive `&mut Graph` and may
//! mutate it; events raised meanwhile are queued per listener and delivered
//! once the running invocation returns.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    rc::Rc,
};

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};
use serde_json::Value;

use tessera_core::{
    geometry::{Point, Size, normalize_angle},
    identifier::Id,
    scene::MarkupNode,
};

use crate::{
    config::{DanglingLinks, GraphConfig},
    error::TesseraError,
    model::{
        Cell, CellKind, CellRegistry, EmbedQuery, Endpoint, GraphEvent, ListenerId, Options, Port,
        Ports,
        cell::{point_from_value, point_to_value, same_value},
    },
};

type Callback = Box<dyn FnMut(&mut Graph, &GraphEvent)>;

#[derive(Clone)]
struct ListenerEntry {
    id: ListenerId,
    callback: Rc<RefCell<Callback>>,
    queue: Rc<RefCell<VecDeque<GraphEvent>>>,
    dispatching: Rc<std::cell::Cell<bool>>,
}

#[derive(Debug, Clone)]
struct PendingChange {
    kind: CellKind,
    previous: Value,
    current: Value,
    options: Options,
}

/// A collection of cells with adjacency, embedding and change events.
pub struct Graph {
    registry: CellRegistry,
    config: GraphConfig,
    cells: IndexMap<Id, Box<Cell>>,
    outbound: HashMap<Id, IndexSet<Id>>,
    inbound: HashMap<Id, IndexSet<Id>>,
    listeners: Vec<ListenerEntry>,
    next_listener: u64,
    batches: IndexMap<String, usize>,
    pending: IndexMap<(Id, String), PendingChange>,
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("cells", &self.cells.len())
            .field("listeners", &self.listeners.len())
            .field("batches", &self.batches)
            .finish()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(CellRegistry::standard())
    }
}

impl Graph {
    pub fn new(registry: CellRegistry) -> Self {
        Self::with_config(registry, GraphConfig::default())
    }

    pub fn with_config(registry: CellRegistry, config: GraphConfig) -> Self {
        Self {
            registry,
            config,
            cells: IndexMap::new(),
            outbound: HashMap::new(),
            inbound: HashMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
            batches: IndexMap::new(),
            pending: IndexMap::new(),
        }
    }

    pub fn registry(&self) -> &CellRegistry {
        &self.registry
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// The cell with the given id. The returned instance is the same for the
    /// whole lifetime of the cell in this graph.
    pub fn cell(&self, id: impl Into<Id>) -> Option<&Cell> {
        self.cells.get(&id.into()).map(|cell| cell.as_ref())
    }

    pub fn contains(&self, id: impl Into<Id>) -> bool {
        self.cells.contains_key(&id.into())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All cells in paint order: by `z`, then by insertion.
    pub fn cells(&self) -> Vec<&Cell> {
        let mut cells: Vec<&Cell> = self.cells.values().map(|cell| cell.as_ref()).collect();
        cells.sort_by_key(|cell| cell.z());
        cells
    }

    pub fn elements(&self) -> Vec<&Cell> {
        self.cells().into_iter().filter(|cell| cell.is_element()).collect()
    }

    pub fn links(&self) -> Vec<&Cell> {
        self.cells().into_iter().filter(|cell| cell.is_link()).collect()
    }

    /// Position of the cell in insertion order.
    pub fn insertion_index(&self, id: Id) -> Option<usize> {
        self.cells.get_index_of(&id)
    }

    pub fn min_z(&self) -> i64 {
        self.cells.values().map(|cell| cell.z()).min().unwrap_or(0)
    }

    pub fn max_z(&self) -> i64 {
        self.cells.values().map(|cell| cell.z()).max().unwrap_or(0)
    }

    pub(crate) fn require(&self, id: Id) -> Result<&Cell, TesseraError> {
        self.cells
            .get(&id)
            .map(|cell| cell.as_ref())
            .ok_or(TesseraError::UnknownCell(id))
    }

    fn require_kind(&self, id: Id, kind: CellKind) -> Result<&Cell, TesseraError> {
        let cell = self.require(id)?;
        if cell.kind() != kind {
            return Err(TesseraError::WrongKind { id, expected: kind });
        }
        Ok(cell)
    }

    /// Links whose source references `id`.
    pub(crate) fn outbound_links(&self, id: Id) -> Vec<Id> {
        self.outbound
            .get(&id)
            .map(|links| links.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Links whose target references `id`.
    pub(crate) fn inbound_links(&self, id: Id) -> Vec<Id> {
        self.inbound
            .get(&id)
            .map(|links| links.iter().copied().collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Insertion
    // =========================================================================

    /// Adds one cell. See [`Graph::add_cells`].
    pub fn add_cell(&mut self, cell: Cell) -> Result<(), TesseraError> {
        self.add_cells(vec![cell], Options::default())
    }

    /// Adds cells, all or nothing.
    ///
    /// Type defaults are merged under each cell, then the whole set is
    /// validated: identifiers must be new, link ends and parents must
    /// reference a cell of the graph or of the set, port ids must be unique.
    /// `parent` and `embeds` must agree with each other and form no cycle.
    /// Cells without `z` are put in front of everything present.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::DuplicateIdentifier`],
    /// [`TesseraError::DanglingReference`],
    /// [`TesseraError::DuplicatePortIdentifier`],
    /// [`TesseraError::CyclicEmbedding`],
    /// [`TesseraError::InvalidAttribute`] or
    /// [`TesseraError::UnknownCellType`]; the graph is left untouched.
    pub fn add_cells(&mut self, cells: Vec<Cell>, options: Options) -> Result<(), TesseraError> {
        if cells.is_empty() {
            return Ok(());
        }
        let cells = self.prepare(cells, false)?;
        let many = cells.len() > 1;
        if many {
            self.start_batch_with("add", options.clone());
        }
        for cell in cells {
            self.insert(cell, &options);
        }
        if many {
            self.stop_batch_with("add", options);
        }
        Ok(())
    }

    /// Replaces every cell at once. Emits a single `reset` event.
    ///
    /// # Errors
    ///
    /// The same validation as [`Graph::add_cells`], against an empty graph.
    pub fn reset_cells(&mut self, cells: Vec<Cell>, options: Options) -> Result<(), TesseraError> {
        let cells = self.prepare(cells, true)?;
        self.cells.clear();
        self.outbound.clear();
        self.inbound.clear();
        self.pending.clear();
        for mut cell in cells {
            if !cell.has_z() {
                let z = self.max_z() + 1;
                cell.set("z", Value::from(z));
            }
            self.index_links(&cell);
            self.cells.insert(cell.id(), Box::new(cell));
        }
        info!(cells = self.cells.len(); "Graph reset");
        self.emit(GraphEvent::Reset { options });
        Ok(())
    }

    /// Applies defaults and validates a set of incoming cells.
    fn prepare(&self, mut cells: Vec<Cell>, replace: bool) -> Result<Vec<Cell>, TesseraError> {
        let mut incoming: HashMap<Id, usize> = HashMap::new();
        for (index, cell) in cells.iter_mut().enumerate() {
            self.registry.apply_defaults(cell)?;
            let id = cell.id();
            let clash = !replace && self.cells.contains_key(&id);
            if clash || incoming.insert(id, index).is_some() {
                return Err(TesseraError::DuplicateIdentifier(id));
            }
        }
        let lookup = |id: Id| {
            match incoming.get(&id) {
                Some(index) => cells.get(*index),
                None if !replace => self.cells.get(&id).map(|cell| cell.as_ref()),
                None => None,
            }
        };
        for cell in &cells {
            validate_ports(cell)?;
            if cell.is_link() {
                validate_endpoint(cell.id(), &cell.source(), &lookup)?;
                validate_endpoint(cell.id(), &cell.target(), &lookup)?;
            }
            if let Some(parent) = cell.parent() {
                if lookup(parent).is_none() {
                    return Err(TesseraError::UnknownCell(parent));
                }
            }
            for child in cell.embeds() {
                if lookup(child).is_none() {
                    return Err(TesseraError::UnknownCell(child));
                }
            }
        }
        for cell in &cells {
            check_embedding_agrees(cell, &lookup)?;
            check_parent_chain(cell, &lookup)?;
        }
        Ok(cells)
    }

    fn insert(&mut self, mut cell: Cell, options: &Options) {
        if !cell.has_z() {
            let z = self.max_z() + 1;
            cell.set("z", Value::from(z));
        }
        let id = cell.id();
        let kind = cell.kind();
        self.index_links(&cell);
        self.cells.insert(id, Box::new(cell));
        debug!(cell_id = id.to_string(), kind = kind.as_str(); "Cell added");
        self.emit(GraphEvent::Add {
            id,
            kind,
            options: options.clone(),
        });
    }

    fn index_links(&mut self, cell: &Cell) {
        if !cell.is_link() {
            return;
        }
        if let Some(source) = cell.source().cell_id() {
            self.outbound.entry(source).or_default().insert(cell.id());
        }
        if let Some(target) = cell.target().cell_id() {
            self.inbound.entry(target).or_default().insert(cell.id());
        }
    }

    fn unindex_links(&mut self, cell: &Cell) {
        if !cell.is_link() {
            return;
        }
        if let Some(source) = cell.source().cell_id() {
            if let Some(links) = self.outbound.get_mut(&source) {
                links.shift_remove(&cell.id());
            }
        }
        if let Some(target) = cell.target().cell_id() {
            if let Some(links) = self.inbound.get_mut(&target) {
                links.shift_remove(&cell.id());
            }
        }
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Removes a cell together with its embedded cells (unless cascading is
    /// disabled) and the links attached to any removed cell (or disconnects
    /// them, per [`GraphConfig::dangling_links`]).
    ///
    /// Every removed cell emits its own `remove` event. Returns the removed
    /// ids in removal order.
    ///
    /// # Errors
    ///
    /// Returns [`TesseraError::UnknownCell`] when `id` is not in the graph.
    pub fn remove_cell(&mut self, id: impl Into<Id>, options: Options) -> Result<Vec<Id>, TesseraError> {
        let id = id.into();
        self.require(id)?;
        let mut removed = Vec::new();
        self.start_batch_with("remove", options.clone());
        self.remove_recursive(id, &options, &mut removed);
        self.stop_batch_with("remove", options);
        Ok(removed)
    }

    /// Removes several cells. Unknown ids are skipped with a warning, as a
    /// cell may already be gone through a cascade.
    pub fn remove_cells(&mut self, ids: &[Id], options: Options) -> Vec<Id> {
        let mut removed = Vec::new();
        self.start_batch_with("remove", options.clone());
        for id in ids {
            if self.cells.contains_key(id) {
                self.remove_recursive(*id, &options, &mut removed);
            } else if !removed.contains(id) {
                warn!(cell_id = id.to_string(); "Skipping removal of unknown cell");
            }
        }
        self.stop_batch_with("remove", options);
        removed
    }

    /// Removes every cell, each with its own event.
    pub fn clear(&mut self, options: Options) {
        let ids: Vec<Id> = self.cells.keys().copied().collect();
        self.remove_cells(&ids, options);
    }

    fn remove_recursive(&mut self, id: Id, options: &Options, removed: &mut Vec<Id>) {
        let Some(cell) = self.cell(id) else {
            return;
        };
        let parent = cell.parent();
        let embeds = cell.embeds();

        if let Some(parent) = parent {
            if self.cells.contains_key(&parent) {
                self.detach_embed(parent, id, options);
            }
        }
        for child in embeds {
            if !self.cells.contains_key(&child) {
                continue;
            }
            if self.config.cascade_embeds() {
                self.remove_recursive(child, options, removed);
            } else {
                self.detach_embed(id, child, options);
            }
        }

        let mut attached: Vec<Id> = self.outbound_links(id);
        for link in self.inbound_links(id) {
            if !attached.contains(&link) {
                attached.push(link);
            }
        }
        for link in attached {
            if link == id {
                continue;
            }
            match self.config.dangling_links() {
                DanglingLinks::Remove => self.remove_recursive(link, options, removed),
                DanglingLinks::Disconnect => self.disconnect(link, id, None, options),
            }
        }

        self.flush_pending_for(id);
        let Some(cell) = self.cells.shift_remove(&id) else {
            return;
        };
        self.unindex_links(&cell);
        self.outbound.remove(&id);
        self.inbound.remove(&id);
        removed.push(id);
        debug!(cell_id = id.to_string(), kind = cell.kind().as_str(); "Cell removed");
        let kind = cell.kind();
        self.emit(GraphEvent::Remove {
            id,
            kind,
            cell,
            options: options.clone(),
        });
    }

    /// Replaces the ends of `link` that reference `cell` (and `port`, when
    /// given) with the point they were attached to.
    fn disconnect(&mut self, link: Id, cell: Id, port: Option<&str>, options: &Options) {
        let Some(link_cell) = self.cell(link) else {
            return;
        };
        let Some(target) = self.cell(cell) else {
            return;
        };
        let mut point = target.center();
        if let Some(port) = port {
            if let Some(placement) = target.ports().layout(&target.size_box()).get(port) {
                let center = target.bbox().center();
                point = placement
                    .position()
                    .offset(target.position().x(), target.position().y())
                    .rotate(center, target.angle());
            }
        }
        let mut updates = Vec::new();
        for key in ["source", "target"] {
            let end = Endpoint::from_value(link_cell.attribute(key));
            let Some(end) = end.as_cell() else {
                continue;
            };
            if end.id() == cell && (port.is_none() || end.port() == port) {
                updates.push(key);
            }
        }
        for key in updates {
            debug!(link_id = link.to_string(), end = key; "Disconnecting link end");
            self.write(link, key, point_to_value(point), options.clone());
        }
    }

    // =========================================================================
    // Batches
    // =========================================================================

    pub fn start_batch(&mut self, name: &str) {
        self.start_batch_with(name, Options::default());
    }

    pub fn stop_batch(&mut self, name: &str) {
        self.stop_batch_with(name, Options::default());
    }

    pub fn start_batch_with(&mut self, name: &str, options: Options) {
        *self.batches.entry(name.to_string()).or_insert(0) += 1;
        self.emit(GraphEvent::BatchStart {
            name: name.to_string(),
            options,
        });
    }

    /// Stops one level of the named batch. When no batch remains active the
    /// coalesced changes are delivered, then `batch:stop` is emitted.
    pub fn stop_batch_with(&mut self, name: &str, options: Options) {
        match self.batches.get_mut(name) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                self.batches.shift_remove(name);
            }
            None => {
                warn!(batch = name; "Stopping a batch that was not started");
            }
        }
        if self.batches.is_empty() {
            self.flush_pending();
        }
        self.emit(GraphEvent::BatchStop {
            name: name.to_string(),
            options,
        });
    }

    /// Whether the named batch (or any batch, for `None`) is active.
    pub fn has_active_batch(&self, name: Option<&str>) -> bool {
        match name {
            Some(name) => self.batches.get(name).is_some_and(|count| *count > 0),
            None => !self.batches.is_empty(),
        }
    }

    /// Runs `f` inside a named batch.
    pub fn transaction<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Graph) -> Result<T, TesseraError>,
    ) -> Result<T, TesseraError> {
        self.start_batch(name);
        let result = f(self);
        self.stop_batch(name);
        result
    }

    fn flush_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for ((id, key), change) in pending {
            self.emit_change(id, key, change);
        }
    }

    fn flush_pending_for(&mut self, id: Id) {
        let keys: Vec<(Id, String)> = self
            .pending
            .keys()
            .filter(|(cell, _)| *cell == id)
            .cloned()
            .collect();
        for key in keys {
            if let Some(change) = self.pending.shift_remove(&key) {
                self.emit_change(key.0, key.1, change);
            }
        }
    }

    fn emit_change(&mut self, id: Id, key: String, change: PendingChange) {
        if same_value(&change.previous, &change.current) {
            return;
        }
        self.emit(GraphEvent::Change {
            id,
            kind: change.kind,
            key,
            previous: change.previous,
            current: change.current,
            options: change.options,
        });
    }

    // =========================================================================
    // Attributes
    // =========================================================================

    /// Sets a top-level attribute.
    ///
    /// Writing the current value is a no-op and emits nothing.
    ///
    /// # Errors
    ///
    /// Rejects `id` and `type`, malformed well-known attributes, link ends
    /// that dangle and duplicate port ids. Nothing is written on error.
    pub fn set_attribute(
        &mut self,
        id: impl Into<Id>,
        key: &str,
        value: Value,
        options: Options,
    ) -> Result<(), TesseraError> {
        let id = id.into();
        let cell = self.require(id)?;
        let value = self.validate_attribute(cell, key, value)?;
        self.write(id, key, value, options);
        Ok(())
    }

    /// Sets a nested value by path (`attrs/body/fill` or `attrs.body.fill`).
    /// Emits `change:<top-level key>`.
    ///
    /// # Errors
    ///
    /// The errors of [`Graph::set_attribute`], plus
    /// [`TesseraError::InvalidAttribute`] for an empty path or one that
    /// crosses a non-object value.
    pub fn set_prop(
        &mut self,
        id: impl Into<Id>,
        path: &str,
        value: Value,
        options: Options,
    ) -> Result<(), TesseraError> {
        let id = id.into();
        let segments = super::cell::split_path(path);
        let Some((first, rest)) = segments.split_first() else {
            return Err(TesseraError::invalid_attribute(path, "empty property path"));
        };
        let cell = self.require(id)?;
        let mut top = cell
            .attribute(first)
            .cloned()
            .unwrap_or(Value::Object(Default::default()));
        let mut slot = &mut top;
        for segment in rest {
            if slot.is_null() {
                *slot = Value::Object(Default::default());
            }
            slot = match slot {
                Value::Object(map) => map
                    .entry(segment.to_string())
                    .or_insert(Value::Null),
                Value::Array(items) => {
                    let index = segment.parse::<usize>().map_err(|_| {
                        TesseraError::invalid_attribute(path, format!("`{segment}` is not an index"))
                    })?;
                    items.get_mut(index).ok_or_else(|| {
                        TesseraError::invalid_attribute(path, format!("index {index} is out of range"))
                    })?
                }
                _ => {
                    return Err(TesseraError::invalid_attribute(
                        path,
                        format!("`{segment}` crosses a non-object value"),
                    ));
                }
            };
        }
        *slot = value;
        self.set_attribute(id, first, top, options)
    }

    /// Removes a top-level attribute. Emits a change with `null` as the
    /// current value.
    ///
    /// # Errors
    ///
    /// Rejects `id` and `type`, and unknown cells.
    pub fn remove_attribute(
        &mut self,
        id: impl Into<Id>,
        key: &str,
        options: Options,
    ) -> Result<(), TesseraError> {
        let id = id.into();
        if matches!(key, "id" | "type") {
            return Err(TesseraError::invalid_attribute(key, "cannot be removed"));
        }
        self.require(id)?;
        self.erase(id, key, options);
        Ok(())
    }

    /// Removes `key` from an existing cell without validation.
    fn erase(&mut self, id: Id, key: &str, options: Options) {
        let Some(cell) = self.cells.get(&id) else {
            return;
        };
        if cell.attribute(key).is_none() {
            return;
        }
        let kind = cell.kind();
        let tracked = is_endpoint_key(kind, key);
        if tracked {
            let snapshot = cell.as_ref().clone();
            self.unindex_links(&snapshot);
        }
        let Some(cell) = self.cells.get_mut(&id) else {
            return;
        };
        let previous = cell.remove(key).unwrap_or(Value::Null);
        if tracked {
            let snapshot = cell.as_ref().clone();
            self.index_links(&snapshot);
        }
        self.record_change(id, kind, key, previous, Value::Null, options);
    }

    fn validate_attribute(&self, cell: &Cell, key: &str, value: Value) -> Result<Value, TesseraError> {
        let kind = cell.kind();
        match (kind, key) {
            (_, "id" | "type") => Err(TesseraError::invalid_attribute(key, "is immutable")),
            (_, "z") => {
                if value.is_number() {
                    Ok(value)
                } else {
                    Err(TesseraError::invalid_attribute(key, "must be a number"))
                }
            }
            (_, "markup") => {
                if !value.is_null() {
                    MarkupNode::from_value(&value)
                        .map_err(|err| TesseraError::invalid_attribute(key, err.to_string()))?;
                }
                Ok(value)
            }
            (_, "parent") => {
                match &value {
                    Value::Null => {}
                    Value::String(parent) => {
                        let parent = Id::new(parent);
                        self.require(parent)?;
                        self.check_acyclic(parent, cell.id())?;
                    }
                    _ => return Err(TesseraError::invalid_attribute(key, "must be a cell id")),
                }
                Ok(value)
            }
            (_, "embeds") => {
                let Some(ids) = value.as_array() else {
                    return Err(TesseraError::invalid_attribute(key, "must be an array of ids"));
                };
                for child in ids {
                    let Some(child) = child.as_str() else {
                        return Err(TesseraError::invalid_attribute(key, "must be an array of ids"));
                    };
                    let child = Id::new(child);
                    self.require(child)?;
                    self.check_acyclic(cell.id(), child)?;
                }
                Ok(value)
            }
            (CellKind::Element, "position") => {
                point_from_value(&value)
                    .ok_or_else(|| TesseraError::invalid_attribute(key, "expected {x, y}"))?;
                Ok(value)
            }
            (CellKind::Element, "size") => {
                let read = |name: &str| value.get(name).and_then(Value::as_f64);
                let (Some(width), Some(height)) = (read("width"), read("height")) else {
                    return Err(TesseraError::invalid_attribute(key, "expected {width, height}"));
                };
                Ok(size_value(Size::new(width.max(0.0), height.max(0.0))))
            }
            (CellKind::Element, "angle") => {
                let angle = value
                    .as_f64()
                    .ok_or_else(|| TesseraError::invalid_attribute(key, "must be a number"))?;
                Ok(Value::from(normalize_angle(angle)))
            }
            (CellKind::Element, "ports") => {
                let ports = Ports::from_value(&value)?;
                if let Some(port) = ports.duplicate_id() {
                    return Err(TesseraError::DuplicatePortIdentifier {
                        element: cell.id(),
                        port: port.to_string(),
                    });
                }
                Ok(value)
            }
            (CellKind::Link, "source" | "target") => {
                let end = Endpoint::from_value(Some(&value));
                let lookup = |id: Id| self.cell(id);
                validate_endpoint(cell.id(), &end, &lookup)?;
                Ok(value)
            }
            (CellKind::Link, "vertices") => {
                let valid = value
                    .as_array()
                    .is_some_and(|points| points.iter().all(|p| point_from_value(p).is_some()));
                if valid {
                    Ok(value)
                } else {
                    Err(TesseraError::invalid_attribute(key, "expected an array of {x, y}"))
                }
            }
            _ => Ok(value),
        }
    }

    /// Writes an already validated attribute and records the change.
    fn write(&mut self, id: Id, key: &str, value: Value, options: Options) {
        let Some(cell) = self.cells.get(&id) else {
            return;
        };
        if cell.attribute(key).is_some_and(|current| same_value(current, &value)) {
            return;
        }
        let kind = cell.kind();
        let tracked = is_endpoint_key(kind, key);
        if tracked {
            let snapshot = cell.as_ref().clone();
            self.unindex_links(&snapshot);
        }
        let Some(cell) = self.cells.get_mut(&id) else {
            return;
        };
        let previous = cell.set(key, value.clone()).unwrap_or(Value::Null);
        if tracked {
            let snapshot = cell.as_ref().clone();
            self.index_links(&snapshot);
        }
        self.record_change(id, kind, key, previous, value, options);
    }

    fn record_change(
        &mut self,
        id: Id,
        kind: CellKind,
        key: &str,
        previous: Value,
        current: Value,
        options: Options,
    ) {
        if options.is_silent() {
            return;
        }
        if self.batches.is_empty() {
            self.emit(GraphEvent::Change {
                id,
                kind,
                key: key.to_string(),
                previous,
                current,
                options,
            });
            return;
        }
        match self.pending.get_mut(&(id, key.to_string())) {
            Some(change) => {
                change.current = current;
                change.options = options;
            }
            None => {
                self.pending.insert(
                    (id, key.to_string()),
                    PendingChange {
                        kind,
                        previous,
                        current,
                        options,
                    },
                );
            }
        }
    }

    // =========================================================================
    // Geometry helpers
    // =========================================================================

    /// Moves an element to `position`.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] or [`TesseraError::WrongKind`].
    pub fn set_position(&mut self, id: impl Into<Id>, position: Point, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        self.require_kind(id, CellKind::Element)?;
        self.write(id, "position", point_to_value(position), options);
        Ok(())
    }

    /// Translates a cell and everything embedded in it. Links move their
    /// vertices and their point ends.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`].
    pub fn translate(&mut self, id: impl Into<Id>, dx: f64, dy: f64, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        self.require(id)?;
        if dx == 0.0 && dy == 0.0 {
            return Ok(());
        }
        self.start_batch_with("translate", options.clone());
        let mut moved = HashSet::new();
        self.translate_recursive(id, dx, dy, &options, &mut moved);
        self.stop_batch_with("translate", options);
        Ok(())
    }

    fn translate_recursive(&mut self, id: Id, dx: f64, dy: f64, options: &Options, moved: &mut HashSet<Id>) {
        if !moved.insert(id) {
            return;
        }
        let Some(cell) = self.cell(id) else {
            return;
        };
        let embeds = cell.embeds();
        match cell.kind() {
            CellKind::Element => {
                let position = cell.position().offset(dx, dy);
                self.write(id, "position", point_to_value(position), options.clone());
            }
            CellKind::Link => {
                let vertices: Vec<Value> = cell
                    .vertices()
                    .into_iter()
                    .map(|p| point_to_value(p.offset(dx, dy)))
                    .collect();
                let source = cell.source();
                let target = cell.target();
                if !vertices.is_empty() {
                    self.write(id, "vertices", Value::Array(vertices), options.clone());
                }
                if let Endpoint::Point(p) = source {
                    self.write(id, "source", point_to_value(p.offset(dx, dy)), options.clone());
                }
                if let Endpoint::Point(p) = target {
                    self.write(id, "target", point_to_value(p.offset(dx, dy)), options.clone());
                }
            }
        }
        for child in embeds {
            self.translate_recursive(child, dx, dy, options, moved);
        }
    }

    /// Resizes an element. Negative components are clamped to zero.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] or [`TesseraError::WrongKind`].
    pub fn resize(&mut self, id: impl Into<Id>, width: f64, height: f64, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        self.require_kind(id, CellKind::Element)?;
        let size = Size::new(width.max(0.0), height.max(0.0));
        self.write(id, "size", size_value(size), options);
        Ok(())
    }

    /// Rotates an element around its center, by `angle` degrees relative to
    /// the current angle, or to exactly `angle` when `absolute`.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] or [`TesseraError::WrongKind`].
    pub fn rotate(
        &mut self,
        id: impl Into<Id>,
        angle: f64,
        absolute: bool,
        options: Options,
    ) -> Result<(), TesseraError> {
        let id = id.into();
        let cell = self.require_kind(id, CellKind::Element)?;
        let angle = if absolute { angle } else { cell.angle() + angle };
        self.write(id, "angle", Value::from(normalize_angle(angle)), options);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TesseraError::WrongKind`] for elements and
    /// [`TesseraError::DanglingReference`] for a missing cell or port.
    pub fn set_source(&mut self, id: impl Into<Id>, end: impl Into<Endpoint>, options: Options) -> Result<(), TesseraError> {
        self.set_end(id.into(), "source", end.into(), options)
    }

    /// # Errors
    ///
    /// [`TesseraError::WrongKind`] for elements and
    /// [`TesseraError::DanglingReference`] for a missing cell or port.
    pub fn set_target(&mut self, id: impl Into<Id>, end: impl Into<Endpoint>, options: Options) -> Result<(), TesseraError> {
        self.set_end(id.into(), "target", end.into(), options)
    }

    fn set_end(&mut self, id: Id, key: &str, end: Endpoint, options: Options) -> Result<(), TesseraError> {
        self.require_kind(id, CellKind::Link)?;
        self.set_attribute(id, key, end.to_value(), options)
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] or [`TesseraError::WrongKind`].
    pub fn set_vertices(&mut self, id: impl Into<Id>, vertices: &[Point], options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        self.require_kind(id, CellKind::Link)?;
        let vertices = vertices.iter().map(|p| point_to_value(*p)).collect();
        self.write(id, "vertices", Value::Array(vertices), options);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`] or [`TesseraError::WrongKind`].
    pub fn set_labels(&mut self, id: impl Into<Id>, labels: Vec<Value>, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        self.require_kind(id, CellKind::Link)?;
        self.write(id, "labels", Value::Array(labels), options);
        Ok(())
    }

    /// Appends a port to an element.
    ///
    /// # Errors
    ///
    /// [`TesseraError::DuplicatePortIdentifier`] when the id is taken.
    pub fn add_port(&mut self, id: impl Into<Id>, port: Port, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        let cell = self.require_kind(id, CellKind::Element)?;
        let mut ports = cell.ports();
        if ports.item(port.id()).is_some() {
            return Err(TesseraError::DuplicatePortIdentifier {
                element: id,
                port: port.id().to_string(),
            });
        }
        ports.push(port);
        self.write(id, "ports", ports.to_value(), options);
        Ok(())
    }

    /// Removes a port. Links attached to it are removed or disconnected
    /// like links of a removed cell.
    ///
    /// # Errors
    ///
    /// [`TesseraError::InvalidAttribute`] when the element has no such port.
    pub fn remove_port(&mut self, id: impl Into<Id>, port: &str, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        let cell = self.require_kind(id, CellKind::Element)?;
        let mut ports = cell.ports();
        if ports.item(port).is_none() {
            return Err(TesseraError::invalid_attribute(
                "ports",
                format!("`{id}` has no port `{port}`"),
            ));
        }
        let mut attached: Vec<Id> = Vec::new();
        for link in self.outbound_links(id).into_iter().chain(self.inbound_links(id)) {
            let Some(link_cell) = self.cell(link) else {
                continue;
            };
            let uses_port = [link_cell.source(), link_cell.target()].iter().any(|end| {
                end.as_cell()
                    .is_some_and(|end| end.id() == id && end.port() == Some(port))
            });
            if uses_port && !attached.contains(&link) {
                attached.push(link);
            }
        }

        self.start_batch_with("remove-port", options.clone());
        for link in attached {
            match self.config.dangling_links() {
                DanglingLinks::Remove => {
                    let mut removed = Vec::new();
                    self.remove_recursive(link, &options, &mut removed);
                }
                DanglingLinks::Disconnect => self.disconnect(link, id, Some(port), &options),
            }
        }
        ports.remove(port);
        self.write(id, "ports", ports.to_value(), options.clone());
        self.stop_batch_with("remove-port", options);
        Ok(())
    }

    /// Translates every cell that is not embedded.
    pub fn translate_all(&mut self, dx: f64, dy: f64, options: Options) {
        if dx == 0.0 && dy == 0.0 {
            return;
        }
        let roots: Vec<Id> = self
            .cells
            .values()
            .filter(|cell| cell.parent().is_none())
            .map(|cell| cell.id())
            .collect();
        self.start_batch_with("translate", options.clone());
        let mut moved = HashSet::new();
        for id in roots {
            self.translate_recursive(id, dx, dy, &options, &mut moved);
        }
        self.stop_batch_with("translate", options);
    }

    // =========================================================================
    // Embedding and ordering
    // =========================================================================

    /// Embeds `child` into `parent`.
    ///
    /// # Errors
    ///
    /// [`TesseraError::CyclicEmbedding`] when `parent` is `child` or one of
    /// its descendants, [`TesseraError::AlreadyEmbedded`] when `child` has a
    /// parent already. Nothing is mutated on error.
    pub fn embed(&mut self, parent: impl Into<Id>, child: impl Into<Id>, options: Options) -> Result<(), TesseraError> {
        let parent = parent.into();
        let child = child.into();
        let parent_cell = self.require(parent)?;
        let child_cell = self.require(child)?;
        self.check_acyclic(parent, child)?;
        if let Some(existing) = child_cell.parent() {
            return Err(TesseraError::AlreadyEmbedded {
                parent: existing,
                child,
            });
        }
        let mut embeds: Vec<Value> = parent_cell
            .embeds()
            .into_iter()
            .map(|id| Value::String(id.to_string()))
            .collect();
        embeds.push(Value::String(child.to_string()));

        self.start_batch_with("embed", options.clone());
        self.write(child, "parent", Value::String(parent.to_string()), options.clone());
        self.write(parent, "embeds", Value::Array(embeds), options.clone());
        self.stop_batch_with("embed", options);
        Ok(())
    }

    /// Releases `child` from `parent`.
    ///
    /// # Errors
    ///
    /// [`TesseraError::InvalidAttribute`] when `child` is not embedded in
    /// `parent`.
    pub fn unembed(&mut self, parent: impl Into<Id>, child: impl Into<Id>, options: Options) -> Result<(), TesseraError> {
        let parent = parent.into();
        let child = child.into();
        self.require(parent)?;
        let child_cell = self.require(child)?;
        if child_cell.parent() != Some(parent) {
            return Err(TesseraError::invalid_attribute(
                "parent",
                format!("`{child}` is not embedded in `{parent}`"),
            ));
        }
        self.start_batch_with("unembed", options.clone());
        self.detach_embed(parent, child, &options);
        self.stop_batch_with("unembed", options);
        Ok(())
    }

    /// Rejects embedding `child` into `parent` when `parent` already sits
    /// below `child`, following either `parent` chains or `embeds` lists.
    fn check_acyclic(&self, parent: Id, child: Id) -> Result<(), TesseraError> {
        let below = parent == child
            || self.is_embedded_in(parent, child, true)
            || self
                .embedded_cells(child, EmbedQuery::new().with_deep(true))
                .contains(&parent);
        if below {
            return Err(TesseraError::CyclicEmbedding { parent, child });
        }
        Ok(())
    }

    fn detach_embed(&mut self, parent: Id, child: Id, options: &Options) {
        if let Some(parent_cell) = self.cell(parent) {
            let embeds: Vec<Value> = parent_cell
                .embeds()
                .into_iter()
                .filter(|id| *id != child)
                .map(|id| Value::String(id.to_string()))
                .collect();
            self.write(parent, "embeds", Value::Array(embeds), options.clone());
        }
        if self.cell(child).and_then(Cell::parent) == Some(parent) {
            self.erase(child, "parent", options.clone());
        }
    }

    /// Brings a cell (and with `deep`, its embedded cells) in front of every
    /// other cell. Embedded cells stay in front of their parent.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`].
    pub fn to_front(&mut self, id: impl Into<Id>, deep: bool, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        let cells = self.z_group(id, deep)?;
        let max_z = self
            .cells
            .values()
            .filter(|cell| !cells.contains(&cell.id()))
            .map(|cell| cell.z())
            .max();
        let Some(max_z) = max_z else {
            return Ok(());
        };
        let start = max_z + 1;
        self.apply_z(&cells, start, options);
        Ok(())
    }

    /// Sends a cell (and with `deep`, its embedded cells) behind every other
    /// cell. Embedded cells stay in front of their parent.
    ///
    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`].
    pub fn to_back(&mut self, id: impl Into<Id>, deep: bool, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        let cells = self.z_group(id, deep)?;
        let min_z = self
            .cells
            .values()
            .filter(|cell| !cells.contains(&cell.id()))
            .map(|cell| cell.z())
            .min();
        let Some(min_z) = min_z else {
            return Ok(());
        };
        let start = min_z - cells.len() as i64;
        self.apply_z(&cells, start, options);
        Ok(())
    }

    /// # Errors
    ///
    /// [`TesseraError::UnknownCell`].
    pub fn set_z(&mut self, id: impl Into<Id>, z: i64, options: Options) -> Result<(), TesseraError> {
        let id = id.into();
        self.require(id)?;
        self.write(id, "z", Value::from(z), options);
        Ok(())
    }

    fn z_group(&self, id: Id, deep: bool) -> Result<Vec<Id>, TesseraError> {
        self.require(id)?;
        let mut cells = vec![id];
        if deep {
            let query = EmbedQuery::new()
                .with_deep(true)
                .with_breadth_first(true)
                .with_sort_siblings(true);
            cells.extend(self.embedded_cells(id, query));
        }
        Ok(cells)
    }

    fn apply_z(&mut self, cells: &[Id], start: i64, options: Options) {
        self.start_batch_with("z", options.clone());
        for (index, id) in cells.iter().enumerate() {
            self.write(*id, "z", Value::from(start + index as i64), options.clone());
        }
        self.stop_batch_with("z", options);
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    /// Registers a listener for every event of this graph.
    pub fn on(&mut self, listener: impl FnMut(&mut Graph, &GraphEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push(ListenerEntry {
            id,
            callback: Rc::new(RefCell::new(Box::new(listener))),
            queue: Rc::new(RefCell::new(VecDeque::new())),
            dispatching: Rc::new(std::cell::Cell::new(false)),
        });
        id
    }

    /// Unregisters a listener. Returns whether it was registered.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|entry| entry.id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    fn emit(&mut self, event: GraphEvent) {
        if event.options().is_silent() {
            return;
        }
        let snapshot = self.listeners.clone();
        for entry in snapshot {
            if !self.listeners.iter().any(|listener| listener.id == entry.id) {
                continue;
            }
            entry.queue.borrow_mut().push_back(event.clone());
            if entry.dispatching.get() {
                // Delivered by the invocation already running
                continue;
            }
            entry.dispatching.set(true);
            loop {
                let next = entry.queue.borrow_mut().pop_front();
                let Some(next) = next else {
                    break;
                };
                let mut callback = entry.callback.borrow_mut();
                (&mut **callback)(self, &next);
            }
            entry.dispatching.set(false);
        }
    }
}

fn is_endpoint_key(kind: CellKind, key: &str) -> bool {
    kind == CellKind::Link && matches!(key, "source" | "target")
}

fn size_value(size: Size) -> Value {
    serde_json::json!({ "width": size.width(), "height": size.height() })
}

fn validate_ports(cell: &Cell) -> Result<(), TesseraError> {
    let Some(value) = cell.attribute("ports") else {
        return Ok(());
    };
    let ports = Ports::from_value(value)?;
    if let Some(port) = ports.duplicate_id() {
        return Err(TesseraError::DuplicatePortIdentifier {
            element: cell.id(),
            port: port.to_string(),
        });
    }
    Ok(())
}

/// A `parent` must list the cell in its `embeds`, and every cell in
/// `embeds` must name this cell as its `parent`.
fn check_embedding_agrees<'a>(
    cell: &Cell,
    lookup: &dyn Fn(Id) -> Option<&'a Cell>,
) -> Result<(), TesseraError> {
    let id = cell.id();
    if let Some(parent) = cell.parent() {
        let listed = lookup(parent).is_some_and(|parent| parent.embeds().contains(&id));
        if !listed {
            return Err(TesseraError::invalid_attribute(
                "parent",
                format!("`{parent}` does not embed `{id}`"),
            ));
        }
    }
    for child in cell.embeds() {
        if lookup(child).and_then(Cell::parent) != Some(id) {
            return Err(TesseraError::invalid_attribute(
                "embeds",
                format!("`{child}` does not name `{id}` as its parent"),
            ));
        }
    }
    Ok(())
}

/// Walks the `parent` chain of `cell` and fails if it comes back around.
fn check_parent_chain<'a>(
    cell: &Cell,
    lookup: &dyn Fn(Id) -> Option<&'a Cell>,
) -> Result<(), TesseraError> {
    let mut seen = HashSet::from([cell.id()]);
    let mut child = cell.id();
    let mut current = cell.parent();
    while let Some(parent) = current {
        if !seen.insert(parent) {
            return Err(TesseraError::CyclicEmbedding { parent, child });
        }
        child = parent;
        current = lookup(parent).and_then(Cell::parent);
    }
    Ok(())
}

fn validate_endpoint<'a>(
    link: Id,
    end: &Endpoint,
    lookup: &dyn Fn(Id) -> Option<&'a Cell>,
) -> Result<(), TesseraError> {
    let Some(end) = end.as_cell() else {
        return Ok(());
    };
    if end.id() == link {
        return Err(TesseraError::invalid_attribute(
            "source",
            format!("link `{link}` cannot reference itself"),
        ));
    }
    let Some(cell) = lookup(end.id()) else {
        return Err(TesseraError::DanglingReference {
            link,
            target: end.id().to_string(),
        });
    };
    if let Some(port) = end.port() {
        if !cell.has_port(port) {
            return Err(TesseraError::DanglingReference {
                link,
                target: format!("{}:{port}", end.id()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use serde_json::json;

    use super::*;
    use crate::model::{CellEnd, Element, Link};

    fn rect(id: &str, x: f64) -> Cell {
        Element::new("standard.Rectangle")
            .with_id(id)
            .with_position(Point::new(x, 0.0))
            .with_size(Size::new(50.0, 30.0))
            .build()
    }

    fn link(id: &str, source: &str, target: &str) -> Cell {
        Link::new("standard.Link")
            .with_id(id)
            .with_source(CellEnd::new(source))
            .with_target(CellEnd::new(target))
            .build()
    }

    fn recorder(graph: &mut Graph) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        graph.on(move |_, event| {
            let id = event.id().map(|id| id.to_string()).unwrap_or_default();
            sink.borrow_mut().push(format!("{}:{id}", event.name()));
        });
        log
    }

    #[test]
    fn test_add_assigns_increasing_z() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        graph.add_cell(rect("b", 0.0)).unwrap();
        assert_eq!(graph.cell("a").unwrap().z(), 1);
        assert_eq!(graph.cell("b").unwrap().z(), 2);
    }

    #[test]
    fn test_add_cells_is_all_or_nothing() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        let result = graph.add_cells(vec![rect("b", 0.0), rect("a", 0.0)], Options::new());
        assert!(matches!(result, Err(TesseraError::DuplicateIdentifier(id)) if id == "a"));
        assert!(!graph.contains("b"));

        let dangling = graph.add_cells(vec![rect("c", 0.0), link("l", "c", "missing")], Options::new());
        assert!(matches!(dangling, Err(TesseraError::DanglingReference { .. })));
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn test_links_may_reference_cells_of_the_same_set() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![link("l", "a", "b"), rect("a", 0.0), rect("b", 100.0)], Options::new())
            .unwrap();
        assert_eq!(graph.outbound_links(Id::new("a")), vec![Id::new("l")]);
        assert_eq!(graph.inbound_links(Id::new("b")), vec![Id::new("l")]);
    }

    #[test]
    fn test_set_attribute_emits_previous_value() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&changes);
        graph.on(move |_, event| {
            if let GraphEvent::Change { previous, current, .. } = event {
                sink.borrow_mut().push((previous.clone(), current.clone()));
            }
        });
        graph
            .set_position("a", Point::new(5.0, 5.0), Options::new())
            .unwrap();
        graph
            .set_position("a", Point::new(5.0, 5.0), Options::new())
            .unwrap();
        let changes = changes.borrow();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, json!({ "x": 0.0, "y": 0.0 }));
        assert_eq!(changes[0].1, json!({ "x": 5.0, "y": 5.0 }));
    }

    #[test]
    fn test_silent_suppresses_events() {
        let mut graph = Graph::default();
        let log = recorder(&mut graph);
        graph.add_cells(vec![rect("a", 0.0)], Options::silent()).unwrap();
        graph.set_position("a", Point::new(1.0, 1.0), Options::silent()).unwrap();
        assert!(log.borrow().is_empty());
        assert_eq!(graph.cell("a").unwrap().position(), Point::new(1.0, 1.0));
    }

    #[test]
    fn test_negative_size_is_clamped() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        graph.resize("a", -10.0, 20.0, Options::new()).unwrap();
        let size = graph.cell("a").unwrap().size();
        assert_eq!(size, Size::new(0.0, 20.0));
    }

    #[test]
    fn test_batch_drops_changes_that_revert() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        let log = recorder(&mut graph);
        graph.start_batch("drag");
        graph.set_position("a", Point::new(9.0, 9.0), Options::new()).unwrap();
        graph.set_position("a", Point::new(0.0, 0.0), Options::new()).unwrap();
        graph.stop_batch("drag");
        assert_eq!(*log.borrow(), vec!["batch:start:", "batch:stop:"]);
    }

    #[test]
    fn test_nested_batches_flush_at_outermost_stop() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        let log = recorder(&mut graph);
        graph.start_batch("outer");
        graph.start_batch("inner");
        graph.rotate("a", 45.0, true, Options::new()).unwrap();
        graph.stop_batch("inner");
        assert!(!log.borrow().iter().any(|e| e.starts_with("change")));
        assert!(graph.has_active_batch(Some("outer")));
        assert!(!graph.has_active_batch(Some("inner")));
        graph.stop_batch("outer");
        assert!(log.borrow().contains(&"change:angle:a".to_string()));
    }

    #[test]
    fn test_remove_cascades_to_links_and_embeds() {
        let mut graph = Graph::default();
        graph
            .add_cells(
                vec![rect("p", 0.0), rect("c", 10.0), rect("o", 100.0), link("l", "c", "o")],
                Options::new(),
            )
            .unwrap();
        graph.embed("p", "c", Options::new()).unwrap();
        let removed = graph.remove_cell("p", Options::new()).unwrap();
        assert_eq!(removed, vec![Id::new("l"), Id::new("c"), Id::new("p")]);
        assert!(graph.contains("o"));
        assert!(graph.inbound_links(Id::new("o")).is_empty());
    }

    #[test]
    fn test_unembed_clears_both_sides() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("p", 0.0), rect("c", 10.0)], Options::new())
            .unwrap();
        graph.embed("p", "c", Options::new()).unwrap();
        let log = recorder(&mut graph);

        graph.unembed("p", "c", Options::new()).unwrap();
        assert_eq!(graph.cell("c").unwrap().parent(), None);
        assert!(graph.cell("p").unwrap().embeds().is_empty());
        assert!(graph.cell("c").unwrap().attribute("parent").is_none());
        assert!(log.borrow().contains(&"change:parent:c".to_string()));
        assert!(log.borrow().contains(&"change:embeds:p".to_string()));

        assert!(matches!(
            graph.unembed("p", "c", Options::new()),
            Err(TesseraError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_disconnect_policy_orphans_links() {
        let config: GraphConfig = toml_like_config();
        let mut graph = Graph::with_config(CellRegistry::standard(), config);
        graph
            .add_cells(vec![rect("a", 0.0), rect("b", 100.0), link("l", "a", "b")], Options::new())
            .unwrap();
        graph.remove_cell("a", Options::new()).unwrap();
        let link = graph.cell("l").unwrap();
        assert_eq!(link.source(), Endpoint::Point(Point::new(25.0, 15.0)));
        assert!(graph.outbound_links(Id::new("a")).is_empty());
    }

    fn toml_like_config() -> GraphConfig {
        serde_json::from_value(json!({ "dangling_links": "disconnect" })).unwrap()
    }

    #[test]
    fn test_embed_rejects_cycles_without_mutation() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("a", 0.0), rect("b", 0.0), rect("c", 0.0)], Options::new())
            .unwrap();
        graph.embed("a", "b", Options::new()).unwrap();
        graph.embed("b", "c", Options::new()).unwrap();
        let before = graph.to_json();
        assert!(matches!(
            graph.embed("c", "a", Options::new()),
            Err(TesseraError::CyclicEmbedding { .. })
        ));
        assert!(matches!(
            graph.embed("a", "a", Options::new()),
            Err(TesseraError::CyclicEmbedding { .. })
        ));
        assert!(matches!(
            graph.embed("a", "c", Options::new()),
            Err(TesseraError::AlreadyEmbedded { .. })
        ));
        assert_eq!(graph.to_json(), before);
    }

    #[test]
    fn test_set_attribute_rejects_embedding_cycles() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("a", 0.0), rect("b", 0.0), rect("c", 0.0)], Options::new())
            .unwrap();
        graph.embed("a", "b", Options::new()).unwrap();
        graph.embed("b", "c", Options::new()).unwrap();
        let before = graph.to_json();

        for (id, key, value) in [
            ("a", "parent", json!("b")),
            ("a", "parent", json!("c")),
            ("a", "parent", json!("a")),
            ("c", "embeds", json!(["a"])),
            ("b", "embeds", json!(["c", "b"])),
        ] {
            let result = graph.set_attribute(id, key, value, Options::new());
            assert!(
                matches!(result, Err(TesseraError::CyclicEmbedding { .. })),
                "{id}.{key} was accepted"
            );
        }
        assert_eq!(graph.to_json(), before);
        assert!(!graph.is_embedded_in("a", "b", true));
        assert_eq!(graph.ancestors("c"), vec![Id::new("b"), Id::new("a")]);

        // Re-writing the current value stays allowed
        graph
            .set_attribute("c", "parent", json!("b"), Options::new())
            .unwrap();
        graph
            .set_attribute("a", "embeds", json!(["b"]), Options::new())
            .unwrap();
    }

    #[test]
    fn test_embeds_lists_cannot_loop_back() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("a", 0.0), rect("b", 0.0)], Options::new())
            .unwrap();
        graph
            .set_attribute("a", "embeds", json!(["b"]), Options::new())
            .unwrap();
        let result = graph.set_attribute("b", "embeds", json!(["a"]), Options::new());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));
        let result = graph.set_attribute("b", "parent", json!("b"), Options::new());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));
        assert!(graph.cell("b").unwrap().embeds().is_empty());
    }

    fn embedded(id: &str, parent: Option<&str>, embeds: &[&str]) -> Cell {
        let mut builder = Element::new("standard.Rectangle")
            .with_id(id)
            .with_size(Size::new(50.0, 30.0));
        if let Some(parent) = parent {
            builder = builder.with_attribute("parent", json!(parent));
        }
        if !embeds.is_empty() {
            builder = builder.with_attribute("embeds", json!(embeds));
        }
        builder.build()
    }

    #[test]
    fn test_load_rejects_cyclic_embedding() {
        let mut graph = Graph::default();
        graph.add_cell(rect("keep", 0.0)).unwrap();

        let pair = vec![
            embedded("a", Some("b"), &["b"]),
            embedded("b", Some("a"), &["a"]),
        ];
        let result = graph.reset_cells(pair.clone(), Options::new());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));
        let result = graph.add_cells(pair, Options::new());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));

        let own_parent = vec![embedded("a", Some("a"), &["a"])];
        let result = graph.add_cells(own_parent, Options::new());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));

        let ring = vec![
            embedded("a", Some("c"), &["b"]),
            embedded("b", Some("a"), &["c"]),
            embedded("c", Some("b"), &["a"]),
        ];
        let result = graph.reset_cells(ring, Options::new());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));

        assert_eq!(graph.len(), 1);
        assert!(graph.contains("keep"));
    }

    #[test]
    fn test_load_rejects_disagreeing_parent_and_embeds() {
        let mut graph = Graph::default();
        let orphan = vec![embedded("a", None, &[]), embedded("b", Some("a"), &[])];
        let result = graph.add_cells(orphan, Options::new());
        assert!(matches!(result, Err(TesseraError::InvalidAttribute { .. })));

        let unclaimed = vec![embedded("a", None, &["b"]), embedded("b", None, &[])];
        let result = graph.reset_cells(unclaimed, Options::new());
        assert!(matches!(result, Err(TesseraError::InvalidAttribute { .. })));
        assert!(graph.is_empty());

        let tree = vec![
            embedded("a", None, &["b"]),
            embedded("b", Some("a"), &["c"]),
            embedded("c", Some("b"), &[]),
        ];
        graph.reset_cells(tree, Options::new()).unwrap();
        assert_eq!(graph.ancestors("c"), vec![Id::new("b"), Id::new("a")]);
    }

    #[test]
    fn test_from_json_rejects_cyclic_embedding() {
        let document = json!({
            "cells": [
                { "id": "a", "type": "standard.Rectangle", "parent": "b", "embeds": ["b"] },
                { "id": "b", "type": "standard.Rectangle", "parent": "a", "embeds": ["a"] }
            ]
        });
        let result = Graph::from_json(&document, CellRegistry::default());
        assert!(matches!(result, Err(TesseraError::CyclicEmbedding { .. })));
    }

    #[test]
    fn test_translate_moves_embedded_cells() {
        let mut graph = Graph::default();
        graph.add_cells(vec![rect("p", 0.0), rect("c", 10.0)], Options::new()).unwrap();
        graph.embed("p", "c", Options::new()).unwrap();
        graph.translate("p", 5.0, 7.0, Options::new()).unwrap();
        assert_eq!(graph.cell("c").unwrap().position(), Point::new(15.0, 7.0));
    }

    #[test]
    fn test_to_front_and_back() {
        let mut graph = Graph::default();
        graph
            .add_cells(vec![rect("a", 0.0), rect("b", 0.0), rect("c", 0.0)], Options::new())
            .unwrap();
        graph.to_front("a", false, Options::new()).unwrap();
        let order: Vec<String> = graph.cells().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        graph.to_back("c", false, Options::new()).unwrap();
        let order: Vec<String> = graph.cells().iter().map(|c| c.id().to_string()).collect();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_ports_are_validated() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        graph.add_port("a", Port::new("in"), Options::new()).unwrap();
        assert!(matches!(
            graph.add_port("a", Port::new("in"), Options::new()),
            Err(TesseraError::DuplicatePortIdentifier { .. })
        ));
        let bad = json!({ "items": [ { "id": "x" }, { "id": "x" } ] });
        assert!(graph.set_attribute("a", "ports", bad, Options::new()).is_err());
    }

    #[test]
    fn test_remove_port_removes_attached_links() {
        let mut graph = Graph::default();
        graph.add_cells(vec![rect("a", 0.0), rect("b", 100.0)], Options::new()).unwrap();
        graph.add_port("a", Port::new("out"), Options::new()).unwrap();
        let attached = Link::new("link")
            .with_id("l")
            .with_source(CellEnd::new("a").with_port("out"))
            .with_target(CellEnd::new("b"))
            .build();
        graph.add_cell(attached).unwrap();
        graph.remove_port("a", "out", Options::new()).unwrap();
        assert!(!graph.contains("l"));
        assert!(!graph.cell("a").unwrap().has_port("out"));
    }

    #[test]
    fn test_set_prop_emits_top_level_change() {
        let mut graph = Graph::default();
        graph.add_cell(rect("a", 0.0)).unwrap();
        let log = recorder(&mut graph);
        graph
            .set_prop("a", "attrs/body/fill", json!("red"), Options::new())
            .unwrap();
        assert_eq!(*log.borrow(), vec!["change:attrs:a"]);
        assert_eq!(graph.cell("a").unwrap().prop("attrs.body.fill"), Some(&json!("red")));
        assert_eq!(
            graph.cell("a").unwrap().prop("attrs/body/stroke"),
            Some(&json!("#000000"))
        );
    }

    #[test]
    fn test_reentrant_listener_events_are_queued() {
        let mut graph = Graph::default();
        graph.add_cells(vec![rect("a", 0.0), rect("b", 0.0)], Options::new()).unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        graph.on(move |graph, event| {
            let GraphEvent::Change { id, .. } = event else {
                return;
            };
            sink.borrow_mut().push(format!("start:{id}"));
            if *id == "a" {
                graph
                    .set_position("b", Point::new(3.0, 3.0), Options::new())
                    .unwrap();
            }
            sink.borrow_mut().push(format!("end:{id}"));
        });
        graph.set_position("a", Point::new(1.0, 1.0), Options::new()).unwrap();
        assert_eq!(*seen.borrow(), vec!["start:a", "end:a", "start:b", "end:b"]);
    }

    #[test]
    fn test_off_detaches_listener() {
        let mut graph = Graph::default();
        let log = recorder(&mut graph);
        let second = graph.on(|_, _| {});
        assert!(graph.off(second));
        assert!(!graph.off(second));
        graph.add_cell(rect("a", 0.0)).unwrap();
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(graph.listener_count(), 1);
    }
}
