//! A graph and the paper rendering it, kept in step.

use log::{debug, info};
use serde_json::Value;

use crate::{
    config::AppConfig,
    error::TesseraError,
    model::{CellRegistry, Graph, Options},
    paper::{CullingFn, FlushStats, Paper, PaperEvent},
    strategy::{StrategyRef, StrategyRegistry},
};

/// Owns a [`Graph`] and the [`Paper`] attached to it.
///
/// Every mutation goes through [`Diagram::change`] or
/// [`Diagram::transaction`]; in sync mode the paper is flushed before they
/// return, unless it is frozen or a batch is still open.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use tessera::{Diagram, config::AppConfig, model::Options};
/// use tessera::geometry::Point;
///
/// let document = json!({
///     "cells": [{
///         "type": "standard.Rectangle",
///         "id": "a",
///         "position": { "x": 10, "y": 10 },
///         "size": { "width": 80, "height": 40 }
///     }]
/// });
/// let mut diagram = Diagram::from_json(&document, &AppConfig::default()).unwrap();
/// diagram
///     .change(|graph| graph.set_position("a", Point::new(20.0, 20.0), Options::new()))
///     .unwrap();
/// assert!(diagram.to_svg().contains("translate(20,20)"));
/// ```
#[derive(Debug)]
pub struct Diagram {
    graph: Graph,
    paper: Paper,
}

impl Diagram {
    /// An empty diagram with the standard cell types and strategies.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Config`] for an invalid style.
    pub fn new(config: &AppConfig) -> Result<Self, TesseraError> {
        Self::with_registries(CellRegistry::standard(), StrategyRegistry::standard(), config)
    }

    /// An empty diagram with custom registries.
    ///
    /// # Errors
    ///
    /// [`TesseraError::Config`] for an invalid style.
    pub fn with_registries(
        cells: CellRegistry,
        strategies: StrategyRegistry,
        config: &AppConfig,
    ) -> Result<Self, TesseraError> {
        let graph = Graph::with_config(cells, config.graph().clone());
        Self::attach(graph, strategies, config)
    }

    /// Loads a `{"cells": [...]}` document and renders it.
    ///
    /// # Errors
    ///
    /// Model errors of [`Graph::load_json`] and [`TesseraError::Config`].
    pub fn from_json(document: &Value, config: &AppConfig) -> Result<Self, TesseraError> {
        let mut graph = Graph::with_config(CellRegistry::standard(), config.graph().clone());
        graph.load_json(document, Options::new())?;
        Self::attach(graph, StrategyRegistry::standard(), config)
    }

    /// Parses and loads a JSON document. See [`Diagram::from_json`].
    ///
    /// # Errors
    ///
    /// [`TesseraError::Json`] for malformed text.
    pub fn from_json_str(text: &str, config: &AppConfig) -> Result<Self, TesseraError> {
        let document: Value = serde_json::from_str(text)?;
        Self::from_json(&document, config)
    }

    fn attach(mut graph: Graph, strategies: StrategyRegistry, config: &AppConfig) -> Result<Self, TesseraError> {
        let paper = Paper::with_options(&mut graph, config.paper().clone(), config.style(), strategies)?;
        info!(cells = graph.len(); "Diagram ready");
        Ok(Self { graph, paper })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn paper(&self) -> &Paper {
        &self.paper
    }

    /// The paper, for viewport, highlight and tool operations.
    pub fn paper_mut(&mut self) -> &mut Paper {
        &mut self.paper
    }

    /// Applies `f` to the graph, then flushes in sync mode.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns. The paper still picks up the changes made
    /// before the failure.
    pub fn change<T>(&mut self, f: impl FnOnce(&mut Graph) -> Result<T, TesseraError>) -> Result<T, TesseraError> {
        let result = f(&mut self.graph);
        self.settle();
        result
    }

    /// Runs `f` inside the batch `name`, then flushes in sync mode.
    ///
    /// # Errors
    ///
    /// Whatever `f` returns.
    pub fn transaction<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Graph) -> Result<T, TesseraError>,
    ) -> Result<T, TesseraError> {
        let result = self.graph.transaction(name, f);
        self.settle();
        result
    }

    fn settle(&mut self) {
        if self.paper.config().is_async() || self.paper.is_frozen() || self.graph.has_active_batch(None) {
            return;
        }
        self.paper.flush(&self.graph);
    }

    /// Applies everything pending, regardless of the async setting.
    pub fn flush(&mut self) -> FlushStats {
        self.paper.flush(&self.graph)
    }

    /// One scheduling turn.
    pub fn tick(&mut self) -> FlushStats {
        self.paper.tick(&self.graph)
    }

    /// Ticks until no work is left or a turn makes no progress (links
    /// waiting on ends that never render).
    pub fn run_until_idle(&mut self) -> FlushStats {
        let mut total = FlushStats::default();
        let mut turns = 0;
        while self.paper.has_scheduled_updates() && !self.paper.is_frozen() {
            let stats = self.paper.tick(&self.graph);
            turns += 1;
            if stats.is_empty() {
                break;
            }
            total += stats;
        }
        debug!(turns, updated = total.updated(); "Diagram idle");
        total
    }

    pub fn freeze(&mut self) {
        self.paper.freeze();
    }

    pub fn unfreeze(&mut self) -> FlushStats {
        self.paper.unfreeze(&self.graph)
    }

    /// Installs a culling predicate and applies it right away.
    pub fn set_culling(&mut self, culling: Option<CullingFn>) -> FlushStats {
        self.paper.set_culling(culling);
        self.check_viewport()
    }

    /// Re-evaluates culling; newly visible cells render in sync mode.
    pub fn check_viewport(&mut self) -> FlushStats {
        let mut stats = self.paper.check_viewport(&self.graph);
        if !self.paper.config().is_async() && !self.paper.is_frozen() {
            stats += self.paper.flush(&self.graph);
        }
        stats
    }

    /// Attaches tools to a view and draws them in sync mode.
    ///
    /// # Errors
    ///
    /// See [`Paper::add_tools`].
    pub fn add_tools(&mut self, id: &str, tools: &[StrategyRef]) -> Result<(), TesseraError> {
        self.paper.add_tools(id, tools)?;
        self.settle();
        Ok(())
    }

    /// See [`Paper::highlight`].
    ///
    /// # Errors
    ///
    /// See [`Paper::highlight`].
    pub fn highlight(
        &mut self,
        id: &str,
        selector: Option<&str>,
        highlighter: &StrategyRef,
        key: &str,
    ) -> Result<(), TesseraError> {
        self.paper.highlight(id, selector, highlighter, key)
    }

    /// See [`Paper::unhighlight`].
    ///
    /// # Errors
    ///
    /// Propagates scene errors.
    pub fn unhighlight(&mut self, id: &str, key: &str) -> Result<bool, TesseraError> {
        self.paper.unhighlight(id, key)
    }

    pub fn drain_events(&mut self) -> Vec<PaperEvent> {
        self.paper.drain_events()
    }

    pub fn to_svg(&self) -> String {
        self.paper.to_svg()
    }

    pub fn to_json(&self) -> Value {
        self.graph.to_json()
    }

    /// Tears the paper down and hands the graph back.
    pub fn dispose(mut self) -> Graph {
        self.paper.dispose(&mut self.graph);
        self.graph
    }
}
