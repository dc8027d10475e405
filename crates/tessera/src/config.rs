//! Configuration types for Tessera diagrams.
//!
//! All types implement [`serde::Deserialize`] so they can be loaded from
//! external sources such as the CLI's TOML file.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining paper, graph and style settings.
//! - [`PaperConfig`] - Scheduling, canvas size, paint ordering and default strategies.
//! - [`GraphConfig`] - Removal policies of the model.
//! - [`StyleConfig`] - Visual styling options such as background color.
//!
//! # Example
//!
//! ```
//! # use tessera::config::AppConfig;
//! let config = AppConfig::default();
//! assert!(config.style().background_color().is_ok());
//! assert_eq!(config.paper().batch_size(), 1000);
//! ```

use serde::Deserialize;

use tessera_core::color::Color;

use crate::strategy::StrategyRef;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    paper: PaperConfig,

    #[serde(default)]
    graph: GraphConfig,

    #[serde(default)]
    style: StyleConfig,
}

impl AppConfig {
    /// Creates a new [`AppConfig`] from its sections.
    pub fn new(paper: PaperConfig, graph: GraphConfig, style: StyleConfig) -> Self {
        Self {
            paper,
            graph,
            style,
        }
    }

    pub fn paper(&self) -> &PaperConfig {
        &self.paper
    }

    pub fn graph(&self) -> &GraphConfig {
        &self.graph
    }

    pub fn style(&self) -> &StyleConfig {
        &self.style
    }
}

/// How views are inserted into the cells layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sorting {
    /// Views are inserted before the first sibling with a greater `z`.
    #[default]
    Approx,
    /// Views are appended in the order they are mounted.
    None,
}

/// Paper settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    /// Defer rendering to [`Paper::tick`](crate::paper::Paper::tick).
    #[serde(rename = "async")]
    async_mode: bool,

    /// Views updated per tick in async mode.
    batch_size: usize,

    width: f64,
    height: f64,
    sorting: Sorting,

    /// Start frozen; nothing renders until unfrozen.
    frozen: bool,

    /// Render link labels in their own layer above the cells.
    labels_layer: bool,

    router: StrategyRef,
    connector: StrategyRef,
    anchor: StrategyRef,
    link_anchor: StrategyRef,
    connection_point: StrategyRef,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            async_mode: false,
            batch_size: 1000,
            width: 800.0,
            height: 600.0,
            sorting: Sorting::Approx,
            frozen: false,
            labels_layer: false,
            router: StrategyRef::new("normal"),
            connector: StrategyRef::new("normal"),
            anchor: StrategyRef::new("center"),
            link_anchor: StrategyRef::new("connectionRatio"),
            connection_point: StrategyRef::new("boundary"),
        }
    }
}

impl PaperConfig {
    pub fn is_async(&self) -> bool {
        self.async_mode
    }

    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn sorting(&self) -> Sorting {
        self.sorting
    }

    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = sorting;
        self
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }

    pub fn labels_layer(&self) -> bool {
        self.labels_layer
    }

    pub fn with_labels_layer(mut self, labels_layer: bool) -> Self {
        self.labels_layer = labels_layer;
        self
    }

    pub fn router(&self) -> &StrategyRef {
        &self.router
    }

    pub fn connector(&self) -> &StrategyRef {
        &self.connector
    }

    pub fn anchor(&self) -> &StrategyRef {
        &self.anchor
    }

    pub fn link_anchor(&self) -> &StrategyRef {
        &self.link_anchor
    }

    pub fn connection_point(&self) -> &StrategyRef {
        &self.connection_point
    }

    pub fn with_router(mut self, router: StrategyRef) -> Self {
        self.router = router;
        self
    }

    pub fn with_connector(mut self, connector: StrategyRef) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_anchor(mut self, anchor: StrategyRef) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_connection_point(mut self, connection_point: StrategyRef) -> Self {
        self.connection_point = connection_point;
        self
    }
}

/// What happens to a link whose end cell (or port) is removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DanglingLinks {
    /// The link is removed with the cell.
    #[default]
    Remove,
    /// The end becomes the point the cell's center was at.
    Disconnect,
}

/// Model policies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    dangling_links: DanglingLinks,

    /// Remove embedded cells with their parent instead of releasing them.
    cascade_embeds: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            dangling_links: DanglingLinks::Remove,
            cascade_embeds: true,
        }
    }
}

impl GraphConfig {
    pub fn new(dangling_links: DanglingLinks, cascade_embeds: bool) -> Self {
        Self {
            dangling_links,
            cascade_embeds,
        }
    }

    pub fn dangling_links(&self) -> DanglingLinks {
        self.dangling_links
    }

    pub fn cascade_embeds(&self) -> bool {
        self.cascade_embeds
    }
}

/// Visual styling configuration for rendered diagrams.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct StyleConfig {
    /// Background [`Color`] painted behind the back layer, as a color string.
    #[serde(default)]
    background_color: Option<String>,
}

impl StyleConfig {
    pub fn new(background_color: Option<String>) -> Self {
        Self { background_color }
    }

    /// Returns the parsed background [`Color`], or `None` if no color is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured color string cannot be parsed
    /// into a valid [`Color`].
    pub fn background_color(&self) -> Result<Option<Color>, String> {
        self.background_color
            .as_ref()
            .map(|color| Color::new(color))
            .transpose()
            .map_err(|err| format!("Invalid background color in config: {err}"))
    }
}
