//! Tessera - A graph model and incremental renderer for interactive diagrams.
//!
//! Cells (elements and links) live in a [`model::Graph`]. A
//! [`paper::Paper`] listens to the graph and keeps a retained scene in sync,
//! re-doing only the work each change needs. Link geometry is resolved
//! through pluggable anchors, connection points, routers and connectors.
//!
//! # Overview
//!
//! - [`Diagram`] - A graph and its paper, flushed together
//! - [`model`] - Cells, the graph, ports, events and the type registry
//! - [`view`] - Per-cell views and `attrs` application
//! - [`paper`] - Scheduling, layers, viewport, hit-testing, highlights and tools
//! - [`strategy`] - Named geometry strategies and highlighters
//! - [`config`] - Deserializable settings

pub mod config;
pub mod model;
pub mod paper;
pub mod strategy;
pub mod view;

mod diagram;
mod error;

pub use tessera_core::{color, geometry, identifier, scene};

pub use diagram::Diagram;
pub use error::TesseraError;
