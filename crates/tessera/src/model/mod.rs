//! The diagram model: cells, links, ports, the type registry and the
//! [`Graph`] that owns them.
//!
//! # Overview
//!
//! - [`Cell`] - An element or a link, an id plus an attribute bag
//! - [`Element`] / [`Link`] - Builders for the two cell kinds
//! - [`Graph`] - Storage, adjacency, embedding, batching and events
//! - [`CellRegistry`] - Cell types and their default attributes
//! - [`GraphEvent`] - What listeners registered with [`Graph::on`] receive

mod cell;
mod element;
mod event;
mod graph;
mod link;
mod port;
mod query;
mod registry;
mod serialize;

pub use cell::{Cell, CellKind};
pub use element::Element;
pub use event::{GraphEvent, ListenerId, Options};
pub use graph::Graph;
pub use link::{CellEnd, Endpoint, Label, LabelOffset, LabelPosition, Link};
pub use port::{Port, PortGroup, PortPlacement, Ports};
pub use query::{EmbedQuery, LinkQuery};
pub use registry::CellRegistry;

pub(crate) use cell::{point_from_value, point_to_value};
pub(crate) use registry::merge_into;
