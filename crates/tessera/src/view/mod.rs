//! Cell views: the rendered subtree of each cell.
//!
//! A [`CellView`] owns the scene nodes of one cell and the caches derived
//! from them. The paper decides when a view updates; the view decides how
//! little work the accumulated [`UpdateFlags`] require.
//!
//! # Overview
//!
//! - [`CellView`] - View state shared by elements and links
//! - [`UpdateFlags`] - Pending work of a view
//! - [`NodeCache`] - Node geometry memoized per view
//! - [`attributes`] - `attrs` application, `calc()` and markers

pub mod attributes;
mod cache;
pub(crate) mod calc;
mod cell_view;
mod element_view;
mod flags;
mod link_view;

pub use cache::NodeCache;
pub use cell_view::{CellView, ViewState};
pub use flags::UpdateFlags;
pub use link_view::LinkGeometry;

pub(crate) use cell_view::HighlightEntry;
pub(crate) use link_view::{Resolution, Resolver};
