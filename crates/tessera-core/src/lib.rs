//! Tessera Core Types
//!
//! This crate provides the foundational, framework-free pieces of the Tessera
//! diagramming engine:
//!
//! - **Identifiers**: String-interned identifiers ([`identifier::Id`])
//! - **Colors**: CSS color parsing ([`color::Color`])
//! - **Geometry**: Points, lines, rectangles, ellipses, paths, affine
//!   matrices and shape outlines ([`geometry`] module)
//! - **Scene**: A retained SVG-like drawable tree with markup expansion,
//!   hit-testing and SVG serialization ([`scene`] module)

pub mod color;
pub mod geometry;
pub mod identifier;
pub mod scene;
