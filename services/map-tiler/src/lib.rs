//! Map tiler service library.
//!
//! Concrete per-tile map sources served through the caching layer. This
//! module exposes them for the binary and for tests.

pub mod sources;

pub use sources::{GradientSource, ImageFileSource};
