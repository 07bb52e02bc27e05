//! Shared test utilities for the map tile cache workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A recording map source that counts and inspects tile renders
//! - Bitmap generators with verifiable pixel patterns
//! - Common extents and timestamps
//! - Tolerance-based assertions for coordinates and bitmaps
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, RecordingSource};
//! ```

pub mod assertions;
pub mod fixtures;
pub mod generators;
pub mod source;

// Re-export commonly used items at the crate root
pub use assertions::assert_images_close;
pub use generators::*;
pub use source::RecordingSource;
