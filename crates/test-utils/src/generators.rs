//! Bitmap generators with predictable pixel patterns.
//!
//! These generators create images whose pixels can be checked without
//! reference files.

use compositor::TileImage;
use image::{Rgba, RgbaImage};
use map_common::{BoundingBox, Tile};

/// Creates a single-colour bitmap.
pub fn solid_image(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(width, height, Rgba(color))
}

/// Creates a tile image filled with one colour.
pub fn solid_tile(tile: Tile, width: u32, height: u32, color: [u8; 4]) -> TileImage {
    TileImage::new(tile, solid_image(width, height, color))
}

/// Distinct opaque colour for a grid cell, so stitched output can be traced
/// back to the tile it came from.
pub fn cell_color(row: u32, col: u32) -> [u8; 4] {
    [
        (row.wrapping_mul(40).wrapping_add(20) % 256) as u8,
        (col.wrapping_mul(40).wrapping_add(20) % 256) as u8,
        128,
        255,
    ]
}

/// Creates a bitmap split into four solid quadrants.
///
/// Colours by quadrant: top-left red, top-right green, bottom-left blue,
/// bottom-right white.
pub fn quadrant_image(width: u32, height: u32) -> RgbaImage {
    let (half_w, half_h) = (width / 2, height / 2);
    RgbaImage::from_fn(width, height, |x, y| match (x < half_w, y < half_h) {
        (true, true) => Rgba([255, 0, 0, 255]),
        (false, true) => Rgba([0, 255, 0, 255]),
        (true, false) => Rgba([0, 0, 255, 255]),
        (false, false) => Rgba([255, 255, 255, 255]),
    })
}

/// Colour of the world position `(x, y)` inside `extent`.
///
/// Red grows west to east and green grows south to north, so any correctly
/// georeferenced rendering of the same extent shows the same gradient.
pub fn world_color(extent: &BoundingBox, x: f64, y: f64) -> Rgba<u8> {
    let fx = ((x - extent.min_x) / extent.width()).clamp(0.0, 1.0);
    let fy = ((y - extent.min_y) / extent.height()).clamp(0.0, 1.0);
    Rgba([(fx * 255.0).round() as u8, (fy * 255.0).round() as u8, 64, 255])
}

/// Renders `bbox` at `width × height` with the [`world_color`] gradient of
/// `extent`, sampling at pixel centres.
pub fn world_gradient(extent: &BoundingBox, bbox: &BoundingBox, width: u32, height: u32) -> RgbaImage {
    let px_w = bbox.width() / width as f64;
    let px_h = bbox.height() / height as f64;
    RgbaImage::from_fn(width, height, |px, py| {
        let x = bbox.min_x + (px as f64 + 0.5) * px_w;
        let y = bbox.max_y - (py as f64 + 0.5) * px_h;
        world_color(extent, x, y)
    })
}
