//! Mosaic assembly of same-level tiles.

use std::borrow::Borrow;

use image::{imageops, RgbaImage};
use map_common::{BoundingBox, MapError, MapResult};
use tracing::debug;

use crate::TileImage;

/// Stitch same-size tiles of one zoom level into a single bitmap.
///
/// Each tile lands at pixel offset `((col - min_col) * w, (max_row - row) * h)`:
/// columns run left to right, and since rows grow northwards the highest row
/// is drawn at the top. Arrival order does not matter. Cells with no tile in
/// the input stay transparent.
///
/// Fails with [`MapError::EmptyStitch`] for an empty input and
/// [`MapError::MismatchedTileSizes`] when tile bitmaps differ in size.
pub fn stitch<T>(tiles: &[T]) -> MapResult<RgbaImage>
where
    T: Borrow<TileImage>,
{
    let first = tiles.first().map(as_tile_image).ok_or(MapError::EmptyStitch)?;
    let (w, h) = first.dimensions();

    let mut min_col = u32::MAX;
    let mut max_col = 0;
    let mut min_row = u32::MAX;
    let mut max_row = 0;
    for tile_image in tiles.iter().map(as_tile_image) {
        if tile_image.dimensions() != (w, h) {
            return Err(MapError::MismatchedTileSizes {
                expected: (w, h),
                found: tile_image.dimensions(),
            });
        }
        let tile = &tile_image.tile;
        min_col = min_col.min(tile.col);
        max_col = max_col.max(tile.col);
        min_row = min_row.min(tile.row);
        max_row = max_row.max(tile.row);
    }

    let cols = max_col - min_col + 1;
    let rows = max_row - min_row + 1;
    let mut mosaic = RgbaImage::new(cols * w, rows * h);

    for tile_image in tiles.iter().map(as_tile_image) {
        let x = (tile_image.tile.col - min_col) as i64 * w as i64;
        let y = (max_row - tile_image.tile.row) as i64 * h as i64;
        imageops::replace(&mut mosaic, &tile_image.image, x, y);
    }

    debug!(
        tiles = tiles.len(),
        cols = cols,
        rows = rows,
        width = mosaic.width(),
        height = mosaic.height(),
        "Stitched tiles"
    );

    Ok(mosaic)
}

/// Bounding box covering every tile in `tiles`, or `None` when empty.
pub fn union_bbox<T>(tiles: &[T]) -> Option<BoundingBox>
where
    T: Borrow<TileImage>,
{
    tiles
        .iter()
        .map(|t| as_tile_image(t).tile.bbox)
        .reduce(|acc, bbox| acc.union(&bbox))
}

fn as_tile_image<T: Borrow<TileImage>>(t: &T) -> &TileImage {
    t.borrow()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use map_common::Tile;

    fn solid(row: u32, col: u32, w: u32, h: u32, color: [u8; 4]) -> TileImage {
        let bbox = BoundingBox::new(
            col as f64 * 10.0,
            row as f64 * 10.0,
            (col + 1) as f64 * 10.0,
            (row + 1) as f64 * 10.0,
        );
        TileImage::new(
            Tile::new(bbox, row, col),
            RgbaImage::from_pixel(w, h, Rgba(color)),
        )
    }

    #[test]
    fn test_empty_input_fails() {
        let tiles: Vec<TileImage> = Vec::new();
        assert!(matches!(stitch(&tiles), Err(MapError::EmptyStitch)));
        assert!(union_bbox(&tiles).is_none());
    }

    #[test]
    fn test_single_tile_is_copied() {
        let tile = solid(3, 7, 4, 2, [9, 8, 7, 255]);
        let mosaic = stitch(&[tile.clone()]).unwrap();
        assert_eq!(mosaic, tile.image);
    }

    #[test]
    fn test_mismatched_sizes_rejected() {
        let tiles = [solid(0, 0, 4, 4, [0; 4]), solid(0, 1, 4, 5, [0; 4])];
        assert!(matches!(
            stitch(&tiles),
            Err(MapError::MismatchedTileSizes {
                expected: (4, 4),
                found: (4, 5)
            })
        ));
    }

    #[test]
    fn test_offsets_relative_to_minimum_indices() {
        // Tiles far from the grid origin still start at pixel (0, 0)
        let tiles = [
            solid(10, 20, 2, 2, [1, 0, 0, 255]),
            solid(10, 21, 2, 2, [2, 0, 0, 255]),
        ];
        let mosaic = stitch(&tiles).unwrap();

        assert_eq!(mosaic.dimensions(), (4, 2));
        assert_eq!(mosaic.get_pixel(0, 0)[0], 1);
        assert_eq!(mosaic.get_pixel(3, 1)[0], 2);
    }

    #[test]
    fn test_missing_cell_stays_transparent() {
        let tiles = [
            solid(0, 0, 2, 2, [1, 1, 1, 255]),
            solid(1, 1, 2, 2, [2, 2, 2, 255]),
        ];
        let mosaic = stitch(&tiles).unwrap();

        // (row 1, col 0) is top-left and was not supplied
        assert_eq!(*mosaic.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(mosaic.get_pixel(3, 0)[0], 2);
        assert_eq!(mosaic.get_pixel(0, 3)[0], 1);
    }

    #[test]
    fn test_union_bbox() {
        let tiles = vec![
            std::sync::Arc::new(solid(0, 0, 1, 1, [0; 4])),
            std::sync::Arc::new(solid(1, 2, 1, 1, [0; 4])),
        ];
        assert_eq!(
            union_bbox(&tiles),
            Some(BoundingBox::new(0.0, 0.0, 30.0, 20.0))
        );
    }
}
