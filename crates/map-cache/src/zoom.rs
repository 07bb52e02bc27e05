//! Precomputed tile grids for every cached zoom level.

use map_common::{BoundingBox, MapError, MapResult, Tile};

/// Absorbs floating-point noise in `log2` of exact power-of-two ratios.
const LEVEL_EPSILON: f64 = 1e-9;

/// Most zoom levels an index may hold. Every level is precomputed, and the
/// finest one alone has `4^(levels - 1)` tiles, so 10 levels keep an index
/// at roughly 350k tiles per source.
pub const MAX_ZOOM_LEVELS: u32 = 10;

/// Reject level counts outside `1..=MAX_ZOOM_LEVELS`.
pub fn validate_level_count(number_of_levels: u32) -> MapResult<()> {
    if number_of_levels == 0 || number_of_levels > MAX_ZOOM_LEVELS {
        return Err(MapError::InvalidZoomLevels(number_of_levels));
    }
    Ok(())
}

/// Tile grids over a base extent, one per zoom level.
///
/// Level `L` splits the base extent into `2^L × 2^L` equal tiles. Rows grow
/// with Y and columns with X, so `(row 0, col 0)` is the south-west corner.
/// Tiles are stored row-major, which lets intersection queries compute the
/// candidate index range instead of scanning the whole level.
#[derive(Debug, Clone)]
pub struct ZoomLevelIndex {
    base: BoundingBox,
    levels: Vec<Vec<Tile>>,
}

impl ZoomLevelIndex {
    /// Build grids for levels `0..number_of_levels` over `base`.
    pub fn new(base: BoundingBox, number_of_levels: u32) -> MapResult<Self> {
        validate_level_count(number_of_levels)?;
        if !base.is_valid() {
            return Err(MapError::InvalidBbox(format!(
                "zoom index extent has no area: {}",
                base
            )));
        }

        let levels = (0..number_of_levels)
            .map(|level| build_level(&base, 1u32 << level))
            .collect();

        Ok(Self { base, levels })
    }

    pub fn base_bbox(&self) -> &BoundingBox {
        &self.base
    }

    /// Number of zoom levels in the index.
    pub fn levels(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Every tile of `level`, row-major from the south-west corner.
    /// Empty for levels beyond the index.
    pub fn tiles(&self, level: u32) -> &[Tile] {
        self.levels
            .get(level as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Tiles per side at `level`.
    pub fn tiles_per_side(&self, level: u32) -> u32 {
        1u32 << level
    }

    /// Map-unit width of one tile at `level`.
    pub fn tile_width(&self, level: u32) -> f64 {
        self.base.width() / self.tiles_per_side(level) as f64
    }

    /// Zoom level whose tiles best match the extent of `requested`.
    ///
    /// `floor(log2(base_width / requested_width))`, clamped to the available
    /// levels. Requests wider than the base use level 0; degenerate requests
    /// use the finest level.
    pub fn select_level(&self, requested: &BoundingBox) -> u32 {
        let max_level = self.levels() - 1;
        let ratio = self.base.width() / requested.width();
        if !ratio.is_finite() || ratio <= 0.0 {
            return max_level;
        }

        let level = (ratio.log2() + LEVEL_EPSILON).floor();
        if level <= 0.0 {
            0
        } else {
            (level as u32).min(max_level)
        }
    }

    /// Selected level plus every tile of it intersecting `requested`.
    ///
    /// Tiles that only touch the request along an edge are included. The
    /// list is empty when the request lies outside the base extent.
    pub fn intersecting_tiles(&self, requested: &BoundingBox) -> (u32, Vec<Tile>) {
        let level = self.select_level(requested);
        let n = self.tiles_per_side(level);
        let tiles = self.tiles(level);

        let tile_w = self.tile_width(level);
        let tile_h = self.base.height() / n as f64;

        // Candidate window widened by one tile; the exact test below decides
        let cols = index_range(
            requested.min_x - self.base.min_x,
            requested.max_x - self.base.min_x,
            tile_w,
            n,
        );
        let rows = index_range(
            requested.min_y - self.base.min_y,
            requested.max_y - self.base.min_y,
            tile_h,
            n,
        );

        let selected = match (cols, rows) {
            (Some((c0, c1)), Some((r0, r1))) => (r0..=r1)
                .flat_map(|row| (c0..=c1).map(move |col| (row * n + col) as usize))
                .filter_map(|idx| tiles.get(idx))
                .filter(|tile| tile.bbox.intersects(requested))
                .copied()
                .collect(),
            _ => Vec::new(),
        };

        (level, selected)
    }
}

fn build_level(base: &BoundingBox, n: u32) -> Vec<Tile> {
    let mut tiles = Vec::with_capacity((n * n) as usize);
    for row in 0..n {
        let min_y = edge(base.min_y, base.max_y, row, n);
        let max_y = edge(base.min_y, base.max_y, row + 1, n);
        for col in 0..n {
            let min_x = edge(base.min_x, base.max_x, col, n);
            let max_x = edge(base.min_x, base.max_x, col + 1, n);
            tiles.push(Tile::new(BoundingBox::new(min_x, min_y, max_x, max_y), row, col));
        }
    }
    tiles
}

/// Coordinate of grid line `i` of `n` between `min` and `max`.
///
/// Neighbouring tiles compute their shared edge with the same call, and the
/// outer lines are the base edges exactly, so each level partitions the base
/// extent with no gaps.
fn edge(min: f64, max: f64, i: u32, n: u32) -> f64 {
    if i == 0 {
        min
    } else if i == n {
        max
    } else {
        min + (max - min) * (i as f64 / n as f64)
    }
}

/// Inclusive index window (widened by one) covering offsets `lo..hi` from the
/// grid origin, or `None` when it misses the grid entirely.
fn index_range(lo: f64, hi: f64, step: f64, n: u32) -> Option<(u32, u32)> {
    let first = (lo / step).floor() - 1.0;
    let last = (hi / step).floor() + 1.0;
    if last < 0.0 || first >= n as f64 {
        return None;
    }
    let first = first.max(0.0) as u32;
    let last = (last as u32).min(n - 1);
    Some((first, last))
}
