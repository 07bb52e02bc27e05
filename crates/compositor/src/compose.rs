//! Crop and resample a stitched mosaic to a requested extent and size.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use map_common::{BoundingBox, MapError, MapResult};
use tracing::debug;

/// Tolerance (in pixels) absorbed before truncating crop coordinates, so
/// `255.9999999` from floating-point division still lands on pixel 256.
const PIXEL_EPSILON: f64 = 1e-6;

/// A fully transparent bitmap of the given size.
pub fn blank_map(width: u32, height: u32) -> RgbaImage {
    RgbaImage::new(width, height)
}

/// Crop `stitched` (covering `stitched_bbox`) to `requested` and resample the
/// crop to exactly `width × height`.
///
/// Pixels are assumed square: the pixel size comes from the X axis alone.
/// Any part of the crop window that falls outside the mosaic stays
/// transparent. When the crop already has the output size it is returned
/// as-is, otherwise it is resampled bilinearly.
///
/// Memory use is bounded by the mosaic and the output. Only the part of the
/// window that overlaps the mosaic is resampled, straight into its place on
/// the output canvas, so a request far wider than the mosaic never
/// materialises the full window.
pub fn compose_map(
    stitched: &RgbaImage,
    stitched_bbox: &BoundingBox,
    requested: &BoundingBox,
    width: u32,
    height: u32,
) -> MapResult<RgbaImage> {
    if width == 0 || height == 0 {
        return Err(MapError::invalid_parameter(
            "size",
            format!("output size must be non-zero, got {}x{}", width, height),
        ));
    }
    if stitched.width() == 0 || stitched.height() == 0 {
        return Err(MapError::invalid_parameter("stitched", "mosaic has no pixels"));
    }

    let pixel_size = stitched_bbox.width() / stitched.width() as f64;

    let window = Window {
        x: snap((requested.min_x - stitched_bbox.min_x) / pixel_size),
        y: snap((stitched_bbox.max_y - requested.max_y) / pixel_size),
        w: snap(requested.width() / pixel_size).max(1),
        h: snap(requested.height() / pixel_size).max(1),
    };

    debug!(
        crop_x = window.x,
        crop_y = window.y,
        crop_w = window.w,
        crop_h = window.h,
        out_w = width,
        out_h = height,
        "Compositing map"
    );

    let (mosaic_w, mosaic_h) = (stitched.width() as i64, stitched.height() as i64);
    let x0 = window.x.clamp(0, mosaic_w);
    let x1 = window.x.saturating_add(window.w).clamp(0, mosaic_w);
    let y0 = window.y.clamp(0, mosaic_h);
    let y1 = window.y.saturating_add(window.h).clamp(0, mosaic_h);

    if x0 >= x1 || y0 >= y1 {
        return Ok(blank_map(width, height));
    }

    let overlap = imageops::crop_imm(
        stitched,
        x0 as u32,
        y0 as u32,
        (x1 - x0) as u32,
        (y1 - y0) as u32,
    )
    .to_image();

    let inside = x0 == window.x && y0 == window.y && x1 - x0 == window.w && y1 - y0 == window.h;
    if inside {
        return Ok(fit(overlap, width, height));
    }

    // Where the overlap lands on the output, in output pixels
    let (dx0, dx1) = window.project_x(x0, x1, width);
    let (dy0, dy1) = window.project_y(y0, y1, height);

    let mut canvas = blank_map(width, height);
    let placed = fit(overlap, (dx1 - dx0).max(1) as u32, (dy1 - dy0).max(1) as u32);
    imageops::replace(&mut canvas, &placed, dx0, dy0);

    Ok(canvas)
}

fn snap(v: f64) -> i64 {
    (v + PIXEL_EPSILON).floor() as i64
}

/// Crop window in mosaic pixels; may extend past the mosaic on any side.
struct Window {
    x: i64,
    y: i64,
    w: i64,
    h: i64,
}

impl Window {
    fn project_x(&self, x0: i64, x1: i64, out: u32) -> (i64, i64) {
        project(x0.saturating_sub(self.x), x1.saturating_sub(self.x), self.w, out)
    }

    fn project_y(&self, y0: i64, y1: i64, out: u32) -> (i64, i64) {
        project(y0.saturating_sub(self.y), y1.saturating_sub(self.y), self.h, out)
    }
}

/// Scale the window-relative span `lo..hi` of a `len`-pixel window onto `out` pixels.
fn project(lo: i64, hi: i64, len: i64, out: u32) -> (i64, i64) {
    let scale = out as f64 / len as f64;
    let out = out as i64;
    let a = ((lo as f64 * scale).round() as i64).clamp(0, out);
    let b = ((hi as f64 * scale).round() as i64).clamp(a, out);
    (a, b)
}

/// Resample `image` to `width × height` unless it already has that size.
fn fit(image: RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        image
    } else {
        imageops::resize(&image, width, height, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// 100×100 image where each pixel encodes its own coordinates.
    fn coordinate_image() -> RgbaImage {
        RgbaImage::from_fn(100, 100, |x, y| Rgba([x as u8, y as u8, 0, 255]))
    }

    #[test]
    fn test_identity_crop_of_center() {
        let stitched = coordinate_image();
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            &BoundingBox::new(25.0, 25.0, 75.0, 75.0),
            50,
            50,
        )
        .unwrap();

        assert_eq!(out.dimensions(), (50, 50));
        let expected = imageops::crop_imm(&stitched, 25, 25, 50, 50).to_image();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_y_axis_is_flipped() {
        let stitched = coordinate_image();
        // Southern strip of the extent is the bottom of the bitmap
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            &BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            10,
            10,
        )
        .unwrap();

        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 90, 0, 255]));
        assert_eq!(*out.get_pixel(9, 9), Rgba([9, 99, 0, 255]));
    }

    #[test]
    fn test_resample_to_output_size() {
        let stitched = RgbaImage::from_pixel(64, 64, Rgba([200, 100, 50, 255]));
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 640.0, 640.0),
            &BoundingBox::new(0.0, 0.0, 320.0, 320.0),
            256,
            128,
        )
        .unwrap();

        assert_eq!(out.dimensions(), (256, 128));
        let pixel = out.get_pixel(100, 60);
        for (got, want) in pixel.0.iter().zip([200u8, 100, 50, 255]) {
            assert!((*got as i16 - want as i16).abs() <= 1, "{:?}", pixel);
        }
    }

    #[test]
    fn test_outside_bounds_is_transparent_padding() {
        let stitched = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            &BoundingBox::new(-10.0, 0.0, 10.0, 10.0),
            20,
            10,
        )
        .unwrap();

        assert_eq!(out.dimensions(), (20, 10));
        assert_eq!(*out.get_pixel(0, 5), Rgba([0, 0, 0, 0]));
        assert_eq!(*out.get_pixel(9, 5), Rgba([0, 0, 0, 0]));
        assert_eq!(*out.get_pixel(10, 5), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(19, 5), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_fully_outside_is_blank() {
        let stitched = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255]));
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            &BoundingBox::new(50.0, 50.0, 60.0, 60.0),
            8,
            8,
        )
        .unwrap();

        assert!(out.pixels().all(|p| *p == Rgba([0, 0, 0, 0])));
    }

    #[test]
    fn test_far_zoomed_out_request_stays_bounded() {
        // Window is 100 times the mosaic in each direction
        let stitched = RgbaImage::from_pixel(1024, 1024, Rgba([0, 128, 255, 255]));
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 1000.0, 1000.0),
            &BoundingBox::new(-49500.0, -49500.0, 50500.0, 50500.0),
            256,
            256,
        )
        .unwrap();

        assert_eq!(out.dimensions(), (256, 256));
        // The mosaic shrinks to a couple of pixels in the middle
        assert!(out.get_pixel(128, 128)[3] >= 254);
        assert_eq!(*out.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
        assert_eq!(*out.get_pixel(255, 255), Rgba([0, 0, 0, 0]));
        let opaque = out.pixels().filter(|p| p[3] > 0).count();
        assert!((1..=9).contains(&opaque), "opaque pixels: {}", opaque);
    }

    #[test]
    fn test_partial_overlap_is_scaled_into_place() {
        // Window twice as wide as the mosaic, output half the window size
        let stitched = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let out = compose_map(
            &stitched,
            &BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            &BoundingBox::new(-10.0, 0.0, 10.0, 10.0),
            10,
            5,
        )
        .unwrap();

        assert_eq!(out.dimensions(), (10, 5));
        assert!((0..5).all(|x| *out.get_pixel(x, 2) == Rgba([0, 0, 0, 0])));
        assert!((5..10).all(|x| out.get_pixel(x, 2).0.iter().all(|c| *c >= 254)));
    }

    #[test]
    fn test_zero_output_size_rejected() {
        let stitched = RgbaImage::new(4, 4);
        let bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
        assert!(compose_map(&stitched, &bbox, &bbox, 0, 4).is_err());
    }

    #[test]
    fn test_input_is_not_mutated() {
        let stitched = coordinate_image();
        let before = stitched.clone();
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        compose_map(&stitched, &bbox, &BoundingBox::new(-50.0, -50.0, 50.0, 50.0), 30, 30).unwrap();
        assert_eq!(stitched, before);
    }

    #[test]
    fn test_blank_map() {
        let blank = blank_map(3, 2);
        assert_eq!(blank.dimensions(), (3, 2));
        assert!(blank.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }
}
