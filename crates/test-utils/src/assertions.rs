//! Assertions that tolerate floating-point and resampling noise.

use image::RgbaImage;

/// Assert two map coordinates differ by at most `tolerance`.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(index.tile_width(2), 250.0, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($actual:expr, $expected:expr, $tolerance:expr) => {{
        let actual = ($actual) as f64;
        let expected = ($expected) as f64;
        let tolerance = ($tolerance) as f64;
        assert!(
            (actual - expected).abs() <= tolerance,
            "{} = {} is not within {} of {}",
            stringify!($actual),
            actual,
            tolerance,
            expected
        );
    }};
}

/// Assert every edge of two bounding boxes is within `tolerance`.
#[macro_export]
macro_rules! assert_bbox_approx_eq {
    ($actual:expr, $expected:expr, $tolerance:expr) => {{
        let (actual, expected) = (&$actual, &$expected);
        $crate::assert_approx_eq!(actual.min_x, expected.min_x, $tolerance);
        $crate::assert_approx_eq!(actual.min_y, expected.min_y, $tolerance);
        $crate::assert_approx_eq!(actual.max_x, expected.max_x, $tolerance);
        $crate::assert_approx_eq!(actual.max_y, expected.max_y, $tolerance);
    }};
}

/// Assert two bitmaps have the same size and every channel of every pixel
/// differs by at most `tolerance`.
pub fn assert_images_close(actual: &RgbaImage, expected: &RgbaImage, tolerance: u8) {
    assert_eq!(actual.dimensions(), expected.dimensions(), "image sizes differ");
    for (x, y, got) in actual.enumerate_pixels() {
        let want = expected.get_pixel(x, y);
        let worst = got
            .0
            .iter()
            .zip(want.0.iter())
            .map(|(a, b)| a.abs_diff(*b))
            .max()
            .unwrap_or(0);
        assert!(
            worst <= tolerance,
            "pixel ({}, {}): got {:?}, want {:?}",
            x,
            y,
            got,
            want
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use map_common::BoundingBox;

    #[test]
    fn test_approx_eq_within_tolerance() {
        assert_approx_eq!(250.0000001, 250.0, 1e-6);
        assert_approx_eq!(-3, -3.0, 0.0);
    }

    #[test]
    #[should_panic(expected = "is not within")]
    fn test_approx_eq_outside_tolerance() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_bbox_approx_eq() {
        let a = BoundingBox::new(0.0, 0.0, 500.0, 500.0);
        let b = BoundingBox::new(1e-10, 0.0, 500.0, 500.0 - 1e-10);
        assert_bbox_approx_eq!(a, b, 1e-9);
    }

    #[test]
    fn test_images_close_allows_small_differences() {
        let a = RgbaImage::from_pixel(2, 2, Rgba([100, 100, 100, 255]));
        let b = RgbaImage::from_pixel(2, 2, Rgba([102, 99, 100, 255]));
        assert_images_close(&a, &b, 2);
    }

    #[test]
    #[should_panic(expected = "pixel (0, 0)")]
    fn test_images_close_reports_first_bad_pixel() {
        let a = RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        let b = RgbaImage::from_pixel(2, 2, Rgba([10, 0, 0, 255]));
        assert_images_close(&a, &b, 2);
    }
}
