//! Pixel to unit-square box conversion for overlay highlights

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in pixel space, top-left origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl PixelRect {
    /// Create a rectangle from its four edges
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

/// Rectangle relative to the displayed frame (0.0 - 1.0 on both axes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

/// Map a pixel rectangle into the unit square of the upright frame
///
/// Rotations of 90 and 270 degrees swap the effective width and height.
/// Edges are clamped to `[0, 1]` and reordered so that `left <= right` and `top <= bottom`.
pub fn normalize_box(
    rect: &PixelRect,
    frame_width: u32,
    frame_height: u32,
    rotation_degrees: i32,
) -> NormalizedBox {
    let rotation = rotation_degrees.rem_euclid(360);
    let (width, height) = if rotation == 90 || rotation == 270 {
        (frame_height as f32, frame_width as f32)
    } else {
        (frame_width as f32, frame_height as f32)
    };
    let safe_width = width.max(1.0);
    let safe_height = height.max(1.0);

    let left = (rect.left as f32 / safe_width).clamp(0.0, 1.0);
    let top = (rect.top as f32 / safe_height).clamp(0.0, 1.0);
    let right = (rect.right as f32 / safe_width).clamp(0.0, 1.0);
    let bottom = (rect.bottom as f32 / safe_height).clamp(0.0, 1.0);

    NormalizedBox {
        left: left.min(right),
        top: top.min(bottom),
        right: left.max(right),
        bottom: top.max(bottom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f32, expected: f32) {
        assert!((actual - expected).abs() < 0.001, "{} != {}", actual, expected);
    }

    #[test]
    fn test_normalize_unrotated() {
        let rect = PixelRect::new(100, 200, 300, 400);
        let normalized = normalize_box(&rect, 1000, 800, 0);

        assert_close(normalized.left, 0.1);
        assert_close(normalized.top, 0.25);
        assert_close(normalized.right, 0.3);
        assert_close(normalized.bottom, 0.5);
    }

    #[test]
    fn test_normalize_rotated_swaps_dimensions() {
        let rect = PixelRect::new(100, 200, 300, 400);
        let normalized = normalize_box(&rect, 1000, 800, 90);

        assert_close(normalized.left, 0.125);
        assert_close(normalized.top, 0.2);
        assert_close(normalized.right, 0.375);
        assert_close(normalized.bottom, 0.4);

        let negative = normalize_box(&rect, 1000, 800, -90);
        assert_eq!(negative, normalize_box(&rect, 1000, 800, 270));
        assert_eq!(normalize_box(&rect, 1000, 800, 450), normalized);
    }

    #[test]
    fn test_normalize_clamps_and_reorders() {
        let rect = PixelRect::new(1200, -50, 300, 900);
        let normalized = normalize_box(&rect, 1000, 800, 180);

        assert_close(normalized.left, 0.3);
        assert_close(normalized.right, 1.0);
        assert_close(normalized.top, 0.0);
        assert_close(normalized.bottom, 1.0);
    }

    #[test]
    fn test_normalize_zero_dimensions() {
        let rect = PixelRect::new(0, 0, 5, 5);
        let normalized = normalize_box(&rect, 0, 0, 0);

        assert_close(normalized.right, 1.0);
        assert_close(normalized.bottom, 1.0);
    }

    #[test]
    fn test_normalize_always_in_unit_square() {
        let rects = [
            PixelRect::new(-10, -10, 5000, 5000),
            PixelRect::new(640, 480, 0, 0),
            PixelRect::new(320, 10, 321, 11),
            PixelRect::new(i32::MIN, i32::MAX, i32::MAX, i32::MIN),
        ];
        for rect in rects {
            for rotation in [0, 90, 180, 270, 45, -720] {
                let b = normalize_box(&rect, 640, 480, rotation);
                assert!(0.0 <= b.left && b.left <= b.right && b.right <= 1.0);
                assert!(0.0 <= b.top && b.top <= b.bottom && b.bottom <= 1.0);
            }
        }
    }
}
