//! Bounding-box overlay
//!
//! Boxes are given in normalized coordinates and scaled to the image size.

use crate::core::types::BBox;
use image::{Rgb, RgbImage};

/// Any detection
pub const DETECTION_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Detection matching the target label
pub const MATCH_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Detection being tracked
pub const TARGET_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const LINE_WIDTH: u32 = 2;

/// Draw a rectangle outline for `bbox`
pub fn draw_bbox(image: &mut RgbImage, bbox: &BBox, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }
    let to_px = |v: f32, size: u32| ((v.clamp(0.0, 1.0) * size as f32) as u32).min(size - 1);
    let (x0, x1) = (to_px(bbox.x0, width), to_px(bbox.x1, width));
    let (y0, y1) = (to_px(bbox.y0, height), to_px(bbox.y1, height));
    let (x0, x1) = (x0.min(x1), x0.max(x1));
    let (y0, y1) = (y0.min(y1), y0.max(y1));

    for t in 0..LINE_WIDTH {
        for x in x0..=x1 {
            put(image, x, y0 + t, color);
            put(image, x, y1.saturating_sub(t), color);
        }
        for y in y0..=y1 {
            put(image, x0 + t, y, color);
            put(image, x1.saturating_sub(t), y, color);
        }
    }
}

fn put(image: &mut RgbImage, x: u32, y: u32, color: Rgb<u8>) {
    if x < image.width() && y < image.height() {
        image.put_pixel(x, y, color);
    }
}
