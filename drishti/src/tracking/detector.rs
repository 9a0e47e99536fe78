//! Object detector boundary
//!
//! The detector is supplied by the embedder (an inference runtime, a
//! remote service, or a scripted function in tests). It receives the
//! resized square input image and returns detections with boxes
//! normalized to `[0, 1]`.

use crate::core::types::Detection;
use image::RgbImage;

/// Image to detections, in detector order
pub trait Detector: Send {
    fn detect(&mut self, image: &RgbImage) -> Vec<Detection>;
}

impl<F> Detector for F
where
    F: FnMut(&RgbImage) -> Vec<Detection> + Send,
{
    fn detect(&mut self, image: &RgbImage) -> Vec<Detection> {
        self(image)
    }
}

/// Detector that never finds anything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&mut self, _image: &RgbImage) -> Vec<Detection> {
        Vec::new()
    }
}
