//! Target selection geometry in normalized detector coordinates

use crate::core::types::{BBox, Detection};

/// Euclidean distance of the box center from the image center
pub fn center_distance(bbox: &BBox) -> f32 {
    let (dx, dy) = bbox.center_offset();
    dx.hypot(dy)
}

/// Detection whose box center is closest to the image center
///
/// Ties go to the earliest detection.
pub fn closest_to_center<'a, I>(detections: I) -> Option<&'a Detection>
where
    I: IntoIterator<Item = &'a Detection>,
{
    let mut best: Option<(&Detection, f32)> = None;
    for detection in detections {
        let distance = center_distance(&detection.bbox);
        if best.is_none_or(|(_, d)| distance < d) {
            best = Some((detection, distance));
        }
    }
    best.map(|(detection, _)| detection)
}
