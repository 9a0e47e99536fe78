//! Dead-zone velocity policy
//!
//! Maps the tracked box to a constant-magnitude `rc` vector. Image `y`
//! grows downward, so a target above center (`cy < 0`) means climb.
//!
//! | Input | Below band | In band | Above band |
//! |-------|-----------|---------|------------|
//! | center x | `-speed` (left) | 0 | `+speed` (right) |
//! | center y | `+speed` (up) | 0 | `-speed` (down) |
//! | area | `+speed` (forward) | 0 | `-speed` (back) |
//!
//! Band edges belong to the band. Yaw is never commanded.

use crate::config::TrackingConfig;
use crate::core::types::{BBox, RcVelocity};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingPolicy {
    /// Half-width of the centering band
    pub dead_zone: f32,
    /// Below this area the target is too far
    pub min_area: f32,
    /// Above this area the target is too close
    pub max_area: f32,
    /// Magnitude of every corrective component
    pub speed: i32,
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self::from_config(&TrackingConfig::default())
    }
}

impl TrackingPolicy {
    pub fn from_config(config: &TrackingConfig) -> Self {
        Self {
            dead_zone: config.dead_zone,
            min_area: config.min_area,
            max_area: config.max_area,
            speed: config.speed,
        }
    }

    /// Left/right component for a horizontal center offset
    pub fn lateral_velocity(&self, center_x: f32) -> i32 {
        if center_x < -self.dead_zone {
            -self.speed
        } else if center_x > self.dead_zone {
            self.speed
        } else {
            0
        }
    }

    /// Up/down component for a vertical center offset
    pub fn vertical_velocity(&self, center_y: f32) -> i32 {
        if center_y < -self.dead_zone {
            self.speed
        } else if center_y > self.dead_zone {
            -self.speed
        } else {
            0
        }
    }

    /// Forward/back component for a box area
    pub fn forward_velocity(&self, area: f32) -> i32 {
        if area < self.min_area {
            self.speed
        } else if area > self.max_area {
            -self.speed
        } else {
            0
        }
    }

    pub fn velocity_for(&self, bbox: &BBox) -> RcVelocity {
        let (center_x, center_y) = bbox.center_offset();
        RcVelocity::new(
            self.lateral_velocity(center_x),
            self.forward_velocity(bbox.area()),
            self.vertical_velocity(center_y),
            0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_box_holds_position() {
        let policy = TrackingPolicy::default();
        let v = policy.velocity_for(&BBox::new(0.25, 0.25, 0.75, 0.75));
        assert_eq!(v.left_right, 0);
        assert_eq!(v.up_down, 0);
        assert_eq!(v.yaw, 0);
    }

    #[test]
    fn test_area_band_edges() {
        let policy = TrackingPolicy::default();
        assert_eq!(policy.forward_velocity(0.04), 0);
        assert_eq!(policy.forward_velocity(0.3), 0);
        assert_eq!(policy.forward_velocity(0.03), 10);
        assert_eq!(policy.forward_velocity(0.31), -10);
    }

    #[test]
    fn test_dead_zone_edges() {
        let policy = TrackingPolicy::default();
        assert_eq!(policy.lateral_velocity(0.1), 0);
        assert_eq!(policy.lateral_velocity(-0.1), 0);
        assert_eq!(policy.lateral_velocity(0.11), 10);
        assert_eq!(policy.lateral_velocity(-0.11), -10);
        assert_eq!(policy.vertical_velocity(-0.2), 10);
        assert_eq!(policy.vertical_velocity(0.2), -10);
    }

    #[test]
    fn test_off_center_far_target() {
        let policy = TrackingPolicy::default();
        // Small box in the top-left corner
        let v = policy.velocity_for(&BBox::new(0.0, 0.0, 0.125, 0.125));
        assert_eq!(v, RcVelocity::new(-10, 10, 10, 0));
    }
}
