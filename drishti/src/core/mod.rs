//! Core data types shared across components.
//!
//! - [`types`]: Command outcomes, reply shapes, flight state, detections, velocities

pub mod types;
