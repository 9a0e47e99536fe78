//! Visual tracking
//!
//! - [`detector`]: Detector boundary
//! - [`geometry`]: Closest-to-center selection
//! - [`policy`]: Dead-zone velocity policy
//! - [`annotate`]: Box overlay
//! - [`controller`]: Per-frame state machine and tracking thread

pub mod annotate;
pub mod controller;
pub mod detector;
pub mod geometry;
pub mod policy;

pub use controller::{FrameProcessor, FrameReport, TrackingController, TrackingMode, VelocitySink};
pub use detector::{Detector, NullDetector};
pub use policy::TrackingPolicy;
