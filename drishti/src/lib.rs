//! Drishti - Command, telemetry and visual-tracking runtime for a small
//! quadcopter controlled over UDP
//!
//! ## Components
//!
//! - [`CommandLink`]: Text commands with reply classification and flight state
//! - [`TelemetryLink`]: Latest status snapshot from the unsolicited stream
//! - [`FrameSource`]: Freshest decoded video frame, buffered frames skipped
//! - [`TrackingController`]: Detect, select and follow a target with `rc` commands
//!
//! Each component owns its socket or decoder, runs its own thread between
//! `start()` and `stop()`, and can be restarted independently.

pub mod config;
pub mod core;
pub mod error;
pub mod link;
pub mod tracking;
pub mod video;

// Re-export commonly used types
pub use crate::config::DrishtiConfig;
pub use crate::core::types::{
    BBox, CommandOutcome, Detection, FlightState, LinkFault, OperatorControls, RcVelocity, Reply,
};
pub use error::{Error, Result};
pub use link::{CommandLink, DroneCommand, TelemetryLink, TelemetrySnapshot};
pub use tracking::{
    Detector, FrameProcessor, FrameReport, TrackingController, TrackingMode, TrackingPolicy,
    VelocitySink,
};
pub use video::{FrameDecoder, FrameSource, MockStream, VideoFrame, VideoSource};
