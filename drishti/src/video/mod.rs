//! Video ingestion
//!
//! - [`decoder`]: Decoder boundary (skip buffered frame / materialize next frame)
//! - [`frame_source`]: Acquisition thread publishing the freshest frame
//! - [`mock`]: In-memory stream for tests and camera-less runs
//! - `capture`: OpenCV/FFmpeg stream decoding (`camera` feature)

#[cfg(feature = "camera")]
pub mod capture;
pub mod decoder;
pub mod frame_source;
pub mod mock;

pub use decoder::{FrameDecoder, VideoSource};
pub use frame_source::{FrameSource, VideoFrame};
pub use mock::MockStream;

#[cfg(feature = "camera")]
pub use capture::CaptureSource;
