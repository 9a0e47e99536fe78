//! Decoder boundary for the video stream
//!
//! Stream decoding is provided by the embedder. The frame source only
//! needs two operations from it:
//!
//! - **skip**: drop one buffered frame without converting it to an image
//! - **read**: block until the next frame and convert it to RGB

use crate::error::Result;
use image::RgbImage;

/// Video decoder with internal frame buffering
pub trait FrameDecoder: Send {
    /// Drop one buffered frame without materializing it
    ///
    /// Returns `false` when nothing is buffered. Must not wait longer than
    /// about one frame interval; a frame that had to be waited for is kept
    /// for the following `read_frame`.
    fn skip_frame(&mut self) -> bool;

    /// Wait for the next frame and materialize it
    ///
    /// Implementations must return within a bounded time so the caller can
    /// observe shutdown: `Ok(None)` means no frame arrived yet.
    /// `Err` means the stream has ended or broken and will produce no
    /// further frames.
    fn read_frame(&mut self) -> Result<Option<RgbImage>>;
}

impl<D: FrameDecoder + ?Sized> FrameDecoder for Box<D> {
    fn skip_frame(&mut self) -> bool {
        (**self).skip_frame()
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).read_frame()
    }
}

/// Opens a decoder for the stream
///
/// Called on every frame source `start()`, so a source can be reopened
/// after its stream ended.
pub trait VideoSource: Send + Sync {
    fn open(&self) -> Result<Box<dyn FrameDecoder>>;
}

impl<F> VideoSource for F
where
    F: Fn() -> Result<Box<dyn FrameDecoder>> + Send + Sync,
{
    fn open(&self) -> Result<Box<dyn FrameDecoder>> {
        self()
    }
}
