//! OpenCV capture of the drone's video stream
//!
//! The drone pushes H.264 over UDP to `video.local_port`. FFmpeg (through
//! OpenCV's `VideoCapture`) demuxes and decodes it, buffering frames to
//! absorb network jitter.
//!
//! | Decoder call | Capture call |
//! |--------------|--------------|
//! | `skip_frame` | `grab()` only, the frame is never converted |
//! | `read_frame` | `retrieve()` of the grabbed frame, BGR to RGB |
//!
//! `grab()` cannot report how many frames are buffered. A grab that
//! returns within `video.catch_up_ms` came from the buffer and is
//! discarded; a slower one waited for the live stream, so that frame is
//! kept for the next `read_frame`.

use crate::config::VideoConfig;
use crate::error::{Error, Result};
use crate::video::decoder::{FrameDecoder, VideoSource};
use image::RgbImage;
use opencv::core::{AlgorithmHint, Mat, Vector};
use opencv::prelude::*;
use opencv::{imgproc, videoio};
use std::time::{Duration, Instant};

/// Keeps the demuxer running after a UDP receive buffer overrun
const STREAM_OPTIONS: &str = "?overrun_nonfatal=1";

/// FFmpeg-backed stream source
#[derive(Debug, Clone)]
pub struct CaptureSource {
    url: String,
    read_timeout: Duration,
    catch_up: Duration,
}

impl CaptureSource {
    pub fn new(url: impl Into<String>, read_timeout: Duration, catch_up: Duration) -> Self {
        Self {
            url: url.into(),
            read_timeout,
            catch_up,
        }
    }

    /// Source for the drone stream on the configured local port
    pub fn from_config(config: &VideoConfig) -> Self {
        Self::new(
            format!("{}{}", config.stream_url(), STREAM_OPTIONS),
            config.read_timeout(),
            config.catch_up(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl VideoSource for CaptureSource {
    fn open(&self) -> Result<Box<dyn FrameDecoder>> {
        let timeout_ms = i32::try_from(self.read_timeout.as_millis()).unwrap_or(i32::MAX);
        let params = Vector::<i32>::from_slice(&[
            videoio::CAP_PROP_OPEN_TIMEOUT_MSEC,
            timeout_ms,
            videoio::CAP_PROP_READ_TIMEOUT_MSEC,
            timeout_ms,
        ]);
        let capture =
            videoio::VideoCapture::from_file_with_params(&self.url, videoio::CAP_FFMPEG, &params)?;
        if !capture.is_opened()? {
            return Err(Error::Other(format!("Failed to open video stream {}", self.url)));
        }

        log::info!("Video capture opened: {}", self.url);
        Ok(Box::new(CaptureDecoder {
            capture,
            catch_up: self.catch_up,
            pending: false,
            bgr: Mat::default(),
            rgb: Mat::default(),
        }))
    }
}

struct CaptureDecoder {
    capture: videoio::VideoCapture,
    catch_up: Duration,
    /// Live frame grabbed while draining, not yet retrieved
    pending: bool,
    bgr: Mat,
    rgb: Mat,
}

impl FrameDecoder for CaptureDecoder {
    fn skip_frame(&mut self) -> bool {
        if self.pending {
            return false;
        }
        let started = Instant::now();
        match self.capture.grab() {
            Ok(true) if started.elapsed() < self.catch_up => true,
            Ok(true) => {
                self.pending = true;
                false
            }
            // End of stream; the next read reports it
            Ok(false) => false,
            Err(e) => {
                log::warn!("Video grab failed: {}", e);
                false
            }
        }
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        if !std::mem::take(&mut self.pending) && !self.capture.grab()? {
            return Err(Error::StreamEnded);
        }
        // Undecodable group (reference frame lost to a dropped packet)
        if !self.capture.retrieve(&mut self.bgr, 0)? || self.bgr.empty() {
            return Ok(None);
        }

        imgproc::cvt_color(
            &self.bgr,
            &mut self.rgb,
            imgproc::COLOR_BGR2RGB,
            0,
            AlgorithmHint::ALGO_HINT_DEFAULT,
        )?;
        let width = self.rgb.cols() as u32;
        let height = self.rgb.rows() as u32;
        let data = self.rgb.data_bytes()?.to_vec();
        RgbImage::from_vec(width, height, data)
            .map(Some)
            .ok_or_else(|| Error::Other(format!("Frame buffer does not match {}x{}", width, height)))
    }
}
