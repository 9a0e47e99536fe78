//! In-memory video stream for running without a camera
//!
//! A [`MockStream`] is a shared frame queue. Frames pushed into it are
//! handed out by every decoder it opens, in order. Ending the stream makes
//! the decoder report [`Error::StreamEnded`] once the queue is empty.
//!
//! ```ignore
//! let stream = MockStream::new();
//! let source = FrameSource::new(Box::new(stream.clone()), 16);
//! source.start()?;
//! stream.push_frame(RgbImage::new(300, 300));
//! ```

use crate::error::{Error, Result};
use crate::video::decoder::{FrameDecoder, VideoSource};
use image::RgbImage;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// How long `read_frame` waits before reporting "no frame yet"
const READ_WAIT: Duration = Duration::from_millis(20);

#[derive(Default)]
struct Inner {
    queue: Mutex<VecDeque<RgbImage>>,
    available: Condvar,
    ended: AtomicBool,
    skipped: AtomicU64,
    materialized: AtomicU64,
}

/// Scripted frame stream
#[derive(Clone, Default)]
pub struct MockStream {
    inner: Arc<Inner>,
}

impl MockStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a frame
    pub fn push_frame(&self, frame: RgbImage) {
        self.inner.queue.lock().push_back(frame);
        self.inner.available.notify_all();
    }

    /// Mark the stream ended; buffered frames are still delivered
    pub fn end_stream(&self) {
        self.inner.ended.store(true, Ordering::Release);
        self.inner.available.notify_all();
    }

    /// Clear the ended flag so the stream can be opened again
    pub fn resume_stream(&self) {
        self.inner.ended.store(false, Ordering::Release);
    }

    /// Frames queued and not yet consumed
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Frames dropped by decoders without materializing
    pub fn skipped(&self) -> u64 {
        self.inner.skipped.load(Ordering::Relaxed)
    }

    /// Frames handed out as images
    pub fn materialized(&self) -> u64 {
        self.inner.materialized.load(Ordering::Relaxed)
    }
}

impl VideoSource for MockStream {
    fn open(&self) -> Result<Box<dyn FrameDecoder>> {
        if self.inner.ended.load(Ordering::Acquire) && self.pending() == 0 {
            return Err(Error::StreamEnded);
        }
        Ok(Box::new(MockDecoder {
            inner: Arc::clone(&self.inner),
        }))
    }
}

/// Decoder reading from a [`MockStream`]
pub struct MockDecoder {
    inner: Arc<Inner>,
}

impl FrameDecoder for MockDecoder {
    fn skip_frame(&mut self) -> bool {
        let skipped = self.inner.queue.lock().pop_front().is_some();
        if skipped {
            self.inner.skipped.fetch_add(1, Ordering::Relaxed);
        }
        skipped
    }

    fn read_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut queue = self.inner.queue.lock();
        if queue.is_empty() && !self.inner.ended.load(Ordering::Acquire) {
            self.inner.available.wait_for(&mut queue, READ_WAIT);
        }
        match queue.pop_front() {
            Some(frame) => {
                self.inner.materialized.fetch_add(1, Ordering::Relaxed);
                Ok(Some(frame))
            }
            None if self.inner.ended.load(Ordering::Acquire) => Err(Error::StreamEnded),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_delivered_in_order() {
        let stream = MockStream::new();
        let mut decoder = stream.open().unwrap();
        stream.push_frame(RgbImage::new(1, 1));
        stream.push_frame(RgbImage::new(2, 2));

        assert!(decoder.skip_frame());
        let frame = decoder.read_frame().unwrap().unwrap();
        assert_eq!(frame.width(), 2);
        assert!(!decoder.skip_frame());
        assert_eq!(stream.skipped(), 1);
        assert_eq!(stream.materialized(), 1);
    }

    #[test]
    fn test_empty_read_returns_none() {
        let stream = MockStream::new();
        let mut decoder = stream.open().unwrap();
        assert!(decoder.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_end_after_buffered_frames() {
        let stream = MockStream::new();
        let mut decoder = stream.open().unwrap();
        stream.push_frame(RgbImage::new(1, 1));
        stream.end_stream();

        assert!(decoder.read_frame().unwrap().is_some());
        assert!(matches!(decoder.read_frame(), Err(Error::StreamEnded)));
        assert!(matches!(stream.open(), Err(Error::StreamEnded)));

        stream.resume_stream();
        assert!(stream.open().is_ok());
    }
}
