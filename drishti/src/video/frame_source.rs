//! Frame Source: freshest-frame acquisition
//!
//! Decoders buffer several frames to absorb network jitter. Reading them
//! one by one makes the tracker see the world late by the buffer depth.
//! The acquisition thread therefore runs, per cycle:
//!
//! 1. Skip every frame already buffered (up to `max_drain_per_cycle`)
//! 2. Block once for the next frame and materialize it
//! 3. Publish it as the latest frame (pointer swap)
//!
//! Readers get an `Arc` to a complete frame; a frame is never mutated after
//! publication, so no reader can observe a partially written image.
//!
//! A stream error ends the thread. The latest frame is cleared and stays
//! unavailable until [`FrameSource::start`] is called again.

use crate::config::VideoConfig;
use crate::error::{Error, Result};
use crate::video::decoder::{FrameDecoder, VideoSource};
use arc_swap::ArcSwapOption;
use image::RgbImage;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One published frame
#[derive(Debug)]
pub struct VideoFrame {
    pub image: RgbImage,
    /// Monotonic across restarts of the same source
    pub sequence: u64,
    pub captured_at: Instant,
    /// Buffered frames skipped in the cycle that produced this one
    pub dropped_before: usize,
}

impl VideoFrame {
    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

#[derive(Default)]
struct Shared {
    latest: ArcSwapOption<VideoFrame>,
    running: AtomicBool,
    ended: AtomicBool,
    next_sequence: AtomicU64,
    frames: AtomicU64,
    dropped: AtomicU64,
    /// Sequence of the last published frame, for waiters
    published: Mutex<u64>,
    published_cv: Condvar,
}

impl Shared {
    fn publish(&self, frame: VideoFrame) {
        let sequence = frame.sequence;
        self.latest.store(Some(Arc::new(frame)));
        *self.published.lock() = sequence;
        self.published_cv.notify_all();
    }

    fn wake_waiters(&self) {
        let _guard = self.published.lock();
        self.published_cv.notify_all();
    }
}

struct Worker {
    shutdown: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Latest-frame publisher over a [`VideoSource`]
pub struct FrameSource {
    source: Box<dyn VideoSource>,
    max_drain: usize,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl FrameSource {
    pub fn new(source: Box<dyn VideoSource>, max_drain_per_cycle: usize) -> Self {
        Self {
            source,
            max_drain: max_drain_per_cycle,
            shared: Arc::new(Shared {
                next_sequence: AtomicU64::new(1),
                ..Shared::default()
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(source: Box<dyn VideoSource>, config: &VideoConfig) -> Self {
        Self::new(source, config.max_drain_per_cycle)
    }

    /// Open the stream and start the acquisition thread
    ///
    /// No-op while the thread is running. After the stream ended, this
    /// reopens it.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if self.shared.running.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(old) = worker.take() {
            old.handle.join().map_err(|_| Error::ThreadPanic)?;
        }

        let decoder = self.source.open()?;
        self.shared.ended.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let shutdown = Arc::clone(&shutdown);
            let shared = Arc::clone(&self.shared);
            let max_drain = self.max_drain;
            thread::Builder::new()
                .name("frame-acquisition".to_string())
                .spawn(move || Self::acquisition_loop(decoder, shared, shutdown, max_drain))
                .map_err(|e| {
                    self.shared.running.store(false, Ordering::Release);
                    Error::Other(format!("Failed to spawn frame acquisition: {}", e))
                })?
        };

        *worker = Some(Worker { shutdown, handle });
        log::info!("Frame source started (drain up to {} per cycle)", self.max_drain);
        Ok(())
    }

    /// Stop acquisition and wait for the thread to exit
    pub fn stop(&self) -> Result<()> {
        let Some(worker) = self.worker.lock().take() else {
            return Ok(());
        };
        worker.shutdown.store(true, Ordering::Relaxed);
        worker.handle.join().map_err(|_| Error::ThreadPanic)?;
        self.shared.latest.store(None);
        self.shared.wake_waiters();
        log::info!("Frame source stopped");
        Ok(())
    }

    fn acquisition_loop(
        mut decoder: Box<dyn FrameDecoder>,
        shared: Arc<Shared>,
        shutdown: Arc<AtomicBool>,
        max_drain: usize,
    ) {
        log::info!("Frame acquisition started");
        let mut dropped = 0usize;

        while !shutdown.load(Ordering::Relaxed) {
            let mut drained = 0;
            while drained < max_drain && decoder.skip_frame() {
                drained += 1;
            }
            dropped += drained;

            match decoder.read_frame() {
                Ok(Some(image)) => {
                    let sequence = shared.next_sequence.fetch_add(1, Ordering::Relaxed);
                    shared.frames.fetch_add(1, Ordering::Relaxed);
                    shared.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                    if dropped > 0 {
                        log::trace!("Frame {}: skipped {} stale frames", sequence, dropped);
                    }
                    shared.publish(VideoFrame {
                        image,
                        sequence,
                        captured_at: Instant::now(),
                        dropped_before: dropped,
                    });
                    dropped = 0;
                }
                // Nothing yet; skipped frames carry over to the next publish
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Video stream stopped: {}", e);
                    shared.ended.store(true, Ordering::Release);
                    shared.latest.store(None);
                    break;
                }
            }
        }

        shared.running.store(false, Ordering::Release);
        shared.wake_waiters();
        log::info!("Frame acquisition exiting");
    }

    /// Latest complete frame, or `None` if none is available
    ///
    /// Never blocks.
    pub fn get_latest_frame(&self) -> Option<Arc<VideoFrame>> {
        if self.shared.ended.load(Ordering::Acquire) {
            return None;
        }
        self.shared.latest.load_full()
    }

    /// Wait up to `timeout` for a frame newer than sequence `after`
    pub fn wait_for_frame(&self, after: u64, timeout: Duration) -> Option<Arc<VideoFrame>> {
        let deadline = Instant::now() + timeout;
        let mut published = self.shared.published.lock();
        while *published <= after && self.shared.running.load(Ordering::Acquire) {
            if self
                .shared
                .published_cv
                .wait_until(&mut published, deadline)
                .timed_out()
            {
                break;
            }
        }
        drop(published);
        self.get_latest_frame().filter(|f| f.sequence > after)
    }

    /// Whether the acquisition thread is running
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Whether the stream ended and a restart is required
    pub fn stream_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    /// Frames published since construction
    pub fn frames_published(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }

    /// Buffered frames skipped since construction
    pub fn frames_dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::mock::MockStream;

    fn frame(width: u32) -> RgbImage {
        RgbImage::new(width, 1)
    }

    /// Keep pushing `width`-wide frames until one newer than `after` is published
    fn feed_until_published(
        stream: &MockStream,
        source: &FrameSource,
        after: u64,
        width: u32,
    ) -> Option<Arc<VideoFrame>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            stream.push_frame(frame(width));
            if let Some(f) = source.wait_for_frame(after, Duration::from_millis(10)) {
                return Some(f);
            }
        }
        None
    }

    #[test]
    fn test_nothing_before_start() {
        let source = FrameSource::from_config(Box::new(MockStream::new()), &VideoConfig::default());
        assert!(source.get_latest_frame().is_none());
        assert!(!source.is_running());
    }

    #[test]
    fn test_buffered_frames_are_skipped() {
        let stream = MockStream::new();
        for width in 1..=5 {
            stream.push_frame(frame(width));
        }
        let source = FrameSource::new(Box::new(stream.clone()), 16);
        source.start().unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while stream.pending() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(stream.materialized(), 0);
        assert!(source.get_latest_frame().is_none());

        let latest = feed_until_published(&stream, &source, 0, 6).unwrap();
        assert_eq!(latest.image.width(), 6);
        assert!(stream.skipped() >= 5);
        assert!(latest.dropped_before >= 5);

        source.stop().unwrap();
        assert!(source.get_latest_frame().is_none());
    }

    #[test]
    fn test_stream_end_requires_restart() {
        let stream = MockStream::new();
        let source = FrameSource::new(Box::new(stream.clone()), 16);
        source.start().unwrap();

        let first = feed_until_published(&stream, &source, 0, 1).unwrap();

        stream.end_stream();
        let deadline = Instant::now() + Duration::from_secs(2);
        while source.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(source.stream_ended());
        assert!(source.get_latest_frame().is_none());

        stream.resume_stream();
        source.start().unwrap();
        let next = feed_until_published(&stream, &source, first.sequence, 2).unwrap();
        assert_eq!(next.image.width(), 2);
        assert!(next.sequence > first.sequence);
        source.stop().unwrap();
    }
}
