//! Tracking Controller
//!
//! Runs the per-frame state machine on its own thread:
//!
//! ```text
//! FrameSource ──► resize ──► detect ──► filter by label ──► closest to center
//!                   │           │             │                    │
//!                 Idle      Detecting     Filtering            Tracking ──► rc
//! ```
//!
//! | Mode | Entered when | Output |
//! |------|--------------|--------|
//! | Idle | detection off | resized frame |
//! | Detecting | detection on, no target label | all boxes (blue) |
//! | Filtering | target label set, tracking off | matches (green) |
//! | Tracking | target label set, tracking on | chosen target (red) + velocity |
//!
//! In Tracking mode every processed frame produces exactly one velocity
//! command; a frame with no match produces hover. Each issued command is
//! followed by a settle delay before the next frame is taken.

use crate::config::TrackingConfig;
use crate::core::types::{CommandOutcome, Detection, OperatorControls, RcVelocity};
use crate::error::{Error, Result};
use crate::tracking::annotate::{DETECTION_COLOR, MATCH_COLOR, TARGET_COLOR, draw_bbox};
use crate::tracking::detector::Detector;
use crate::tracking::geometry::closest_to_center;
use crate::tracking::policy::TrackingPolicy;
use crate::video::frame_source::FrameSource;
use arc_swap::ArcSwapOption;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use image::RgbImage;
use image::imageops::{self, FilterType};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Destination for velocity commands
pub trait VelocitySink: Send + Sync {
    fn send_velocity(&self, velocity: RcVelocity) -> CommandOutcome;
}

/// Processing mode derived from the operator controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingMode {
    Idle,
    Detecting,
    Filtering,
    Tracking,
}

impl TrackingMode {
    pub fn from_controls(controls: &OperatorControls) -> Self {
        if !controls.detection_enabled() {
            return TrackingMode::Idle;
        }
        match controls.target() {
            None => TrackingMode::Detecting,
            Some(_) if controls.tracking_enabled() => TrackingMode::Tracking,
            Some(_) => TrackingMode::Filtering,
        }
    }
}

/// What happened to one frame
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub mode: TrackingMode,
    /// Sequence of the source frame (0 when processed directly)
    pub frame_sequence: u64,
    /// Detections returned by the detector
    pub detections: usize,
    /// Detections matching the target label
    pub matches: usize,
    /// Detection chosen for tracking
    pub target: Option<Detection>,
    /// Velocity to issue (only in Tracking mode)
    pub velocity: Option<RcVelocity>,
}

/// Per-frame pipeline: resize, detect, filter, select, annotate
pub struct FrameProcessor {
    detector: Box<dyn Detector>,
    policy: TrackingPolicy,
    input_size: u32,
}

impl FrameProcessor {
    pub fn new(detector: Box<dyn Detector>, policy: TrackingPolicy, input_size: u32) -> Self {
        Self {
            detector,
            policy,
            input_size,
        }
    }

    pub fn from_config(detector: Box<dyn Detector>, config: &TrackingConfig) -> Self {
        Self::new(detector, TrackingPolicy::from_config(config), config.input_size)
    }

    pub fn policy(&self) -> &TrackingPolicy {
        &self.policy
    }

    /// Process one frame under the current operator controls
    pub fn process(&mut self, frame: &RgbImage, controls: &OperatorControls) -> (RgbImage, FrameReport) {
        let mode = TrackingMode::from_controls(controls);
        let target_label = controls.target();

        let mut image = if frame.dimensions() == (self.input_size, self.input_size) {
            frame.clone()
        } else {
            imageops::resize(frame, self.input_size, self.input_size, FilterType::Triangle)
        };

        let mut report = FrameReport {
            mode,
            frame_sequence: 0,
            detections: 0,
            matches: 0,
            target: None,
            velocity: None,
        };
        if mode == TrackingMode::Idle {
            return (image, report);
        }

        let detections = self.detector.detect(&image);
        report.detections = detections.len();
        for detection in &detections {
            draw_bbox(&mut image, &detection.bbox, DETECTION_COLOR);
        }
        if mode == TrackingMode::Detecting {
            return (image, report);
        }

        let matches: Vec<&Detection> = detections
            .iter()
            .filter(|d| Some(d.label) == target_label)
            .collect();
        report.matches = matches.len();
        for detection in &matches {
            draw_bbox(&mut image, &detection.bbox, MATCH_COLOR);
        }
        if mode == TrackingMode::Filtering {
            return (image, report);
        }

        let velocity = match closest_to_center(matches.iter().copied()) {
            Some(target) => {
                draw_bbox(&mut image, &target.bbox, TARGET_COLOR);
                report.target = Some(*target);
                self.policy.velocity_for(&target.bbox)
            }
            None => RcVelocity::HOVER,
        };
        report.velocity = Some(velocity);
        (image, report)
    }
}

/// Latest processed output, readable from any thread
#[derive(Default)]
struct Published {
    image: ArcSwapOption<RgbImage>,
    report: ArcSwapOption<FrameReport>,
    frames: AtomicU64,
    commands: AtomicU64,
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<FrameProcessor>,
}

/// Closed-loop tracker driving a [`VelocitySink`] from a [`FrameSource`]
pub struct TrackingController {
    frames: Arc<FrameSource>,
    sink: Arc<dyn VelocitySink>,
    controls: Arc<OperatorControls>,
    settle: Duration,
    frame_wait: Duration,
    published: Arc<Published>,
    /// Present while stopped
    processor: Option<FrameProcessor>,
    worker: Option<Worker>,
}

impl TrackingController {
    pub fn new(
        processor: FrameProcessor,
        frames: Arc<FrameSource>,
        sink: Arc<dyn VelocitySink>,
        controls: Arc<OperatorControls>,
        config: &TrackingConfig,
    ) -> Self {
        Self {
            frames,
            sink,
            controls,
            settle: config.settle(),
            frame_wait: config.frame_wait(),
            published: Arc::new(Published::default()),
            processor: Some(processor),
            worker: None,
        }
    }

    /// Start the tracking thread
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        let processor = self.processor.take().ok_or(Error::ThreadPanic)?;
        let (stop_tx, stop_rx) = bounded(1);

        let run = TrackingLoop {
            processor,
            frames: Arc::clone(&self.frames),
            sink: Arc::clone(&self.sink),
            controls: Arc::clone(&self.controls),
            published: Arc::clone(&self.published),
            settle: self.settle,
            frame_wait: self.frame_wait,
            stop_rx,
        };

        let handle = thread::Builder::new()
            .name("tracking-controller".to_string())
            .spawn(move || run.run())
            .map_err(|e| Error::Other(format!("Failed to spawn tracking controller: {}", e)))?;

        self.worker = Some(Worker { stop_tx, handle });
        log::info!("Tracking controller started");
        Ok(())
    }

    /// Stop the tracking thread and wait for it
    ///
    /// Interrupts a settle delay in progress.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        drop(worker.stop_tx);
        let processor = worker.handle.join().map_err(|_| Error::ThreadPanic)?;
        self.processor = Some(processor);
        log::info!("Tracking controller stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Last resized and annotated frame
    pub fn processed_image(&self) -> Option<Arc<RgbImage>> {
        self.published.image.load_full()
    }

    pub fn last_report(&self) -> Option<Arc<FrameReport>> {
        self.published.report.load_full()
    }

    pub fn frames_processed(&self) -> u64 {
        self.published.frames.load(Ordering::Relaxed)
    }

    pub fn commands_issued(&self) -> u64 {
        self.published.commands.load(Ordering::Relaxed)
    }

    pub fn controls(&self) -> &Arc<OperatorControls> {
        &self.controls
    }
}

impl Drop for TrackingController {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// State owned by the tracking thread
struct TrackingLoop {
    processor: FrameProcessor,
    frames: Arc<FrameSource>,
    sink: Arc<dyn VelocitySink>,
    controls: Arc<OperatorControls>,
    published: Arc<Published>,
    settle: Duration,
    frame_wait: Duration,
    stop_rx: Receiver<()>,
}

impl TrackingLoop {
    fn run(mut self) -> FrameProcessor {
        log::info!("Tracking loop started");
        let mut last_sequence = 0;

        while !self.stop_requested() {
            let Some(frame) = self.frames.wait_for_frame(last_sequence, self.frame_wait) else {
                // Source stopped or ended: nothing will wake us, so pace the retry
                if !self.frames.is_running() && self.sleep_or_stop(self.frame_wait) {
                    break;
                }
                continue;
            };
            last_sequence = frame.sequence;

            let (image, mut report) = self.processor.process(&frame.image, &self.controls);
            report.frame_sequence = frame.sequence;
            let velocity = report.velocity;

            self.published.image.store(Some(Arc::new(image)));
            self.published.report.store(Some(Arc::new(report)));
            self.published.frames.fetch_add(1, Ordering::Relaxed);

            if let Some(velocity) = velocity {
                self.issue(velocity);
                if self.sleep_or_stop(self.settle) {
                    break;
                }
            }
        }

        log::info!("Tracking loop exiting");
        self.processor
    }

    fn issue(&self, velocity: RcVelocity) {
        let outcome = self.sink.send_velocity(velocity);
        self.published.commands.fetch_add(1, Ordering::Relaxed);
        if outcome.is_rejected() {
            log::debug!("{} not sent: {}", velocity, outcome.response_text());
        } else if !outcome.acknowledged {
            log::warn!("{} failed: {}", velocity, outcome.response_text());
        } else {
            log::debug!("Issued {}", velocity);
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(self.stop_rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Wait for `duration`; true if stop was requested meanwhile
    fn sleep_or_stop(&self, duration: Duration) -> bool {
        !matches!(self.stop_rx.recv_timeout(duration), Err(RecvTimeoutError::Timeout))
    }
}
