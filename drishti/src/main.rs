//! Drishti - drone link daemon
//!
//! Opens the command and telemetry links, puts the drone into SDK mode and
//! runs an operator console on stdin:
//!
//! - any drone command (`takeoff`, `up 50`, `rc 0 10 0 0`, `battery?`, ...)
//! - `status`: link health and latest telemetry
//! - `quit`: leave (lands first when airborne)
//!
//! With `[video] enabled = true` and the `camera` feature, the video stream
//! is decoded and the tracking controller runs on it. The console then
//! also takes `detect on|off`, `track on|off` and `target <label>|none`.
//! No detector ships with the daemon; it runs with [`NullDetector`] until
//! an embedder provides one.
//!
//! Ctrl-C behaves like `quit`.

use clap::Parser;
use crossbeam_channel::{RecvTimeoutError, bounded};
use drishti::config::VideoConfig;
use drishti::error::{Error, Result};
use drishti::tracking::NullDetector;
use drishti::{
    CommandLink, DrishtiConfig, DroneCommand, FrameProcessor, FrameSource, OperatorControls,
    TelemetryLink, TrackingController, VelocitySink, VideoSource,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Command and telemetry console for a UDP-controlled quadcopter
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML configuration file (built-in defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, overrides `[logging] level`
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DrishtiConfig::from_file(path)?,
        None => DrishtiConfig::default(),
    };

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("Drishti v{} starting...", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => log::info!("Using config: {}", path.display()),
        None => log::info!("Using default configuration"),
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    let link = Arc::new(CommandLink::new(&config.drone, &config.timeouts));
    let telemetry = TelemetryLink::new(&config.telemetry, &config.timeouts);
    link.start()?;
    telemetry.start()?;

    let outcome = link.command();
    if outcome.acknowledged {
        log::info!("SDK mode entered: {}", outcome.response_text());
    } else {
        log::warn!("Drone did not enter SDK mode: {}", outcome.response_text());
    }

    let mut vision = start_vision(&config, &link)?;

    let (line_tx, line_rx) = bounded::<String>(8);
    // Detached: blocks on stdin until the process exits
    let _console = thread::Builder::new()
        .name("operator-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line_tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|e| Error::Other(format!("Failed to spawn console thread: {}", e)))?;

    while running.load(Ordering::Relaxed) {
        let line = match line_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let line = line.trim();
        match line {
            "" => {}
            "quit" | "exit" => break,
            "status" => print_status(&link, &telemetry, vision.as_ref()),
            _ => match DroneCommand::parse(line) {
                Some(command) => println!("{}", link.send(&command).response_text()),
                None => match vision.as_ref().map(|v| v.handle(line)) {
                    Some(true) => {}
                    _ => println!("unknown command: {}", line),
                },
            },
        }
    }

    // Stop issuing rc before landing
    if let Some(vision) = vision.take() {
        vision.stop()?;
        link.streamoff();
    }

    if link.is_flying() {
        log::info!("Landing before exit");
        let outcome = link.land();
        if !outcome.acknowledged {
            log::error!("Land failed: {}", outcome.response_text());
        }
    }

    telemetry.stop()?;
    link.stop()?;
    log::info!("Drishti stopped");
    Ok(())
}

/// Video pipeline and the tracker it feeds
struct Vision {
    frames: Arc<FrameSource>,
    controller: TrackingController,
}

impl Vision {
    /// Apply a tracking console command; false if `line` is not one
    fn handle(&self, line: &str) -> bool {
        let controls = self.controller.controls();
        let mut words = line.split_whitespace();
        let (Some(verb), Some(arg), None) = (words.next(), words.next(), words.next()) else {
            return false;
        };
        match (verb, arg) {
            ("detect", "on") => controls.set_detection_enabled(true),
            ("detect", "off") => controls.set_detection_enabled(false),
            ("track", "on") => controls.set_tracking_enabled(true),
            ("track", "off") => controls.set_tracking_enabled(false),
            ("target", "none") => controls.set_target(None),
            ("target", label) => match label.parse() {
                Ok(label) => controls.set_target(Some(label)),
                Err(_) => return false,
            },
            _ => return false,
        }
        log::info!("Tracking controls: {}", line);
        true
    }

    fn stop(mut self) -> Result<()> {
        self.controller.stop()?;
        self.frames.stop()
    }
}

fn start_vision(config: &DrishtiConfig, link: &Arc<CommandLink>) -> Result<Option<Vision>> {
    if !config.video.enabled {
        return Ok(None);
    }
    let Some(source) = video_source(&config.video) else {
        log::warn!("Video enabled in config but built without the `camera` feature");
        return Ok(None);
    };

    let outcome = link.streamon();
    if !outcome.acknowledged {
        log::warn!("streamon failed: {}", outcome.response_text());
    }

    let frames = Arc::new(FrameSource::from_config(source, &config.video));
    frames.start()?;

    let processor = FrameProcessor::from_config(Box::new(NullDetector), &config.tracking);
    log::info!("Tracking policy: {:?}", processor.policy());
    let mut controller = TrackingController::new(
        processor,
        Arc::clone(&frames),
        Arc::clone(link) as Arc<dyn VelocitySink>,
        Arc::new(OperatorControls::new()),
        &config.tracking,
    );
    controller.start()?;
    Ok(Some(Vision { frames, controller }))
}

#[cfg(feature = "camera")]
fn video_source(config: &VideoConfig) -> Option<Box<dyn VideoSource>> {
    Some(Box::new(drishti::video::CaptureSource::from_config(config)))
}

#[cfg(not(feature = "camera"))]
fn video_source(_config: &VideoConfig) -> Option<Box<dyn VideoSource>> {
    None
}

fn print_status(link: &CommandLink, telemetry: &TelemetryLink, vision: Option<&Vision>) {
    println!(
        "command link: {} (flying: {}, last: {:?})",
        if link.command_link_healthy() { "up" } else { "down" },
        link.is_flying(),
        link.last_response()
    );
    match telemetry.latest() {
        Some(snapshot) => println!(
            "telemetry #{} ({} ms old): battery {:?}%, height {:?} cm",
            snapshot.sequence,
            snapshot.age().as_millis(),
            snapshot.battery(),
            snapshot.height_cm()
        ),
        None => println!(
            "telemetry: no packets yet ({})",
            if telemetry.is_healthy() { "up" } else { "down" }
        ),
    }
    if let Some(vision) = vision {
        println!(
            "video: {} frames ({} skipped), tracker: {} processed, {} rc issued, last {:?}",
            vision.frames.frames_published(),
            vision.frames.frames_dropped(),
            vision.controller.frames_processed(),
            vision.controller.commands_issued(),
            vision.controller.last_report().map(|r| r.mode)
        );
    }
}
