//! Core data types shared by the links, the frame source and the tracker.
//!
//! Key types:
//! - [`CommandOutcome`]: Result of one command round trip, produced once per `execute`
//! - [`Reply`]: Classified reply shape (every shape the device is known to emit)
//! - [`FlightState`]: Airborne flag, mutated only by successful takeoff/land
//! - [`Detection`] / [`BBox`]: Detector output in normalized `[0, 1]` coordinates
//! - [`RcVelocity`]: Four-axis velocity vector for the fire-and-forget `rc` command
//! - [`OperatorControls`]: Detection/tracking toggles and target filter set by the operator

use crate::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

/// Classified reply to a command
///
/// Produced by [`crate::link::reply::classify`]; the mapping from raw
/// datagrams to variants is total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// No datagram arrived within the command timeout
    Missing,
    /// Command is fire-and-forget; no reply is ever sent
    NotExpected,
    /// Plain `ok`
    Ok,
    /// `ok` followed by a message (inline or as a second datagram)
    OkWithMessage(String),
    /// The error token
    Error,
    /// The error token followed by a delayed `ok`
    ErrorThenOk,
    /// Bare data without an `ok` (query answers such as `87`)
    Data(String),
    /// Payload that fits no known shape, kept verbatim
    Ambiguous(String),
}

impl Reply {
    /// Whether this reply counts as acknowledgement of the command
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self, Reply::Missing | Reply::Error | Reply::ErrorThenOk)
    }
}

/// Why a command produced no usable reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFault {
    /// Socket send failed
    Send(String),
    /// Socket receive failed
    Receive(String),
    /// Nothing arrived within the timeout
    Timeout(Duration),
    /// Refused before reaching the network
    RejectedLocally(String),
    /// Command link has not been started
    NotStarted,
}

impl fmt::Display for LinkFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkFault::Send(e) => write!(f, "error on send: {}", e),
            LinkFault::Receive(e) => write!(f, "error on recv: {}", e),
            LinkFault::Timeout(t) => write!(f, "no reply within {} ms", t.as_millis()),
            LinkFault::RejectedLocally(reason) => write!(f, "rejected: {}", reason),
            LinkFault::NotStarted => write!(f, "command link not started"),
        }
    }
}

/// Result of a single command execution
///
/// Immutable once created; callers read it and discard it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    /// Command text as sent (or as refused)
    pub command: String,
    /// Device accepted the command (or, for `rc`, the send succeeded)
    pub acknowledged: bool,
    /// Decoded first reply datagram (empty when none)
    pub primary_reply: String,
    /// Decoded delayed second datagram, if one arrived
    pub secondary_reply: Option<String>,
    /// A datagram was received from the device during this exchange
    pub link_healthy: bool,
    /// Classified reply shape
    pub reply: Reply,
    /// Fault that prevented a normal exchange
    pub fault: Option<LinkFault>,
}

impl CommandOutcome {
    /// Outcome for a command that received at least one reply datagram
    pub fn replied(command: &str, primary: String, secondary: Option<String>, reply: Reply) -> Self {
        Self {
            command: command.to_string(),
            acknowledged: reply.is_acknowledged(),
            primary_reply: primary,
            secondary_reply: secondary,
            link_healthy: true,
            reply,
            fault: None,
        }
    }

    /// Outcome for a command that failed at the socket level or timed out
    pub fn faulted(command: &str, fault: LinkFault) -> Self {
        Self {
            command: command.to_string(),
            acknowledged: false,
            primary_reply: String::new(),
            secondary_reply: None,
            link_healthy: false,
            reply: Reply::Missing,
            fault: Some(fault),
        }
    }

    /// Outcome for a command refused before it reached the network
    ///
    /// `link_healthy` reports the link state observed before the refusal.
    pub fn rejected(command: &str, reason: &str, link_healthy: bool) -> Self {
        Self {
            link_healthy,
            ..Self::faulted(command, LinkFault::RejectedLocally(reason.to_string()))
        }
    }

    /// Outcome for a fire-and-forget command whose datagram was sent
    pub fn sent(command: &str, link_healthy: bool) -> Self {
        Self {
            command: command.to_string(),
            acknowledged: true,
            primary_reply: String::new(),
            secondary_reply: None,
            link_healthy,
            reply: Reply::NotExpected,
            fault: None,
        }
    }

    /// Whether the command was refused locally
    pub fn is_rejected(&self) -> bool {
        matches!(self.fault, Some(LinkFault::RejectedLocally(_)))
    }

    /// Whether the command timed out waiting for a reply
    pub fn is_timeout(&self) -> bool {
        matches!(self.fault, Some(LinkFault::Timeout(_)))
    }

    /// Human-readable response text
    ///
    /// Both reply datagrams joined by a space, or the fault description.
    pub fn response_text(&self) -> String {
        if let Some(fault) = &self.fault {
            return fault.to_string();
        }
        match &self.secondary_reply {
            Some(second) => format!("{} {}", self.primary_reply, second),
            None => self.primary_reply.clone(),
        }
    }

    /// Convert into a `Result`, yielding the trimmed primary reply on success
    pub fn into_result(mut self) -> crate::error::Result<String> {
        if let Some(fault) = self.fault.take() {
            return Err(match fault {
                LinkFault::Send(e) | LinkFault::Receive(e) => Error::Link(e),
                LinkFault::Timeout(t) => Error::Timeout {
                    command: self.command,
                    timeout_ms: t.as_millis() as u64,
                },
                LinkFault::RejectedLocally(reason) => Error::RejectedLocally(reason),
                LinkFault::NotStarted => Error::NotStarted("command link"),
            });
        }
        if !self.acknowledged {
            return Err(Error::Device(self.response_text()));
        }
        Ok(self.primary_reply.trim().to_string())
    }
}

/// Airborne flag
///
/// Only successful `takeoff` and `land` outcomes write it; any thread may read it.
#[derive(Debug, Default)]
pub struct FlightState {
    is_flying: AtomicBool,
}

impl FlightState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flying(&self) -> bool {
        self.is_flying.load(Ordering::Acquire)
    }

    pub(crate) fn set_flying(&self, flying: bool) {
        self.is_flying.store(flying, Ordering::Release);
    }
}

/// Axis-aligned bounding box in normalized image coordinates
///
/// `(x0, y0)` is the top-left corner and `(x1, y1)` the bottom-right,
/// each in `[0, 1]` relative to the detector input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BBox {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Box area as a fraction of the whole image
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Box center relative to the image center (`(0, 0)` = centered)
    pub fn center_offset(&self) -> (f32, f32) {
        (
            (self.x0 + self.x1) / 2.0 - 0.5,
            (self.y0 + self.y1) / 2.0 - 0.5,
        )
    }
}

/// Single detector output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    /// Category label
    pub label: u32,
    /// Normalized bounding box
    pub bbox: BBox,
}

impl Detection {
    pub fn new(label: u32, bbox: BBox) -> Self {
        Self { label, bbox }
    }
}

/// Velocity limits accepted by the `rc` command
pub const RC_MIN: i32 = -100;
pub const RC_MAX: i32 = 100;

/// Velocity vector for the `rc` command
///
/// Components are clamped to [`RC_MIN`]..=[`RC_MAX`] on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RcVelocity {
    /// Left (-) / right (+)
    pub left_right: i32,
    /// Backward (-) / forward (+)
    pub forward_back: i32,
    /// Down (-) / up (+)
    pub up_down: i32,
    /// Counter-clockwise (-) / clockwise (+)
    pub yaw: i32,
}

impl RcVelocity {
    /// All-zero vector: hover in place
    pub const HOVER: RcVelocity = RcVelocity {
        left_right: 0,
        forward_back: 0,
        up_down: 0,
        yaw: 0,
    };

    pub fn new(left_right: i32, forward_back: i32, up_down: i32, yaw: i32) -> Self {
        Self {
            left_right: left_right.clamp(RC_MIN, RC_MAX),
            forward_back: forward_back.clamp(RC_MIN, RC_MAX),
            up_down: up_down.clamp(RC_MIN, RC_MAX),
            yaw: yaw.clamp(RC_MIN, RC_MAX),
        }
    }

    pub fn is_hover(&self) -> bool {
        *self == Self::HOVER
    }
}

impl fmt::Display for RcVelocity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rc {} {} {} {}",
            self.left_right, self.forward_back, self.up_down, self.yaw
        )
    }
}

/// Operator-selected target label, or none
///
/// Written by the operator interface at any time, read on every tracking iteration.
#[derive(Debug)]
pub struct TargetSelection {
    /// Label value, or `NO_TARGET`
    raw: AtomicI64,
}

const NO_TARGET: i64 = -1;

impl TargetSelection {
    pub fn new(label: Option<u32>) -> Self {
        Self {
            raw: AtomicI64::new(label.map_or(NO_TARGET, i64::from)),
        }
    }

    pub fn get(&self) -> Option<u32> {
        let raw = self.raw.load(Ordering::Acquire);
        u32::try_from(raw).ok()
    }

    pub fn set(&self, label: Option<u32>) {
        self.raw
            .store(label.map_or(NO_TARGET, i64::from), Ordering::Release);
    }
}

impl Default for TargetSelection {
    fn default() -> Self {
        Self::new(None)
    }
}

/// Switches the operator flips while the tracker runs
#[derive(Debug, Default)]
pub struct OperatorControls {
    detection_enabled: AtomicBool,
    tracking_enabled: AtomicBool,
    target: TargetSelection,
}

impl OperatorControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_detection_enabled(&self, enabled: bool) {
        self.detection_enabled.store(enabled, Ordering::Release);
    }

    pub fn detection_enabled(&self) -> bool {
        self.detection_enabled.load(Ordering::Acquire)
    }

    pub fn set_tracking_enabled(&self, enabled: bool) {
        self.tracking_enabled.store(enabled, Ordering::Release);
    }

    pub fn tracking_enabled(&self) -> bool {
        self.tracking_enabled.load(Ordering::Acquire)
    }

    pub fn set_target(&self, label: Option<u32>) {
        self.target.set(label);
    }

    pub fn target(&self) -> Option<u32> {
        self.target.get()
    }
}
