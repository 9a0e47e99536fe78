//! Text command set understood by the drone
//!
//! Commands are UTF-8 strings sent as single UDP datagrams to the command
//! port. Each command belongs to a timeout class:
//!
//! | Class | Commands | Budget |
//! |-------|----------|--------|
//! | Long | `takeoff`, `land`, moves, rotations, `go` | `timeouts.long_ms` |
//! | Short | `command`, stream toggles, `emergency`, `stop`, `speed`, queries | `timeouts.short_ms` |
//! | None | `rc` | never waits |

use crate::core::types::RcVelocity;
use std::fmt;

/// Accepted distance for directional moves (cm)
pub const MOVE_RANGE_CM: std::ops::RangeInclusive<u32> = 20..=500;

/// Accepted rotation angle (degrees)
pub const ROTATE_RANGE_DEG: std::ops::RangeInclusive<u32> = 1..=360;

/// Accepted speed (cm/s) for `speed` and `go`
pub const SPEED_RANGE_CM_S: std::ops::RangeInclusive<u32> = 10..=100;

/// Accepted per-axis offset for `go` (cm)
pub const GO_RANGE_CM: std::ops::RangeInclusive<i32> = -500..=500;

/// Reply budget a command needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutClass {
    Short,
    Long,
    /// Fire-and-forget, no reply is awaited
    None,
}

/// Direction for a straight move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    Forward,
    Back,
}

impl Direction {
    fn keyword(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::Forward => "forward",
            Direction::Back => "back",
        }
    }

    fn from_keyword(word: &str) -> Option<Self> {
        Some(match word {
            "up" => Direction::Up,
            "down" => Direction::Down,
            "left" => Direction::Left,
            "right" => Direction::Right,
            "forward" => Direction::Forward,
            "back" => Direction::Back,
            _ => return None,
        })
    }
}

/// Read-only queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Battery percentage
    Battery,
    /// Motor-on time in seconds
    FlightTime,
    /// Configured speed in cm/s
    Speed,
    /// Height in dm
    Height,
}

impl Query {
    fn keyword(self) -> &'static str {
        match self {
            Query::Battery => "battery?",
            Query::FlightTime => "time?",
            Query::Speed => "speed?",
            Query::Height => "height?",
        }
    }
}

/// A drone command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DroneCommand {
    /// Enter SDK (API) mode
    Command,
    Takeoff,
    Land,
    /// Velocity vector, fire-and-forget
    Rc(RcVelocity),
    StreamOn,
    StreamOff,
    /// Stop all motors immediately
    Emergency,
    /// Hover in place
    Stop,
    /// Straight move by a distance in cm
    Move(Direction, u32),
    /// Clockwise rotation in degrees
    Cw(u32),
    /// Counter-clockwise rotation in degrees
    Ccw(u32),
    /// Fly to a relative point at a speed
    Go { x: i32, y: i32, z: i32, speed: u32 },
    /// Set speed in cm/s
    Speed(u32),
    Query(Query),
}

impl DroneCommand {
    /// Timeout class of this command
    pub fn timeout_class(&self) -> TimeoutClass {
        match self {
            DroneCommand::Rc(_) => TimeoutClass::None,
            DroneCommand::Takeoff
            | DroneCommand::Land
            | DroneCommand::Move(..)
            | DroneCommand::Cw(_)
            | DroneCommand::Ccw(_)
            | DroneCommand::Go { .. } => TimeoutClass::Long,
            DroneCommand::Command
            | DroneCommand::StreamOn
            | DroneCommand::StreamOff
            | DroneCommand::Emergency
            | DroneCommand::Stop
            | DroneCommand::Speed(_)
            | DroneCommand::Query(_) => TimeoutClass::Short,
        }
    }

    /// Check argument ranges; returns a reason when out of range
    pub fn validate(&self) -> Option<String> {
        match *self {
            DroneCommand::Move(dir, cm) if !MOVE_RANGE_CM.contains(&cm) => Some(format!(
                "{} distance {} cm outside {:?}",
                dir.keyword(),
                cm,
                MOVE_RANGE_CM
            )),
            DroneCommand::Cw(deg) | DroneCommand::Ccw(deg) if !ROTATE_RANGE_DEG.contains(&deg) => {
                Some(format!("rotation {} deg outside {:?}", deg, ROTATE_RANGE_DEG))
            }
            DroneCommand::Speed(speed) if !SPEED_RANGE_CM_S.contains(&speed) => Some(format!(
                "speed {} cm/s outside {:?}",
                speed, SPEED_RANGE_CM_S
            )),
            DroneCommand::Go { x, y, z, speed } => {
                if !SPEED_RANGE_CM_S.contains(&speed) {
                    return Some(format!("go speed {} cm/s outside {:?}", speed, SPEED_RANGE_CM_S));
                }
                if [x, y, z].iter().any(|v| !GO_RANGE_CM.contains(v)) {
                    return Some(format!("go target ({}, {}, {}) outside {:?}", x, y, z, GO_RANGE_CM));
                }
                if [x, y, z].iter().all(|v| v.abs() <= 20) {
                    return Some("go target within 20 cm on every axis".to_string());
                }
                None
            }
            _ => None,
        }
    }

    /// Parse command text as typed at a console
    pub fn parse(text: &str) -> Option<Self> {
        let mut words = text.split_whitespace();
        let head = words.next()?;
        let args: Vec<&str> = words.collect();
        let int = |i: usize| args.get(i).and_then(|s| s.parse::<i32>().ok());
        let uint = |i: usize| args.get(i).and_then(|s| s.parse::<u32>().ok());

        let cmd = match (head, args.len()) {
            ("command", 0) => DroneCommand::Command,
            ("takeoff", 0) => DroneCommand::Takeoff,
            ("land", 0) => DroneCommand::Land,
            ("streamon", 0) => DroneCommand::StreamOn,
            ("streamoff", 0) => DroneCommand::StreamOff,
            ("emergency", 0) => DroneCommand::Emergency,
            ("stop", 0) => DroneCommand::Stop,
            ("battery?", 0) => DroneCommand::Query(Query::Battery),
            ("time?", 0) => DroneCommand::Query(Query::FlightTime),
            ("speed?", 0) => DroneCommand::Query(Query::Speed),
            ("height?", 0) => DroneCommand::Query(Query::Height),
            ("rc", 4) => DroneCommand::Rc(RcVelocity::new(int(0)?, int(1)?, int(2)?, int(3)?)),
            ("cw", 1) => DroneCommand::Cw(uint(0)?),
            ("ccw", 1) => DroneCommand::Ccw(uint(0)?),
            ("speed", 1) => DroneCommand::Speed(uint(0)?),
            ("go", 4) => DroneCommand::Go {
                x: int(0)?,
                y: int(1)?,
                z: int(2)?,
                speed: uint(3)?,
            },
            (word, 1) => DroneCommand::Move(Direction::from_keyword(word)?, uint(0)?),
            _ => return None,
        };
        Some(cmd)
    }
}

impl fmt::Display for DroneCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DroneCommand::Command => write!(f, "command"),
            DroneCommand::Takeoff => write!(f, "takeoff"),
            DroneCommand::Land => write!(f, "land"),
            DroneCommand::Rc(v) => write!(f, "{}", v),
            DroneCommand::StreamOn => write!(f, "streamon"),
            DroneCommand::StreamOff => write!(f, "streamoff"),
            DroneCommand::Emergency => write!(f, "emergency"),
            DroneCommand::Stop => write!(f, "stop"),
            DroneCommand::Move(dir, cm) => write!(f, "{} {}", dir.keyword(), cm),
            DroneCommand::Cw(deg) => write!(f, "cw {}", deg),
            DroneCommand::Ccw(deg) => write!(f, "ccw {}", deg),
            DroneCommand::Go { x, y, z, speed } => write!(f, "go {} {} {} {}", x, y, z, speed),
            DroneCommand::Speed(speed) => write!(f, "speed {}", speed),
            DroneCommand::Query(q) => write!(f, "{}", q.keyword()),
        }
    }
}

/// How the command link must treat a raw command string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandKind {
    /// `rc ...`: airborne-only, fire-and-forget
    FireAndForget,
    /// Rejected when already airborne; sets the flight flag on success
    Takeoff,
    /// Rejected when grounded; clears the flight flag on success
    Land,
    Plain,
}

impl CommandKind {
    pub(crate) fn of(command: &str) -> Self {
        match command.split_whitespace().next() {
            Some("rc") => CommandKind::FireAndForget,
            Some("takeoff") => CommandKind::Takeoff,
            Some("land") => CommandKind::Land,
            _ => CommandKind::Plain,
        }
    }
}
