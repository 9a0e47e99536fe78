//! UDP links to the drone
//!
//! - [`command`]: Request/reply command channel with flight-state tracking
//! - [`telemetry`]: Unsolicited status stream
//! - [`protocol`]: Typed command set and timeout classes
//! - [`reply`]: Reply classification

pub mod command;
pub mod protocol;
pub mod reply;
pub mod telemetry;

pub use command::CommandLink;
pub use protocol::{Direction, DroneCommand, Query, TimeoutClass};
pub use telemetry::{StatusSocket, TelemetryLink, TelemetrySnapshot};
