//! Configuration for Drishti
//!
//! Loads configuration from a TOML file. Every field has a default so a
//! partial file (or no file at all) yields a working setup for a drone in
//! its factory access-point mode.
//!
//! ```toml
//! [drone]
//! ip = "192.168.10.1"
//! command_port = 8889
//!
//! [timeouts]
//! short_ms = 500
//! long_ms = 15000
//! secondary_ms = 250
//!
//! [tracking]
//! dead_zone = 0.1
//! min_area = 0.04
//! max_area = 0.3
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DrishtiConfig {
    #[serde(default)]
    pub drone: DroneConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Drone addressing for the command channel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DroneConfig {
    /// Drone IP address (factory access point assigns 192.168.10.1)
    #[serde(default = "default_drone_ip")]
    pub ip: IpAddr,

    /// Drone command port
    #[serde(default = "default_command_port")]
    pub command_port: u16,

    /// Local address to bind the command socket on
    #[serde(default = "default_local_ip")]
    pub local_ip: IpAddr,

    /// Local command port (0 = any free port)
    #[serde(default = "default_command_port")]
    pub local_command_port: u16,
}

/// Telemetry socket configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// Local address to bind the telemetry socket on
    #[serde(default = "default_local_ip")]
    pub local_ip: IpAddr,

    /// Port the drone pushes status packets to
    #[serde(default = "default_telemetry_port")]
    pub local_port: u16,
}

/// Command timeouts
///
/// These are fixed policy constants, not negotiated with the device.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    /// Reply budget for mode toggles and queries
    #[serde(default = "default_short_ms")]
    pub short_ms: u64,

    /// Reply budget for takeoff, land and point-to-point moves
    #[serde(default = "default_long_ms")]
    pub long_ms: u64,

    /// Wait for an optional second datagram after the first reply
    #[serde(default = "default_secondary_ms")]
    pub secondary_ms: u64,

    /// Socket read timeout used by listener threads to observe stop requests
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

/// Video ingestion configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoConfig {
    /// Run the video and tracking pipeline in the daemon
    #[serde(default)]
    pub enabled: bool,

    /// Local UDP port the drone streams video to
    #[serde(default = "default_video_port")]
    pub local_port: u16,

    /// Upper bound on buffered frames dropped per acquisition cycle
    #[serde(default = "default_max_drain")]
    pub max_drain_per_cycle: usize,

    /// Capture read timeout; a longer gap ends the stream
    #[serde(default = "default_video_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// A grab returning faster than this came from the decoder's buffer
    #[serde(default = "default_catch_up_ms")]
    pub catch_up_ms: u64,
}

/// Visual tracking policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Square side (pixels) frames are resized to before detection
    #[serde(default = "default_input_size")]
    pub input_size: u32,

    /// Half-width of the centering dead-zone in normalized offset units
    #[serde(default = "default_dead_zone")]
    pub dead_zone: f32,

    /// Box area below which the target is considered too far
    #[serde(default = "default_min_area")]
    pub min_area: f32,

    /// Box area above which the target is considered too close
    #[serde(default = "default_max_area")]
    pub max_area: f32,

    /// Magnitude of each corrective velocity component (1-100)
    #[serde(default = "default_speed")]
    pub speed: i32,

    /// Pause after every issued velocity command
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// How long the controller waits for a new frame before re-checking shutdown
    #[serde(default = "default_frame_wait_ms")]
    pub frame_wait_ms: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_drone_ip() -> IpAddr {
    IpAddr::from([192, 168, 10, 1])
}

fn default_local_ip() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_command_port() -> u16 {
    8889
}

fn default_telemetry_port() -> u16 {
    8890
}

fn default_short_ms() -> u64 {
    500
}

fn default_long_ms() -> u64 {
    15_000
}

fn default_secondary_ms() -> u64 {
    250
}

fn default_poll_ms() -> u64 {
    100
}

fn default_video_port() -> u16 {
    11111
}

fn default_max_drain() -> usize {
    16
}

fn default_video_read_timeout_ms() -> u64 {
    3000
}

fn default_catch_up_ms() -> u64 {
    5
}

fn default_input_size() -> u32 {
    300
}

fn default_dead_zone() -> f32 {
    0.1
}

fn default_min_area() -> f32 {
    0.04
}

fn default_max_area() -> f32 {
    0.3
}

fn default_speed() -> i32 {
    10
}

fn default_settle_ms() -> u64 {
    500
}

fn default_frame_wait_ms() -> u64 {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            ip: default_drone_ip(),
            command_port: default_command_port(),
            local_ip: default_local_ip(),
            local_command_port: default_command_port(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            local_ip: default_local_ip(),
            local_port: default_telemetry_port(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            short_ms: default_short_ms(),
            long_ms: default_long_ms(),
            secondary_ms: default_secondary_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            local_port: default_video_port(),
            max_drain_per_cycle: default_max_drain(),
            read_timeout_ms: default_video_read_timeout_ms(),
            catch_up_ms: default_catch_up_ms(),
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            input_size: default_input_size(),
            dead_zone: default_dead_zone(),
            min_area: default_min_area(),
            max_area: default_max_area(),
            speed: default_speed(),
            settle_ms: default_settle_ms(),
            frame_wait_ms: default_frame_wait_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl DroneConfig {
    /// Drone's command endpoint
    pub fn command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.command_port)
    }

    /// Local endpoint the command socket binds to
    pub fn local_command_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_ip, self.local_command_port)
    }
}

impl TelemetryConfig {
    /// Local endpoint the telemetry socket binds to
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.local_ip, self.local_port)
    }
}

impl VideoConfig {
    /// Stream location to hand to a decoder (`udp://0.0.0.0:<port>`)
    pub fn stream_url(&self) -> String {
        format!("udp://0.0.0.0:{}", self.local_port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn catch_up(&self) -> Duration {
        Duration::from_millis(self.catch_up_ms)
    }
}

impl TimeoutConfig {
    pub fn short(&self) -> Duration {
        Duration::from_millis(self.short_ms)
    }

    pub fn long(&self) -> Duration {
        Duration::from_millis(self.long_ms)
    }

    pub fn secondary(&self) -> Duration {
        Duration::from_millis(self.secondary_ms)
    }

    pub fn poll(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }
}

impl TrackingConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }
}

impl DrishtiConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use drishti::config::DrishtiConfig;
    ///
    /// let config = DrishtiConfig::from_file("drishti.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: DrishtiConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        let t = &self.timeouts;
        if t.secondary_ms >= t.short_ms {
            return Err(Error::Config(format!(
                "timeouts.secondary_ms ({}) must be shorter than timeouts.short_ms ({})",
                t.secondary_ms, t.short_ms
            )));
        }
        if t.short_ms > t.long_ms {
            return Err(Error::Config(format!(
                "timeouts.short_ms ({}) must not exceed timeouts.long_ms ({})",
                t.short_ms, t.long_ms
            )));
        }
        if t.poll_ms == 0 {
            return Err(Error::Config("timeouts.poll_ms must be positive".to_string()));
        }

        let v = &self.video;
        if v.max_drain_per_cycle == 0 {
            return Err(Error::Config("video.max_drain_per_cycle must be positive".to_string()));
        }
        if v.read_timeout_ms == 0 {
            return Err(Error::Config("video.read_timeout_ms must be positive".to_string()));
        }

        let tr = &self.tracking;
        if tr.input_size == 0 {
            return Err(Error::Config("tracking.input_size must be positive".to_string()));
        }
        if tr.min_area >= tr.max_area {
            return Err(Error::Config(format!(
                "tracking.min_area ({}) must be below tracking.max_area ({})",
                tr.min_area, tr.max_area
            )));
        }
        if !(1..=100).contains(&tr.speed) {
            return Err(Error::Config(format!(
                "tracking.speed ({}) must be within 1..=100",
                tr.speed
            )));
        }
        if tr.dead_zone < 0.0 || tr.dead_zone >= 0.5 {
            return Err(Error::Config(format!(
                "tracking.dead_zone ({}) must be within [0, 0.5)",
                tr.dead_zone
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DrishtiConfig::default();
        assert_eq!(config.drone.command_addr().to_string(), "192.168.10.1:8889");
        assert_eq!(config.telemetry.bind_addr().to_string(), "0.0.0.0:8890");
        assert_eq!(config.timeouts.short_ms, 500);
        assert_eq!(config.timeouts.long_ms, 15_000);
        assert!(config.timeouts.secondary_ms < config.timeouts.short_ms);
        assert_eq!(config.video.stream_url(), "udp://0.0.0.0:11111");
        assert_eq!(config.tracking.input_size, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_content = r#"
[drone]
ip = "10.0.0.7"

[tracking]
settle_ms = 200
"#;

        let config: DrishtiConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.drone.ip.to_string(), "10.0.0.7");
        assert_eq!(config.drone.command_port, 8889);
        assert_eq!(config.tracking.settle_ms, 200);
        assert_eq!(config.tracking.dead_zone, 0.1);
        assert_eq!(config.logging.level, "info");
        assert!(!config.video.enabled);
        assert_eq!(config.video.read_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_video_section() {
        let config: DrishtiConfig = toml::from_str("[video]\nenabled = true\nlocal_port = 11112\n").unwrap();
        assert!(config.video.enabled);
        assert_eq!(config.video.stream_url(), "udp://0.0.0.0:11112");
        assert_eq!(config.video.max_drain_per_cycle, 16);
        assert_eq!(config.video.catch_up(), Duration::from_millis(5));
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_serialization() {
        let config = DrishtiConfig::default();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        assert!(toml_string.contains("[drone]"));
        assert!(toml_string.contains("[timeouts]"));
        assert!(toml_string.contains("[tracking]"));
        assert!(toml_string.contains("long_ms = 15000"));
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drishti.toml");

        let mut config = DrishtiConfig::default();
        config.tracking.speed = 25;
        config.to_file(&path).unwrap();

        let loaded = DrishtiConfig::from_file(&path).unwrap();
        assert_eq!(loaded.tracking.speed, 25);
    }

    #[test]
    fn test_secondary_must_be_shorter_than_short() {
        let mut config = DrishtiConfig::default();
        config.timeouts.secondary_ms = config.timeouts.short_ms;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_area_band_must_be_ordered() {
        let mut config = DrishtiConfig::default();
        config.tracking.min_area = 0.5;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[drone\nip = ").unwrap();
        assert!(matches!(
            DrishtiConfig::from_file(&path),
            Err(Error::Config(_))
        ));
    }
}
