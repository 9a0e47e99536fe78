//! Error types for Drishti

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Drishti error types
///
/// Network faults observed while executing a command are normally carried
/// inside [`crate::core::types::CommandOutcome`] rather than returned as
/// `Err`. These variants are produced when an outcome is converted with
/// [`CommandOutcome::into_result`](crate::core::types::CommandOutcome::into_result),
/// and by component setup (socket binding, thread spawning, config loading).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// Socket-level send/receive failure
    #[error("Link error: {0}")]
    Link(String),

    /// No reply arrived within the command's time budget
    #[error("No reply to '{command}' within {timeout_ms} ms")]
    Timeout {
        /// Command text that went unanswered
        command: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Device answered with the error token
    #[error("Device rejected command: {0}")]
    Device(String),

    /// Reply did not match any known shape
    #[error("Unrecognized reply: {0:?}")]
    ProtocolAmbiguity(String),

    /// OpenCV capture failure
    #[cfg(feature = "camera")]
    #[error("Video capture error: {0}")]
    Capture(#[from] opencv::Error),

    /// Video stream exhausted or broken; the frame source must be restarted
    #[error("Video stream ended")]
    StreamEnded,

    /// Command refused before reaching the network
    #[error("Rejected locally: {0}")]
    RejectedLocally(String),

    /// Component used before `start()`
    #[error("{0} not started")]
    NotStarted(&'static str),

    /// Worker thread panicked
    #[error("Worker thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}
