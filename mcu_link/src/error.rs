/*!
Common error types for the MCU link components.
*/

use thiserror::Error;

/// Common result type used throughout the link library
pub type Result<T> = std::result::Result<T, LinkError>;

/// Error type for link operations that reach the application
///
/// Inbound framing problems are recovered inside the receive path and only
/// surface here when a caller decodes frames directly.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Frame validation errors
    #[error("Frame error: {0}")]
    Frame(#[from] crate::frame::FrameError),

    /// I/O errors on the serial line
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The serial device could not be opened
    #[error("Failed to open serial port {port}: {reason}")]
    PortOpen { port: String, reason: String },

    /// Fewer bytes than a whole frame went out in a single write
    #[error("Partial write: {written} of {expected} bytes")]
    PartialWrite { written: usize, expected: usize },

    /// Base-control operation code outside the known table
    #[error("Unknown base control command: {0}")]
    UnknownControl(u8),

    /// A request the MCU protocol has no frame for
    #[error("Rejected request: {0}")]
    Rejected(String),

    /// A link thread panicked instead of returning its stats
    #[error("{0} thread panicked")]
    ThreadPanic(&'static str),

    /// `start` was called on a link whose threads are already running
    #[error("Link already started")]
    AlreadyStarted,

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LinkError {
    /// Create a new port-open error
    pub fn port_open(port: impl Into<String>, reason: impl ToString) -> Self {
        Self::PortOpen {
            port: port.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a new rejected-request error
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
