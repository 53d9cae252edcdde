use imagehub_protocol::{FrameError, Status};
use thiserror::Error;

/// Errors from the transfer client.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the imagehub-format crate.
    #[error("Format error: {0}")]
    Format(#[from] imagehub_format::Error),

    /// Malformed or truncated frame.
    #[error("Wire error: {0}")]
    Frame(#[from] FrameError),

    /// Failure reported by the server.
    #[error("Server error: {0}")]
    Status(#[from] Status),

    /// The server could not be reached in time.
    #[error("Connection to {0} timed out")]
    Timeout(String),

    /// The server broke the exchange's message order.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid input parameter.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for imagehub-client operations.
pub type Result<T> = std::result::Result<T, Error>;
