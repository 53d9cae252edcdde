use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Category of a protocol-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Code {
    /// The user, repository or snapshot does not exist.
    NotFound,
    /// Storage or I/O failure on the server.
    Internal,
    /// The exchange was abandoned, or the request was refused as a whole.
    Cancelled,
    /// The request could not be interpreted.
    InvalidArgument,
    /// The stream broke before a request could be read.
    Unknown,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Code::NotFound => "not found",
            Code::Internal => "internal",
            Code::Cancelled => "cancelled",
            Code::InvalidArgument => "invalid argument",
            Code::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A protocol-level failure terminating an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Status {
    /// Failure category.
    pub code: Code,
    /// Human-readable detail.
    pub message: String,
}

impl Status {
    /// Create a status with an explicit code.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The addressed user, repository or snapshot does not exist.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// A server-side failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    /// The request was refused, e.g. a duplicate registration.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    /// The request is malformed.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// A failure of the incoming stream itself.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Code::Unknown, message)
    }

    /// Failure category.
    pub fn code(&self) -> Code {
        self.code
    }

    /// Human-readable detail.
    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let status = Status::not_found("Cannot find user: bob");
        assert_eq!(status.to_string(), "not found: Cannot find user: bob");
        assert_eq!(status.code(), Code::NotFound);
        assert_eq!(status.message(), "Cannot find user: bob");
    }

    #[test]
    fn test_status_json() {
        let status = Status::internal("Internal Error");
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, r#"{"code":"Internal","message":"Internal Error"}"#);
        let back: Status = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }
}
