use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when working with packages and local state.
#[derive(Debug, Error)]
pub enum Error {
    /// A package entry would be written outside of the destination root.
    #[error("illegal file path: {0}")]
    IllegalPath(String),

    /// A source path handed to the packer has no usable file name.
    #[error("invalid source file: {0}")]
    InvalidSource(String),

    /// The local state file does not exist.
    #[error("local state not found: {}", .0.display())]
    StateNotFound(PathBuf),

    /// The local state file exists but could not be parsed.
    #[error("invalid local state: {0}")]
    InvalidState(String),

    /// Error from the zip library.
    #[error("zip error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// TOML serialization error.
    #[error("toml serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
}

/// Result type for imagehub-format operations.
pub type Result<T> = std::result::Result<T, Error>;
