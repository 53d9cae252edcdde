//! # imagehub-format
//!
//! On-disk formats shared by the imagehub client and server.
//!
//! This crate provides:
//! - Snapshot fingerprinting over a directory's entry names
//! - Flat package (zip) building and unpacking with a path-traversal guard
//! - The hidden local state file kept inside a cloned working copy
//!
//! ## Example
//!
//! ```ignore
//! use imagehub_format::{fingerprint, LocalState, Package, PackageBuilder};
//!
//! // Fingerprint a snapshot by its file names
//! let hash = fingerprint(["a.png", "b.png"]);
//!
//! // Build a flat package from a set of files
//! PackageBuilder::new()
//!     .with_file("cats/a.png")
//!     .with_file("cats/b.png")
//!     .write_to_path("cats.zip")?;
//!
//! // Restore it somewhere else
//! Package::open("cats.zip")?.unpack_into("restored")?;
//!
//! // Remember what was cloned
//! LocalState::new(hash, "alice", "cats").save("restored")?;
//! ```

mod archive;
mod error;
mod fingerprint;
mod state;

pub use archive::{Package, PackageBuilder, PackageEntry};
pub use error::{Error, Result};
pub use fingerprint::{fingerprint, Fingerprinter};
pub use state::{LocalState, STATE_FILE_NAME};

/// File extension used for packages, on both sides of the wire.
pub const PACKAGE_EXTENSION: &str = "zip";

/// Server-side package file name for a snapshot: `{folder}-{fingerprint}.zip`.
pub fn package_file_name(folder_name: &str, fingerprint: u32) -> String {
    format!("{}-{}.{}", folder_name, fingerprint, PACKAGE_EXTENSION)
}
