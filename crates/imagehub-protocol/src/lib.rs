//! # imagehub-protocol
//!
//! Messages exchanged between the imagehub client and server.
//!
//! This crate provides:
//! - Typed messages for the Clone, Push, Check and Register exchanges
//! - `Status` failures with a category `Code`
//! - Repository URL parsing (`owner/folder`)
//! - A length-prefixed frame codec over any tokio byte stream
//!
//! Each exchange runs on its own connection. Items of a stream are written
//! and read strictly in order; `Frame::End` closes a stream and is never an
//! item itself.

pub mod frame;
mod messages;
mod path;
mod status;

pub use frame::{read_frame, write_frame, Frame, FrameError, FrameResult};
pub use messages::{
    Call, CheckRequest, CheckResponse, CheckStatus, CloneRequest, CloneResponse, Credentials,
    Metadata, PushRequest, PushResponse, RegisterRequest, RegisterResponse, Reply,
};
pub use path::RepositoryPath;
pub use status::{Code, Status};

/// Size of every package chunk put on the wire.
pub const CHUNK_SIZE: usize = 4 * 1024;
