//! # imagehub-client
//!
//! Operator side of imagehub.
//!
//! This crate provides:
//! - Working directory scanning and fingerprinting
//! - A [`TransferClient`] for the Push, Clone, Check and Register exchanges
//!
//! ## Example
//!
//! ```ignore
//! use imagehub_client::{ClientConfig, Login, TransferClient};
//!
//! #[tokio::main]
//! async fn main() -> imagehub_client::Result<()> {
//!     let client = TransferClient::new(ClientConfig::default());
//!     let login = Login::new("alice", "s3cret");
//!     let response = client
//!         .push("./cats", "http://localhost:5000/alice/cats", &login)
//!         .await?;
//!     println!("{}", response.result);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;
pub mod workdir;

pub use client::{ClonedRepository, Login, TransferClient};
pub use config::ClientConfig;
pub use error::{Error, Result};
