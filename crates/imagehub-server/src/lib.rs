//! # imagehub-server
//!
//! Server side of imagehub: the record store, the on-disk storage layout and
//! the sync engine answering Clone, Push, Check and Register exchanges over
//! TCP.
//!
//! ## Example
//!
//! ```ignore
//! use imagehub_server::{serve_background, EngineConfig, LocalStore, ServerConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let config = ServerConfig::default();
//!     let store = Arc::new(LocalStore::in_memory());
//!     let engine = Arc::new(SyncEngine::new(EngineConfig::from(&config), store));
//!
//!     let server = serve_background("127.0.0.1:0".parse().unwrap(), engine).await?;
//!     println!("listening on {}", server.addr());
//!     server.shutdown();
//!     Ok(())
//! }
//! ```

pub mod config;
mod engine;
pub mod identity;
mod layout;
mod server;
pub mod store;

pub use config::{ConfigError, ServerConfig};
pub use engine::{EngineConfig, SyncEngine};
pub use layout::{LayoutError, StorageLayout};
pub use server::{handle_connection, serve, serve_background, ImagehubServer};
pub use store::{LocalStore, RecordStore, StoreError};
