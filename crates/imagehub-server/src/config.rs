//! Server configuration.

use crate::layout::StorageLayout;
use imagehub_protocol::frame::MAX_FRAME_LEN;
use imagehub_protocol::CHUNK_SIZE;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default scrypt cost (log2 of N) for new password hashes.
pub const DEFAULT_PASSWORD_COST: u8 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for the imagehub server, loaded from TOML.
///
/// Every key is optional:
///
/// ```toml
/// listen_addr = "0.0.0.0:50051"
/// base_url = "http://localhost:5000/"
/// images_root = "images"
/// archive_root = "archive"
/// database_dir = "db"
/// chunk_size = 4096
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to.
    pub listen_addr: SocketAddr,
    /// Prefix of public repository URLs.
    pub base_url: String,
    /// Root of the canonical (unpacked) repositories.
    pub images_root: PathBuf,
    /// Root of the stored packages.
    pub archive_root: PathBuf,
    /// Where the record store keeps its files. `None` keeps records in memory.
    pub database_dir: Option<PathBuf>,
    /// Bytes per chunk when streaming a package.
    pub chunk_size: usize,
    /// scrypt cost for newly registered passwords.
    pub password_cost: u8,
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Self::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_FRAME_LEN {
            return Err(ConfigError::Invalid(format!(
                "chunk_size must be between 1 and {}",
                MAX_FRAME_LEN
            )));
        }
        if !(1..=20).contains(&self.password_cost) {
            return Err(ConfigError::Invalid(
                "password_cost must be between 1 and 20".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the storage roots.
    pub fn with_roots<P: Into<PathBuf>, Q: Into<PathBuf>>(
        mut self,
        images_root: P,
        archive_root: Q,
    ) -> Self {
        self.images_root = images_root.into();
        self.archive_root = archive_root.into();
        self
    }

    pub fn with_database_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.database_dir = Some(dir.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_password_cost(mut self, cost: u8) -> Self {
        self.password_cost = cost;
        self
    }

    pub fn layout(&self) -> StorageLayout {
        StorageLayout::new(&self.images_root, &self.archive_root)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 50051)),
            base_url: "http://localhost:5000/".to_string(),
            images_root: PathBuf::from("images"),
            archive_root: PathBuf::from("archive"),
            database_dir: None,
            chunk_size: CHUNK_SIZE,
            password_cost: DEFAULT_PASSWORD_COST,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 50051);
        assert_eq!(config.base_url, "http://localhost:5000/");
        assert_eq!(config.chunk_size, 4096);
        assert!(config.database_dir.is_none());
    }

    #[test]
    fn partial_toml_takes_defaults() {
        let config = ServerConfig::from_toml(
            r#"
listen_addr = "127.0.0.1:6000"
database_dir = "/var/lib/imagehub"
"#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:6000".parse().unwrap());
        assert_eq!(
            config.database_dir,
            Some(PathBuf::from("/var/lib/imagehub"))
        );
        assert_eq!(config.images_root, PathBuf::from("images"));
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            ServerConfig::from_toml("chunk_size = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml("password_cost = 40"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ServerConfig::from_toml("listen_addr = 12"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.toml");
        fs::write(&path, "base_url = \"https://img.example.org/\"\n").unwrap();
        let config = ServerConfig::load(&path).unwrap();
        assert_eq!(config.base_url, "https://img.example.org/");

        let missing = ServerConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
