use imagehub_protocol::CHUNK_SIZE;
use std::time::Duration;

/// Transfer client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server address as `host:port`.
    pub server_addr: String,
    /// Limit on establishing the connection. Exchanges themselves have no
    /// timeout.
    pub connect_timeout: Duration,
    /// Prefix of public repository URLs.
    pub base_url: String,
    /// Bytes per chunk when uploading a package.
    pub chunk_size: usize,
}

impl ClientConfig {
    pub fn new(server_addr: impl Into<String>) -> Self {
        Self {
            server_addr: server_addr.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:50051".to_string(),
            connect_timeout: Duration::from_secs(20),
            base_url: "http://localhost:5000/".to_string(),
            chunk_size: CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.server_addr, "127.0.0.1:50051");
        assert_eq!(config.connect_timeout, Duration::from_secs(20));
        assert_eq!(config.chunk_size, 4096);
    }

    #[test]
    fn config_builder() {
        let config = ClientConfig::new("hub.example.org:6000")
            .with_connect_timeout(Duration::from_secs(2))
            .with_chunk_size(0);
        assert_eq!(config.server_addr, "hub.example.org:6000");
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.chunk_size, 1);
    }
}
