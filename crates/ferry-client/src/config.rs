use std::time::Duration;

use serde::{Deserialize, Serialize};

use ferry_protocol::DEFAULT_PORT;

/// Connection and identity settings for one upload session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    /// How long to wait for each server response. `None` waits forever,
    /// which is the historical behavior of this protocol's clients.
    pub response_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(server: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            response_timeout: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// `host:port` form used for connecting and logging.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClientConfig::new("files.example.net", "alice");
        assert_eq!(config.port, 1379);
        assert!(config.response_timeout.is_none());
        assert_eq!(config.addr(), "files.example.net:1379");
    }

    #[test]
    fn builders() {
        let config = ClientConfig::new("10.0.0.7", "alice")
            .with_port(4000)
            .with_response_timeout(Duration::from_secs(30));
        assert_eq!(config.addr(), "10.0.0.7:4000");
        assert_eq!(config.response_timeout, Some(Duration::from_secs(30)));
    }
}
