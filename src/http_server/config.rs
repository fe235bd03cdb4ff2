//! HTTP Server Configuration
//!
//! Bind address, request body limits and the help document location.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// HTTP server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpServerConfig {
    /// Host to bind to (default: "0.0.0.0")
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to (default: 9990)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Document served on `GET /` (default: "README.md")
    #[serde(default = "default_help_path")]
    pub help_path: PathBuf,

    /// Largest accepted upload body in bytes (default: 2 MiB)
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Largest accepted edit body in bytes (default: 10 MiB)
    #[serde(default = "default_max_edit_bytes")]
    pub max_edit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9990
}

fn default_help_path() -> PathBuf {
    PathBuf::from("README.md")
}

fn default_max_upload_bytes() -> usize {
    2 << 20
}

fn default_max_edit_bytes() -> usize {
    10 << 20
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            help_path: default_help_path(),
            max_upload_bytes: default_max_upload_bytes(),
            max_edit_bytes: default_max_edit_bytes(),
        }
    }
}

impl HttpServerConfig {
    /// Create a new config with specified port
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Get the socket address string
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HttpServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9990);
        assert_eq!(config.help_path, PathBuf::from("README.md"));
        assert_eq!(config.max_upload_bytes, 2 * 1024 * 1024);
        assert_eq!(config.max_edit_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_socket_addr() {
        let config = HttpServerConfig::with_port(8080);
        assert_eq!(config.socket_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HttpServerConfig = serde_json::from_str(r#"{"port": 1234}"#).unwrap();
        assert_eq!(config.port, 1234);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_upload_bytes, 2 << 20);
    }
}
