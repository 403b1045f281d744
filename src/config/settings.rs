//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! The transport method has no default and must be set explicitly; every
//! other field falls back to a sensible default.

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::expand_tilde;
use crate::error::ConfigError;

/// The carrier protocol for MCP messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Streamable HTTP.
    Http,
    /// Line-delimited JSON-RPC over standard input/output.
    Stdio,
}

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Transport method. Required; there is no default.
    pub transport: TransportKind,

    /// Path of the core MCP endpoint (HTTP only).
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Address the HTTP transport binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Server name advertised during initialisation.
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Server version advertised during initialisation.
    #[serde(default = "default_server_version")]
    pub server_version: String,

    /// Maximum session uptime in seconds; sessions older than this are
    /// closed by the reaper, and their records deleted after twice this.
    #[serde(default = "default_max_uptime")]
    pub max_uptime_secs: u64,

    /// Seconds an `INITIALIZING` session may linger before the reaper
    /// deletes it; also bounds the stdio read timeout.
    #[serde(default = "default_init_timeout")]
    pub init_timeout_secs: u64,

    /// Directory holding one JSON file per session. Defaults to
    /// `<os-temp>/toolgate-mcp-sessions`.
    #[serde(default)]
    pub session_dir: Option<PathBuf>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with('/') {
            return Err(ConfigError::Invalid {
                message: format!("endpoint must start with '/': '{}'", self.endpoint),
            });
        }

        if self.max_uptime_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "max_uptime_secs must be greater than zero".to_string(),
            });
        }

        if self.init_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                message: "init_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.server_name.is_empty() {
            return Err(ConfigError::Invalid {
                message: "server_name cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// The session store directory: the configured path with `~` expanded,
    /// or a directory under the OS temp dir.
    #[must_use]
    pub fn session_dir(&self) -> PathBuf {
        self.session_dir.as_ref().map_or_else(
            || std::env::temp_dir().join("toolgate-mcp-sessions"),
            |dir| expand_tilde(&dir.to_string_lossy()),
        )
    }

    /// The access log path with `~` expanded, when one is configured.
    #[must_use]
    pub fn access_log_path(&self) -> Option<PathBuf> {
        self.logging
            .access_log_path
            .as_ref()
            .map(|path| expand_tilde(&path.to_string_lossy()))
    }

    /// A configuration suitable for tests and embedding: the given
    /// transport, a private session directory, and defaults elsewhere.
    #[must_use]
    pub fn for_transport(transport: TransportKind, session_dir: PathBuf) -> Self {
        Self {
            _schema: None,
            _comment: None,
            transport,
            endpoint: default_endpoint(),
            listen_addr: default_listen_addr(),
            server_name: default_server_name(),
            server_version: default_server_version(),
            max_uptime_secs: default_max_uptime(),
            init_timeout_secs: default_init_timeout(),
            session_dir: Some(session_dir),
            logging: LoggingConfig::default(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Optional path to a JSON-lines access log.
    #[serde(default)]
    pub access_log_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            access_log_path: None,
        }
    }
}

fn default_endpoint() -> String {
    "/".to_string()
}

fn default_listen_addr() -> SocketAddr {
    ([127, 0, 0, 1], 8000).into()
}

fn default_server_name() -> String {
    "toolgate-mcp".to_string()
}

fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

/// Default maximum session uptime: 24 hours.
const fn default_max_uptime() -> u64 {
    86_400
}

/// Default initialisation deadline: 60 seconds.
const fn default_init_timeout() -> u64 {
    60
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r#"{ "transport": "stdio" }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport, TransportKind::Stdio);
        assert_eq!(config.endpoint, "/");
        assert_eq!(config.max_uptime_secs, 86_400);
        assert_eq!(config.init_timeout_secs, 60);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "transport": "http",
            "endpoint": "/api",
            "listen_addr": "0.0.0.0:9000",
            "server_name": "example",
            "server_version": "1.2.3",
            "max_uptime_secs": 3600,
            "init_timeout_secs": 30,
            "session_dir": "/tmp/example-sessions",
            "logging": {
                "level": "debug",
                "access_log_path": "/tmp/access.log"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.transport, TransportKind::Http);
        assert_eq!(config.endpoint, "/api");
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.server_name, "example");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.access_log_path.is_some());
    }

    #[test]
    fn transport_is_required() {
        let json = r#"{ "endpoint": "/" }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"{ "transport": "stdio", "surprise": true }"#;
        assert!(serde_json::from_str::<Config>(json).is_err());
    }

    #[test]
    fn validate_rejects_relative_endpoint() {
        let json = r#"{ "transport": "http", "endpoint": "mcp" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_uptime() {
        let json = r#"{ "transport": "http", "max_uptime_secs": 0 }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn session_dir_has_a_default() {
        let json = r#"{ "transport": "stdio" }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config
            .session_dir()
            .to_string_lossy()
            .contains("toolgate-mcp-sessions"));
    }

    #[test]
    fn session_dir_expands_tilde() {
        let json = r#"{ "transport": "stdio", "session_dir": "~/.toolgate-mcp/sessions" }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        let dir = config.session_dir();
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.to_string_lossy().ends_with(".toolgate-mcp/sessions"));
    }

    #[test]
    fn access_log_path_expands_tilde() {
        let json = r#"{
            "transport": "stdio",
            "logging": { "access_log_path": "~/logs/access.log" }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        let path = config.access_log_path().unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.to_string_lossy().ends_with("logs/access.log"));
    }
}
