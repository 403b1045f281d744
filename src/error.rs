//! Error types for toolgate-mcp.
//!
//! Protocol-level failures are not represented here; they are JSON-RPC error
//! objects built in [`crate::mcp::protocol`] and travel to the client. These
//! types cover the server's own failure modes: configuration loading and
//! session store I/O.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while loading or checking the configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No configuration file at the resolved location.
    #[error("no configuration file at {path}")]
    Missing {
        /// Where the file was looked for.
        path: PathBuf,
    },

    /// The file exists but could not be read.
    #[error("could not read configuration file {path}")]
    Read {
        /// The unreadable file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("configuration file {path} did not parse")]
    Parse {
        /// The offending file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The parsed configuration breaks a constraint.
    #[error("invalid configuration: {message}")]
    Invalid {
        /// Which constraint, and how.
        message: String,
    },
}

/// Errors that can occur in the session store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A filesystem operation failed.
    #[error("session store I/O error at {path}")]
    Io {
        /// Path involved in the failed operation.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A session record could not be serialised.
    #[error("failed to serialise session record")]
    Serialise {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A session with this id already exists.
    #[error("session already exists: {session}")]
    SessionExists {
        /// The colliding session id.
        session: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_name_the_path() {
        let error = ConfigError::Missing {
            path: PathBuf::from("/etc/toolgate/config.json"),
        };
        assert!(error.to_string().contains("/etc/toolgate/config.json"));
    }

    #[test]
    fn store_error_names_the_session() {
        let error = StoreError::SessionExists {
            session: "deadbeef".to_string(),
        };
        assert!(error.to_string().contains("deadbeef"));
    }
}
