//! Configuration loading.
//!
//! The server reads a single JSON file, either from the `--config` CLI flag
//! or from `~/.toolgate-mcp/config.json`. Parsing is strict (unknown fields
//! are refused) and a parsed [`Config`] is validated before use. Path
//! values in the file may use a leading `~` for the home directory.

mod settings;

pub use settings::{Config, LoggingConfig, TransportKind};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// The default configuration file: `config.json` under `~/.toolgate-mcp/`
/// (`%USERPROFILE%\.toolgate-mcp\` on Windows). `None` when no home
/// directory can be determined.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".toolgate-mcp").join("config.json"))
}

/// Loads, parses, and validates the configuration file.
///
/// `path` overrides the default location when given.
///
/// # Errors
///
/// Returns an error when the file is absent, unreadable, not valid JSON,
/// or fails [`Config::validate`].
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().ok_or_else(|| ConfigError::Missing {
            path: PathBuf::from("<default config path>"),
        })?,
    };

    let contents = match std::fs::read_to_string(&config_path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Missing { path: config_path });
        }
        Err(e) => {
            return Err(ConfigError::Read {
                path: config_path,
                source: e,
            });
        }
    };

    let config: Config = serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: config_path,
        source: e,
    })?;

    config.validate()?;
    Ok(config)
}

/// Resolves a leading `~` or `~/` in a path string to the home directory.
///
/// Anything else (including `~user` forms) passes through unchanged, as
/// does everything when no home directory is known.
#[must_use]
pub fn expand_tilde(path: &str) -> PathBuf {
    let Some(rest) = path.strip_prefix('~') else {
        return PathBuf::from(path);
    };

    match (rest.is_empty() || rest.starts_with('/'), dirs::home_dir()) {
        (true, Some(home)) => home.join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_resolves_home_relative_paths() {
        let expanded = expand_tilde("~/.toolgate-mcp/config.json");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded
            .to_string_lossy()
            .ends_with(".toolgate-mcp/config.json"));
    }

    #[test]
    fn expand_tilde_resolves_bare_tilde() {
        assert!(!expand_tilde("~").to_string_lossy().starts_with('~'));
    }

    #[test]
    fn expand_tilde_leaves_other_paths_alone() {
        let path = "/absolute/path/to/config.json";
        assert_eq!(expand_tilde(path), PathBuf::from(path));
        // `~user` forms are not resolved.
        assert_eq!(expand_tilde("~root/x"), PathBuf::from("~root/x"));
    }

    #[test]
    fn default_config_path_names_the_file() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn load_config_reports_missing_file() {
        let result = load_config(Some(Path::new("/nonexistent/toolgate.json")));
        assert!(matches!(result, Err(ConfigError::Missing { .. })));
    }
}
