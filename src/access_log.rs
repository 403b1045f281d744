//! Access logging for handled MCP messages.
//!
//! When a log path is configured, the server appends one JSON object per
//! handled message (and per custom-endpoint hit), giving operators a
//! transport-agnostic request trail.
//!
//! # Log Format
//!
//! Each entry carries:
//! - `timestamp`: ISO 8601 timestamp
//! - `transport`: `http` or `stdio`
//! - `method`: the JSON-RPC method or HTTP method handled
//! - `target`: request path (HTTP) when applicable
//! - `session`: session id, when one is associated
//! - `outcome`: `ok`, `refused`, or `failed`
//! - `duration_ms`: handling time in milliseconds

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use thiserror::Error;

/// Outcome of a handled message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOutcome {
    /// Handled successfully.
    Ok,
    /// Refused by validation, gating, or dispatch.
    Refused,
    /// The server itself failed.
    Failed,
}

/// One access log entry.
#[derive(Debug, Clone, Serialize)]
pub struct AccessEvent {
    /// ISO 8601 timestamp.
    pub timestamp: String,

    /// Transport that delivered the message.
    pub transport: &'static str,

    /// JSON-RPC or HTTP method.
    pub method: String,

    /// Request path, when the transport has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Session the message belonged to, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Outcome of handling.
    pub outcome: AccessOutcome,

    /// Handling time in milliseconds.
    pub duration_ms: u64,
}

impl AccessEvent {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(
        transport: &'static str,
        method: impl Into<String>,
        outcome: AccessOutcome,
        duration: Duration,
    ) -> Self {
        Self {
            timestamp: current_timestamp(),
            transport,
            method: method.into(),
            target: None,
            session: None,
            outcome,
            #[allow(clippy::cast_possible_truncation)] // Duration in ms fits in u64
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Attaches the request path.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Attaches the session id.
    #[must_use]
    pub fn with_session(mut self, session: Option<String>) -> Self {
        self.session = session;
        self
    }
}

/// Gets the current timestamp in ISO 8601 format.
fn current_timestamp() -> String {
    let duration = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default();

    let secs = duration.as_secs();
    let millis = duration.subsec_millis();
    let (year, month, day) = civil_from_days(secs / 86_400);
    let time_of_day = secs % 86_400;

    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        time_of_day / 3600,
        (time_of_day % 3600) / 60,
        time_of_day % 60
    )
}

/// Converts days since the Unix epoch to a civil (year, month, day).
///
/// Era-based conversion; exact for the whole u64 range we can encounter.
#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
fn civil_from_days(days: u64) -> (u32, u32, u32) {
    let z = days as i64 + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let year = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = (if month <= 2 { year + 1 } else { year }) as u32;
    (year, month, day)
}

/// Access logger that appends events to a file.
pub struct AccessLogger {
    /// Path to the log file.
    log_path: PathBuf,

    /// Buffered writer (wrapped in Mutex for thread safety).
    writer: Mutex<Option<BufWriter<File>>>,

    /// Whether logging is enabled.
    enabled: bool,
}

impl AccessLogger {
    /// Creates a new access logger appending to `log_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the log file cannot be created or opened.
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self, AccessLogError> {
        let log_path = log_path.as_ref().to_path_buf();

        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AccessLogError::Io {
                message: format!("failed to create log directory: {e}"),
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(|e| AccessLogError::Io {
                message: format!("failed to open log file: {e}"),
            })?;

        Ok(Self {
            log_path,
            writer: Mutex::new(Some(BufWriter::new(file))),
            enabled: true,
        })
    }

    /// Creates a disabled access logger (no-op).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            log_path: PathBuf::new(),
            writer: Mutex::new(None),
            enabled: false,
        }
    }

    /// Returns whether logging is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the log file path.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Logs an access event.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    #[allow(clippy::significant_drop_tightening)] // Lock must be held while writing
    pub fn log(&self, event: &AccessEvent) -> Result<(), AccessLogError> {
        if !self.enabled {
            return Ok(());
        }

        let json = serde_json::to_string(event).map_err(|e| AccessLogError::Serialise {
            message: e.to_string(),
        })?;

        let mut guard = self.writer.lock().map_err(|_| AccessLogError::Lock)?;

        if let Some(writer) = guard.as_mut() {
            writeln!(writer, "{json}").map_err(|e| AccessLogError::Io {
                message: format!("failed to write log entry: {e}"),
            })?;
            writer.flush().map_err(|e| AccessLogError::Io {
                message: format!("failed to flush log: {e}"),
            })?;
        }

        Ok(())
    }

    /// Logs an event, ignoring any errors.
    ///
    /// Access logging must never affect request handling.
    pub fn log_silent(&self, event: &AccessEvent) {
        let _ = self.log(event);
    }
}

/// Errors that can occur during access logging.
#[derive(Debug, Error)]
pub enum AccessLogError {
    /// I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
    },

    /// Serialisation error.
    #[error("serialisation error: {message}")]
    Serialise {
        /// Error message.
        message: String,
    },

    /// Failed to acquire the writer lock.
    #[error("failed to acquire lock on access logger")]
    Lock,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::NamedTempFile;

    #[test]
    fn event_serialisation_skips_absent_fields() {
        let event = AccessEvent::new("stdio", "ping", AccessOutcome::Ok, Duration::from_millis(3));
        let json = serde_json::to_string(&event).unwrap();

        assert!(json.contains("\"outcome\":\"ok\""));
        assert!(json.contains("\"duration_ms\":3"));
        assert!(!json.contains("\"target\""));
        assert!(!json.contains("\"session\""));
    }

    #[test]
    fn logger_writes_one_line_per_event() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        let logger = AccessLogger::new(&path).unwrap();
        let event = AccessEvent::new("http", "POST", AccessOutcome::Refused, Duration::ZERO)
            .with_target("/mcp")
            .with_session(Some("cafe".to_string()));
        logger.log(&event).unwrap();

        drop(logger);
        let mut contents = String::new();
        File::open(&path)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();

        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"transport\":\"http\""));
        assert!(contents.contains("\"session\":\"cafe\""));
        assert!(contents.contains("\"outcome\":\"refused\""));
    }

    #[test]
    fn disabled_logger_is_a_no_op() {
        let logger = AccessLogger::disabled();
        assert!(!logger.is_enabled());

        let event = AccessEvent::new("http", "POST", AccessOutcome::Ok, Duration::ZERO);
        logger.log(&event).unwrap();
    }

    #[test]
    fn timestamp_format() {
        let stamp = current_timestamp();
        assert!(stamp.contains('T'));
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.len(), 24); // "2025-08-01T12:30:45.123Z"
    }

    #[test]
    fn civil_conversion_handles_known_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1)); // 2024 leap year start
        assert_eq!(civil_from_days(19_782), (2024, 2, 29)); // leap day
    }
}
