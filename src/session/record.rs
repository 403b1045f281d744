//! Persisted per-session state.
//!
//! A session is a protocol-versioned conversation between one client and
//! this server. Its record is the only state that survives across requests;
//! everything else is recomputed per message.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::mcp::protocol::ProtocolVersion;

/// Session lifecycle status.
///
/// Transitions are monotone: `Initializing → Open → Closed`. The derived
/// `Ord` encodes that order so the store can refuse backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// `initialize` accepted, awaiting `notifications/initialized`.
    Initializing,
    /// Handshake complete; requests may be dispatched.
    Open,
    /// Closed by the client, end-of-stream, or the reaper.
    Closed,
}

/// A persisted session record.
///
/// Serialised as a JSON object at `<sessionDir>/<sessionId>.json`. All
/// fields are required on read; a file missing any of them is treated as a
/// miss by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Opaque 128-bit identifier, 32 lowercase hex digits.
    pub session_id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Wall-clock seconds when the session was created.
    pub opened_at: u64,
    /// Wall-clock seconds when the session was closed, 0 while open.
    pub closed_at: u64,
    /// Opaque client-supplied information from `initialize`.
    pub client_info: Map<String, Value>,
    /// Negotiated protocol version; immutable after creation.
    pub protocol_version: ProtocolVersion,
}

impl SessionRecord {
    /// Creates a fresh record in the `Initializing` state.
    #[must_use]
    pub fn new(client_info: Map<String, Value>, protocol_version: ProtocolVersion) -> Self {
        Self {
            session_id: generate_session_id(),
            status: SessionStatus::Initializing,
            opened_at: now_secs(),
            closed_at: 0,
            client_info,
            protocol_version,
        }
    }

    /// Whether the session has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }

    /// Moves the record to `Closed`, stamping `closedAt`.
    ///
    /// A no-op when already closed, preserving the original close time.
    pub fn close(&mut self, now: u64) {
        if self.status != SessionStatus::Closed {
            self.status = SessionStatus::Closed;
            self.closed_at = now;
        }
    }

    /// Checks the record's internal invariant: `CLOSED ⇔ closedAt ≠ 0`.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        (self.status == SessionStatus::Closed) == (self.closed_at != 0)
    }
}

/// Generates a new session identifier: 16 cryptographically random bytes
/// rendered as 32 lowercase hex digits.
#[must_use]
pub fn generate_session_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current wall-clock time in seconds since the Unix epoch.
#[must_use]
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::new(Map::new(), ProtocolVersion::V2025_06_18)
    }

    #[test]
    fn session_id_is_32_lowercase_hex() {
        let id = generate_session_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn fresh_record_satisfies_invariants() {
        let record = record();
        assert_eq!(record.status, SessionStatus::Initializing);
        assert_eq!(record.closed_at, 0);
        assert!(record.invariants_hold());
    }

    #[test]
    fn close_stamps_closed_at_once() {
        let mut record = record();
        record.close(1000);
        assert!(record.is_closed());
        assert_eq!(record.closed_at, 1000);
        assert!(record.invariants_hold());

        // Closing again must not move the close time.
        record.close(2000);
        assert_eq!(record.closed_at, 1000);
    }

    #[test]
    fn status_ordering_is_monotone() {
        assert!(SessionStatus::Initializing < SessionStatus::Open);
        assert!(SessionStatus::Open < SessionStatus::Closed);
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = record();
        let json = serde_json::to_string(&record).unwrap();
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn wire_form_uses_camel_case_and_screaming_status() {
        let record = record();
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("sessionId").is_some());
        assert!(json.get("openedAt").is_some());
        assert_eq!(json["status"], "INITIALIZING");
        assert_eq!(json["protocolVersion"], "2025-06-18");
    }

    #[test]
    fn record_missing_field_fails_to_parse() {
        let json = r#"{"sessionId":"abc","status":"OPEN","openedAt":1}"#;
        assert!(serde_json::from_str::<SessionRecord>(json).is_err());
    }
}
