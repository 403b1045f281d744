//! Transport adapters.
//!
//! Transports carry raw payloads between the client and the protocol
//! engine. They never interpret message semantics; their whole job is
//! framing, header handling, and mapping engine [`Outcome`]s onto the wire.
//!
//! [`Outcome`]: crate::mcp::engine::Outcome

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use serde_json::Value;

/// Best-effort extraction of the JSON-RPC method name for access logging.
///
/// Returns `"?"` when the payload does not parse; the validator will report
/// the real problem to the client.
#[must_use]
pub(crate) fn rpc_method(payload: &str) -> String {
    serde_json::from_str::<Value>(payload)
        .ok()
        .and_then(|value| {
            value
                .get("method")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| "?".to_string())
}
