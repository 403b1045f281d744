//! Session lifecycle gating.
//!
//! Every message that survives validation passes through the gate before the
//! protocol engine dispatches it. The gate owns the handshake:
//!
//! ```text
//!            initialize(ok)           notifications/initialized
//!    ∅ ─────────────────────▶ INITIALIZING ───────────────────────▶ OPEN
//!                                 │                                   │
//!                                 │  reap / init timeout              │ DELETE (HTTP),
//!                                 ▼                                   ▼ EOF (stdio)
//!                               deleted                             CLOSED
//! ```
//!
//! The gate is strict: malformed protocol sequences are refused rather than
//! approximated. All gating failures are `-32600`, except an unsupported
//! protocol version, which is `-32602` with a diagnostic `data` payload.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::TransportKind;
use crate::error::StoreError;
use crate::mcp::protocol::{
    ErrorCode, InitializeResult, JsonRpcError, JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse,
    ProtocolVersion, RequestId, ServerCapabilities, ServerInfo,
};
use crate::session::record::SessionRecord;
use crate::session::store::SessionStore;
use crate::session::SessionStatus;

/// Attempts at generating a fresh, unused session id before giving up.
const ID_ATTEMPTS: u32 = 4;

/// Per-message context supplied by the transport.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Which transport delivered the message.
    pub transport: TransportKind,
    /// The session id accompanying the message: the `Mcp-Session-Id` header
    /// on HTTP, the per-process slot on stdio.
    pub session_id: Option<String>,
    /// The `MCP-Protocol-Version` header value, HTTP only.
    pub version_header: Option<String>,
}

impl RequestContext {
    /// Context for an HTTP request.
    #[must_use]
    pub fn http(session_id: Option<String>, version_header: Option<String>) -> Self {
        Self {
            transport: TransportKind::Http,
            session_id,
            version_header,
        }
    }

    /// Context for a stdio message.
    #[must_use]
    pub fn stdio(session_id: Option<String>) -> Self {
        Self {
            transport: TransportKind::Stdio,
            session_id,
            version_header: None,
        }
    }
}

/// A gating failure.
#[derive(Debug)]
pub enum GateError {
    /// The message was refused; the error is reported to the client.
    Rejected(JsonRpcError),
    /// The session store failed; the transport reports an internal error.
    Store(StoreError),
}

impl From<StoreError> for GateError {
    fn from(source: StoreError) -> Self {
        Self::Store(source)
    }
}

/// Successful `initialize` outcome.
#[derive(Debug)]
pub struct Initialized {
    /// The initialize result response.
    pub response: JsonRpcResponse,
    /// The freshly persisted session record.
    pub record: SessionRecord,
}

/// The session lifecycle gate.
///
/// Shared between the protocol engine and the transports; all state lives in
/// the store.
#[derive(Clone)]
pub struct SessionGate {
    store: Arc<SessionStore>,
}

impl SessionGate {
    /// Creates a gate over the given store.
    #[must_use]
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    /// Handles an `initialize` request: negotiates the protocol version and
    /// persists a new `INITIALIZING` session.
    ///
    /// # Errors
    ///
    /// Rejects the request when a session identity is already established
    /// for this context, when required params are missing, or when the
    /// offered protocol version is unsupported.
    pub fn initialize(
        &self,
        req: &JsonRpcRequest,
        ctx: &RequestContext,
        server_info: &ServerInfo,
    ) -> Result<Initialized, GateError> {
        if ctx.session_id.is_some() {
            let message = match ctx.transport {
                TransportKind::Http => "Session id must not be supplied with initialize",
                TransportKind::Stdio => "Connection already established",
            };
            return Err(GateError::Rejected(JsonRpcError::invalid_request(
                Some(req.id.clone()),
                message,
            )));
        }

        let Some(params) = req.params.as_ref() else {
            return Err(GateError::Rejected(JsonRpcError::invalid_params(
                req.id.clone(),
                "Missing initialize params",
            )));
        };

        let Some(requested) = params.get("protocolVersion").and_then(Value::as_str) else {
            return Err(GateError::Rejected(JsonRpcError::invalid_params(
                req.id.clone(),
                "Missing protocolVersion",
            )));
        };

        let Some(version) = ProtocolVersion::parse(requested) else {
            return Err(GateError::Rejected(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_data(
                    ErrorCode::InvalidParams,
                    "Unsupported protocol version",
                    json!({
                        "supported": ProtocolVersion::supported(),
                        "requested": requested,
                    }),
                ),
            )));
        };

        let Some(client_info) = params.get("clientInfo").and_then(Value::as_object) else {
            return Err(GateError::Rejected(JsonRpcError::invalid_params(
                req.id.clone(),
                "Missing clientInfo",
            )));
        };

        let record = self.persist_new_session(client_info.clone(), version)?;

        info!(
            session = %record.session_id,
            version = %version,
            "session created"
        );

        let result = InitializeResult {
            protocol_version: version,
            capabilities: ServerCapabilities::default(),
            server_info: server_info.clone(),
        };
        let response = JsonRpcResponse::success(
            req.id.clone(),
            serde_json::to_value(result).unwrap_or_default(),
        );

        Ok(Initialized { response, record })
    }

    /// Gates a non-initialize message and returns the session it belongs to.
    ///
    /// Applies, in order: session identity, session existence and openness,
    /// the `2025-06-18` version-header rule (HTTP only), the
    /// `notifications/initialized` transition, and finally the requirement
    /// that requests dispatch only against an `OPEN` session.
    ///
    /// # Errors
    ///
    /// Rejects the message with a `-32600` error when any rule is violated.
    pub fn admit(
        &self,
        method: &str,
        request_id: Option<&RequestId>,
        ctx: &RequestContext,
    ) -> Result<SessionRecord, GateError> {
        let reject = |message: &str| {
            GateError::Rejected(JsonRpcError::invalid_request(request_id.cloned(), message))
        };

        let Some(session_id) = ctx.session_id.as_deref() else {
            let message = match ctx.transport {
                TransportKind::Http => "Missing Mcp-Session-Id header",
                TransportKind::Stdio => "Connection not established",
            };
            return Err(reject(message));
        };

        let Some(mut record) = self.store.read(session_id) else {
            return Err(reject("Invalid or closed session"));
        };
        if record.is_closed() {
            return Err(reject("Invalid or closed session"));
        }

        if record.protocol_version.requires_version_header()
            && ctx.transport == TransportKind::Http
        {
            match ctx.version_header.as_deref() {
                None => return Err(reject("Missing MCP-Protocol-Version header")),
                Some(header) if header != record.protocol_version.as_str() => {
                    return Err(reject("Protocol version mismatch"));
                }
                Some(_) => {}
            }
        }

        if method == "notifications/initialized" && record.status == SessionStatus::Initializing {
            if self.store.update(session_id, SessionStatus::Open).is_none() {
                return Err(reject("Invalid or closed session"));
            }
            record.status = SessionStatus::Open;
            debug!(session = %session_id, "session open");
        }

        if request_id.is_some() && record.status != SessionStatus::Open {
            return Err(reject("Connection not fully initialized"));
        }

        Ok(record)
    }

    /// Closes a session on behalf of a transport (HTTP `DELETE`, stdio
    /// end-of-stream).
    ///
    /// Returns the prior status, or `None` when the session is unknown.
    #[must_use]
    pub fn close(&self, session_id: &str) -> Option<SessionStatus> {
        let prior = self.store.update(session_id, SessionStatus::Closed);
        if prior.is_some() {
            info!(session = %session_id, "session closed");
        }
        prior
    }

    fn persist_new_session(
        &self,
        client_info: serde_json::Map<String, Value>,
        version: ProtocolVersion,
    ) -> Result<SessionRecord, GateError> {
        // Id collisions are vanishingly unlikely; retry a few times anyway
        // since create() refuses to overwrite.
        let mut attempt = 0;
        loop {
            let record = SessionRecord::new(client_info.clone(), version);
            match self.store.create(&record) {
                Ok(()) => return Ok(record),
                Err(StoreError::SessionExists { .. }) if attempt < ID_ATTEMPTS => {
                    attempt += 1;
                }
                Err(e) => return Err(GateError::Store(e)),
            }
        }
    }
}
