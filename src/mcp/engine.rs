//! The version-aware JSON-RPC dispatcher.
//!
//! The engine receives one raw payload per call, runs the validator and the
//! session gate, dispatches the MCP method set, and reports a typed
//! [`Outcome`] that tells the transport exactly what to emit: a reply, a
//! notification acknowledgement, or an error with its origin. Transports
//! never inspect message content themselves.
//!
//! # Method Set
//!
//! | Method                     | Response                         |
//! |----------------------------|----------------------------------|
//! | `initialize`               | initialize result                |
//! | `ping`                     | `{}`                             |
//! | `tools/list`               | `{ "tools": [...] }`             |
//! | `tools/call`               | tool-call result                 |
//! | `notifications/*`          | none (transport acknowledges)    |
//! | anything else              | `-32601` method not found        |
//!
//! # Version Shaping
//!
//! Under a negotiated version older than `2025-06-18`, outgoing tool
//! descriptors lose `title` and `outputSchema`, and tool-call results lose
//! `structuredContent`. Comparison uses the single [`ProtocolVersion`]
//! comparator.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::mcp::protocol::{
    validate_message, IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ProtocolVersion, ServerInfo, Validation,
};
use crate::session::lifecycle::{GateError, RequestContext, SessionGate};
use crate::tools::{ToolCallResult, ToolDescriptor, ToolRegistry};

/// Where an error originated, so the HTTP transport can map it to a status
/// code: validation and lifecycle failures are `400`, dispatch failures ride
/// in a `200` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    /// The payload failed JSON or JSON-RPC validation.
    Validation,
    /// The session gate refused the message.
    Lifecycle,
    /// The method-level handler refused the request.
    Dispatch,
}

/// What the transport should emit for one handled payload.
#[derive(Debug)]
pub enum Outcome {
    /// A successful `initialize`: emit the response and advertise the new
    /// session identity.
    Initialized {
        /// The initialize result response.
        response: JsonRpcResponse,
        /// The freshly created session id.
        session_id: String,
        /// The negotiated protocol version.
        version: ProtocolVersion,
    },
    /// A successful request: emit the response.
    Reply {
        /// The response to emit.
        response: JsonRpcResponse,
        /// The session's negotiated protocol version.
        version: ProtocolVersion,
        /// Expected duration hint for the invoked tool, when one exists.
        expected_duration: Option<u64>,
    },
    /// A notification that passed the gate: acknowledge without a body.
    Ack {
        /// The session's negotiated protocol version.
        version: ProtocolVersion,
    },
    /// The message was refused: emit the error.
    Fail {
        /// The error to emit.
        error: JsonRpcError,
        /// Where the error originated.
        origin: ErrorOrigin,
    },
    /// The server itself failed (session store I/O); the transport reports
    /// an internal error without a JSON-RPC body.
    Internal {
        /// Description for the log.
        message: String,
    },
}

/// The MCP protocol engine.
pub struct ProtocolEngine {
    registry: Arc<ToolRegistry>,
    gate: SessionGate,
    server_info: ServerInfo,
}

impl ProtocolEngine {
    /// Creates an engine over the given registry and session gate.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, gate: SessionGate, server_info: ServerInfo) -> Self {
        Self {
            registry,
            gate,
            server_info,
        }
    }

    /// The session gate shared with the transports.
    #[must_use]
    pub fn gate(&self) -> &SessionGate {
        &self.gate
    }

    /// Handles one raw payload and reports what to emit.
    pub async fn handle(&self, payload: &str, ctx: &RequestContext) -> Outcome {
        match validate_message(payload) {
            Validation::Unparseable => Outcome::Fail {
                error: JsonRpcError::invalid_request(None, "Request body is not valid JSON"),
                origin: ErrorOrigin::Validation,
            },
            Validation::Malformed { message } => Outcome::Fail {
                error: JsonRpcError::invalid_request(None, message),
                origin: ErrorOrigin::Validation,
            },
            Validation::WellFormed(message) => self.dispatch(message, ctx).await,
        }
    }

    async fn dispatch(&self, message: IncomingMessage, ctx: &RequestContext) -> Outcome {
        match message {
            IncomingMessage::Request(req) if req.method == "initialize" => {
                self.handle_initialize(&req, ctx)
            }
            IncomingMessage::Request(req) => self.handle_request(req, ctx).await,
            IncomingMessage::Notification(notif) if notif.method == "initialize" => Outcome::Fail {
                error: JsonRpcError::invalid_request(None, "initialize must carry an id"),
                origin: ErrorOrigin::Lifecycle,
            },
            IncomingMessage::Notification(notif) => {
                match self.gate.admit(&notif.method, None, ctx) {
                    Ok(record) => Outcome::Ack {
                        version: record.protocol_version,
                    },
                    Err(e) => gate_failure(e),
                }
            }
        }
    }

    fn handle_initialize(&self, req: &JsonRpcRequest, ctx: &RequestContext) -> Outcome {
        match self.gate.initialize(req, ctx, &self.server_info) {
            Ok(initialized) => Outcome::Initialized {
                response: initialized.response,
                session_id: initialized.record.session_id,
                version: initialized.record.protocol_version,
            },
            Err(e) => gate_failure(e),
        }
    }

    async fn handle_request(&self, req: JsonRpcRequest, ctx: &RequestContext) -> Outcome {
        // Refused before gating; a notification carrying an id must not
        // trigger lifecycle transitions.
        if req.method.starts_with("notifications/") {
            return Outcome::Fail {
                error: JsonRpcError::invalid_request(
                    Some(req.id),
                    "Notifications must not carry an id",
                ),
                origin: ErrorOrigin::Validation,
            };
        }

        let record = match self.gate.admit(&req.method, Some(&req.id), ctx) {
            Ok(record) => record,
            Err(e) => return gate_failure(e),
        };
        let version = record.protocol_version;

        debug!(method = %req.method, session = %record.session_id, "dispatching request");

        let result = match req.method.as_str() {
            "ping" => Ok((json!({}), None)),
            "tools/list" => self.handle_tools_list(&req, version),
            "tools/call" => self.handle_tools_call(&req, version).await,
            method => Err(JsonRpcError::method_not_found(req.id.clone(), method)),
        };

        match result {
            Ok((value, expected_duration)) => Outcome::Reply {
                response: JsonRpcResponse::success(req.id, value),
                version,
                expected_duration,
            },
            Err(error) => Outcome::Fail {
                error,
                origin: ErrorOrigin::Dispatch,
            },
        }
    }

    fn handle_tools_list(
        &self,
        req: &JsonRpcRequest,
        version: ProtocolVersion,
    ) -> Result<(Value, Option<u64>), JsonRpcError> {
        if req
            .params
            .as_ref()
            .is_some_and(|params| params.contains_key("cursor"))
        {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                "Pagination is not supported",
            ));
        }

        let tools: Vec<Value> = self
            .registry
            .list_tools()
            .into_iter()
            .map(|descriptor| {
                serde_json::to_value(shape_descriptor(descriptor, version)).unwrap_or_default()
            })
            .collect();

        Ok((json!({ "tools": tools }), None))
    }

    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
        version: ProtocolVersion,
    ) -> Result<(Value, Option<u64>), JsonRpcError> {
        let Some(params) = req.params.as_ref() else {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                "Missing tool call params",
            ));
        };

        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                "Missing tool name",
            ));
        };

        if !self.registry.has_tool(name) {
            return Err(JsonRpcError::invalid_params(
                req.id.clone(),
                format!("Unknown tool: {name}"),
            ));
        }

        let arguments = params
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Map::new);

        let result = self.registry.invoke(name, &arguments).await;
        if result.is_error {
            warn!(tool = %name, "tool reported an error result");
        }

        let timing = self.registry.tool_timing(name);
        let shaped = shape_result(result, version);

        Ok((
            serde_json::to_value(shaped).unwrap_or_default(),
            (timing > 0).then_some(timing),
        ))
    }
}

/// Converts a gate failure into an outcome.
fn gate_failure(error: GateError) -> Outcome {
    match error {
        GateError::Rejected(error) => Outcome::Fail {
            error,
            origin: ErrorOrigin::Lifecycle,
        },
        GateError::Store(e) => Outcome::Internal {
            message: format!("session store failure: {e}"),
        },
    }
}

/// Applies version-dependent shaping to an outgoing tool descriptor.
fn shape_descriptor(mut descriptor: ToolDescriptor, version: ProtocolVersion) -> ToolDescriptor {
    if !version.supports_structured_output() {
        descriptor.title = None;
        descriptor.output_schema = None;
    }
    descriptor
}

/// Applies version-dependent shaping to an outgoing tool-call result.
fn shape_result(mut result: ToolCallResult, version: ProtocolVersion) -> ToolCallResult {
    if !version.supports_structured_output() {
        result.structured_content = None;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shaping_strips_structured_fields_for_older_versions() {
        let descriptor = ToolDescriptor::new("t", "d", json!({"type": "object"}))
            .with_title("T")
            .with_output_schema(json!({"type": "object"}));

        let shaped = shape_descriptor(descriptor.clone(), ProtocolVersion::V2025_03_26);
        assert!(shaped.title.is_none());
        assert!(shaped.output_schema.is_none());

        let kept = shape_descriptor(descriptor, ProtocolVersion::V2025_06_18);
        assert_eq!(kept.title.as_deref(), Some("T"));
        assert!(kept.output_schema.is_some());
    }

    #[test]
    fn shaping_strips_structured_content_for_older_versions() {
        let result = ToolCallResult::text("5").with_structured(json!({"sum": 5}));

        let shaped = shape_result(result.clone(), ProtocolVersion::V2025_03_26);
        assert!(shaped.structured_content.is_none());
        assert!(!shaped.content.is_empty());

        let kept = shape_result(result, ProtocolVersion::V2025_06_18);
        assert_eq!(kept.structured_content, Some(json!({"sum": 5})));
    }
}
