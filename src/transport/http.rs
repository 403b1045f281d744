//! Streamable HTTP transport.
//!
//! A persistent hyper server carries the core MCP endpoint and any
//! host-registered custom endpoints. Session state lives in the shared
//! [`SessionStore`], so several server processes may serve the same store
//! concurrently.
//!
//! # Surface
//!
//! - `OPTIONS` — CORS preflight, 204.
//! - `POST` on the core endpoint — one JSON-RPC message per request.
//! - `DELETE` on the core endpoint — closes the session named by the
//!   `Mcp-Session-Id` header.
//! - Anything else on the core endpoint — 405 with `Allow: POST, DELETE`.
//! - Custom endpoints receive their requests verbatim and do their own
//!   method policing.
//!
//! Validation and lifecycle failures map to 400, dispatch failures ride in
//! a 200 envelope, notification acknowledgements are 202, internal
//! failures are 500.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::access_log::{AccessEvent, AccessLogger, AccessOutcome};
use crate::config::Config;
use crate::mcp::engine::{ErrorOrigin, Outcome, ProtocolEngine};
use crate::mcp::protocol::{JsonRpcError, ProtocolVersion};
use crate::session::lifecycle::RequestContext;
use crate::session::record::now_secs;
use crate::session::store::SessionStore;
use crate::tools::ToolRegistry;

/// Session identity header.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
/// Protocol version header, required both directions under `2025-06-18`.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";
/// Expected duration hint header for long-running tools.
pub const EXPECTED_DURATION_HEADER: &str = "Mcp-Expected-Duration";

/// The streamable HTTP transport.
pub struct HttpTransport {
    engine: Arc<ProtocolEngine>,
    registry: Arc<ToolRegistry>,
    store: Arc<SessionStore>,
    config: Arc<Config>,
    access_log: Arc<AccessLogger>,
}

impl HttpTransport {
    /// Creates an HTTP transport over the given engine, registry, and store.
    #[must_use]
    pub fn new(
        engine: Arc<ProtocolEngine>,
        registry: Arc<ToolRegistry>,
        store: Arc<SessionStore>,
        config: Arc<Config>,
        access_log: Arc<AccessLogger>,
    ) -> Self {
        Self {
            engine,
            registry,
            store,
            config,
            access_log,
        }
    }

    /// Binds the configured address and serves until interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or accepting fails.
    pub async fn serve(self: Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(
            addr = %self.config.listen_addr,
            endpoint = %self.config.endpoint,
            "HTTP transport listening"
        );

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupt received, shutting down");
                    break;
                }
            };
            debug!(%peer, "accepted connection");

            let transport = Arc::clone(&self);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let transport = Arc::clone(&transport);
                    async move { Ok::<_, Infallible>(transport.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!(error = %e, "connection error");
                }
            });
        }

        Ok(())
    }

    /// Handles one HTTP request end to end, bounded by the per-request
    /// wall-clock limit.
    async fn handle(&self, req: Request<hyper::body::Incoming>) -> Response<Full<Bytes>> {
        let started = Instant::now();
        let (parts, body) = req.into_parts();

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(error = %e, "failed to read request body");
                return error_body(StatusCode::BAD_REQUEST, "Failed to read request body");
            }
        };

        let path = parts.uri.path().to_string();
        let response = match timeout(
            self.request_deadline(),
            self.handle_request(&parts.method, &path, &parts.headers, body),
        )
        .await
        {
            Ok(response) => response,
            Err(_) => {
                error!(%path, "request exceeded wall-clock limit");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Request timed out")
            }
        };

        let outcome = match response.status() {
            status if status.is_server_error() => AccessOutcome::Failed,
            status if status.is_client_error() => AccessOutcome::Refused,
            _ => AccessOutcome::Ok,
        };
        self.access_log.log_silent(
            &AccessEvent::new("http", parts.method.to_string(), outcome, started.elapsed())
                .with_target(path)
                .with_session(header_value(&parts.headers, SESSION_ID_HEADER)),
        );

        response
    }

    /// Routes one decoded request.
    ///
    /// Public so that embedders and tests can drive the transport without a
    /// socket.
    pub async fn handle_request(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        // Sweep expired sessions before touching any of them.
        self.store.reap(
            now_secs(),
            self.config.max_uptime_secs,
            self.config.init_timeout_secs,
        );

        if method == Method::OPTIONS {
            return preflight();
        }

        if self.is_core_path(path) {
            return self.handle_core(method, headers, body).await;
        }

        if let Some(handler) = self.registry.custom_endpoint(path) {
            let reply = handler.handle(method.as_str(), &body).await;
            let status =
                StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response = respond(status, Bytes::from(reply.body));
            if let Ok(content_type) = HeaderValue::from_str(&reply.content_type) {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            return response;
        }

        error_body(StatusCode::NOT_FOUND, "Unknown endpoint")
    }

    /// Whether `path` addresses the core MCP endpoint: the configured path
    /// with or without a trailing slash, or its `/mcp[/]` sub-path.
    fn is_core_path(&self, path: &str) -> bool {
        let base = self.config.endpoint.trim_end_matches('/');
        path == base
            || path == format!("{base}/")
            || path == format!("{base}/mcp")
            || path == format!("{base}/mcp/")
    }

    async fn handle_core(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: Bytes,
    ) -> Response<Full<Bytes>> {
        match *method {
            Method::DELETE => self.handle_delete(headers),
            Method::POST => self.handle_post(headers, body).await,
            _ => {
                let mut response = json_body(
                    StatusCode::METHOD_NOT_ALLOWED,
                    &json!({"error": "Method not allowed"}),
                );
                response
                    .headers_mut()
                    .insert(ALLOW, HeaderValue::from_static("POST, DELETE"));
                response
            }
        }
    }

    /// Explicit client close: `DELETE` with the session-id header.
    fn handle_delete(&self, headers: &HeaderMap) -> Response<Full<Bytes>> {
        let Some(session_id) = header_value(headers, SESSION_ID_HEADER) else {
            return error_body(StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header");
        };

        match self.engine.gate().close(&session_id) {
            Some(_) => json_body(
                StatusCode::OK,
                &json!({"status": "closed", "session": session_id}),
            ),
            None => error_body(StatusCode::NOT_FOUND, "Unknown session"),
        }
    }

    async fn handle_post(&self, headers: &HeaderMap, body: Bytes) -> Response<Full<Bytes>> {
        if body.is_empty() {
            return rpc_error_body(StatusCode::BAD_REQUEST, "Empty request body");
        }

        let Ok(payload) = std::str::from_utf8(&body) else {
            return rpc_error_body(StatusCode::BAD_REQUEST, "Request body is not valid UTF-8");
        };

        let ctx = RequestContext::http(
            header_value(headers, SESSION_ID_HEADER),
            header_value(headers, PROTOCOL_VERSION_HEADER),
        );

        match self.engine.handle(payload, &ctx).await {
            Outcome::Initialized {
                response,
                session_id,
                version,
            } => {
                let mut reply = json_text(StatusCode::OK, serialise(&response));
                if let Ok(value) = HeaderValue::from_str(&session_id) {
                    reply.headers_mut().insert(SESSION_ID_HEADER, value);
                }
                echo_version(&mut reply, version);
                reply
            }
            Outcome::Reply {
                response,
                version,
                expected_duration,
            } => {
                let mut reply = json_text(StatusCode::OK, serialise(&response));
                echo_version(&mut reply, version);
                if let Some(secs) = expected_duration {
                    if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                        reply.headers_mut().insert(EXPECTED_DURATION_HEADER, value);
                    }
                }
                reply
            }
            Outcome::Ack { version } => {
                let mut reply = respond(StatusCode::ACCEPTED, Bytes::new());
                echo_version(&mut reply, version);
                reply
            }
            Outcome::Fail { error, origin } => {
                let status = match origin {
                    ErrorOrigin::Validation | ErrorOrigin::Lifecycle => StatusCode::BAD_REQUEST,
                    ErrorOrigin::Dispatch => StatusCode::OK,
                };
                json_text(status, serialise(&error))
            }
            Outcome::Internal { message } => {
                error!(%message, "internal failure while handling request");
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    /// Per-request wall-clock limit: the longest tool hint when one exists,
    /// capped by the maximum session uptime.
    fn request_deadline(&self) -> Duration {
        let max_uptime = self.config.max_uptime_secs;
        let tool_hint = self.registry.max_tool_timing();
        let secs = if tool_hint > 0 {
            tool_hint.min(max_uptime)
        } else {
            max_uptime
        };
        Duration::from_secs(secs)
    }
}

/// Reads a header as a string, when present and valid.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Builds a response with the shared CORS origin header applied.
fn respond(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        "Access-Control-Allow-Origin",
        HeaderValue::from_static("*"),
    );
    response
}

/// CORS preflight response.
fn preflight() -> Response<Full<Bytes>> {
    let mut response = respond(StatusCode::NO_CONTENT, Bytes::new());
    let headers = response.headers_mut();
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        "Access-Control-Allow-Headers",
        HeaderValue::from_static(
            "Content-Type, Accept, Mcp-Session-Id, MCP-Protocol-Version, Authorization",
        ),
    );
    response
}

/// Echoes the protocol version header when the version requires it.
fn echo_version(response: &mut Response<Full<Bytes>>, version: ProtocolVersion) {
    if version.requires_version_header() {
        response.headers_mut().insert(
            PROTOCOL_VERSION_HEADER,
            HeaderValue::from_static(version.as_str()),
        );
    }
}

/// A JSON response built from serialised text.
fn json_text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = respond(status, Bytes::from(body));
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// A JSON response with the given status.
fn json_body(status: StatusCode, body: &serde_json::Value) -> Response<Full<Bytes>> {
    json_text(status, body.to_string())
}

/// A `{"error": ...}` response for transport-level failures.
fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_body(status, &json!({"error": message}))
}

/// A JSON-RPC error body with a null id, for body-level failures.
fn rpc_error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_text(
        status,
        serialise(&JsonRpcError::invalid_request(None, message)),
    )
}

/// Serialises a response payload, falling back to an empty object.
fn serialise<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}
