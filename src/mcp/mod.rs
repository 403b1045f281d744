//! Model Context Protocol (MCP) implementation.
//!
//! This module implements the protocol core: JSON-RPC 2.0 message types and
//! validation, and the version-aware dispatcher that routes the MCP method
//! set.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐   ┌───────────┐   ┌────────┐   ┌────────┐  │
//! │   │  Transport  │──▶│ Validator │──▶│  Gate  │──▶│ Engine │  │
//! │   │ (http/stdio)│   │(protocol) │   │(session│   │        │  │
//! │   └─────────────┘   └───────────┘   │  store)│   └───┬────┘  │
//! │                                     └────────┘       │       │
//! │                                             ┌────────▼─────┐ │
//! │                                             │Tool Registry │ │
//! │                                             └──────────────┘ │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Versions
//!
//! This implementation negotiates `2025-03-26` or `2025-06-18`. Version
//! `2024-11-05` is refused; it requires server-sent events.

pub mod engine;
pub mod protocol;

pub use engine::{ErrorOrigin, Outcome, ProtocolEngine};
pub use protocol::{
    validate_message, IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ProtocolVersion, RequestId, Validation,
};
