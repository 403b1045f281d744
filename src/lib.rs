//! toolgate-mcp: minimalist Model Context Protocol server
//!
//! This library implements the MCP protocol core — a JSON-RPC 2.0
//! dispatcher with session lifecycle management and protocol-version
//! negotiation — and exposes a registry of host-defined tools to MCP
//! clients over one of two transports: streamable HTTP or line-delimited
//! JSON-RPC over standard input/output.
//!
//! # Architecture
//!
//! Each incoming message flows through the same pipeline regardless of
//! transport:
//!
//! ```text
//! Transport → Validator → Session gate → Protocol engine → Tool registry
//! ```
//!
//! Session state persists as one JSON file per session, so independent
//! server processes can share a store through the filesystem. The host
//! contributes tools and custom HTTP endpoints by explicit registration
//! before the server runs.
//!
//! # Modules
//!
//! - [`access_log`] — JSON-lines request trail
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`mcp`] — JSON-RPC validation and the protocol engine
//! - [`session`] — Session records, persistence, and lifecycle gating
//! - [`tools`] — Tool registry and the host extension surface
//! - [`transport`] — HTTP and stdio transport adapters

pub mod access_log;
pub mod config;
pub mod error;
pub mod mcp;
pub mod session;
pub mod tools;
pub mod transport;
