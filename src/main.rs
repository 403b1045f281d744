//! toolgate-mcp: minimalist Model Context Protocol server
//!
//! Loads a JSON configuration file, registers the host's tools and custom
//! HTTP endpoints, and runs the configured transport. The transport method
//! has no default; the configuration must name `http` or `stdio`
//! explicitly.

use std::process::ExitCode;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Parser;
use serde_json::{json, Map, Value};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use toolgate_mcp::access_log::AccessLogger;
use toolgate_mcp::config::{self, Config, TransportKind};
use toolgate_mcp::mcp::engine::ProtocolEngine;
use toolgate_mcp::mcp::protocol::ServerInfo;
use toolgate_mcp::session::{SessionGate, SessionStore};
use toolgate_mcp::tools::{
    EndpointHandler, EndpointResponse, ToolCallResult, ToolDescriptor, ToolHandler, ToolRegistry,
};
use toolgate_mcp::transport::{HttpTransport, StdioTransport};

/// Minimalist Model Context Protocol server.
///
/// Exposes host-defined tools to MCP clients over streamable HTTP or
/// line-delimited JSON-RPC on standard input/output.
#[derive(Parser, Debug)]
#[command(name = "toolgate-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<std::path::PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Resolves the log level: `--quiet` wins, explicit `-v` flags come next,
/// and the config file's `logging.level` fills in when neither is given.
fn resolve_log_level(args: &Args, config_level: &str) -> Level {
    if args.quiet {
        return Level::ERROR;
    }

    match (args.verbose, config_level.to_lowercase().as_str()) {
        (1, _) => Level::INFO,
        (2, _) => Level::DEBUG,
        (v, _) if v > 2 => Level::TRACE,
        (_, "trace") => Level::TRACE,
        (_, "debug") => Level::DEBUG,
        (_, "info") => Level::INFO,
        (_, "error") => Level::ERROR,
        _ => Level::WARN,
    }
}

/// Points the tracing subscriber at standard error; standard output
/// belongs to the stdio transport.
fn init_tracing(level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Adds two numbers; the demonstration tool shipped with the server.
struct AddNumbers;

#[async_trait]
impl ToolHandler for AddNumbers {
    async fn call(&self, arguments: &Map<String, Value>) -> ToolCallResult {
        let (Some(a), Some(b)) = (
            arguments.get("a").and_then(Value::as_f64),
            arguments.get("b").and_then(Value::as_f64),
        ) else {
            return ToolCallResult::error("Arguments 'a' and 'b' must be numbers");
        };

        let sum = a + b;
        // Render integral sums without a trailing ".0".
        #[allow(clippy::cast_possible_truncation)]
        let sum_value = if sum.fract() == 0.0 && sum.abs() < 9e15 {
            json!(sum as i64)
        } else {
            json!(sum)
        };

        ToolCallResult::text(sum_value.to_string()).with_structured(json!({ "sum": sum_value }))
    }
}

/// Liveness probe served as a custom HTTP endpoint.
struct Health;

#[async_trait]
impl EndpointHandler for Health {
    async fn handle(&self, method: &str, _body: &[u8]) -> EndpointResponse {
        match method {
            "GET" | "POST" => EndpointResponse::json(200, &json!({"status": "ok"})),
            _ => EndpointResponse::json(405, &json!({"error": "Method not allowed"})),
        }
    }
}

/// Builds the registry of host-contributed tools and endpoints.
fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register_tool(
        ToolDescriptor::new(
            "add_numbers",
            "Adds two numbers and returns their sum.",
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "number", "description": "First addend"},
                    "b": {"type": "number", "description": "Second addend"}
                },
                "required": ["a", "b"]
            }),
        )
        .with_title("Add Numbers")
        .with_output_schema(json!({
            "type": "object",
            "properties": {
                "sum": {"type": "number", "description": "The sum of a and b"}
            },
            "required": ["sum"]
        })),
        Arc::new(AddNumbers),
    );

    registry.register_endpoint("/healthz", Arc::new(Health));

    registry
}

/// Runs the configured transport to completion.
fn run_server(cfg: Config, access_log: AccessLogger) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(cfg);
    let access_log = Arc::new(access_log);
    let registry = Arc::new(build_registry());

    let store = Arc::new(SessionStore::new(config.session_dir())?);
    let gate = SessionGate::new(Arc::clone(&store));
    let server_info = ServerInfo {
        name: config.server_name.clone(),
        version: config.server_version.clone(),
    };
    let engine = Arc::new(ProtocolEngine::new(
        Arc::clone(&registry),
        gate,
        server_info,
    ));

    match config.transport {
        TransportKind::Stdio => {
            // Current-thread runtime: stdio is a single-connection transport.
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            let mut transport = StdioTransport::new(engine, store, config, access_log);
            runtime.block_on(transport.run())?;
        }
        TransportKind::Http => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            let transport = Arc::new(HttpTransport::new(
                engine, registry, store, config, access_log,
            ));
            runtime.block_on(transport.serve())?;
        }
    }

    Ok(())
}

/// Entry point for the toolgate-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Configuration comes first; it carries the default log level.
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("expected a config file at {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    init_tracing(resolve_log_level(&args, &cfg.logging.level));

    info!(version = env!("CARGO_PKG_VERSION"), "toolgate-mcp starting");

    let access_log = if let Some(path) = cfg.access_log_path() {
        match AccessLogger::new(&path) {
            Ok(logger) => {
                info!(path = %path.display(), "access logging enabled");
                logger
            }
            Err(e) => {
                error!(error = %e, "could not open the access log");
                return ExitCode::FAILURE;
            }
        }
    } else {
        info!("access logging disabled");
        AccessLogger::disabled()
    };

    match run_server(cfg, access_log) {
        Ok(()) => {
            info!("server stopped cleanly");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn log_level_resolution_order() {
        let args = |verbose, quiet| Args {
            config: None,
            verbose,
            quiet,
        };

        // --quiet beats everything, -v flags beat the config level.
        assert_eq!(resolve_log_level(&args(3, true), "trace"), Level::ERROR);
        assert_eq!(resolve_log_level(&args(1, false), "error"), Level::INFO);
        assert_eq!(resolve_log_level(&args(2, false), "error"), Level::DEBUG);
        assert_eq!(resolve_log_level(&args(5, false), "error"), Level::TRACE);

        // With no flags the config level decides, defaulting to warn.
        assert_eq!(resolve_log_level(&args(0, false), "Info"), Level::INFO);
        assert_eq!(resolve_log_level(&args(0, false), "bogus"), Level::WARN);
    }

    #[tokio::test]
    async fn add_numbers_renders_integral_sums_plainly() {
        let mut arguments = Map::new();
        arguments.insert("a".to_string(), json!(2));
        arguments.insert("b".to_string(), json!(3));

        let result = AddNumbers.call(&arguments).await;
        assert!(!result.is_error);
        assert_eq!(result.structured_content, Some(json!({"sum": 5})));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["content"][0]["text"], "5");
    }

    #[tokio::test]
    async fn add_numbers_rejects_non_numeric_arguments() {
        let mut arguments = Map::new();
        arguments.insert("a".to_string(), json!("two"));

        let result = AddNumbers.call(&arguments).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn health_endpoint_polices_methods() {
        let ok = Health.handle("GET", b"").await;
        assert_eq!(ok.status, 200);

        let refused = Health.handle("DELETE", b"").await;
        assert_eq!(refused.status, 405);
    }

    #[test]
    fn registry_exposes_demonstration_surface() {
        let registry = build_registry();
        assert!(registry.has_tool("add_numbers"));
        assert!(registry.custom_endpoint("/healthz").is_some());
    }
}
