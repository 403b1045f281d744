//! Tool registry and the host extension surface.
//!
//! The host program contributes tools and custom HTTP endpoints by explicit
//! registration before the server runs:
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use toolgate_mcp::tools::{ToolRegistry, ToolDescriptor, ToolHandler, ToolCallResult};
//! # use serde_json::{json, Map, Value};
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ToolHandler for Echo {
//!     async fn call(&self, arguments: &Map<String, Value>) -> ToolCallResult {
//!         ToolCallResult::text(format!("{arguments:?}"))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register_tool(
//!     ToolDescriptor::new("echo", "Echoes its arguments", json!({"type": "object"})),
//!     Arc::new(Echo),
//! );
//! ```
//!
//! The registry is a plain mapping from name/path to descriptor and handler.
//! It does not validate call arguments against the declared `inputSchema`;
//! that responsibility lies with the tool itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool made available to MCP clients.
///
/// `name` is also the invocation key for `tools/call`. The optional `title`
/// and `outputSchema` fields are stripped from responses when the negotiated
/// protocol version predates `2025-06-18`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique tool name, equal to the invocation key.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Optional display title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
    /// Optional JSON Schema for `structuredContent`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
    /// Optional client-facing annotations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Value>,
}

impl ToolDescriptor {
    /// Creates a descriptor with the required fields.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            title: None,
            input_schema,
            output_schema: None,
            annotations: None,
        }
    }

    /// Sets the display title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the output schema.
    ///
    /// A tool declaring an output schema must also return unstructured
    /// `content` from every call, so that version shaping never yields an
    /// empty response.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Sets the annotations object.
    #[must_use]
    pub fn with_annotations(mut self, annotations: Value) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

/// One part of a tool call's unstructured content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// Base64-encoded image data.
    #[serde(rename_all = "camelCase")]
    Image {
        /// Base64 payload.
        data: String,
        /// MIME type, e.g. `image/png`.
        mime_type: String,
    },
    /// Base64-encoded audio data.
    #[serde(rename_all = "camelCase")]
    Audio {
        /// Base64 payload.
        data: String,
        /// MIME type, e.g. `audio/wav`.
        mime_type: String,
    },
}

/// Result of a tool call.
///
/// Tool failures are reported here with `isError: true`, never as JSON-RPC
/// protocol errors; the envelope around a failed tool call is still a
/// successful response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Whether the call failed inside the tool.
    pub is_error: bool,
    /// Unstructured content parts.
    pub content: Vec<ContentPart>,
    /// Structured output matching the tool's `outputSchema`. Stripped from
    /// responses when the negotiated version predates `2025-06-18`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            is_error: false,
            content: vec![ContentPart::Text { text: text.into() }],
            structured_content: None,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            content: vec![ContentPart::Text {
                text: message.into(),
            }],
            structured_content: None,
        }
    }

    /// Attaches structured output.
    #[must_use]
    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

/// A host-implemented tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invokes the tool with the caller's argument object.
    async fn call(&self, arguments: &Map<String, Value>) -> ToolCallResult;
}

/// Response produced by a custom HTTP endpoint.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    /// HTTP status code.
    pub status: u16,
    /// Content type of the body.
    pub content_type: String,
    /// Response body.
    pub body: Vec<u8>,
}

impl EndpointResponse {
    /// Creates a JSON response.
    #[must_use]
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: body.to_string().into_bytes(),
        }
    }
}

/// A host-implemented HTTP endpoint outside the core MCP surface.
///
/// Custom endpoints receive the HTTP method and raw body and are responsible
/// for their own method policing.
#[async_trait]
pub trait EndpointHandler: Send + Sync {
    /// Handles one HTTP request to this endpoint.
    async fn handle(&self, method: &str, body: &[u8]) -> EndpointResponse;
}

struct RegisteredTool {
    descriptor: ToolDescriptor,
    handler: Arc<dyn ToolHandler>,
    /// Expected duration hint in seconds for long-running tools.
    timing_hint: Option<u64>,
}

/// Registry of host-contributed tools and custom endpoints.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
    endpoints: HashMap<String, Arc<dyn EndpointHandler>>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its descriptor's name.
    ///
    /// A later registration with the same name replaces the earlier one.
    pub fn register_tool(&mut self, descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) {
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                handler,
                timing_hint: None,
            },
        );
    }

    /// Registers a long-running tool with an expected duration hint.
    ///
    /// The hint is surfaced to HTTP clients via the `Mcp-Expected-Duration`
    /// response header. Hints of zero are treated as absent.
    pub fn register_tool_with_timing(
        &mut self,
        descriptor: ToolDescriptor,
        handler: Arc<dyn ToolHandler>,
        expected_secs: u64,
    ) {
        self.tools.insert(
            descriptor.name.clone(),
            RegisteredTool {
                descriptor,
                handler,
                timing_hint: (expected_secs > 0).then_some(expected_secs),
            },
        );
    }

    /// Registers a custom HTTP endpoint at `path`.
    pub fn register_endpoint(&mut self, path: impl Into<String>, handler: Arc<dyn EndpointHandler>) {
        self.endpoints.insert(path.into(), handler);
    }

    /// All registered tool descriptors, in no particular order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| tool.descriptor.clone())
            .collect()
    }

    /// Whether a tool with this exact name is registered.
    #[must_use]
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Invokes a tool by name.
    ///
    /// An unknown name yields an `isError` result; the protocol engine
    /// checks [`Self::has_tool`] first and reports unknown tools as
    /// `-32602`, so this path is only reachable through direct library use.
    pub async fn invoke(&self, name: &str, arguments: &Map<String, Value>) -> ToolCallResult {
        match self.tools.get(name) {
            Some(tool) => tool.handler.call(arguments).await,
            None => ToolCallResult::error(format!("Unknown tool: {name}")),
        }
    }

    /// The timing hint for a tool, or 0 when none was supplied.
    #[must_use]
    pub fn tool_timing(&self, name: &str) -> u64 {
        self.tools
            .get(name)
            .and_then(|tool| tool.timing_hint)
            .unwrap_or(0)
    }

    /// The maximum timing hint across all tools, or 0 when none is supplied.
    #[must_use]
    pub fn max_tool_timing(&self) -> u64 {
        self.tools
            .values()
            .filter_map(|tool| tool.timing_hint)
            .max()
            .unwrap_or(0)
    }

    /// Looks up the handler for a custom endpoint path.
    #[must_use]
    pub fn custom_endpoint(&self, path: &str) -> Option<Arc<dyn EndpointHandler>> {
        self.endpoints.get(path).cloned()
    }

    /// All registered custom endpoint paths.
    #[must_use]
    pub fn custom_endpoint_paths(&self) -> Vec<String> {
        self.endpoints.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Shout;

    #[async_trait]
    impl ToolHandler for Shout {
        async fn call(&self, arguments: &Map<String, Value>) -> ToolCallResult {
            match arguments.get("text").and_then(Value::as_str) {
                Some(text) => ToolCallResult::text(text.to_uppercase()),
                None => ToolCallResult::error("Missing 'text' argument"),
            }
        }
    }

    fn shout_descriptor() -> ToolDescriptor {
        ToolDescriptor::new("shout", "Uppercases text", json!({"type": "object"}))
    }

    #[test]
    fn descriptor_wire_form_is_camel_case() {
        let descriptor = shout_descriptor()
            .with_title("Shout")
            .with_output_schema(json!({"type": "object"}));
        let json = serde_json::to_value(&descriptor).unwrap();

        assert!(json.get("inputSchema").is_some());
        assert!(json.get("outputSchema").is_some());
        assert!(json.get("annotations").is_none());
    }

    #[test]
    fn content_parts_are_tagged_by_type() {
        let image = ContentPart::Image {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        };
        let json = serde_json::to_value(&image).unwrap();
        assert_eq!(json["type"], "image");
        assert_eq!(json["mimeType"], "image/png");

        let text = serde_json::to_value(ContentPart::Text {
            text: "hi".to_string(),
        })
        .unwrap();
        assert_eq!(text["type"], "text");
    }

    #[test]
    fn result_serialisation_skips_absent_structured_content() {
        let plain = serde_json::to_value(ToolCallResult::text("ok")).unwrap();
        assert!(plain.get("structuredContent").is_none());
        assert_eq!(plain["isError"], false);

        let structured =
            serde_json::to_value(ToolCallResult::text("ok").with_structured(json!({"n": 1})))
                .unwrap();
        assert_eq!(structured["structuredContent"]["n"], 1);
    }

    #[tokio::test]
    async fn registry_invokes_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(shout_descriptor(), Arc::new(Shout));

        assert!(registry.has_tool("shout"));
        assert!(!registry.has_tool("whisper"));

        let mut arguments = Map::new();
        arguments.insert("text".to_string(), json!("hello"));
        let result = registry.invoke("shout", &arguments).await;

        assert!(!result.is_error);
        assert_eq!(
            result.content,
            vec![ContentPart::Text {
                text: "HELLO".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn registry_reports_unknown_tool_as_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.invoke("missing", &Map::new()).await;
        assert!(result.is_error);
    }

    #[test]
    fn timing_hints_aggregate_to_maximum() {
        let mut registry = ToolRegistry::new();
        registry.register_tool(shout_descriptor(), Arc::new(Shout));
        assert_eq!(registry.max_tool_timing(), 0);

        let slow = ToolDescriptor::new("slow", "Takes a while", json!({"type": "object"}));
        registry.register_tool_with_timing(slow, Arc::new(Shout), 120);

        assert_eq!(registry.tool_timing("slow"), 120);
        assert_eq!(registry.tool_timing("shout"), 0);
        assert_eq!(registry.max_tool_timing(), 120);
    }
}
