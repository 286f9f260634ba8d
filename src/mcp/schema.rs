//! MCP result payloads and the builders the dispatcher uses.
//!
//! Field names follow the MCP JSON schema (camelCase on the wire).

use serde::Serialize;
use serde_json::{json, Value};

use crate::mcp::protocol::{OutgoingNotification, MCP_PROTOCOL_VERSION};
use crate::mcp::registry::{Resource, Tool};
use crate::mcp::topics::ServerIdentity;

/// Method of the presence announcement published on connect.
pub const SERVER_ONLINE_METHOD: &str = "notifications/server/online";

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Present when at least one tool is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapability>,
    /// Present when at least one resource is registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ListCapability>,
}

impl ServerCapabilities {
    /// Capabilities for a server with or without tools and resources.
    #[must_use]
    pub fn new(has_tools: bool, has_resources: bool) -> Self {
        Self {
            tools: has_tools.then(ListCapability::default),
            resources: has_resources.then(ListCapability::default),
        }
    }
}

/// Capability flags shared by tools and resources.
///
/// The registry is frozen once serving starts, so lists never change.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapability {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl ServerInfo {
    /// Info for `identity`, versioned with this crate.
    #[must_use]
    pub fn new(identity: &ServerIdentity) -> Self {
        Self {
            name: identity.name().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A tool definition for the tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl From<&Tool> for ToolDefinition {
    fn from(tool: &Tool) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: tool.input_schema(),
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
///
/// Handlers report domain failures in their text, so `isError` is never set.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Always `false`.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }
}

/// A resource entry for the resources/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Optional title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl From<&Resource> for ResourceDefinition {
    fn from(resource: &Resource) -> Self {
        Self {
            uri: resource.uri.clone(),
            name: resource.name.clone(),
            title: resource.title.clone(),
            description: resource.description.clone(),
            mime_type: resource.mime_type.clone(),
        }
    }
}

/// Text contents of a resource in the resources/read response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextResourceContents {
    /// Resource URI.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// Optional title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Optional MIME type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// The content produced by the resource reader.
    pub text: String,
}

/// `initialize` result.
#[must_use]
pub fn initialize_result(identity: &ServerIdentity, has_tools: bool, has_resources: bool) -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": ServerCapabilities::new(has_tools, has_resources),
        "serverInfo": ServerInfo::new(identity),
    })
}

/// `tools/list` result.
#[must_use]
pub fn tools_list_result(tools: &[Tool]) -> Value {
    let tools: Vec<ToolDefinition> = tools.iter().map(ToolDefinition::from).collect();
    json!({ "tools": tools })
}

/// `tools/call` result wrapping the handler's text.
#[must_use]
pub fn tool_call_result(text: impl Into<String>) -> Value {
    json!(ToolCallResult::text(text))
}

/// `resources/list` result.
#[must_use]
pub fn resources_list_result(resources: &[Resource]) -> Value {
    let resources: Vec<ResourceDefinition> =
        resources.iter().map(ResourceDefinition::from).collect();
    json!({ "resources": resources })
}

/// `resources/read` result for a text resource.
#[must_use]
pub fn resource_read_result(resource: &Resource, text: String) -> Value {
    let contents = TextResourceContents {
        uri: resource.uri.clone(),
        name: resource.name.clone(),
        title: resource.title.clone(),
        mime_type: resource.mime_type.clone(),
        text,
    };
    json!({ "contents": [contents] })
}

/// Presence announcement published (retained) when the server comes online.
#[must_use]
pub fn server_online(identity: &ServerIdentity) -> OutgoingNotification {
    OutgoingNotification::new(
        SERVER_ONLINE_METHOD,
        Some(json!({
            "server_name": identity.name(),
            "description": identity.description().unwrap_or_default(),
            "meta": {},
        })),
    )
}
