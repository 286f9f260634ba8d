//! JSON-RPC 2.0 message types for MCP over MQTT.
//!
//! Every MQTT payload the server receives is one JSON-RPC message. Requests
//! carry an `id`; notifications do not. Responses are published back on the
//! requesting client's RPC topic.
//!
//! Only two error replies are ever published:
//!
//! | Situation                         | Code     | Message              |
//! |-----------------------------------|----------|----------------------|
//! | `tools/call` params undecodable   | -32600   | `Invalid params`     |
//! | no tool matches name and args     | -32601   | `Method not found`   |
//!
//! Parse failures are logged, never answered: there is no reply topic for a
//! payload we cannot read.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

const JSONRPC_VERSION: &str = "2.0";

/// Invalid JSON.
pub const PARSE_ERROR: i32 = -32700;
/// Not a JSON-RPC 2.0 request.
pub const INVALID_REQUEST: i32 = -32600;
/// No such method (or tool).
pub const METHOD_NOT_FOUND: i32 = -32601;

/// A JSON-RPC 2.0 request ID: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

/// An inbound request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// `None` for notifications (absent or `null` id).
    pub id: Option<RequestId>,
    /// Method name, never empty.
    pub method: String,
    /// Raw parameters.
    pub params: Option<Value>,
}

// Wire shape before validation. `method` is optional so that a response
// echoed onto a shared topic is reported as an invalid request, not a
// parse error.
#[derive(Deserialize)]
struct Envelope {
    jsonrpc: Option<String>,
    #[serde(default)]
    id: Option<RequestId>,
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}

/// An outgoing notification (server to client).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    jsonrpc: &'static str,
    /// Notification method.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.into(),
            params,
        }
    }
}

/// A successful response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    jsonrpc: &'static str,
    /// ID of the request being answered.
    pub id: RequestId,
    /// Method result.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Wraps `result` as the reply to request `id`.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // Value is not const-compatible
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result,
        }
    }
}

/// The `error` member of an error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    /// Numeric code.
    pub code: i32,
    /// Short description.
    pub message: Cow<'static, str>,
}

/// An error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    jsonrpc: &'static str,
    /// ID of the failed request, if it could be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// Error details.
    pub error: ErrorObject,
}

impl JsonRpcError {
    const fn new(id: Option<RequestId>, code: i32, message: &'static str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            error: ErrorObject {
                code,
                message: Cow::Borrowed(message),
            },
        }
    }

    /// The payload is not JSON.
    #[must_use]
    pub const fn parse_error() -> Self {
        Self::new(None, PARSE_ERROR, "Parse error")
    }

    /// The payload is JSON but not a JSON-RPC 2.0 request.
    #[must_use]
    pub const fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, INVALID_REQUEST, "Invalid Request")
    }

    /// `tools/call` params could not be decoded.
    ///
    /// Deployed MCP-over-MQTT clients expect code -32600 with the
    /// "Invalid params" message here, not -32602.
    #[must_use]
    pub const fn undecodable_params(id: RequestId) -> Self {
        Self::new(Some(id), INVALID_REQUEST, "Invalid params")
    }

    /// No tool matches the requested name and arguments.
    #[must_use]
    pub const fn method_not_found(id: RequestId) -> Self {
        Self::new(Some(id), METHOD_NOT_FOUND, "Method not found")
    }
}

/// Decodes an MQTT payload into a JSON-RPC message.
///
/// # Errors
///
/// Returns the error describing why the payload is not a JSON-RPC 2.0
/// request or notification. Callers log it; it is never published.
pub fn decode(payload: &[u8]) -> Result<JsonRpcRequest, JsonRpcError> {
    let envelope: Envelope = match serde_json::from_slice::<Value>(payload) {
        Ok(value @ Value::Object(_)) => {
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?
        }
        Ok(_) | Err(_) => return Err(JsonRpcError::parse_error()),
    };

    if envelope.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
        return Err(JsonRpcError::invalid_request(envelope.id));
    }

    match envelope.method {
        Some(method) if !method.is_empty() => Ok(JsonRpcRequest {
            id: envelope.id,
            method,
            params: envelope.params,
        }),
        _ => Err(JsonRpcError::invalid_request(envelope.id)),
    }
}

/// Encodes an outbound message into payload bytes.
///
/// # Errors
///
/// Returns an error if the message cannot be serialised.
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(message)
}
