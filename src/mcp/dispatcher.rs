//! Inbound message classification and MCP method handling.
//!
//! Every message is handled on its own; the only state carried between
//! messages is the session set.
//!
//! | Topic                         | Accepted                                   |
//! |-------------------------------|--------------------------------------------|
//! | control topic                 | `initialize`                               |
//! | `$mcp-client/presence/...`    | empty payload = client gone                |
//! | `$mcp-rpc/...` (ours)         | `tools/*`, `resources/*`, `ping`, notices  |
//!
//! Malformed input is logged and dropped. Well-formed but unanswerable
//! `tools/call` requests get a JSON-RPC error. An unknown resource URI is
//! dropped without a reply; clients time out instead.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::mcp::protocol::{self, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::mcp::registry::{Argument, PropertyValue};
use crate::mcp::schema;
use crate::mcp::server::McpServer;
use crate::mcp::topics;
use crate::mcp::transport::{InboundMessage, QoS, Transport};

/// User property carrying the initializing client's MQTT client id.
pub const CLIENT_ID_PROPERTY: &str = "MCP-MQTT-CLIENT-ID";

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct ResourceReadParams {
    uri: String,
}

impl McpServer {
    /// Handles one inbound message, publishing at most one reply.
    pub fn dispatch(&mut self, msg: &InboundMessage, transport: &mut dyn Transport) {
        self.mark_serving();
        let topic = msg.topic.as_str();

        if topic == self.topics.control() {
            if let Some(req) = decode_logged(msg) {
                self.handle_control(msg, &req, transport);
            }
        } else if topics::is_client_presence(topic) {
            if msg.payload.is_empty() {
                self.handle_client_gone(topic, transport);
            } else {
                debug!(topic, "Ignoring client presence announcement");
            }
        } else if topics::is_rpc(topic) {
            if let Some(req) = decode_logged(msg) {
                self.handle_rpc(topic, &req, transport);
            }
        } else {
            debug!(topic, "Ignoring message on unrelated topic");
        }
    }

    fn handle_control(
        &mut self,
        msg: &InboundMessage,
        req: &JsonRpcRequest,
        transport: &mut dyn Transport,
    ) {
        if req.method != "initialize" {
            warn!(method = %req.method, "Unexpected method on control topic");
            return;
        }

        let Some(id) = req.id.clone() else {
            warn!("initialize without request id");
            return;
        };

        let Some(client_id) = msg.user_property(CLIENT_ID_PROPERTY) else {
            warn!("{CLIENT_ID_PROPERTY} not found in user properties");
            return;
        };

        if !topics::is_valid_segment(client_id) {
            warn!(client_id, "Client id cannot be used in a topic");
            return;
        }

        let rpc_topic = self.topics.rpc(client_id);
        info!(client_id, "MCP client initialized");

        if self.sessions.insert(client_id, rpc_topic.clone()) {
            if let Err(e) = transport.subscribe(&rpc_topic) {
                error!(error = %e, topic = %rpc_topic, "Subscribe to RPC topic failed");
            }
        } else {
            debug!(client_id, "Client re-initialized, keeping existing session");
        }

        let result = schema::initialize_result(
            &self.identity,
            self.registry.has_tools(),
            self.registry.has_resources(),
        );
        reply(transport, &rpc_topic, &JsonRpcResponse::success(id, result));
    }

    fn handle_client_gone(&mut self, topic: &str, transport: &mut dyn Transport) {
        let Some(client_id) = topics::client_id_from_presence(topic) else {
            debug!(topic, "Presence retraction without a client id");
            return;
        };
        let Some(session) = self.sessions.remove_exact(client_id) else {
            debug!(client_id, "Presence retraction for unknown client");
            return;
        };

        info!(client_id = %session.client_id, "MCP client disconnected");
        if let Err(e) = transport.unsubscribe(&session.rpc_topic) {
            error!(error = %e, topic = %session.rpc_topic, "Unsubscribe from RPC topic failed");
        }
    }

    fn handle_rpc(&self, topic: &str, req: &JsonRpcRequest, transport: &mut dyn Transport) {
        let Some(client_id) = self.topics.rpc_client_id(topic) else {
            debug!(topic, "Ignoring RPC topic of another server");
            return;
        };

        if !self.sessions.contains(client_id) {
            warn!(client_id, method = %req.method, "RPC from a client that never initialized");
        }

        if req.method == "notifications/initialized" {
            debug!(client_id, "Client confirmed initialization");
            return;
        }

        let Some(id) = req.id.clone() else {
            warn!(client_id, method = %req.method, "Request without id");
            return;
        };

        info!(client_id, method = %req.method, "Request received");

        match req.method.as_str() {
            "tools/list" => {
                let result = schema::tools_list_result(self.registry.tools());
                reply(transport, topic, &JsonRpcResponse::success(id, result));
            }
            "tools/call" => match self.call_tool(id, req.params.as_ref()) {
                Ok(response) => reply(transport, topic, &response),
                Err(error) => reply(transport, topic, &error),
            },
            "resources/list" => {
                let result = schema::resources_list_result(self.registry.resources());
                reply(transport, topic, &JsonRpcResponse::success(id, result));
            }
            "resources/read" => {
                if let Some(response) = self.read_resource(id, req.params.as_ref()) {
                    reply(transport, topic, &response);
                }
            }
            "ping" => reply(transport, topic, &JsonRpcResponse::success(id, json!({}))),
            other => debug!(client_id, method = other, "Unsupported method, not replying"),
        }
    }

    fn call_tool(
        &self,
        id: RequestId,
        params: Option<&Value>,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let Some((name, args)) = decode_tool_call(params) else {
            warn!("Failed to decode tools/call params");
            return Err(JsonRpcError::undecodable_params(id));
        };

        let Some((tool, args)) = self.registry.validate_call(&name, args) else {
            warn!(tool = %name, "No tool matches name and arguments");
            return Err(JsonRpcError::method_not_found(id));
        };

        let text = tool.invoke(&args);
        debug!(tool = %tool.name, result = %text, "Tool returned");
        Ok(JsonRpcResponse::success(id, schema::tool_call_result(text)))
    }

    fn read_resource(&self, id: RequestId, params: Option<&Value>) -> Option<JsonRpcResponse> {
        let Some(params) = params
            .cloned()
            .and_then(|p| serde_json::from_value::<ResourceReadParams>(p).ok())
        else {
            warn!("Failed to decode resources/read params");
            return None;
        };

        let Some((resource, text)) = self.registry.read_resource(&params.uri) else {
            warn!(uri = %params.uri, "Unknown resource, not replying");
            return None;
        };

        Some(JsonRpcResponse::success(
            id,
            schema::resource_read_result(resource, text),
        ))
    }
}

fn decode_logged(msg: &InboundMessage) -> Option<JsonRpcRequest> {
    match protocol::decode(&msg.payload) {
        Ok(req) => Some(req),
        Err(e) => {
            warn!(
                topic = %msg.topic,
                code = e.error.code,
                data = %String::from_utf8_lossy(&msg.payload),
                "Decode JSON-RPC failed"
            );
            None
        }
    }
}

/// Splits `tools/call` params into the tool name and its arguments.
///
/// `arguments` may be an object (`{"volume": 50}`, caller order kept) or an
/// array of `{"name": ..., "value": ...}` entries. Values must be numbers or
/// strings.
fn decode_tool_call(params: Option<&Value>) -> Option<(String, Vec<Argument>)> {
    let params: ToolCallParams = serde_json::from_value(params?.clone()).ok()?;

    let args = match &params.arguments {
        Value::Null => Vec::new(),
        Value::Object(map) => map
            .iter()
            .map(|(name, value)| Some(Argument::new(name.clone(), PropertyValue::from_json(value)?)))
            .collect::<Option<Vec<_>>>()?,
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let name = item.get("name")?.as_str()?;
                let value = PropertyValue::from_json(item.get("value")?)?;
                Some(Argument::new(name, value))
            })
            .collect::<Option<Vec<_>>>()?,
        _ => return None,
    };

    Some((params.name, args))
}

fn reply<T: Serialize>(transport: &mut dyn Transport, topic: &str, message: &T) {
    let payload = match protocol::encode(message) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Failed to serialise response");
            return;
        }
    };

    if let Err(e) = transport.publish(topic, &payload, QoS::AtMostOnce, false) {
        error!(error = %e, topic, "Publish response failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::mcp::registry::{Property, Resource, Tool};
    use crate::mcp::topics::ServerIdentity;
    use crate::mcp::transport::{OutboundAction, Outbox};

    const CONTROL: &str = "$mcp-server/dev-1/srv";
    const RPC_C1: &str = "$mcp-rpc/c1/dev-1/srv";

    fn server() -> McpServer {
        McpServer::new(ServerIdentity::new("srv", None, "dev-1").unwrap())
    }

    fn initialize(client_id: &str) -> InboundMessage {
        InboundMessage::new(
            CONTROL,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#,
        )
        .with_property(CLIENT_ID_PROPERTY, client_id)
    }

    fn rpc(body: &str) -> InboundMessage {
        InboundMessage::new(RPC_C1, body)
    }

    fn last_reply(outbox: &Outbox) -> Value {
        let (_, payload) = outbox.published().last().expect("a reply");
        serde_json::from_str(payload).unwrap()
    }

    #[test]
    fn initialize_requires_client_id_property() {
        let mut server = server();
        let mut outbox = Outbox::new();
        let msg = InboundMessage::new(
            CONTROL,
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
        );
        server.dispatch(&msg, &mut outbox);

        assert!(outbox.actions().is_empty());
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn initialize_requires_id() {
        let mut server = server();
        let mut outbox = Outbox::new();
        let msg = InboundMessage::new(CONTROL, r#"{"jsonrpc":"2.0","method":"initialize"}"#)
            .with_property(CLIENT_ID_PROPERTY, "c1");
        server.dispatch(&msg, &mut outbox);

        assert!(outbox.actions().is_empty());
        assert!(server.sessions().is_empty());
    }

    #[test]
    fn initialize_rejects_wildcard_client_id() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&initialize("c/#"), &mut outbox);
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn other_methods_on_control_topic_are_dropped() {
        let mut server = server();
        let mut outbox = Outbox::new();
        let msg = InboundMessage::new(CONTROL, r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .with_property(CLIENT_ID_PROPERTY, "c1");
        server.dispatch(&msg, &mut outbox);
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn initialize_reports_capabilities() {
        let mut server = server();
        server
            .register_resources(vec![Resource::new("a://b", "b")], |_: &str| String::new())
            .unwrap();
        let mut outbox = Outbox::new();
        server.dispatch(&initialize("c1"), &mut outbox);

        let reply = last_reply(&outbox);
        assert_eq!(reply["id"], 1);
        assert!(reply["result"]["capabilities"].get("tools").is_none());
        assert!(reply["result"]["capabilities"]["resources"].is_object());
    }

    #[test]
    fn repeated_initialize_subscribes_once() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&initialize("c1"), &mut outbox);
        server.dispatch(&initialize("c1"), &mut outbox);

        assert_eq!(server.sessions().len(), 1);
        assert_eq!(outbox.subscriptions().collect::<Vec<_>>(), [RPC_C1]);
        // Both attempts are answered.
        assert_eq!(outbox.published().count(), 2);
    }

    #[test]
    fn presence_retraction_removes_session() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&initialize("c1"), &mut outbox);
        server.dispatch(&initialize("c2"), &mut outbox);
        outbox.drain();

        server.dispatch(
            &InboundMessage::new("$mcp-client/presence/c1", r#"{"online":true}"#),
            &mut outbox,
        );
        assert_eq!(server.sessions().len(), 2);

        server.dispatch(
            &InboundMessage::new("$mcp-client/presence/c1", Vec::new()),
            &mut outbox,
        );
        assert_eq!(server.sessions().len(), 1);
        assert!(server.sessions().contains("c2"));
        assert_eq!(
            outbox.actions(),
            [OutboundAction::Unsubscribe {
                topic: RPC_C1.to_string()
            }]
        );
    }

    #[test]
    fn presence_retraction_matches_whole_client_id() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&initialize("c1"), &mut outbox);
        outbox.drain();

        for topic in [
            "$mcp-client/presence/xc1",
            "$mcp-client/presence/",
            "$mcp-client/presence/c1/",
        ] {
            server.dispatch(&InboundMessage::new(topic, Vec::new()), &mut outbox);
        }
        assert!(server.sessions().contains("c1"));
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn malformed_rpc_payload_is_dropped() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&rpc("{not json"), &mut outbox);
        server.dispatch(&rpc(r#"{"jsonrpc":"2.0","id":3,"result":{}}"#), &mut outbox);
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn unknown_method_gets_no_reply() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&rpc(r#"{"jsonrpc":"2.0","id":3,"method":"prompts/list"}"#), &mut outbox);
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#),
            &mut outbox,
        );
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn requests_without_id_get_no_reply() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&rpc(r#"{"jsonrpc":"2.0","method":"tools/list"}"#), &mut outbox);
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn foreign_rpc_topic_is_ignored() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(
            &InboundMessage::new(
                "$mcp-rpc/c1/other-device/srv",
                r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#,
            ),
            &mut outbox,
        );
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn ping_replies_on_request_topic() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(&rpc(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#), &mut outbox);

        let (topic, _) = outbox.published().next().unwrap();
        assert_eq!(topic, RPC_C1);
        assert_eq!(last_reply(&outbox)["id"], "p");
    }

    #[test]
    fn tools_call_with_bad_params_is_invalid() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"arguments":{}}}"#),
            &mut outbox,
        );
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"t","arguments":{"x":true}}}"#),
            &mut outbox,
        );

        let replies: Vec<Value> = outbox
            .published()
            .map(|(_, p)| serde_json::from_str(p).unwrap())
            .collect();
        assert_eq!(replies.len(), 2);
        for reply in replies {
            assert_eq!(reply["error"]["code"], -32600);
            assert_eq!(reply["error"]["message"], "Invalid params");
        }
    }

    #[test]
    fn tools_call_arity_mismatch_does_not_invoke() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut server = server();
        server
            .register_tools(vec![Tool::new("set_volume", move |_: &[Argument]| {
                *counter.lock().unwrap() += 1;
                "ok".to_string()
            })
            .with_property(Property::integer("volume"))])
            .unwrap();

        let mut outbox = Outbox::new();
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{"name":"set_volume","arguments":{"volume":1,"extra":2}}}"#),
            &mut outbox,
        );

        assert_eq!(*calls.lock().unwrap(), 0);
        let reply = last_reply(&outbox);
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["error"]["message"], "Method not found");
    }

    #[test]
    fn tools_call_accepts_both_argument_shapes() {
        let mut server = server();
        server
            .register_tools(vec![Tool::new("add", |args: &[Argument]| {
                let a = args[0].value.as_integer().unwrap_or_default();
                let b = args[1].value.as_integer().unwrap_or_default();
                (a + b).to_string()
            })
            .with_property(Property::integer("a"))
            .with_property(Property::integer("b"))])
            .unwrap();

        let mut outbox = Outbox::new();
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"add","arguments":{"a":2,"b":3.7}}}"#),
            &mut outbox,
        );
        assert_eq!(last_reply(&outbox)["result"]["content"][0]["text"], "5");

        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"add","arguments":[{"name":"a","value":10},{"name":"b","value":-1}]}}"#),
            &mut outbox,
        );
        assert_eq!(last_reply(&outbox)["result"]["content"][0]["text"], "9");

        // Object keys are matched positionally, so order matters.
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"add","arguments":{"b":1,"a":1}}}"#),
            &mut outbox,
        );
        assert_eq!(last_reply(&outbox)["error"]["code"], -32601);
    }

    #[test]
    fn tool_without_properties_is_callable() {
        let mut server = server();
        server
            .register_tools(vec![Tool::new("status", |_: &[Argument]| "idle".to_string())])
            .unwrap();

        let mut outbox = Outbox::new();
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{"name":"status"}}"#),
            &mut outbox,
        );
        assert_eq!(last_reply(&outbox)["result"]["content"][0]["text"], "idle");
    }

    #[test]
    fn resources_read_unknown_uri_is_silent() {
        let mut server = server();
        server
            .register_resources(vec![Resource::new("device://volume", "volume")], |_: &str| {
                "50".to_string()
            })
            .unwrap();

        let mut outbox = Outbox::new();
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":1,"method":"resources/read","params":{"uri":"device://missing"}}"#),
            &mut outbox,
        );
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":2,"method":"resources/read","params":{}}"#),
            &mut outbox,
        );
        assert!(outbox.actions().is_empty());
    }

    #[test]
    fn resources_list_and_read() {
        let mut server = server();
        server
            .register_resources(
                vec![Resource::new("device://volume", "volume")
                    .with_description("Current output volume")
                    .with_mime_type("text/plain")],
                |uri: &str| format!("{uri} = 50"),
            )
            .unwrap();

        let mut outbox = Outbox::new();
        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":1,"method":"resources/list"}"#),
            &mut outbox,
        );
        let reply = last_reply(&outbox);
        assert_eq!(reply["result"]["resources"][0]["uri"], "device://volume");
        assert_eq!(reply["result"]["resources"][0]["mimeType"], "text/plain");

        server.dispatch(
            &rpc(r#"{"jsonrpc":"2.0","id":2,"method":"resources/read","params":{"uri":"device://volume"}}"#),
            &mut outbox,
        );
        let reply = last_reply(&outbox);
        assert_eq!(reply["result"]["contents"][0]["text"], "device://volume = 50");
        assert_eq!(reply["result"]["contents"][0]["name"], "volume");
    }

    #[test]
    fn unrelated_topics_are_ignored() {
        let mut server = server();
        let mut outbox = Outbox::new();
        server.dispatch(
            &InboundMessage::new("sensors/temp", r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#),
            &mut outbox,
        );
        assert!(outbox.actions().is_empty());
        assert!(server.is_serving());
    }
}
