//! Connect and disconnect sequence.
//!
//! 1. **Connect**: the transport connects with [`ConnectOptions`]; its last
//!    will clears the retained presence message if the device drops off.
//! 2. **Online**: on the connected event the server subscribes to its
//!    control topic and the RPC topic of every known client, then publishes a
//!    retained `notifications/server/online`.
//! 3. **Shutdown**: an empty retained payload on the presence topic retracts
//!    the announcement.
//!
//! Reconnection is left to the transport.

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::BrokerConfig;
use crate::mcp::protocol;
use crate::mcp::schema;
use crate::mcp::server::McpServer;
use crate::mcp::transport::{QoS, Transport};

/// User property identifying this endpoint as an MCP server.
pub const COMPONENT_TYPE_KEY: &str = "MCP-COMPONENT-TYPE";

/// Value of [`COMPONENT_TYPE_KEY`] for servers.
pub const COMPONENT_TYPE_SERVER: &str = "mcp-server";

const SESSION_EXPIRY_SECS: u32 = 10;
const WILL_DELAY_SECS: u32 = 1;
const MAX_PACKET_SIZE: u32 = 81_920;
const RECEIVE_MAXIMUM: u16 = 1024;

/// Message the broker publishes if the server disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastWill {
    /// The presence topic.
    pub topic: String,
    /// Empty, which clears the retained online message.
    pub payload: String,
    /// Delivery guarantee.
    pub qos: QoS,
    /// Always retained.
    pub retain: bool,
}

/// MQTT 5 connection parameters the transport must use.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct ConnectOptions {
    /// Broker URI, `mqtt://host:port` or `mqtts://host:port`.
    pub broker_uri: String,
    /// Client identifier of the server.
    pub client_id: String,
    /// Username, if the broker wants one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password. Only present when `broker.forward_password` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// PEM CA certificate for `mqtts://`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,
    /// MQTT protocol level.
    pub protocol_version: u8,
    /// Keep-alive interval in seconds.
    pub keep_alive_secs: u16,
    /// Session expiry interval in seconds.
    pub session_expiry_secs: u32,
    /// Delay before the will is published, in seconds.
    pub will_delay_secs: u32,
    /// Largest packet the server accepts.
    pub maximum_packet_size: u32,
    /// Inflight QoS 1/2 messages the server accepts.
    pub receive_maximum: u16,
    /// Last will.
    pub will: LastWill,
    /// CONNECT user properties.
    pub user_properties: IndexMap<String, String>,
}

// Hand-written so a forwarded password never lands in logs.
impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("broker_uri", &self.broker_uri)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("cert_path", &self.cert_path)
            .field("protocol_version", &self.protocol_version)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .field("session_expiry_secs", &self.session_expiry_secs)
            .field("will_delay_secs", &self.will_delay_secs)
            .field("maximum_packet_size", &self.maximum_packet_size)
            .field("receive_maximum", &self.receive_maximum)
            .field("will", &self.will)
            .field("user_properties", &self.user_properties)
            .finish()
    }
}

impl McpServer {
    /// Connection parameters for this server on `broker`.
    ///
    /// The client id always comes from the server identity. The password is
    /// left out unless `broker.forward_password` is set.
    #[must_use]
    pub fn connect_options(&self, broker: &BrokerConfig) -> ConnectOptions {
        let mut user_properties = IndexMap::new();
        user_properties.insert(
            COMPONENT_TYPE_KEY.to_string(),
            COMPONENT_TYPE_SERVER.to_string(),
        );

        ConnectOptions {
            broker_uri: broker.uri.clone(),
            client_id: self.identity().client_id().to_string(),
            username: broker.username.clone(),
            password: broker
                .password
                .clone()
                .filter(|_| broker.forward_password),
            cert_path: broker.cert_path.clone(),
            protocol_version: 5,
            keep_alive_secs: broker.keep_alive_secs,
            session_expiry_secs: SESSION_EXPIRY_SECS,
            will_delay_secs: WILL_DELAY_SECS,
            maximum_packet_size: MAX_PACKET_SIZE,
            receive_maximum: RECEIVE_MAXIMUM,
            will: LastWill {
                topic: self.topics().presence().to_string(),
                payload: String::new(),
                qos: QoS::AtMostOnce,
                retain: true,
            },
            user_properties,
        }
    }

    /// Handles the transport's connected event.
    ///
    /// Subscribes to the control topic and to the RPC topic of every session
    /// that survived a disconnect, then announces presence. Failures are
    /// logged; the server keeps running.
    pub fn on_connected(&mut self, transport: &mut dyn Transport) {
        self.mark_serving();
        info!(broker_client = %self.identity().client_id(), "MQTT client connected");

        if let Err(e) = transport.subscribe(self.topics().control()) {
            error!(error = %e, topic = %self.topics().control(), "Subscribe to control topic failed");
        }

        for session in self.sessions().iter() {
            debug!(client_id = %session.client_id, topic = %session.rpc_topic, "Resubscribing RPC topic");
            if let Err(e) = transport.subscribe(&session.rpc_topic) {
                error!(error = %e, topic = %session.rpc_topic, "Resubscribe to RPC topic failed");
            }
        }

        let announcement = match protocol::encode(&schema::server_online(self.identity())) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to serialise presence announcement");
                return;
            }
        };

        if let Err(e) = transport.publish(
            self.topics().presence(),
            &announcement,
            QoS::AtMostOnce,
            true,
        ) {
            error!(error = %e, "Publish presence announcement failed");
        }
    }

    /// Handles the transport's disconnected event.
    ///
    /// Sessions are kept; [`McpServer::on_connected`] subscribes to their RPC
    /// topics again.
    pub fn on_disconnected(&self) {
        warn!(
            sessions = self.sessions().len(),
            "MQTT client disconnected"
        );
    }

    /// Retracts presence before a clean shutdown.
    pub fn shutdown(&self, transport: &mut dyn Transport) {
        info!("Retracting presence");
        if let Err(e) = transport.publish(self.topics().presence(), b"", QoS::AtMostOnce, true) {
            error!(error = %e, "Publish presence retraction failed");
        }
    }
}
