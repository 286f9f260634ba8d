//! Model Context Protocol (MCP) server carried over MQTT.
//!
//! A device registers tools and resources, connects to a broker through a
//! [`Transport`], and answers JSON-RPC 2.0 requests that remote MCP clients
//! publish on per-client topics.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         McpServer                           │
//! │                                                             │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐    │
//! │   │  Transport  │───▶│ Dispatcher  │───▶│  Registry   │    │
//! │   │   (MQTT)    │    │ (per topic) │    │ (callbacks) │    │
//! │   └─────────────┘    └─────────────┘    └─────────────┘    │
//! │          ▲                  │                               │
//! │          │           ┌──────┴──────┐    ┌─────────────┐    │
//! │          └───────────│  Sessions   │    │   Topics    │    │
//! │                      └─────────────┘    └─────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod dispatcher;
pub mod lifecycle;
pub mod protocol;
pub mod registry;
pub mod schema;
pub mod server;
pub mod session;
pub mod topics;
pub mod transport;

pub use dispatcher::CLIENT_ID_PROPERTY;
pub use lifecycle::ConnectOptions;
pub use protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, MCP_PROTOCOL_VERSION};
pub use registry::{
    Argument, Property, PropertyType, PropertyValue, Registry, Resource, ResourceReader, Tool,
    ToolHandler,
};
pub use server::McpServer;
pub use session::{ClientSession, SessionTracker};
pub use topics::{ServerIdentity, Topics};
pub use transport::{InboundMessage, Outbox, QoS, StdioBridge, Transport, TransportEvent};
