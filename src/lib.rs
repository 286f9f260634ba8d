//! mcp-mqtt-server: expose device tools and resources to MCP clients over MQTT
//!
//! A constrained device declares a handful of tools (remote procedures with
//! typed arguments and a text result) and resources (URI-addressed text).
//! Remote MCP clients discover the device through its retained presence
//! message, run the `initialize` handshake on its control topic, and then
//! talk JSON-RPC 2.0 on a topic scoped to their own client id.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`mcp`]: Topics, sessions, dispatch and the transport seam
//! - [`demo`]: Sample device tools used by the binary

pub mod config;
pub mod demo;
pub mod error;
pub mod mcp;
