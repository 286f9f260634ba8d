//! The MCP-over-MQTT server context.
//!
//! [`McpServer`] owns everything one server instance needs: its identity,
//! the topics derived from it, the tool/resource registry and the live
//! client sessions. There is no global instance; callers own the server and
//! feed it transport events.
//!
//! # Lifecycle
//!
//! 1. **Registration**: tools and resources are registered once
//! 2. **Serving**: the first transport event freezes the registry
//! 3. **Shutdown**: presence is retracted before the transport closes

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{RegistryError, TransportError};
use crate::mcp::lifecycle::ConnectOptions;
use crate::mcp::registry::{Registry, Resource, ResourceReader, Tool};
use crate::mcp::session::SessionTracker;
use crate::mcp::topics::{ServerIdentity, Topics};
use crate::mcp::transport::{
    parse_frame, OutboundAction, Outbox, StdioBridge, Transport, TransportEvent,
};

/// One MCP server bound to one MQTT client identity.
pub struct McpServer {
    pub(super) identity: ServerIdentity,
    pub(super) topics: Topics,
    pub(super) registry: Registry,
    pub(super) sessions: SessionTracker,
    serving: bool,
}

impl McpServer {
    /// Creates a server with an empty registry.
    #[must_use]
    pub fn new(identity: ServerIdentity) -> Self {
        let topics = Topics::new(&identity);
        Self {
            identity,
            topics,
            registry: Registry::new(),
            sessions: SessionTracker::new(),
            serving: false,
        }
    }

    /// The server's identity.
    #[must_use]
    pub const fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// Topics derived from the identity.
    #[must_use]
    pub const fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Registered tools and resources.
    #[must_use]
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Currently initialized clients.
    #[must_use]
    pub const fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    /// Returns `true` once the server has handled transport traffic.
    #[must_use]
    pub const fn is_serving(&self) -> bool {
        self.serving
    }

    /// Registers the tool list. Allowed once, before serving starts.
    ///
    /// # Errors
    ///
    /// Returns an error if serving already started, tools were already
    /// registered, or the list contains empty or duplicate names.
    pub fn register_tools(
        &mut self,
        tools: impl IntoIterator<Item = Tool>,
    ) -> Result<(), RegistryError> {
        if self.serving {
            return Err(RegistryError::ServingStarted { kind: "tools" });
        }
        self.registry.register_tools(tools)
    }

    /// Registers the resource list and its reader. Allowed once, before
    /// serving starts.
    ///
    /// # Errors
    ///
    /// Returns an error if serving already started, resources were already
    /// registered, or the list contains empty or duplicate URIs.
    pub fn register_resources(
        &mut self,
        resources: impl IntoIterator<Item = Resource>,
        reader: impl ResourceReader + 'static,
    ) -> Result<(), RegistryError> {
        if self.serving {
            return Err(RegistryError::ServingStarted { kind: "resources" });
        }
        self.registry.register_resources(resources, reader)
    }

    pub(super) fn mark_serving(&mut self) {
        if !self.serving {
            debug!(
                tools = self.registry.tools().len(),
                resources = self.registry.resources().len(),
                "Registry frozen"
            );
            self.serving = true;
        }
    }

    /// Handles one transport event.
    pub fn handle_event(&mut self, event: TransportEvent, transport: &mut dyn Transport) {
        match event {
            TransportEvent::Connected => self.on_connected(transport),
            TransportEvent::Message(msg) => self.dispatch(&msg, transport),
            TransportEvent::Disconnected => self.on_disconnected(),
        }
    }

    /// Serves over a line-delimited JSON bridge until EOF or `shutdown`
    /// completes.
    ///
    /// Emits a `connect` action carrying `options` first, then one batch of
    /// actions per inbound frame. Presence is retracted on the way out.
    ///
    /// # Errors
    ///
    /// Returns an error if reading from or writing to the bridge fails.
    pub async fn run_bridge<R, W>(
        &mut self,
        bridge: &mut StdioBridge<R, W>,
        options: ConnectOptions,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), TransportError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tokio::pin!(shutdown);
        let mut outbox = Outbox::new();

        bridge
            .write_action(&OutboundAction::Connect(options))
            .await?;

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }

                line = bridge.read_line() => {
                    let Some(line) = line? else {
                        info!("Bridge input closed");
                        break;
                    };

                    if line.trim().is_empty() {
                        continue;
                    }

                    match parse_frame(&line) {
                        Ok(event) => self.handle_event(event, &mut outbox),
                        Err(e) => warn!(error = %e, "Skipping malformed bridge frame"),
                    }

                    flush(bridge, &mut outbox).await?;
                }
            }
        }

        self.shutdown(&mut outbox);
        flush(bridge, &mut outbox).await
    }
}

async fn flush<R, W>(
    bridge: &mut StdioBridge<R, W>,
    outbox: &mut Outbox,
) -> Result<(), TransportError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    for action in outbox.drain() {
        bridge.write_action(&action).await?;
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut sigint, mut sigterm) = match (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
    ) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Failed to install signal handlers");
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

/// Resolves on Ctrl+C.
#[cfg(windows)]
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return std::future::pending().await;
    }
    info!("Received Ctrl+C, initiating graceful shutdown");
}
