//! Topic names used on the MQTT side of the protocol.
//!
//! These strings are the wire contract with remote MCP clients and must be
//! reproduced verbatim:
//!
//! | Topic        | Format                                              |
//! |--------------|-----------------------------------------------------|
//! | control      | `$mcp-server/{client_id}/{name}`                    |
//! | presence     | `$mcp-server/presence/{client_id}/{name}`           |
//! | capability   | `$mcp-server/capability/{client_id}/{name}`         |
//! | RPC          | `$mcp-rpc/{remote_client_id}/{client_id}/{name}`    |
//! | client left  | `$mcp-client/presence/{remote_client_id}`           |

use crate::error::IdentityError;

/// Prefix shared by every per-session RPC topic.
pub const RPC_PREFIX: &str = "$mcp-rpc/";

/// Prefix of the topics on which remote clients announce or retract presence.
pub const CLIENT_PRESENCE_PREFIX: &str = "$mcp-client/presence/";

/// Who this server is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    name: String,
    description: Option<String>,
    client_id: String,
}

impl ServerIdentity {
    /// Creates an identity.
    ///
    /// # Errors
    ///
    /// Fails if `name` or `client_id` is empty or contains `/`, `+` or `#`,
    /// any of which would corrupt the derived topics.
    pub fn new(
        name: impl Into<String>,
        description: Option<String>,
        client_id: impl Into<String>,
    ) -> Result<Self, IdentityError> {
        let name = name.into();
        let client_id = client_id.into();
        check_segment("name", &name)?;
        check_segment("client_id", &client_id)?;

        Ok(Self {
            name,
            description,
            client_id,
        })
    }

    /// Server name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// MQTT client identifier of the server.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

fn check_segment(field: &'static str, value: &str) -> Result<(), IdentityError> {
    if value.is_empty() {
        return Err(IdentityError::Empty { field });
    }
    if let Some(found) = value.chars().find(|c| matches!(c, '/' | '+' | '#')) {
        return Err(IdentityError::InvalidTopicSegment { field, found });
    }
    Ok(())
}

/// Returns `true` if `value` can be used as a single topic segment.
#[must_use]
pub fn is_valid_segment(value: &str) -> bool {
    check_segment("segment", value).is_ok()
}

/// The fixed topics of one server, computed once from its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    control: String,
    presence: String,
    capability: String,
    // "{client_id}/{name}", the tail of every RPC topic.
    rpc_suffix: String,
}

impl Topics {
    /// Derives the topics for `identity`.
    #[must_use]
    pub fn new(identity: &ServerIdentity) -> Self {
        let client_id = identity.client_id();
        let name = identity.name();

        Self {
            control: format!("$mcp-server/{client_id}/{name}"),
            presence: format!("$mcp-server/presence/{client_id}/{name}"),
            capability: format!("$mcp-server/capability/{client_id}/{name}"),
            rpc_suffix: format!("{client_id}/{name}"),
        }
    }

    /// Topic on which clients send `initialize`.
    #[must_use]
    pub fn control(&self) -> &str {
        &self.control
    }

    /// Topic carrying the online announcement and its retraction.
    #[must_use]
    pub fn presence(&self) -> &str {
        &self.presence
    }

    /// Topic for capability-change notifications.
    #[must_use]
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// RPC topic of the session with `remote_client_id`.
    #[must_use]
    pub fn rpc(&self, remote_client_id: &str) -> String {
        format!("{RPC_PREFIX}{remote_client_id}/{}", self.rpc_suffix)
    }

    /// Remote client id of one of this server's RPC topics.
    ///
    /// Returns `None` for RPC topics addressed to another server.
    #[must_use]
    pub fn rpc_client_id<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let id = topic
            .strip_prefix(RPC_PREFIX)?
            .strip_suffix(self.rpc_suffix.as_str())?
            .strip_suffix('/')?;
        (!id.is_empty() && !id.contains('/')).then_some(id)
    }
}

/// Returns `true` if `topic` belongs to the RPC namespace.
#[must_use]
pub fn is_rpc(topic: &str) -> bool {
    topic.starts_with(RPC_PREFIX)
}

/// Returns `true` if `topic` is a remote client presence topic.
#[must_use]
pub fn is_client_presence(topic: &str) -> bool {
    topic.starts_with(CLIENT_PRESENCE_PREFIX)
}

/// Extracts the remote client id from a client presence topic.
///
/// The id is the last path segment; returns `None` for other topics or an
/// empty segment.
#[must_use]
pub fn client_id_from_presence(topic: &str) -> Option<&str> {
    let rest = topic.strip_prefix(CLIENT_PRESENCE_PREFIX)?;
    let id = rest.rsplit('/').next()?;
    (!id.is_empty()).then_some(id)
}
