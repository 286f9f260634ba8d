//! Tracking of remote clients that completed the `initialize` handshake.

/// An initialized remote client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    /// The client's MQTT client identifier.
    pub client_id: String,
    /// Topic the server subscribed to for this client.
    pub rpc_topic: String,
}

/// The set of live sessions, in arrival order.
///
/// Not synchronised: the dispatcher owns it and runs on a single thread.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: Vec<ClientSession>,
}

impl SessionTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session.
    ///
    /// Returns `false`, leaving the tracker unchanged, if a session with the
    /// same client id already exists.
    pub fn insert(&mut self, client_id: &str, rpc_topic: String) -> bool {
        if self.contains(client_id) {
            return false;
        }
        self.sessions.push(ClientSession {
            client_id: client_id.to_string(),
            rpc_topic,
        });
        true
    }

    /// Returns `true` if a session with exactly this id exists.
    #[must_use]
    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.iter().any(|s| s.client_id == client_id)
    }

    /// Removes the session whose id ends `text` as a whole path segment.
    ///
    /// `text` is typically a presence topic such as
    /// `$mcp-client/presence/{client_id}`.
    pub fn remove(&mut self, text: &str) -> Option<ClientSession> {
        let index = self.position(text)?;
        Some(self.sessions.remove(index))
    }

    /// Removes the session with exactly this id.
    pub fn remove_exact(&mut self, client_id: &str) -> Option<ClientSession> {
        let index = self.sessions.iter().position(|s| s.client_id == client_id)?;
        Some(self.sessions.remove(index))
    }

    /// Same matching rule as [`remove`](Self::remove), without removing.
    #[must_use]
    pub fn is_known(&self, text: &str) -> bool {
        self.position(text).is_some()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no client is initialized.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterates over live sessions.
    pub fn iter(&self) -> impl Iterator<Item = &ClientSession> {
        self.sessions.iter()
    }

    // A bare suffix match would let "1" claim "$mcp-client/presence/c1"; the
    // id must start the text or follow a '/'.
    fn position(&self, text: &str) -> Option<usize> {
        self.sessions.iter().position(|s| {
            text.strip_suffix(s.client_id.as_str())
                .is_some_and(|head| head.is_empty() || head.ends_with('/'))
        })
    }
}
