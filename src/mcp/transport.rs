//! The publish/subscribe side of the server.
//!
//! The server core never talks to a broker directly. It sees inbound
//! [`TransportEvent`]s and asks a [`Transport`] to subscribe and publish.
//!
//! Two implementations ship with the crate:
//!
//! - [`Outbox`]: records every requested action in memory. The dispatcher
//!   writes into it; a driver (or a test) drains it afterwards.
//! - [`StdioBridge`]: line-delimited JSON frames on stdin/stdout, so that an
//!   external MQTT client process can feed the server.
//!
//! # Bridge Frames
//!
//! Inbound, one per line:
//!
//! ```text
//! {"event":"connected"}
//! {"event":"message","topic":"...","payload":"...","properties":{"K":"V"}}
//! {"event":"disconnected"}
//! ```
//!
//! Outbound, one per line: `connect`, `subscribe`, `unsubscribe` and
//! `publish` actions (see [`OutboundAction`]).

use std::io;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::TransportError;
use crate::mcp::lifecycle::ConnectOptions;

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Fire and forget.
    #[default]
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
    /// Assured single delivery.
    ExactlyOnce,
}

impl QoS {
    /// Numeric level as used on the wire.
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

impl Serialize for QoS {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.level())
    }
}

/// A message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the message arrived on.
    pub topic: String,
    /// Raw payload; empty for presence retractions.
    pub payload: Vec<u8>,
    /// MQTT 5 user properties, in arrival order.
    pub properties: Vec<(String, String)>,
}

impl InboundMessage {
    /// Creates a message without user properties.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            properties: Vec::new(),
        }
    }

    /// Adds a user property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// First user property named `key`.
    #[must_use]
    pub fn user_property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Everything the transport reports to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The broker session is up.
    Connected,
    /// A message arrived on a subscribed topic.
    Message(InboundMessage),
    /// The broker session was lost.
    Disconnected,
}

/// Operations the server needs from a connected MQTT client.
///
/// Calls are made from the dispatch thread and must not block for long.
pub trait Transport {
    /// Subscribes to `topic` with the no-local option set.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued.
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Drops a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued.
    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError>;

    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be issued.
    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError>;
}

/// A request made by the server to its transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum OutboundAction {
    /// Connect with the given options.
    Connect(ConnectOptions),
    /// Subscribe to a topic.
    Subscribe {
        /// Topic filter.
        topic: String,
        /// Suppress delivery of our own publications.
        no_local: bool,
    },
    /// Unsubscribe from a topic.
    Unsubscribe {
        /// Topic filter.
        topic: String,
    },
    /// Publish a message.
    Publish {
        /// Destination topic.
        topic: String,
        /// UTF-8 payload.
        payload: String,
        /// Delivery guarantee.
        qos: QoS,
        /// Retain flag.
        retain: bool,
    },
}

/// A [`Transport`] that queues actions in memory.
#[derive(Debug, Default)]
pub struct Outbox {
    actions: Vec<OutboundAction>,
}

impl Outbox {
    /// Creates an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions queued so far.
    #[must_use]
    pub fn actions(&self) -> &[OutboundAction] {
        &self.actions
    }

    /// Removes and returns all queued actions.
    pub fn drain(&mut self) -> Vec<OutboundAction> {
        std::mem::take(&mut self.actions)
    }

    /// Queued publications as `(topic, payload)` pairs.
    pub fn published(&self) -> impl Iterator<Item = (&str, &str)> {
        self.actions.iter().filter_map(|action| match action {
            OutboundAction::Publish { topic, payload, .. } => {
                Some((topic.as_str(), payload.as_str()))
            }
            _ => None,
        })
    }

    /// Topics subscribed to so far.
    pub fn subscriptions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().filter_map(|action| match action {
            OutboundAction::Subscribe { topic, .. } => Some(topic.as_str()),
            _ => None,
        })
    }
}

impl Transport for Outbox {
    fn subscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.actions.push(OutboundAction::Subscribe {
            topic: topic.to_string(),
            no_local: true,
        });
        Ok(())
    }

    fn unsubscribe(&mut self, topic: &str) -> Result<(), TransportError> {
        self.actions.push(OutboundAction::Unsubscribe {
            topic: topic.to_string(),
        });
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), TransportError> {
        self.actions.push(OutboundAction::Publish {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
            retain,
        });
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundFrame {
    Connected,
    Disconnected,
    Message {
        topic: String,
        #[serde(default)]
        payload: String,
        #[serde(default)]
        properties: IndexMap<String, String>,
    },
}

/// Parses one inbound bridge frame.
///
/// # Errors
///
/// Returns the JSON error if the line is not a valid frame.
pub fn parse_frame(line: &str) -> Result<TransportEvent, serde_json::Error> {
    let event = match serde_json::from_str(line)? {
        InboundFrame::Connected => TransportEvent::Connected,
        InboundFrame::Disconnected => TransportEvent::Disconnected,
        InboundFrame::Message {
            topic,
            payload,
            properties,
        } => TransportEvent::Message(InboundMessage {
            topic,
            payload: payload.into_bytes(),
            properties: properties.into_iter().collect(),
        }),
    };
    Ok(event)
}

/// Line-delimited JSON bridge over an async reader/writer pair.
pub struct StdioBridge<R, W> {
    reader: R,
    writer: W,
}

impl StdioBridge<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Bridge over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> StdioBridge<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a bridge over arbitrary streams.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next frame line.
    ///
    /// Returns `None` once the reader is closed (EOF).
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes_read = self.reader.read_line(&mut line).await?;

        if bytes_read == 0 {
            return Ok(None);
        }

        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }

        Ok(Some(line))
    }

    /// Writes one outbound action as a JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_action(&mut self, action: &OutboundAction) -> Result<(), TransportError> {
        let mut frame = serde_json::to_vec(action)?;
        // serde_json escapes newlines inside strings, so a frame is one line.
        frame.push(b'\n');

        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Gives back the writer, mostly for inspecting output in tests.
    pub fn into_writer(self) -> W {
        self.writer
    }
}
