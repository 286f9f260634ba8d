//! Configuration file structures.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root of the configuration file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Identity advertised to MCP clients.
    pub server: ServerConfig,

    /// Broker connection settings handed to the transport.
    pub broker: BrokerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Checks the values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };

        if self.server.name.trim().is_empty() {
            return Err(invalid("server.name", "must not be empty"));
        }
        if self.broker.client_id.trim().is_empty() {
            return Err(invalid("broker.client_id", "must not be empty"));
        }
        if !BROKER_SCHEMES
            .iter()
            .any(|scheme| self.broker.uri.starts_with(scheme))
        {
            return Err(ConfigError::Invalid {
                field: "broker.uri",
                reason: format!("'{}' must start with mqtt:// or mqtts://", self.broker.uri),
            });
        }
        if self.broker.keep_alive_secs == 0 {
            return Err(invalid("broker.keep_alive_secs", "must be greater than zero"));
        }
        if self.broker.forward_password && self.broker.password.is_none() {
            return Err(invalid("broker.forward_password", "set but broker.password is missing"));
        }

        Ok(())
    }
}

const BROKER_SCHEMES: [&str; 2] = ["mqtt://", "mqtts://"];

/// Server identity settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Server name, used as the last topic segment.
    pub name: String,

    /// Human-readable description sent with the presence announcement.
    #[serde(default)]
    pub description: Option<String>,
}

/// MQTT broker settings.
///
/// The server core never opens a connection itself; these values are passed
/// through to whichever transport fronts it, in the `connect` frame.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    /// Broker URI, `mqtt://host:port` or `mqtts://host:port`.
    pub uri: String,

    /// MQTT client identifier of this server.
    pub client_id: String,

    /// Optional username.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password.
    #[serde(default)]
    pub password: Option<String>,

    /// Put the password in the `connect` frame. Off by default so the secret
    /// stays out of the bridge output.
    #[serde(default)]
    pub forward_password: bool,

    /// Optional path to a PEM CA certificate for `mqtts://`.
    #[serde(default)]
    pub cert_path: Option<PathBuf>,

    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
}

// Hand-written so the password never lands in logs.
impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("uri", &self.uri)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("forward_password", &self.forward_password)
            .field("cert_path", &self.cert_path)
            .field("keep_alive_secs", &self.keep_alive_secs)
            .finish()
    }
}

impl BrokerConfig {
    /// Broker settings with no credentials and the default keep-alive.
    #[must_use]
    pub fn new(uri: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            client_id: client_id.into(),
            username: None,
            password: None,
            forward_password: false,
            cert_path: None,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

const fn default_keep_alive() -> u16 {
    10
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
