//! Error types for mcp-mqtt-server.
//!
//! # Security Note
//!
//! Error messages never include broker credentials. Validation failures name
//! the offending field, not its value, unless the value is a URI or identifier.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while locating, reading or validating the config file.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No file at the given (or default) location.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Where the file was expected.
        path: PathBuf,
    },

    /// The home directory could not be determined, so there is no default path.
    #[error("no home directory; pass the configuration file path explicitly")]
    NoDefaultPath,

    /// The file exists but could not be read.
    #[error("failed to read configuration file: {path}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid configuration JSON.
    #[error("failed to parse configuration file: {path}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// A field holds a value the server cannot use.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Dotted path of the field, e.g. `broker.uri`.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Errors raised while building a server identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A required identity field was empty.
    #[error("server {field} must not be empty")]
    Empty {
        /// Which field was empty.
        field: &'static str,
    },

    /// A field contained a character that is not allowed inside a topic segment.
    #[error("server {field} contains '{found}', which is not allowed in a topic segment")]
    InvalidTopicSegment {
        /// Which field was rejected.
        field: &'static str,
        /// The offending character.
        found: char,
    },
}

/// Errors raised while populating the tool and resource registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Tools (or resources) were already registered on this server.
    #[error("{kind} already registered")]
    AlreadyRegistered {
        /// "tools" or "resources".
        kind: &'static str,
    },

    /// Registration attempted after the server started handling traffic.
    #[error("cannot register {kind} after the server started serving")]
    ServingStarted {
        /// "tools" or "resources".
        kind: &'static str,
    },

    /// Two entries in one registration share a key.
    #[error("duplicate {kind} '{key}'")]
    Duplicate {
        /// "tool" or "resource".
        kind: &'static str,
        /// The repeated name or URI.
        key: String,
    },

    /// An entry had an empty name or URI.
    #[error("{kind} name must not be empty")]
    EmptyName {
        /// "tool", "property" or "resource".
        kind: &'static str,
    },
}

/// Errors reported by a transport implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Reading from or writing to the underlying channel failed.
    #[error("transport I/O failed")]
    Io(#[from] std::io::Error),

    /// An outbound frame could not be serialised.
    #[error("failed to serialise outbound frame")]
    Serialise(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));

        let error = ConfigError::Invalid {
            field: "broker.uri",
            reason: "must start with mqtt:// or mqtts://".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "invalid broker.uri: must start with mqtt:// or mqtts://"
        );
    }

    #[test]
    fn registry_error_names_key() {
        let error = RegistryError::Duplicate {
            kind: "tool",
            key: "set_volume".to_string(),
        };
        assert_eq!(error.to_string(), "duplicate tool 'set_volume'");
    }

    #[test]
    fn identity_error_names_character() {
        let error = IdentityError::InvalidTopicSegment {
            field: "name",
            found: '#',
        };
        assert!(error.to_string().contains("'#'"));
    }

    #[test]
    fn transport_error_keeps_source() {
        use std::error::Error as _;

        let error = TransportError::from(std::io::Error::from(std::io::ErrorKind::BrokenPipe));
        assert_eq!(error.to_string(), "transport I/O failed");
        assert!(error.source().is_some());
    }
}
