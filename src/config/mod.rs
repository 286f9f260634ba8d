//! Configuration file loading and parsing.
//!
//! The file is JSON. It names the server, points at the broker and sets the
//! default log level:
//!
//! ```json
//! {
//!     "server": { "name": "ESP32 Demo Server", "description": "Speaker" },
//!     "broker": { "uri": "mqtt://broker.emqx.io:1883", "client_id": "esp32-demo" },
//!     "logging": { "level": "info" }
//! }
//! ```
//!
//! # Configuration File Locations
//!
//! The configuration file is searched in the following order:
//!
//! 1. Path given as the first CLI argument
//! 2. Default location:
//!    - **Linux/macOS:** `~/.mcp-mqtt-server/config.json`
//!    - **Windows:** `%USERPROFILE%\.mcp-mqtt-server\config.json`

mod settings;

pub use settings::{BrokerConfig, Config, LoggingConfig, ServerConfig};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.mcp-mqtt-server/`
/// - **Windows:** `%USERPROFILE%\.mcp-mqtt-server\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".mcp-mqtt-server"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads and validates the configuration file.
///
/// If `path` is `None`, uses the platform-specific default location.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] if there is no file, and the matching
/// variant if it cannot be read, parsed or validated.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().ok_or(ConfigError::NoDefaultPath)?,
    };

    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ConfigError::NotFound { path });
        }
        Err(source) => return Err(ConfigError::Read { path, source }),
    };

    let config: Config =
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })?;
    config.validate()?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_exists() {
        let path = default_config_path();
        assert!(path.is_some());
        assert!(path.unwrap().to_string_lossy().contains("config.json"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "server": { "name": "bench" },
                "broker": { "uri": "mqtt://localhost", "client_id": "bench-1" }
            }"#,
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.name, "bench");
        assert_eq!(config.broker.client_id, "bench-1");
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn load_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_runs_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "server": { "name": "bench" },
                "broker": { "uri": "tcp://localhost", "client_id": "bench-1" }
            }"#,
        )
        .unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "broker.uri",
                ..
            }
        ));
    }
}
