//! Client configuration.
//!
//! [`ClientConfig`] is fixed for the lifetime of a
//! [`ReyerClient`](crate::client::ReyerClient). It can be persisted as
//! `reyer.toml` in the platform configuration directory.

use crate::error::config::ConfigError;
use crate::transport::IpcAddress;
use crate::{DEFAULT_PUBLISH_ADDRESS, DEFAULT_REQUEST_ADDRESS};

use common::ErrorLocation;

use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

const CONFIG_DIR_NAME: &str = "reyer";
const CONFIG_FILE_NAME: &str = "reyer.toml";
const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Socket addresses and timeouts for talking to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Reply endpoint of the runtime.
    #[serde(default = "default_request_address")]
    pub request_address: String,

    /// Publish endpoint of the runtime.
    #[serde(default = "default_publish_address")]
    pub publish_address: String,

    /// Upper bound for handing a request to the socket.
    #[serde(rename = "request_timeout_ms", with = "millis", default = "default_timeout")]
    pub request_timeout: Duration,

    /// Upper bound for every blocking receive (replies and broadcasts).
    #[serde(rename = "receive_timeout_ms", with = "millis", default = "default_timeout")]
    pub receive_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_address: default_request_address(),
            publish_address: default_publish_address(),
            request_timeout: default_timeout(),
            receive_timeout: default_timeout(),
        }
    }
}

fn default_request_address() -> String {
    DEFAULT_REQUEST_ADDRESS.to_string()
}

fn default_publish_address() -> String {
    DEFAULT_PUBLISH_ADDRESS.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TIMEOUT_MS)
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl ClientConfig {
    /// `{platform config dir}/reyer`, if the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME))
    }

    /// Load `{config_dir}/reyer.toml`.
    ///
    /// # Returns
    ///
    /// Returns defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Read {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        let config: ClientConfig = toml::from_str(&contents).map_err(|e| {
            warn!("Failed to parse {}: {}", config_path.display(), e);
            ConfigError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save to `{config_dir}/reyer.toml` through a temp file and rename.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);

        let contents = toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        let mut temp = NamedTempFile::new_in(config_dir).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        temp.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::Write {
                location: ErrorLocation::from(Location::caller()),
                path: temp.path().to_path_buf(),
                source: e,
            })?;

        temp.persist(&config_path).map_err(|e| ConfigError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e.error,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Reject configurations no client can work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for a non-`ipc://` or empty address,
    /// identical request and publish endpoints, or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, address) in [
            ("request_address", &self.request_address),
            ("publish_address", &self.publish_address),
        ] {
            if let Err(e) = IpcAddress::parse(address) {
                return Err(ConfigError::Validation {
                    location: ErrorLocation::from(Location::caller()),
                    reason: format!("Invalid {field}: {e}"),
                });
            }
        }

        if self.request_address == self.publish_address {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "request_address and publish_address must differ (both {})",
                    self.request_address
                ),
            });
        }

        if self.request_timeout.is_zero() || self.receive_timeout.is_zero() {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "Timeouts must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
