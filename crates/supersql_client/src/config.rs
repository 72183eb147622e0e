use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Client tuning knobs, typically loaded from `supersql.toml`.
///
/// ```toml
/// client_name = "nightly-report"
/// request_timeout_ms = 30000
/// poll_interval_ms = 250
///
/// [session_properties]
/// query_max_run_time = "2h"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Reported to the engine in the handshake.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_user")]
    pub user: String,
    /// TCP connect + handshake deadline.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Deadline for a single engine round trip (submit or page fetch).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// How long `description` waits for result metadata.
    #[serde(default = "default_describe_timeout_ms")]
    pub describe_timeout_ms: u64,
    /// Pause after an empty page before asking again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Default batch size for `fetchmany`.
    #[serde(default = "default_arraysize")]
    pub arraysize: usize,
    /// Sent with every statement, below any address options.
    #[serde(default)]
    pub session_properties: BTreeMap<String, String>,
}

fn default_client_name() -> String {
    "supersql-rs".to_string()
}

fn default_user() -> String {
    "supersql".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_describe_timeout_ms() -> u64 {
    300_000
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_arraysize() -> usize {
    1
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            user: default_user(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            describe_timeout_ms: default_describe_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            arraysize: default_arraysize(),
            session_properties: BTreeMap::new(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> ClientResult<Self> {
        let config: ClientConfig = toml::from_str(s)
            .map_err(|e| ClientError::InvalidArgument(format!("invalid client config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a config file. A missing or unparsable file falls back to
    /// defaults with a log line, so a bad file never blocks a connection.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded client config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("{} in {}, using defaults", e, path.display());
                    Self::default()
                }
            },
            Err(_) => {
                tracing::debug!("Client config {} not found, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.arraysize == 0 {
            return Err(ClientError::InvalidArgument(
                "arraysize must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("describe_timeout_ms", self.describe_timeout_ms),
        ] {
            if value == 0 {
                return Err(ClientError::InvalidArgument(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn describe_timeout(&self) -> Duration {
        Duration::from_millis(self.describe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
