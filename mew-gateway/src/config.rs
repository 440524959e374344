//! Gateway configuration: spaces, participants, and resource limits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Default maximum messages buffered per participant outbound queue
/// before the gateway considers the connection backpressured.
pub const DEFAULT_MAX_SEND_QUEUE: usize = 256;

/// Default maximum concurrent streams a single participant may hold open.
pub const DEFAULT_MAX_STREAMS_PER_PARTICIPANT: usize = 16;

/// Default maximum proposals a participant may have outstanding at once.
pub const DEFAULT_MAX_PENDING_PROPOSALS: usize = 64;

/// Default maximum entries in a single capability grant/revoke list.
pub const DEFAULT_MAX_CAPABILITY_LIST_LEN: usize = 128;

/// Default grace period (seconds) given to in-flight connections between
/// the shutdown notice and forcibly closing them.
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 2;

/// One configured participant within a space: the token it authenticates
/// with, its logical name, and the capability patterns it starts with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantConfig {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub capabilities: Vec<Value>,
}

/// One configured space: its name and the participants allowed to join
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceConfig {
    pub name: String,
    pub participants: Vec<ParticipantConfig>,
}

impl SpaceConfig {
    pub fn participant_for_token(&self, token: &str) -> Option<&ParticipantConfig> {
        self.participants.iter().find(|p| p.token == token)
    }
}

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub bind_addr: String,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default = "default_inject_path")]
    pub inject_path: String,
    pub spaces: Vec<SpaceConfig>,
    #[serde(default = "default_max_send_queue")]
    pub max_send_queue: usize,
    #[serde(default = "default_max_streams")]
    pub max_streams_per_participant: usize,
    #[serde(default = "default_max_pending_proposals")]
    pub max_pending_proposals: usize,
    #[serde(default = "default_max_capability_list_len")]
    pub max_capability_list_len: usize,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_ws_path() -> String {
    "/ws".to_string()
}
fn default_inject_path() -> String {
    "/inject".to_string()
}
fn default_max_send_queue() -> usize {
    DEFAULT_MAX_SEND_QUEUE
}
fn default_max_streams() -> usize {
    DEFAULT_MAX_STREAMS_PER_PARTICIPANT
}
fn default_max_pending_proposals() -> usize {
    DEFAULT_MAX_PENDING_PROPOSALS
}
fn default_max_capability_list_len() -> usize {
    DEFAULT_MAX_CAPABILITY_LIST_LEN
}
fn default_shutdown_grace_secs() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_SECS
}

impl GatewayConfig {
    #[must_use]
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    /// Load configuration from a TOML/JSON/YAML file plus `MEW_`-prefixed
    /// environment overrides (standard `config` crate layering).
    pub fn load(path: &str) -> Result<Self, GatewayError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("MEW").separator("__"))
            .build()
            .map_err(|e| GatewayError::Configuration {
                message: e.to_string(),
                key: None,
            })?;

        settings
            .try_deserialize()
            .map_err(|e| GatewayError::Configuration {
                message: e.to_string(),
                key: None,
            })
    }

    pub fn space(&self, name: &str) -> Option<&SpaceConfig> {
        self.spaces.iter().find(|s| s.name == name)
    }

    pub fn space_index(&self) -> HashMap<&str, &SpaceConfig> {
        self.spaces.iter().map(|s| (s.name.as_str(), s)).collect()
    }
}

/// Every setter is optional; `build()` always succeeds by falling back
/// to defaults.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigBuilder {
    bind_addr: Option<String>,
    ws_path: Option<String>,
    inject_path: Option<String>,
    spaces: Vec<SpaceConfig>,
    max_send_queue: Option<usize>,
    max_streams_per_participant: Option<usize>,
    max_pending_proposals: Option<usize>,
    max_capability_list_len: Option<usize>,
    shutdown_grace_secs: Option<u64>,
}

impl GatewayConfigBuilder {
    #[must_use]
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = Some(addr.into());
        self
    }

    #[must_use]
    pub fn ws_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn inject_path(mut self, path: impl Into<String>) -> Self {
        self.inject_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn space(mut self, space: SpaceConfig) -> Self {
        self.spaces.push(space);
        self
    }

    #[must_use]
    pub fn max_send_queue(mut self, n: usize) -> Self {
        self.max_send_queue = Some(n);
        self
    }

    #[must_use]
    pub fn max_streams_per_participant(mut self, n: usize) -> Self {
        self.max_streams_per_participant = Some(n);
        self
    }

    #[must_use]
    pub fn max_pending_proposals(mut self, n: usize) -> Self {
        self.max_pending_proposals = Some(n);
        self
    }

    #[must_use]
    pub fn max_capability_list_len(mut self, n: usize) -> Self {
        self.max_capability_list_len = Some(n);
        self
    }

    #[must_use]
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.shutdown_grace_secs = Some(secs);
        self
    }

    pub fn build(self) -> GatewayConfig {
        GatewayConfig {
            bind_addr: self.bind_addr.unwrap_or_else(|| "127.0.0.1:8765".to_string()),
            ws_path: self.ws_path.unwrap_or_else(default_ws_path),
            inject_path: self.inject_path.unwrap_or_else(default_inject_path),
            spaces: self.spaces,
            max_send_queue: self.max_send_queue.unwrap_or(DEFAULT_MAX_SEND_QUEUE),
            max_streams_per_participant: self
                .max_streams_per_participant
                .unwrap_or(DEFAULT_MAX_STREAMS_PER_PARTICIPANT),
            max_pending_proposals: self
                .max_pending_proposals
                .unwrap_or(DEFAULT_MAX_PENDING_PROPOSALS),
            max_capability_list_len: self
                .max_capability_list_len
                .unwrap_or(DEFAULT_MAX_CAPABILITY_LIST_LEN),
            shutdown_grace_secs: self
                .shutdown_grace_secs
                .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}
