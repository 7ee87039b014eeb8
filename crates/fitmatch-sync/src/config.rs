//! # Sync Configuration
//!
//! Configuration management for the data layer.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     FITMATCH_ROLE=watch                                                │
//! │     FITMATCH_PEER_URL=ws://192.168.1.20:9180/link                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/fitmatch/sync.toml (Linux)                               │
//! │     ~/Library/Application Support/com.fitmatch.app/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     DeviceRole::Phone, auto-generated device id                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Pixel 9"
//! role = "phone"  # phone | watch
//!
//! [link]
//! listen_addr = "0.0.0.0"
//! listen_port = 9180
//! peer_url = "ws://192.168.1.20:9180/link"  # watch role only
//! connect_timeout_secs = 10
//!
//! [protocol]
//! op_timeout_ms = 5000
//! replay_capacity = 16
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Device Role
// =============================================================================

/// Which half of the pairing this device is.
///
/// The phone hosts the link and owns the catalog; the watch dials the
/// phone and drives the discovery feed remotely. There is no automatic
/// election: the roles are fixed by the product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// The phone. Hosts the link, pushes products, receives actions.
    #[default]
    Phone,

    /// The watch. Dials the phone, requests products, sends actions.
    Watch,
}

impl std::fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceRole::Phone => write!(f, "phone"),
            DeviceRole::Watch => write!(f, "watch"),
        }
    }
}

impl std::str::FromStr for DeviceRole {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "phone" | "mobile" => Ok(DeviceRole::Phone),
            "watch" | "wear" => Ok(DeviceRole::Watch),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown device role: '{}'. Valid options: phone, watch",
                other
            ))),
        }
    }
}

// =============================================================================
// Device Configuration
// =============================================================================

/// Identity of this device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (UUID v4).
    /// Auto-generated on first run if not provided.
    pub id: String,

    /// Human-readable device name (e.g. "Pixel 9", "Pixel Watch 3").
    #[serde(default = "default_device_name")]
    pub name: String,

    /// Role of this device in the pairing.
    #[serde(default)]
    pub role: DeviceRole,
}

fn default_device_name() -> String {
    "FitMatch Device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            id: Uuid::new_v4().to_string(),
            name: default_device_name(),
            role: DeviceRole::default(),
        }
    }
}

// =============================================================================
// Link Settings
// =============================================================================

/// Settings for the device-to-device link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Bind address for the phone-side host.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Port for the phone-side host.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// WebSocket URL of the phone, used by the watch to dial.
    #[serde(default)]
    pub peer_url: Option<String>,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Handshake timeout (seconds).
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Maximum reconnection attempts before giving up.
    /// Set to 0 for infinite retries.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_listen_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    9180
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_handshake_timeout() -> u64 {
    5
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    0 // Infinite
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            listen_addr: default_listen_addr(),
            listen_port: default_listen_port(),
            peer_url: None,
            connect_timeout_secs: default_connect_timeout(),
            handshake_timeout_secs: default_handshake_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_retries: default_max_retries(),
        }
    }
}

impl LinkSettings {
    /// Returns the full bind address for the host.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

// =============================================================================
// Protocol Settings
// =============================================================================

/// Settings for protocol operations above the link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Per-call timeout for every public data-layer operation (milliseconds).
    #[serde(default = "default_op_timeout")]
    pub op_timeout_ms: u64,

    /// Capacity of each per-kind replay buffer in the subscription registry.
    #[serde(default = "default_replay_capacity")]
    pub replay_capacity: usize,
}

fn default_op_timeout() -> u64 {
    5000
}
fn default_replay_capacity() -> usize {
    16
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        ProtocolSettings {
            op_timeout_ms: default_op_timeout(),
            replay_capacity: default_replay_capacity(),
        }
    }
}

impl ProtocolSettings {
    /// Returns the per-call timeout as a Duration.
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete data-layer configuration.
///
/// ## Example Config File
/// ```toml
/// [device]
/// id = "550e8400-e29b-41d4-a716-446655440000"
/// name = "Pixel Watch 3"
/// role = "watch"
///
/// [link]
/// peer_url = "ws://192.168.1.20:9180/link"
///
/// [protocol]
/// op_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Device identity.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Link settings.
    #[serde(default)]
    pub link: LinkSettings,

    /// Protocol settings.
    #[serde(default)]
    pub protocol: ProtocolSettings,
}

impl SyncConfig {
    /// Creates a new config with defaults and a generated device ID.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)
            .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.device.id.is_empty() {
            return Err(SyncError::MissingDeviceId);
        }

        // The watch must know where its phone is.
        if self.device.role == DeviceRole::Watch {
            match self.link.peer_url {
                Some(ref raw) => {
                    let url = url::Url::parse(raw)?;
                    if url.scheme() != "ws" && url.scheme() != "wss" {
                        return Err(SyncError::InvalidUrl(format!(
                            "Peer URL must use ws:// or wss://, got: {}",
                            raw
                        )));
                    }
                }
                None => {
                    return Err(SyncError::InvalidConfig(
                        "peer_url is required for the watch role".into(),
                    ));
                }
            }
        }

        if self.protocol.op_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "op_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("FITMATCH_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Ok(name) = std::env::var("FITMATCH_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Ok(role) = std::env::var("FITMATCH_ROLE") {
            if let Ok(parsed) = role.parse() {
                debug!(role = %role, "Overriding device role from environment");
                self.device.role = parsed;
            } else {
                warn!(role = %role, "Unknown device role in environment");
            }
        }

        if let Ok(url) = std::env::var("FITMATCH_PEER_URL") {
            debug!(url = %url, "Overriding peer URL from environment");
            self.link.peer_url = Some(url);
        }

        if let Ok(port) = std::env::var("FITMATCH_LISTEN_PORT") {
            if let Ok(p) = port.parse::<u16>() {
                debug!(port = p, "Overriding listen port from environment");
                self.link.listen_port = p;
            }
        }

        if let Ok(timeout) = std::env::var("FITMATCH_OP_TIMEOUT_MS") {
            if let Ok(t) = timeout.parse::<u64>() {
                self.protocol.op_timeout_ms = t;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "fitmatch", "fitmatch")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the device ID.
    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    /// Returns the device role.
    pub fn role(&self) -> DeviceRole {
        self.device.role
    }

    /// Returns this device as a protocol node.
    pub fn node(&self) -> fitmatch_core::Node {
        fitmatch_core::Node::new(&self.device.id, &self.device.name)
    }

    /// Returns the peer URL if configured.
    pub fn peer_url(&self) -> Option<&str> {
        self.link.peer_url.as_deref()
    }
}
