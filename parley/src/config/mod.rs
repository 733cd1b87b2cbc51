//! Configuration for the conversation engine.
//!
//! Layered resolution, highest priority first:
//! 1. TOML config file (`~/.config/parley/config.toml`)
//! 2. Compiled defaults
//!
//! A missing config file is not an error (defaults are used). An
//! explicit path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::connection::{BackoffConfig, ConnectionConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    session: SessionFileConfig,
    ui: UiFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    relay_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    backoff_initial_ms: Option<u64>,
    backoff_ceiling_secs: Option<u64>,
    max_reconnect_attempts: Option<u32>,
}

/// `[session]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SessionFileConfig {
    outbound_queue_capacity: Option<usize>,
    event_buffer: Option<usize>,
    outbound_buffer: Option<usize>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    typing_timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Network --
    /// Relay server WebSocket URL.
    pub relay_url: Option<String>,
    /// Timeout for connecting to the relay server.
    pub connect_timeout: Duration,
    /// Delay before the second dial attempt; doubles per failure.
    pub backoff_initial: Duration,
    /// Upper bound on the delay between dial attempts.
    pub backoff_ceiling: Duration,
    /// Dial attempts per connect cycle before going offline.
    pub max_reconnect_attempts: u32,

    // -- Session --
    /// Outbound events buffered while the link is down.
    pub outbound_queue_capacity: usize,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
    /// Capacity of the index-to-manager outbound channel.
    pub outbound_buffer: usize,

    // -- UI --
    /// Typing indicator decay.
    pub typing_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_url: None,
            connect_timeout: Duration::from_secs(10),
            backoff_initial: Duration::from_millis(500),
            backoff_ceiling: Duration::from_secs(30),
            max_reconnect_attempts: 6,
            outbound_queue_capacity: 64,
            event_buffer: 256,
            outbound_buffer: 64,
            typing_timeout: Duration::from_secs(3),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file merged over defaults.
    ///
    /// If `path` is `Some`, the file must exist. If `path` is `None`,
    /// the default path (`~/.config/parley/config.toml`) is tried and
    /// silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an explicit config file cannot be
    /// read, or if the file contents fail to parse.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let file = load_config_file(path)?;
        Ok(Self::resolve(&file))
    }

    /// Resolve a `ClientConfig` from a parsed config file.
    ///
    /// Priority: file > default. Separated from `load()` to enable unit
    /// testing without filesystem access.
    #[must_use]
    fn resolve(file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            relay_url: file.network.relay_url.clone(),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            backoff_initial: file
                .network
                .backoff_initial_ms
                .map_or(defaults.backoff_initial, Duration::from_millis),
            backoff_ceiling: file
                .network
                .backoff_ceiling_secs
                .map_or(defaults.backoff_ceiling, Duration::from_secs),
            max_reconnect_attempts: file
                .network
                .max_reconnect_attempts
                .unwrap_or(defaults.max_reconnect_attempts),
            outbound_queue_capacity: file
                .session
                .outbound_queue_capacity
                .unwrap_or(defaults.outbound_queue_capacity),
            event_buffer: file.session.event_buffer.unwrap_or(defaults.event_buffer),
            outbound_buffer: file
                .session
                .outbound_buffer
                .unwrap_or(defaults.outbound_buffer),
            typing_timeout: file
                .ui
                .typing_timeout_secs
                .map_or(defaults.typing_timeout, Duration::from_secs),
        }
    }

    /// Builds the connection manager configuration from this config.
    #[must_use]
    pub const fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            backoff: BackoffConfig {
                initial: self.backoff_initial,
                ceiling: self.backoff_ceiling,
                max_attempts: self.max_reconnect_attempts,
            },
            queue_capacity: self.outbound_queue_capacity,
            event_buffer: self.event_buffer,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and a
/// missing file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available — use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("parley").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
