//! Configuration system for the task board client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskboard/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use taskboard_proto::task::{Category, Column, Priority, TaskDraft, TaskPatch};

use crate::client::{NetConfig, ReconnectConfig};

/// Server URL used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5001/ws";

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

    /// The server URL is not a usable WebSocket URL.
    #[error("invalid server url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The timestamp format is not a valid chrono strftime string.
    #[error("invalid timestamp format {format:?}")]
    InvalidTimestampFormat {
        /// The rejected format string.
        format: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    network: NetworkFileConfig,
    reconnect: ReconnectFileConfig,
    ui: UiFileConfig,
}

/// `[network]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NetworkFileConfig {
    server_url: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[reconnect]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    initial_delay_ms: Option<u64>,
    max_delay_ms: Option<u64>,
    multiplier: Option<u32>,
}

/// `[ui]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UiFileConfig {
    timestamp_format: Option<String>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server WebSocket URL, validated as `ws` or `wss`.
    pub server_url: String,
    /// Timeout for each connection attempt.
    pub connect_timeout: Duration,
    /// Timeout for the snapshot and for a request's answer.
    pub request_timeout: Duration,
    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,
    /// Capacity of the session event channel.
    pub event_buffer: usize,
    /// Timestamp display format string (chrono).
    pub timestamp_format: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
            event_buffer: 256,
            timestamp_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, if the resolved server URL is not a WebSocket URL, or if
    /// the timestamp format does not parse.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::checked(Self::resolve(cli, &file))
    }

    fn checked(config: Self) -> Result<Self, ConfigError> {
        validate_server_url(&config.server_url)?;
        validate_timestamp_format(&config.timestamp_format)?;
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            server_url: cli
                .server_url
                .clone()
                .or_else(|| file.network.server_url.clone())
                .unwrap_or(defaults.server_url),
            connect_timeout: file
                .network
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .network
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            reconnect: ReconnectConfig {
                initial_delay: file
                    .reconnect
                    .initial_delay_ms
                    .map_or(defaults.reconnect.initial_delay, Duration::from_millis),
                max_delay: file
                    .reconnect
                    .max_delay_ms
                    .map_or(defaults.reconnect.max_delay, Duration::from_millis),
                multiplier: file
                    .reconnect
                    .multiplier
                    .unwrap_or(defaults.reconnect.multiplier),
            },
            event_buffer: file
                .network
                .event_buffer
                .unwrap_or(defaults.event_buffer),
            timestamp_format: file
                .ui
                .timestamp_format
                .clone()
                .unwrap_or(defaults.timestamp_format),
        }
    }

    /// Build the session settings from this configuration.
    #[must_use]
    pub fn to_net_config(&self) -> NetConfig {
        NetConfig {
            server_url: self.server_url.clone(),
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            reconnect: self.reconnect.clone(),
            event_buffer: self.event_buffer,
        }
    }
}

/// Checks that `raw` parses as a `ws://` or `wss://` URL with a host.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidUrl`] otherwise.
pub fn validate_server_url(raw: &str) -> Result<url::Url, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => {}
        other => return Err(invalid(format!("scheme must be ws or wss, got {other}"))),
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(parsed)
}

/// Checks that `format` is a strftime string chrono can render.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidTimestampFormat`] otherwise.
pub fn validate_timestamp_format(format: &str) -> Result<(), ConfigError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::InvalidTimestampFormat {
            format: format.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Terminal client for the real-time task board")]
pub struct CliArgs {
    /// WebSocket URL of the board server.
    #[arg(long, global = true, env = "TASKBOARD_URL")]
    pub server_url: Option<String>,

    /// Path to config file (default: `~/.config/taskboard/config.toml`).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info", env = "TASKBOARD_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskboard.log`).
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    /// What to do; defaults to `watch`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Client subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Follow the board live, re-rendering after every change.
    Watch,
    /// Print the current board and exit.
    List,
    /// Create a task.
    Create(TaskFields),
    /// Change fields of a task.
    Update {
        /// Task id.
        id: String,
        /// Fields to change.
        #[command(flatten)]
        fields: TaskFields,
    },
    /// Move a task to another column (todo, inProgress, done).
    Move {
        /// Task id.
        id: String,
        /// Destination column.
        column: Column,
    },
    /// Delete a task.
    Delete {
        /// Task id.
        id: String,
    },
}

/// Task fields accepted by `create` and `update`.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFields {
    /// Task title.
    #[arg(long)]
    pub title: Option<String>,
    /// Task description.
    #[arg(long)]
    pub description: Option<String>,
    /// Priority (Low, Medium, High).
    #[arg(long)]
    pub priority: Option<Priority>,
    /// Category (Bug, Feature, Enhancement).
    #[arg(long)]
    pub category: Option<Category>,
    /// Attachment data URL; repeat for several.
    #[arg(long = "attachment")]
    pub attachments: Vec<String>,
    /// Remove every attachment (update only).
    #[arg(long, conflicts_with = "attachments")]
    pub clear_attachments: bool,
}

impl TaskFields {
    /// Fields for a create request.
    #[must_use]
    pub fn into_draft(self) -> TaskDraft {
        TaskDraft {
            title: self.title,
            description: self.description,
            priority: self.priority,
            category: self.category,
            attachments: (!self.attachments.is_empty()).then_some(self.attachments),
        }
    }

    /// Fields for an update request. Only flags that were given change.
    #[must_use]
    pub fn into_patch(self) -> TaskPatch {
        let attachments = if self.clear_attachments {
            Some(Vec::new())
        } else {
            (!self.attachments.is_empty()).then_some(self.attachments)
        };
        TaskPatch {
            title: self.title,
            description: self.description,
            priority: self.priority,
            category: self.category,
            attachments,
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("taskboard").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
