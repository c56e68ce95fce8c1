//! Server configuration.
//!
//! Configuration is layered from:
//! - The first TOML file found among `$BAYEUX_CONFIG`, `bayeux.toml`,
//!   `/etc/bayeux/bayeux.toml` and `~/.config/bayeux/bayeux.toml`
//! - Environment variables (`BAYEUX_PORT`, `BAYEUX_ENGINE__TIMEOUT_SECS`, ...)

use anyhow::{Context, Result};
use bayeux_core::EngineConfig;
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "BAYEUX_CONFIG";

const CONFIG_PATHS: [&str; 3] = [
    "bayeux.toml",
    "/etc/bayeux/bayeux.toml",
    "~/.config/bayeux/bayeux.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path the Bayeux endpoint is mounted at.
    #[serde(default = "default_mount")]
    pub mount: String,

    /// Engine timing.
    #[serde(default)]
    pub engine: EngineSection,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Engine timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Long-poll hold time in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Reconnect interval advertised to clients, in seconds.
    #[serde(default)]
    pub interval_secs: u64,

    /// Delivery batching window in milliseconds.
    #[serde(default)]
    pub max_delay_ms: u64,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Accept WebSocket upgrades on the mount path.
    #[serde(default = "default_true")]
    pub websocket: bool,

    /// Serve EventSource streams under the mount path.
    #[serde(default = "default_true")]
    pub eventsource: bool,

    /// Keep-alive ping interval for socket transports, in seconds. Zero
    /// disables pings.
    #[serde(default = "default_ping_secs")]
    pub ping_secs: u64,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum request body or frame size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_mount() -> String {
    "/bayeux".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_ping_secs() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            mount: default_mount(),
            engine: EngineSection::default(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            interval_secs: 0,
            max_delay_ms: 0,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket: true,
            eventsource: true,
            ping_secs: default_ping_secs(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from the first config file found, with
    /// environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or an
    /// environment override has the wrong type.
    pub fn load() -> Result<Self> {
        match find_config_file() {
            Some(path) => Self::from_file(path),
            None => Self::build(None),
        }
    }

    /// Load configuration from a specific file, with environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(Some(path.as_ref()))
    }

    fn build(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            let name = path.to_string_lossy();
            builder = builder.add_source(File::new(&name, FileFormat::Toml));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("BAYEUX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| match path {
                Some(path) => format!("Failed to read config file: {}", path.display()),
                None => "Failed to read configuration".to_string(),
            })?;

        settings
            .try_deserialize()
            .context("Failed to parse configuration")
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }

    /// Engine settings derived from this configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            timeout: Duration::from_secs(self.engine.timeout_secs),
            interval: Duration::from_secs(self.engine.interval_secs),
            max_delay: Duration::from_millis(self.engine.max_delay_ms),
            ..EngineConfig::default()
        }
    }

    /// Keep-alive interval for socket transports, if enabled.
    #[must_use]
    pub fn ping_interval(&self) -> Option<Duration> {
        (self.transport.ping_secs > 0).then(|| Duration::from_secs(self.transport.ping_secs))
    }
}

/// The config file to load, if any exists.
fn find_config_file() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(shellexpand::tilde(&path).as_ref()));
    }

    CONFIG_PATHS
        .iter()
        .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
        .find(|path| path.exists())
}
