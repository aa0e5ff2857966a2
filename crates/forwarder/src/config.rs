//! Forwarder configuration management

use crate::buffer::BufferLimits;
use crate::connect::LocalEndpoint;
use crate::session::{Flow, SessionConfig};
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How the remote stream is established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RemoteMode {
    /// Dial `address`
    #[default]
    Connect,
    /// Bind `address` and accept a single peer
    Listen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardConfig {
    pub forward: ForwardSettings,
    pub remote: RemoteSettings,
    pub local: LocalSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardSettings {
    pub flow: Flow,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    pub address: String,
    #[serde(default)]
    pub mode: RemoteMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSettings {
    /// `unix:<path>` or `tcp:<host:port>`
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    pub wake_interval_ms: u64,
    pub drain_poll_ms: u64,
    pub tracker_capacity: usize,
    pub initial_buffer_size: usize,
    pub max_pdu_size: usize,
    pub max_backlog_bytes: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            wake_interval_ms: defaults.wake_interval.as_millis() as u64,
            drain_poll_ms: defaults.drain_poll.as_millis() as u64,
            tracker_capacity: defaults.tracker_capacity,
            initial_buffer_size: defaults.limits.initial_capacity,
            max_pdu_size: defaults.limits.max_pdu_size,
            max_backlog_bytes: defaults.max_backlog_bytes,
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            forward: ForwardSettings {
                flow: Flow::Outbound,
                log_level: "info".to_string(),
            },
            remote: RemoteSettings {
                address: "127.0.0.1:3240".to_string(),
                mode: RemoteMode::Connect,
            },
            local: LocalSettings {
                endpoint: "unix:/run/usbip/vhci.sock".to_string(),
            },
            session: SessionSettings::default(),
        }
    }
}

impl ForwardConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usbip-forward/forward.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: ForwardConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        // Logging is not set up yet; main logs the effective config
        eprintln!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                // Print to stderr since logging might not be initialized yet
                eprintln!("Config: {}", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbip-forward").join("forward.toml")
        } else {
            PathBuf::from(".config/usbip-forward/forward.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.forward.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.forward.log_level,
                valid_levels.join(", ")
            ));
        }

        self.remote
            .address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid remote address '{}'", self.remote.address))?;
        self.local_endpoint()?;

        let session = &self.session;
        let limits = [
            ("wake_interval_ms", session.wake_interval_ms as usize),
            ("drain_poll_ms", session.drain_poll_ms as usize),
            ("tracker_capacity", session.tracker_capacity),
            ("initial_buffer_size", session.initial_buffer_size),
            ("max_pdu_size", session.max_pdu_size),
            ("max_backlog_bytes", session.max_backlog_bytes),
        ];
        if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
            return Err(anyhow!("session.{} must be greater than zero", name));
        }
        if session.max_pdu_size < protocol::HEADER_SIZE {
            return Err(anyhow!(
                "session.max_pdu_size must be at least {} bytes",
                protocol::HEADER_SIZE
            ));
        }

        Ok(())
    }

    /// Parsed local endpoint
    pub fn local_endpoint(&self) -> Result<LocalEndpoint> {
        self.local
            .endpoint
            .parse()
            .with_context(|| format!("Invalid local endpoint '{}'", self.local.endpoint))
    }

    /// Session tunables
    pub fn session_config(&self) -> SessionConfig {
        let session = &self.session;
        SessionConfig {
            wake_interval: Duration::from_millis(session.wake_interval_ms),
            drain_poll: Duration::from_millis(session.drain_poll_ms),
            tracker_capacity: session.tracker_capacity,
            limits: BufferLimits {
                initial_capacity: session.initial_buffer_size,
                max_pdu_size: session.max_pdu_size,
            },
            max_backlog_bytes: session.max_backlog_bytes,
        }
    }
}
