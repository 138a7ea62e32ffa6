//! Application configuration
//!
//! TOML configuration stored in the platform config directory. Every field
//! has a default so a missing or partial file never blocks startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use cncsend_communication::EngineConfig;
use cncsend_core::{Error, Result};
use cncsend_gcode::ArcTessellation;

/// Serial connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Port name, or "auto" to pick the first discovered controller port
    pub port: String,
    pub baud_rate: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: "auto".to_string(),
            baud_rate: 115200,
        }
    }
}

/// Streaming engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    /// Base protocol tick interval in milliseconds
    pub poll_interval_ms: u64,
    /// Planner blocks that must stay free while streaming
    pub buffer_margin_blocks: u32,
    /// Poll the device for status and modal state while idle
    pub status_polling: bool,
    /// One `$G` modal poll per this many status polls
    pub modal_poll_divisor: u32,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            buffer_margin_blocks: 10,
            status_polling: true,
            modal_poll_divisor: 5,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub connection: ConnectionSettings,
    pub streaming: StreamingSettings,
    pub arcs: ArcTessellation,
}

impl AppConfig {
    /// Platform config file location, e.g.
    /// `~/.config/cncsend/config.toml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cncsend")
            .join("config.toml")
    }

    /// Load from the default location, falling back to defaults when the
    /// file does not exist.
    pub fn load_or_default() -> Self {
        let path = Self::default_path();
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "bad config, using defaults");
                Self::default()
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::other(format!("failed to read config file: {e}")))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| Error::other(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::other(format!("failed to create config dir: {e}")))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::other(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)
            .map_err(|e| Error::other(format!("failed to write config file: {e}")))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.baud_rate == 0 {
            return Err(Error::other("baud rate must be > 0"));
        }
        if self.streaming.poll_interval_ms == 0 {
            return Err(Error::other("poll interval must be > 0"));
        }
        if self.streaming.modal_poll_divisor == 0 {
            return Err(Error::other("modal poll divisor must be > 0"));
        }
        if self.arcs.coarse_step_deg <= 0.0
            || self.arcs.medium_step_deg <= 0.0
            || self.arcs.fine_step_deg <= 0.0
        {
            return Err(Error::other("arc step degrees must be > 0"));
        }
        Ok(())
    }

    /// The engine tuning this configuration asks for.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            poll_interval: Duration::from_millis(self.streaming.poll_interval_ms),
            buffer_margin_blocks: self.streaming.buffer_margin_blocks,
            status_polling: self.streaming.status_polling,
            modal_poll_divisor: self.streaming.modal_poll_divisor,
        }
    }
}
