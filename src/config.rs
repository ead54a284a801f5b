//! Configuration for the EmoBand agent.

use crate::core::stabilizer::StabilizerStrategy;
use crate::link::DeviceMatcher;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which paired devices count as the band
    pub device: DeviceMatchConfig,

    /// How instantaneous predictions are smoothed
    pub stabilizer: StabilizerStrategy,

    /// Linear model artifact (JSON); without one no window is classified
    pub model_path: Option<PathBuf>,

    /// Scaler artifact (JSON); the bundled scaler is used when absent
    pub scaler_path: Option<PathBuf>,

    /// Default tracing filter when RUST_LOG is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceMatchConfig::default(),
            stabilizer: StabilizerStrategy::default(),
            model_path: None,
            scaler_path: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, using defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("emoband-agent")
            .join("config.json")
    }
}

/// Device name allow-list. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMatchConfig {
    /// Exact name, preferred over fragment matches
    pub canonical_name: String,
    /// Substrings that also identify a compatible band
    pub name_fragments: Vec<String>,
}

impl Default for DeviceMatchConfig {
    fn default() -> Self {
        Self {
            canonical_name: "ESP32_EmotionBand".to_string(),
            name_fragments: vec![
                "ESP32".to_string(),
                "AuraSense".to_string(),
                "EmotionBand".to_string(),
            ],
        }
    }
}

impl DeviceMatchConfig {
    /// Parse fragments from a comma-separated string.
    pub fn with_fragments_csv(mut self, s: &str) -> Self {
        self.name_fragments = s
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(String::from)
            .collect();
        self
    }

    pub fn matcher(&self) -> DeviceMatcher {
        DeviceMatcher::new(self.canonical_name.clone(), self.name_fragments.clone())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}
