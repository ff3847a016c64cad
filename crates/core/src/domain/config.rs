//! Configuration management for sixband
//!
//! This module provides:
//! - The TOML configuration file (stream settings, test signal, parameter table)
//! - Loading/saving with factory-default fallback
//! - Hot-reload support via file system watcher

use crate::domain::audio::{ChannelCount, SampleRate, StreamConfig};
use crate::domain::params::{AtomicParameterStore, ParamError, ParamId, ParameterStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("File watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Parameter error: {0}")]
    Parameter(#[from] ParamError),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Largest block handed to the equalizer, in frames
    pub block_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 512,
        }
    }
}

/// Test signal rendered through the equalizer during playback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    #[default]
    Sine,
    Noise,
}

/// Output device and test signal configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output device ID (empty = use default)
    #[serde(default)]
    pub device: String,

    #[serde(default)]
    pub signal: SignalKind,

    /// Signal level in dBFS
    pub level_db: f32,

    /// Sine frequency in Hz (ignored for noise)
    pub frequency_hz: f32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device: String::new(),
            signal: SignalKind::Sine,
            level_db: -18.0,
            frequency_hz: 440.0,
        }
    }
}

/// Complete sixband configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SixbandConfig {
    #[serde(default)]
    pub app: AppConfig,

    #[serde(default)]
    pub output: OutputConfig,

    /// Parameter id (`LOWCUTFREQ`, ...) to value
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

impl SixbandConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!(
            parameters = config.parameters.len(),
            "Configuration loaded successfully"
        );
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration with every parameter listed
    pub fn factory_default() -> Self {
        let mut config = Self::default();
        config.capture(&AtomicParameterStore::new());
        config
    }

    /// Replace the parameter table with the store's current values
    pub fn capture<S: ParameterStore + ?Sized>(&mut self, store: &S) {
        self.parameters = ParamId::ALL
            .into_iter()
            .map(|id| (id.id().to_string(), store.value(id)))
            .collect();
    }

    /// Check stream settings and parameter names
    pub fn validate(&self) -> Result<()> {
        if self.app.sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "sample_rate must be greater than zero".to_string(),
            ));
        }
        if self.app.block_size == 0 {
            return Err(ConfigError::Invalid(
                "block_size must be greater than zero".to_string(),
            ));
        }
        self.parameter_changes()?;
        Ok(())
    }

    /// Resolve the parameter table into typed changes
    pub fn parameter_changes(&self) -> Result<Vec<(ParamId, f32)>> {
        self.parameters
            .iter()
            .map(|(name, value)| Ok((name.parse::<ParamId>()?, *value)))
            .collect()
    }

    /// Write the parameter table into a store as one transaction
    ///
    /// Values are clamped to their ranges. Returns the number written.
    pub fn apply_parameters(&self, store: &AtomicParameterStore) -> Result<usize> {
        let changes = self.parameter_changes()?;
        let written = store.apply(changes)?;
        info!(count = written, "Applied parameters from configuration");
        Ok(written)
    }

    /// Stream settings for the playback device
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            sample_rate: SampleRate::from_hz(self.app.sample_rate),
            channels: ChannelCount::Stereo,
            buffer_size: self.app.block_size,
        }
    }
}

/// File system watcher for hot-reload
pub struct ConfigWatcher {
    _watcher: notify::RecommendedWatcher,
    config_tx: broadcast::Sender<PathBuf>,
}

impl ConfigWatcher {
    /// Watch a directory for created or modified `.toml` files
    pub async fn new(config_dir: PathBuf) -> Result<Self> {
        use notify::Watcher;

        let (config_tx, _config_rx) = broadcast::channel(32);

        // Create the directory if it doesn't exist
        fs::create_dir_all(&config_dir).await?;

        let tx_clone = config_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if matches!(
                    event.kind,
                    notify::EventKind::Create(_) | notify::EventKind::Modify(_)
                ) {
                    for path in event.paths {
                        if path.extension().and_then(|e| e.to_str()) == Some("toml") {
                            // No subscribers is not an error worth reporting
                            if tx_clone.receiver_count() > 0 {
                                if let Err(e) = tx_clone.send(path) {
                                    error!("Failed to send config change event: {}", e);
                                }
                            }
                        }
                    }
                }
            }
        })?;

        watcher.watch(&config_dir, notify::RecursiveMode::NonRecursive)?;

        info!(
            path = %config_dir.display(),
            "Config watcher started"
        );

        Ok(Self {
            _watcher: watcher,
            config_tx,
        })
    }

    /// Subscribe to config change events
    pub fn subscribe(&self) -> broadcast::Receiver<PathBuf> {
        self.config_tx.subscribe()
    }
}

/// Manager for the main configuration file
///
/// Manages `~/.config/sixband/config.toml` (or the platform equivalent).
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager rooted at `config_dir`
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/sixband` on Linux, the platform config dir elsewhere
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("sixband"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, writes and returns the factory default.
    /// If the config file is corrupt, backs it up and returns the factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> SixbandConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );
            let config = SixbandConfig::factory_default();
            if let Err(e) = self.save(&config).await {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }
            return config;
        }

        match SixbandConfig::load_from_file(&self.config_path).await {
            Ok(config) => config,
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                SixbandConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &SixbandConfig) -> Result<()> {
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Delete the config file if present
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(
                path = %self.config_path.display(),
                "Configuration cleared"
            );
        }
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
