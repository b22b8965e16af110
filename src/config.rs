//! Configuration management for the subtitle reader.
//!
//! Loads configuration from TOML files and provides runtime defaults. Loaded
//! values are sanitized: polluted expressions are cleared and numeric values
//! are clamped into their allowed ranges.

use crate::change_detector::GapPolicy;
use crate::sanitize;
use crate::types::Voice;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;
pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub tracking: TrackingConfig,

    #[serde(default)]
    pub speech: SpeechConfig,

    #[serde(default)]
    pub auto_read: AutoReadConfig,

    #[serde(default)]
    pub media: MediaConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Whitespace-separated class names of subtitle elements
    #[serde(default)]
    pub expression: String,

    /// Whether custom tracking is enabled at all
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            expression: String::new(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Utterance volume (0-1)
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Utterance rate (0.5-2)
    #[serde(default = "default_rate")]
    pub rate: f32,

    /// Preferred voice name
    #[serde(default)]
    pub voice: Option<String>,

    /// Only offer voices whose language tag starts with (or whose name
    /// contains) this value, e.g. "zh"
    #[serde(default)]
    pub voice_language: Option<String>,

    /// External TTS program; utterances are only logged when absent
    #[serde(default)]
    pub command: Option<CommandConfig>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            rate: default_rate(),
            voice: None,
            voice_language: None,
            command: None,
        }
    }
}

/// External speech program invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Program to run, e.g. "espeak-ng"
    pub program: String,

    /// Arguments; `{text}`, `{voice}`, `{volume}`, `{volume_pct}`, `{rate}`
    /// and `{rate_wpm}` are substituted per utterance
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,

    /// Voices the program offers
    #[serde(default)]
    pub voices: Vec<Voice>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoReadConfig {
    /// Whether auto-read starts with the engine
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Tick period in milliseconds
    #[serde(default = "default_interval")]
    pub interval_ms: u64,

    /// Lower bound for the tick period
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Upper bound for the tick period
    #[serde(default = "default_max_interval")]
    pub max_interval_ms: u64,

    /// Skip ticks entirely while the host video is playing
    #[serde(default)]
    pub pause_on_playback: bool,

    /// What an extraction error does to the remembered caption
    #[serde(default)]
    pub gap_policy: GapPolicy,
}

impl Default for AutoReadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: default_interval(),
            min_interval_ms: default_min_interval(),
            max_interval_ms: default_max_interval(),
            pause_on_playback: false,
            gap_policy: GapPolicy::default(),
        }
    }
}

impl AutoReadConfig {
    /// Clamp a requested period into the configured bounds
    pub fn clamp_interval(&self, interval_ms: u64) -> u64 {
        interval_ms.clamp(self.min_interval_ms, self.max_interval_ms)
    }

    /// The tick period, clamped
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.clamp_interval(self.interval_ms))
    }
}

/// Host media element settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Volume applied to the page's video (0-1)
    #[serde(default = "default_volume")]
    pub video_volume: f32,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            video_volume: default_volume(),
        }
    }
}

// Default value functions for serde
fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_volume() -> f32 {
    1.0
}

fn default_rate() -> f32 {
    1.0
}

fn default_interval() -> u64 {
    100
}

fn default_min_interval() -> u64 {
    100
}

fn default_max_interval() -> u64 {
    2000
}

fn default_command_args() -> Vec<String> {
    vec!["{text}".to_string()]
}

/// Errors reading or writing configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path, falling back to defaults
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match Self::from_toml(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Parse and sanitize a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        Ok(config.sanitized())
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("subtitle-reader")
            .join("config.toml")
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to_path(Self::default_config_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Replace polluted or out-of-range values with safe ones
    pub fn sanitized(mut self) -> Self {
        self.tracking.expression = sanitize::clean_expression(&self.tracking.expression);

        self.speech.volume =
            sanitize::clamp_f32(self.speech.volume, MIN_VOLUME, MAX_VOLUME, default_volume());
        self.speech.rate =
            sanitize::clamp_f32(self.speech.rate, MIN_RATE, MAX_RATE, default_rate());
        self.media.video_volume = sanitize::clamp_f32(
            self.media.video_volume,
            MIN_VOLUME,
            MAX_VOLUME,
            default_volume(),
        );

        let auto_read = &mut self.auto_read;
        if auto_read.min_interval_ms == 0 || auto_read.min_interval_ms > auto_read.max_interval_ms {
            warn!(
                "Invalid interval bounds {}..{}, using defaults",
                auto_read.min_interval_ms, auto_read.max_interval_ms
            );
            auto_read.min_interval_ms = default_min_interval();
            auto_read.max_interval_ms = default_max_interval();
        }
        auto_read.interval_ms = auto_read.clamp_interval(auto_read.interval_ms);

        self
    }
}

/// Key-value persistence for the configuration
pub trait ConfigStore: Send {
    fn load(&self) -> Config;
    fn save(&mut self, config: &Config) -> Result<(), ConfigError>;
}

/// TOML file on disk
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the default per-user location
    pub fn default_location() -> Self {
        Self::new(Config::default_config_path())
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        Config::load_from_path(self.path.clone())
    }

    fn save(&mut self, config: &Config) -> Result<(), ConfigError> {
        config.save_to_path(self.path.clone())
    }
}

/// In-memory store; clones share the same contents
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<Mutex<Config>>,
}

impl MemoryConfigStore {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Arc::new(Mutex::new(config)),
        }
    }

    /// Current stored contents
    pub fn current(&self) -> Config {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn load(&self) -> Config {
        self.current().sanitized()
    }

    fn save(&mut self, config: &Config) -> Result<(), ConfigError> {
        match self.inner.lock() {
            Ok(mut guard) => *guard = config.clone(),
            Err(poisoned) => *poisoned.into_inner() = config.clone(),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.tracking.enabled);
        assert!(config.tracking.expression.is_empty());
        assert!(config.auto_read.enabled);
        assert_eq!(config.auto_read.interval_ms, 100);
        assert_eq!(config.speech.volume, 1.0);
        assert_eq!(config.auto_read.gap_policy, GapPolicy::KeepPrevious);
        assert_eq!(config.media.video_volume, 1.0);
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[tracking]
expression = "ytp-caption-segment"

[speech]
volume = 0.5
rate = 1.5
voice = "Ting-Ting"

[auto_read]
interval_ms = 500
pause_on_playback = true
gap_policy = "reannounce"

[media]
video_volume = 0.3
"#;

        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.tracking.expression, "ytp-caption-segment");
        assert_eq!(config.speech.voice.as_deref(), Some("Ting-Ting"));
        assert_eq!(config.auto_read.interval(), Duration::from_millis(500));
        assert!(config.auto_read.pause_on_playback);
        assert_eq!(config.auto_read.gap_policy, GapPolicy::Reannounce);
        assert_eq!(config.media.video_volume, 0.3);
    }

    #[test]
    fn test_polluted_expression_is_reset() {
        let config = Config::from_toml(
            r#"
[tracking]
expression = "// ==UserScript== GM_getValue"
"#,
        )
        .unwrap();
        assert_eq!(config.tracking.expression, "");
    }

    #[test]
    fn test_out_of_range_values_are_clamped() {
        let config = Config::from_toml(
            r#"
[speech]
volume = 3.0
rate = nan

[auto_read]
interval_ms = 10
"#,
        )
        .unwrap();
        assert_eq!(config.speech.volume, 1.0);
        assert_eq!(config.speech.rate, 1.0);
        assert_eq!(config.auto_read.interval_ms, 100);

        let config = Config::from_toml("[media]\nvideo_volume = -0.5").unwrap();
        assert_eq!(config.media.video_volume, 0.0);
        let config = Config::from_toml("[media]\nvideo_volume = inf").unwrap();
        assert_eq!(config.media.video_volume, 1.0);

        let config = Config::from_toml("[auto_read]\ninterval_ms = 60000").unwrap();
        assert_eq!(config.auto_read.interval_ms, 2000);
    }

    #[test]
    fn test_invalid_bounds_fall_back() {
        let config = Config::from_toml(
            "[auto_read]\nmin_interval_ms = 5000\nmax_interval_ms = 100\ninterval_ms = 300",
        )
        .unwrap();
        assert_eq!(config.auto_read.min_interval_ms, 100);
        assert_eq!(config.auto_read.max_interval_ms, 2000);
        assert_eq!(config.auto_read.interval_ms, 300);
    }

    #[test]
    fn test_command_config() {
        let config = Config::from_toml(
            r#"
[speech.command]
program = "espeak-ng"
args = ["-a", "{volume_pct}", "{text}"]
voices = [{ name = "zh", lang = "zh-CN" }]
"#,
        )
        .unwrap();
        let command = config.speech.command.unwrap();
        assert_eq!(command.program, "espeak-ng");
        assert_eq!(command.args.len(), 3);
        assert_eq!(command.voices[0].lang, "zh-CN");
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut store = FileConfigStore::new(path.clone());

        // Missing file loads defaults
        assert_eq!(store.load(), Config::default());

        let mut config = Config::default();
        config.tracking.expression = "sub-line".to_string();
        config.auto_read.enabled = false;
        store.save(&config).unwrap();

        assert!(path.exists());
        assert_eq!(store.load(), config);
    }

    #[test]
    fn test_unparsable_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert_eq!(Config::load_from_path(path), Config::default());
    }

    #[test]
    fn test_memory_store_shares_contents() {
        let store = MemoryConfigStore::default();
        let mut writer = store.clone();

        let mut config = Config::default();
        config.speech.rate = 1.25;
        writer.save(&config).unwrap();

        assert_eq!(store.current().speech.rate, 1.25);
    }
}
