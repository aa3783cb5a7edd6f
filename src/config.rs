//! Application configuration
//!
//! Loaded from `config.toml` in the `arcadestick` config directory. Every
//! section has defaults matching the stock 12-button stick, so a partial
//! file (or none at all) still yields a working setup.

use crate::controller::bus::MIN_QUEUE_DEPTH;
use crate::controller::detector::{PotMode, SettlePolicy};
use crate::controller::events::{AxisId, FsrLevel};
use crate::controller::state::MAX_BUTTONS;
use crate::mapping::{KeyMap, MappingError, Profile};
use crate::transport::TransportKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const CONFIG_DIR: &str = "arcadestick";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Invalid keymap: {0}")]
    Keymap(#[from] MappingError),
}

/// One physical button: GPIO line and the code it reports
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonLine {
    pub line: u8,
    pub code: u8,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    pub button_poll_ms: u64,
    pub fsr_poll_ms: u64,
    pub pot_poll_ms: u64,
    pub fsr_settle_ms: u64,
    pub tick_ms: u64,
    pub keepalive_ms: u64,
    pub min_report_gap_ms: u64,
    pub media_release_ms: u64,
    pub stats_interval_s: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            button_poll_ms: 20,
            fsr_poll_ms: 40,
            pot_poll_ms: 50,
            fsr_settle_ms: 150,
            tick_ms: 10,
            keepalive_ms: 100,
            min_report_gap_ms: 10,
            media_release_ms: 50,
            stats_interval_s: 30,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DetectorConfig {
    /// Consecutive samples a new button level must hold
    pub debounce_samples: u8,
    /// Buttons pull the line low when pressed
    pub active_low: bool,
    pub fsr_settle_policy: SettlePolicy,
    pub pot_report_threshold: u8,
    pub pot_media_threshold: u8,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            debounce_samples: 1,
            active_low: true,
            fsr_settle_policy: SettlePolicy::Commit,
            pot_report_threshold: crate::controller::detector::POT_REPORT_THRESHOLD,
            pot_media_threshold: crate::controller::detector::POT_MEDIA_THRESHOLD,
        }
    }
}

impl DetectorConfig {
    /// Pot reporting mode for a profile, with the configured thresholds
    pub fn pot_mode(&self, profile: Profile) -> PotMode {
        match profile.pot_mode() {
            PotMode::Absolute { .. } => PotMode::Absolute {
                threshold: self.pot_report_threshold,
            },
            PotMode::Directional { .. } => PotMode::Directional {
                threshold: self.pot_media_threshold,
            },
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct AnalogConfig {
    pub pot_channel: u8,
    pub fsr_channel: u8,
    pub fsr_floor: u16,
}

impl Default for AnalogConfig {
    fn default() -> Self {
        Self {
            pot_channel: 0,
            fsr_channel: 2,
            fsr_floor: crate::controller::conditioner::FSR_FLOOR,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct BusConfig {
    pub queue_depth: usize,
    pub report_queue_depth: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            queue_depth: MIN_QUEUE_DEPTH,
            report_queue_depth: 32,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct SerialConfig {
    pub device: PathBuf,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/ttyS0"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub profile: Profile,
    pub transport: TransportKind,
    pub timing: TimingConfig,
    pub detector: DetectorConfig,
    pub bus: BusConfig,
    pub analog: AnalogConfig,
    pub serial: SerialConfig,
    pub buttons: Vec<ButtonLine>,
    pub keymap: KeyMap,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: Profile::default(),
            transport: TransportKind::default(),
            timing: TimingConfig::default(),
            detector: DetectorConfig::default(),
            bus: BusConfig::default(),
            analog: AnalogConfig::default(),
            serial: SerialConfig::default(),
            buttons: default_buttons(),
            keymap: KeyMap::default_config(),
        }
    }
}

/// Wiring of the stock stick: (GPIO line, code)
pub fn default_buttons() -> Vec<ButtonLine> {
    [
        (9, 0x01),
        (6, 0x02),
        (7, 0x03),
        (8, 0x04),
        (10, 0x05),
        (11, 0x09),
        (12, 0x0A),
        (13, 0x0B),
        (21, 0x0C),
        (20, 0x0D),
        (19, 0x0E),
        (18, 0x0F),
    ]
    .into_iter()
    .map(|(line, code)| ButtonLine { line, code })
    .collect()
}

impl Config {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reads and validates a config file
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!("Loading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_toml(&content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(path, self.to_toml()?).await.map_err(io_err)
    }

    /// Writes the default config if `path` does not exist yet, then loads it
    pub async fn ensure_default_config(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if !exists {
            info!("Creating default configuration at {}", path.display());
            Config::default().save(path).await?;
        }
        Self::load(path).await
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buttons.is_empty() {
            return Err(ConfigError::Invalid("no buttons configured".into()));
        }
        if self.buttons.len() > MAX_BUTTONS {
            return Err(ConfigError::Invalid(format!(
                "{} buttons configured, at most {} supported",
                self.buttons.len(),
                MAX_BUTTONS
            )));
        }

        let mut codes = HashSet::new();
        let mut lines = HashSet::new();
        for button in &self.buttons {
            if button.code == 0 || button.code >= 0x80 {
                return Err(ConfigError::Invalid(format!(
                    "button code 0x{:02X} out of range 0x01..0x7F",
                    button.code
                )));
            }
            let force_code = FsrLevel::ALL.iter().any(|level| level.code() == button.code)
                || AxisId::ALL.iter().any(|axis| axis.wire_id() == button.code);
            if force_code {
                return Err(ConfigError::Invalid(format!(
                    "button code 0x{:02X} is reserved for the force sensor",
                    button.code
                )));
            }
            if !codes.insert(button.code) {
                return Err(ConfigError::Invalid(format!(
                    "button code 0x{:02X} used twice",
                    button.code
                )));
            }
            if !lines.insert(button.line) {
                return Err(ConfigError::Invalid(format!(
                    "line {} used twice",
                    button.line
                )));
            }
        }

        if self.bus.queue_depth < MIN_QUEUE_DEPTH {
            return Err(ConfigError::Invalid(format!(
                "queue depth {} below minimum {}",
                self.bus.queue_depth, MIN_QUEUE_DEPTH
            )));
        }
        if self.bus.report_queue_depth == 0 {
            return Err(ConfigError::Invalid("report queue depth is 0".into()));
        }

        let t = &self.timing;
        let periods = [
            ("button_poll_ms", t.button_poll_ms),
            ("fsr_poll_ms", t.fsr_poll_ms),
            ("pot_poll_ms", t.pot_poll_ms),
            ("tick_ms", t.tick_ms),
            ("keepalive_ms", t.keepalive_ms),
            ("media_release_ms", t.media_release_ms),
            ("stats_interval_s", t.stats_interval_s),
        ];
        if let Some((name, _)) = periods.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{} must be non-zero", name)));
        }

        self.keymap.validate()?;
        Ok(())
    }

    pub fn button_codes(&self) -> Vec<u8> {
        self.buttons.iter().map(|b| b.code).collect()
    }
}
