//! ---
//! rcc_section: "01-core-functionality"
//! rcc_subsection: "module"
//! rcc_type: "source"
//! rcc_scope: "code"
//! rcc_description: "Application configuration and setpoint data model."
//! rcc_version: "v0.1.0"
//! rcc_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_tick_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(50)
}

fn default_announce_status_changes() -> bool {
    true
}

fn default_decoder_stall_limit() -> u32 {
    8
}

fn default_hysteresis_c() -> f64 {
    1.0
}

fn default_plausible_min_c() -> f64 {
    -50.0
}

fn default_plausible_max_c() -> f64 {
    60.0
}

fn default_target_temp_c() -> f64 {
    2.0
}

fn default_compressor_min_off_s() -> u32 {
    120
}

fn default_defrost_interval_s() -> u32 {
    6 * 60 * 60
}

fn default_defrost_duration_s() -> u32 {
    20 * 60
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

fn default_persistence_enabled() -> bool {
    true
}

fn default_walk_in_edge_ft() -> f64 {
    10.0
}

fn default_file_logging() -> bool {
    true
}

fn default_persistence_path() -> PathBuf {
    PathBuf::from("target/state/setpoints.json")
}

/// Primary configuration object for the controller daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub controller: ControllerTuning,
    #[serde(default)]
    pub setpoints: ControlConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub walk_in: WalkInDimensions,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "RCC_CONFIG";

    /// Load configuration from disk, respecting the `RCC_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// Fails when no candidate exists; see [`AppConfig::load_or_default`] for
    /// the lenient variant used by the daemon.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Some(loaded) = Self::try_load(candidates)? {
            return Ok(loaded);
        }
        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    /// Like [`AppConfig::load_with_source`] but falls back to defaults when no
    /// file is present. Parse and validation failures are still errors.
    pub fn load_or_default<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        match Self::try_load(candidates)? {
            Some(loaded) => Ok(loaded),
            None => Ok(LoadedAppConfig {
                config: AppConfig::default(),
                source: None,
            }),
        }
    }

    fn try_load<P: AsRef<Path>>(candidates: &[P]) -> Result<Option<LoadedAppConfig>> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(Some(LoadedAppConfig {
                    config,
                    source: Some(path),
                }));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(Some(LoadedAppConfig {
                    config,
                    source: Some(path),
                }));
            }
        }
        Ok(None)
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.runtime.validate()?;
        self.controller.validate()?;
        self.walk_in.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Timing of the cooperative control loop.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Fixed control tick; every tick advances the controller clock by this much.
    #[serde(default = "default_tick_interval", rename = "tick_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    /// How often both UART channels are drained between ticks.
    #[serde(default = "default_poll_interval", rename = "poll_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,
    /// Emit a `STATUS` line on the monitor channel whenever the controller changes state.
    #[serde(default = "default_announce_status_changes")]
    pub announce_status_changes: bool,
    /// Polls without new bytes before a stuck partial frame is abandoned.
    #[serde(default = "default_decoder_stall_limit")]
    pub decoder_stall_limit: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            poll_interval: default_poll_interval(),
            announce_status_changes: default_announce_status_changes(),
            decoder_stall_limit: default_decoder_stall_limit(),
        }
    }
}

impl RuntimeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("runtime.tick_interval_ms must be greater than zero"));
        }
        if self.poll_interval.is_zero() {
            return Err(anyhow!("runtime.poll_interval_ms must be greater than zero"));
        }
        if self.decoder_stall_limit == 0 {
            return Err(anyhow!("runtime.decoder_stall_limit must be at least 1"));
        }
        Ok(())
    }
}

/// Controller constants that are tunable per installation but never exposed
/// over the UART protocol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerTuning {
    /// Margin around the target temperature used for both cooling edges.
    #[serde(default = "default_hysteresis_c")]
    pub hysteresis_c: f64,
    /// Lowest air temperature the sensor can plausibly report.
    #[serde(default = "default_plausible_min_c")]
    pub plausible_min_c: f64,
    /// Highest air temperature the sensor can plausibly report.
    #[serde(default = "default_plausible_max_c")]
    pub plausible_max_c: f64,
}

impl Default for ControllerTuning {
    fn default() -> Self {
        Self {
            hysteresis_c: default_hysteresis_c(),
            plausible_min_c: default_plausible_min_c(),
            plausible_max_c: default_plausible_max_c(),
        }
    }
}

impl ControllerTuning {
    pub fn validate(&self) -> Result<()> {
        if !self.hysteresis_c.is_finite() || self.hysteresis_c < 0.0 {
            return Err(anyhow!(
                "controller.hysteresis_c must be a non-negative number, got {}",
                self.hysteresis_c
            ));
        }
        if !(self.plausible_min_c.is_finite() && self.plausible_max_c.is_finite())
            || self.plausible_min_c >= self.plausible_max_c
        {
            return Err(anyhow!(
                "controller plausibility band [{}, {}] is empty",
                self.plausible_min_c,
                self.plausible_max_c
            ));
        }
        Ok(())
    }

    /// Whether an air temperature reading lies inside the plausibility band.
    pub fn is_plausible(&self, air_temp_c: f64) -> bool {
        air_temp_c.is_finite()
            && air_temp_c >= self.plausible_min_c
            && air_temp_c <= self.plausible_max_c
    }
}

/// Operator-tunable setpoints. Range checks live with the config store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_target_temp_c")]
    pub target_temp_c: f64,
    #[serde(default = "default_compressor_min_off_s")]
    pub compressor_min_off_s: u32,
    #[serde(default = "default_defrost_interval_s")]
    pub defrost_interval_s: u32,
    #[serde(default = "default_defrost_duration_s")]
    pub defrost_duration_s: u32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_temp_c: default_target_temp_c(),
            compressor_min_off_s: default_compressor_min_off_s(),
            defrost_interval_s: default_defrost_interval_s(),
            defrost_duration_s: default_defrost_duration_s(),
        }
    }
}

/// Interior size of the cold room in feet. Reported with every status.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WalkInDimensions {
    #[serde(default = "default_walk_in_edge_ft")]
    pub length_ft: f64,
    #[serde(default = "default_walk_in_edge_ft")]
    pub width_ft: f64,
    #[serde(default = "default_walk_in_edge_ft")]
    pub height_ft: f64,
}

impl Default for WalkInDimensions {
    fn default() -> Self {
        Self {
            length_ft: default_walk_in_edge_ft(),
            width_ft: default_walk_in_edge_ft(),
            height_ft: default_walk_in_edge_ft(),
        }
    }
}

impl WalkInDimensions {
    pub fn volume_ft3(&self) -> f64 {
        self.length_ft * self.width_ft * self.height_ft
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("length_ft", self.length_ft),
            ("width_ft", self.width_ft),
            ("height_ft", self.height_ft),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(anyhow!("walk_in.{key} must be a positive number, got {value}"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,
    #[serde(default = "default_persistence_path")]
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_persistence_enabled(),
            path: default_persistence_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Write the daily rolling JSON file next to stdout.
    #[serde(default = "default_file_logging")]
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            file: default_file_logging(),
        }
    }
}
