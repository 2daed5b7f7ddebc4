//! Configuration snapshot for the monitor daemon
//!
//! The file is read once at startup. Any failure to read, parse or validate
//! it falls back to the documented defaults; the daemon never refuses to start
//! over a bad configuration.

use crate::dispatch::Action;
use crate::errors::{HatError, Result};
use crate::fan::ThresholdTable;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/penta-monitor.json";

/// Environment variable overriding the button GPIO chip
pub const ENV_BUTTON_CHIP: &str = "BUTTON_CHIP";
/// Environment variable overriding the button GPIO line
pub const ENV_BUTTON_LINE: &str = "BUTTON_LINE";

/// Shortest accepted timing or sample period
pub const MIN_PERIOD: Duration = Duration::from_millis(1);
/// Longest accepted timing or sample period
pub const MAX_PERIOD: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds as a duration, clamped to `MIN_PERIOD..=MAX_PERIOD`
fn period(seconds: f64) -> Duration {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => duration.clamp(MIN_PERIOD, MAX_PERIOD),
        Err(_) if seconds > 0.0 => MAX_PERIOD,
        Err(_) => MIN_PERIOD,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fan: FanConfig,
    pub key: KeyBindings,
    pub time: TimingConfig,
    pub slider: SliderConfig,
    pub display: DisplayConfig,
    pub disk: DiskConfig,
    pub button: ButtonConfig,
    pub pwm: PwmConfig,
}

/// Fan level thresholds in °C, plus how often the temperature is sampled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanConfig {
    pub lv0: f32,
    pub lv1: f32,
    pub lv2: f32,
    pub lv3: f32,
    /// Seconds between temperature samples
    pub interval: f64,
}

impl FanConfig {
    /// Time between temperature samples
    pub fn sample_interval(&self) -> Duration {
        period(self.interval)
    }
}

impl Default for FanConfig {
    fn default() -> Self {
        Self {
            lv0: 35.0,
            lv1: 40.0,
            lv2: 45.0,
            lv3: 50.0,
            interval: 60.0,
        }
    }
}

/// Action bound to each gesture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub click: Action,
    pub twice: Action,
    pub press: Action,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            click: Action::Slider,
            twice: Action::Switch,
            press: Action::None,
        }
    }
}

/// Gesture timings, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Double-click window
    pub twice: f64,
    /// Hold time for a long press
    pub press: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            twice: 0.7,
            press: 1.8,
        }
    }
}

impl TimingConfig {
    pub fn double_click_window(&self) -> Duration {
        period(self.twice)
    }

    pub fn long_press(&self) -> Duration {
        period(self.press)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SliderConfig {
    /// Rotate pages automatically
    pub auto: bool,
    /// Seconds each page stays on screen
    pub time: f64,
}

impl Default for SliderConfig {
    fn default() -> Self {
        Self {
            auto: true,
            time: 10.0,
        }
    }
}

impl SliderConfig {
    pub fn interval(&self) -> Duration {
        period(self.time)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Show the CPU temperature in °F
    #[serde(alias = "f-temp")]
    pub fahrenheit: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Extra block devices (e.g. `nvme0n1`) shown on the disk page
    pub extra: Vec<String>,
}

/// Command line dialect of the `gpiomon` edge watcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpiomonVersion {
    /// Ask the watcher with `--version` at startup
    #[default]
    Auto,
    /// libgpiod 1.x: `gpiomon --format=... <chip> <line>`
    V1,
    /// libgpiod 2.x: `gpiomon -c <chip> -F ... [-p <period>] <line>`
    V2,
}

/// Where the button edges come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonConfig {
    pub chip: String,
    pub line: u32,
    pub debounce_ms: u64,
    /// Edge watcher executable
    pub command: String,
    pub version: GpiomonVersion,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            chip: "gpiochip0".to_string(),
            line: 17,
            debounce_ms: 10,
            command: "gpiomon".to_string(),
            version: GpiomonVersion::Auto,
        }
    }
}

impl ButtonConfig {
    /// Minimum spacing between accepted edges
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PwmBackend {
    /// `/sys/class/hwmon/hwmonN/pwmM`, 0-255
    #[default]
    Hwmon,
    /// `/sys/class/pwm/pwmchipN/pwmM`, period and duty in nanoseconds
    PwmChip,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PwmConfig {
    pub backend: PwmBackend,
    /// PWM file (hwmon) or channel directory (pwmchip); detected when unset
    pub path: Option<PathBuf>,
    pub period_ns: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            backend: PwmBackend::Hwmon,
            path: None,
            period_ns: 40_000,
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Load and validate a configuration file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration, falling back to the defaults on any failure
    pub fn load_or_default(path: &Path) -> Self {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                config
            }
            Err(e) => {
                warn!(
                    "Failed to load configuration from {}: {}; using defaults",
                    path.display(),
                    e
                );
                Config::default()
            }
        };
        config.apply_env_overrides();
        config
    }

    /// Write the configuration atomically: temp file first, then rename
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, serde_json::to_string_pretty(self)?)?;
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            HatError::Io(e)
        })?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject timings that cannot be used as a wait period
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("time.twice", self.time.twice),
            ("time.press", self.time.press),
            ("slider.time", self.slider.time),
            ("fan.interval", self.fan.interval),
        ];
        for (name, value) in positive {
            let usable = Duration::try_from_secs_f64(value)
                .is_ok_and(|d| (MIN_PERIOD..=MAX_PERIOD).contains(&d));
            if !usable {
                return Err(HatError::Config(format!(
                    "{} must be between {:?} and {:?}, got {} seconds",
                    name, MIN_PERIOD, MAX_PERIOD, value
                )));
            }
        }

        let levels = [self.fan.lv0, self.fan.lv1, self.fan.lv2, self.fan.lv3];
        if levels.iter().any(|t| !t.is_finite()) {
            return Err(HatError::Config(
                "fan thresholds must be finite temperatures".to_string(),
            ));
        }
        if levels.windows(2).any(|w| w[0] > w[1]) {
            warn!(
                "Fan thresholds are not ascending (lv0..lv3 = {:?}); lower levels may never apply",
                levels
            );
        }

        Ok(())
    }

    /// Apply `BUTTON_CHIP` / `BUTTON_LINE` from the environment
    pub fn apply_env_overrides(&mut self) {
        if let Ok(chip) = std::env::var(ENV_BUTTON_CHIP) {
            self.button.chip = chip;
        }
        if let Ok(line) = std::env::var(ENV_BUTTON_LINE) {
            match line.trim().parse() {
                Ok(line) => self.button.line = line,
                Err(_) => warn!("Ignoring invalid {}={:?}", ENV_BUTTON_LINE, line),
            }
        }
    }

    /// Fan levels built from the `fan` section
    pub fn threshold_table(&self) -> ThresholdTable {
        ThresholdTable::from_config(&self.fan)
    }
}
