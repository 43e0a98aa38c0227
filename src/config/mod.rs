//! Configuration management.
//!
//! Precedence, lowest first: built-in defaults, the TOML file, then
//! `RECLAIM_*` environment variables.
//!
//! ```toml
//! [scheduler]
//! protected = ["session"]
//!
//! [scheduler.interval]
//! period = "15m"
//! ttl = "10m"
//!
//! [scheduler.memory_pressure]
//! source = "meminfo"
//! min_available_ratio = 0.1
//!
//! [scheduler.idle]
//! enabled = false
//!
//! [dashboard]
//! manual_ttl = "60s"
//!
//! [stores]
//! data_dir = "~/.local/share/reclaim"
//! ```

mod duration;

pub use duration::{format_duration, parse_duration};

use crate::dashboard::DEFAULT_MANUAL_TTL;
use crate::scheduler::{
    IntervalTrigger, MeminfoPressureSource, MemoryPressureSource, SchedulerConfig,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "RECLAIM_CONFIG_PATH";

/// Where low-memory signals come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PressureSourceKind {
    /// No source; the memory-pressure trigger runs on its fallback period.
    None,
    /// Poll `/proc/meminfo`.
    #[default]
    Meminfo,
}

impl PressureSourceKind {
    /// Parses a source name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for unknown names.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "meminfo" => Ok(Self::Meminfo),
            other => Err(Error::InvalidInput(format!(
                "unknown memory pressure source: {other:?}"
            ))),
        }
    }

    /// Returns the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Meminfo => "meminfo",
        }
    }
}

/// Memory pressure source settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureSourceConfig {
    /// Which source to attach.
    pub kind: PressureSourceKind,
    /// Available/total ratio below which memory counts as low.
    pub min_available_ratio: f64,
    /// Poll cadence.
    pub poll_every: Duration,
}

impl Default for PressureSourceConfig {
    fn default() -> Self {
        Self {
            kind: PressureSourceKind::Meminfo,
            min_available_ratio: 0.1,
            poll_every: Duration::from_secs(5),
        }
    }
}

impl PressureSourceConfig {
    /// Builds the configured source, if any.
    #[must_use]
    pub fn build(&self) -> Option<Box<dyn MemoryPressureSource>> {
        match self.kind {
            PressureSourceKind::None => None,
            PressureSourceKind::Meminfo => Some(Box::new(MeminfoPressureSource::new(
                self.min_available_ratio,
                self.poll_every,
            ))),
        }
    }
}

/// Logging section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Log file path; stderr when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// `EnvFilter` directive, e.g. `reclaim=debug`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Metrics section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MetricsSettings {
    /// Whether to install the Prometheus recorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Listener port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Scheduler section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<ConfigFileScheduler>,
    /// Dashboard section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard: Option<ConfigFileDashboard>,
    /// Logging section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSettings>,
    /// Stores section.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stores: Option<ConfigFileStores>,
}

/// `[scheduler]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFileScheduler {
    /// Ids never evicted by scheduled or manual sweeps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected: Option<Vec<String>>,
    /// `[scheduler.interval]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<ConfigFileInterval>,
    /// `[scheduler.visibility]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<ConfigFileThrottled>,
    /// `[scheduler.memory_pressure]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_pressure: Option<ConfigFilePressure>,
    /// `[scheduler.idle]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle: Option<ConfigFileIdle>,
}

/// `[scheduler.interval]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFileInterval {
    /// Set to `false` to disable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Time between sweeps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<String>,
    /// Sweep ttl.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
}

/// `[scheduler.visibility]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFileThrottled {
    /// Set to `false` to disable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Sweep ttl.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    /// Throttle window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
}

/// `[scheduler.memory_pressure]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFilePressure {
    /// Set to `false` to disable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Sweep ttl.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    /// Throttle window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
    /// Cadence when no source is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_period: Option<String>,
    /// `meminfo` or `none`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Low-memory threshold for `meminfo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_available_ratio: Option<f64>,
    /// Poll cadence for `meminfo`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_every: Option<String>,
}

/// `[scheduler.idle]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFileIdle {
    /// Set to `false` to disable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    /// Inactivity before the sweep.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_after: Option<String>,
    /// Sweep ttl.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<String>,
    /// Throttle window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub throttle: Option<String>,
}

/// `[dashboard]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFileDashboard {
    /// Ttl for "run collection now".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manual_ttl: Option<String>,
}

/// `[stores]` section.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ConfigFileStores {
    /// Directory for the JSON stores.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

/// Main configuration for reclaim.
#[derive(Debug, Clone, PartialEq)]
pub struct ReclaimConfig {
    /// Sweep triggers and protected ids.
    pub scheduler: SchedulerConfig,
    /// Memory pressure source.
    pub pressure_source: PressureSourceConfig,
    /// Ttl for dashboard collections.
    pub manual_ttl: Duration,
    /// Logging settings, resolved by the observability layer.
    pub logging: LoggingSettings,
    /// Metrics settings, resolved by the observability layer.
    pub metrics: MetricsSettings,
    /// Directory for the JSON stores.
    pub data_dir: PathBuf,
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            pressure_source: PressureSourceConfig::default(),
            manual_ttl: DEFAULT_MANUAL_TTL,
            logging: LoggingSettings::default(),
            metrics: MetricsSettings::default(),
            data_dir: default_data_dir(),
        }
    }
}

impl ReclaimConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration for the process.
    ///
    /// Uses `explicit` if given, else the file named by `RECLAIM_CONFIG_PATH`,
    /// else the platform default location. Environment overrides apply last.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed,
    /// or if an override holds an invalid value.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(env_path) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or holds invalid values.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/reclaim/`. Returns
    /// defaults if neither holds a usable file.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("reclaim").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("reclaim")
                .join("config.toml"),
        ];
        for path in candidates.iter().filter(|path| path.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => warn!(path = %path.display(), error = %e, "Ignoring unusable config file"),
            }
        }

        Self::default()
    }

    /// Converts a `ConfigFile` to `ReclaimConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(scheduler) = file.scheduler {
            config.apply_scheduler_section(scheduler)?;
        }
        if let Some(dashboard) = file.dashboard {
            if let Some(ttl) = duration_field("dashboard.manual_ttl", dashboard.manual_ttl)? {
                config.manual_ttl = ttl;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }
        if let Some(data_dir) = file.stores.and_then(|stores| stores.data_dir) {
            config.data_dir = expand_home(&data_dir);
        }

        Ok(config)
    }

    fn apply_scheduler_section(&mut self, section: ConfigFileScheduler) -> Result<()> {
        if let Some(protected) = section.protected {
            self.scheduler.protected = protected;
        }

        if let Some(interval) = section.interval {
            self.scheduler.interval = if interval.enabled == Some(false) {
                None
            } else {
                let mut trigger = self.scheduler.interval.unwrap_or_default();
                if let Some(period) = duration_field("scheduler.interval.period", interval.period)? {
                    trigger.period = period;
                }
                if let Some(ttl) = duration_field("scheduler.interval.ttl", interval.ttl)? {
                    trigger.ttl = ttl;
                }
                Some(trigger)
            };
        }

        if let Some(visibility) = section.visibility {
            self.scheduler.visibility = if visibility.enabled == Some(false) {
                None
            } else {
                let mut trigger = self.scheduler.visibility.unwrap_or_default();
                if let Some(ttl) = duration_field("scheduler.visibility.ttl", visibility.ttl)? {
                    trigger.ttl = ttl;
                }
                if let Some(throttle) =
                    duration_field("scheduler.visibility.throttle", visibility.throttle)?
                {
                    trigger.throttle = throttle;
                }
                Some(trigger)
            };
        }

        if let Some(pressure) = section.memory_pressure {
            self.apply_pressure_section(pressure)?;
        }

        if let Some(idle) = section.idle {
            self.scheduler.idle = if idle.enabled == Some(false) {
                None
            } else {
                let mut trigger = self.scheduler.idle.unwrap_or_default();
                if let Some(after) = duration_field("scheduler.idle.idle_after", idle.idle_after)? {
                    trigger.idle_after = after;
                }
                if let Some(ttl) = duration_field("scheduler.idle.ttl", idle.ttl)? {
                    trigger.ttl = ttl;
                }
                if let Some(throttle) = duration_field("scheduler.idle.throttle", idle.throttle)? {
                    trigger.throttle = throttle;
                }
                Some(trigger)
            };
        }

        Ok(())
    }

    fn apply_pressure_section(&mut self, section: ConfigFilePressure) -> Result<()> {
        if let Some(source) = section.source {
            self.pressure_source.kind = PressureSourceKind::parse(&source)?;
        }
        if let Some(ratio) = section.min_available_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::InvalidInput(format!(
                    "scheduler.memory_pressure.min_available_ratio must be within 0..=1, got {ratio}"
                )));
            }
            self.pressure_source.min_available_ratio = ratio;
        }
        if let Some(poll) = duration_field("scheduler.memory_pressure.poll_every", section.poll_every)? {
            self.pressure_source.poll_every = poll;
        }

        self.scheduler.memory_pressure = if section.enabled == Some(false) {
            None
        } else {
            let mut trigger = self.scheduler.memory_pressure.unwrap_or_default();
            if let Some(ttl) = duration_field("scheduler.memory_pressure.ttl", section.ttl)? {
                trigger.ttl = ttl;
            }
            if let Some(throttle) =
                duration_field("scheduler.memory_pressure.throttle", section.throttle)?
            {
                trigger.throttle = throttle;
            }
            if let Some(fallback) = duration_field(
                "scheduler.memory_pressure.fallback_period",
                section.fallback_period,
            )? {
                trigger.fallback_period = fallback;
            }
            Some(trigger)
        };
        Ok(())
    }

    /// Applies `RECLAIM_*` overrides read through `lookup`.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `RECLAIM_DATA_DIR` | store directory |
    /// | `RECLAIM_MANUAL_TTL` | dashboard collection ttl |
    /// | `RECLAIM_SWEEP_INTERVAL` | interval period, `off` disables |
    /// | `RECLAIM_PRESSURE_SOURCE` | `meminfo` or `none` |
    /// | `RECLAIM_PROTECTED` | comma-separated protected ids |
    ///
    /// Logging and metrics variables are read by the observability layer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a variable holds an invalid value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("RECLAIM_DATA_DIR") {
            self.data_dir = expand_home(&dir);
        }
        if let Some(ttl) = duration_field("RECLAIM_MANUAL_TTL", lookup("RECLAIM_MANUAL_TTL"))? {
            self.manual_ttl = ttl;
        }
        if let Some(period) = lookup("RECLAIM_SWEEP_INTERVAL") {
            if period.trim().eq_ignore_ascii_case("off") {
                self.scheduler.interval = None;
            } else {
                let period = duration_field("RECLAIM_SWEEP_INTERVAL", Some(period))?
                    .unwrap_or_default();
                let ttl = self.scheduler.interval.unwrap_or_default().ttl;
                self.scheduler.interval = Some(IntervalTrigger { period, ttl });
            }
        }
        if let Some(source) = lookup("RECLAIM_PRESSURE_SOURCE") {
            self.pressure_source.kind = PressureSourceKind::parse(&source)?;
        }
        if let Some(protected) = lookup("RECLAIM_PROTECTED") {
            self.scheduler.protected = protected
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(ToString::to_string)
                .collect();
        }
        Ok(())
    }

    /// Ids excluded from scheduled and manual sweeps.
    #[must_use]
    pub fn protected(&self) -> &[String] {
        &self.scheduler.protected
    }

    /// Builds the file form of this configuration.
    #[must_use]
    pub fn to_config_file(&self) -> ConfigFile {
        let scheduler = &self.scheduler;
        ConfigFile {
            scheduler: Some(ConfigFileScheduler {
                protected: Some(scheduler.protected.clone()),
                interval: Some(scheduler.interval.map_or_else(disabled_interval, |t| {
                    ConfigFileInterval {
                        enabled: Some(true),
                        period: Some(format_duration(t.period)),
                        ttl: Some(format_duration(t.ttl)),
                    }
                })),
                visibility: Some(scheduler.visibility.map_or_else(disabled_throttled, |t| {
                    ConfigFileThrottled {
                        enabled: Some(true),
                        ttl: Some(format_duration(t.ttl)),
                        throttle: Some(format_duration(t.throttle)),
                    }
                })),
                memory_pressure: Some(ConfigFilePressure {
                    enabled: Some(scheduler.memory_pressure.is_some()),
                    ttl: scheduler.memory_pressure.map(|t| format_duration(t.ttl)),
                    throttle: scheduler.memory_pressure.map(|t| format_duration(t.throttle)),
                    fallback_period: scheduler
                        .memory_pressure
                        .map(|t| format_duration(t.fallback_period)),
                    source: Some(self.pressure_source.kind.as_str().to_string()),
                    min_available_ratio: Some(self.pressure_source.min_available_ratio),
                    poll_every: Some(format_duration(self.pressure_source.poll_every)),
                }),
                idle: Some(scheduler.idle.map_or_else(disabled_idle, |t| ConfigFileIdle {
                    enabled: Some(true),
                    idle_after: Some(format_duration(t.idle_after)),
                    ttl: Some(format_duration(t.ttl)),
                    throttle: Some(format_duration(t.throttle)),
                })),
            }),
            dashboard: Some(ConfigFileDashboard {
                manual_ttl: Some(format_duration(self.manual_ttl)),
            }),
            logging: Some(self.logging.clone()),
            metrics: Some(self.metrics.clone()),
            stores: Some(ConfigFileStores {
                data_dir: Some(self.data_dir.display().to_string()),
            }),
        }
    }

    /// Renders the effective configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.to_config_file()).map_err(|e| Error::OperationFailed {
            operation: "serialize_config".to_string(),
            cause: e.to_string(),
        })
    }

    /// Sets the store directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }
}

fn disabled_interval() -> ConfigFileInterval {
    ConfigFileInterval {
        enabled: Some(false),
        ..ConfigFileInterval::default()
    }
}

fn disabled_throttled() -> ConfigFileThrottled {
    ConfigFileThrottled {
        enabled: Some(false),
        ..ConfigFileThrottled::default()
    }
}

fn disabled_idle() -> ConfigFileIdle {
    ConfigFileIdle {
        enabled: Some(false),
        ..ConfigFileIdle::default()
    }
}

/// Parses an optional duration, naming `field` in the error.
fn duration_field(field: &str, value: Option<String>) -> Result<Option<Duration>> {
    value
        .map(|raw| {
            parse_duration(&raw).map_err(|e| match e {
                Error::InvalidInput(msg) => Error::InvalidInput(format!("{field}: {msg}")),
                other => other,
            })
        })
        .transpose()
}

/// Default store directory: the platform data dir, else `.reclaim`.
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".reclaim"),
        |dirs| dirs.data_dir().join("reclaim"),
    )
}

/// Expands a leading `~/`.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(dirs) = directories::BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}
