//! Configuration loading.
//!
//! Sources, lowest precedence first: built-in defaults, a YAML file
//! (`--config`, or `.tasks/config.yaml` when present), `TASKS_*`
//! environment variables, then command-line flags.

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use task_engine::{ResolveOptions, WeekStartDay, DEFAULT_OFFSET_MINUTES};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_PATH: &str = ".tasks/config.yaml";

pub const ENV_DATA_FILE: &str = "TASKS_DATA_FILE";
pub const ENV_UTC_OFFSET: &str = "TASKS_UTC_OFFSET_MINUTES";
pub const ENV_WEEK_START: &str = "TASKS_WEEK_START";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub time: TimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the JSON task document.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
        }
    }
}

fn default_data_file() -> PathBuf {
    PathBuf::from("database.json")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Fixed local offset from UTC, in minutes.
    #[serde(default = "default_offset")]
    pub utc_offset_minutes: i32,

    #[serde(default)]
    pub week_start: WeekStartDay,

    /// `HH:MM` used when a phrase names no time of day.
    #[serde(default = "default_time")]
    pub default_time: String,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: default_offset(),
            week_start: WeekStartDay::default(),
            default_time: default_time(),
        }
    }
}

fn default_offset() -> i32 {
    DEFAULT_OFFSET_MINUTES
}

fn default_time() -> String {
    "23:59".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }

    /// Load `explicit` if given, else the default file if it exists, else
    /// defaults; then apply environment overrides.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `TASKS_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(data_file) = lookup(ENV_DATA_FILE) {
            self.storage.data_file = PathBuf::from(data_file);
        }

        if let Some(offset) = lookup(ENV_UTC_OFFSET) {
            self.time.utc_offset_minutes = offset
                .trim()
                .parse()
                .with_context(|| format!("{ENV_UTC_OFFSET} must be a whole number of minutes"))?;
        }

        if let Some(week_start) = lookup(ENV_WEEK_START) {
            self.time.week_start = match week_start.trim().to_ascii_lowercase().as_str() {
                "monday" => WeekStartDay::Monday,
                "sunday" => WeekStartDay::Sunday,
                other => bail!("{ENV_WEEK_START} must be 'monday' or 'sunday', got '{other}'"),
            };
        }

        Ok(())
    }

    /// Resolver settings described by this configuration.
    pub fn resolve_options(&self) -> Result<ResolveOptions> {
        let default_time = NaiveTime::parse_from_str(self.time.default_time.trim(), "%H:%M")
            .with_context(|| {
                format!(
                    "default_time must be HH:MM, got '{}'",
                    self.time.default_time
                )
            })?;
        let options = ResolveOptions {
            offset_minutes: self.time.utc_offset_minutes,
            week_start: self.time.week_start,
            default_time,
        };
        options.offset()?;
        Ok(options)
    }
}
