//! Engine configuration, loaded from a JSON file with environment overrides
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::holiday::{HolidayClientConfig, HolidayEntry};
use crate::schedule::planner::DEFAULT_MAX_GENERATION_DAYS;
use crate::schedule::reschedule::DEFAULT_SEARCH_WINDOW_DAYS;
use crate::schedule::BranchHours;

/// Path of the JSON config file.
pub const CONFIG_PATH_ENV: &str = "ENGINE_CONFIG";
pub const ADDR_ENV: &str = "ENGINE_ADDR";
pub const DB_PATH_ENV: &str = "ENGINE_DB_PATH";
pub const HOLIDAY_COUNTRY_ENV: &str = "HOLIDAY_COUNTRY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Intervals for the background loops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub enabled: bool,
    pub no_show_interval_secs: u64,
    /// Minutes after a session ends before it counts as a no-show
    pub no_show_grace_minutes: i64,
    pub reminder_interval_secs: u64,
    pub reminder_lookahead_days: i64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            no_show_interval_secs: 5 * 60,
            no_show_grace_minutes: 30,
            reminder_interval_secs: 60 * 60,
            reminder_lookahead_days: 7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bind_address: String,
    pub db_path: String,
    pub holidays: HolidayClientConfig,
    /// Extra closure days treated like public holidays
    pub closures: Vec<HolidayEntry>,
    /// Used for branches without stored hours
    pub default_branch_hours: BranchHours,
    pub reschedule_window_days: i64,
    pub max_generation_days: i64,
    pub tasks: TaskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            db_path: "sessions.db".to_string(),
            holidays: HolidayClientConfig::default(),
            closures: Vec::new(),
            default_branch_hours: BranchHours::DEFAULT,
            reschedule_window_days: DEFAULT_SEARCH_WINDOW_DAYS,
            max_generation_days: DEFAULT_MAX_GENERATION_DAYS,
            tasks: TaskConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: EngineConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path: display, source })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads from `ENGINE_CONFIG` if set, else defaults, then applies
    /// environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::load_from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(addr) = lookup(ADDR_ENV) {
            self.bind_address = addr;
        }
        if let Some(path) = lookup(DB_PATH_ENV) {
            self.db_path = path;
        }
        if let Some(country) = lookup(HOLIDAY_COUNTRY_ENV) {
            self.holidays.country_code = country.to_uppercase();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.default_branch_hours.is_valid() {
            return Err(ConfigError::Invalid {
                message: format!(
                    "default branch hours {}-{} are not a valid window",
                    self.default_branch_hours.open_minutes, self.default_branch_hours.close_minutes
                ),
            });
        }
        if self.reschedule_window_days < 1 || self.max_generation_days < 1 {
            return Err(ConfigError::Invalid {
                message: "reschedule window and generation cap must be positive".to_string(),
            });
        }
        if self.holidays.country_code.len() != 2 {
            return Err(ConfigError::Invalid {
                message: format!("'{}' is not a two-letter country code", self.holidays.country_code),
            });
        }
        Ok(())
    }
}
