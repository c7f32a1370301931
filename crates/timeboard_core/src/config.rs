//! Runtime configuration loaded from TOML.
//!
//! # Responsibility
//! - Describe logging, storage, clock and alarm settings with defaults for
//!   every field.
//! - Validate values before any subsystem is started from them.
//!
//! # Invariants
//! - A missing config file is equivalent to an empty one.
//! - `validate` runs on every successful parse.

use crate::clock::{ClockError, RealTimeSource, VirtualClock};
use crate::db::open_db;
use crate::logging::{default_log_level, normalize_level};
use crate::repo::clock_repo::{ClockStateStore, SqliteClockStateStore};
use crate::repo::RepoError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_DB_FILE: &str = "timeboard.sqlite3";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(toml::de::Error),
    /// A field parsed but holds an unusable value.
    Invalid { field: &'static str, message: String },
    /// The database at `[storage] db_path` could not be opened or read.
    Storage(RepoError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid { field, message } => write!(f, "invalid `{field}`: {message}"),
            Self::Storage(err) => write!(f, "storage unavailable: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid { .. } => None,
            Self::Storage(err) => Some(err),
        }
    }
}

impl From<RepoError> for ConfigError {
    fn from(value: RepoError) -> Self {
        Self::Storage(value)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Parse(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub alarm: AlarmConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Absolute log directory; `None` leaves file logging off.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    #[serde(default = "default_speed")]
    pub speed: f64,
    /// Virtual instant to jump to at startup.
    #[serde(default)]
    pub start_at: Option<NaiveDateTime>,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            start_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl CoreConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path`; a missing file yields validated defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        normalize_level(&self.logging.level).map_err(|message| ConfigError::Invalid {
            field: "logging.level",
            message,
        })?;
        if let Some(dir) = &self.logging.dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "logging.dir",
                    message: format!("must be an absolute path, got `{}`", dir.display()),
                });
            }
        }
        if self.storage.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "storage.db_path",
                message: "must not be empty".to_string(),
            });
        }
        if !self.clock.speed.is_finite() || self.clock.speed < 0.0 {
            return Err(ConfigError::Invalid {
                field: "clock.speed",
                message: format!("must be a finite value >= 0, got {}", self.clock.speed),
            });
        }
        if self.alarm.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "alarm.poll_interval_ms",
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.alarm.poll_interval_ms)
    }

    /// Applies `[clock]` to a freshly constructed clock.
    pub fn apply_to_clock(&self, clock: &VirtualClock) -> Result<(), ClockError> {
        if let Some(start_at) = self.clock.start_at {
            clock.jump_to(start_at);
        }
        clock.set_speed(self.clock.speed)
    }

    /// Opens the clock persisted in `[storage] db_path`.
    ///
    /// `[clock]` is applied only when the database holds no saved anchor,
    /// so a restart resumes the saved clock.
    pub fn open_clock(
        &self,
        source: impl RealTimeSource + 'static,
    ) -> Result<VirtualClock, ConfigError> {
        let conn = open_db(&self.storage.db_path).map_err(RepoError::from)?;
        let store = SqliteClockStateStore::new(conn);
        let resumed = store.load()?.is_some();
        let clock = VirtualClock::with_store(source, store);
        if !resumed {
            self.apply_to_clock(&clock)
                .map_err(|err| ConfigError::Invalid {
                    field: "clock.speed",
                    message: err.to_string(),
                })?;
        }
        Ok(clock)
    }
}

fn default_level() -> String {
    default_log_level().to_string()
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_FILE)
}

fn default_speed() -> f64 {
    1.0
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
