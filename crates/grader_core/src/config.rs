//! Runtime configuration of the grading core.
//!
//! # Responsibility
//! - Load settings from a JSON file, falling back to defaults per field.
//! - Reject settings that would fail later at startup.
//!
//! # Invariants
//! - `log_level` is one of trace|debug|info|warn|error.
//! - `log_dir`, when set, is absolute.
//! - `max_propagation_rounds` is at least 1.

use crate::logging::{default_log_level, normalize_level};
use crate::service::propagation::DEFAULT_MAX_ROUNDS;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Settings consumed by [`crate::GradebookService::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GraderConfig {
    /// SQLite file; `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    /// Rolling log directory; `None` leaves logging to the host.
    pub log_dir: Option<PathBuf>,
    /// Settle parent averages after every command.
    pub auto_propagate: bool,
    pub max_propagation_rounds: usize,
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            auto_propagate: true,
            max_propagation_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}

impl GraderConfig {
    /// Defaults backed by a file database at `path`.
    pub fn with_db_path(path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if normalize_level(&self.log_level).is_err() {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }
        if let Some(dir) = &self.log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::RelativeLogDir(dir.clone()));
            }
        }
        if self.max_propagation_rounds == 0 {
            return Err(ConfigError::ZeroPropagationRounds);
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    InvalidLogLevel(String),
    RelativeLogDir(PathBuf),
    ZeroPropagationRounds,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidLogLevel(level) => write!(f, "unsupported log level `{level}`"),
            Self::RelativeLogDir(dir) => {
                write!(f, "log_dir must be absolute, got `{}`", dir.display())
            }
            Self::ZeroPropagationRounds => {
                write!(f, "max_propagation_rounds must be at least 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}
