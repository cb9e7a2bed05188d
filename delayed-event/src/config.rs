//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! default_delay = "300ms"
//! max_delay = "10s"
//! strict_operations = false
//!
//! [logging]
//! log_level = "debug"
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{EngineError, EngineResult},
    logging::LoggerConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay used by bind calls that do not name one.
    #[serde(with = "humantime_serde")]
    pub default_delay: Duration,

    /// Longest delay a bind call may request (None = unbounded).
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_delay: Option<Duration>,

    /// Require an explicit operation name in positional dispatch.
    pub strict_operations: bool,

    pub logging: LoggerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_delay: Duration::from_millis(300),
            max_delay: None,
            strict_operations: false,
            logging: LoggerConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&text)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> EngineResult<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self)?;

        std::fs::write(path, text).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Platform config location, e.g. `~/.config/delayed-event/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "delayed-event", "delayed-event")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load `path`, or the default location when `None`. A missing file at
    /// the default location yields defaults; an explicit path must exist.
    pub fn load_or_default(path: Option<&Path>) -> EngineResult<Self> {
        if let Some(path) = path {
            info!("Loading config from {}", path.display());
            return Self::load_from_file(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => {
                info!("Loading config from {}", path.display());
                Self::load_from_file(&path)
            }
            _ => {
                info!("No config file found, using default configuration");
                Ok(Self::default())
            }
        }
    }
}
