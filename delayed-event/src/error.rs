//! Error handling for the delayed-event engine.
//!
//! Every fallible engine operation returns [`EngineResult`]. Validation
//! failures are raised synchronously at bind time; nothing is registered for
//! any element of the call when one is returned.

use compact_str::CompactString;
use std::path::PathBuf;
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

/// Engine error taxonomy
#[derive(Error, Debug)]
pub enum EngineError {
    /// Rejected input on `bind` / `invoke` / `execute`.
    #[error("Invalid argument: {field} - {message}")]
    InvalidArgument {
        field: CompactString, // "event_type", "delay", "args"
        message: CompactString,
    },

    /// Operation name not recognised (strict dispatch only).
    #[error("Unknown operation: {0}")]
    UnknownOperation(CompactString),

    /// `TokioTimer` needs a running Tokio runtime to spawn its timers.
    #[error("No Tokio runtime available for the timer service")]
    NoRuntime,

    /// TOML config parse or serialize failure.
    #[error("Config error: {0}")]
    Config(CompactString),

    /// Config file I/O error with path.
    #[error("Failed to access config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Create an invalid argument error
    #[inline]
    pub fn invalid_argument(
        field: impl Into<CompactString>,
        message: impl Into<CompactString>,
    ) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for errors raised by argument validation.
    #[inline(always)]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidArgument { .. } | EngineError::UnknownOperation(_)
        )
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(CompactString::from(err.to_string()))
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(CompactString::from(err.to_string()))
    }
}
