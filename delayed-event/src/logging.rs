//! Tracing subscriber setup for hosts of the engine.
//!
//! The library itself only emits `tracing` events. Binaries call
//! [`init_logging`] once to install a registry with an `EnvFilter`, a stderr
//! formatter and, when `log_dir` is set, a rolling JSON file layer.

use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer, filter::Directive, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub log_level: CompactString,
    /// File output is disabled when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub log_file_prefix: CompactString,
    pub rotation: LogRotation,
    pub max_log_files: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Never,
    Daily,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_level: CompactString::const_new("info"),
            log_dir: None,
            log_file_prefix: CompactString::const_new("delayed-event"),
            rotation: LogRotation::Daily,
            max_log_files: 10,
        }
    }
}

impl LoggerConfig {
    #[must_use]
    pub fn with_level(mut self, level: impl Into<CompactString>) -> Self {
        self.log_level = level.into();
        self
    }

    fn filter(&self) -> Result<EnvFilter> {
        Ok(EnvFilter::from_default_env().add_directive(
            Directive::from_str(&self.log_level).context("Invalid log level in config")?,
        ))
    }
}

/// Install the global subscriber. Keep the returned guard alive for as long
/// as file logging should keep flushing.
pub fn init_logging(config: &LoggerConfig) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_filter(config.filter()?);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let rotation = match config.rotation {
                LogRotation::Never => Rotation::NEVER,
                LogRotation::Daily => Rotation::DAILY,
            };

            let appender = RollingFileAppender::builder()
                .rotation(rotation)
                .filename_prefix(config.log_file_prefix.as_str())
                .filename_suffix("jsonl")
                .max_log_files(config.max_log_files)
                .build(dir)
                .context("Failed to create file appender")?;

            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(config.filter()?);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    Ok(guard)
}
