//! Structured logging bootstrap.
//!
//! Component-based log targets allow filtering individual engine pieces:
//!
//! | Target | Description |
//! |--------|-------------|
//! | `split_engine::assignment` | Bucketing and assignment decisions |
//! | `split_engine::tracker` | Event recording and dedupe |
//! | `split_engine::decision` | Winner gating |
//! | `split_engine::lifecycle` | Create, status transitions, rollout |
//! | `split_engine::store` | Persistence collaborator |
//!
//! ```bash
//! # Debug only assignment decisions
//! RUST_LOG=split_engine::assignment=debug cargo test
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// JSON format (best for log aggregation)
    Json,
    /// Compact single-line format
    Compact,
}

/// Logging configuration for the engine host.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Directory for rolling log files (when file logging is enabled)
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Enable daily-rolling file output alongside stdout
    #[serde(default)]
    pub enable_file: bool,

    /// Filter for the file stream (e.g. "info")
    #[serde(default = "default_file_level")]
    pub file_level: String,

    /// Enable stdout logging (default: true)
    #[serde(default = "default_enable_stdout")]
    pub enable_stdout: bool,

    /// Format for stdout logging
    #[serde(default)]
    pub stdout_format: LogFormat,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_file_level() -> String {
    "info".to_string()
}

fn default_enable_stdout() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: default_log_dir(),
            enable_file: false,
            file_level: default_file_level(),
            enable_stdout: default_enable_stdout(),
            stdout_format: LogFormat::default(),
        }
    }
}

impl LogConfig {
    /// Development config: pretty stdout, no files.
    pub fn development() -> Self {
        Self::default()
    }

    /// Production config: JSON stdout plus daily-rolling files.
    pub fn production(log_dir: PathBuf) -> Self {
        Self {
            log_dir,
            enable_file: true,
            stdout_format: LogFormat::Json,
            ..Default::default()
        }
    }
}

/// Initialize logging based on configuration.
///
/// Returns the appender guards; keep them alive for the program's
/// lifetime or file logs are dropped on exit.
pub fn init_logging(
    config: &LogConfig,
    env_filter_override: Option<&str>,
) -> Result<Vec<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guards = Vec::new();

    let base_filter = if let Some(filter) = env_filter_override {
        EnvFilter::new(filter)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if config.enable_file {
        std::fs::create_dir_all(&config.log_dir)?;
        let appender =
            RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "experiments.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(false)
            .json()
            .with_filter(EnvFilter::new(&config.file_level));

        if config.enable_stdout {
            match config.stdout_format {
                LogFormat::Json => {
                    tracing_subscriber::registry()
                        .with(file_layer)
                        .with(fmt::layer().json().with_filter(base_filter))
                        .init();
                }
                LogFormat::Compact => {
                    tracing_subscriber::registry()
                        .with(file_layer)
                        .with(fmt::layer().compact().with_filter(base_filter))
                        .init();
                }
                LogFormat::Pretty => {
                    tracing_subscriber::registry()
                        .with(file_layer)
                        .with(fmt::layer().with_target(false).with_filter(base_filter))
                        .init();
                }
            }
        } else {
            tracing_subscriber::registry().with(file_layer).init();
        }
    } else {
        match config.stdout_format {
            LogFormat::Json => {
                tracing_subscriber::fmt()
                    .with_env_filter(base_filter)
                    .json()
                    .init();
            }
            LogFormat::Compact => {
                tracing_subscriber::fmt()
                    .with_env_filter(base_filter)
                    .compact()
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::fmt()
                    .with_env_filter(base_filter)
                    .with_target(false)
                    .init();
            }
        }
    }

    Ok(guards)
}

/// Log target constants for component-specific filtering.
///
/// ```ignore
/// tracing::debug!(target: targets::ASSIGNMENT, user_id = %uid, "assigned");
/// ```
pub mod targets {
    /// Bucketing and assignment decisions
    pub const ASSIGNMENT: &str = "split_engine::assignment";
    /// Event recording and dedupe
    pub const TRACKER: &str = "split_engine::tracker";
    /// Winner gating
    pub const DECISION: &str = "split_engine::decision";
    /// Create, status transitions, rollout
    pub const LIFECYCLE: &str = "split_engine::lifecycle";
    /// Persistence collaborator
    pub const STORE: &str = "split_engine::store";
}
