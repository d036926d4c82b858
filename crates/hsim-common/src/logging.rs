//! ---
//! hsim_section: "01-core-functionality"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Tracing subscriber bootstrap for harness binaries."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::info;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

const LOG_ENV: &str = "HSIM_LOG";

static FILE_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();
static STDOUT_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

/// Available log formats for harness binaries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    /// Line-oriented JSON suitable for CI log collectors.
    StructuredJson,
    /// Human-readable output for interactive runs.
    #[default]
    Pretty,
}

/// Logging destination and format settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Directory receiving the rolling daily log file.
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Output format for the stdout layer.
    #[serde(default)]
    pub format: LogFormat,
    /// Optional override for the log file name prefix.
    #[serde(default)]
    pub file_prefix: Option<String>,
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: LogFormat::default(),
            file_prefix: None,
        }
    }
}

/// Initialize the tracing subscriber based on configuration and environment.
///
/// * `HSIM_LOG` overrides the log filter (e.g. `info`, `debug,hsim_build=trace`).
///   When unset the standard `RUST_LOG` variable is honoured, finally
///   defaulting to `info`.
/// * The stdout layer uses the configured format while a rolling daily JSON
///   file is always kept for post-mortem analysis of CI sessions.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config
        .file_prefix
        .clone()
        .unwrap_or_else(|| service_name.to_owned());

    let file_appender = daily(&config.directory, format!("{}.log", prefix));
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let _ = FILE_GUARD.set(file_guard);
    let _ = STDOUT_GUARD.set(stdout_guard);

    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!(
                "invalid {} directive ({}); defaulting to info logging",
                LOG_ENV, err
            );
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let fmt_layer = match config.format {
        LogFormat::StructuredJson => fmt::layer()
            .with_target(false)
            .json()
            .with_writer(stdout_writer)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_writer(stdout_writer)
            .boxed(),
    };

    let file_layer = fmt::layer()
        .with_target(true)
        .json()
        .with_writer(file_writer)
        .boxed();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .with(file_layer)
        .try_init()
        .ok();

    info!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let config = LoggingConfig {
            directory: std::env::temp_dir().join("hsim-logging-test"),
            ..LoggingConfig::default()
        };
        init_tracing("hsim-test", &config).expect("first init succeeds");
        init_tracing("hsim-test", &config).expect("second init is a no-op");
    }
}
