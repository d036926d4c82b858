//! ---
//! hsim_section: "02-scenario-configuration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Harness-level environment configuration."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use hsim_common::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

fn default_board() -> String {
    "nrf52_bsim".to_owned()
}

fn default_generator() -> String {
    "Ninja".to_owned()
}

fn default_image_subpath() -> PathBuf {
    PathBuf::from("zephyr/zephyr.exe")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("target/sim-out")
}

fn default_record_store_path() -> PathBuf {
    PathBuf::from("target/hsim-session/builds.json")
}

fn default_build_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_lock_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_wait_poll() -> Duration {
    Duration::from_secs(1)
}

/// Primary configuration object for the harness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Board identity handed to the configure step and used for platform
    /// filtering of scenarios.
    #[serde(default = "default_board")]
    pub board: String,
    /// Root directory holding board support files.
    pub board_root: PathBuf,
    /// Build-system generator passed to the configure step.
    #[serde(default = "default_generator")]
    pub generator: String,
    /// Path of the produced image inside a build directory.
    #[serde(default = "default_image_subpath")]
    pub image_subpath: PathBuf,
    /// Directory holding simulator binaries. Built images are copied here and
    /// every participant runs with this directory as its working directory.
    pub sim_bin_dir: PathBuf,
    /// Directory receiving per-scenario build trees and participant logs.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Shared build-record store, one file per test session.
    #[serde(default = "default_record_store_path")]
    pub record_store_path: PathBuf,
    /// Logging destination and format.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeouts governing build coordination.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Timeouts applied by the build coordinator and tool invocations.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Bound on one configure or compile invocation and on the overall wait
    /// for a concurrent builder.
    #[serde(default = "default_build_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub build: Duration,
    /// Bound on acquiring the record-store lock.
    #[serde(default = "default_lock_timeout")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub lock: Duration,
    /// Interval between polls while another worker holds a build in progress.
    #[serde(default = "default_wait_poll")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub wait_poll: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            build: default_build_timeout(),
            lock: default_lock_timeout(),
            wait_poll: default_wait_poll(),
        }
    }
}

impl HarnessConfig {
    /// Environment variable overriding the configuration file path.
    pub const ENV_CONFIG_PATH: &'static str = "HSIM_CONFIG";

    /// Load configuration from an explicit file path. The `HSIM_CONFIG`
    /// override is not consulted; a path the caller was handed directly
    /// always wins over the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_path(path.as_ref().to_path_buf())
    }

    /// Load configuration from disk, respecting the `HSIM_CONFIG` override
    /// before falling back to the candidate paths in order.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading harness configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<HarnessConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.board.trim().is_empty() {
            return Err(anyhow!("board must not be empty"));
        }
        if self.generator.trim().is_empty() {
            return Err(anyhow!("generator must not be empty"));
        }
        for (name, value) in [
            ("build", self.timeouts.build),
            ("lock", self.timeouts.lock),
            ("wait_poll", self.timeouts.wait_poll),
        ] {
            if value.is_zero() {
                return Err(anyhow!("timeout '{}' must be positive", name));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for HarnessConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: HarnessConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}
