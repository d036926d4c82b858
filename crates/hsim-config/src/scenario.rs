//! ---
//! hsim_section: "02-scenario-configuration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Typed scenario schema and schema-validating loader."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use thiserror::Error;
use tracing::debug;

use crate::merge::merge_values;

/// Result alias for scenario loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors surfaced by the scenario loader and validator.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The scenario file could not be read.
    #[error("unable to read scenario file {path}: {source}")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The scenario file is not valid YAML or does not match the schema.
    #[error("failed to parse scenario file {path}: {source}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
    /// A scenario violates a structural invariant of the schema.
    #[error("invalid scenario '{scenario}' in {path}: {reason}")]
    Validation {
        /// File holding the scenario.
        path: PathBuf,
        /// Name of the offending scenario.
        scenario: String,
        /// Human-readable description of the violation.
        reason: String,
    },
}

/// One device participating in a simulation scenario.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeviceConfig {
    /// Extra arguments appended to the device command line.
    #[serde(default)]
    pub extra_run_args: Vec<String>,
}

/// The shared-transport process of a simulation scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MediumConfig {
    /// Executable name of the medium simulator.
    pub name: String,
    /// Simulated duration in engineering notation (e.g. `60e6` microseconds).
    pub sim_length: String,
    /// Extra arguments appended to the medium command line.
    #[serde(default)]
    pub extra_run_args: Vec<String>,
}

/// Simulation topology of one scenario.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SimConfig {
    /// Devices keyed by identity token, in declaration order.
    #[serde(default)]
    pub devices: IndexMap<String, DeviceConfig>,
    /// The medium connecting the devices.
    pub medium: MediumConfig,
}

/// One named scenario after the common fragment has been folded in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScenarioConfig {
    /// Simulation topology. Build-only scenarios omit it.
    #[serde(default)]
    pub sim: Option<SimConfig>,
    /// Extra build arguments (e.g. a `-DCONF_FILE=` override).
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Restricts the scenario to a single board identity.
    #[serde(default)]
    pub platform_allow: Option<String>,
    /// Free-form tag string.
    #[serde(default)]
    pub tags: Option<String>,
}

/// A parsed, merged and validated scenario file.
#[derive(Debug, Clone)]
pub struct ScenarioFile {
    /// Path the file was loaded from.
    pub path: PathBuf,
    /// Scenarios in declaration order, common fragment already applied.
    pub scenarios: IndexMap<String, ScenarioConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScenarioFile {
    #[serde(default)]
    common: Option<Value>,
    tests: IndexMap<String, Value>,
}

impl ScenarioFile {
    /// Load a scenario YAML file, merge its `common` fragment into every
    /// scenario and validate the result against the typed schema.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let raw: RawScenarioFile =
            serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;

        let common = raw.common.unwrap_or(Value::Mapping(Default::default()));
        let mut scenarios = IndexMap::with_capacity(raw.tests.len());
        for (name, value) in raw.tests {
            let merged = merge_values(&common, &value);
            let config: ScenarioConfig =
                serde_yaml::from_value(merged).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?;
            validate(&path, &name, &config)?;
            scenarios.insert(name, config);
        }

        debug!(path = %path.display(), scenarios = scenarios.len(), "scenario file loaded");
        Ok(Self { path, scenarios })
    }

    /// Drop scenarios whose `platform_allow` names a different board. Called
    /// before any scenario is handed to the orchestrator.
    pub fn retain_platform(&mut self, board: &str) {
        self.scenarios.retain(|name, config| {
            let keep = config
                .platform_allow
                .as_deref()
                .map_or(true, |allow| allow == board);
            if !keep {
                debug!(scenario = %name, board, "skipping scenario, platform not allowed");
            }
            keep
        });
    }
}

fn validate(path: &Path, name: &str, config: &ScenarioConfig) -> Result<()> {
    let fail = |reason: String| {
        Err(ConfigError::Validation {
            path: path.to_path_buf(),
            scenario: name.to_owned(),
            reason,
        })
    };
    if let Some(sim) = &config.sim {
        if sim.devices.is_empty() {
            return fail("sim section must declare at least one device".to_owned());
        }
        // The medium logs under the fixed participant name "medium"; a device
        // with the same id would share its log files.
        if sim.devices.contains_key("medium") {
            return fail("device id 'medium' is reserved for the medium participant".to_owned());
        }
        if sim.medium.name.trim().is_empty() {
            return fail("medium name must not be empty".to_owned());
        }
        if sim.medium.sim_length.trim().is_empty() {
            return fail("medium sim_length must not be empty".to_owned());
        }
    }
    Ok(())
}
