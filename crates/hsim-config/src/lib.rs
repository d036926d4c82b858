//! ---
//! hsim_section: "02-scenario-configuration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Harness and scenario configuration for hsim."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Configuration layer of the harness.
//!
//! Two kinds of configuration live here: the [`HarnessConfig`] TOML describing
//! the environment the harness runs in (board, tool generator, directories,
//! timeouts), and the YAML scenario files describing what to simulate. A
//! scenario file may carry a `common` fragment whose settings are folded into
//! every scenario by the [`merge`] module before the typed schema is applied.

pub mod harness;
pub mod merge;
pub mod scenario;

pub use harness::{HarnessConfig, TimeoutConfig};
pub use merge::merge_values;
pub use scenario::{
    ConfigError, DeviceConfig, MediumConfig, ScenarioConfig, ScenarioFile, SimConfig,
};
