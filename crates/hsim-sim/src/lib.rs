//! ---
//! hsim_section: "05-simulation-orchestration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Simulation run orchestration and verdict aggregation."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Runs one multi-process simulation: one process per simulated device plus
//! one medium process modeling the shared transport. All participants must be
//! alive concurrently to talk over the simulated channel, so the
//! [`orchestrator::SimulationOrchestrator`] launches every participant at
//! once, joins them all, and only then folds the exit codes into a single
//! verdict. Nothing is cancelled on first failure; every participant's logs
//! are always available for diagnosis.

use thiserror::Error;

pub mod job;
pub mod orchestrator;

pub use job::{Device, Medium, ParticipantResult, SimulationJob, SimulationReport, Verdict};
pub use orchestrator::SimulationOrchestrator;

/// Result alias used throughout the simulation crate.
pub type Result<T> = std::result::Result<T, SimError>;

/// Error type for simulation orchestration.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configured pool cannot hold every participant at once. Running
    /// with fewer slots than participants would deadlock the simulated
    /// medium, so this is rejected up front.
    #[error("process pool of {slots} slot(s) cannot hold {required} simulation participants")]
    PoolUndersized {
        /// Configured slot count.
        slots: usize,
        /// Required slot count (device count + medium).
        required: usize,
    },
    /// A participant process could not be launched or awaited.
    #[error("participant '{participant}' failed to run: {source}")]
    Launch {
        /// Participant that failed to start.
        participant: String,
        /// Underlying process error.
        source: hsim_process::ProcessError,
    },
    /// Filesystem bookkeeping around the output directory failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
}
