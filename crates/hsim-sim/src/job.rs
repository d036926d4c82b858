//! ---
//! hsim_section: "05-simulation-orchestration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Simulation job model and per-participant results."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::path::PathBuf;

use hsim_common::ident::SimulationId;
use hsim_config::scenario::SimConfig;

/// One simulated device participating in a run. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Identity token handed to the simulator as `-testid=`.
    pub id: String,
    /// Stable zero-based index within the scenario, handed as `-d=`.
    pub index: usize,
    /// Extra arguments appended after the positional parameters.
    pub extra_args: Vec<String>,
}

/// The shared-transport process of a run. One per scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Medium {
    /// Executable name of the medium simulator, resolved inside the
    /// simulator bin directory.
    pub name: String,
    /// Simulated duration in engineering notation, handed as `-sim_length=`.
    pub sim_length: String,
    /// Extra arguments appended after the positional parameters.
    pub extra_args: Vec<String>,
}

/// A single-shot simulation run: devices, medium and where the logs go.
#[derive(Debug, Clone)]
pub struct SimulationJob {
    /// Token shared by every participant's command line.
    pub sim_id: SimulationId,
    /// Executable all device participants run (the built scenario image).
    pub device_exe: PathBuf,
    /// Devices in scenario declaration order.
    pub devices: Vec<Device>,
    /// The medium connecting the devices.
    pub medium: Medium,
    /// Directory receiving the per-participant logs.
    pub output_dir: PathBuf,
}

impl SimulationJob {
    /// Build a job from a scenario's typed `sim` section. Device indices
    /// follow the declaration order of the scenario file.
    pub fn from_scenario(
        sim_id: SimulationId,
        sim: &SimConfig,
        device_exe: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        let devices = sim
            .devices
            .iter()
            .enumerate()
            .map(|(index, (id, config))| Device {
                id: id.clone(),
                index,
                extra_args: config.extra_run_args.clone(),
            })
            .collect();
        Self {
            sim_id,
            device_exe,
            devices,
            medium: Medium {
                name: sim.medium.name.clone(),
                sim_length: sim.medium.sim_length.clone(),
                extra_args: sim.medium.extra_run_args.clone(),
            },
            output_dir,
        }
    }

    /// Number of pool slots the job needs: one per device plus the medium.
    pub fn required_slots(&self) -> usize {
        self.devices.len() + 1
    }
}

/// Exit code and log locations for one participant.
#[derive(Debug, Clone)]
pub struct ParticipantResult {
    /// Device identity token, or `medium`.
    pub participant: String,
    /// Exit code of the participant process.
    pub exit_code: i32,
    /// Captured stdout log.
    pub stdout_log: PathBuf,
    /// Captured stderr log, when stderr was non-empty.
    pub stderr_log: Option<PathBuf>,
}

/// Aggregated outcome of one simulation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Every participant exited cleanly.
    Pass,
    /// At least one participant exited nonzero.
    Fail,
}

/// Per-participant results plus the aggregated verdict.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Aggregated pass/fail outcome.
    pub verdict: Verdict,
    /// Results in launch order: devices first, medium last.
    pub participants: Vec<ParticipantResult>,
}

impl SimulationReport {
    /// Fold participant exit codes into the aggregate verdict.
    pub fn from_participants(participants: Vec<ParticipantResult>) -> Self {
        let verdict = if participants.iter().all(|p| p.exit_code == 0) {
            Verdict::Pass
        } else {
            Verdict::Fail
        };
        Self {
            verdict,
            participants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hsim_config::scenario::{DeviceConfig, MediumConfig};

    fn sim_config() -> SimConfig {
        let mut devices = indexmap::IndexMap::new();
        devices.insert("central".to_owned(), DeviceConfig::default());
        devices.insert(
            "peripheral".to_owned(),
            DeviceConfig {
                extra_run_args: vec!["-rs=23".to_owned()],
            },
        );
        SimConfig {
            devices,
            medium: MediumConfig {
                name: "bs_2G4_phy_v1".to_owned(),
                sim_length: "60e6".to_owned(),
                extra_run_args: Vec::new(),
            },
        }
    }

    #[test]
    fn job_indices_follow_declaration_order() {
        let job = SimulationJob::from_scenario(
            SimulationId::from_test_name("s1"),
            &sim_config(),
            PathBuf::from("/bin/image"),
            PathBuf::from("/tmp/out"),
        );
        assert_eq!(job.devices[0].id, "central");
        assert_eq!(job.devices[0].index, 0);
        assert_eq!(job.devices[1].id, "peripheral");
        assert_eq!(job.devices[1].index, 1);
        assert_eq!(job.required_slots(), 3);
    }

    #[test]
    fn verdict_fails_on_any_nonzero_exit() {
        let result = |code| ParticipantResult {
            participant: "p".to_owned(),
            exit_code: code,
            stdout_log: PathBuf::from("p_out.log"),
            stderr_log: None,
        };
        let pass = SimulationReport::from_participants(vec![result(0), result(0)]);
        assert_eq!(pass.verdict, Verdict::Pass);
        let fail = SimulationReport::from_participants(vec![result(0), result(7)]);
        assert_eq!(fail.verdict, Verdict::Fail);
    }
}
