//! ---
//! hsim_section: "05-simulation-orchestration"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Concurrent participant launch and join barrier."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fs;
use std::path::PathBuf;

use futures::future::join_all;
use hsim_process::ProcessSpec;
use tracing::{info, warn};

use crate::job::{Device, ParticipantResult, SimulationJob, SimulationReport, Verdict};
use crate::{Result, SimError};

/// Name used for the medium participant's log files.
const MEDIUM_PARTICIPANT: &str = "medium";

/// Launches every participant of a [`SimulationJob`] concurrently and folds
/// their exit codes into one verdict.
///
/// The pool holds exactly `devices + 1` slots by default. Undersizing it
/// would deadlock: the medium blocks until every declared device connects, so
/// all participants must run simultaneously. A smaller explicit override is
/// therefore rejected as a configuration error rather than tolerated.
#[derive(Debug, Clone)]
pub struct SimulationOrchestrator {
    sim_bin_dir: PathBuf,
    pool_slots: Option<usize>,
}

impl SimulationOrchestrator {
    /// Create an orchestrator running participants out of `sim_bin_dir`.
    pub fn new(sim_bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            sim_bin_dir: sim_bin_dir.into(),
            pool_slots: None,
        }
    }

    /// Override the pool size. Only useful to reserve extra headroom; a value
    /// below the job's participant count fails the run.
    pub fn with_pool_slots(mut self, slots: usize) -> Self {
        self.pool_slots = Some(slots);
        self
    }

    /// Effective pool size for a job.
    pub fn pool_slots(&self, job: &SimulationJob) -> usize {
        self.pool_slots.unwrap_or_else(|| job.required_slots())
    }

    /// Full command line for one device participant, executable first:
    /// `[exe, -s=<sim_id>, -d=<index>, -testid=<id>, extra...]`.
    pub fn device_command(&self, job: &SimulationJob, device: &Device) -> Vec<String> {
        let mut command = vec![
            job.device_exe.display().to_string(),
            format!("-s={}", job.sim_id),
            format!("-d={}", device.index),
            format!("-testid={}", device.id),
        ];
        command.extend(device.extra_args.iter().cloned());
        command
    }

    /// Full command line for the medium participant, executable first:
    /// `[exe, -s=<sim_id>, -D=<device_count>, -sim_length=<len>, extra...]`.
    pub fn medium_command(&self, job: &SimulationJob) -> Vec<String> {
        let mut command = vec![
            self.sim_bin_dir.join(&job.medium.name).display().to_string(),
            format!("-s={}", job.sim_id),
            format!("-D={}", job.devices.len()),
            format!("-sim_length={}", job.medium.sim_length),
        ];
        command.extend(job.medium.extra_args.iter().cloned());
        command
    }

    /// Run the job to completion and aggregate the verdict.
    ///
    /// Every participant is launched before any is awaited; the join barrier
    /// waits for all of them regardless of individual outcomes. Participants
    /// have no timeout at this layer: the simulator executables terminate on
    /// their own once the simulated duration elapses, and a genuine hang is a
    /// CI-level timeout concern.
    pub async fn run(&self, job: &SimulationJob) -> Result<SimulationReport> {
        let required = job.required_slots();
        let slots = self.pool_slots(job);
        if slots < required {
            return Err(SimError::PoolUndersized { slots, required });
        }

        self.prepare_output_dir(job)?;

        let mut launches = Vec::with_capacity(required);
        for device in &job.devices {
            launches.push((device.id.clone(), self.device_command(job, device)));
        }
        launches.push((MEDIUM_PARTICIPANT.to_owned(), self.medium_command(job)));

        for (participant, command) in &launches {
            info!(sim_id = %job.sim_id, participant = %participant, command = %command.join(" "), "simulation participant command");
        }

        let tasks: Vec<_> = launches
            .into_iter()
            .map(|(participant, command)| {
                let spec = self.participant_spec(job, &participant, command);
                tokio::spawn(async move {
                    let outcome = hsim_process::run(&spec).await;
                    (participant, outcome)
                })
            })
            .collect();

        let mut participants = Vec::with_capacity(required);
        for joined in join_all(tasks).await {
            let (participant, outcome) = joined.map_err(|err| SimError::Io {
                context: "joining participant task".to_owned(),
                source: std::io::Error::other(err),
            })?;
            let outcome = outcome.map_err(|source| SimError::Launch {
                participant: participant.clone(),
                source,
            })?;
            if outcome.exit_code != 0 {
                warn!(
                    sim_id = %job.sim_id,
                    participant = %participant,
                    exit_code = outcome.exit_code,
                    stdout_log = %outcome.stdout_log.display(),
                    "participant exited nonzero"
                );
            }
            participants.push(ParticipantResult {
                participant,
                exit_code: outcome.exit_code,
                stdout_log: outcome.stdout_log,
                stderr_log: outcome.stderr_log,
            });
        }

        let report = SimulationReport::from_participants(participants);
        match report.verdict {
            Verdict::Pass => info!(sim_id = %job.sim_id, "simulation passed"),
            Verdict::Fail => warn!(sim_id = %job.sim_id, "simulation failed"),
        }
        Ok(report)
    }

    fn participant_spec(
        &self,
        job: &SimulationJob,
        participant: &str,
        command: Vec<String>,
    ) -> ProcessSpec {
        let mut parts = command.into_iter();
        let program = PathBuf::from(parts.next().unwrap_or_default());
        ProcessSpec {
            program,
            args: parts.collect(),
            current_dir: self.sim_bin_dir.clone(),
            log_base: job.output_dir.join(participant),
            timeout: None,
        }
    }

    fn prepare_output_dir(&self, job: &SimulationJob) -> Result<()> {
        let io_err = |source| SimError::Io {
            context: format!("preparing output dir {}", job.output_dir.display()),
            source,
        };
        match fs::remove_dir_all(&job.output_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(io_err(source)),
        }
        fs::create_dir_all(&job.output_dir).map_err(io_err)
    }
}
