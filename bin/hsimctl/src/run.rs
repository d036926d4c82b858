//! ---
//! hsim_section: "06-cli"
//! hsim_subsection: "binary"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Scenario build-and-simulate subcommand."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::Args;
use hsim_build::{BuildCoordinator, BuildKey, BuildPipeline, BuildRequest, RecordStore};
use hsim_common::ident::SimulationId;
use hsim_config::{HarnessConfig, ScenarioConfig, ScenarioFile};
use hsim_sim::{SimulationJob, SimulationOrchestrator, Verdict};
use tracing::{error, info};

#[derive(Debug, Args)]
pub struct RunArgs {
    #[arg(long, value_name = "FILE", help = "Scenario YAML file to execute")]
    pub scenarios: PathBuf,

    #[arg(long, value_name = "NAME", help = "Run only the named scenario")]
    pub scenario: Option<String>,

    #[arg(
        long,
        value_name = "DIR",
        default_value = ".",
        help = "Source tree handed to the configure step"
    )]
    pub source_dir: PathBuf,
}

pub async fn run(args: RunArgs, config: &HarnessConfig) -> Result<()> {
    let mut file = ScenarioFile::load(&args.scenarios)?;
    file.retain_platform(&config.board);
    if let Some(only) = &args.scenario {
        if !file.scenarios.contains_key(only) {
            return Err(anyhow!(
                "scenario '{}' not found in {} (or not allowed on board {})",
                only,
                args.scenarios.display(),
                config.board
            ));
        }
        file.scenarios.retain(|name, _| name == only);
    }
    if file.scenarios.is_empty() {
        bail!(
            "no scenarios to run from {} on board {}",
            args.scenarios.display(),
            config.board
        );
    }

    let store = RecordStore::new(config.record_store_path.clone(), config.timeouts.lock);
    let coordinator = BuildCoordinator::new(
        store,
        config.timeouts.wait_poll,
        config.timeouts.build,
    );
    let orchestrator = SimulationOrchestrator::new(config.sim_bin_dir.clone());

    let file_stem = args
        .scenarios
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "scenarios".to_owned());

    let mut failed = Vec::new();
    let scenarios: Vec<(String, ScenarioConfig)> = file
        .scenarios
        .iter()
        .map(|(name, scenario)| (name.clone(), scenario.clone()))
        .collect();
    for (name, scenario) in scenarios {
        let verdict =
            run_scenario(&args, config, &coordinator, &orchestrator, &file_stem, &name, &scenario)
                .await?;
        match verdict {
            Verdict::Pass => info!(scenario = %name, "scenario passed"),
            Verdict::Fail => {
                error!(scenario = %name, "scenario failed");
                failed.push(name);
            }
        }
    }

    if !failed.is_empty() {
        bail!("{} scenario(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}

async fn run_scenario(
    args: &RunArgs,
    config: &HarnessConfig,
    coordinator: &BuildCoordinator,
    orchestrator: &SimulationOrchestrator,
    file_stem: &str,
    name: &str,
    scenario: &ScenarioConfig,
) -> Result<Verdict> {
    let sim_id = SimulationId::from_test_name(&format!("{}_{}", file_stem, name));
    let scenario_out_dir = config.output_dir.join(sim_id.as_str());

    let (configure_tool, compile_tool) = BuildPipeline::default_tools();
    let mut pipeline = BuildPipeline {
        source_dir: args.source_dir.clone(),
        build_dir: scenario_out_dir.join("build"),
        board: config.board.clone(),
        board_root: config.board_root.clone(),
        generator: config.generator.clone(),
        image_subpath: config.image_subpath.clone(),
        artifact_path: PathBuf::new(),
        extra_build_args: scenario.extra_args.clone(),
        tool_timeout: config.timeouts.build,
        configure_tool,
        compile_tool,
    };
    let conf_file = pipeline.ensure_conf_file();
    let key = BuildKey::derive(&config.board, &conf_file, name);
    pipeline.artifact_path = config.sim_bin_dir.join(key.as_str());

    let request = BuildRequest {
        key,
        artifact_path: pipeline.artifact_path.clone(),
        build_dir: pipeline.build_dir.clone(),
    };
    let build = pipeline.clone();
    let artifact = coordinator
        .acquire_or_build(&request, move || async move { build.build().await })
        .await?;

    let Some(sim) = &scenario.sim else {
        info!(scenario = %name, artifact = %artifact.display(), "build-only scenario complete");
        return Ok(Verdict::Pass);
    };

    let job = SimulationJob::from_scenario(
        sim_id,
        sim,
        artifact,
        scenario_out_dir.join("sim_out"),
    );
    let report = orchestrator.run(&job).await?;
    for participant in &report.participants {
        if participant.exit_code != 0 {
            error!(
                scenario = %name,
                participant = %participant.participant,
                exit_code = participant.exit_code,
                stdout_log = %participant.stdout_log.display(),
                stderr_log = %participant
                    .stderr_log
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                "participant failed, see logs"
            );
        }
    }
    Ok(report.verdict)
}
