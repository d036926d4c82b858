//! ---
//! hsim_section: "06-cli"
//! hsim_subsection: "binary"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Control CLI for the hsim test harness."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use hsim_common::logging::init_tracing;
use hsim_config::HarnessConfig;

mod run;
mod session;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "hsim harness control utility",
    long_about = None
)]
struct Cli {
    #[arg(
        long,
        value_name = "FILE",
        help = "Path to harness configuration file (overrides HSIM_CONFIG)"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(subcommand, about = "Session lifecycle actions for the shared record store")]
    Session(session::SessionCommand),
    #[command(about = "Build and run the scenarios of a scenario file")]
    Run(run::RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)?,
        None => HarnessConfig::load(&[
            PathBuf::from("hsim.toml"),
            PathBuf::from("configs/hsim.toml"),
        ])?,
    };
    init_tracing("hsimctl", &config.logging)?;

    match cli.command {
        Commands::Session(cmd) => session::run(cmd, &config)?,
        Commands::Run(args) => run::run(args, &config).await?,
    }
    Ok(())
}
