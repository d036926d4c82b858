//! ---
//! hsim_section: "06-cli"
//! hsim_subsection: "binary"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Session lifecycle subcommands for the record store."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use anyhow::Result;
use clap::Subcommand;
use hsim_build::RecordStore;
use hsim_config::HarnessConfig;
use tracing::info;

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    #[command(about = "Reset the shared build-record store for a new session")]
    Init,
    #[command(about = "Remove the stale record-store lock after a session")]
    Teardown,
}

/// The session coordinator resets the store once before workers start and
/// clears the lock file once after they finish; individual workers never do
/// either.
pub fn run(command: SessionCommand, config: &HarnessConfig) -> Result<()> {
    let store = RecordStore::new(config.record_store_path.clone(), config.timeouts.lock);
    match command {
        SessionCommand::Init => {
            store.reset()?;
            info!(store = %store.path().display(), "session record store initialised");
        }
        SessionCommand::Teardown => {
            store.remove_stale_lock()?;
            info!(lock = %store.lock_path().display(), "session lock removed");
        }
    }
    Ok(())
}
