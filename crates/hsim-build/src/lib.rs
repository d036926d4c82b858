//! ---
//! hsim_section: "04-build-coordination"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Build deduplication across concurrent test workers."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
#![warn(missing_docs)]

//! Build coordination for the harness.
//!
//! Multiple independent test-worker processes may request the same simulator
//! image at the same time. The [`coordinator::BuildCoordinator`] guarantees
//! that exactly one of them runs the configure/compile pipeline for a given
//! [`key::BuildKey`] per session while the others wait for, or reuse, the
//! produced artifact. The shared state lives in a [`store::RecordStore`], a
//! single JSON file guarded by an advisory inter-process lock.

use std::path::PathBuf;

use thiserror::Error;

pub mod coordinator;
pub mod key;
pub mod pipeline;
pub mod store;

pub use coordinator::{BuildCoordinator, BuildRequest};
pub use key::BuildKey;
pub use pipeline::BuildPipeline;
pub use store::{BuildRecord, BuildStatus, RecordStore, StoreError};

/// Result alias used throughout the build crate.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Error type for build coordination and the tool pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Record-store access failed (including lock-acquisition timeouts).
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Another worker's build did not finish within the overall wait bound.
    #[error("timed out after {waited_secs}s waiting for concurrent build of '{key}'")]
    WaitTimeout {
        /// Key that was being waited on.
        key: BuildKey,
        /// How long the coordinator waited.
        waited_secs: u64,
    },
    /// A build-tool invocation exited nonzero.
    #[error("{stage} failed with exit code {exit_code}, logs at {}", stdout_log.display())]
    Tool {
        /// Failing stage (`cmake` or `ninja`).
        stage: &'static str,
        /// Exit code reported by the tool.
        exit_code: i32,
        /// Captured stdout log.
        stdout_log: PathBuf,
        /// Captured stderr log, when stderr was non-empty.
        stderr_log: Option<PathBuf>,
    },
    /// Relocating the produced image to the shared artifact path failed.
    #[error("failed to copy artifact {} -> {}: {source}", src.display(), dst.display())]
    ArtifactCopy {
        /// Image produced by the build.
        src: PathBuf,
        /// Shared artifact destination.
        dst: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// Spawning or awaiting a build tool failed (including tool timeouts).
    #[error(transparent)]
    Process(#[from] hsim_process::ProcessError),
    /// Filesystem bookkeeping around the build directory failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying OS error.
        source: std::io::Error,
    },
}
