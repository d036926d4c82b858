//! ---
//! hsim_section: "04-build-coordination"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "At-most-one-build coordination across workers."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::store::{BuildRecord, BuildStatus, RecordStore};
use crate::{BuildError, BuildKey, Result};

/// One build request: the dedup key plus the paths the decision needs.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// Deduplication key for the artifact.
    pub key: BuildKey,
    /// Shared path the artifact will live at once built.
    pub artifact_path: PathBuf,
    /// Worker-local build directory; receives the reuse note when another
    /// worker's artifact is adopted.
    pub build_dir: PathBuf,
}

enum Decision {
    Build,
    Wait,
    Reuse(PathBuf),
}

/// Decides, per build key, whether this worker performs the build or adopts
/// the one produced by a concurrent worker.
///
/// All state transitions happen inside the record store's critical section,
/// so for N concurrent requests on one key exactly one worker observes
/// `Unknown` and claims the build; the rest wait on `InProgress` and finish
/// by reusing the recorded artifact path.
#[derive(Debug, Clone)]
pub struct BuildCoordinator {
    store: RecordStore,
    wait_poll: Duration,
    wait_timeout: Duration,
}

impl BuildCoordinator {
    /// Create a coordinator over the given store. `wait_poll` is the interval
    /// between checks while another worker builds; `wait_timeout` bounds the
    /// total wait.
    pub fn new(store: RecordStore, wait_poll: Duration, wait_timeout: Duration) -> Self {
        Self {
            store,
            wait_poll,
            wait_timeout,
        }
    }

    /// Return the artifact path for `request.key`, running `build_fn` if and
    /// only if this worker wins the claim.
    ///
    /// If `build_fn` fails (or the finish transition cannot be written), the
    /// record is rolled back to absent before the error propagates, so that
    /// concurrent waiters are unblocked and one of them may claim the key
    /// instead of deadlocking on a permanently `InProgress` record.
    pub async fn acquire_or_build<F, Fut>(&self, request: &BuildRequest, build_fn: F) -> Result<PathBuf>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<PathBuf>>,
    {
        let deadline = Instant::now() + self.wait_timeout;
        loop {
            let decision = self.claim(request).await?;
            match decision {
                Decision::Build => break,
                Decision::Reuse(artifact) => {
                    info!(key = %request.key, artifact = %artifact.display(), "reusing existing build");
                    self.write_reuse_note(request, &artifact)?;
                    return Ok(artifact);
                }
                Decision::Wait => {
                    if Instant::now() >= deadline {
                        warn!(key = %request.key, "wait for concurrent build timed out");
                        return Err(BuildError::WaitTimeout {
                            key: request.key.clone(),
                            waited_secs: self.wait_timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(self.wait_poll).await;
                }
            }
        }

        info!(key = %request.key, "claimed build");
        match build_fn().await {
            Ok(artifact) => match self.finish(&request.key, &artifact).await {
                Ok(()) => Ok(artifact),
                Err(err) => {
                    self.rollback(&request.key).await;
                    Err(err)
                }
            },
            Err(err) => {
                self.rollback(&request.key).await;
                Err(err)
            }
        }
    }

    async fn claim(&self, request: &BuildRequest) -> Result<Decision> {
        let key = request.key.clone();
        let artifact_path = request.artifact_path.clone();
        let decision = self
            .store
            .with_lock(move |records| match records.get(&key).map(|r| r.status) {
                None | Some(BuildStatus::Unknown) => {
                    records.insert(
                        key,
                        BuildRecord {
                            status: BuildStatus::InProgress,
                            artifact_path,
                        },
                    );
                    Decision::Build
                }
                Some(BuildStatus::InProgress) => Decision::Wait,
                Some(BuildStatus::Finished) => match records.get(&key).cloned() {
                    Some(record) => Decision::Reuse(record.artifact_path),
                    None => Decision::Wait,
                },
            })
            .await?;
        Ok(decision)
    }

    async fn finish(&self, key: &BuildKey, artifact: &Path) -> Result<()> {
        let key = key.clone();
        let artifact = artifact.to_path_buf();
        self.store
            .with_lock(move |records| {
                records.insert(
                    key,
                    BuildRecord {
                        status: BuildStatus::Finished,
                        artifact_path: artifact,
                    },
                );
            })
            .await?;
        Ok(())
    }

    /// Roll a failed claim back to absent (`Unknown`). Failures here are only
    /// logged: the original build error is the one worth surfacing.
    async fn rollback(&self, key: &BuildKey) {
        let owned = key.clone();
        let result = self
            .store
            .with_lock(move |records| {
                records.shift_remove(&owned);
            })
            .await;
        match result {
            Ok(()) => warn!(key = %key, "build failed, record rolled back"),
            Err(err) => warn!(key = %key, error = %err, "build failed and rollback also failed"),
        }
    }

    fn write_reuse_note(&self, request: &BuildRequest, artifact: &Path) -> Result<()> {
        let note = format!("Used already existing build from:\n{}\n", artifact.display());
        let io_err = |source| BuildError::Io {
            context: format!("writing reuse note in {}", request.build_dir.display()),
            source,
        };
        std::fs::create_dir_all(&request.build_dir).map_err(io_err)?;
        std::fs::write(request.build_dir.join("build.log"), note).map_err(io_err)?;
        Ok(())
    }
}
