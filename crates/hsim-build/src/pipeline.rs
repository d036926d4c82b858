//! ---
//! hsim_section: "04-build-coordination"
//! hsim_subsection: "module"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "Configure/compile pipeline producing simulator images."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hsim_process::{ProcessSpec, RunOutcome};
use tracing::info;

use crate::{BuildError, Result};

/// The caller-supplied build pipeline handed to the coordinator: clean the
/// worker-local build directory, run the configure tool, run the compile
/// tool, then relocate the produced image to the shared artifact path.
///
/// Tool executables are fields rather than constants so tests can substitute
/// stand-ins; production callers leave the defaults (`cmake` / `ninja`,
/// resolved via `PATH`).
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    /// Scenario source tree handed to the configure step.
    pub source_dir: PathBuf,
    /// Worker-local build directory, recreated on every build.
    pub build_dir: PathBuf,
    /// Board identity passed as `-DBOARD=`.
    pub board: String,
    /// Board support root passed as `-DBOARD_ROOT=`.
    pub board_root: PathBuf,
    /// Generator passed as `-G`.
    pub generator: String,
    /// Path of the produced image relative to the build directory.
    pub image_subpath: PathBuf,
    /// Shared destination the image is copied to.
    pub artifact_path: PathBuf,
    /// Scenario-specific extra configure arguments.
    pub extra_build_args: Vec<String>,
    /// Wall-clock bound for each tool invocation.
    pub tool_timeout: Duration,
    /// Configure tool executable.
    pub configure_tool: PathBuf,
    /// Compile tool executable.
    pub compile_tool: PathBuf,
}

impl BuildPipeline {
    /// Configuration file used when the scenario does not override one.
    pub const DEFAULT_CONF_FILE: &'static str = "prj.conf";

    const CONF_FILE_OPTION: &'static str = "-DCONF_FILE=";

    /// Default tool pair.
    pub fn default_tools() -> (PathBuf, PathBuf) {
        (PathBuf::from("cmake"), PathBuf::from("ninja"))
    }

    /// Extract the configuration file name from the extra build arguments,
    /// appending the `-DCONF_FILE=prj.conf` default when no override is
    /// present. The returned name feeds the build key.
    pub fn ensure_conf_file(&mut self) -> String {
        for arg in &self.extra_build_args {
            if let Some(value) = arg.strip_prefix(Self::CONF_FILE_OPTION) {
                return value.to_owned();
            }
        }
        self.extra_build_args
            .push(format!("{}{}", Self::CONF_FILE_OPTION, Self::DEFAULT_CONF_FILE));
        Self::DEFAULT_CONF_FILE.to_owned()
    }

    /// Run the full pipeline and return the shared artifact path.
    pub async fn build(&self) -> Result<PathBuf> {
        self.clean_build_dir()?;
        self.run_tool("cmake", &self.configure_tool, self.configure_args())
            .await?;
        self.run_tool("ninja", &self.compile_tool, self.compile_args())
            .await?;
        self.relocate_image()?;
        Ok(self.artifact_path.clone())
    }

    fn configure_args(&self) -> Vec<String> {
        let mut args = vec![
            format!("-B{}", self.build_dir.display()),
            format!("-S{}", self.source_dir.display()),
            format!("-G{}", self.generator),
            format!("-DBOARD_ROOT={}", self.board_root.display()),
            format!("-DBOARD={}", self.board),
        ];
        args.extend(self.extra_build_args.iter().cloned());
        args
    }

    fn compile_args(&self) -> Vec<String> {
        vec![format!("-C{}", self.build_dir.display())]
    }

    fn clean_build_dir(&self) -> Result<()> {
        let io_err = |context: String| {
            move |source| BuildError::Io {
                context,
                source,
            }
        };
        match fs::remove_dir_all(&self.build_dir) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(BuildError::Io {
                    context: format!("cleaning build dir {}", self.build_dir.display()),
                    source,
                })
            }
        }
        fs::create_dir_all(&self.build_dir).map_err(io_err(format!(
            "creating build dir {}",
            self.build_dir.display()
        )))?;
        Ok(())
    }

    async fn run_tool(&self, stage: &'static str, tool: &Path, args: Vec<String>) -> Result<RunOutcome> {
        let spec = ProcessSpec {
            program: tool.to_path_buf(),
            args,
            current_dir: self.source_dir.clone(),
            log_base: self.build_dir.join(stage),
            timeout: Some(self.tool_timeout),
        };
        info!(stage, command = %spec.command_line(), "running build tool");
        let outcome = hsim_process::run(&spec).await?;
        if !outcome.success() {
            return Err(BuildError::Tool {
                stage,
                exit_code: outcome.exit_code,
                stdout_log: outcome.stdout_log,
                stderr_log: outcome.stderr_log,
            });
        }
        Ok(outcome)
    }

    fn relocate_image(&self) -> Result<()> {
        let src = self.build_dir.join(&self.image_subpath);
        let dst = &self.artifact_path;
        let copy_err = |source| BuildError::ArtifactCopy {
            src: src.clone(),
            dst: dst.clone(),
            source,
        };
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(copy_err)?;
        }
        info!(src = %src.display(), dst = %dst.display(), "relocating built image");
        fs::copy(&src, dst).map_err(copy_err)?;
        make_executable(dst).map_err(copy_err)?;
        Ok(())
    }
}

#[cfg(unix)]
fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[cfg(unix)]
    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        let mut file = fs::File::create(&path).expect("create script");
        writeln!(file, "#!/bin/sh\n{}", body).expect("write script");
        let mut permissions = file.metadata().expect("metadata").permissions();
        permissions.set_mode(0o755);
        fs::set_permissions(&path, permissions).expect("chmod");
        path
    }

    fn pipeline(dir: &Path) -> BuildPipeline {
        let (configure_tool, compile_tool) = BuildPipeline::default_tools();
        BuildPipeline {
            source_dir: dir.to_path_buf(),
            build_dir: dir.join("build"),
            board: "nrf52_bsim".to_owned(),
            board_root: dir.to_path_buf(),
            generator: "Ninja".to_owned(),
            image_subpath: PathBuf::from("zephyr/zephyr.exe"),
            artifact_path: dir.join("bin/scan_image"),
            extra_build_args: Vec::new(),
            tool_timeout: Duration::from_secs(30),
            configure_tool,
            compile_tool,
        }
    }

    #[test]
    fn conf_file_defaults_when_absent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pipeline = pipeline(dir.path());
        assert_eq!(pipeline.ensure_conf_file(), "prj.conf");
        assert!(pipeline
            .extra_build_args
            .contains(&"-DCONF_FILE=prj.conf".to_owned()));
    }

    #[test]
    fn conf_file_override_is_honoured() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pipeline = pipeline(dir.path());
        pipeline
            .extra_build_args
            .push("-DCONF_FILE=other.conf".to_owned());
        assert_eq!(pipeline.ensure_conf_file(), "other.conf");
        assert_eq!(pipeline.extra_build_args.len(), 1, "no duplicate appended");
    }

    #[test]
    fn configure_args_have_fixed_prefix_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pipeline = pipeline(dir.path());
        pipeline.extra_build_args.push("-DEXTRA=1".to_owned());
        let args = pipeline.configure_args();
        assert!(args[0].starts_with("-B"));
        assert!(args[1].starts_with("-S"));
        assert!(args[2].starts_with("-G"));
        assert!(args[3].starts_with("-DBOARD_ROOT="));
        assert_eq!(args[4], format!("-DBOARD={}", pipeline.board));
        assert_eq!(args[5], "-DEXTRA=1");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn build_produces_executable_artifact_and_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pipeline = pipeline(dir.path());
        let image = pipeline.build_dir.join(&pipeline.image_subpath);
        pipeline.configure_tool = write_script(dir.path(), "fake-cmake", "echo configured");
        pipeline.compile_tool = write_script(
            dir.path(),
            "fake-ninja",
            &format!(
                "mkdir -p {}\nprintf image > {}",
                image.parent().expect("image parent").display(),
                image.display()
            ),
        );

        let artifact = pipeline.build().await.expect("build succeeds");
        assert_eq!(artifact, pipeline.artifact_path);
        assert!(artifact.exists());
        assert!(pipeline.build_dir.join("cmake_out.log").exists());
        assert!(pipeline.build_dir.join("ninja_out.log").exists());

        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&artifact).expect("metadata").permissions().mode();
        assert_ne!(mode & 0o111, 0, "artifact must be executable");
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn failing_compile_surfaces_stage_and_logs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut pipeline = pipeline(dir.path());
        pipeline.configure_tool = write_script(dir.path(), "fake-cmake", "echo configured");
        pipeline.compile_tool =
            write_script(dir.path(), "fake-ninja", "echo broken >&2\nexit 2");

        let err = pipeline.build().await.expect_err("compile must fail");
        match err {
            BuildError::Tool {
                stage,
                exit_code,
                stdout_log,
                stderr_log,
            } => {
                assert_eq!(stage, "ninja");
                assert_eq!(exit_code, 2);
                assert!(stdout_log.exists());
                assert!(stderr_log.expect("stderr log").exists());
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
