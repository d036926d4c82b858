//! ---
//! hsim_section: "15-testing-qa-runbook"
//! hsim_subsection: "integration-tests"
//! hsim_type: "source"
//! hsim_scope: "code"
//! hsim_description: "End-to-end build deduplication through the real pipeline."
//! hsim_version: "v0.1.0"
//! hsim_owner: "tbd"
//! ---
#![cfg(unix)]

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hsim_build::{
    BuildCoordinator, BuildKey, BuildPipeline, BuildRequest, BuildStatus, RecordStore,
};

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let mut file = fs::File::create(&path).expect("create script");
    writeln!(file, "#!/bin/sh\n{}", body).expect("write script");
    let mut permissions = file.metadata().expect("metadata").permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(&path, permissions).expect("chmod");
    path
}

struct Env {
    _dir: tempfile::TempDir,
    root: PathBuf,
    store: RecordStore,
    compile_marker: PathBuf,
    configure_tool: PathBuf,
    compile_tool: PathBuf,
}

/// A complete fake build environment: the configure stand-in only echoes, the
/// compile stand-in creates the image inside the `-C` build directory and
/// appends to an invocation marker so tests can count real builds.
fn build_env() -> Env {
    let dir = tempfile::tempdir().expect("tempdir");
    let root = dir.path().to_path_buf();
    let store = RecordStore::new(root.join("session/builds.json"), Duration::from_secs(10));
    store.reset().expect("reset store");
    let compile_marker = root.join("compile_invocations");
    let configure_tool = write_script(&root, "fake-cmake", "echo configured");
    let compile_tool = write_script(
        &root,
        "fake-ninja",
        &format!(
            "build_dir=${{1#-C}}\nmkdir -p \"$build_dir/zephyr\"\nprintf image > \"$build_dir/zephyr/zephyr.exe\"\necho run >> {}",
            compile_marker.display()
        ),
    );
    Env {
        _dir: dir,
        root,
        store,
        compile_marker,
        configure_tool,
        compile_tool,
    }
}

fn pipeline(env: &Env, build_dir: &Path, artifact: &Path) -> BuildPipeline {
    let configure_tool = env.configure_tool.clone();
    let compile_tool = env.compile_tool.clone();
    BuildPipeline {
        source_dir: env.root.clone(),
        build_dir: build_dir.to_path_buf(),
        board: "nrf52_bsim".to_owned(),
        board_root: env.root.clone(),
        generator: "Ninja".to_owned(),
        image_subpath: PathBuf::from("zephyr/zephyr.exe"),
        artifact_path: artifact.to_path_buf(),
        extra_build_args: Vec::new(),
        tool_timeout: Duration::from_secs(30),
        configure_tool,
        compile_tool,
    }
}

fn compile_invocations(env: &Env) -> usize {
    fs::read_to_string(&env.compile_marker)
        .map(|contents| contents.lines().count())
        .unwrap_or(0)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_share_one_build() {
    let env = build_env();
    let artifact = env.root.join("bin/scan_image");
    let key = BuildKey::derive("nrf52_bsim", "prj.conf", "scan.basic");

    let mut handles = Vec::new();
    for worker in 0..3 {
        // Each worker gets its own store handle and build directory, the way
        // independent test processes would.
        let coordinator = BuildCoordinator::new(
            env.store.clone(),
            Duration::from_millis(50),
            Duration::from_secs(10),
        );
        let request = BuildRequest {
            key: key.clone(),
            artifact_path: artifact.clone(),
            build_dir: env.root.join(format!("worker{}/build", worker)),
        };
        let pipeline = pipeline(&env, &request.build_dir, &artifact);
        handles.push(tokio::spawn(async move {
            coordinator
                .acquire_or_build(&request, move || async move { pipeline.build().await })
                .await
        }));
    }

    for handle in handles {
        let produced = handle.await.expect("join").expect("build succeeds");
        assert_eq!(produced, artifact);
    }

    assert_eq!(compile_invocations(&env), 1, "exactly one compile ran");
    assert!(artifact.exists(), "shared artifact exists");

    let record = env
        .store
        .with_lock(|records| records.get(&key).cloned())
        .await
        .expect("lock")
        .expect("record present");
    assert_eq!(record.status, BuildStatus::Finished);
    assert_eq!(record.artifact_path, artifact);
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_key_is_reused_without_tools() {
    let env = build_env();
    let artifact = env.root.join("bin/adv_image");
    let key = BuildKey::derive("nrf52_bsim", "prj.conf", "adv.basic");
    let coordinator = BuildCoordinator::new(
        env.store.clone(),
        Duration::from_millis(50),
        Duration::from_secs(10),
    );

    let first_build_dir = env.root.join("worker0/build");
    let request = BuildRequest {
        key: key.clone(),
        artifact_path: artifact.clone(),
        build_dir: first_build_dir.clone(),
    };
    let first = pipeline(&env, &first_build_dir, &artifact);
    coordinator
        .acquire_or_build(&request, move || async move { first.build().await })
        .await
        .expect("first build succeeds");
    assert_eq!(compile_invocations(&env), 1);

    let second_build_dir = env.root.join("worker1/build");
    let request = BuildRequest {
        key,
        artifact_path: artifact.clone(),
        build_dir: second_build_dir.clone(),
    };
    let second = pipeline(&env, &second_build_dir, &artifact);
    let produced = coordinator
        .acquire_or_build(&request, move || async move { second.build().await })
        .await
        .expect("reuse succeeds");

    assert_eq!(produced, artifact);
    assert_eq!(compile_invocations(&env), 1, "no second compile");
    let note = fs::read_to_string(second_build_dir.join("build.log")).expect("reuse note");
    assert!(note.contains("already existing build"));
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_tool_rolls_back_for_the_next_worker() {
    let env = build_env();
    let artifact = env.root.join("bin/flaky_image");
    let key = BuildKey::derive("nrf52_bsim", "prj.conf", "flaky");
    let coordinator = BuildCoordinator::new(
        env.store.clone(),
        Duration::from_millis(50),
        Duration::from_secs(10),
    );

    let build_dir = env.root.join("worker0/build");
    let mut broken = pipeline(&env, &build_dir, &artifact);
    broken.compile_tool = write_script(&env.root, "broken-ninja", "echo nope >&2\nexit 1");
    let request = BuildRequest {
        key: key.clone(),
        artifact_path: artifact.clone(),
        build_dir: build_dir.clone(),
    };
    coordinator
        .acquire_or_build(&request, move || async move { broken.build().await })
        .await
        .expect_err("broken compile must fail");

    // The record was rolled back, so a healthy worker can claim and build.
    let healthy = pipeline(&env, &build_dir, &artifact);
    let produced = coordinator
        .acquire_or_build(&request, move || async move { healthy.build().await })
        .await
        .expect("healthy retry succeeds");
    assert_eq!(produced, artifact);
    assert!(artifact.exists());
}
