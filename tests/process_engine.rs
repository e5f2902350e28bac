// tests/process_engine.rs
#![cfg(unix)]

mod common;
use crate::common::{capture, init_tracing, wait_for_state, with_timeout};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sandcastle::config::ExecutionConfig;
use sandcastle::exec::{
    CANCELLED_EXIT_CODE, CancelReason, EngineState, ExecutionController, ProcessLauncher,
    RunOptions,
};
use sandcastle::types::ProjectState;
use sandcastle_test_utils::builders::ProjectStateBuilder;

fn controller_in(dir: &std::path::Path) -> ExecutionController {
    init_tracing();
    let config = ExecutionConfig {
        boot_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(10),
        stop_grace: Duration::from_secs(1),
        sandbox_dir: dir.join("sandbox"),
    };
    ExecutionController::new(Arc::new(ProcessLauncher::new(&config.sandbox_dir)), &config)
}

/// The single engine sandbox created below `dir/sandbox`.
fn sandbox_of(dir: &Path) -> PathBuf {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir.join("sandbox"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 1, "expected one sandbox, got {entries:?}");
    entries.remove(0)
}

#[tokio::test]
async fn runs_commands_against_materialized_files() {
    let tmp = tempfile::tempdir().unwrap();
    let controller = controller_in(tmp.path());

    let (out, sink) = capture();
    let outcome = with_timeout(controller.run(
        "cat index.js && exit 3",
        &ProjectState::sample(),
        RunOptions::default().with_stdout(sink),
    ))
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, 3);
    assert!(outcome.stdout.contains("sandcastle workspace ready"));
    assert_eq!(*out.lock().unwrap(), outcome.stdout);
    assert!(sandbox_of(tmp.path()).join("package.json").is_file());
}

#[tokio::test]
async fn nested_paths_and_removals_follow_the_project() {
    let tmp = tempfile::tempdir().unwrap();
    let controller = controller_in(tmp.path());
    let first = ProjectStateBuilder::new()
        .file("/src/app.js", "a")
        .file("/old.txt", "x")
        .build();
    controller.run("true", &first, RunOptions::default()).await.unwrap();
    let sandbox = sandbox_of(tmp.path());
    assert!(sandbox.join("src/app.js").is_file());
    assert!(sandbox.join("old.txt").is_file());

    let second = ProjectStateBuilder::new().file("/src/app.js", "b").build();
    let outcome = controller
        .run("cat src/app.js", &second, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(outcome.stdout, "b");
    assert!(!sandbox.join("old.txt").exists());
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let tmp = tempfile::tempdir().unwrap();
    let controller = controller_in(tmp.path());

    let outcome = with_timeout(controller.run(
        "sleep 30",
        &ProjectState::sample(),
        RunOptions::default().with_timeout(Duration::from_millis(200)),
    ))
    .await
    .unwrap();

    assert_eq!(outcome.exit_code, CANCELLED_EXIT_CODE);
    assert_eq!(outcome.cancelled, Some(CancelReason::Timeout));
    assert_eq!(controller.state(), EngineState::Ready);
}

#[tokio::test]
async fn shutdown_removes_only_the_engine_sandbox() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(tmp.path().join("sandbox")).unwrap();
    std::fs::write(tmp.path().join("sandbox/leftover.txt"), "from an old run").unwrap();
    let controller = controller_in(tmp.path());

    let outcome = controller
        .run("ls -A", &ProjectState::sample(), RunOptions::default())
        .await
        .unwrap();
    assert!(!outcome.stdout.contains("leftover.txt"));

    controller.shutdown().await.unwrap();
    assert_eq!(controller.state(), EngineState::Cold);
    let remaining: Vec<_> = std::fs::read_dir(tmp.path().join("sandbox"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(remaining, ["leftover.txt"]);
}

#[tokio::test]
async fn closed_input_ends_a_reading_command() {
    let tmp = tempfile::tempdir().unwrap();
    let controller = Arc::new(controller_in(tmp.path()));

    let run = {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .run("wc -l", &ProjectState::sample(), RunOptions::default())
                .await
        })
    };
    with_timeout(wait_for_state(&controller, EngineState::Running)).await;
    controller.close_input().await.unwrap();

    let outcome = with_timeout(run).await.unwrap().unwrap();
    assert_eq!(outcome.exit_code, 0);
    assert_eq!(outcome.cancelled, None);
    assert_eq!(outcome.stdout.trim(), "0");
}
