// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod import;
pub mod logging;
pub mod persistence;
pub mod transfer;
pub mod types;

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::{ConfigFile, load_and_validate, parse_duration};
use crate::exec::{EngineState, ExecutionController, ProcessLauncher, RunOptions};
use crate::import::ImportPipeline;
use crate::persistence::PersistenceStore;
use crate::types::ProjectState;

/// High-level entry point used by `main.rs`.
///
/// Returns the process exit code: the command's own exit code for `run`,
/// 0 for everything else that succeeds.
pub async fn run(args: CliArgs) -> Result<i32> {
    let config_path = args.config_path();
    let cfg = load_and_validate(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let store = PersistenceStore::from_config(&cfg.persistence);

    match args.command {
        Command::Run { timeout, command } => {
            let timeout = timeout
                .as_deref()
                .map(parse_duration)
                .transpose()
                .map_err(|e| anyhow::anyhow!("invalid --timeout: {e}"))?;
            run_command(&cfg, &store, &command.join(" "), timeout).await
        }
        Command::Import { reference } => {
            import_project(&cfg, &store, &reference).await?;
            Ok(0)
        }
        Command::LoadFile { path } => {
            load_file(&store, &path)?;
            Ok(0)
        }
        Command::Export { out, zip } => {
            export_current(&store, out.as_deref(), zip)?;
            Ok(0)
        }
        Command::Rollback => rollback(&store),
        Command::History => {
            print_history(&store);
            Ok(0)
        }
    }
}

/// Current project, or the sample project when nothing is stored.
fn current_project(store: &PersistenceStore) -> ProjectState {
    store.load().unwrap_or_else(|| {
        debug!("no stored project; using the sample project");
        ProjectState::sample()
    })
}

async fn run_command(
    cfg: &ConfigFile,
    store: &PersistenceStore,
    command: &str,
    timeout: Option<Duration>,
) -> Result<i32> {
    let state = current_project(store);
    let launcher = Arc::new(ProcessLauncher::new(&cfg.execution.sandbox_dir));
    let controller = Arc::new(ExecutionController::new(launcher, &cfg.execution));

    let mut opts = RunOptions::default()
        .with_stdout(|chunk| {
            let mut out = std::io::stdout().lock();
            let _ = out.write_all(chunk.as_bytes());
            let _ = out.flush();
        })
        .with_stderr(|chunk| {
            let mut err = std::io::stderr().lock();
            let _ = err.write_all(chunk.as_bytes());
        });
    if let Some(timeout) = timeout {
        opts = opts.with_timeout(timeout);
    }

    // Our stdin → the command's stdin, line by line, then end of input.
    let stdin_task = {
        let controller = controller.clone();
        tokio::spawn(async move {
            while controller.state() != EngineState::Running {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Err(e) = controller.send_input(&format!("{line}\n")).await {
                    debug!(error = %e, "failed to forward input");
                }
            }
            if let Err(e) = controller.close_input().await {
                debug!(error = %e, "failed to close command input");
            }
        })
    };

    // Ctrl-C → stop.
    let signal_task = {
        let controller = controller.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                    return;
                }
                let result = controller.stop().await;
                debug!(?result, "stop after Ctrl+C");
            }
        })
    };

    let outcome = controller.run(command, &state, opts).await;
    stdin_task.abort();
    signal_task.abort();

    if let Err(e) = controller.shutdown().await {
        warn!(error = %e, "engine shutdown failed");
    }

    let outcome = outcome?;
    if let Some(message) = outcome.cancellation_error() {
        eprintln!("{message}");
    }
    Ok(outcome.exit_code)
}

async fn import_project(cfg: &ConfigFile, store: &PersistenceStore, reference: &str) -> Result<()> {
    let pipeline = ImportPipeline::github(cfg.import.clone())?;
    let outcome = pipeline.import(reference).await?;

    for skipped in &outcome.skipped {
        debug!(path = %skipped.path, reason = %skipped.reason, "entry skipped");
    }

    store.save(&outcome.state)?;
    println!(
        "imported {} files at {} ({} skipped)",
        outcome.state.len(),
        short_id(&outcome.revision),
        outcome.skipped.len()
    );
    Ok(())
}

fn load_file(store: &PersistenceStore, path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading project file {}", path.display()))?;
    let state = transfer::import_project(&text)?;
    store.save(&state)?;
    info!(files = state.len(), path = %path.display(), "project file loaded");
    println!("loaded {} files from {}", state.len(), path.display());
    Ok(())
}

fn export_current(store: &PersistenceStore, out: Option<&Path>, zip: bool) -> Result<()> {
    let state = current_project(store);
    let bytes = if zip {
        let name = out
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sandcastle".to_string());
        transfer::export_project_zip(&state, &name)?
    } else {
        format!("{}\n", transfer::export_project(&state)?).into_bytes()
    };
    match out {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            info!(files = state.len(), zip, path = %path.display(), "project exported");
        }
        None => std::io::stdout()
            .write_all(&bytes)
            .context("writing export to stdout")?,
    }
    Ok(())
}

fn rollback(store: &PersistenceStore) -> Result<i32> {
    match store.load_previous() {
        Some(state) => {
            store.save(&state)?;
            println!("restored previous snapshot ({} files)", state.len());
            Ok(0)
        }
        None => {
            eprintln!("no previous snapshot available");
            Ok(1)
        }
    }
}

fn print_history(store: &PersistenceStore) {
    let history = store.history();
    if history.is_empty() {
        println!("no snapshots");
        return;
    }
    // Newest first.
    for snapshot in history.iter().rev() {
        println!(
            "{}  {}  {} files",
            short_id(&snapshot.id),
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            snapshot.state.len()
        );
    }
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}
