// src/exec/process.rs

//! Process-backed execution engine.
//!
//! Each boot creates a fresh private sandbox directory below the configured
//! root. Files are materialized inside it and every command runs through the
//! platform shell with the sandbox as its working directory. Destroying the
//! engine removes only that sandbox, never the root or its other contents.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{Result, SandcastleError};
use crate::exec::backend::{
    EngineFuture, EngineLauncher, EngineOutput, ExecutionEngine, OutputSink, RunIo,
};
use crate::exec::terminal::TerminalBuffer;
use crate::exec::CANCELLED_EXIT_CODE;
use crate::types::validate_path;

/// Boots [`ProcessEngine`]s, each in its own sandbox below `root`.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    root: PathBuf,
}

impl ProcessLauncher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl EngineLauncher for ProcessLauncher {
    fn boot(&self) -> EngineFuture<'_, Result<Arc<dyn ExecutionEngine>>> {
        let root = self.root.clone();
        Box::pin(async move {
            tokio::fs::create_dir_all(&root).await?;
            let sandbox = tokio::task::spawn_blocking(move || {
                tempfile::Builder::new().prefix("sandbox-").tempdir_in(&root)
            })
            .await
            .map_err(|e| SandcastleError::Engine(format!("creating sandbox: {e}")))??;
            let engine = ProcessEngine::in_sandbox(sandbox).await?;
            info!(root = %engine.root().display(), "process engine sandbox ready");
            let engine: Arc<dyn ExecutionEngine> = Arc::new(engine);
            Ok(engine)
        })
    }
}

/// Stdin of the running child, plus whether the caller already ended input.
#[derive(Debug, Default)]
struct InputState {
    stdin: Option<ChildStdin>,
    closed: bool,
}

/// Runs commands as child processes of the current process.
#[derive(Debug)]
pub struct ProcessEngine {
    root: PathBuf,
    sandbox: Mutex<Option<TempDir>>,
    input: tokio::sync::Mutex<InputState>,
}

impl ProcessEngine {
    async fn in_sandbox(sandbox: TempDir) -> Result<Self> {
        let root = tokio::fs::canonicalize(sandbox.path()).await?;
        Ok(Self {
            root,
            sandbox: Mutex::new(Some(sandbox)),
            input: tokio::sync::Mutex::new(InputState::default()),
        })
    }

    /// The sandbox directory commands run in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(self.root.join(path.trim_start_matches('/')))
    }

    async fn run_inner(&self, command: &str, io: RunIo) -> Result<EngineOutput> {
        info!(cmd = %command, root = %self.root.display(), "starting command process");

        let mut cmd = shell_command(command);
        cmd.current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| SandcastleError::Engine(format!("spawning '{command}': {e}")))?;

        {
            let mut input = self.input.lock().await;
            let stdin = child.stdin.take();
            // Input ended before the child existed: leave its stdin closed.
            if !input.closed {
                input.stdin = stdin;
            }
        }

        let stdout_buf = Arc::new(Mutex::new(TerminalBuffer::new()));
        let stderr_buf = Arc::new(Mutex::new(TerminalBuffer::new()));
        let stdout_pump = spawn_pump(child.stdout.take(), io.on_stdout.clone(), stdout_buf.clone());
        let stderr_pump = spawn_pump(child.stderr.take(), io.on_stderr.clone(), stderr_buf.clone());

        // Either the process exits on its own, or the cancellation token
        // fires and we kill it.
        let exit_code = tokio::select! {
            status_res = child.wait() => {
                let status = status_res
                    .map_err(|e| SandcastleError::Engine(format!("waiting for '{command}': {e}")))?;
                let code = status.code().unwrap_or(-1);
                debug!(cmd = %command, exit_code = code, "command process exited");
                if let Some(h) = stdout_pump { let _ = h.await; }
                if let Some(h) = stderr_pump { let _ = h.await; }
                code
            }
            _ = io.cancel.cancelled() => {
                info!(cmd = %command, "cancellation requested; killing command process");
                if let Err(e) = child.kill().await {
                    warn!(cmd = %command, error = %e, "failed to kill command process");
                }
                if let Some(h) = stdout_pump { h.abort(); }
                if let Some(h) = stderr_pump { h.abort(); }
                CANCELLED_EXIT_CODE
            }
        };

        *self.input.lock().await = InputState::default();

        let stdout = take_buffer(&stdout_buf);
        let stderr = take_buffer(&stderr_buf);
        Ok(EngineOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

impl ExecutionEngine for ProcessEngine {
    fn materialize_file<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> EngineFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, content.as_bytes()).await?;
            Ok(())
        })
    }

    fn remove_file<'a>(&'a self, path: &'a str) -> EngineFuture<'a, Result<()>> {
        Box::pin(async move {
            let target = self.resolve(path)?;
            match tokio::fs::remove_file(&target).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn run<'a>(&'a self, command: &'a str, io: RunIo) -> EngineFuture<'a, Result<EngineOutput>> {
        Box::pin(self.run_inner(command, io))
    }

    fn send_input<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut input = self.input.lock().await;
            if let Some(stdin) = input.stdin.as_mut() {
                stdin.write_all(text.as_bytes()).await?;
                stdin.flush().await?;
            }
            Ok(())
        })
    }

    fn close_input(&self) -> EngineFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut input = self.input.lock().await;
            input.closed = true;
            if let Some(mut stdin) = input.stdin.take() {
                // The child may already have exited; EOF is delivered either way.
                let _ = stdin.shutdown().await;
            }
            debug!("command input closed");
            Ok(())
        })
    }

    fn destroy(&self) -> EngineFuture<'_, Result<()>> {
        Box::pin(async move {
            *self.input.lock().await = InputState::default();
            let sandbox = self
                .sandbox
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .take();
            if let Some(sandbox) = sandbox {
                tokio::task::spawn_blocking(move || sandbox.close())
                    .await
                    .map_err(|e| SandcastleError::Engine(format!("removing sandbox: {e}")))??;
                info!(root = %self.root.display(), "process engine sandbox removed");
            }
            Ok(())
        })
    }
}

/// Build a shell command appropriate for the platform.
fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    }
}

/// Forward a pipe to `sink` chunk by chunk, keeping the newest output in
/// `buf`.
fn spawn_pump<R>(
    pipe: Option<R>,
    sink: OutputSink,
    buf: Arc<Mutex<TerminalBuffer>>,
) -> Option<JoinHandle<()>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut pipe = pipe?;
    Some(tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        let mut pending: Vec<u8> = Vec::new();
        loop {
            let n = match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            pending.extend_from_slice(&chunk[..n]);
            let text = drain_utf8(&mut pending);
            if !text.is_empty() {
                sink(&text);
                if let Ok(mut guard) = buf.lock() {
                    guard.push(&text);
                }
            }
        }
        if !pending.is_empty() {
            let text = String::from_utf8_lossy(&pending).into_owned();
            sink(&text);
            if let Ok(mut guard) = buf.lock() {
                guard.push(&text);
            }
        }
    }))
}

/// Take the longest decodable prefix of `pending`, leaving an incomplete
/// trailing sequence in place. Invalid sequences become U+FFFD.
fn drain_utf8(pending: &mut Vec<u8>) -> String {
    let mut out = String::new();
    loop {
        match std::str::from_utf8(pending) {
            Ok(s) => {
                out.push_str(s);
                pending.clear();
                return out;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return out;
                    }
                }
            }
        }
    }
}

fn take_buffer(buf: &Arc<Mutex<TerminalBuffer>>) -> String {
    buf.lock()
        .map(|mut g| std::mem::take(&mut *g).into_string())
        .unwrap_or_default()
}
