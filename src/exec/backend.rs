// src/exec/backend.rs

//! Pluggable execution engine abstraction.
//!
//! The controller talks to an [`ExecutionEngine`] obtained from an
//! [`EngineLauncher`] instead of a concrete engine. This keeps the
//! controller's state machine independent of how commands actually run:
//!
//! - [`ProcessLauncher`](super::process::ProcessLauncher) is the production
//!   implementation. It runs commands as OS processes inside a sandbox
//!   directory.
//! - Tests provide their own launcher/engine pair that records calls and lets
//!   the test decide when (and whether) a command settles.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::errors::Result;

/// Boxed future returned by engine operations.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback receiving streamed output chunks.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Starts an engine. Called at most once per successful boot.
pub trait EngineLauncher: Send + Sync {
    fn boot(&self) -> EngineFuture<'_, Result<Arc<dyn ExecutionEngine>>>;
}

/// The narrow capability surface of a booted engine.
pub trait ExecutionEngine: Send + Sync {
    /// Write `content` at the absolute project `path`, creating parents.
    fn materialize_file<'a>(&'a self, path: &'a str, content: &'a str)
        -> EngineFuture<'a, Result<()>>;

    /// Remove the file at `path`. Removing a missing file is not an error.
    fn remove_file<'a>(&'a self, path: &'a str) -> EngineFuture<'a, Result<()>>;

    /// Run `command`, streaming output to the sinks in `io`.
    ///
    /// Implementations should return promptly once `io.cancel` fires; the
    /// controller reports the outcome either way.
    fn run<'a>(&'a self, command: &'a str, io: RunIo) -> EngineFuture<'a, Result<EngineOutput>>;

    /// Forward `text` to the running command's standard input.
    fn send_input<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<()>>;

    /// Signal end of input to the running command. Input ended before the
    /// command starts applies to that command.
    fn close_input(&self) -> EngineFuture<'_, Result<()>>;

    /// Release every resource held by the engine.
    fn destroy(&self) -> EngineFuture<'_, Result<()>>;
}

/// Streams and signal handed to [`ExecutionEngine::run`].
#[derive(Clone)]
pub struct RunIo {
    pub on_stdout: OutputSink,
    pub on_stderr: OutputSink,
    pub cancel: CancellationToken,
}

impl RunIo {
    pub fn emit_stdout(&self, chunk: &str) {
        (self.on_stdout)(chunk);
    }

    pub fn emit_stderr(&self, chunk: &str) {
        (self.on_stderr)(chunk);
    }
}

impl fmt::Debug for RunIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunIo")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// What the engine reports once a command returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// A sink that drops everything.
pub fn discard() -> OutputSink {
    Arc::new(|_: &str| {})
}
