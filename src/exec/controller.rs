// src/exec/controller.rs

//! Execution controller: owns the engine and serializes command runs.
//!
//! Lifecycle: `Cold → Booting → Ready ⇄ Running`.
//!
//! - `boot` is memoized. Concurrent callers share one in-flight attempt; a
//!   failed or timed-out attempt returns the controller to `Cold`.
//! - `run` is rejected with `BusyExecution` while another run is alive. It
//!   reconciles the engine's files with the given project state first.
//! - A run ends early when its cancellation token fires, either from `stop`
//!   or from the run's own timeout. Both report exit code 130 and no error.
//!
//! The phase lives behind a `std::sync::Mutex` that is never held across an
//! `.await`.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ExecutionConfig;
use crate::errors::{Result, SandcastleError};
use crate::exec::backend::{
    EngineLauncher, EngineOutput, ExecutionEngine, OutputSink, RunIo, discard,
};
use crate::exec::CANCELLED_EXIT_CODE;
use crate::exec::sync::reconcile;
use crate::types::ProjectState;

/// Externally visible lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Cold,
    Booting,
    Ready,
    Running,
}

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    User,
    Timeout,
}

/// Result of one `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub cancelled: Option<CancelReason>,
    /// Timeout that applied to this run.
    pub timeout: Duration,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.cancelled.is_none() && self.exit_code == 0
    }

    /// User-presentable message for a cancelled run. The run itself did not
    /// fail; this is only for display.
    pub fn cancellation_error(&self) -> Option<SandcastleError> {
        self.cancelled.map(|reason| match reason {
            CancelReason::User => SandcastleError::CancelledByUser,
            CancelReason::Timeout => SandcastleError::CancelledByTimeout(self.timeout),
        })
    }
}

/// Per-run options: output sinks and an optional timeout override.
#[derive(Clone)]
pub struct RunOptions {
    pub on_stdout: OutputSink,
    pub on_stderr: OutputSink,
    pub timeout: Option<Duration>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            on_stdout: discard(),
            on_stderr: discard(),
            timeout: None,
        }
    }
}

impl RunOptions {
    pub fn with_stdout(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stdout = Arc::new(sink);
        self
    }

    pub fn with_stderr(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stderr = Arc::new(sink);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// What `stop` observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopResult {
    /// Nothing was running.
    NotRunning,
    /// The run finished within the grace deadline.
    Settled,
    /// The grace deadline passed first; the stop still counts as done.
    GraceElapsed,
}

/// Clonable boot failure so every caller of a shared attempt sees the same
/// outcome.
#[derive(Debug, Clone)]
enum BootFailure {
    Timeout(Duration),
    Failed(String),
}

impl From<BootFailure> for SandcastleError {
    fn from(f: BootFailure) -> Self {
        match f {
            BootFailure::Timeout(d) => SandcastleError::BootTimeout(d),
            BootFailure::Failed(msg) => SandcastleError::BootFailed(msg),
        }
    }
}

type BootResult = std::result::Result<Arc<dyn ExecutionEngine>, BootFailure>;
type SharedBoot = Shared<BoxFuture<'static, BootResult>>;

/// Bookkeeping of the live run, shared with `stop` and `send_input`.
struct ActiveRun {
    engine: Arc<dyn ExecutionEngine>,
    cancel: CancellationToken,
    reason: Arc<OnceLock<CancelReason>>,
    settled: watch::Receiver<bool>,
}

enum Phase {
    Cold,
    Booting { attempt: u64, boot: SharedBoot },
    Ready(Arc<dyn ExecutionEngine>),
    Running(ActiveRun),
}

struct Inner {
    phase: Phase,
    attempts: u64,
    /// Paths the engine holds from the last reconciliation.
    synced: BTreeSet<String>,
}

/// Owns the single engine instance and serializes command runs on it.
pub struct ExecutionController {
    launcher: Arc<dyn EngineLauncher>,
    boot_timeout: Duration,
    command_timeout: Duration,
    stop_grace: Duration,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for ExecutionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionController")
            .field("state", &self.state())
            .field("boot_timeout", &self.boot_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("stop_grace", &self.stop_grace)
            .finish_non_exhaustive()
    }
}

impl ExecutionController {
    pub fn new(launcher: Arc<dyn EngineLauncher>, config: &ExecutionConfig) -> Self {
        Self {
            launcher,
            boot_timeout: config.boot_timeout,
            command_timeout: config.command_timeout,
            stop_grace: config.stop_grace,
            inner: Mutex::new(Inner {
                phase: Phase::Cold,
                attempts: 0,
                synced: BTreeSet::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> EngineState {
        match self.lock().phase {
            Phase::Cold => EngineState::Cold,
            Phase::Booting { .. } => EngineState::Booting,
            Phase::Ready(_) => EngineState::Ready,
            Phase::Running(_) => EngineState::Running,
        }
    }

    /// Paths written into the engine by the last reconciliation.
    pub fn synced_paths(&self) -> BTreeSet<String> {
        self.lock().synced.clone()
    }

    /// Boot the engine, or join the boot already in flight.
    pub async fn boot(&self) -> Result<()> {
        self.boot_engine().await.map(|_| ())
    }

    async fn boot_engine(&self) -> Result<Arc<dyn ExecutionEngine>> {
        let (attempt, boot) = {
            let mut inner = self.lock();
            match &inner.phase {
                Phase::Ready(engine) => return Ok(engine.clone()),
                Phase::Running(run) => return Ok(run.engine.clone()),
                Phase::Booting { attempt, boot } => (*attempt, boot.clone()),
                Phase::Cold => {
                    inner.attempts += 1;
                    let attempt = inner.attempts;
                    let boot = self.start_boot(attempt);
                    inner.phase = Phase::Booting {
                        attempt,
                        boot: boot.clone(),
                    };
                    (attempt, boot)
                }
            }
        };

        let result = boot.await;

        // Whichever caller gets here first moves the phase on; the rest see
        // that the attempt is no longer current and leave it alone.
        let mut inner = self.lock();
        let current =
            matches!(&inner.phase, Phase::Booting { attempt: current, .. } if *current == attempt);
        if current {
            inner.phase = match &result {
                Ok(engine) => Phase::Ready(engine.clone()),
                Err(_) => Phase::Cold,
            };
        }
        let stale = !current
            && match (&inner.phase, &result) {
                (Phase::Ready(live), Ok(ours)) => !Arc::ptr_eq(live, ours),
                (Phase::Running(run), Ok(ours)) => !Arc::ptr_eq(&run.engine, ours),
                _ => true,
            };
        drop(inner);

        match result {
            // `shutdown` ran while this attempt was in flight; it owns the
            // engine and destroys it.
            Ok(_) if stale => Err(SandcastleError::Engine(
                "execution engine was shut down while booting".to_string(),
            )),
            other => other.map_err(SandcastleError::from),
        }
    }

    fn start_boot(&self, attempt: u64) -> SharedBoot {
        let launcher = self.launcher.clone();
        let deadline = self.boot_timeout;
        async move {
            info!(attempt, "booting execution engine");
            match tokio::time::timeout(deadline, launcher.boot()).await {
                Ok(Ok(engine)) => {
                    info!(attempt, "execution engine ready");
                    Ok(engine)
                }
                Ok(Err(e)) => {
                    warn!(attempt, error = %e, "execution engine failed to boot");
                    Err(BootFailure::Failed(e.to_string()))
                }
                Err(_) => {
                    warn!(attempt, timeout_ms = deadline.as_millis() as u64, "execution engine boot timed out");
                    Err(BootFailure::Timeout(deadline))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Run one command against `state`.
    ///
    /// Fails fast with `BusyExecution` if another run is alive. Cancellation
    /// (stop or timeout) is not an error: the outcome carries exit code 130
    /// and the reason.
    pub async fn run(
        &self,
        command: &str,
        state: &ProjectState,
        opts: RunOptions,
    ) -> Result<CommandOutcome> {
        if self.state() == EngineState::Running {
            return Err(SandcastleError::BusyExecution);
        }

        let engine = self.boot_engine().await?;

        let cancel = CancellationToken::new();
        let reason = Arc::new(OnceLock::new());
        let (settled_tx, settled_rx) = watch::channel(false);
        let previous = {
            let mut inner = self.lock();
            match &inner.phase {
                Phase::Ready(_) => {}
                Phase::Running(_) => return Err(SandcastleError::BusyExecution),
                Phase::Cold | Phase::Booting { .. } => {
                    return Err(SandcastleError::Engine(
                        "execution engine was shut down while starting".to_string(),
                    ));
                }
            }
            inner.phase = Phase::Running(ActiveRun {
                engine: engine.clone(),
                cancel: cancel.clone(),
                reason: reason.clone(),
                settled: settled_rx,
            });
            inner.synced.clone()
        };
        let _guard = RunGuard {
            controller: self,
            settled: settled_tx,
        };

        let timeout = opts.timeout.unwrap_or(self.command_timeout);

        let (held, sync_result) = reconcile(engine.as_ref(), state, &previous).await;
        self.lock().synced = held;
        let stats = sync_result?;
        debug!(written = stats.written, removed = stats.removed, "engine files reconciled");

        if cancel.is_cancelled() {
            info!(cmd = %command, "run stopped before the command started");
            return Ok(cancelled_outcome(None, &reason, timeout));
        }

        info!(cmd = %command, timeout_ms = timeout.as_millis() as u64, "running command");

        let io = RunIo {
            on_stdout: opts.on_stdout,
            on_stderr: opts.on_stderr,
            cancel: cancel.clone(),
        };
        let run_fut = engine.run(command, io);
        tokio::pin!(run_fut);

        let settled: Option<Result<EngineOutput>> = tokio::select! {
            res = &mut run_fut => Some(res),
            _ = tokio::time::sleep(timeout) => {
                let _ = reason.set(CancelReason::Timeout);
                cancel.cancel();
                info!(cmd = %command, "command timed out; cancelling");
                tokio::time::timeout(self.stop_grace, &mut run_fut).await.ok()
            }
            _ = cancel.cancelled() => {
                tokio::time::timeout(self.stop_grace, &mut run_fut).await.ok()
            }
        };

        if cancel.is_cancelled() {
            if settled.is_none() {
                warn!(cmd = %command, "engine did not settle within the grace period");
            }
            let output = settled.and_then(|res| res.ok());
            let outcome = cancelled_outcome(output, &reason, timeout);
            info!(cmd = %command, reason = ?outcome.cancelled, "command cancelled");
            return Ok(outcome);
        }

        // Not cancelled, so the first branch produced the value.
        let output = match settled {
            Some(res) => res?,
            None => return Err(SandcastleError::Engine("command did not settle".to_string())),
        };
        info!(cmd = %command, exit_code = output.exit_code, "command finished");
        Ok(CommandOutcome {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            cancelled: None,
            timeout,
        })
    }

    /// Raise the live run's cancellation signal and wait (up to the grace
    /// deadline) for it to settle.
    pub async fn stop(&self) -> StopResult {
        let (cancel, mut settled) = {
            let inner = self.lock();
            match &inner.phase {
                Phase::Running(run) => {
                    let _ = run.reason.set(CancelReason::User);
                    (run.cancel.clone(), run.settled.clone())
                }
                _ => return StopResult::NotRunning,
            }
        };

        info!("stop requested; cancelling running command");
        cancel.cancel();

        match tokio::time::timeout(self.stop_grace, settled.wait_for(|done| *done)).await {
            Ok(_) => StopResult::Settled,
            Err(_) => {
                warn!(
                    grace_ms = self.stop_grace.as_millis() as u64,
                    "command did not settle within the grace period; treating stop as complete"
                );
                StopResult::GraceElapsed
            }
        }
    }

    /// Forward input to the running command. No-op unless `Running`.
    pub async fn send_input(&self, text: &str) -> Result<()> {
        let engine = {
            let inner = self.lock();
            match &inner.phase {
                Phase::Running(run) => run.engine.clone(),
                _ => return Ok(()),
            }
        };
        engine.send_input(text).await
    }

    /// End the running command's input. No-op unless `Running`.
    pub async fn close_input(&self) -> Result<()> {
        let engine = {
            let inner = self.lock();
            match &inner.phase {
                Phase::Running(run) => run.engine.clone(),
                _ => return Ok(()),
            }
        };
        engine.close_input().await
    }

    /// Destroy the engine and return to `Cold`.
    pub async fn shutdown(&self) -> Result<()> {
        let engine = {
            let mut inner = self.lock();
            if matches!(inner.phase, Phase::Running(_)) {
                return Err(SandcastleError::BusyExecution);
            }
            inner.synced.clear();
            match std::mem::replace(&mut inner.phase, Phase::Cold) {
                Phase::Ready(engine) => EngineToRelease::Booted(engine),
                Phase::Booting { boot, .. } => EngineToRelease::Booting(boot),
                _ => EngineToRelease::None,
            }
        };

        let engine = match engine {
            EngineToRelease::Booted(engine) => Some(engine),
            EngineToRelease::Booting(boot) => {
                debug!("shutdown during boot; waiting for the attempt to finish");
                boot.await.ok()
            }
            EngineToRelease::None => None,
        };

        if let Some(engine) = engine {
            if let Err(e) = engine.destroy().await {
                warn!(error = %e, "failed to destroy execution engine");
            }
            info!("execution engine shut down");
        }
        Ok(())
    }
}

enum EngineToRelease {
    None,
    Booted(Arc<dyn ExecutionEngine>),
    Booting(SharedBoot),
}

fn cancelled_outcome(
    output: Option<EngineOutput>,
    reason: &OnceLock<CancelReason>,
    timeout: Duration,
) -> CommandOutcome {
    let output = output.unwrap_or_default();
    CommandOutcome {
        exit_code: CANCELLED_EXIT_CODE,
        stdout: output.stdout,
        stderr: output.stderr,
        cancelled: Some(reason.get().copied().unwrap_or(CancelReason::User)),
        timeout,
    }
}

/// Returns the controller to `Ready` when a run ends, including when the
/// `run` future is dropped mid-flight, and wakes pending `stop` calls.
struct RunGuard<'a> {
    controller: &'a ExecutionController,
    settled: watch::Sender<bool>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        {
            let mut inner = self.controller.lock();
            let engine = match &inner.phase {
                Phase::Running(run) => Some(run.engine.clone()),
                _ => None,
            };
            if let Some(engine) = engine {
                inner.phase = Phase::Ready(engine);
            }
        }
        let _ = self.settled.send(true);
    }
}
