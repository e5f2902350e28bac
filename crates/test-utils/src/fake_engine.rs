use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sandcastle::errors::{Result, SandcastleError};
use sandcastle::exec::{EngineFuture, EngineLauncher, EngineOutput, ExecutionEngine, RunIo};

/// How a scripted command behaves once started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Return right away.
    Immediate,
    /// Return after the delay, unless cancelled first.
    Delay(Duration),
    /// Return only when cancelled.
    UntilCancelled,
    /// Never return, even when cancelled.
    IgnoreCancel,
}

/// One scripted command run.
#[derive(Debug, Clone)]
pub struct FakeRun {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub mode: RunMode,
}

impl FakeRun {
    pub fn exits(code: i32) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: code,
            mode: RunMode::Immediate,
        }
    }

    pub fn prints(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            ..Self::exits(0)
        }
    }

    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Everything the fake engine was asked to do.
#[derive(Debug, Default, Clone)]
pub struct EngineRecord {
    pub files: BTreeMap<String, String>,
    pub removed: Vec<String>,
    pub commands: Vec<String>,
    pub inputs: Vec<String>,
    pub input_closed: usize,
    pub destroyed: usize,
}

/// In-memory engine that records calls and follows a run script.
///
/// Commands without a scripted run exit 0 immediately.
#[derive(Debug, Default)]
pub struct FakeEngine {
    record: Mutex<EngineRecord>,
    script: Mutex<VecDeque<FakeRun>>,
    failing_paths: Mutex<HashSet<String>>,
}

impl FakeEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_run(&self, run: FakeRun) {
        self.script.lock().unwrap().push_back(run);
    }

    /// Make `materialize_file` fail for `path`.
    pub fn fail_writes_to(&self, path: &str) {
        self.failing_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn record(&self) -> EngineRecord {
        self.record.lock().unwrap().clone()
    }

    pub fn file_paths(&self) -> Vec<String> {
        self.record.lock().unwrap().files.keys().cloned().collect()
    }
}

impl ExecutionEngine for FakeEngine {
    fn materialize_file<'a>(
        &'a self,
        path: &'a str,
        content: &'a str,
    ) -> EngineFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.failing_paths.lock().unwrap().contains(path) {
                return Err(SandcastleError::Engine(format!("cannot write {path}")));
            }
            self.record
                .lock()
                .unwrap()
                .files
                .insert(path.to_string(), content.to_string());
            Ok(())
        })
    }

    fn remove_file<'a>(&'a self, path: &'a str) -> EngineFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut record = self.record.lock().unwrap();
            record.files.remove(path);
            record.removed.push(path.to_string());
            Ok(())
        })
    }

    fn run<'a>(&'a self, command: &'a str, io: RunIo) -> EngineFuture<'a, Result<EngineOutput>> {
        Box::pin(async move {
            self.record.lock().unwrap().commands.push(command.to_string());
            let run = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| FakeRun::exits(0));

            if !run.stdout.is_empty() {
                io.emit_stdout(&run.stdout);
            }
            if !run.stderr.is_empty() {
                io.emit_stderr(&run.stderr);
            }
            let output = EngineOutput {
                stdout: run.stdout.clone(),
                stderr: run.stderr.clone(),
                exit_code: run.exit_code,
            };

            match run.mode {
                RunMode::Immediate => Ok(output),
                RunMode::Delay(delay) => {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => Ok(output),
                        _ = io.cancel.cancelled() => Ok(EngineOutput { exit_code: 130, ..output }),
                    }
                }
                RunMode::UntilCancelled => {
                    io.cancel.cancelled().await;
                    Ok(EngineOutput { exit_code: 130, ..output })
                }
                RunMode::IgnoreCancel => std::future::pending().await,
            }
        })
    }

    fn send_input<'a>(&'a self, text: &'a str) -> EngineFuture<'a, Result<()>> {
        Box::pin(async move {
            self.record.lock().unwrap().inputs.push(text.to_string());
            Ok(())
        })
    }

    fn close_input(&self) -> EngineFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record.lock().unwrap().input_closed += 1;
            Ok(())
        })
    }

    fn destroy(&self) -> EngineFuture<'_, Result<()>> {
        Box::pin(async move {
            self.record.lock().unwrap().destroyed += 1;
            Ok(())
        })
    }
}

/// Launcher handing out one shared [`FakeEngine`].
///
/// Counts boot calls, can delay them, and can fail the next `n` boots.
#[derive(Debug)]
pub struct FakeLauncher {
    engine: Arc<FakeEngine>,
    boots: AtomicUsize,
    failures_left: AtomicUsize,
    boot_delay: Mutex<Option<Duration>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            engine: FakeEngine::new(),
            boots: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            boot_delay: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> Arc<FakeEngine> {
        Arc::clone(&self.engine)
    }

    pub fn boot_count(&self) -> usize {
        self.boots.load(Ordering::SeqCst)
    }

    pub fn set_boot_delay(&self, delay: Duration) {
        *self.boot_delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_next_boots(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }
}

impl EngineLauncher for FakeLauncher {
    fn boot(&self) -> EngineFuture<'_, Result<Arc<dyn ExecutionEngine>>> {
        Box::pin(async move {
            self.boots.fetch_add(1, Ordering::SeqCst);
            let delay = *self.boot_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(SandcastleError::Engine("fake boot failure".to_string()));
            }
            let engine: Arc<dyn ExecutionEngine> = self.engine.clone();
            Ok(engine)
        })
    }
}
