// src/exec/mod.rs

//! Command execution layer.
//!
//! This module owns the single execution engine instance and everything that
//! happens around a command run:
//!
//! - [`backend`] defines the `EngineLauncher` / `ExecutionEngine` traits the
//!   controller talks to, so tests can substitute a fake engine.
//! - [`process`] is the production engine: OS processes in a sandbox dir.
//! - [`controller`] is the state machine (`Cold → Booting → Ready ⇄ Running`)
//!   with memoized boot, busy rejection, timeout and stop.
//! - [`sync`] reconciles a project state with the files the engine holds.
//! - [`terminal`] keeps a bounded copy of streamed output for display.

pub mod backend;
pub mod controller;
pub mod process;
pub mod sync;
pub mod terminal;

/// Exit code reported for every cancelled command, whether stopped by the
/// user or by the timeout.
pub const CANCELLED_EXIT_CODE: i32 = 130;

pub use backend::{
    EngineFuture, EngineLauncher, EngineOutput, ExecutionEngine, OutputSink, RunIo, discard,
};
pub use controller::{
    CancelReason, CommandOutcome, EngineState, ExecutionController, RunOptions, StopResult,
};
pub use process::{ProcessEngine, ProcessLauncher};
pub use sync::{SyncStats, reconcile};
pub use terminal::TerminalBuffer;
