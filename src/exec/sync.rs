// src/exec/sync.rs

//! File reconciliation between a project state and the engine sandbox.

use std::collections::BTreeSet;

use tracing::debug;

use crate::errors::Result;
use crate::exec::backend::ExecutionEngine;
use crate::types::ProjectState;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub written: usize,
    pub removed: usize,
}

/// Write every file of `state` into the engine, then remove every path in
/// `previous` that `state` no longer has.
///
/// Returns the set of paths the engine holds afterwards together with the
/// pass result. On failure the set still reflects every write and removal
/// that went through, so the next pass can clean up after this one.
pub async fn reconcile(
    engine: &dyn ExecutionEngine,
    state: &ProjectState,
    previous: &BTreeSet<String>,
) -> (BTreeSet<String>, Result<SyncStats>) {
    let mut held = previous.clone();
    let mut stats = SyncStats::default();

    for file in state.files() {
        if let Err(e) = engine.materialize_file(&file.path, file.text()).await {
            return (held, Err(e));
        }
        held.insert(file.path.clone());
        stats.written += 1;
    }

    let current: BTreeSet<&str> = state.files().map(|f| f.path.as_str()).collect();
    let stale: Vec<&String> = previous
        .iter()
        .filter(|path| !current.contains(path.as_str()))
        .collect();

    for path in stale {
        if let Err(e) = engine.remove_file(path).await {
            return (held, Err(e));
        }
        debug!(path = %path, "removed stale file from engine");
        held.remove(path);
        stats.removed += 1;
    }

    (held, Ok(stats))
}
