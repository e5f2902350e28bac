// src/persistence/store.rs

use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::PersistenceConfig;
use crate::errors::{Result, SandcastleError};
use crate::persistence::backend::{DirectoryBackend, KvBackend};
use crate::types::{ProjectState, Snapshot};

/// Key of the current project state.
pub const CURRENT_KEY: &str = "workspace.v1";
/// Key of the snapshot history.
pub const HISTORY_KEY: &str = "workspace.history.v1";

/// Durable storage of the current project plus a bounded snapshot history.
///
/// Writes go to the durable backend first (failures propagate) and are then
/// mirrored to the fallback backend (failures are logged). Reads treat
/// unreadable or unparseable data as absent and fall through to the next
/// source.
#[derive(Debug)]
pub struct PersistenceStore {
    durable: Arc<dyn KvBackend>,
    fallback: Arc<dyn KvBackend>,
    history_limit: usize,
    write_lock: Mutex<()>,
}

impl PersistenceStore {
    pub fn new(
        durable: Arc<dyn KvBackend>,
        fallback: Arc<dyn KvBackend>,
        history_limit: usize,
    ) -> Self {
        Self {
            durable,
            fallback,
            history_limit: history_limit.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(cfg: &PersistenceConfig) -> Self {
        Self::new(
            Arc::new(DirectoryBackend::new(&cfg.data_dir)),
            Arc::new(DirectoryBackend::new(&cfg.fallback_dir)),
            cfg.history_limit,
        )
    }

    /// Persist `state` as the current project and record a snapshot unless
    /// it is identical to the newest one.
    pub fn save(&self, state: &ProjectState) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());

        let serialized = state.to_json()?;
        self.durable
            .set(CURRENT_KEY, &serialized)
            .map_err(|e| write_failure(CURRENT_KEY, e))?;
        self.mirror(CURRENT_KEY, &serialized);

        let mut history = self.read_history();
        if let Some(newest) = history.last() {
            if newest.state.to_json()? == serialized {
                debug!(snapshots = history.len(), "state unchanged; history not extended");
                return Ok(());
            }
        }

        history.push(Snapshot::new(state.clone(), &serialized));
        if history.len() > self.history_limit {
            let excess = history.len() - self.history_limit;
            history.drain(..excess);
        }

        let history_json = serde_json::to_string(&history)
            .map_err(|e| SandcastleError::Other(anyhow::Error::from(e)))?;
        self.durable
            .set(HISTORY_KEY, &history_json)
            .map_err(|e| write_failure(HISTORY_KEY, e))?;
        self.mirror(HISTORY_KEY, &history_json);

        debug!(files = state.len(), snapshots = history.len(), "project saved");
        Ok(())
    }

    /// Current project: durable value, then fallback value, then the newest
    /// snapshot. `None` when nothing usable is stored.
    pub fn load(&self) -> Option<ProjectState> {
        if let Some(state) = read_parsed::<ProjectState>(self.durable.as_ref(), CURRENT_KEY) {
            return Some(state);
        }
        if let Some(state) = read_parsed::<ProjectState>(self.fallback.as_ref(), CURRENT_KEY) {
            debug!("loaded project from fallback storage");
            return Some(state);
        }
        let newest = self.read_history().pop();
        if newest.is_some() {
            debug!("loaded project from newest snapshot");
        }
        newest.map(|s| s.state)
    }

    /// State of the second-newest snapshot. Does not modify anything; save
    /// the result to make a rollback stick.
    pub fn load_previous(&self) -> Option<ProjectState> {
        let mut history = self.read_history();
        if history.len() < 2 {
            return None;
        }
        history.pop();
        history.pop().map(|s| s.state)
    }

    /// Snapshots, oldest first.
    pub fn history(&self) -> Vec<Snapshot> {
        self.read_history()
    }

    fn read_history(&self) -> Vec<Snapshot> {
        read_parsed::<Vec<Snapshot>>(self.durable.as_ref(), HISTORY_KEY)
            .or_else(|| read_parsed::<Vec<Snapshot>>(self.fallback.as_ref(), HISTORY_KEY))
            .unwrap_or_default()
    }

    fn mirror(&self, key: &str, value: &str) {
        if let Err(err) = self.fallback.set(key, value) {
            warn!("{}; continuing with durable storage only", write_failure(key, err));
        }
    }
}

fn read_parsed<T: DeserializeOwned>(backend: &dyn KvBackend, key: &str) -> Option<T> {
    let raw = match backend.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(key, error = %err, "storage read failed; treating as absent");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "{}", SandcastleError::CorruptPersistedState(key.to_string()));
            None
        }
    }
}

fn write_failure(key: &str, err: anyhow::Error) -> SandcastleError {
    SandcastleError::StorageWriteFailure {
        key: key.to_string(),
        reason: format!("{err:#}"),
    }
}
