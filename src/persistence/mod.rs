// src/persistence/mod.rs

//! Project persistence: current state, fallback mirror and snapshot history.

pub mod backend;
pub mod store;

pub use backend::{DirectoryBackend, KvBackend, MemoryBackend};
pub use store::{CURRENT_KEY, HISTORY_KEY, PersistenceStore};
