// tests/persistence_store.rs

mod common;

use std::sync::Arc;

use proptest::prelude::*;

use sandcastle::persistence::{
    CURRENT_KEY, DirectoryBackend, HISTORY_KEY, KvBackend, MemoryBackend, PersistenceStore,
};
use sandcastle::types::ProjectState;
use sandcastle_test_utils::builders::ProjectStateBuilder;

fn project(content: &str) -> ProjectState {
    ProjectStateBuilder::new()
        .file("/index.js", content)
        .file("/package.json", "{}")
        .build()
}

#[test]
fn directory_store_survives_a_restart() {
    common::init_tracing();
    let tmp = tempfile::tempdir().unwrap();
    let open = || {
        PersistenceStore::new(
            Arc::new(DirectoryBackend::new(tmp.path().join("data"))),
            Arc::new(DirectoryBackend::new(tmp.path().join("fallback"))),
            5,
        )
    };

    {
        let store = open();
        store.save(&project("v1")).unwrap();
        store.save(&project("v2")).unwrap();
    }

    let store = open();
    assert_eq!(store.load(), Some(project("v2")));
    assert_eq!(store.load_previous(), Some(project("v1")));
    assert_eq!(store.history().len(), 2);
    assert!(tmp.path().join("fallback").is_dir());
}

#[test]
fn fallback_copy_is_used_when_durable_data_is_gone() {
    let durable = MemoryBackend::new();
    let fallback = MemoryBackend::new();
    let store = PersistenceStore::new(Arc::new(durable.clone()), Arc::new(fallback.clone()), 5);
    store.save(&project("a")).unwrap();
    store.save(&project("b")).unwrap();

    durable.insert_raw(CURRENT_KEY, "garbage");
    durable.insert_raw(HISTORY_KEY, "garbage");

    assert_eq!(store.load(), Some(project("b")));
    assert_eq!(store.load_previous(), Some(project("a")));
}

#[test]
fn rollback_persists_only_when_saved() {
    let store = PersistenceStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
        10,
    );
    store.save(&project("a")).unwrap();
    store.save(&project("b")).unwrap();

    let previous = store.load_previous().unwrap();
    assert_eq!(store.load(), Some(project("b")));

    store.save(&previous).unwrap();
    assert_eq!(store.load(), Some(project("a")));
    // The rollback is itself a new snapshot.
    assert_eq!(store.history().len(), 3);
    assert_eq!(store.load_previous(), Some(project("b")));
}

#[test]
fn empty_storage_loads_nothing() {
    let store = PersistenceStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
        10,
    );
    assert_eq!(store.load(), None);
    assert_eq!(store.load_previous(), None);
    assert!(store.history().is_empty());
}

#[test]
fn snapshot_ids_identify_content() {
    let durable = MemoryBackend::new();
    let store = PersistenceStore::new(Arc::new(durable.clone()), Arc::new(MemoryBackend::new()), 10);
    store.save(&project("a")).unwrap();
    store.save(&project("b")).unwrap();
    store.save(&project("a")).unwrap();

    let history = store.history();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].id, history[2].id);
    assert_ne!(history[0].id, history[1].id);
    assert!(history[0].timestamp <= history[2].timestamp);

    let raw = durable.get(HISTORY_KEY).unwrap().unwrap();
    assert!(raw.contains(&history[1].id));
}

#[test]
fn eleventh_save_evicts_the_first() {
    let store = PersistenceStore::new(
        Arc::new(MemoryBackend::new()),
        Arc::new(MemoryBackend::new()),
        10,
    );
    for i in 0..11 {
        store.save(&project(&format!("v{i}"))).unwrap();
    }

    let history = store.history();
    assert_eq!(history.len(), 10);
    assert_eq!(history[0].state, project("v1"));
    assert!(history.iter().all(|s| s.state != project("v0")));
    assert_eq!(store.load_previous(), Some(project("v9")));
}

proptest! {
    #[test]
    fn history_is_bounded_and_never_repeats_adjacent_states(
        limit in 1usize..6,
        saves in proptest::collection::vec(0u8..4, 1..30),
    ) {
        let store = PersistenceStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            limit,
        );
        for v in &saves {
            store.save(&project(&v.to_string())).unwrap();
        }

        let history = store.history();
        prop_assert!(history.len() <= limit);
        prop_assert!(!history.is_empty());
        for pair in history.windows(2) {
            prop_assert_ne!(&pair[0].state, &pair[1].state);
        }

        let last = saves.last().unwrap().to_string();
        prop_assert_eq!(store.load(), Some(project(&last)));
        prop_assert_eq!(&history.last().unwrap().state, &project(&last));
    }

    #[test]
    fn repeating_a_save_never_grows_history(v in "[a-z]{0,8}", times in 1usize..5) {
        let store = PersistenceStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(MemoryBackend::new()),
            10,
        );
        for _ in 0..times {
            store.save(&project(&v)).unwrap();
        }
        prop_assert_eq!(store.history().len(), 1);
    }
}
