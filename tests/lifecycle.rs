//! Orchestrator lifecycle tests: load, merge, save, abort.

use std::collections::BTreeMap;

use cachegraph::{
    CachePersistence, FsStorage, IgnorePattern, InMemoryRegistry, InMemoryStorage, LiveValue,
    OrchestratorError, PersistConfig, RunState, SaveOutcome, WarnMode,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn registry() -> InMemoryRegistry {
    let mut registry = InMemoryRegistry::new();
    registry.register_fn("build.Module", "Module", BTreeMap::new);
    registry
}

fn entry(key: &str, value: LiveValue) -> (String, LiveValue) {
    (key.to_string(), value)
}

fn persistence(
    storage: InMemoryStorage,
) -> CachePersistence<InMemoryStorage, InMemoryRegistry> {
    CachePersistence::new(PersistConfig::default(), storage, registry())
}

/// A representative live cache: one instance, one plain subtree.
fn sample_cache() -> LiveValue {
    LiveValue::map([
        entry(
            "module",
            LiveValue::object("Module", [entry("id", LiveValue::int(1))]),
        ),
        entry("timestamps", LiveValue::seq(vec![LiveValue::int(10)])),
    ])
}

/// Drive a full run that saves `live` into `storage`.
async fn save_cache(storage: InMemoryStorage, live: &LiveValue) {
    let mut persistence = persistence(storage);
    persistence.on_run_start().await.unwrap();
    persistence.on_compilation_ready(live).unwrap();
    match persistence.on_run_end(live).await.unwrap() {
        SaveOutcome::Written { .. } => {}
        other => panic!("expected written save, got {:?}", other),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// COLD START AND RELOAD
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cold_start_merge_is_a_noop() {
    let mut persistence = persistence(InMemoryStorage::new());
    persistence.on_run_start().await.unwrap();

    let live = sample_cache();
    persistence.on_compilation_ready(&live).unwrap();

    assert_eq!(live.len(), 2);
    assert_eq!(persistence.stats().load_success, Some(false));
    assert!(persistence.warnings().is_empty());
}

#[tokio::test]
async fn test_save_then_reload_applies_defaults_underneath() {
    let storage = InMemoryStorage::new();
    save_cache(storage.clone(), &sample_cache()).await;
    assert!(storage.has_blob());

    // next run: live cache already has a fresher "module" entry
    let mut persistence = persistence(storage);
    persistence.on_run_start().await.unwrap();
    assert_eq!(persistence.stats().load_success, Some(true));

    let live = LiveValue::map([entry(
        "module",
        LiveValue::object("Module", [entry("id", LiveValue::int(2))]),
    )]);
    persistence.on_compilation_ready(&live).unwrap();

    // live entry wins, restored entry fills the gap
    let id = live.get("module").unwrap().get("id").unwrap();
    assert!(id.structural_eq(&LiveValue::int(2)));
    assert!(live.contains_key("timestamps"));
}

#[tokio::test]
async fn test_restored_instance_is_reinstantiated() {
    let storage = InMemoryStorage::new();
    save_cache(storage.clone(), &sample_cache()).await;

    let mut persistence = persistence(storage);
    persistence.on_run_start().await.unwrap();

    let live = LiveValue::empty_map();
    persistence.on_compilation_ready(&live).unwrap();

    let module = live.get("module").unwrap();
    assert_eq!(module.type_name(), "Module");
    assert!(module.get("id").unwrap().structural_eq(&LiveValue::int(1)));
}

// ─────────────────────────────────────────────────────────────────────────────
// LOAD DEGRADATION
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_corrupt_blob_degrades_to_cold_start() {
    let storage = InMemoryStorage::with_blob("not json at all {{{");
    let mut persistence = persistence(storage);

    persistence.on_run_start().await.unwrap();

    assert_eq!(persistence.state(), RunState::Ready);
    assert_eq!(persistence.stats().load_success, Some(false));
}

#[tokio::test]
async fn test_malformed_marker_degrades_to_cold_start() {
    let storage = InMemoryStorage::with_blob(r#"{"a": {"$ref": 42}}"#);
    let mut persistence = persistence(storage);

    persistence.on_run_start().await.unwrap();

    assert_eq!(persistence.stats().load_success, Some(false));
}

#[tokio::test]
async fn test_unknown_class_on_load_degrades_to_cold_start() {
    let storage = InMemoryStorage::new();
    save_cache(storage.clone(), &sample_cache()).await;

    // decoding process has a differently populated registry
    let mut persistence = CachePersistence::new(
        PersistConfig::default(),
        storage,
        InMemoryRegistry::new(),
    );
    persistence.on_run_start().await.unwrap();

    let live = LiveValue::empty_map();
    persistence.on_compilation_ready(&live).unwrap();

    // no partial object: the whole restore is dropped
    assert!(live.is_empty());
    assert_eq!(persistence.stats().load_success, Some(false));
}

#[tokio::test]
async fn test_unreadable_storage_degrades_to_cold_start() {
    let storage = InMemoryStorage::with_blob("{}");
    storage.set_fail_reads(true);
    let mut persistence = persistence(storage);

    persistence.on_run_start().await.unwrap();

    assert_eq!(persistence.state(), RunState::Ready);
    assert_eq!(persistence.stats().load_success, Some(false));
}

// ─────────────────────────────────────────────────────────────────────────────
// SAVE GATING
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_builtin_buffer_failures_save_silently() {
    let live = LiveValue::map([entry(
        "raw",
        LiveValue::object("Buffer", [entry("len", LiveValue::int(4))]),
    )]);

    let storage = InMemoryStorage::new();
    let mut persistence = persistence(storage.clone());
    persistence.on_run_start().await.unwrap();
    persistence.on_compilation_ready(&live).unwrap();

    match persistence.on_run_end(&live).await.unwrap() {
        SaveOutcome::Written { .. } => {}
        other => panic!("expected written save, got {:?}", other),
    }
    assert!(storage.has_blob());
    assert!(persistence.warnings().is_empty());
}

#[tokio::test]
async fn test_configured_ignore_pattern_allows_save() {
    let live = LiveValue::map([entry("odd", LiveValue::object("Mystery", []))]);

    let config = PersistConfig {
        ignore: vec![IgnorePattern::regex("Mystery$").unwrap()],
        ..PersistConfig::default()
    };
    let storage = InMemoryStorage::new();
    let mut persistence = CachePersistence::new(config, storage.clone(), registry());

    persistence.on_run_start().await.unwrap();
    persistence.on_compilation_ready(&live).unwrap();

    match persistence.on_run_end(&live).await.unwrap() {
        SaveOutcome::Written { .. } => {}
        other => panic!("expected written save, got {:?}", other),
    }
    assert!(storage.has_blob());
    assert!(persistence.warnings().is_empty());
}

#[tokio::test]
async fn test_unfiltered_failure_aborts_and_removes_stale_blob() {
    let storage = InMemoryStorage::with_blob("{}");
    let mut persistence = persistence(storage.clone());
    persistence.on_run_start().await.unwrap();

    let live = LiveValue::map([entry("odd", LiveValue::object("Mystery", []))]);
    persistence.on_compilation_ready(&live).unwrap();

    match persistence.on_run_end(&live).await.unwrap() {
        SaveOutcome::Aborted { failures } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].head(), "unknown-custom-class odd:Mystery");
        }
        other => panic!("expected aborted save, got {:?}", other),
    }

    assert!(!storage.has_blob());
    assert_eq!(persistence.state(), RunState::Aborted);
    assert_eq!(
        persistence.warnings(),
        vec!["unknown-custom-class odd:Mystery".to_string()]
    );
}

#[tokio::test]
async fn test_warnings_deduplicate_by_first_occurrence() {
    let live = LiveValue::map([
        entry(
            "x",
            LiveValue::map([entry("bad", LiveValue::object("Mystery", []))]),
        ),
        entry(
            "y",
            LiveValue::map([entry("bad", LiveValue::object("Mystery", []))]),
        ),
    ]);

    let mut persistence = persistence(InMemoryStorage::new());
    persistence.on_run_start().await.unwrap();
    persistence.on_compilation_ready(&live).unwrap();

    match persistence.on_run_end(&live).await.unwrap() {
        SaveOutcome::Aborted { failures } => assert_eq!(failures.len(), 2),
        other => panic!("expected aborted save, got {:?}", other),
    }
    assert_eq!(persistence.warnings().len(), 1);
}

#[tokio::test]
async fn test_verbose_warnings_carry_the_path_chain() {
    let live = LiveValue::map([entry(
        "outer",
        LiveValue::map([entry("bad", LiveValue::object("Mystery", []))]),
    )]);

    let config = PersistConfig {
        warn: WarnMode::Verbose,
        ..PersistConfig::default()
    };
    let mut persistence = CachePersistence::new(config, InMemoryStorage::new(), registry());
    persistence.on_run_start().await.unwrap();
    persistence.on_compilation_ready(&live).unwrap();
    persistence.on_run_end(&live).await.unwrap();

    let warnings = persistence.warnings();
    assert_eq!(warnings.len(), 1);
    assert_eq!(
        warnings[0],
        "unknown-custom-class bad:Mystery (outer:Map.bad:Mystery)"
    );
}

#[tokio::test]
async fn test_warn_off_still_aborts_silently() {
    let storage = InMemoryStorage::with_blob("{}");
    let config = PersistConfig {
        warn: WarnMode::Off,
        ..PersistConfig::default()
    };
    let mut persistence = CachePersistence::new(config, storage.clone(), registry());
    persistence.on_run_start().await.unwrap();

    let live = LiveValue::map([entry("odd", LiveValue::object("Mystery", []))]);
    persistence.on_compilation_ready(&live).unwrap();

    match persistence.on_run_end(&live).await.unwrap() {
        SaveOutcome::Aborted { .. } => {}
        other => panic!("expected aborted save, got {:?}", other),
    }
    assert!(!storage.has_blob());
    assert!(persistence.warnings().is_empty());
}

#[tokio::test]
async fn test_persist_disabled_skips_save() {
    let storage = InMemoryStorage::with_blob("{\"keep\": 1}");
    let config = PersistConfig {
        persist: false,
        ..PersistConfig::default()
    };
    let mut persistence = CachePersistence::new(config, storage.clone(), registry());

    persistence.on_run_start().await.unwrap();
    let live = sample_cache();
    persistence.on_compilation_ready(&live).unwrap();

    match persistence.on_run_end(&live).await.unwrap() {
        SaveOutcome::Disabled => {}
        other => panic!("expected disabled save, got {:?}", other),
    }
    // existing blob untouched
    assert_eq!(storage.blob().as_deref(), Some("{\"keep\": 1}"));
}

#[tokio::test]
async fn test_save_write_failure_is_reported() {
    let storage = InMemoryStorage::new();
    storage.set_fail_writes(true);
    let mut persistence = persistence(storage);
    persistence.on_run_start().await.unwrap();

    let live = sample_cache();
    persistence.on_compilation_ready(&live).unwrap();

    let err = persistence.on_run_end(&live).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Storage(_)));
    assert_eq!(persistence.stats().save_success, Some(false));
    assert_eq!(persistence.state(), RunState::Idle);
}

// ─────────────────────────────────────────────────────────────────────────────
// STATE MACHINE
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_hooks_out_of_order_are_rejected() {
    let mut persistence = persistence(InMemoryStorage::new());
    let live = sample_cache();

    assert!(matches!(
        persistence.on_run_end(&live).await,
        Err(OrchestratorError::InvalidState { .. })
    ));
    assert!(persistence.on_compilation_ready(&live).is_err());

    persistence.on_run_start().await.unwrap();
    assert!(matches!(
        persistence.on_run_start().await,
        Err(OrchestratorError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_aborted_state_is_terminal() {
    let mut persistence = persistence(InMemoryStorage::new());
    persistence.on_run_start().await.unwrap();

    let live = LiveValue::map([entry("odd", LiveValue::object("Mystery", []))]);
    persistence.on_compilation_ready(&live).unwrap();
    persistence.on_run_end(&live).await.unwrap();
    assert_eq!(persistence.state(), RunState::Aborted);

    assert!(persistence.on_run_start().await.is_err());
}

#[tokio::test]
async fn test_repeated_runs_share_one_orchestrator() {
    let storage = InMemoryStorage::new();
    let mut persistence = persistence(storage.clone());

    for id in 0..3 {
        persistence.on_run_start().await.unwrap();
        let live = LiveValue::map([entry(
            "module",
            LiveValue::object("Module", [entry("id", LiveValue::int(id))]),
        )]);
        persistence.on_compilation_ready(&live).unwrap();
        persistence.on_run_end(&live).await.unwrap();
        assert_eq!(persistence.state(), RunState::Idle);
    }
    assert!(storage.has_blob());
}

// ─────────────────────────────────────────────────────────────────────────────
// FILESYSTEM BACKEND
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fs_backed_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache.json");
    let config = PersistConfig {
        file: file.clone(),
        ..PersistConfig::default()
    };

    let mut first = CachePersistence::from_config(config.clone(), registry());
    first.on_run_start().await.unwrap();
    let live = sample_cache();
    first.on_compilation_ready(&live).unwrap();
    first.on_run_end(&live).await.unwrap();
    assert!(file.exists());

    let mut second = CachePersistence::from_config(config, registry());
    second.on_run_start().await.unwrap();
    let next = LiveValue::empty_map();
    second.on_compilation_ready(&next).unwrap();

    assert!(next.get("module").unwrap().structural_eq(&live.get("module").unwrap()));
}

#[tokio::test]
async fn test_fs_backed_abort_removes_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache.json");
    std::fs::write(&file, "{}").unwrap();

    let config = PersistConfig {
        file: file.clone(),
        ..PersistConfig::default()
    };
    let mut persistence = CachePersistence::new(config, FsStorage::new(&file), registry());
    persistence.on_run_start().await.unwrap();

    let live = LiveValue::map([entry("odd", LiveValue::object("Mystery", []))]);
    persistence.on_compilation_ready(&live).unwrap();
    persistence.on_run_end(&live).await.unwrap();

    assert!(!file.exists());
}
