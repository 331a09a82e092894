//! End-to-end behaviour of the buffer engine through its public surface

use cs_buffer::{BufferConfig, BufferDocument, BufferManager, SuppressionDecision};
use cs_core::{DebugOptions, MockClock};
use cs_event_bus::EventBus;
use cs_storage::{DocumentStore, JsonStore, MemoryStore, Storable, Storage, StorageFile};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn manager_with(store: Arc<dyn DocumentStore<BufferDocument>>) -> BufferManager {
    BufferManager::new(
        BufferConfig::default(),
        store,
        Arc::new(EventBus::new()),
        Arc::new(MockClock::new()),
        DebugOptions::all(),
    )
}

fn memory_manager() -> (BufferManager, Arc<MemoryStore<BufferDocument>>) {
    let store = Arc::new(MemoryStore::<BufferDocument>::new(BufferDocument::KEY));
    (manager_with(store.clone()), store)
}

#[tokio::test]
async fn test_close_enough_is_suppressed() {
    let (manager, _) = memory_manager();
    manager
        .record_manual_change("climate.living_room", &json!(19.5))
        .await
        .unwrap();

    assert!(manager.should_suppress_change("climate.living_room", 20.0, None, false));
}

#[tokio::test]
async fn test_far_off_is_applied() {
    let (manager, _) = memory_manager();
    manager
        .record_manual_change("climate.living_room", &json!(17.0))
        .await
        .unwrap();

    assert!(!manager.should_suppress_change("climate.living_room", 20.0, None, false));
    assert!(matches!(
        manager.evaluate_suppression("climate.living_room", 20.0, None, false),
        SuppressionDecision::Apply { delta, tolerance } if delta == 3.0 && tolerance == 2.0
    ));
}

#[tokio::test]
async fn test_slot_override_wins_and_malformed_falls_through() {
    let (manager, _) = memory_manager();
    manager
        .record_scheduled_change("climate.living_room", &json!(19.0))
        .await
        .unwrap();

    // global tolerance 2.0 would suppress a 1.5 step, a tight slot buffer applies it
    let tight = json!({"time_minutes": 10, "value_delta": 0.5});
    assert!(manager.should_suppress_change("climate.living_room", 20.5, None, false));
    assert!(!manager.should_suppress_change("climate.living_room", 20.5, Some(&tight), false));

    let malformed = json!({"time_minutes": "soon", "value_delta": 0.5});
    assert!(manager.should_suppress_change("climate.living_room", 20.5, Some(&malformed), false));

    let disabled_slot = json!({"time_minutes": 10, "value_delta": 5.0, "enabled": false});
    assert_eq!(
        manager.evaluate_suppression("climate.living_room", 20.5, Some(&disabled_slot), false),
        SuppressionDecision::Disabled
    );
}

#[tokio::test]
async fn test_repair_drops_invalid_overrides() {
    let doc: BufferDocument = serde_json::from_value(json!({
        "global": {"time_minutes": 15, "value_delta": 2.0},
        "entities": {
            "climate.office": {"time_minutes": 30, "value_delta": 1.0},
            "climate.attic": {"time_minutes": 30, "value_delta": -4}
        }
    }))
    .unwrap();
    let store = Arc::new(MemoryStore::with_document(BufferDocument::KEY, doc));
    let manager = manager_with(store.clone());
    manager.load().await;
    manager
        .record_manual_change("climate.attic", &json!(18))
        .await
        .unwrap();

    // the invalid override is ignored at decision time already
    assert_eq!(manager.history("climate.attic").unwrap().config.value_delta, 2.0);

    let report = manager.repair().await.unwrap();
    assert_eq!(report.removed_overrides, vec!["climate.attic".to_string()]);
    assert_eq!(report.refreshed_histories, 1);

    let saved = store.snapshot().unwrap();
    assert!(saved.settings.entities.contains_key("climate.office"));
    assert!(!saved.settings.entities.contains_key("climate.attic"));
}

#[tokio::test]
async fn test_repair_report_survives_save_failure() {
    let doc: BufferDocument = serde_json::from_value(json!({
        "global": {"time_minutes": 15, "value_delta": 2.0},
        "entities": {
            "climate.attic": {"time_minutes": 30, "value_delta": -4}
        }
    }))
    .unwrap();
    let store = Arc::new(MemoryStore::with_document(BufferDocument::KEY, doc));
    let manager = manager_with(store.clone());
    manager.load().await;
    let saves = store.save_count();

    store.set_fail_saves(true);
    let report = manager.repair().await.unwrap();
    assert_eq!(report.removed_overrides, vec!["climate.attic".to_string()]);
    assert_eq!(report.refreshed_histories, 0);

    assert!(manager.entity_overrides().is_empty());
    assert_eq!(store.save_count(), saves);
    let stored = store.snapshot().unwrap();
    assert!(stored.settings.entities.contains_key("climate.attic"));
}

#[tokio::test]
async fn test_clear_history() {
    let (manager, _) = memory_manager();
    manager
        .record_manual_change("climate.office", &json!(21))
        .await
        .unwrap();

    assert!(manager.clear_history("climate.office").await.unwrap());
    assert!(manager.history("climate.office").is_none());
    assert!(!manager.clear_history("climate.office").await.unwrap());
    assert!(!manager.should_suppress_change("climate.office", 21.0, None, false));
}

#[tokio::test]
async fn test_legacy_file_is_read_into_global() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::new(dir.path());
    storage
        .write(&StorageFile::new(
            BufferDocument::KEY,
            json!({"buffer_time_minutes": 60, "buffer_value_delta": 0.5, "buffer_enabled": true}),
            1,
            1,
        ))
        .await
        .unwrap();

    let manager = manager_with(Arc::new(JsonStore::<BufferDocument>::new(storage.clone())));
    manager.load().await;
    let global = manager.global_config();
    assert_eq!(global.time_minutes, 60);
    assert_eq!(global.value_delta, 0.5);

    // the next save writes the canonical shape
    manager
        .record_manual_change("climate.office", &json!(20))
        .await
        .unwrap();
    let raw: StorageFile<serde_json::Value> =
        storage.read(BufferDocument::KEY).await.unwrap().unwrap();
    assert!(raw.data.get("global").is_some());
    assert!(raw.data.get("buffer_time_minutes").is_none());
}

#[tokio::test]
async fn test_unreadable_store_keeps_defaults() {
    let (manager, store) = memory_manager();
    store.set_fail_loads(true);
    manager.load().await;
    assert_eq!(manager.global_config(), BufferConfig::default());
}
