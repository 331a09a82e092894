use cs_storage::{DocumentStore, JsonStore, SharedStore, Storable, Storage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::TempDir;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Setpoints {
    #[serde(default)]
    office: f64,
}

impl Storable for Setpoints {
    const KEY: &'static str = "test.setpoints";
    const VERSION: u32 = 1;
    const MINOR_VERSION: u32 = 1;
}

#[tokio::test]
async fn test_json_store_through_trait_object() {
    let temp_dir = TempDir::new().unwrap();
    let store: SharedStore<Setpoints> = Arc::new(JsonStore::new(Storage::new(temp_dir.path())));

    assert_eq!(store.load().await.unwrap(), None);

    store.save(&Setpoints { office: 20.5 }).await.unwrap();
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.office, 20.5);
}

#[tokio::test]
async fn test_file_layout() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(temp_dir.path());
    let store = JsonStore::<Setpoints>::new(storage.clone());
    store.save(&Setpoints { office: 19.0 }).await.unwrap();

    let raw = std::fs::read_to_string(temp_dir.path().join(".storage/test.setpoints")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(json["key"], "test.setpoints");
    assert_eq!(json["version"], 1);
    assert_eq!(json["data"]["office"], 19.0);
}

#[tokio::test]
async fn test_key_mismatch_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::new(temp_dir.path());
    std::fs::create_dir_all(storage.storage_dir()).unwrap();
    std::fs::write(
        storage.file_path(Setpoints::KEY),
        r#"{"version": 1, "minor_version": 1, "key": "other", "data": {}}"#,
    )
    .unwrap();

    let store = JsonStore::<Setpoints>::new(storage);
    assert!(matches!(
        store.load().await,
        Err(cs_storage::StorageError::KeyMismatch { .. })
    ));
}
