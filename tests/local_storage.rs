//! SQLite-backed local storage, alone and behind the hybrid store.

use policy_sim::config::Config;
use policy_sim::sqlite_storage::SqliteLocalStorage;
use policy_sim_core::hybrid::{analysis_key, HybridStore, SyncStatus, SIMULATIONS_KEY, UPLOADS_KEY};
use policy_sim_core::models::{
    AnalysisResult, SimulationResult, SimulationStatus, UploadStatus, UploadedFile,
};
use policy_sim_core::store::memory::{InMemoryRemoteStore, StaticSession};
use policy_sim_core::store::LocalStorage;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let mut cfg = Config::minimal();
    cfg.local.path = tmp.path().join("data").join("lps.sqlite");
    cfg
}

fn sim(id: &str, scenario: &str) -> SimulationResult {
    SimulationResult {
        id: id.to_string(),
        policy_id: 1,
        scenario_name: scenario.to_string(),
        created_at: "2024-01-01T00:00:00Z".to_string(),
        status: SimulationStatus::Draft,
        data: json!({}),
        user_id: None,
    }
}

fn upload(id: i64, name: &str) -> UploadedFile {
    UploadedFile {
        id,
        name: name.to_string(),
        source: String::new(),
        size: "1.0 KB".to_string(),
        status: UploadStatus::Parsed,
    }
}

#[tokio::test]
async fn test_get_set_remove() {
    let tmp = TempDir::new().unwrap();
    let storage = SqliteLocalStorage::open(&test_config(&tmp)).await.unwrap();

    assert_eq!(storage.get_item("k").await.unwrap(), None);
    storage.set_item("k", "one").await.unwrap();
    storage.set_item("k", "two").await.unwrap();
    assert_eq!(storage.get_item("k").await.unwrap().as_deref(), Some("two"));

    storage.remove_item("k").await.unwrap();
    storage.remove_item("k").await.unwrap();
    assert_eq!(storage.get_item("k").await.unwrap(), None);
}

#[tokio::test]
async fn test_data_survives_reconnect() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);

    {
        let store = HybridStore::new(Arc::new(SqliteLocalStorage::open(&cfg).await.unwrap()));
        store.save_simulation(&sim("a", "Baseline")).await;
        store.save_upload(&upload(1, "Act.pdf")).await;
    }

    let store = HybridStore::new(Arc::new(SqliteLocalStorage::open(&cfg).await.unwrap()));
    let sims = store.list_simulations().await.into_value();
    assert_eq!(sims.len(), 1);
    assert_eq!(sims[0].scenario_name, "Baseline");
    assert_eq!(store.list_uploads().await.into_value().len(), 1);
}

#[tokio::test]
async fn test_guest_ordering_and_upsert() {
    let tmp = TempDir::new().unwrap();
    let local = Arc::new(SqliteLocalStorage::open(&test_config(&tmp)).await.unwrap());
    let remote = Arc::new(InMemoryRemoteStore::new());
    let store = HybridStore::new(local.clone())
        .with_remote(remote.clone(), Arc::new(StaticSession::guest()));

    for id in ["a", "b", "c"] {
        let outcome = store.save_simulation(&sim(id, "first")).await;
        assert_eq!(outcome.sync, SyncStatus::Local);
    }
    store.save_simulation(&sim("b", "second")).await;

    let sims = store.list_simulations().await.into_value();
    let ids: Vec<_> = sims.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);
    assert_eq!(sims[1].scenario_name, "second");
    assert_eq!(remote.write_count(), 0);

    let raw = local.get_item(SIMULATIONS_KEY).await.unwrap().unwrap();
    assert!(raw.contains("\"scenarioName\":\"second\""));
}

#[tokio::test]
async fn test_corrupt_collections_read_as_empty() {
    let tmp = TempDir::new().unwrap();
    let local = Arc::new(SqliteLocalStorage::open(&test_config(&tmp)).await.unwrap());
    local.set_item(SIMULATIONS_KEY, "{not json").await.unwrap();
    local.set_item(UPLOADS_KEY, "42").await.unwrap();
    local.set_item(&analysis_key("Act.pdf"), "[]").await.unwrap();

    let store = HybridStore::new(local);
    assert!(store.list_simulations().await.into_value().is_empty());
    assert!(store.list_uploads().await.into_value().is_empty());
    assert!(store.get_analysis("Act.pdf").await.into_value().is_none());

    // A write replaces the corrupt value.
    store.save_simulation(&sim("a", "fresh")).await;
    assert_eq!(store.list_simulations().await.into_value().len(), 1);
}

#[tokio::test]
async fn test_upload_dedup_and_delete() {
    let tmp = TempDir::new().unwrap();
    let store = HybridStore::new(Arc::new(
        SqliteLocalStorage::open(&test_config(&tmp)).await.unwrap(),
    ));

    assert!(store.save_upload(&upload(1, "Act.pdf")).await.into_value());
    assert!(!store.save_upload(&upload(2, "Act.pdf")).await.into_value());
    let uploads = store.list_uploads().await.into_value();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].id, 1);

    store.delete_upload(99).await;
    assert_eq!(store.list_uploads().await.into_value().len(), 1);
    store.delete_upload(1).await;
    assert!(store.list_uploads().await.into_value().is_empty());
}

#[tokio::test]
async fn test_analysis_overwrite() {
    let tmp = TempDir::new().unwrap();
    let store = HybridStore::new(Arc::new(
        SqliteLocalStorage::open(&test_config(&tmp)).await.unwrap(),
    ));

    for version in [1, 2] {
        store
            .save_analysis(&AnalysisResult {
                file_name: "Act.pdf".to_string(),
                data: json!({ "version": version }),
                timestamp: format!("2024-01-0{}T00:00:00Z", version),
            })
            .await;
    }

    let cached = store.get_analysis("Act.pdf").await.into_value().unwrap();
    assert_eq!(cached.data["version"], 2);
    assert!(store.get_analysis("act.pdf").await.into_value().is_none());
    // Not signed in anywhere: the remote history is empty.
    assert!(store.list_analyses().await.into_value().is_empty());
}
