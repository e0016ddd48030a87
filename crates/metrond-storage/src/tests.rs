use metrond_common::metric::{Metric, MetricType};

use crate::{snapshot, MemStorage, Storage};

#[tokio::test]
async fn mem_insert_then_get() {
    let storage = MemStorage::new();
    storage
        .insert(vec![Metric::gauge("Alloc", 200.0)])
        .await
        .unwrap();

    let found = storage.get("Alloc", MetricType::Gauge).await.unwrap();
    assert_eq!(found, Some(Metric::gauge("Alloc", 200.0)));
}

#[tokio::test]
async fn mem_get_with_wrong_type_yields_none() {
    let storage = MemStorage::new();
    storage
        .insert(vec![Metric::gauge("Alloc", 200.0)])
        .await
        .unwrap();

    assert_eq!(storage.get("Alloc", MetricType::Counter).await.unwrap(), None);
    assert_eq!(storage.get("Missing", MetricType::Gauge).await.unwrap(), None);
}

#[tokio::test]
async fn mem_update_replaces_the_stored_metric() {
    let storage = MemStorage::new();
    storage
        .insert(vec![Metric::counter("C", 5)])
        .await
        .unwrap();
    storage
        .update(vec![Metric::counter("C", 12)])
        .await
        .unwrap();

    let found = storage.get("C", MetricType::Counter).await.unwrap().unwrap();
    assert_eq!(found.delta, Some(12));
}

#[tokio::test]
async fn mem_get_by_ids_returns_only_known_keys() {
    let storage = MemStorage::new();
    storage
        .insert(vec![Metric::gauge("A", 1.0), Metric::counter("B", 2)])
        .await
        .unwrap();

    let ids = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    let found = storage.get_by_ids(&ids).await.unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.contains_key("A"));
    assert!(found.contains_key("B"));
}

#[tokio::test]
async fn mem_get_all_returns_everything() {
    let storage = MemStorage::new();
    storage
        .insert(vec![Metric::gauge("A", 1.0), Metric::counter("B", 2)])
        .await
        .unwrap();

    let mut all = storage.get_all().await.unwrap();
    all.sort_by(|a, b| a.id.cmp(&b.id));
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].id, "A");
    assert_eq!(all[1].id, "B");
}

#[test]
fn snapshot_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let path = path.to_str().unwrap();

    let metrics = vec![Metric::gauge("Alloc", 1.5), Metric::counter("PollCount", 3)];
    snapshot::save(path, &metrics).unwrap();

    let restored = snapshot::load(path).unwrap().unwrap();
    assert_eq!(restored, metrics);
}

#[test]
fn snapshot_load_of_missing_file_is_a_noop() {
    assert!(snapshot::load("/nonexistent/metrics.json")
        .unwrap()
        .is_none());
}

#[test]
fn snapshot_save_truncates_previous_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metrics.json");
    let path = path.to_str().unwrap();

    snapshot::save(path, &vec![Metric::gauge("A", 1.0); 100]).unwrap();
    snapshot::save(path, &[Metric::gauge("B", 2.0)]).unwrap();

    let restored = snapshot::load(path).unwrap().unwrap();
    assert_eq!(restored.len(), 1);
    assert_eq!(restored[0].id, "B");
}
