//! Registry contract tests, run against every implementation

use freshcheck_classifiers::{ClassifierArtifact, LabelMap};
use freshcheck_core::Error;
use freshcheck_registry::{FileRegistry, InMemoryRegistry, ModelRegistry, NewArtifact};
use std::sync::Arc;
use tempfile::TempDir;

fn artifact(name: &str) -> NewArtifact {
    let labels = LabelMap::from_labels(["freshApple", "rottenApple"]).unwrap();
    NewArtifact::new(name, ClassifierArtifact::baseline(labels))
}

async fn check_store_without_promote_keeps_active(registry: &dyn ModelRegistry) {
    let a = registry.store(artifact("a")).await.unwrap();
    registry.promote(a).await.unwrap();
    let b = registry.store(artifact("b")).await.unwrap();

    let active = registry.active_artifact().await.unwrap().unwrap();
    assert_eq!(active.id, a);
    assert_ne!(active.id, b);
}

async fn check_promotion_keeps_history(registry: &dyn ModelRegistry) {
    let a = registry.store(artifact("a")).await.unwrap();
    let b = registry.store(artifact("b")).await.unwrap();
    let first = registry.promote(a).await.unwrap();
    let second = registry.promote(b).await.unwrap();

    let active = registry.active_artifact().await.unwrap().unwrap();
    assert_eq!(active.id, b);

    let first_record = registry.history_entry(first.id).await.unwrap();
    let second_record = registry.history_entry(second.id).await.unwrap();
    assert_eq!(first_record.entry, first);
    assert_eq!(second_record.entry, second);
    assert_eq!(first_record.artifact.map(|s| s.name), Some("a".to_string()));
    assert!(second.selected_at >= first.selected_at);

    let history = registry.history().await.unwrap();
    assert_eq!(history.len(), 2);
    assert!(registry.verify_history().await.unwrap());
}

async fn check_not_found(registry: &dyn ModelRegistry) {
    assert!(matches!(registry.artifact(99).await, Err(Error::NotFound(_))));
    assert!(matches!(registry.promote(99).await, Err(Error::NotFound(_))));
    assert!(matches!(registry.history_entry(99).await, Err(Error::NotFound(_))));
    assert!(!registry.erase(99).await.unwrap());
    assert!(registry.active_artifact().await.unwrap().is_none());
}

async fn check_stored_artifact_unchanged(registry: &dyn ModelRegistry) {
    let original = artifact("a");
    let id = registry.store(original.clone()).await.unwrap();
    let stored = registry.artifact(id).await.unwrap();
    assert_eq!(stored.artifact, original.artifact);
    assert_eq!(stored.performance, 0.0);
}

async fn check_concurrent_promotions(registry: Arc<dyn ModelRegistry>) {
    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(registry.store(artifact(&format!("m{}", i))).await.unwrap());
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|id| {
            let registry = registry.clone();
            let id = *id;
            tokio::spawn(async move { registry.promote(id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let history = registry.history().await.unwrap();
    assert_eq!(history.len(), 8);
    assert!(registry.verify_history().await.unwrap());
    let history_ids: Vec<u64> = history.iter().map(|r| r.entry.id).collect();
    assert_eq!(history_ids, (1..=8).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_in_memory_contract() {
    check_store_without_promote_keeps_active(&InMemoryRegistry::new()).await;
    check_promotion_keeps_history(&InMemoryRegistry::new()).await;
    check_not_found(&InMemoryRegistry::new()).await;
    check_stored_artifact_unchanged(&InMemoryRegistry::new()).await;
}

#[tokio::test]
async fn test_file_contract() {
    for check in 0..4 {
        let temp_dir = TempDir::new().unwrap();
        let registry = FileRegistry::open(temp_dir.path()).await.unwrap();
        match check {
            0 => check_store_without_promote_keeps_active(&registry).await,
            1 => check_promotion_keeps_history(&registry).await,
            2 => check_not_found(&registry).await,
            _ => check_stored_artifact_unchanged(&registry).await,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_promotions_in_memory() {
    check_concurrent_promotions(Arc::new(InMemoryRegistry::new())).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_promotions_file() {
    let temp_dir = TempDir::new().unwrap();
    let registry = FileRegistry::open(temp_dir.path()).await.unwrap();
    check_concurrent_promotions(Arc::new(registry)).await;
}
