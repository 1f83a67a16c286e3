//! In-memory registry

use crate::ledger::{HistoryEntry, HistoryId};
use crate::records::{
    ArtifactId, ArtifactRecord, ArtifactSummary, HistoryRecord, NewArtifact, NewPrediction,
    PredictionId, PredictionRecord,
};
use crate::registry::ModelRegistry;
use crate::state::RegistryState;
use async_trait::async_trait;
use freshcheck_core::Result;
use parking_lot::RwLock;
use tracing::info;

/// Registry held entirely in memory. Every mutation happens under one write
/// lock, so store and promote are atomic.
#[derive(Debug)]
pub struct InMemoryRegistry {
    state: RwLock<RegistryState>,
}

impl InMemoryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::new()),
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelRegistry for InMemoryRegistry {
    async fn store(&self, artifact: NewArtifact) -> Result<ArtifactId> {
        let mut state = self.state.write();
        let record = state.prepare_artifact(artifact);
        let id = record.id;
        info!(artifact_id = id, name = %record.name, kind = %record.artifact.kind(), "Stored artifact");
        state.insert_artifact(record);
        Ok(id)
    }

    async fn artifact(&self, id: ArtifactId) -> Result<ArtifactRecord> {
        self.state.read().artifact(id)
    }

    async fn artifacts(&self) -> Result<Vec<ArtifactSummary>> {
        Ok(self.state.read().artifacts())
    }

    async fn erase(&self, id: ArtifactId) -> Result<bool> {
        let erased = self.state.write().remove_artifact(id);
        if erased {
            info!(artifact_id = id, "Erased artifact");
        }
        Ok(erased)
    }

    async fn promote(&self, id: ArtifactId) -> Result<HistoryEntry> {
        let mut state = self.state.write();
        let entry = state.prepare_promotion(id)?;
        state.push_history(entry.clone());
        info!(history_id = entry.id, artifact_id = id, "Promoted artifact");
        Ok(entry)
    }

    async fn history(&self) -> Result<Vec<HistoryRecord>> {
        Ok(self.state.read().history())
    }

    async fn history_entry(&self, id: HistoryId) -> Result<HistoryRecord> {
        self.state.read().history_entry(id)
    }

    async fn active_artifact(&self) -> Result<Option<ArtifactRecord>> {
        Ok(self.state.read().active_artifact())
    }

    async fn verify_history(&self) -> Result<bool> {
        Ok(self.state.read().verify_history())
    }

    async fn record_prediction(&self, prediction: NewPrediction) -> Result<PredictionId> {
        let mut state = self.state.write();
        let record = state.prepare_prediction(prediction);
        let id = record.id;
        state.insert_prediction(record);
        Ok(id)
    }

    async fn prediction(&self, id: PredictionId) -> Result<PredictionRecord> {
        self.state.read().prediction(id)
    }

    async fn predictions(&self) -> Result<Vec<PredictionRecord>> {
        Ok(self.state.read().predictions())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshcheck_classifiers::{ClassifierArtifact, LabelMap};
    use freshcheck_core::{BackendKind, Error, Prediction};

    fn artifact(name: &str) -> NewArtifact {
        let labels = LabelMap::from_labels(["freshApple", "rottenApple"]).unwrap();
        NewArtifact::new(name, ClassifierArtifact::baseline(labels))
    }

    #[tokio::test]
    async fn test_store_assigns_increasing_ids() {
        let registry = InMemoryRegistry::new();
        let a = registry.store(artifact("a")).await.unwrap();
        let b = registry.store(artifact("b")).await.unwrap();
        assert!(b > a);

        let names: Vec<String> = registry
            .artifacts()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_erase() {
        let registry = InMemoryRegistry::new();
        let a = registry.store(artifact("a")).await.unwrap();
        assert!(registry.erase(a).await.unwrap());
        assert!(!registry.erase(a).await.unwrap());

        let b = registry.store(artifact("b")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_promote_missing_creates_no_entry() {
        let registry = InMemoryRegistry::new();
        let err = registry.promote(42).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(registry.history().await.unwrap().is_empty());
        assert!(registry.active_artifact().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_erased_active_resolves_to_none() {
        let registry = InMemoryRegistry::new();
        let a = registry.store(artifact("a")).await.unwrap();
        let b = registry.store(artifact("b")).await.unwrap();
        registry.promote(a).await.unwrap();
        registry.promote(b).await.unwrap();

        assert!(registry.erase(b).await.unwrap());
        assert!(registry.active_artifact().await.unwrap().is_none());

        let history = registry.history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[0].artifact.is_some());
        assert!(history[1].artifact.is_none());
        assert_eq!(history[1].entry.artifact_id, b);
    }

    #[tokio::test]
    async fn test_predictions_recorded() {
        let registry = InMemoryRegistry::new();
        let id = registry
            .record_prediction(NewPrediction {
                image: vec![1, 2, 3],
                prediction: Prediction::new("Apple", true),
                kind: BackendKind::Baseline,
            })
            .await
            .unwrap();

        let record = registry.prediction(id).await.unwrap();
        assert_eq!(record.prediction(), Prediction::new("Apple", true));
        assert_eq!(record.image, vec![1, 2, 3]);
        assert_eq!(registry.predictions().await.unwrap().len(), 1);
        assert!(matches!(
            registry.prediction(id + 1).await,
            Err(Error::NotFound(_))
        ));
    }
}
