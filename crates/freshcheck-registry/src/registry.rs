//! Registry contract

use crate::ledger::{HistoryEntry, HistoryId};
use crate::records::{
    ArtifactId, ArtifactRecord, ArtifactSummary, HistoryRecord, NewArtifact, NewPrediction,
    PredictionId, PredictionRecord,
};
use async_trait::async_trait;
use freshcheck_core::Result;

/// Storage for classifier artifacts, the promotion history and recorded
/// predictions.
///
/// `store` and `promote` are serialized by every implementation; readers of
/// [`active_artifact`](ModelRegistry::active_artifact) observe either the
/// previous or the new active artifact, never an intermediate state.
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Persist an artifact under a fresh id
    async fn store(&self, artifact: NewArtifact) -> Result<ArtifactId>;

    /// Fetch a stored artifact; `NotFound` if absent
    async fn artifact(&self, id: ArtifactId) -> Result<ArtifactRecord>;

    /// Summaries of all stored artifacts, by id
    async fn artifacts(&self) -> Result<Vec<ArtifactSummary>>;

    /// Remove an artifact. Returns whether it existed.
    ///
    /// History entries referencing it are kept.
    async fn erase(&self, id: ArtifactId) -> Result<bool>;

    /// Append a history entry making `id` the active artifact; `NotFound`
    /// (and no entry) if the artifact is absent
    async fn promote(&self, id: ArtifactId) -> Result<HistoryEntry>;

    /// All history entries, oldest first
    async fn history(&self) -> Result<Vec<HistoryRecord>>;

    /// One history entry; `NotFound` if absent
    async fn history_entry(&self, id: HistoryId) -> Result<HistoryRecord>;

    /// Artifact referenced by the latest history entry, if any and not erased
    async fn active_artifact(&self) -> Result<Option<ArtifactRecord>>;

    /// Check the history hash chain
    async fn verify_history(&self) -> Result<bool>;

    /// Record a classification result
    async fn record_prediction(&self, prediction: NewPrediction) -> Result<PredictionId>;

    /// Fetch a recorded prediction; `NotFound` if absent
    async fn prediction(&self, id: PredictionId) -> Result<PredictionRecord>;

    /// All recorded predictions, by id
    async fn predictions(&self) -> Result<Vec<PredictionRecord>>;
}
