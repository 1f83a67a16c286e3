//! In-memory registry state shared by the registry implementations

use crate::ledger::{HistoryEntry, HistoryId, VersionLedger};
use crate::records::{
    ArtifactId, ArtifactRecord, ArtifactSummary, HistoryRecord, NewArtifact, NewPrediction,
    PredictionId, PredictionRecord,
};
use freshcheck_core::{Error, Result};
use std::collections::BTreeMap;

/// Artifacts, version ledger and predictions.
///
/// Ids are allocated monotonically and never reused, even after an erase.
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    artifacts: BTreeMap<ArtifactId, ArtifactRecord>,
    ledger: VersionLedger,
    predictions: BTreeMap<PredictionId, PredictionRecord>,
    next_artifact_id: ArtifactId,
    next_prediction_id: PredictionId,
}

impl RegistryState {
    pub(crate) fn new() -> Self {
        Self {
            next_artifact_id: 1,
            next_prediction_id: 1,
            ..Default::default()
        }
    }

    /// Rebuild state from persisted records. `retired` are ids of erased
    /// artifacts, which count towards the next id.
    pub(crate) fn restore(
        artifacts: Vec<ArtifactRecord>,
        ledger: VersionLedger,
        predictions: Vec<PredictionRecord>,
        retired: impl IntoIterator<Item = ArtifactId>,
    ) -> Self {
        let highest_artifact = artifacts
            .iter()
            .map(|record| record.id)
            .chain(ledger.entries().iter().map(|entry| entry.artifact_id))
            .chain(retired)
            .max()
            .unwrap_or(0);
        let highest_prediction = predictions.iter().map(|record| record.id).max().unwrap_or(0);

        Self {
            artifacts: artifacts.into_iter().map(|record| (record.id, record)).collect(),
            ledger,
            predictions: predictions.into_iter().map(|record| (record.id, record)).collect(),
            next_artifact_id: highest_artifact + 1,
            next_prediction_id: highest_prediction + 1,
        }
    }

    /// Build the record `store` would insert, reserving its id
    pub(crate) fn prepare_artifact(&mut self, new: NewArtifact) -> ArtifactRecord {
        let id = self.next_artifact_id;
        self.next_artifact_id += 1;
        ArtifactRecord::new(id, new)
    }

    pub(crate) fn insert_artifact(&mut self, record: ArtifactRecord) {
        self.artifacts.insert(record.id, record);
    }

    pub(crate) fn artifact(&self, id: ArtifactId) -> Result<ArtifactRecord> {
        self.artifacts
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("artifact {}", id)))
    }

    pub(crate) fn contains_artifact(&self, id: ArtifactId) -> bool {
        self.artifacts.contains_key(&id)
    }

    pub(crate) fn artifacts(&self) -> Vec<ArtifactSummary> {
        self.artifacts.values().map(ArtifactRecord::summary).collect()
    }

    pub(crate) fn remove_artifact(&mut self, id: ArtifactId) -> bool {
        self.artifacts.remove(&id).is_some()
    }

    /// Build the entry `promote` would append, failing if the artifact is absent
    pub(crate) fn prepare_promotion(&self, id: ArtifactId) -> Result<HistoryEntry> {
        if !self.contains_artifact(id) {
            return Err(Error::not_found(format!("artifact {}", id)));
        }
        Ok(self.ledger.next_entry(id))
    }

    pub(crate) fn push_history(&mut self, entry: HistoryEntry) {
        self.ledger.push(entry);
    }

    fn history_record(&self, entry: &HistoryEntry) -> HistoryRecord {
        HistoryRecord {
            entry: entry.clone(),
            artifact: self.artifacts.get(&entry.artifact_id).map(ArtifactRecord::summary),
        }
    }

    pub(crate) fn history(&self) -> Vec<HistoryRecord> {
        self.ledger
            .entries()
            .iter()
            .map(|entry| self.history_record(entry))
            .collect()
    }

    pub(crate) fn history_entry(&self, id: HistoryId) -> Result<HistoryRecord> {
        self.ledger
            .get(id)
            .map(|entry| self.history_record(entry))
            .ok_or_else(|| Error::not_found(format!("history entry {}", id)))
    }

    /// Artifact named by the latest history entry.
    ///
    /// No fallback to older entries when that artifact has been erased.
    pub(crate) fn active_artifact(&self) -> Option<ArtifactRecord> {
        let latest = self.ledger.latest()?;
        let record = self.artifacts.get(&latest.artifact_id).cloned();
        if record.is_none() {
            tracing::warn!(
                history_id = latest.id,
                artifact_id = latest.artifact_id,
                "Active artifact has been erased"
            );
        }
        record
    }

    pub(crate) fn verify_history(&self) -> bool {
        self.ledger.verify()
    }

    pub(crate) fn prepare_prediction(&mut self, new: NewPrediction) -> PredictionRecord {
        let id = self.next_prediction_id;
        self.next_prediction_id += 1;
        PredictionRecord::new(id, new)
    }

    pub(crate) fn insert_prediction(&mut self, record: PredictionRecord) {
        self.predictions.insert(record.id, record);
    }

    pub(crate) fn prediction(&self, id: PredictionId) -> Result<PredictionRecord> {
        self.predictions
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::not_found(format!("prediction {}", id)))
    }

    pub(crate) fn predictions(&self) -> Vec<PredictionRecord> {
        self.predictions.values().cloned().collect()
    }
}
