//! File-backed registry
//!
//! Layout under the registry root:
//! - `artifacts/{id}.msgpack`: one MessagePack record per artifact, written to
//!   a temp file and renamed into place
//! - `history.jsonl`: append-only, hash-chained promotion history
//! - `predictions.jsonl`: append-only prediction metadata
//! - `erased.jsonl`: one tombstone per erased artifact, so its id is never
//!   handed out again
//! - `images/{id}.bin`: image bytes of each recorded prediction
//!
//! Everything is loaded into memory on open, after any partial trailing line
//! left by an interrupted append has been cut off. Mutations are serialized by
//! one async lock and reach disk before they become visible to readers.

use crate::ledger::{HistoryEntry, HistoryId, VersionLedger};
use crate::records::{
    ArtifactId, ArtifactRecord, ArtifactSummary, HistoryRecord, NewArtifact, NewPrediction,
    PredictionId, PredictionRecord,
};
use crate::registry::ModelRegistry;
use crate::state::RegistryState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use freshcheck_core::{Error, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ARTIFACTS_DIR: &str = "artifacts";
const IMAGES_DIR: &str = "images";
const HISTORY_FILE: &str = "history.jsonl";
const PREDICTIONS_FILE: &str = "predictions.jsonl";
const ERASED_FILE: &str = "erased.jsonl";
const ARTIFACT_EXT: &str = "msgpack";
const TEMP_EXT: &str = "tmp";

/// Tombstone for an erased artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ErasedRecord {
    artifact_id: ArtifactId,
    erased_at: DateTime<Utc>,
}

/// Registry persisted under a directory
#[derive(Debug)]
pub struct FileRegistry {
    root: PathBuf,
    state: RwLock<RegistryState>,
    writer: Mutex<()>,
}

impl FileRegistry {
    /// Open (or create) a registry rooted at `root`
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(ARTIFACTS_DIR)).await?;
        fs::create_dir_all(root.join(IMAGES_DIR)).await?;
        for file in [HISTORY_FILE, PREDICTIONS_FILE, ERASED_FILE] {
            truncate_torn_tail(&root.join(file)).await?;
        }

        let artifacts = load_artifacts(&root.join(ARTIFACTS_DIR)).await?;
        let ledger = VersionLedger::from_entries(read_lines(&root.join(HISTORY_FILE)).await?);
        if !ledger.verify() {
            warn!(root = %root.display(), "Version history failed hash-chain verification");
        }
        let predictions = load_predictions(&root).await?;
        let erased: Vec<ErasedRecord> = read_lines(&root.join(ERASED_FILE)).await?;

        info!(
            root = %root.display(),
            artifacts = artifacts.len(),
            history = ledger.len(),
            predictions = predictions.len(),
            erased = erased.len(),
            "Opened file registry"
        );

        let retired = erased.iter().map(|record| record.artifact_id);
        Ok(Self {
            state: RwLock::new(RegistryState::restore(artifacts, ledger, predictions, retired)),
            root,
            writer: Mutex::new(()),
        })
    }

    /// Directory this registry lives in
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn artifact_path(&self, id: ArtifactId) -> PathBuf {
        self.root
            .join(ARTIFACTS_DIR)
            .join(format!("{}.{}", id, ARTIFACT_EXT))
    }

    fn image_path(&self, id: PredictionId) -> PathBuf {
        self.root.join(IMAGES_DIR).join(format!("{}.bin", id))
    }
}

#[async_trait]
impl ModelRegistry for FileRegistry {
    async fn store(&self, artifact: NewArtifact) -> Result<ArtifactId> {
        let _guard = self.writer.lock().await;
        let record = self.state.write().prepare_artifact(artifact);

        let bytes = rmp_serde::to_vec_named(&record)
            .map_err(|e| Error::storage(format!("Failed to encode artifact {}: {}", record.id, e)))?;
        let path = self.artifact_path(record.id);
        write_atomic(&path, &bytes).await?;

        let id = record.id;
        info!(artifact_id = id, name = %record.name, kind = %record.artifact.kind(), path = %path.display(), "Stored artifact");
        self.state.write().insert_artifact(record);
        Ok(id)
    }

    async fn artifact(&self, id: ArtifactId) -> Result<ArtifactRecord> {
        self.state.read().artifact(id)
    }

    async fn artifacts(&self) -> Result<Vec<ArtifactSummary>> {
        Ok(self.state.read().artifacts())
    }

    async fn erase(&self, id: ArtifactId) -> Result<bool> {
        let _guard = self.writer.lock().await;
        if !self.state.read().contains_artifact(id) {
            return Ok(false);
        }

        // the tombstone goes first so a crash never frees the id
        let tombstone = ErasedRecord {
            artifact_id: id,
            erased_at: Utc::now(),
        };
        append_line(&self.root.join(ERASED_FILE), &tombstone).await?;

        match fs::remove_file(self.artifact_path(id)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(artifact_id = id, "Artifact file already missing");
            }
            Err(e) => return Err(e.into()),
        }

        self.state.write().remove_artifact(id);
        info!(artifact_id = id, "Erased artifact");
        Ok(true)
    }

    async fn promote(&self, id: ArtifactId) -> Result<HistoryEntry> {
        let _guard = self.writer.lock().await;
        let entry = self.state.read().prepare_promotion(id)?;

        append_line(&self.root.join(HISTORY_FILE), &entry).await?;

        self.state.write().push_history(entry.clone());
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
        let _guard = self.writer.lock().await;
        let record = self.state.write().prepare_prediction(prediction);

        write_atomic(&self.image_path(record.id), &record.image).await?;
        append_line(&self.root.join(PREDICTIONS_FILE), &record).await?;

        let id = record.id;
        debug!(prediction_id = id, species = %record.species, fresh = record.is_fresh, "Recorded prediction");
        self.state.write().insert_prediction(record);
        Ok(id)
    }

    async fn prediction(&self, id: PredictionId) -> Result<PredictionRecord> {
        self.state.read().prediction(id)
    }

    async fn predictions(&self) -> Result<Vec<PredictionRecord>> {
        Ok(self.state.read().predictions())
    }
}

/// Write via a sibling temp file and rename, so readers never see a partial file
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let temp = path.with_extension(TEMP_EXT);
    fs::write(&temp, bytes).await?;
    fs::rename(&temp, path).await?;
    Ok(())
}

/// Append one JSON line and sync it to disk
async fn append_line<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut line = serde_json::to_string(value)?;
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(line.as_bytes()).await?;
    file.sync_data().await?;
    Ok(())
}

/// Cut a JSON-lines file back to its last complete line. An append torn by a
/// crash would otherwise swallow the next record written after it.
async fn truncate_torn_tail(path: &Path) -> Result<()> {
    let content = match fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if content.is_empty() || content.ends_with(b"\n") {
        return Ok(());
    }

    let keep = content
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |position| position + 1);
    warn!(
        file = %path.display(),
        dropped_bytes = content.len() - keep,
        "Truncating partial trailing record"
    );

    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(keep as u64).await?;
    file.sync_data().await?;
    Ok(())
}

/// Read a JSON-lines file. A missing file is empty; unparseable lines (for
/// example a write torn by a crash) are skipped.
async fn read_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut values = Vec::new();
    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(value) => values.push(value),
            Err(e) => warn!(file = %path.display(), line = number + 1, error = %e, "Skipping unreadable record"),
        }
    }
    Ok(values)
}

async fn load_artifacts(dir: &Path) -> Result<Vec<ArtifactRecord>> {
    let mut records = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ARTIFACT_EXT) => {}
            Some(TEMP_EXT) => {
                debug!(path = %path.display(), "Removing stale temp file");
                fs::remove_file(&path).await?;
                continue;
            }
            _ => continue,
        }

        let bytes = fs::read(&path).await?;
        match rmp_serde::from_slice::<ArtifactRecord>(&bytes) {
            Ok(record) => records.push(record),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable artifact"),
        }
    }

    records.sort_by_key(|record| record.id);
    Ok(records)
}

async fn load_predictions(root: &Path) -> Result<Vec<PredictionRecord>> {
    let mut records: Vec<PredictionRecord> = read_lines(&root.join(PREDICTIONS_FILE)).await?;
    for record in &mut records {
        let path = root.join(IMAGES_DIR).join(format!("{}.bin", record.id));
        match fs::read(&path).await {
            Ok(image) => record.image = image,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(prediction_id = record.id, "Prediction image missing");
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(records)
}
