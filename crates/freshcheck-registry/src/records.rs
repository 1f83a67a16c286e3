//! Records kept by a registry

use crate::ledger::HistoryEntry;
use chrono::{DateTime, Utc};
use freshcheck_classifiers::ClassifierArtifact;
use freshcheck_core::{BackendKind, ImageGeometry, Prediction};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Registry id of a stored artifact
pub type ArtifactId = u64;

/// Registry id of a recorded prediction
pub type PredictionId = u64;

/// An artifact about to be stored
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub name: String,
    pub performance: f64,
    pub artifact: ClassifierArtifact,
}

impl NewArtifact {
    /// Create a new artifact with zero recorded performance
    pub fn new(name: impl Into<String>, artifact: ClassifierArtifact) -> Self {
        Self {
            name: name.into(),
            performance: 0.0,
            artifact,
        }
    }

    /// Set the recorded performance score
    pub fn with_performance(mut self, performance: f64) -> Self {
        self.performance = performance;
        self
    }
}

/// A stored artifact and its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: ArtifactId,
    pub name: String,
    pub performance: f64,
    pub created_at: DateTime<Utc>,
    pub artifact: ClassifierArtifact,
}

impl ArtifactRecord {
    pub(crate) fn new(id: ArtifactId, new: NewArtifact) -> Self {
        Self {
            id,
            name: new.name,
            performance: new.performance,
            created_at: Utc::now(),
            artifact: new.artifact,
        }
    }

    /// Listing view without the payload
    pub fn summary(&self) -> ArtifactSummary {
        ArtifactSummary {
            id: self.id,
            name: self.name.clone(),
            performance: self.performance,
            created_at: self.created_at,
            kind: self.artifact.kind(),
            uid: self.artifact.uid(),
            labels: self.artifact.labels().len(),
            geometry: self.artifact.geometry(),
        }
    }
}

/// Artifact metadata as returned by listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: ArtifactId,
    pub name: String,
    pub performance: f64,
    pub created_at: DateTime<Utc>,
    pub kind: BackendKind,
    pub uid: Uuid,
    pub labels: usize,
    pub geometry: ImageGeometry,
}

/// A history entry together with the artifact it selected.
///
/// `artifact` is `None` when that artifact has since been erased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub artifact: Option<ArtifactSummary>,
}

/// A classification about to be recorded
#[derive(Debug, Clone)]
pub struct NewPrediction {
    /// Raw image bytes as submitted
    pub image: Vec<u8>,
    pub prediction: Prediction,
    /// Backend kind of the classifier that produced the prediction
    pub kind: BackendKind,
}

/// A recorded classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: PredictionId,
    pub created_at: DateTime<Utc>,
    pub species: String,
    pub is_fresh: bool,
    pub kind: BackendKind,
    #[serde(skip)]
    pub image: Vec<u8>,
}

impl PredictionRecord {
    pub(crate) fn new(id: PredictionId, new: NewPrediction) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            species: new.prediction.species,
            is_fresh: new.prediction.is_fresh,
            kind: new.kind,
            image: new.image,
        }
    }

    pub fn prediction(&self) -> Prediction {
        Prediction::new(self.species.clone(), self.is_fresh)
    }
}
