//! Immutable classifier artifacts
//!
//! An artifact bundles a backend kind, its opaque model payload, the label
//! map and the input geometry. Constructors validate the payload up front,
//! and nothing mutates an artifact once built: retraining always produces a
//! new one.

use crate::baseline::BaselineClassifier;
use crate::classifier::Classifier;
use crate::config::TrainingParams;
use crate::feature_vector::{FeatureModel, FeatureVectorClassifier};
use crate::image_model::{self, ImageModelClassifier};
use crate::label::LabelMap;
use freshcheck_core::{BackendKind, Error, ImageGeometry, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Storable classifier: payload plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierArtifact {
    uid: Uuid,
    kind: BackendKind,
    #[serde(with = "serde_bytes")]
    payload: Vec<u8>,
    labels: LabelMap,
    geometry: ImageGeometry,
}

impl ClassifierArtifact {
    /// Build an artifact from its parts, validating the payload for `kind`
    pub fn from_parts(
        kind: BackendKind,
        payload: Vec<u8>,
        labels: LabelMap,
        geometry: ImageGeometry,
    ) -> Result<Self> {
        let artifact = Self {
            uid: Uuid::new_v4(),
            kind,
            payload,
            labels,
            geometry,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    /// Random baseline over the given labels
    pub fn baseline(labels: LabelMap) -> Self {
        Self {
            uid: Uuid::new_v4(),
            kind: BackendKind::Baseline,
            payload: Vec::new(),
            labels,
            geometry: ImageGeometry::default(),
        }
    }

    /// Image model from a dense-stack safetensors payload
    pub fn image_model(payload: Vec<u8>, labels: LabelMap, geometry: ImageGeometry) -> Result<Self> {
        Self::from_parts(BackendKind::ImageModel, payload, labels, geometry)
    }

    /// Feature-vector model from a fitted linfa model
    pub fn feature_vector(model: &FeatureModel, labels: LabelMap, geometry: ImageGeometry) -> Result<Self> {
        Self::from_parts(BackendKind::FeatureVector, model.to_json()?, labels, geometry)
    }

    /// Check that the payload decodes for this artifact's backend
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            BackendKind::Baseline => Ok(()),
            BackendKind::ImageModel => image_model::validate_payload(&self.payload, &self.geometry),
            BackendKind::FeatureVector => FeatureModel::from_json(&self.payload)
                .map(|_| ())
                .map_err(|e| Error::input(format!("invalid feature-vector payload: {}", e))),
        }
    }

    /// Instantiate the backend with default training parameters
    pub fn load(&self) -> Result<Box<dyn Classifier>> {
        self.load_with(&TrainingParams::default())
    }

    /// Instantiate the backend for this artifact
    pub fn load_with(&self, training: &TrainingParams) -> Result<Box<dyn Classifier>> {
        let labels = self.labels.clone();
        Ok(match self.kind {
            BackendKind::Baseline => Box::new(BaselineClassifier::new(labels, self.geometry)),
            BackendKind::ImageModel => Box::new(ImageModelClassifier::new(
                self.payload.clone(),
                labels,
                self.geometry,
                training.clone(),
            )?),
            BackendKind::FeatureVector => Box::new(FeatureVectorClassifier::from_payload(
                &self.payload,
                labels,
                self.geometry,
            )?),
        })
    }

    /// Encode as a MessagePack envelope
    pub fn to_envelope(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| Error::internal(format!("Failed to encode artifact: {}", e)))
    }

    /// Decode a MessagePack envelope and validate its payload
    pub fn from_envelope(bytes: &[u8]) -> Result<Self> {
        let artifact: Self = rmp_serde::from_slice(bytes)
            .map_err(|e| Error::input(format!("not an artifact envelope: {}", e)))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// The same model under a new identity
    pub fn reissued(self) -> Self {
        Self {
            uid: Uuid::new_v4(),
            ..self
        }
    }

    /// Unique identity of this artifact instance
    pub fn uid(&self) -> Uuid {
        self.uid
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    /// SHA-256 of the payload, hex encoded
    pub fn payload_digest(&self) -> String {
        format!("{:x}", Sha256::digest(&self.payload))
    }
}
