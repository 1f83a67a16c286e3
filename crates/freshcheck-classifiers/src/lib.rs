//! freshcheck Classifiers
//!
//! Prediction backends behind one [`Classifier`] contract.
//!
//! Every backend maps an image to a categorical index; the label map owned by
//! each instance turns that index into a compound `fresh`/`rotten` + species
//! label, and the label codec splits it into a [`Prediction`]. Backends:
//! - Baseline: uniform random index, no retraining
//! - Image model: dense network over normalized pixels (candle), retrainable
//! - Feature vector: fitted linfa model over flattened pixels, no retraining
//!
//! Classifiers hold no mutable state, so a single instance serves concurrent
//! callers. Retraining yields a new [`ClassifierArtifact`].
//!
//! [`Prediction`]: freshcheck_core::Prediction

pub mod artifact;
pub mod baseline;
pub mod classifier;
pub mod config;
pub mod feature_vector;
pub mod image_model;
pub mod label;
pub mod loader;
pub mod preprocess;

pub use artifact::ClassifierArtifact;
pub use baseline::BaselineClassifier;
pub use classifier::{Classifier, LabeledImage};
pub use config::TrainingParams;
pub use feature_vector::{FeatureModel, FeatureVectorClassifier};
pub use image_model::ImageModelClassifier;
pub use label::{LabelError, LabelMap};
pub use loader::{decode_upload, pack_image_model, UploadContext, UploadFormat};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::artifact::ClassifierArtifact;
    pub use crate::classifier::{Classifier, LabeledImage};
    pub use crate::config::TrainingParams;
    pub use crate::label::LabelMap;
    pub use crate::loader::{decode_upload, UploadContext};
    pub use freshcheck_core::prelude::*;
}
