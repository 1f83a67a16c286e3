//! Feature-vector backend over fitted `linfa` models
//!
//! The image is normalized, flattened into its raw 8-bit pixel values and
//! handed to the model as a single-row record. The payload is the model's own
//! serde document, so no custom (de)serialization is involved.

use crate::artifact::ClassifierArtifact;
use crate::classifier::Classifier;
use crate::label::LabelMap;
use crate::preprocess;
use freshcheck_core::{BackendKind, Error, ImageGeometry, Result};
use image::DynamicImage;
use linfa::traits::Predict;
use linfa_bayes::GaussianNb;
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::warn;

/// Fitted model variants understood by the feature-vector backend.
///
/// Externally tagged: the linfa models carry integer-keyed maps, which do not
/// survive serde's buffering of internally tagged enums.
#[derive(Debug, Serialize, Deserialize)]
pub enum FeatureModel {
    GaussianNaiveBayes(GaussianNb<f64, usize>),
    DecisionTree(DecisionTree<f64, usize>),
}

impl FeatureModel {
    /// Decode a model from its native JSON document
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Encode the model as its native JSON document
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Predict classes for each row of `records`
    pub fn predict(&self, records: &Array2<f64>) -> Array1<usize> {
        match self {
            Self::GaussianNaiveBayes(model) => model.predict(records),
            Self::DecisionTree(model) => model.predict(records),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::GaussianNaiveBayes(_) => "GaussianNaiveBayes",
            Self::DecisionTree(_) => "DecisionTree",
        }
    }
}

/// Flattened pixel features for one image
pub fn features(image: &DynamicImage, geometry: &ImageGeometry) -> Result<Array2<f64>> {
    let pixels = preprocess::normalize(image, geometry)?;
    let values: Vec<f64> = pixels.into_iter().map(f64::from).collect();
    Array2::from_shape_vec((1, values.len()), values)
        .map_err(|e| Error::internal(format!("Failed to shape feature vector: {}", e)))
}

/// Classifier holding a deserialized feature-vector model
pub struct FeatureVectorClassifier {
    model: FeatureModel,
    labels: LabelMap,
    geometry: ImageGeometry,
}

impl FeatureVectorClassifier {
    /// Create a new feature-vector classifier
    pub fn new(model: FeatureModel, labels: LabelMap, geometry: ImageGeometry) -> Self {
        Self {
            model,
            labels,
            geometry,
        }
    }

    /// Decode the payload and wrap it
    pub fn from_payload(payload: &[u8], labels: LabelMap, geometry: ImageGeometry) -> Result<Self> {
        let model = FeatureModel::from_json(payload)
            .map_err(|e| Error::input(format!("invalid feature-vector payload: {}", e)))?;
        Ok(Self::new(model, labels, geometry))
    }

    pub fn model(&self) -> &FeatureModel {
        &self.model
    }

    fn try_predict(&self, image: &DynamicImage) -> Result<usize> {
        let records = features(image, &self.geometry)?;

        // linfa asserts on shape mismatches instead of returning errors
        let predicted = panic::catch_unwind(AssertUnwindSafe(|| self.model.predict(&records)))
            .map_err(|_| Error::inference(format!("{} rejected the feature vector", self.model.name())))?;

        predicted
            .first()
            .copied()
            .ok_or_else(|| Error::inference("model returned no prediction"))
    }
}

impl Classifier for FeatureVectorClassifier {
    fn kind(&self) -> BackendKind {
        BackendKind::FeatureVector
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    fn predict_raw(&self, image: &DynamicImage) -> Option<usize> {
        match self.try_predict(image) {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(backend = %BackendKind::FeatureVector, model = self.model.name(), error = %e, "Feature-vector inference failed");
                None
            }
        }
    }

    fn retrain_indexed(&self, _samples: &[(usize, &DynamicImage)]) -> Result<ClassifierArtifact> {
        Err(Error::unsupported("feature-vector backend does not support retraining"))
    }

    fn supports_retrain(&self) -> bool {
        false
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use freshcheck_core::ColorMode;
    use image::{GrayImage, Luma};
    use linfa::prelude::*;

    pub(crate) fn gray(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([value])))
    }

    pub(crate) fn geometry() -> ImageGeometry {
        ImageGeometry::new(2, 2, ColorMode::Luma)
    }

    /// Naive Bayes separating dark (0) from bright (1) 2x2 images
    pub(crate) fn brightness_model() -> FeatureModel {
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for offset in 0..6u8 {
            let dark = f64::from(offset * 3);
            let bright = f64::from(255 - offset * 3);
            rows.extend([dark, dark + 1.0, dark, dark + 2.0]);
            targets.push(0usize);
            rows.extend([bright, bright - 1.0, bright, bright - 2.0]);
            targets.push(1usize);
        }
        let records = Array2::from_shape_vec((targets.len(), 4), rows).unwrap();
        let dataset = Dataset::new(records, Array1::from(targets));
        let model = GaussianNb::params().fit(&dataset).unwrap();
        FeatureModel::GaussianNaiveBayes(model)
    }

    #[test]
    fn test_predicts_brightness() {
        let labels = LabelMap::from_labels(["rottenPear", "freshPear"]).unwrap();
        let classifier = FeatureVectorClassifier::new(brightness_model(), labels, geometry());

        assert_eq!(classifier.predict_raw(&gray(250)), Some(1));
        assert_eq!(classifier.predict_raw(&gray(4)), Some(0));

        let prediction = classifier.classify(&gray(4)).unwrap();
        assert_eq!(prediction.species, "Pear");
        assert!(!prediction.is_fresh);
    }

    #[test]
    fn test_native_json_round_trip() {
        let json = brightness_model().to_json().unwrap();
        let labels = LabelMap::from_labels(["rottenPear", "freshPear"]).unwrap();
        let classifier = FeatureVectorClassifier::from_payload(&json, labels, geometry()).unwrap();
        assert_eq!(classifier.model().name(), "GaussianNaiveBayes");
        assert_eq!(classifier.predict_raw(&gray(250)), Some(1));
    }

    #[test]
    fn test_shape_mismatch_is_none() {
        let labels = LabelMap::from_labels(["rottenPear", "freshPear"]).unwrap();
        let wide = ImageGeometry::new(3, 3, ColorMode::Rgb);
        let classifier = FeatureVectorClassifier::new(brightness_model(), labels, wide);
        assert_eq!(classifier.predict_raw(&gray(250)), None);
        assert!(classifier.classify(&gray(250)).is_none());
    }

    #[test]
    fn test_retrain_unsupported() {
        let labels = LabelMap::from_labels(["rottenPear", "freshPear"]).unwrap();
        let classifier = FeatureVectorClassifier::new(brightness_model(), labels, geometry());
        let err = classifier
            .retrain(&[("freshPear".to_string(), gray(250))])
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
