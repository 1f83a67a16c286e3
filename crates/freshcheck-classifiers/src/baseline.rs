//! Random baseline classifier
//!
//! Picks a uniformly random label. Useful as a stand-in before any trained
//! model exists and for exercising the serving path.

use crate::artifact::ClassifierArtifact;
use crate::classifier::Classifier;
use crate::label::LabelMap;
use freshcheck_core::{BackendKind, Error, ImageGeometry, Result};
use image::DynamicImage;
use rand::Rng;

/// Uniform random classifier. Does not support retraining.
pub struct BaselineClassifier {
    labels: LabelMap,
    geometry: ImageGeometry,
}

impl BaselineClassifier {
    /// Create a new baseline classifier
    pub fn new(labels: LabelMap, geometry: ImageGeometry) -> Self {
        Self { labels, geometry }
    }
}

impl Classifier for BaselineClassifier {
    fn kind(&self) -> BackendKind {
        BackendKind::Baseline
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }

    fn geometry(&self) -> ImageGeometry {
        self.geometry
    }

    fn predict_raw(&self, _image: &DynamicImage) -> Option<usize> {
        if self.labels.is_empty() {
            return None;
        }
        Some(rand::thread_rng().gen_range(0..self.labels.len()))
    }

    fn retrain_indexed(&self, _samples: &[(usize, &DynamicImage)]) -> Result<ClassifierArtifact> {
        Err(Error::unsupported("baseline backend does not support retraining"))
    }

    fn supports_retrain(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank() -> DynamicImage {
        DynamicImage::new_luma8(2, 2)
    }

    #[test]
    fn test_predicts_within_range() {
        let labels = LabelMap::from_labels(["freshApple", "rottenApple", "freshPear"]).unwrap();
        let classifier = BaselineClassifier::new(labels, ImageGeometry::default());

        for _ in 0..100 {
            let index = classifier.predict_raw(&blank()).unwrap();
            assert!(index < 3);
        }
    }

    #[test]
    fn test_every_label_reachable() {
        let labels = LabelMap::from_labels(["freshApple", "rottenApple"]).unwrap();
        let classifier = BaselineClassifier::new(labels, ImageGeometry::default());

        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            let prediction = classifier.classify(&blank()).unwrap();
            assert_eq!(prediction.species, "Apple");
            seen.insert(prediction.is_fresh);
        }
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_empty_labels_predict_none() {
        let labels = LabelMap::from_labels(Vec::<String>::new()).unwrap();
        let classifier = BaselineClassifier::new(labels, ImageGeometry::default());
        assert!(classifier.classify(&blank()).is_none());
    }

    #[test]
    fn test_retrain_unsupported() {
        let labels = LabelMap::from_labels(["freshApple"]).unwrap();
        let classifier = BaselineClassifier::new(labels, ImageGeometry::default());

        let err = classifier
            .retrain(&[("freshApple".to_string(), blank())])
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(!err.is_retryable());
    }
}
