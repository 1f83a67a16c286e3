//! Mock classifiers for testing
//!
//! Configurable implementations of the Classifier trait used to exercise the
//! shared classify and retrain orchestration independently of any backend.

use freshcheck_classifiers::{Classifier, ClassifierArtifact, LabelMap};
use freshcheck_core::{BackendKind, Error, ImageGeometry, Prediction, Result};
use image::DynamicImage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// A classifier that always predicts a fixed index
pub struct MockClassifier {
    labels: LabelMap,
    geometry: ImageGeometry,
    index: Option<usize>,
    training_error: Option<String>,
    predict_calls: AtomicU32,
    trained_indices: Mutex<Vec<usize>>,
}

impl MockClassifier {
    /// Create a new mock over the given labels, predicting index 0
    pub fn new(labels: LabelMap) -> Self {
        Self {
            labels,
            geometry: ImageGeometry::default(),
            index: Some(0),
            training_error: None,
            predict_calls: AtomicU32::new(0),
            trained_indices: Mutex::new(Vec::new()),
        }
    }

    /// Set the index predict_raw returns (`None` simulates an inference fault)
    pub fn with_index(mut self, index: Option<usize>) -> Self {
        self.index = index;
        self
    }

    /// Make the backend training routine fail
    pub fn with_training_error(mut self, message: &str) -> Self {
        self.training_error = Some(message.to_string());
        self
    }

    /// Get the number of times predict_raw was called
    pub fn predict_calls(&self) -> u32 {
        self.predict_calls.load(Ordering::Relaxed)
    }

    /// Indices handed to the backend by the last retrain
    pub fn trained_indices(&self) -> Vec<usize> {
        self.trained_indices.lock().unwrap().clone()
    }
}

impl Classifier for MockClassifier {
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
        self.predict_calls.fetch_add(1, Ordering::Relaxed);
        self.index
    }

    fn retrain_indexed(&self, samples: &[(usize, &DynamicImage)]) -> Result<ClassifierArtifact> {
        *self.trained_indices.lock().unwrap() = samples.iter().map(|(index, _)| *index).collect();

        if let Some(message) = &self.training_error {
            return Err(Error::training(message.clone()));
        }
        ClassifierArtifact::from_parts(BackendKind::Baseline, Vec::new(), self.labels.clone(), self.geometry)
    }
}

fn apple_labels() -> LabelMap {
    LabelMap::from_labels(["freshApple", "rottenApple"]).unwrap()
}

fn image() -> DynamicImage {
    DynamicImage::new_rgb8(4, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_index_yields_fresh_apple() {
        let classifier = MockClassifier::new(apple_labels()).with_index(Some(0));
        let prediction = classifier.classify(&image()).unwrap();
        assert_eq!(prediction, Prediction::new("Apple", true));
    }

    #[test]
    fn test_rotten_index_yields_rotten_apple() {
        let classifier = MockClassifier::new(apple_labels()).with_index(Some(1));
        let prediction = classifier.classify(&image()).unwrap();
        assert_eq!(prediction, Prediction::new("Apple", false));
    }

    #[test]
    fn test_failed_prediction_yields_none() {
        let classifier = MockClassifier::new(apple_labels()).with_index(None);
        assert!(classifier.classify(&image()).is_none());
        assert_eq!(classifier.predict_calls(), 1);
    }

    #[test]
    fn test_index_outside_map_is_unknown() {
        let classifier = MockClassifier::new(apple_labels()).with_index(Some(7));
        let prediction = classifier.classify(&image()).unwrap();
        assert_eq!(prediction, Prediction::new("Unknown", false));
    }

    #[test]
    fn test_unprefixed_label_is_unknown() {
        let labels = LabelMap::from_labels(["Apple"]).unwrap();
        let classifier = MockClassifier::new(labels);
        let prediction = classifier.classify(&image()).unwrap();
        assert_eq!(prediction, Prediction::new("Unknown", false));
    }

    #[test]
    fn test_retrain_remaps_labels() {
        let classifier = MockClassifier::new(apple_labels());
        let samples = vec![
            ("rottenApple".to_string(), image()),
            ("freshApple".to_string(), image()),
            ("rottenApple".to_string(), image()),
        ];

        let artifact = classifier.retrain(&samples).unwrap();
        assert_eq!(classifier.trained_indices(), vec![1, 0, 1]);
        assert_eq!(artifact.labels(), classifier.labels());
        assert_eq!(artifact.geometry(), classifier.geometry());
    }

    #[test]
    fn test_retrain_with_unknown_label_fails_whole_batch() {
        let classifier = MockClassifier::new(apple_labels());
        let samples = vec![
            ("freshApple".to_string(), image()),
            ("rottenBanana".to_string(), image()),
        ];

        let err = classifier.retrain(&samples).unwrap_err();
        assert!(matches!(err, Error::Training(_)));
        // the backend was never invoked
        assert!(classifier.trained_indices().is_empty());

        // source classifier still behaves as before
        let prediction = classifier.classify(&image()).unwrap();
        assert_eq!(prediction, Prediction::new("Apple", true));
    }

    #[test]
    fn test_backend_training_failure_propagates() {
        let classifier = MockClassifier::new(apple_labels()).with_training_error("loss diverged");
        let err = classifier
            .retrain(&[("freshApple".to_string(), image())])
            .unwrap_err();
        assert!(matches!(err, Error::Training(ref m) if m == "loss diverged"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_empty_batch_rejected() {
        let classifier = MockClassifier::new(apple_labels());
        let err = classifier.retrain(&[]).unwrap_err();
        assert!(matches!(err, Error::Input(_)));
    }
}
