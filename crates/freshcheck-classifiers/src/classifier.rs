//! Classifier trait and the shared classify/retrain orchestration

use crate::artifact::ClassifierArtifact;
use crate::label::{self, LabelMap};
use freshcheck_core::{BackendKind, Error, ImageGeometry, Prediction, Result};
use image::DynamicImage;
use tracing::{debug, info, warn};

/// One ground-truth sample for retraining: label text and image
pub type LabeledImage = (String, DynamicImage);

/// Trait for all prediction backends.
///
/// Implementors supply [`predict_raw`](Classifier::predict_raw) and
/// [`retrain_indexed`](Classifier::retrain_indexed); label translation in
/// both directions is handled once by the provided methods.
///
/// Implementations must not keep mutable state across calls, so one instance
/// can serve concurrent callers without locking.
pub trait Classifier: Send + Sync {
    /// Backend kind of this classifier
    fn kind(&self) -> BackendKind;

    /// Label map owned by this classifier
    fn labels(&self) -> &LabelMap;

    /// Geometry images are normalized to
    fn geometry(&self) -> ImageGeometry;

    /// Backend inference. Any fault is logged and reported as `None`.
    fn predict_raw(&self, image: &DynamicImage) -> Option<usize>;

    /// Backend training over already remapped samples.
    ///
    /// Returns a new artifact with the same labels and geometry; `self` is
    /// never modified.
    fn retrain_indexed(&self, samples: &[(usize, &DynamicImage)]) -> Result<ClassifierArtifact>;

    /// Whether [`retrain_indexed`](Classifier::retrain_indexed) is implemented
    fn supports_retrain(&self) -> bool {
        true
    }

    /// Classify one image into species and freshness.
    ///
    /// An index missing from the label map, or a label without a known
    /// prefix, resolves to the "Unknown" species, not fresh.
    fn classify(&self, image: &DynamicImage) -> Option<Prediction> {
        let Some(index) = self.predict_raw(image) else {
            info!(backend = %self.kind(), "Failed to predict");
            return None;
        };

        let prediction = match self.labels().label(index) {
            Some(text) => label::to_prediction(text),
            None => {
                warn!(
                    backend = %self.kind(),
                    index,
                    labels = self.labels().len(),
                    "Predicted index has no label"
                );
                label::unknown_prediction()
            }
        };

        debug!(backend = %self.kind(), index, species = %prediction.species, fresh = prediction.is_fresh, "Classified image");
        Some(prediction)
    }

    /// Retrain on labeled images, producing a new artifact.
    ///
    /// Every label must be present in the label map; a single unknown label
    /// fails the whole call before any training happens.
    fn retrain(&self, samples: &[LabeledImage]) -> Result<ClassifierArtifact> {
        if !self.supports_retrain() {
            return Err(Error::unsupported(format!(
                "{} backend does not support retraining",
                self.kind()
            )));
        }

        if samples.is_empty() {
            return Err(Error::input("retrain batch is empty"));
        }

        let inverse = self.labels().inverse();
        let remapped = samples
            .iter()
            .map(|(label, image)| {
                inverse
                    .get(label.as_str())
                    .map(|index| (*index, image))
                    .ok_or_else(|| {
                        Error::training(format!("label '{}' is not in the label map", label))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(backend = %self.kind(), samples = remapped.len(), "Retraining classifier");
        self.retrain_indexed(&remapped)
    }
}
