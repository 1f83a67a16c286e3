//! Serving facade
//!
//! Resolves the active artifact from the registry and runs classification and
//! retraining against it. Backend work is CPU bound and runs on the blocking
//! pool; nothing below this layer surfaces an unclassified fault.

use crate::config::ServiceConfig;
use freshcheck_classifiers::loader::{self, UploadContext};
use freshcheck_classifiers::{preprocess, Classifier, LabeledImage, TrainingParams};
use freshcheck_core::{Error, Prediction, Result};
use freshcheck_registry::{
    ArtifactId, ArtifactRecord, HistoryEntry, ModelRegistry, NewArtifact, NewPrediction,
    PredictionId,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of a successful `classify_one`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    #[serde(flatten)]
    pub prediction: Prediction,

    /// Artifact that produced the prediction
    pub artifact_id: ArtifactId,

    /// Id of the recorded prediction, when recording is enabled and succeeded
    pub prediction_id: Option<PredictionId>,
}

/// Register metric descriptions. No exporter is installed here.
pub fn describe_metrics() {
    metrics::describe_counter!(
        "freshcheck_classifications_total",
        "Total number of classify calls by backend kind and outcome"
    );
    metrics::describe_counter!(
        "freshcheck_retrains_total",
        "Total number of retrain calls by outcome"
    );
    metrics::describe_histogram!(
        "freshcheck_classify_latency_us",
        metrics::Unit::Microseconds,
        "Classification latency in microseconds"
    );
    metrics::describe_counter!("freshcheck_errors_total", "Total number of errors by operation");
}

/// Facade over a registry and its active classifier
pub struct FreshnessService {
    registry: Arc<dyn ModelRegistry>,
    config: ServiceConfig,
}

impl FreshnessService {
    /// Create a new service over `registry`
    pub fn new(registry: Arc<dyn ModelRegistry>, config: ServiceConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<dyn ModelRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Active artifact and its instantiated classifier
    async fn active_classifier(
        &self,
        training: &TrainingParams,
    ) -> Result<(ArtifactRecord, Box<dyn Classifier>)> {
        let record = self
            .registry
            .active_artifact()
            .await?
            .ok_or_else(|| Error::not_found("no active model"))?;
        let classifier = record.artifact.load_with(training)?;
        Ok((record, classifier))
    }

    /// Classify one encoded image with the active classifier
    pub async fn classify_one(&self, image_bytes: &[u8]) -> Result<Classification> {
        let result = self.try_classify_one(image_bytes).await;
        if let Err(ref e) = result {
            metrics::counter!("freshcheck_errors_total", "operation" => "classify").increment(1);
            debug!(error = %e, "Classification rejected");
        }
        result
    }

    async fn try_classify_one(&self, image_bytes: &[u8]) -> Result<Classification> {
        let (record, classifier) = self.active_classifier(&self.config.training).await?;
        let image = preprocess::decode_image(image_bytes)?;
        let kind = classifier.kind();

        let start = Instant::now();
        let outcome = tokio::task::spawn_blocking(move || classifier.classify(&image))
            .await
            .map_err(|e| Error::internal(format!("classification task failed: {}", e)))?;
        metrics::histogram!("freshcheck_classify_latency_us").record(start.elapsed().as_micros() as f64);

        let Some(prediction) = outcome else {
            metrics::counter!("freshcheck_classifications_total", "kind" => kind.as_str(), "outcome" => "failed")
                .increment(1);
            return Err(Error::inference("inference failed"));
        };
        metrics::counter!("freshcheck_classifications_total", "kind" => kind.as_str(), "outcome" => "ok")
            .increment(1);

        let prediction_id = if self.config.record_predictions {
            let new = NewPrediction {
                image: image_bytes.to_vec(),
                prediction: prediction.clone(),
                kind,
            };
            match self.registry.record_prediction(new).await {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!(error = %e, "Failed to record prediction");
                    None
                }
            }
        } else {
            None
        };

        info!(
            artifact_id = record.id,
            kind = %kind,
            species = %prediction.species,
            fresh = prediction.is_fresh,
            "Classified image"
        );

        Ok(Classification {
            prediction,
            artifact_id: record.id,
            prediction_id,
        })
    }

    /// Retrain the active classifier and store the result.
    ///
    /// The new artifact is not promoted. When the configured timeout elapses
    /// the call fails with [`Error::Timeout`] and nothing is stored.
    pub async fn retrain_active(
        &self,
        samples: Vec<LabeledImage>,
        name: Option<String>,
    ) -> Result<ArtifactId> {
        let result = self.try_retrain_active(samples, name).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(Error::Unsupported(_)) => "unsupported",
            Err(Error::Timeout) => "timeout",
            Err(_) => "failed",
        };
        metrics::counter!("freshcheck_retrains_total", "outcome" => outcome).increment(1);
        if result.is_err() {
            metrics::counter!("freshcheck_errors_total", "operation" => "retrain").increment(1);
        }
        result
    }

    async fn try_retrain_active(
        &self,
        samples: Vec<LabeledImage>,
        name: Option<String>,
    ) -> Result<ArtifactId> {
        let timeout = self.config.retrain_timeout();
        let mut training = self.config.training.clone();
        if let Some(limit) = timeout {
            training = training.with_deadline(Instant::now() + limit);
        }

        let (record, classifier) = self.active_classifier(&training).await?;
        let count = samples.len();
        info!(artifact_id = record.id, kind = %classifier.kind(), samples = count, "Retraining active classifier");

        let start = Instant::now();
        let task = tokio::task::spawn_blocking(move || classifier.retrain(&samples));
        // backends that honour the deadline stop on their own; the outer
        // timeout covers those that do not
        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, task).await.map_err(|_| {
                warn!(artifact_id = record.id, timeout_secs = limit.as_secs(), "Retrain timed out");
                Error::Timeout
            })?,
            None => task.await,
        };
        let artifact = joined
            .map_err(|e| Error::internal(format!("retrain task failed: {}", e)))?
            .map_err(|e| {
                warn!(artifact_id = record.id, samples = count, error = %e, "Retrain failed");
                e
            })?;

        let name = name.unwrap_or_else(|| format!("{} (retrained)", record.name));
        let id = self.registry.store(NewArtifact::new(name, artifact)).await?;

        info!(
            source_id = record.id,
            artifact_id = id,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Stored retrained artifact"
        );
        Ok(id)
    }

    /// Decode an uploaded model and store it
    pub async fn upload(
        &self,
        name: &str,
        bytes: &[u8],
        context: &UploadContext,
        performance: f64,
    ) -> Result<ArtifactId> {
        let artifact = loader::decode_upload(bytes, context)?;
        let new = NewArtifact::new(name, artifact).with_performance(performance);
        self.registry.store(new).await
    }

    /// Make a stored artifact active
    pub async fn promote(&self, id: ArtifactId) -> Result<HistoryEntry> {
        self.registry.promote(id).await
    }
}
