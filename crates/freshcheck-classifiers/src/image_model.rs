//! Trained image model backend (Candle)
//!
//! The payload is a safetensors document holding a stack of dense layers,
//! `fc0.weight`/`fc0.bias`, `fc1.weight`/`fc1.bias`, ... with ReLU between
//! consecutive layers. The first layer consumes the flattened, normalized
//! pixels; the last layer yields one logit per categorical index.
//!
//! The model is decoded from the payload on every call and never cached, so
//! an instance holds nothing but immutable bytes and metadata.

use crate::artifact::ClassifierArtifact;
use crate::classifier::Classifier;
use crate::config::TrainingParams;
use crate::label::LabelMap;
use crate::preprocess;
use candle_core::{DType, Device, Tensor, Var, D};
use candle_nn::{loss, Linear, Module, Optimizer, SGD};
use freshcheck_core::{BackendKind, Error, ImageGeometry, Result};
use image::DynamicImage;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Tensor name prefix of the dense layers
pub const LAYER_PREFIX: &str = "fc";

/// Dense layer stack decoded from a payload
pub struct DenseStack {
    layers: Vec<(Tensor, Tensor)>,
}

impl DenseStack {
    /// Decode and shape-check a safetensors payload
    pub fn from_payload(payload: &[u8], device: &Device) -> Result<Self> {
        let mut tensors = candle_core::safetensors::load_buffer(payload, device)
            .map_err(|e| Error::input(format!("Failed to load safetensors payload: {}", e)))?;

        let mut layers = Vec::new();
        loop {
            let index = layers.len();
            let Some(weight) = tensors.remove(&format!("{}{}.weight", LAYER_PREFIX, index)) else {
                break;
            };
            let bias = tensors
                .remove(&format!("{}{}.bias", LAYER_PREFIX, index))
                .ok_or_else(|| Error::input(format!("layer {} has a weight but no bias", index)))?;

            let weight = weight.to_dtype(DType::F32).map_err(payload_err)?;
            let bias = bias.to_dtype(DType::F32).map_err(payload_err)?;
            layers.push((weight, bias));
        }

        let stack = Self { layers };
        stack.check_shapes()?;
        Ok(stack)
    }

    fn check_shapes(&self) -> Result<()> {
        if self.layers.is_empty() {
            return Err(Error::input(format!(
                "payload contains no '{}0.weight' layer",
                LAYER_PREFIX
            )));
        }

        let mut previous_out: Option<usize> = None;
        for (index, (weight, bias)) in self.layers.iter().enumerate() {
            let (out_dim, in_dim) = weight.dims2().map_err(payload_err)?;
            let bias_dim = bias.dims1().map_err(payload_err)?;

            if bias_dim != out_dim {
                return Err(Error::input(format!(
                    "layer {} bias has {} entries, weight has {} rows",
                    index, bias_dim, out_dim
                )));
            }
            if let Some(expected) = previous_out {
                if expected != in_dim {
                    return Err(Error::input(format!(
                        "layer {} expects {} inputs, previous layer produces {}",
                        index, in_dim, expected
                    )));
                }
            }
            previous_out = Some(out_dim);
        }
        Ok(())
    }

    /// Width of the flattened input vector
    pub fn input_len(&self) -> usize {
        self.layers
            .first()
            .and_then(|(weight, _)| weight.dims2().ok())
            .map(|(_, in_dim)| in_dim)
            .unwrap_or(0)
    }

    /// Number of output categories
    pub fn output_len(&self) -> usize {
        self.layers
            .last()
            .and_then(|(weight, _)| weight.dims2().ok())
            .map(|(out_dim, _)| out_dim)
            .unwrap_or(0)
    }

    /// Compute logits for a `[batch, input_len]` tensor
    pub fn forward(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        let last = self.layers.len() - 1;
        let mut hidden = xs.clone();
        for (index, (weight, bias)) in self.layers.iter().enumerate() {
            hidden = Linear::new(weight.clone(), Some(bias.clone())).forward(&hidden)?;
            if index < last {
                hidden = hidden.relu()?;
            }
        }
        Ok(hidden)
    }

    /// Turn every parameter into a trainable variable.
    ///
    /// The stack keeps handles to the same storage, so optimizer steps on the
    /// returned vars are visible through `forward` and `to_payload`.
    fn into_trainable(self) -> candle_core::Result<(Self, Vec<Var>)> {
        let mut vars = Vec::with_capacity(self.layers.len() * 2);
        let mut layers = Vec::with_capacity(self.layers.len());
        for (weight, bias) in self.layers {
            let weight = Var::from_tensor(&weight)?;
            let bias = Var::from_tensor(&bias)?;
            layers.push((weight.as_tensor().clone(), bias.as_tensor().clone()));
            vars.push(weight);
            vars.push(bias);
        }
        Ok((Self { layers }, vars))
    }

    /// Serialize the current parameters to a new safetensors payload
    pub fn to_payload(&self) -> Result<Vec<u8>> {
        encode_dense_layers(&self.layers)
    }
}

/// Serialize `(weight, bias)` pairs as a dense-stack payload
pub fn encode_dense_layers(layers: &[(Tensor, Tensor)]) -> Result<Vec<u8>> {
    let mut named = Vec::with_capacity(layers.len() * 2);
    for (index, (weight, bias)) in layers.iter().enumerate() {
        named.push((format!("{}{}.weight", LAYER_PREFIX, index), weight.clone()));
        named.push((format!("{}{}.bias", LAYER_PREFIX, index), bias.clone()));
    }

    safetensors::tensor::serialize(named, &None)
        .map_err(|e| Error::internal(format!("Failed to serialize model: {}", e)))
}

/// Build a freshly initialized payload for the given layer widths, e.g.
/// `[input_len, 64, num_labels]`.
pub fn init_dense_payload(sizes: &[usize]) -> Result<Vec<u8>> {
    if sizes.len() < 2 {
        return Err(Error::input("a dense stack needs at least input and output widths"));
    }

    let device = Device::Cpu;
    let layers = sizes
        .windows(2)
        .map(|pair| {
            let (in_dim, out_dim) = (pair[0], pair[1]);
            let std = (2.0 / in_dim.max(1) as f64).sqrt();
            let weight = Tensor::randn(0f32, std as f32, (out_dim, in_dim), &device)?;
            let bias = Tensor::zeros(out_dim, DType::F32, &device)?;
            Ok((weight, bias))
        })
        .collect::<candle_core::Result<Vec<_>>>()
        .map_err(|e| Error::internal(format!("Failed to initialize layers: {}", e)))?;

    encode_dense_layers(&layers)
}

/// Check that a payload decodes and fits the geometry
pub fn validate_payload(payload: &[u8], geometry: &ImageGeometry) -> Result<()> {
    let stack = DenseStack::from_payload(payload, &Device::Cpu)?;
    if stack.input_len() != geometry.input_len() {
        return Err(Error::input(format!(
            "model expects {} inputs but geometry {} produces {}",
            stack.input_len(),
            geometry,
            geometry.input_len()
        )));
    }
    Ok(())
}

fn payload_err(e: candle_core::Error) -> Error {
    Error::input(format!("invalid model payload: {}", e))
}

/// Pixels scaled to `[0, 1]`, shaped `[rows, row_len]`
fn input_tensor(pixels: Vec<u8>, rows: usize, row_len: usize, device: &Device) -> candle_core::Result<Tensor> {
    Tensor::from_vec(pixels, (rows, row_len), device)?
        .to_dtype(DType::F32)?
        .affine(1.0 / 255.0, 0.0)
}

/// Image model classifier over a dense-stack payload
pub struct ImageModelClassifier {
    payload: Vec<u8>,
    labels: LabelMap,
    geometry: ImageGeometry,
    training: TrainingParams,
    device: Device,
}

impl ImageModelClassifier {
    /// Create a new image model classifier.
    ///
    /// The payload is decoded once here so an invalid model is rejected
    /// immediately rather than at first use.
    pub fn new(
        payload: Vec<u8>,
        labels: LabelMap,
        geometry: ImageGeometry,
        training: TrainingParams,
    ) -> Result<Self> {
        validate_payload(&payload, &geometry)?;
        Ok(Self {
            payload,
            labels,
            geometry,
            training,
            device: Device::Cpu,
        })
    }

    fn load_model(&self) -> Result<DenseStack> {
        DenseStack::from_payload(&self.payload, &self.device)
    }

    fn try_predict(&self, image: &DynamicImage) -> Result<usize> {
        let model = self.load_model()?;
        let pixels = preprocess::normalize(image, &self.geometry)?;
        let row_len = self.geometry.input_len();

        let predicted = input_tensor(pixels, 1, row_len, &self.device)
            .and_then(|xs| model.forward(&xs))
            .and_then(|logits| logits.argmax(D::Minus1))
            .and_then(|index| index.to_vec1::<u32>())
            .map_err(|e| Error::inference(e.to_string()))?;

        predicted
            .first()
            .map(|index| *index as usize)
            .ok_or_else(|| Error::inference("model produced an empty output"))
    }

    fn train(&self, samples: &[(usize, &DynamicImage)]) -> Result<Vec<u8>> {
        let model = self
            .load_model()
            .map_err(|e| Error::training(e.to_string()))?;

        let outputs = model.output_len();
        if let Some((index, _)) = samples.iter().find(|(index, _)| *index >= outputs) {
            return Err(Error::training(format!(
                "label index {} is outside the model's {} outputs",
                index, outputs
            )));
        }

        let pixels = preprocess::normalize_batch(samples.iter().map(|(_, image)| *image), &self.geometry)?;
        let targets: Vec<u32> = samples.iter().map(|(index, _)| *index as u32).collect();

        let fit = || -> candle_core::Result<DenseStack> {
            let (model, vars) = model.into_trainable()?;
            let xs = input_tensor(pixels, samples.len(), self.geometry.input_len(), &self.device)?;
            let ys = Tensor::from_vec(targets, samples.len(), &self.device)?;
            let mut optimizer = SGD::new(vars, self.training.learning_rate)?;

            for epoch in 0..self.training.epochs {
                if self.training.deadline_passed() {
                    candle_core::bail!("deadline passed after {} epochs", epoch);
                }
                let logits = model.forward(&xs)?;
                let loss = loss::cross_entropy(&logits, &ys)?;
                let value = loss.to_scalar::<f32>()?;
                if !value.is_finite() {
                    candle_core::bail!("loss diverged at epoch {}", epoch + 1);
                }
                optimizer.backward_step(&loss)?;
                debug!(epoch = epoch + 1, loss = value, "Image model training epoch");
            }
            Ok(model)
        };

        let trained = fit().map_err(|e| {
            if self.training.deadline_passed() {
                Error::Timeout
            } else {
                Error::training(e.to_string())
            }
        })?;
        trained.to_payload().map_err(|e| Error::training(e.to_string()))
    }
}

impl Classifier for ImageModelClassifier {
    fn kind(&self) -> BackendKind {
        BackendKind::ImageModel
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
                warn!(backend = %BackendKind::ImageModel, error = %e, "Image model inference failed");
                None
            }
        }
    }

    fn retrain_indexed(&self, samples: &[(usize, &DynamicImage)]) -> Result<ClassifierArtifact> {
        let start = Instant::now();
        let payload = self.train(samples).map_err(|e| {
            warn!(backend = %BackendKind::ImageModel, samples = samples.len(), error = %e, "Image model training failed");
            e
        })?;

        info!(
            samples = samples.len(),
            epochs = self.training.epochs,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Image model retrained"
        );

        ClassifierArtifact::image_model(payload, self.labels.clone(), self.geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshcheck_core::ColorMode;
    use image::{GrayImage, Luma};

    fn gray(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(2, 2, Luma([value])))
    }

    fn geometry() -> ImageGeometry {
        ImageGeometry::new(2, 2, ColorMode::Luma)
    }

    /// Bright images score index 1, dark images index 0
    fn brightness_payload() -> Vec<u8> {
        let device = Device::Cpu;
        let weight = Tensor::new(&[[-1f32, -1., -1., -1.], [1., 1., 1., 1.]], &device).unwrap();
        let bias = Tensor::new(&[0.1f32, 0.0], &device).unwrap();
        encode_dense_layers(&[(weight, bias)]).unwrap()
    }

    fn classifier() -> ImageModelClassifier {
        let labels = LabelMap::from_labels(["rottenApple", "freshApple"]).unwrap();
        ImageModelClassifier::new(brightness_payload(), labels, geometry(), TrainingParams::default()).unwrap()
    }

    #[test]
    fn test_predict_by_brightness() {
        let classifier = classifier();
        assert_eq!(classifier.predict_raw(&gray(250)), Some(1));
        assert_eq!(classifier.predict_raw(&gray(0)), Some(0));

        let prediction = classifier.classify(&gray(250)).unwrap();
        assert_eq!(prediction.species, "Apple");
        assert!(prediction.is_fresh);
    }

    #[test]
    fn test_rejects_mismatched_geometry() {
        let labels = LabelMap::from_labels(["rottenApple", "freshApple"]).unwrap();
        let wrong = ImageGeometry::new(3, 3, ColorMode::Luma);
        let result = ImageModelClassifier::new(brightness_payload(), labels, wrong, TrainingParams::default());
        assert!(matches!(result, Err(Error::Input(_))));
    }

    #[test]
    fn test_rejects_garbage_payload() {
        let labels = LabelMap::from_labels(["freshApple"]).unwrap();
        let result = ImageModelClassifier::new(b"garbage".to_vec(), labels, geometry(), TrainingParams::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_multi_layer_stack() {
        let payload = init_dense_payload(&[4, 8, 3]).unwrap();
        let stack = DenseStack::from_payload(&payload, &Device::Cpu).unwrap();
        assert_eq!(stack.input_len(), 4);
        assert_eq!(stack.output_len(), 3);

        let labels = LabelMap::from_labels(["freshA", "freshB", "freshC"]).unwrap();
        let classifier = ImageModelClassifier::new(payload, labels, geometry(), TrainingParams::default()).unwrap();
        let index = classifier.predict_raw(&gray(128)).unwrap();
        assert!(index < 3);
    }

    #[test]
    fn test_retrain_produces_new_payload() {
        let classifier = classifier();
        let dark = gray(10);
        let bright = gray(240);

        // teach the inverted mapping
        let samples = vec![(1usize, &dark), (0usize, &bright)];
        let artifact = classifier.retrain_indexed(&samples).unwrap();

        assert_eq!(artifact.kind(), BackendKind::ImageModel);
        assert_ne!(artifact.payload(), brightness_payload().as_slice());
        assert_eq!(artifact.labels(), classifier.labels());
        assert_eq!(artifact.geometry(), classifier.geometry());

        // original instance is untouched
        assert_eq!(classifier.predict_raw(&bright), Some(1));
    }

    #[test]
    fn test_retrain_stops_at_deadline() {
        let labels = LabelMap::from_labels(["rottenApple", "freshApple"]).unwrap();
        let training = TrainingParams::default()
            .with_epochs(usize::MAX)
            .with_deadline(Instant::now() + std::time::Duration::from_millis(50));
        let classifier = ImageModelClassifier::new(brightness_payload(), labels, geometry(), training).unwrap();

        let image = gray(10);
        let err = classifier.retrain_indexed(&[(1, &image)]).unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn test_retrain_index_out_of_range() {
        let classifier = classifier();
        let image = gray(10);
        let err = classifier.retrain_indexed(&[(5, &image)]).unwrap_err();
        assert!(matches!(err, Error::Training(_)));
    }
}
