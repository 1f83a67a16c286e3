//! Decoding of uploaded model blobs into artifacts.
//!
//! Uploads are tried against an ordered list of formats. A decoder either
//! declines (the bytes are not in its format) or claims the upload, in which
//! case its outcome is final: a claimed upload that then fails validation is
//! rejected rather than handed to the next decoder.

use crate::artifact::ClassifierArtifact;
use crate::feature_vector::FeatureModel;
use crate::label::LabelMap;
use freshcheck_core::{Error, ImageGeometry, Result};
use tracing::{debug, info};

/// Upload formats, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFormat {
    /// MessagePack-encoded [`ClassifierArtifact`]
    Envelope,
    /// JSON document of a fitted linfa model
    NativeModel,
}

impl UploadFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Envelope => "envelope",
            Self::NativeModel => "native-model",
        }
    }
}

/// Caller-supplied context for uploads that do not carry their own metadata
#[derive(Debug, Clone, Default)]
pub struct UploadContext {
    /// Labels for a bare model, in index order
    pub labels: Option<LabelMap>,

    /// Geometry for a bare model; [`ImageGeometry::default`] when absent
    pub geometry: Option<ImageGeometry>,
}

type Decoder = fn(&[u8], &UploadContext) -> Option<Result<ClassifierArtifact>>;

const DECODERS: &[(UploadFormat, Decoder)] = &[
    (UploadFormat::Envelope, decode_envelope),
    (UploadFormat::NativeModel, decode_native_model),
];

/// Decode an uploaded blob, trying each known format in turn.
///
/// The first format that deserializes the bytes is authoritative. A bare
/// model is wrapped in the feature-vector backend and requires labels.
pub fn decode_upload(bytes: &[u8], context: &UploadContext) -> Result<ClassifierArtifact> {
    for (format, decoder) in DECODERS {
        match decoder(bytes, context) {
            Some(result) => {
                let artifact = result?;
                info!(
                    format = format.as_str(),
                    kind = %artifact.kind(),
                    labels = artifact.labels().len(),
                    geometry = %artifact.geometry(),
                    "Decoded uploaded model"
                );
                return Ok(artifact);
            }
            None => debug!(format = format.as_str(), "Upload is not in this format"),
        }
    }

    Err(Error::input(
        "upload is neither an artifact envelope nor a supported native model",
    ))
}

fn decode_envelope(bytes: &[u8], context: &UploadContext) -> Option<Result<ClassifierArtifact>> {
    let artifact: ClassifierArtifact = rmp_serde::from_slice(bytes).ok()?;
    if context.labels.is_some() {
        debug!("Envelope carries its own labels; supplied labels ignored");
    }
    // an upload is a new instance even when the same envelope arrives twice
    Some(artifact.validate().map(|_| artifact.reissued()))
}

fn decode_native_model(bytes: &[u8], context: &UploadContext) -> Option<Result<ClassifierArtifact>> {
    let model = FeatureModel::from_json(bytes).ok()?;
    let Some(labels) = context.labels.clone() else {
        return Some(Err(Error::input(format!(
            "a bare {} model needs a label list",
            model.name()
        ))));
    };
    let geometry = context.geometry.unwrap_or_default();
    Some(ClassifierArtifact::feature_vector(&model, labels, geometry))
}

/// Build an image-model envelope from a raw safetensors weights file
pub fn pack_image_model(weights: Vec<u8>, labels: LabelMap, geometry: ImageGeometry) -> Result<Vec<u8>> {
    ClassifierArtifact::image_model(weights, labels, geometry)?.to_envelope()
}
