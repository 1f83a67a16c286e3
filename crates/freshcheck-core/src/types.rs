//! Core types for freshcheck

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    /// Produce identity, e.g. "Apple"
    pub species: String,

    /// Whether the produce is fresh (as opposed to rotten)
    pub is_fresh: bool,
}

impl Prediction {
    /// Create a new prediction
    pub fn new(species: impl Into<String>, is_fresh: bool) -> Self {
        Self {
            species: species.into(),
            is_fresh,
        }
    }
}

/// Colour mode an image is converted to before inference.
///
/// Serialized with the conventional raster mode names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorMode {
    /// 8-bit luma
    #[serde(rename = "L")]
    Luma,
    #[serde(rename = "RGB")]
    Rgb,
    #[serde(rename = "RGBA")]
    Rgba,
}

impl ColorMode {
    /// Number of 8-bit channels per pixel
    pub fn channels(&self) -> usize {
        match self {
            Self::Luma => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Luma => "L",
            Self::Rgb => "RGB",
            Self::Rgba => "RGBA",
        }
    }
}

impl std::str::FromStr for ColorMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "L" => Ok(Self::Luma),
            "RGB" => Ok(Self::Rgb),
            "RGBA" => Ok(Self::Rgba),
            other => Err(crate::Error::input(format!("unknown colour mode '{}'", other))),
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input geometry a backend was trained at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageGeometry {
    /// Target width in pixels
    pub width: u32,

    /// Target height in pixels
    pub height: u32,

    /// Target colour mode
    pub color_mode: ColorMode,
}

impl ImageGeometry {
    /// Create a new geometry
    pub fn new(width: u32, height: u32, color_mode: ColorMode) -> Self {
        Self {
            width,
            height,
            color_mode,
        }
    }

    /// Length of the flattened pixel vector for one image
    pub fn input_len(&self) -> usize {
        self.width as usize * self.height as usize * self.color_mode.channels()
    }
}

impl Default for ImageGeometry {
    fn default() -> Self {
        Self::new(32, 32, ColorMode::Luma)
    }
}

impl fmt::Display for ImageGeometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.color_mode)
    }
}

/// The closed set of prediction backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// Uniform random stand-in
    Baseline,
    /// Trained dense image model (safetensors payload)
    ImageModel,
    /// Fitted feature-vector model (linfa payload)
    FeatureVector,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::ImageModel => "image-model",
            Self::FeatureVector => "feature-vector",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
