//! freshcheck Core
//!
//! Types and error handling shared across the freshcheck crates.
//!
//! This crate provides:
//! - The error taxonomy used at every classifier and registry boundary
//! - The `Prediction` value returned by classification
//! - Image geometry (target size and colour mode) carried by artifacts
//! - The closed set of backend kinds

pub mod error;
pub mod types;

pub use error::{Error, Result, Status};
pub use types::{BackendKind, ColorMode, ImageGeometry, Prediction};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result, Status};
    pub use crate::types::{BackendKind, ColorMode, ImageGeometry, Prediction};
}
