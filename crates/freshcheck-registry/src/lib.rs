//! freshcheck Registry
//!
//! Storage for immutable classifier artifacts and the version history that
//! decides which one is active.
//!
//! - [`ModelRegistry`]: the async registry contract
//! - [`VersionLedger`]: append-only, hash-chained promotion history
//! - [`InMemoryRegistry`] and [`FileRegistry`]: implementations
//!
//! Promoting an artifact appends a history entry; the active artifact is the
//! one named by the latest entry. History is never rewritten, even when an
//! artifact it references is erased.

pub mod ledger;
pub mod memory;
pub mod persistence;
pub mod records;
pub mod registry;
mod state;

pub use ledger::{HistoryEntry, HistoryId, VersionLedger};
pub use memory::InMemoryRegistry;
pub use persistence::FileRegistry;
pub use records::{
    ArtifactId, ArtifactRecord, ArtifactSummary, HistoryRecord, NewArtifact, NewPrediction,
    PredictionId, PredictionRecord,
};
pub use registry::ModelRegistry;
