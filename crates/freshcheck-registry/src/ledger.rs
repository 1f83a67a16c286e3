//! Hash-chained version ledger
//!
//! Each promotion appends one [`HistoryEntry`]. Entries are chained by
//! SHA-256 so that editing, dropping or reordering any of them is detected by
//! [`VersionLedger::verify`].

use crate::ArtifactId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Ordinal id of a history entry, starting at 1
pub type HistoryId = u64;

/// "This artifact was promoted to active at this time"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Ordinal id
    pub id: HistoryId,

    /// When the artifact was promoted
    pub selected_at: DateTime<Utc>,

    /// The promoted artifact
    pub artifact_id: ArtifactId,

    /// Hash of this entry
    pub hash: String,

    /// Hash of the previous entry (for chaining)
    pub previous_hash: Option<String>,
}

/// Append-only promotion history
#[derive(Debug, Clone, Default)]
pub struct VersionLedger {
    entries: Vec<HistoryEntry>,
}

impl VersionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from previously persisted entries.
    ///
    /// Entries are taken as-is; call [`verify`](Self::verify) to check them.
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    /// Build the entry that promoting `artifact_id` would append, without
    /// appending it.
    ///
    /// Timestamps never go backwards, even if the wall clock does.
    pub fn next_entry(&self, artifact_id: ArtifactId) -> HistoryEntry {
        let latest = self.entries.last();
        let now = Utc::now();
        let selected_at = match latest {
            Some(previous) if previous.selected_at > now => previous.selected_at,
            _ => now,
        };

        let mut entry = HistoryEntry {
            id: latest.map_or(1, |previous| previous.id + 1),
            selected_at,
            artifact_id,
            hash: String::new(),
            previous_hash: latest.map(|previous| previous.hash.clone()),
        };
        entry.hash = compute_hash(&entry);
        entry
    }

    /// Append an entry produced by [`next_entry`](Self::next_entry)
    pub fn push(&mut self, entry: HistoryEntry) {
        debug_assert_eq!(entry.previous_hash, self.entries.last().map(|e| e.hash.clone()));
        self.entries.push(entry);
    }

    /// Record a promotion of `artifact_id`
    pub fn append(&mut self, artifact_id: ArtifactId) -> HistoryEntry {
        let entry = self.next_entry(artifact_id);
        self.push(entry.clone());
        entry
    }

    /// Verify the integrity of the chain
    pub fn verify(&self) -> bool {
        let mut previous: Option<&HistoryEntry> = None;

        for entry in &self.entries {
            if entry.previous_hash.as_ref() != previous.map(|p| &p.hash) {
                return false;
            }

            if let Some(previous) = previous {
                if entry.id <= previous.id || entry.selected_at < previous.selected_at {
                    return false;
                }
            }

            if entry.hash != compute_hash(entry) {
                return false;
            }

            previous = Some(entry);
        }

        true
    }

    /// Most recent entry, naming the active artifact
    pub fn latest(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    /// Look up an entry by id
    pub fn get(&self, id: HistoryId) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Whether any entry references `artifact_id`
    pub fn references(&self, artifact_id: ArtifactId) -> bool {
        self.entries.iter().any(|entry| entry.artifact_id == artifact_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hash over everything but the hash field itself
fn compute_hash(entry: &HistoryEntry) -> String {
    let mut hasher = Sha256::new();

    hasher.update(entry.id.to_be_bytes());
    hasher.update(entry.selected_at.to_rfc3339().as_bytes());
    hasher.update(entry.artifact_id.to_be_bytes());
    if let Some(ref previous) = entry.previous_hash {
        hasher.update(previous.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}
