//! Compound "freshness + species" labels and the index-to-label map
//!
//! A label is one of the freshness prefixes glued to a species name, for
//! example `freshApple` or `rottenBanana`. Backends only ever see the
//! categorical index; the [`LabelMap`] owned by each classifier translates
//! between the two.

use freshcheck_core::{Error, Prediction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Prefix marking a fresh sample
pub const FRESH_PREFIX: &str = "fresh";

/// Prefix marking a rotten sample
pub const ROTTEN_PREFIX: &str = "rotten";

/// Species reported when an index or label cannot be resolved
pub const UNKNOWN_SPECIES: &str = "Unknown";

/// Label decoding failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("label '{0}' does not start with 'fresh' or 'rotten'")]
    UnknownPrefix(String),

    #[error("label '{0}' has no species after its prefix")]
    EmptySpecies(String),
}

impl From<LabelError> for Error {
    fn from(err: LabelError) -> Self {
        Error::input(err.to_string())
    }
}

/// Split a label into `(species, is_fresh)`.
///
/// Both prefixes are checked explicitly; a label matching neither is an
/// error rather than a guess.
pub fn decode(label: &str) -> Result<(String, bool), LabelError> {
    let (species, is_fresh) = if let Some(rest) = label.strip_prefix(FRESH_PREFIX) {
        (rest, true)
    } else if let Some(rest) = label.strip_prefix(ROTTEN_PREFIX) {
        (rest, false)
    } else {
        return Err(LabelError::UnknownPrefix(label.to_string()));
    };

    if species.is_empty() {
        return Err(LabelError::EmptySpecies(label.to_string()));
    }

    Ok((species.to_string(), is_fresh))
}

/// Build a label from its components
pub fn encode(species: &str, is_fresh: bool) -> String {
    let prefix = if is_fresh { FRESH_PREFIX } else { ROTTEN_PREFIX };
    format!("{}{}", prefix, species)
}

/// Resolve a label into a prediction, substituting the unknown placeholder
/// (not fresh) when the label cannot be decoded.
pub fn to_prediction(label: &str) -> Prediction {
    match decode(label) {
        Ok((species, is_fresh)) => Prediction::new(species, is_fresh),
        Err(e) => {
            tracing::warn!("Could not decode label: {}", e);
            unknown_prediction()
        }
    }
}

/// Prediction used when an index has no usable label
pub fn unknown_prediction() -> Prediction {
    Prediction::new(UNKNOWN_SPECIES, false)
}

/// Immutable mapping from categorical index to label text.
///
/// Indices are contiguous from 0 and the mapping is a bijection: no two
/// indices share a label, so the inverse lookup used for retraining is always
/// well defined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<usize, String>", into = "BTreeMap<usize, String>")]
pub struct LabelMap {
    labels: BTreeMap<usize, String>,
}

impl LabelMap {
    /// Create a label map from explicit `(index, label)` entries
    pub fn new(entries: impl IntoIterator<Item = (usize, String)>) -> freshcheck_core::Result<Self> {
        let labels: BTreeMap<usize, String> = entries.into_iter().collect();
        Self::try_from(labels)
    }

    /// Create a label map where each label's index is its position
    pub fn from_labels<S: Into<String>>(
        labels: impl IntoIterator<Item = S>,
    ) -> freshcheck_core::Result<Self> {
        Self::new(labels.into_iter().map(Into::into).enumerate())
    }

    /// Forward lookup
    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(&index).map(String::as_str)
    }

    /// Inverse map from label text to index
    pub fn inverse(&self) -> HashMap<&str, usize> {
        self.labels
            .iter()
            .map(|(index, label)| (label.as_str(), *index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Iterate entries in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.labels.iter().map(|(index, label)| (*index, label.as_str()))
    }
}

impl TryFrom<BTreeMap<usize, String>> for LabelMap {
    type Error = Error;

    fn try_from(labels: BTreeMap<usize, String>) -> freshcheck_core::Result<Self> {
        // keys are sorted, so contiguity means the n-th key is n
        if let Some((position, index)) = labels.keys().enumerate().find(|&(position, &index)| position != index) {
            return Err(Error::input(format!(
                "label indices must be contiguous from 0: expected index {}, found {}",
                position, index
            )));
        }

        let mut seen: HashMap<&str, usize> = HashMap::with_capacity(labels.len());
        for (index, label) in &labels {
            if let Some(previous) = seen.insert(label.as_str(), *index) {
                return Err(Error::input(format!(
                    "label '{}' is mapped by both index {} and index {}",
                    label, previous, index
                )));
            }
        }
        Ok(Self { labels })
    }
}

impl From<LabelMap> for BTreeMap<usize, String> {
    fn from(map: LabelMap) -> Self {
        map.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_fresh_and_rotten() {
        assert_eq!(decode("freshApple").unwrap(), ("Apple".to_string(), true));
        assert_eq!(decode("rottenApple").unwrap(), ("Apple".to_string(), false));
    }

    #[test]
    fn test_decode_rejects_unknown_prefix() {
        assert_eq!(
            decode("ripeMango"),
            Err(LabelError::UnknownPrefix("ripeMango".to_string()))
        );
        assert!(matches!(decode(""), Err(LabelError::UnknownPrefix(_))));
        // prefixes are case sensitive
        assert!(decode("FreshApple").is_err());
    }

    #[test]
    fn test_decode_rejects_empty_species() {
        assert_eq!(
            decode("rotten"),
            Err(LabelError::EmptySpecies("rotten".to_string()))
        );
    }

    #[test]
    fn test_unknown_label_becomes_placeholder() {
        let prediction = to_prediction("Apple");
        assert_eq!(prediction, Prediction::new(UNKNOWN_SPECIES, false));
    }

    #[test]
    fn test_label_map_inverse() {
        let map = LabelMap::from_labels(["freshApple", "rottenApple"]).unwrap();
        let inverse = map.inverse();
        assert_eq!(inverse["freshApple"], 0);
        assert_eq!(inverse["rottenApple"], 1);
        assert_eq!(map.label(1), Some("rottenApple"));
        assert_eq!(map.label(2), None);
    }

    #[test]
    fn test_label_map_rejects_duplicates() {
        assert!(LabelMap::from_labels(["freshApple", "freshApple"]).is_err());
    }

    #[test]
    fn test_label_map_rejects_gaps() {
        let gapped = LabelMap::new([(0, "freshApple".to_string()), (3, "rottenApple".to_string())]);
        assert!(matches!(gapped, Err(Error::Input(_))));

        let offset = LabelMap::new([(1, "freshApple".to_string()), (2, "rottenApple".to_string())]);
        assert!(offset.is_err());
    }

    #[test]
    fn test_label_map_serde_validates() {
        let json = r#"{"0":"freshKiwi","1":"rottenKiwi"}"#;
        let map: LabelMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.label(1), Some("rottenKiwi"));

        let gapped = r#"{"0":"freshKiwi","3":"rottenKiwi"}"#;
        assert!(serde_json::from_str::<LabelMap>(gapped).is_err());

        let duplicated = r#"{"0":"freshKiwi","1":"freshKiwi"}"#;
        assert!(serde_json::from_str::<LabelMap>(duplicated).is_err());
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(species in "[A-Za-z][A-Za-z ]{0,15}", fresh in any::<bool>()) {
            let label = encode(&species, fresh);
            prop_assert_eq!(decode(&label).unwrap(), (species, fresh));
        }

        #[test]
        fn prop_decode_rejects_unprefixed(label in "[A-Za-z]{0,12}") {
            prop_assume!(!label.starts_with(FRESH_PREFIX) && !label.starts_with(ROTTEN_PREFIX));
            prop_assert!(matches!(decode(&label), Err(LabelError::UnknownPrefix(_))));
        }
    }
}
