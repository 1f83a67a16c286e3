//! Service configuration

use freshcheck_classifiers::TrainingParams;
use freshcheck_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for the serving facade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root directory of the file registry
    #[serde(default = "default_registry_dir")]
    pub registry_dir: PathBuf,

    /// Upper bound on a retrain call; unbounded when absent
    #[serde(default)]
    pub retrain_timeout_secs: Option<u64>,

    /// Record every classification in the registry
    #[serde(default = "default_true")]
    pub record_predictions: bool,

    /// Parameters for retrainable backends
    #[serde(default)]
    pub training: TrainingParams,
}

fn default_registry_dir() -> PathBuf {
    PathBuf::from("./registry")
}

fn default_true() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            registry_dir: default_registry_dir(),
            retrain_timeout_secs: None,
            record_predictions: true,
            training: TrainingParams::default(),
        }
    }
}

/// Values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub registry_dir: Option<PathBuf>,
    pub retrain_timeout_secs: Option<u64>,
    pub record_predictions: Option<bool>,
    pub epochs: Option<usize>,
}

impl ServiceConfig {
    /// Load configuration from file and overrides.
    ///
    /// A missing file yields the defaults.
    pub fn load(config_path: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            Self::default()
        };

        if let Some(registry_dir) = &overrides.registry_dir {
            config.registry_dir = registry_dir.clone();
        }

        if let Some(timeout) = overrides.retrain_timeout_secs {
            config.retrain_timeout_secs = Some(timeout);
        }

        if let Some(record) = overrides.record_predictions {
            config.record_predictions = record;
        }

        if let Some(epochs) = overrides.epochs {
            config.training.epochs = epochs;
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::config(format!("Invalid config: {}", e)))
    }

    pub fn validate(&self) -> Result<()> {
        if self.training.epochs == 0 {
            return Err(Error::config("training.epochs must be at least 1"));
        }

        if !(self.training.learning_rate.is_finite() && self.training.learning_rate > 0.0) {
            return Err(Error::config("training.learning_rate must be a positive number"));
        }

        if self.retrain_timeout_secs == Some(0) {
            return Err(Error::config("retrain_timeout_secs must be at least 1"));
        }

        Ok(())
    }

    pub fn retrain_timeout(&self) -> Option<Duration> {
        self.retrain_timeout_secs.map(Duration::from_secs)
    }
}
