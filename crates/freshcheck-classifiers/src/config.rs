//! Training configuration for retrainable backends

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Parameters applied when a backend retrains on a labeled batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Full passes over the batch
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// SGD step size
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    /// Training stops with a timeout once this instant has passed
    #[serde(skip)]
    pub deadline: Option<Instant>,
}

fn default_epochs() -> usize {
    5
}

fn default_learning_rate() -> f64 {
    0.05
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            deadline: None,
        }
    }
}

impl TrainingParams {
    /// Set the number of epochs
    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    /// Set the learning rate
    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    /// Set the instant after which training is abandoned
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}
