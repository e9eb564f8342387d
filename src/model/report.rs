//! Training Report - summary of one completed `train` call

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Training Report describes one successful training run.
///
/// Returned by [`Predictor::train`](super::Predictor::train); failed runs
/// produce an error instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainingReport {
    rows: usize,
    features: usize,
    classes: usize,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
}

impl TrainingReport {
    pub(crate) const fn new(
        rows: usize,
        features: usize,
        classes: usize,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> Self {
        Self {
            rows,
            features,
            classes,
            started_at,
            finished_at,
        }
    }

    /// Get the number of training rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    /// Get the number of feature columns.
    #[must_use]
    pub const fn features(&self) -> usize {
        self.features
    }

    /// Get the number of distinct labels.
    #[must_use]
    pub const fn classes(&self) -> usize {
        self.classes
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the finish timestamp. This is also the model's training timestamp.
    #[must_use]
    pub const fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    /// Wall-clock training time.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.finished_at - self.started_at
    }
}
