// ============================================================
// Layer 5 — Early Stopping
// ============================================================
// Watches one validation metric across epochs and decides when
// patience has run out. The tracker only decides; the
// orchestrator stages the best snapshot and restores it.
//
// The state is serialisable and committed with the epoch cursor,
// so patience keeps counting across a resume.
//
// Patience only starts counting once a best value exists: an
// epoch can never stop training before there is a best state to
// roll back to.
//
// Reference: Keras EarlyStopping (monitor, patience, min_delta)

use serde::{Deserialize, Serialize};

use crate::infra::metrics::EpochRecord;

/// Validation metric watched for improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum EarlyStopMetric {
    /// Lower is better
    ValLoss,
    /// Higher is better
    ValAccuracy,
}

impl EarlyStopMetric {
    pub fn value(&self, record: &EpochRecord) -> f64 {
        match self {
            Self::ValLoss     => record.val_loss,
            Self::ValAccuracy => record.val_accuracy,
        }
    }

    /// NaN never counts as an improvement
    fn improves(&self, candidate: f64, best: f64, min_delta: f64) -> bool {
        match self {
            Self::ValLoss     => candidate < best - min_delta,
            Self::ValAccuracy => candidate > best + min_delta,
        }
    }
}

/// Persisted part of the tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingState {
    /// Best metric value seen so far
    pub best: Option<f64>,

    /// Epoch number (1-based) where `best` was reached
    pub best_epoch: Option<usize>,

    pub epochs_without_improvement: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    /// New best value; this epoch's state becomes the best snapshot
    Improved,
    /// No improvement, patience not yet exhausted
    Continue,
    /// Patience exhausted
    Stop,
}

/// Stops training once the metric fails to improve for `patience`
/// consecutive epochs.
///
/// # Example
///
/// ```ignore
/// let mut tracker = EarlyStopping::new(EarlyStopMetric::ValLoss, 3);
/// let decision = tracker.observe(&record);
/// ```
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    metric:    EarlyStopMetric,
    patience:  usize,
    min_delta: f64,
    state:     EarlyStoppingState,
}

impl EarlyStopping {
    pub fn new(metric: EarlyStopMetric, patience: usize) -> Self {
        Self { metric, patience, min_delta: 0.0, state: EarlyStoppingState::default() }
    }

    /// Minimum change that counts as an improvement
    pub fn with_min_delta(mut self, min_delta: f64) -> Self {
        self.min_delta = min_delta;
        self
    }

    /// Continue from a persisted state
    pub fn restore(&mut self, state: EarlyStoppingState) {
        self.state = state;
    }

    pub fn state(&self) -> &EarlyStoppingState {
        &self.state
    }

    pub fn observe(&mut self, record: &EpochRecord) -> StopDecision {
        let value = self.metric.value(record);

        let improved = match self.state.best {
            None if value.is_nan() => return StopDecision::Continue,
            None       => true,
            Some(best) => self.metric.improves(value, best, self.min_delta),
        };

        if improved {
            self.state.best       = Some(value);
            self.state.best_epoch = Some(record.epoch);
            self.state.epochs_without_improvement = 0;
            return StopDecision::Improved;
        }

        self.state.epochs_without_improvement += 1;
        if self.state.epochs_without_improvement >= self.patience {
            tracing::info!(
                "Early stopping: no {:?} improvement for {} epochs (best {:.4} at epoch {})",
                self.metric,
                self.state.epochs_without_improvement,
                self.state.best.unwrap_or(f64::NAN),
                self.state.best_epoch.unwrap_or(0),
            );
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }
}
