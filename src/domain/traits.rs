// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two external collaborators of the training pipeline:
//
//   Learner          → the model being trained. The orchestrator
//                      only drives it step by step and moves its
//                      state in and out as opaque bytes.
//   SampleTransform  → turns an image file into a normalised
//                      single-channel pixel array.
//
// Implementations:
//   - BurnLearner         (ml/learner.rs)
//   - GrayscaleTransform  (data/transform.rs)
//   - test doubles inside the #[cfg(test)] modules
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use crate::domain::batch::Batch;
use crate::domain::error::{LearnerError, PipelineError};

// ─── StepMetrics ──────────────────────────────────────────────────────────────
/// What the learner reports for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepMetrics {
    /// Mean loss over the batch
    pub loss: f64,

    /// Samples whose predicted class matched the label
    pub correct: usize,

    /// Samples in the batch
    pub count: usize,
}

// ─── Learner ──────────────────────────────────────────────────────────────────
/// A trainable classifier.
///
/// One epoch of fitting is a fixed number of `train_step` calls,
/// decided by the orchestrator. `snapshot` and `restore` must
/// round-trip: restoring a snapshot reproduces the learner's
/// predictions exactly.
pub trait Learner {
    /// Fit on one batch and update the learner's state
    fn train_step(&mut self, batch: &Batch) -> Result<StepMetrics, LearnerError>;

    /// Score one batch without updating state
    fn eval_step(&self, batch: &Batch) -> Result<StepMetrics, LearnerError>;

    /// Class probabilities for every image in the batch.
    /// The batch labels are ignored.
    fn predict(&self, batch: &Batch) -> Result<Vec<Vec<f32>>, LearnerError>;

    /// Serialise the full learner state
    fn snapshot(&self) -> Result<Vec<u8>, LearnerError>;

    /// Replace the learner state with a previous snapshot
    fn restore(&mut self, snapshot: &[u8]) -> Result<(), LearnerError>;
}

// ─── SampleTransform ──────────────────────────────────────────────────────────
/// Loads one image and produces `height * width` intensities in [0, 1].
pub trait SampleTransform {
    /// Output resolution as (height, width)
    fn dims(&self) -> (usize, usize);

    /// Decode and normalise the image at `path`.
    /// Any failure must be reported as `PipelineError::SampleDecode`.
    fn load(&self, path: &Path) -> Result<Vec<f32>, PipelineError>;
}
