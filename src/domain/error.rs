// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Every failure the pipeline can surface. None of these are
// swallowed: each carries the path or epoch needed to diagnose
// it, and the application layer adds context with anyhow.

use std::path::PathBuf;

use thiserror::Error;

/// Opaque failure reported by the external learner.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct LearnerError(String);

impl LearnerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The dataset root has no class subdirectories
    #[error("no class directories found under '{}'", .root.display())]
    DatasetEmpty { root: PathBuf },

    /// One sample of a batch could not be decoded; the batch is dropped
    #[error("cannot decode sample '{}': {reason}", .path.display())]
    SampleDecode { path: PathBuf, reason: String },

    /// Persisted training state exists but cannot be trusted
    #[error("checkpoint '{}' is corrupt: {reason}", .path.display())]
    CheckpointCorrupt { path: PathBuf, reason: String },

    /// A checkpoint write was attempted in the wrong order
    #[error("checkpoint writes out of order: {0}")]
    CheckpointOrder(String),

    #[error("learner failed: {0}")]
    Learner(#[from] LearnerError),

    /// The dataset's class directories no longer match the persisted table
    #[error(
        "class directories under '{}' do not match the persisted class table \
         (expected {expected:?}, found {found:?})",
        .root.display()
    )]
    ClassTableMismatch {
        root:     PathBuf,
        expected: Vec<String>,
        found:    Vec<String>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Wraps any failure that happened while an epoch was in flight
    #[error("epoch {epoch} failed: {source}")]
    Epoch {
        epoch: usize,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CheckpointCorrupt { path: path.into(), reason: reason.into() }
    }

    /// The innermost error, looking through `Epoch` wrappers
    pub fn root_cause(&self) -> &PipelineError {
        match self {
            Self::Epoch { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
