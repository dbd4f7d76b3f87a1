// ============================================================
// Layer 6 — Metrics Writer
// ============================================================
// Writes the informational result artifacts of a run:
//
//   history.json           — every EpochRecord, in order
//   metrics.csv            — the same history as a table
//   final_evaluation.json  — {"loss": .., "accuracy": ..}
//
// Example CSV output:
//   epoch,train_loss,train_accuracy,val_loss,val_accuracy
//   1,2.301200,0.112000,2.288100,0.131000
//   2,1.954300,0.301000,1.902200,0.327000
//
// The files are rewritten in full from the run's history, so a
// resumed run produces the same artifacts as an uninterrupted one.
// Nothing in the resume path reads them back.
//
// Reference: Rust Book §12 (I/O and File Handling)

use std::{
    fmt::Write as _,
    fs,
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use crate::domain::error::PipelineError;
use crate::infra::checkpoint::{write_atomic, write_json};

/// Mean loss and accuracy over a number of batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub loss:     f64,
    pub accuracy: f64,
}

/// One row of metrics data for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// The epoch number (starts at 1)
    pub epoch: usize,

    pub train_loss:     f64,
    pub train_accuracy: f64,

    /// Scored on the validation partition, never trained on
    pub val_loss:     f64,
    pub val_accuracy: f64,
}

impl EpochRecord {
    pub fn new(epoch: usize, train: Evaluation, validation: Evaluation) -> Self {
        Self {
            epoch,
            train_loss:     train.loss,
            train_accuracy: train.accuracy,
            val_loss:       validation.loss,
            val_accuracy:   validation.accuracy,
        }
    }
}

/// Writes history and final evaluation into the output directory.
pub struct MetricsWriter {
    dir: PathBuf,
}

impl MetricsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(Self { dir })
    }

    /// Rewrite history.json and metrics.csv from the full history
    pub fn write_history(&self, history: &[EpochRecord]) -> Result<(), PipelineError> {
        write_json(&self.dir.join("history.json"), history)?;

        let mut csv = String::from("epoch,train_loss,train_accuracy,val_loss,val_accuracy\n");
        for m in history {
            // Writing into a String cannot fail
            let _ = writeln!(
                csv,
                "{},{:.6},{:.6},{:.6},{:.6}",
                m.epoch, m.train_loss, m.train_accuracy, m.val_loss, m.val_accuracy,
            );
        }
        write_atomic(&self.dir.join("metrics.csv"), csv.as_bytes())?;

        tracing::debug!("Wrote {} epochs of history to '{}'", history.len(), self.dir.display());
        Ok(())
    }

    pub fn write_final_evaluation(&self, evaluation: &Evaluation) -> Result<(), PipelineError> {
        write_json(&self.dir.join("final_evaluation.json"), evaluation)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_history_written_as_json_and_csv() {
        let tmp    = TempDir::new().unwrap();
        let writer = MetricsWriter::new(tmp.path()).unwrap();
        let history = vec![
            EpochRecord::new(1, Evaluation { loss: 2.0, accuracy: 0.1 }, Evaluation { loss: 1.5, accuracy: 0.2 }),
            EpochRecord::new(2, Evaluation { loss: 1.0, accuracy: 0.5 }, Evaluation { loss: 1.2, accuracy: 0.4 }),
        ];

        writer.write_history(&history).unwrap();

        let json: Vec<EpochRecord> =
            serde_json::from_slice(&fs::read(tmp.path().join("history.json")).unwrap()).unwrap();
        assert_eq!(json, history);

        let csv = fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2], "2,1.000000,0.500000,1.200000,0.400000");
    }

    #[test]
    fn test_final_evaluation_shape() {
        let tmp    = TempDir::new().unwrap();
        let writer = MetricsWriter::new(tmp.path()).unwrap();
        writer.write_final_evaluation(&Evaluation { loss: 0.25, accuracy: 0.9 }).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(tmp.path().join("final_evaluation.json")).unwrap()).unwrap();
        assert_eq!(value["loss"], 0.25);
        assert_eq!(value["accuracy"], 0.9);
    }
}
