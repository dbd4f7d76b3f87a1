// Test doubles for the data pipeline: sample lists that never
// touch the disk and a transform that synthesises pixels from
// the sample path.

use std::path::{Path, PathBuf};

use crate::domain::error::PipelineError;
use crate::domain::sample::Sample;
use crate::domain::traits::SampleTransform;

/// Samples named `c{class}/{index}.png`, `counts[class]` per class
pub fn fake_samples(counts: &[usize]) -> Vec<Sample> {
    let mut samples = Vec::new();
    let mut index   = 0;
    for (class_id, &count) in counts.iter().enumerate() {
        for _ in 0..count {
            samples.push(Sample::new(format!("c{class_id}/{index}.png"), class_id));
            index += 1;
        }
    }
    samples
}

/// Produces a 2×2 image whose pixels encode the class and sample
/// index, so images from different samples are distinguishable.
/// Pixel 1 is always (class + 1) / 10.
#[derive(Debug, Clone, Default)]
pub struct FakeTransform {
    /// Paths that fail to "decode"
    pub broken: Vec<PathBuf>,
}

impl FakeTransform {
    pub fn failing_on(path: impl Into<PathBuf>) -> Self {
        Self { broken: vec![path.into()] }
    }
}

impl SampleTransform for FakeTransform {
    fn dims(&self) -> (usize, usize) {
        (2, 2)
    }

    fn load(&self, path: &Path) -> Result<Vec<f32>, PipelineError> {
        if self.broken.iter().any(|b| b == path) {
            return Err(PipelineError::SampleDecode {
                path:   path.to_path_buf(),
                reason: "injected decode failure".into(),
            });
        }

        let class: f32 = path
            .parent()
            .and_then(|p| p.to_str())
            .and_then(|s| s.trim_start_matches('c').parse().ok())
            .unwrap_or(0.0);
        let index: f32 = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.0);

        let base = (class + 1.0) / 10.0;
        Ok(vec![base, base, index / 1000.0, base])
    }
}
