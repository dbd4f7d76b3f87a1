// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Classifies image files with a trained (or partly trained) run:
//
//   1. Read train_config.json and classes.json from the output dir
//   2. Rebuild the classifier with the same shape
//   3. Load final_model.ckpt, or the latest committed snapshot
//      when training has not finished
//   4. Decode each image exactly like the training pipeline does
//      and report the most probable class

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use burn::tensor::backend::AutodiffBackend;

use crate::application::train_use_case::TrainConfig;
use crate::data::transform::GrayscaleTransform;
use crate::domain::{batch::Batch, sample::ClassTable, traits::{Learner, SampleTransform}};
use crate::infra::checkpoint::CheckpointStore;
use crate::ml::learner::adam_learner;

type PredictBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Classification of one image file
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub path:        PathBuf,
    pub class_name:  String,
    pub probability: f32,

    /// One probability per class id
    pub probabilities: Vec<f32>,
}

pub struct PredictUseCase<L: Learner> {
    learner:   L,
    classes:   ClassTable,
    transform: GrayscaleTransform,
}

/// Load the model stored in `output_dir` onto the default WGPU device
pub fn open(output_dir: impl AsRef<Path>) -> Result<PredictUseCase<impl Learner>> {
    open_on::<PredictBackend>(output_dir, burn::backend::wgpu::WgpuDevice::default())
}

/// Load the model stored in `output_dir` onto backend `B`
pub fn open_on<B: AutodiffBackend>(
    output_dir: impl AsRef<Path>,
    device:     B::Device,
) -> Result<PredictUseCase<impl Learner>> {
    let dir   = output_dir.as_ref();
    let store = CheckpointStore::open(dir)?;

    let config: TrainConfig = store
        .load_config()?
        .with_context(|| format!("No train_config.json in '{}'", dir.display()))?;
    let classes = store
        .load_classes()?
        .with_context(|| format!("No classes.json in '{}'", dir.display()))?;
    let snapshot = store
        .load_for_inference()?
        .with_context(|| format!("No trained model in '{}'", dir.display()))?;

    // Learning rate is irrelevant: this learner never trains
    let mut learner = adam_learner::<B>(&config.classifier(classes.len()), config.learning_rate, device);
    learner.restore(&snapshot)?;
    tracing::info!("Model loaded from '{}' ({} classes)", dir.display(), classes.len());

    Ok(PredictUseCase {
        learner,
        classes,
        transform: GrayscaleTransform::new(config.image_height, config.image_width),
    })
}

impl<L: Learner> PredictUseCase<L> {
    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    /// Classify every image in `paths`, in order
    pub fn predict(&self, paths: &[PathBuf]) -> Result<Vec<Prediction>> {
        if paths.is_empty() {
            bail!("No images given");
        }

        let images = paths
            .iter()
            .map(|p| self.transform.load(p))
            .collect::<Result<Vec<_>, _>>()?;

        // Labels are ignored by predict; class 0 is a placeholder
        let (height, width) = self.transform.dims();
        let batch = Batch::new(images, &vec![0; paths.len()], height, width, self.classes.len());
        let rows  = self.learner.predict(&batch)?;

        paths
            .iter()
            .zip(rows)
            .map(|(path, probabilities)| {
                let (best, probability) = probabilities
                    .iter()
                    .copied()
                    .enumerate()
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .context("Model returned no probabilities")?;
                let class_name = self
                    .classes
                    .name(best)
                    .with_context(|| format!("Model predicted unknown class id {best}"))?
                    .to_string();

                Ok(Prediction { path: path.clone(), class_name, probability, probabilities })
            })
            .collect()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainUseCase;
    use burn::backend::{Autodiff, NdArray};
    use image::{GrayImage, Luma};
    use std::fs;
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray>;

    fn train(tmp: &TempDir) -> PathBuf {
        let data = tmp.path().join("data");
        for (class, level) in [("dark", 10u8), ("bright", 240u8)] {
            fs::create_dir_all(data.join(class)).unwrap();
            for i in 0..8u8 {
                GrayImage::from_pixel(8, 8, Luma([level + i]))
                    .save(data.join(class).join(format!("{i}.png")))
                    .unwrap();
            }
        }

        let out = tmp.path().join("out");
        TrainUseCase::new(TrainConfig {
            dataset_root:  data,
            output_dir:    out.clone(),
            batch_size:    4,
            image_height:  8,
            image_width:   8,
            epochs:        2,
            channels:      2,
            hidden_size:   8,
            dropout:       0.0,
            validation_split: 0.25,
            ..Default::default()
        })
        .execute_on::<TestBackend>(Default::default())
        .unwrap();
        out
    }

    #[test]
    fn test_predicts_known_class_with_distribution() {
        let tmp = TempDir::new().unwrap();
        let out = train(&tmp);

        let query = tmp.path().join("query.png");
        GrayImage::from_pixel(12, 12, Luma([128u8])).save(&query).unwrap();

        let use_case = open_on::<TestBackend>(&out, Default::default()).unwrap();
        let predictions = use_case.predict(&[query.clone()]).unwrap();

        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.path, query);
        assert!(use_case.classes().id(&p.class_name).is_some());
        assert_eq!(p.probabilities.len(), 2);
        assert!((p.probabilities.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(p.probability >= 0.5);
    }

    #[test]
    fn test_missing_run_is_reported() {
        let tmp = TempDir::new().unwrap();
        assert!(open_on::<TestBackend>(tmp.path(), Default::default()).is_err());
    }

    #[test]
    fn test_undecodable_image_is_reported() {
        let tmp = TempDir::new().unwrap();
        let out = train(&tmp);
        let bogus = tmp.path().join("bogus.png");
        fs::write(&bogus, b"not an image").unwrap();

        let use_case = open_on::<TestBackend>(&out, Default::default()).unwrap();
        let err = use_case.predict(&[bogus]).unwrap_err();
        assert!(err.to_string().contains("bogus.png"), "{err}");
    }
}
