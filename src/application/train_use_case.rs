// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Validate config, check it against a saved one  (Layer 2)
//   Step 2: Index the dataset, reusing a saved ClassTable  (Layer 4 - data)
//   Step 3: Split train / validation                       (Layer 4 - data)
//   Step 4: Build both batch streams                       (Layer 4 - data)
//   Step 5: Build the learner                              (Layer 5 - ml)
//   Step 6: Run or resume the orchestrator                 (Layer 5 - ml)
//   Step 7: Write history and final evaluation             (Layer 6 - infra)
//
// Running the same command again after an interruption resumes
// from the last committed epoch. Running it again after training
// finished just re-reports the result.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::data::{
    index::DatasetIndex,
    splitter::split_train_val,
    stream::BatchStream,
    transform::GrayscaleTransform,
};
use crate::domain::error::PipelineError;
use crate::infra::{checkpoint::CheckpointStore, metrics::MetricsWriter};
use crate::ml::{
    early_stopping::{EarlyStopMetric, EarlyStopping},
    learner::adam_learner,
    model::ClassifierConfig,
    trainer::{TrainingOrchestrator, TrainingReport},
};

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a training run, threaded explicitly through
// constructors. Saved as train_config.json next to the checkpoint
// so a resumed run (and `predict`) can rebuild the same model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainConfig {
    pub dataset_root:        PathBuf,
    pub output_dir:          PathBuf,
    pub batch_size:          usize,
    pub image_height:        usize,
    pub image_width:         usize,
    pub epochs:              usize,
    pub early_stop_patience: usize,
    pub early_stop_metric:   EarlyStopMetric,
    /// Smallest change in the watched metric that counts as improvement
    #[serde(default)]
    pub early_stop_min_delta: f64,
    pub random_seed:         u64,
    pub image_extension:     String,
    /// Fraction of samples held out for validation
    pub validation_split:    f64,
    pub learning_rate:       f64,
    pub channels:            usize,
    pub hidden_size:         usize,
    pub dropout:             f64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            dataset_root:        PathBuf::from("data/images"),
            output_dir:          PathBuf::from("checkpoints"),
            batch_size:          32,
            image_height:        28,
            image_width:         28,
            epochs:              10,
            early_stop_patience: 3,
            early_stop_metric:   EarlyStopMetric::ValLoss,
            early_stop_min_delta: 0.0,
            random_seed:         42,
            image_extension:     "png".to_string(),
            validation_split:    0.2,
            learning_rate:       1e-3,
            channels:            16,
            hidden_size:         128,
            dropout:             0.25,
        }
    }
}

impl TrainConfig {
    /// Reject values no run could use
    pub fn validate(&self) -> Result<(), PipelineError> {
        let fail = |msg: &str| -> Result<(), PipelineError> {
            Err(PipelineError::Config(msg.to_string()))
        };

        if self.batch_size == 0 {
            return fail("batch_size must be at least 1");
        }
        // the first pooling layer halves both sides
        if self.image_height < 2 || self.image_width < 2 {
            return fail("image_height and image_width must be at least 2");
        }
        if self.epochs == 0 {
            return fail("epochs must be at least 1");
        }
        if self.early_stop_patience == 0 {
            return fail("early_stop_patience must be at least 1");
        }
        if !(self.early_stop_min_delta >= 0.0 && self.early_stop_min_delta.is_finite()) {
            return fail("early_stop_min_delta must be a finite value >= 0");
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return fail("validation_split must be strictly between 0 and 1");
        }
        if !(self.learning_rate > 0.0) {
            return fail("learning_rate must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail("dropout must be in [0, 1)");
        }
        if self.channels == 0 || self.hidden_size == 0 {
            return fail("channels and hidden_size must be at least 1");
        }
        if self.image_extension.trim_start_matches('.').is_empty() {
            return fail("image_extension must not be empty");
        }
        Ok(())
    }

    /// A run can only continue a checkpoint if the data, its order,
    /// the model shape and the watched metric are unchanged. The epoch
    /// budget, patience, min_delta, learning rate and dropout may differ.
    pub fn check_resumable(&self, saved: &TrainConfig) -> Result<(), PipelineError> {
        let mut changed = Vec::new();
        if !same_location(&self.dataset_root, &saved.dataset_root) { changed.push("dataset_root"); }
        if self.batch_size != saved.batch_size { changed.push("batch_size"); }
        if self.image_height != saved.image_height { changed.push("image_height"); }
        if self.image_width != saved.image_width { changed.push("image_width"); }
        if self.random_seed != saved.random_seed { changed.push("random_seed"); }
        if self.image_extension != saved.image_extension { changed.push("image_extension"); }
        if self.validation_split != saved.validation_split { changed.push("validation_split"); }
        if self.channels != saved.channels { changed.push("channels"); }
        if self.hidden_size != saved.hidden_size { changed.push("hidden_size"); }
        // the saved best value is only comparable under the same metric
        if self.early_stop_metric != saved.early_stop_metric { changed.push("early_stop_metric"); }

        if changed.is_empty() {
            return Ok(());
        }
        Err(PipelineError::Config(format!(
            "'{}' holds a run with different {}; use a new output directory",
            self.output_dir.display(),
            changed.join(", ")
        )))
    }

    pub fn classifier(&self, num_classes: usize) -> ClassifierConfig {
        ClassifierConfig::new(num_classes)
            .with_channels(self.channels)
            .with_hidden_size(self.hidden_size)
            .with_dropout(self.dropout)
    }

    /// Seeds for the split and the two streams, all derived from one value
    fn seeds(&self) -> (u64, u64, u64) {
        (
            self.random_seed,
            self.random_seed.wrapping_add(1),
            self.random_seed.wrapping_add(2),
        )
    }
}

/// Equal paths, or two spellings of the same existing directory
fn same_location(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    matches!((a.canonicalize(), b.canonicalize()), (Ok(a), Ok(b)) if a == b)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on the default WGPU device
    pub fn execute(&self) -> Result<TrainingReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.execute_on::<TrainBackend>(device)
    }

    /// Execute the full training pipeline end to end on backend `B`
    pub fn execute_on<B: AutodiffBackend>(&self, device: B::Device) -> Result<TrainingReport> {
        let cfg = &self.config;

        // ── Step 1: Config ────────────────────────────────────────────────────
        cfg.validate()?;

        let mut store = CheckpointStore::open(&cfg.output_dir)
            .with_context(|| format!("Cannot open output directory '{}'", cfg.output_dir.display()))?;

        if let Some(saved) = store.load_config::<TrainConfig>()? {
            cfg.check_resumable(&saved)?;
            if saved != *cfg {
                tracing::warn!("Configuration differs from the saved run; continuing with the new values");
            }
        }
        store.save_config(cfg)?;

        // ── Step 2: Index ─────────────────────────────────────────────────────
        // The first run fixes the class ids; later runs must see the same classes
        let index = DatasetIndex::new(&cfg.dataset_root, &cfg.image_extension);
        let dataset = match store.load_classes()? {
            Some(classes) => index.build_with_classes(classes)?,
            None => {
                let dataset = index.build()?;
                store.save_classes(&dataset.classes)?;
                dataset
            }
        };
        if dataset.samples.is_empty() {
            return Err(PipelineError::DatasetEmpty { root: cfg.dataset_root.clone() }.into());
        }
        let num_classes = dataset.classes.len();
        tracing::info!("Classes: {:?}", dataset.classes.names());

        // ── Step 3: Split ─────────────────────────────────────────────────────
        let (split_seed, train_seed, valid_seed) = cfg.seeds();
        let (train_samples, val_samples) =
            split_train_val(dataset.samples, 1.0 - cfg.validation_split, split_seed);
        if train_samples.is_empty() || val_samples.is_empty() {
            return Err(PipelineError::Config(format!(
                "validation_split {} leaves {} training and {} validation samples",
                cfg.validation_split,
                train_samples.len(),
                val_samples.len()
            ))
            .into());
        }
        tracing::info!("Split: {} train, {} validation", train_samples.len(), val_samples.len());

        // ── Step 4: Streams ───────────────────────────────────────────────────
        let transform = GrayscaleTransform::new(cfg.image_height, cfg.image_width);
        let train = BatchStream::new(train_samples, num_classes, cfg.batch_size, train_seed, true, transform)?;
        let valid = BatchStream::new(val_samples, num_classes, cfg.batch_size, valid_seed, false, transform)?;

        // ── Step 5: Learner ───────────────────────────────────────────────────
        let mut learner = adam_learner::<B>(&cfg.classifier(num_classes), cfg.learning_rate, device);

        // ── Step 6: Train / resume ────────────────────────────────────────────
        let early_stopping = EarlyStopping::new(cfg.early_stop_metric, cfg.early_stop_patience)
            .with_min_delta(cfg.early_stop_min_delta);
        let mut orchestrator = TrainingOrchestrator::new(train, valid, store, early_stopping, cfg.epochs)?;
        let plan = orchestrator.plan();
        tracing::info!(
            "{} epochs of {} training steps and {} validation steps",
            plan.epochs,
            plan.steps_per_epoch,
            plan.validation_steps
        );

        let report = orchestrator
            .run(&mut learner)
            .with_context(|| format!("Training in '{}' stopped", cfg.output_dir.display()))?;

        // ── Step 7: Result artifacts ──────────────────────────────────────────
        let metrics = MetricsWriter::new(&cfg.output_dir)?;
        metrics.write_history(&report.history)?;
        metrics.write_final_evaluation(&report.final_evaluation)?;

        Ok(report)
    }
}
