// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and all
// their flags. Every TrainConfig field is a flag on `train`.
//
// Reference: Rust Book §12 (Building a CLI Program)

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::train_use_case::TrainConfig;
use crate::ml::early_stopping::EarlyStopMetric;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a classifier, or resume an interrupted run
    Train(TrainArgs),

    /// Classify images with a trained run
    Predict(PredictArgs),
}

/// All arguments for the `train` command.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Dataset root: one subdirectory per class
    #[arg(long, default_value = "data/images")]
    pub dataset_root: PathBuf,

    /// Where checkpoints and results are written; rerun with the
    /// same directory to resume
    #[arg(long, default_value = "checkpoints")]
    pub output_dir: PathBuf,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Images are resized to this height
    #[arg(long, default_value_t = 28)]
    pub image_height: usize,

    /// Images are resized to this width
    #[arg(long, default_value_t = 28)]
    pub image_width: usize,

    /// Total epoch budget, including epochs from earlier runs
    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Epochs without improvement before training stops
    #[arg(long, default_value_t = 3)]
    pub early_stop_patience: usize,

    /// Validation metric watched by early stopping
    #[arg(long, value_enum, default_value_t = EarlyStopMetric::ValLoss)]
    pub early_stop_metric: EarlyStopMetric,

    /// Smallest change in the watched metric that counts as improvement
    #[arg(long, default_value_t = 0.0)]
    pub early_stop_min_delta: f64,

    /// Seeds the split and both batch streams
    #[arg(long, default_value_t = 42)]
    pub random_seed: u64,

    /// Only files with this extension are indexed
    #[arg(long, default_value = "png")]
    pub image_extension: String,

    /// Fraction of samples held out for validation
    #[arg(long, default_value_t = 0.2)]
    pub validation_split: f64,

    #[arg(long, default_value_t = 1e-3)]
    pub learning_rate: f64,

    /// Filters in the first convolution layer
    #[arg(long, default_value_t = 16)]
    pub channels: usize,

    #[arg(long, default_value_t = 128)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 0.25)]
    pub dropout: f64,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            dataset_root:        a.dataset_root,
            output_dir:          a.output_dir,
            batch_size:          a.batch_size,
            image_height:        a.image_height,
            image_width:         a.image_width,
            epochs:              a.epochs,
            early_stop_patience: a.early_stop_patience,
            early_stop_metric:   a.early_stop_metric,
            early_stop_min_delta: a.early_stop_min_delta,
            random_seed:         a.random_seed,
            image_extension:     a.image_extension,
            validation_split:    a.validation_split,
            learning_rate:       a.learning_rate,
            channels:            a.channels,
            hidden_size:         a.hidden_size,
            dropout:             a.dropout,
        }
    }
}

/// All arguments for the `predict` command
#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Output directory of a training run
    #[arg(long, default_value = "checkpoints")]
    pub output_dir: PathBuf,

    /// Image files to classify
    #[arg(required = true)]
    pub images: Vec<PathBuf>,
}
