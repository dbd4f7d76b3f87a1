// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All work is delegated to Layer 2 (application).
//
// Two commands are supported:
//   1. `train`   — trains (or resumes training) on an image directory
//   2. `predict` — classifies image files with a trained run
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, PredictArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "resumable_trainer",
    version = "0.1.0",
    about = "Train a grayscale image classifier on a class-per-directory dataset. \
             Interrupted runs resume from the last completed epoch."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)   => run_train(args),
            Commands::Predict(args) => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on images in: {}", args.dataset_root.display());

    let output_dir = args.output_dir.clone();
    let report = TrainUseCase::new(args.into()).execute()?;

    if report.resumed_from > 0 {
        println!("Resumed after epoch {}.", report.resumed_from);
    }
    if report.stopped_early {
        println!(
            "Stopped early after epoch {}; best epoch was {}.",
            report.epochs_completed,
            report.best_epoch.unwrap_or(0)
        );
    } else {
        println!("Completed {} epochs.", report.epochs_completed);
    }
    println!(
        "Final validation: loss={:.4} accuracy={:.1}%",
        report.final_evaluation.loss,
        report.final_evaluation.accuracy * 100.0
    );
    println!("Results written to '{}'.", output_dir.display());
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case;

    let use_case = predict_use_case::open(&args.output_dir)?;
    for p in use_case.predict(&args.images)? {
        println!("{}\t{}\t{:.4}", p.path.display(), p.class_name, p.probability);
    }
    Ok(())
}
