// ============================================================
// Layer 5 — Training Orchestrator
// ============================================================
// Drives the epoch loop as an explicit state machine:
//
//   Resuming ──► Fitting ──► Validating ──► Checkpointing ──► EvaluatingStop
//      │            ▲                                              │
//      │            └──────────────── next epoch ◄─────────────────┤
//      └──────────────────────────► Done ◄─────────────────────────┘
//
// An error from the learner, a batch stream or the checkpoint
// store while an epoch is in flight is wrapped with the epoch
// number by `failed` and returned. Nothing is committed for the epoch
// that failed, so the last good checkpoint is untouched and a
// retry resumes from it.
//
// The orchestrator, not the stream, decides what an epoch is:
//   steps_per_epoch  = train samples / batch size
//   validation_steps = ceil(validation samples / batch size)
//
// Epoch-end side effects run in a fixed order inside
// Checkpointing: snapshot, best snapshot (if improved), cursor.
//
// Reference: Keras ModelCheckpoint / EarlyStopping semantics
//            Rust Book §17 (State pattern, enum-based)

use crate::data::stream::BatchStream;
use crate::domain::error::{LearnerError, PipelineError};
use crate::domain::traits::{Learner, SampleTransform, StepMetrics};
use crate::infra::checkpoint::{CheckpointStore, TrainingProgress};
use crate::infra::metrics::{EpochRecord, Evaluation};
use crate::ml::early_stopping::{EarlyStopping, StopDecision};

// ─── EpochPlan ────────────────────────────────────────────────────────────────
/// Step counts fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochPlan {
    /// Total epoch budget
    pub epochs: usize,
    pub steps_per_epoch: usize,
    pub validation_steps: usize,
}

// ─── TrainingReport ───────────────────────────────────────────────────────────
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Completed epochs found on disk when the run started
    pub resumed_from: usize,

    /// Completed epochs when the run ended
    pub epochs_completed: usize,

    /// One record per completed epoch, including those from earlier runs
    pub history: Vec<EpochRecord>,

    pub stopped_early: bool,

    /// Epoch number (1-based) of the best validation metric
    pub best_epoch: Option<usize>,

    /// Full pass over the validation partition with the final learner state
    pub final_evaluation: Evaluation,
}

// ─── Phase ────────────────────────────────────────────────────────────────────
// `epoch` is the 0-based index of the epoch in flight.
#[derive(Debug, Clone)]
enum Phase {
    Resuming,
    Fitting        { epoch: usize },
    Validating     { epoch: usize, train: Evaluation },
    Checkpointing  { epoch: usize, record: EpochRecord },
    EvaluatingStop { epoch: usize, decision: StopDecision },
    Done,
}

// ─── TrainingOrchestrator ─────────────────────────────────────────────────────
pub struct TrainingOrchestrator<T: SampleTransform> {
    train:          BatchStream<T>,
    valid:          BatchStream<T>,
    store:          CheckpointStore,
    early_stopping: EarlyStopping,
    plan:           EpochPlan,
    progress:       TrainingProgress,
    resumed_from:   usize,
}

impl<T: SampleTransform> TrainingOrchestrator<T> {
    /// `train` and `valid` must stream disjoint sample sets.
    pub fn new(
        train:          BatchStream<T>,
        valid:          BatchStream<T>,
        store:          CheckpointStore,
        early_stopping: EarlyStopping,
        epochs:         usize,
    ) -> Result<Self, PipelineError> {
        let steps_per_epoch = train.len() / train.batch_size();
        if steps_per_epoch == 0 {
            return Err(PipelineError::Config(format!(
                "{} training samples is fewer than one batch of {}",
                train.len(),
                train.batch_size()
            )));
        }

        let plan = EpochPlan {
            epochs,
            steps_per_epoch,
            validation_steps: valid.batches_per_pass(),
        };

        Ok(Self {
            train,
            valid,
            store,
            early_stopping,
            plan,
            progress: TrainingProgress::default(),
            resumed_from: 0,
        })
    }

    pub fn plan(&self) -> EpochPlan {
        self.plan
    }

    /// Run (or resume) training until the epoch budget is spent or
    /// early stopping ends it.
    pub fn run<L: Learner>(&mut self, learner: &mut L) -> Result<TrainingReport, PipelineError> {
        let mut phase = Phase::Resuming;

        loop {
            tracing::trace!("Phase: {:?}", phase);

            phase = match phase {
                Phase::Resuming => self.resume(learner)?,

                Phase::Fitting { epoch } => {
                    let train = fit_one_epoch(learner, &mut self.train, self.plan.steps_per_epoch)
                        .map_err(|e| failed(epoch, e))?;
                    Phase::Validating { epoch, train }
                }

                Phase::Validating { epoch, train } => {
                    let validation = evaluate(learner, &mut self.valid, self.plan.validation_steps)
                        .map_err(|e| failed(epoch, e))?;
                    let record = EpochRecord::new(epoch + 1, train, validation);
                    ensure_finite(&record).map_err(|e| failed(epoch, e))?;

                    tracing::info!(
                        "Epoch {:>3}/{} | train_loss={:.4} | train_acc={:.1}% | val_loss={:.4} | val_acc={:.1}%",
                        epoch + 1,
                        self.plan.epochs,
                        record.train_loss,
                        record.train_accuracy * 100.0,
                        record.val_loss,
                        record.val_accuracy * 100.0,
                    );
                    Phase::Checkpointing { epoch, record }
                }

                Phase::Checkpointing { epoch, record } => {
                    let decision = self.checkpoint(learner, record).map_err(|e| failed(epoch, e))?;
                    Phase::EvaluatingStop { epoch, decision }
                }

                Phase::EvaluatingStop { epoch, decision } => {
                    self.evaluate_stop(learner, epoch, decision).map_err(|e| failed(epoch, e))?
                }

                Phase::Done => return self.finish(learner),
            };
        }
    }

    /// Restore learner and streams from the store and pick the next phase
    fn resume<L: Learner>(&mut self, learner: &mut L) -> Result<Phase, PipelineError> {
        let resume = self.store.load()?;

        if let Some(snapshot) = &resume.snapshot {
            learner.restore(snapshot)?;
        }
        self.progress     = resume.progress;
        self.resumed_from = self.progress.epoch;
        self.early_stopping.restore(self.progress.early_stopping.clone());

        let start = self.progress.epoch;

        if self.progress.stopped_early {
            tracing::info!("Run already stopped early after epoch {}", start);
            self.restore_best(learner)?;
            return Ok(Phase::Done);
        }
        if start >= self.plan.epochs {
            tracing::info!("All {} epochs already completed", self.plan.epochs);
            return Ok(Phase::Done);
        }

        if start > 0 {
            tracing::info!("Resuming at epoch {}/{}", start + 1, self.plan.epochs);
        }

        // Put both streams where an uninterrupted run would have left them
        self.train.advance(start * self.plan.steps_per_epoch);
        self.valid.advance(start * self.plan.validation_steps);

        Ok(Phase::Fitting { epoch: start })
    }

    /// Epoch-end writes: snapshot, then best snapshot if improved, then cursor
    fn checkpoint<L: Learner>(
        &mut self,
        learner: &mut L,
        record:  EpochRecord,
    ) -> Result<StopDecision, PipelineError> {
        let completed = record.epoch;
        let decision  = self.early_stopping.observe(&record);

        let snapshot = learner.snapshot()?;
        self.store.save_snapshot(completed, &snapshot)?;
        if decision == StopDecision::Improved {
            self.store.save_best(completed, &snapshot)?;
        }

        let mut next = self.progress.clone();
        next.epoch          = completed;
        next.early_stopping = self.early_stopping.state().clone();
        next.stopped_early  = decision == StopDecision::Stop;
        next.history.push(record);

        self.store.advance_cursor(&next)?;
        self.progress = next;

        tracing::debug!("Checkpoint committed for epoch {}", completed);
        Ok(decision)
    }

    fn evaluate_stop<L: Learner>(
        &mut self,
        learner:  &mut L,
        epoch:    usize,
        decision: StopDecision,
    ) -> Result<Phase, PipelineError> {
        if decision == StopDecision::Stop {
            self.restore_best(learner)?;
            return Ok(Phase::Done);
        }
        if epoch + 1 >= self.plan.epochs {
            return Ok(Phase::Done);
        }
        Ok(Phase::Fitting { epoch: epoch + 1 })
    }

    fn restore_best<L: Learner>(&mut self, learner: &mut L) -> Result<(), PipelineError> {
        let best = self.store.load_best()?.ok_or_else(|| {
            PipelineError::corrupt(self.store.dir(), "early stopping recorded but no best snapshot exists")
        })?;
        learner.restore(&best)?;
        tracing::info!(
            "Restored best learner state from epoch {}",
            self.progress.early_stopping.best_epoch.unwrap_or(0)
        );
        Ok(())
    }

    fn finish<L: Learner>(&mut self, learner: &mut L) -> Result<TrainingReport, PipelineError> {
        self.valid.rewind();
        let final_evaluation = evaluate(learner, &mut self.valid, self.plan.validation_steps)?;

        self.store.export_final(&learner.snapshot()?)?;

        tracing::info!(
            "Training finished after {} epochs | val_loss={:.4} | val_acc={:.1}%",
            self.progress.epoch,
            final_evaluation.loss,
            final_evaluation.accuracy * 100.0,
        );

        Ok(TrainingReport {
            resumed_from:     self.resumed_from,
            epochs_completed: self.progress.epoch,
            history:          self.progress.history.clone(),
            stopped_early:    self.progress.stopped_early,
            best_epoch:       self.progress.early_stopping.best_epoch,
            final_evaluation,
        })
    }
}

/// progress.json cannot represent NaN or infinity, so an epoch
/// reporting one is a learner failure and is never committed
fn ensure_finite(record: &EpochRecord) -> Result<(), PipelineError> {
    let metrics = [
        ("train_loss",     record.train_loss),
        ("train_accuracy", record.train_accuracy),
        ("val_loss",       record.val_loss),
        ("val_accuracy",   record.val_accuracy),
    ];
    match metrics.iter().find(|(_, value)| !value.is_finite()) {
        Some((name, value)) => Err(LearnerError::new(format!(
            "epoch {} reported {} = {}",
            record.epoch, name, value
        ))
        .into()),
        None => Ok(()),
    }
}

/// Wrap an error with the 1-based number of the epoch it interrupted
fn failed(epoch: usize, source: PipelineError) -> PipelineError {
    tracing::error!("Epoch {} failed: {}", epoch + 1, source);
    PipelineError::Epoch { epoch: epoch + 1, source: Box::new(source) }
}

// ─── Epoch helpers ────────────────────────────────────────────────────────────

/// Sample-weighted running totals of step metrics
#[derive(Default)]
struct Totals {
    loss_sum: f64,
    correct:  usize,
    count:    usize,
}

impl Totals {
    fn add(&mut self, step: StepMetrics) {
        self.loss_sum += step.loss * step.count as f64;
        self.correct  += step.correct;
        self.count    += step.count;
    }

    fn finish(self) -> Evaluation {
        if self.count == 0 {
            return Evaluation { loss: f64::NAN, accuracy: 0.0 };
        }
        Evaluation {
            loss:     self.loss_sum / self.count as f64,
            accuracy: self.correct as f64 / self.count as f64,
        }
    }
}

/// Feed exactly `steps` batches from `stream` to the learner's train step
pub fn fit_one_epoch<L: Learner, T: SampleTransform>(
    learner: &mut L,
    stream:  &mut BatchStream<T>,
    steps:   usize,
) -> Result<Evaluation, PipelineError> {
    let mut totals = Totals::default();
    for _ in 0..steps {
        let batch = stream.next_batch()?;
        totals.add(learner.train_step(&batch)?);
    }
    Ok(totals.finish())
}

/// Score exactly `steps` batches from `stream` without training
pub fn evaluate<L: Learner, T: SampleTransform>(
    learner: &L,
    stream:  &mut BatchStream<T>,
    steps:   usize,
) -> Result<Evaluation, PipelineError> {
    let mut totals = Totals::default();
    for _ in 0..steps {
        let batch = stream.next_batch()?;
        totals.add(learner.eval_step(&batch)?);
    }
    Ok(totals.finish())
}
