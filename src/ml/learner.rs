// ============================================================
// Layer 5 — Burn Learner
// ============================================================
// Adapts ImageClassifier + an optimiser to the step-wise Learner
// contract the orchestrator drives.
//
// Key Burn 0.20 points:
//   - Training runs on an AutodiffBackend so loss.backward() works
//   - model.valid() gives the same weights on the inner backend,
//     with dropout off, for evaluation and prediction
//   - Batches arrive as [n, h, w, 1]; with one channel that is the
//     same memory layout as [n, 1, h, w], so no permute is needed
//
// Snapshots hold the model weights only (BinBytesRecorder, full
// precision). The optimiser's moment estimates restart from zero
// after a restore.
//
// Reference: Burn Book §5 (Training), Kingma & Ba (2015) Adam

use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{activation::softmax, backend::AutodiffBackend},
};

use crate::domain::batch::Batch;
use crate::domain::error::LearnerError;
use crate::domain::traits::{Learner, StepMetrics};
use crate::ml::model::{ClassifierConfig, ImageClassifier};

type Weights<B> = <ImageClassifier<B> as Module<B>>::Record;

pub struct BurnLearner<B: AutodiffBackend, O> {
    model:         ImageClassifier<B>,
    optim:         O,
    learning_rate: f64,
    device:        B::Device,
}

/// A freshly initialised classifier trained with Adam
pub fn adam_learner<B: AutodiffBackend>(
    config:        &ClassifierConfig,
    learning_rate: f64,
    device:        B::Device,
) -> BurnLearner<B, impl Optimizer<ImageClassifier<B>, B>> {
    let model = config.init::<B>(&device);
    let optim = AdamConfig::new().with_epsilon(1e-8).init();
    BurnLearner::new(model, optim, learning_rate, device)
}

impl<B, O> BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ImageClassifier<B>, B>,
{
    pub fn new(model: ImageClassifier<B>, optim: O, learning_rate: f64, device: B::Device) -> Self {
        Self { model, optim, learning_rate, device }
    }
}

impl<B, O> Learner for BurnLearner<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ImageClassifier<B>, B>,
{
    fn train_step(&mut self, batch: &Batch) -> Result<StepMetrics, LearnerError> {
        let (images, targets) = batch_tensors::<B>(batch, &self.device);
        let (loss, logits) = self.model.forward_loss(images, targets.clone());

        let loss_value = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return Err(LearnerError::new(format!("loss diverged to {loss_value}")));
        }
        let correct = count_correct(logits, targets);

        // Backward pass + Adam update
        let grads = GradientsParams::from_grads(loss.backward(), &self.model);
        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);

        Ok(StepMetrics { loss: loss_value, correct, count: batch.len })
    }

    fn eval_step(&self, batch: &Batch) -> Result<StepMetrics, LearnerError> {
        // dropout disabled, no autodiff graph
        let model = self.model.valid();
        let (images, targets) = batch_tensors::<B::InnerBackend>(batch, &self.device);
        let (loss, logits) = model.forward_loss(images, targets.clone());

        let loss_value = loss.into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return Err(LearnerError::new(format!("validation loss diverged to {loss_value}")));
        }
        Ok(StepMetrics {
            loss:    loss_value,
            correct: count_correct(logits, targets),
            count:   batch.len,
        })
    }

    fn predict(&self, batch: &Batch) -> Result<Vec<Vec<f32>>, LearnerError> {
        let model = self.model.valid();
        let (images, _) = batch_tensors::<B::InnerBackend>(batch, &self.device);

        let probs: Vec<f32> = softmax(model.forward(images), 1)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| LearnerError::new(format!("cannot read probabilities: {e:?}")))?;

        Ok(probs.chunks(batch.num_classes).map(<[f32]>::to_vec).collect())
    }

    fn snapshot(&self) -> Result<Vec<u8>, LearnerError> {
        BinBytesRecorder::<FullPrecisionSettings>::default()
            .record(self.model.clone().into_record(), ())
            .map_err(|e| LearnerError::new(format!("cannot serialise model weights: {e:?}")))
    }

    fn restore(&mut self, snapshot: &[u8]) -> Result<(), LearnerError> {
        let record: Weights<B> = BinBytesRecorder::<FullPrecisionSettings>::default()
            .load(snapshot.to_vec(), &self.device)
            .map_err(|e| LearnerError::new(format!("cannot load model weights: {e:?}")))?;

        // load_record() returns a new model with the loaded weights
        self.model = self.model.clone().load_record(record);
        Ok(())
    }
}

/// images: [n, 1, h, w] float, targets: [n] class ids
fn batch_tensors<B: Backend>(batch: &Batch, device: &B::Device) -> (Tensor<B, 4>, Tensor<B, 1, Int>) {
    let images = Tensor::<B, 4>::from_data(
        TensorData::new(batch.images.clone(), [batch.len, 1, batch.height, batch.width]),
        device,
    );

    let ids: Vec<i64> = batch.class_ids().into_iter().map(|id| id as i64).collect();
    let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(ids, [batch.len]), device);

    (images, targets)
}

fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [n, 1]; flatten to [n] before comparing
    logits
        .argmax(1)
        .flatten::<1>(0, 1)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}
