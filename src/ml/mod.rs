// ============================================================
// Layer 5 — ML / Training Layer
// ============================================================
// Everything that decides how the learner is trained.
//
// Only model.rs and learner.rs import burn. The orchestrator is
// written against the Learner trait, so it is tested with plain
// Rust doubles and never needs a GPU.
//
// What's in this layer:
//
//   early_stopping.rs — tracks the best validation metric and
//                       decides when patience has run out
//
//   trainer.rs        — the training orchestrator: resume, fit,
//                       validate, checkpoint, stop; in that order
//                       for every epoch
//
//   model.rs          — the convolutional image classifier
//
//   learner.rs        — BurnLearner: classifier + Adam behind the
//                       Learner trait, weights as snapshot bytes
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)

/// Patience-based early stopping on a validation metric
pub mod early_stopping;

/// Resumable epoch loop
pub mod trainer;

/// CNN architecture
pub mod model;

/// Burn-backed Learner implementation
pub mod learner;
