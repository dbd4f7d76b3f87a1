// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the dataset directory on
// disk all the way to normalised batches for the learner.
//
// The pipeline flows in this order:
//
//   root/<class>/**/*.<ext>
//       │
//       ▼
//   DatasetIndex       → assigns class ids, enumerates samples
//       │
//       ▼
//   split_train_val    → seeded, disjoint train / validation sets
//       │
//       ▼
//   BatchStream        → infinite, seeded, reshuffled each pass
//       │                 (uses a SampleTransform per sample)
//       ▼
//   TrainingOrchestrator (Layer 5) pulls a fixed number of batches
//
// Each module is responsible for exactly one step.
//
// Reference: rand crate documentation (SeedableRng, SliceRandom)
//            Rust Book §13 (Iterators and Closures)

/// Scans the dataset root into a ClassTable and a list of samples
pub mod index;

/// Decodes, resizes and normalises grayscale images
pub mod transform;

/// Seeded shuffle and train/validation split
pub mod splitter;

/// Deterministic, restartable, infinite batch stream
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;
