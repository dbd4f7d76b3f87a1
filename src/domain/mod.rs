// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs, enums, and traits that every other layer
// speaks in: samples, class tables, batches, the learner and
// transform contracts, and the error taxonomy.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - Only plain Rust structs, enums, and traits
//
// The learner and the image transform are external
// collaborators. This layer only describes how they are used,
// so the data pipeline and the orchestrator can be tested
// without a GPU or real image files.
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

/// Samples and the class-name ↔ id table
pub mod sample;

/// A batch of normalised images with one-hot labels
pub mod batch;

/// Learner and SampleTransform contracts
pub mod traits;

/// Error taxonomy shared by all layers
pub mod error;
