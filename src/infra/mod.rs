// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the output directory:
//
//   checkpoint.rs — CheckpointStore
//                   The durable pairing of learner snapshot and
//                   epoch cursor. Every file is written to a
//                   temporary path, fsynced, then renamed over
//                   the old one, so a crash leaves either the old
//                   or the new version readable, never half of one.
//                   Also persists the class table and config.
//
//   metrics.rs    — Result artifacts
//                   Per-epoch history (JSON + CSV) and the final
//                   evaluation record. Informational only; resume
//                   never reads them.
//
// Reference: Rust Book §9 (Error Handling)
//            Rust Book §12 (I/O and File Handling)

/// Snapshot, cursor, class table and config persistence
pub mod checkpoint;

/// Training history and final evaluation writers
pub mod metrics;
