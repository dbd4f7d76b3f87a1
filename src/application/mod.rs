// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer wires the other layers together for one goal
// (training, or classifying images with a trained run).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - No file formats here (that's Layer 4 and 6)
//   - Only workflow coordination and configuration
//
// Errors leave this layer as anyhow::Error with context attached;
// the typed PipelineError is still reachable via downcast.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training / resume workflow and its configuration
pub mod train_use_case;

// Inference with a trained run
pub mod predict_use_case;
