// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence that no single layer owns:
//
//   checkpoint.rs — Model weights via Burn's CompactRecorder,
//                   checkpoint rotation, and the JSON side
//                   files (run config, label vocabulary) that
//                   evaluate/predict need to rebuild the model.
//
//   metrics.rs    — Evaluation log written to metrics.csv after
//                   every evaluation step.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving, rotation and loading
pub mod checkpoint;

/// Evaluation metrics CSV logger
pub mod metrics;
