// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model, training loop and inference. Every tensor operation on
// the model lives here; the domain layer only sees plain Vec<f32>
// logits and class ids.
//
// What's in this layer:
//
//   model.rs      — The audio classifier
//                   • Strided 1-D conv feature encoder (GELU)
//                   • Feature projection + dropout
//                   • Masked mean pooling over real frames
//                   • Projector + classification head
//                   • Freeze policy for fine-tuning
//
//   trainer.rs    — The fine-tuning loop
//                   AdamW with linear decay, gradient
//                   accumulation, step-based logging,
//                   evaluation and checkpoint rotation
//
//   inferencer.rs — Split evaluation and single-file prediction
//                   from the latest checkpoint
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Baevski et al. (2020) wav2vec 2.0

/// Audio classification model
pub mod model;

/// Fine-tuning loop with evaluation and checkpointing
pub mod trainer;

/// Evaluation over a split and single-file prediction
pub mod inferencer;
