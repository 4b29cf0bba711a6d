// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one goal: fine-tune, evaluate, or predict.
//
// Rules for this layer:
//   - No tensor code here (that's Layer 5)
//   - No argument parsing (that's Layer 1)
//   - No direct file formats (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Fine-tuning workflow and the run configuration
pub mod train_use_case;

// Re-scoring a saved run on a CSV split
pub mod evaluate_use_case;

// Single-file classification
pub mod predict_use_case;
