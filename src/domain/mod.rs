// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs, traits and functions that define what the
// pipeline works with:
//
//   sample.rs     — Sample, Batch, PaddedBatch records
//   label.rs      — LabelVocabulary (label string ↔ class id)
//   evaluation.rs — accuracy, confusion matrix, class report
//   error.rs      — PipelineError taxonomy
//   traits.rs     — SampleSource / AudioSource seams
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain Rust structs, enums, traits and functions
//
// Reference: Rust Book §5 (Structs), §10 (Traits)

pub mod error;

pub mod sample;

pub mod label;

pub mod evaluation;

pub mod traits;
