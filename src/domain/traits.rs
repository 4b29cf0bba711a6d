// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The two seams of the preprocessing pipeline:
//
//   SampleSource   → where the (file, label) rows come from
//                    (CsvSplitLoader for the train/validation CSVs)
//   AudioSource    → how one file becomes a FeatureVector at the
//                    target rate (Resampler for files on disk)
//
// Both are Send + Sync so the batch preprocessor can fan out
// across rayon worker threads with a shared reference.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::path::Path;

use crate::domain::error::PipelineResult;
use crate::domain::sample::{FeatureVector, Sample};

// ─── SampleSource ─────────────────────────────────────────────────────────────
/// Any component that can produce the rows of one data split.
pub trait SampleSource {
    fn load_samples(&self) -> PipelineResult<Vec<Sample>>;
}

// ─── AudioSource ──────────────────────────────────────────────────────────────
/// Any component that turns an audio file into mono samples at
/// `target_rate`. Implementations must be deterministic: the same
/// file always yields the same output.
pub trait AudioSource: Send + Sync {
    fn load(&self, path: &Path, target_rate: u32) -> PipelineResult<FeatureVector>;
}
