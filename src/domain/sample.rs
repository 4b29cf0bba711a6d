// ============================================================
// Layer 3 — Sample / Batch Domain Types
// ============================================================
// The typed records that flow through the pipeline:
//
//   Sample  → (resample + encode) → PreparedSample
//   Vec<PreparedSample> → Batch → (collate) → PaddedBatch
//
// A Batch keeps features and labels in two parallel vectors;
// index i in both always refers to the same original row.
//
// Reference: Rust Book §5 (Structs)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One row of a CSV split. Immutable input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Path to the recording, as written in the split file
    pub file_path: PathBuf,

    /// Diagnosis label string, e.g. "ASD" or "TD"
    pub raw_label: String,
}

impl Sample {
    pub fn new(file_path: impl Into<PathBuf>, raw_label: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            raw_label: raw_label.into(),
        }
    }
}

/// Mono audio at the run's target sample rate.
/// Length is proportional to the duration of the recording.
pub type FeatureVector = Vec<f32>;

/// A sample after resampling and label encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedSample {
    pub features: FeatureVector,
    pub label:    usize,
}

/// Label side of a batch.
///
/// Classification runs carry one class id per sample. Sequence
/// labelling variants carry a variable-length id sequence per
/// sample, which only the joint padding strategy knows how to pad.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchLabels {
    Classes(Vec<usize>),
    Sequences(Vec<Vec<usize>>),
}

impl BatchLabels {
    pub fn len(&self) -> usize {
        match self {
            BatchLabels::Classes(c)   => c.len(),
            BatchLabels::Sequences(s) => s.len(),
        }
    }
}

/// Unpadded, variable-length batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub features: Vec<FeatureVector>,
    pub labels:   BatchLabels,
}

impl Batch {
    /// Build a classification batch from prepared samples, preserving order.
    pub fn from_prepared(items: Vec<PreparedSample>) -> Self {
        let (features, labels): (Vec<_>, Vec<_>) = items
            .into_iter()
            .map(|s| (s.features, s.label))
            .unzip();
        Self {
            features,
            labels: BatchLabels::Classes(labels),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Per-sample feature lengths, in batch order
    pub fn lengths(&self) -> Vec<usize> {
        self.features.iter().map(Vec::len).collect()
    }
}

/// Label ids used to fill padded positions of label sequences.
/// Matches the ignore index of the cross-entropy loss.
pub const LABEL_PAD_ID: i64 = -100;

/// Label side of a padded batch.
#[derive(Debug, Clone, PartialEq)]
pub enum PaddedLabels {
    /// One class id per row, passed through unchanged
    Classes(Vec<usize>),

    /// Row-major [batch_size, max_label_len], padded with LABEL_PAD_ID
    Sequences {
        values:  Vec<i64>,
        max_len: usize,
        lengths: Vec<usize>,
    },
}

/// Uniform-shape batch ready for the model forward pass.
///
/// `features` and `attention_mask` are row-major [batch_size, max_len].
/// `max_len` is the longest feature vector of THIS batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedBatch {
    pub features:       Vec<f32>,
    pub attention_mask: Vec<u8>,
    pub lengths:        Vec<usize>,
    pub labels:         PaddedLabels,
    pub batch_size:     usize,
    pub max_len:        usize,
}

impl PaddedBatch {
    /// [batch_size, max_len]
    pub fn shape(&self) -> [usize; 2] {
        [self.batch_size, self.max_len]
    }
}
