// ============================================================
// Layer 3 — Pipeline Error Taxonomy
// ============================================================
// Typed failures raised by the preprocessing and collation
// stages. Every variant carries enough context (file path,
// row index, expected vs actual sizes) for an operator to
// fix the input data.
//
// None of these are retried: the CSV splits and audio files
// are static, so a failure aborts the current batch.
//
// The application layer wraps these into anyhow::Error with
// extra context; the domain and data layers return them as-is
// so tests can match on the exact variant.

use std::path::PathBuf;

/// Result alias for the pure pipeline stages.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The audio file is missing or unreadable
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but its codec/container cannot be decoded
    #[error("unsupported audio format in '{}': {reason}", path.display())]
    UnsupportedFormat { path: PathBuf, reason: String },

    /// The resampling filter could not be built or run
    #[error("resampling '{}' failed: {reason}", path.display())]
    Resample { path: PathBuf, reason: String },

    /// A label that is not part of the fitted training vocabulary.
    /// The row it came from is attached by the `Row` wrapper.
    #[error("unknown label '{label}' is not in the training vocabulary")]
    UnknownLabel { label: String },

    /// A class id outside 0..num_classes
    #[error("class id {id} is out of range for {num_classes} classes")]
    ClassIdOutOfRange { id: usize, num_classes: usize },

    /// Parallel sequences that must be aligned have different lengths
    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context:  &'static str,
        expected: usize,
        actual:   usize,
    },

    /// A batch with no samples cannot be collated
    #[error("cannot collate an empty batch")]
    EmptyBatch,

    /// Sequence labels reached a path that only handles class ids
    #[error("sequence labels require the joint padding strategy")]
    SequenceLabels,

    /// A sample in a sequence-labelled batch has no label ids
    #[error("label sequence for batch index {index} is empty")]
    EmptyLabelSequence { index: usize },

    /// The split file could not be parsed
    #[error("cannot parse CSV '{}': {reason}", path.display())]
    Csv { path: PathBuf, reason: String },

    /// A configured column name is absent from the CSV header
    #[error("column '{column}' not found in '{}'", path.display())]
    MissingColumn { path: PathBuf, column: String },

    /// A failure tied to one row of a split, wrapping the cause
    #[error("row {row} ('{}'): {source}", path.display())]
    Row {
        row:    usize,
        path:   PathBuf,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Attach the originating row index and file path to an error.
    pub fn at_row(self, row: usize, path: impl Into<PathBuf>) -> Self {
        PipelineError::Row {
            row,
            path: path.into(),
            source: Box::new(self),
        }
    }

    /// Walk through `Row` wrappers to the underlying failure.
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Row { source, .. } => source.root(),
            other => other,
        }
    }
}
