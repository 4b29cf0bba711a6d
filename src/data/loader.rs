// ============================================================
// Layer 4 — CSV Split Loader
// ============================================================
// Reads one data split (train or validation) from a CSV file.
//
// Each row must contain at least:
//   - a path column   (default "file")      → Sample.file_path
//   - a label column  (default "Diagnosis") → Sample.raw_label
//
// Column names are configuration, not fixed. Extra columns
// (gender, task, ...) are ignored.
//
// Unlike a directory walk, nothing is skipped here: a short row
// or a missing column is an error that names the row, because
// a dropped row would silently shrink the split.
//
// Reference: csv crate documentation
//            Rust Book §9 (Error Handling)

use std::path::{Path, PathBuf};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::Sample;
use crate::domain::traits::SampleSource;

/// Loads (file, label) rows from a CSV split.
/// Implements the SampleSource trait from Layer 3.
pub struct CsvSplitLoader {
    path:      PathBuf,
    input_col: String,
    label_col: String,
}

impl CsvSplitLoader {
    pub fn new(
        path:      impl Into<PathBuf>,
        input_col: impl Into<String>,
        label_col: impl Into<String>,
    ) -> Self {
        Self {
            path:      path.into(),
            input_col: input_col.into(),
            label_col: label_col.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn csv_error(&self, err: csv::Error) -> PipelineError {
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => PipelineError::Io {
                path: self.path.clone(),
                source,
            },
            _ => PipelineError::Csv {
                path: self.path.clone(),
                reason,
            },
        }
    }

    fn column_index(&self, headers: &csv::StringRecord, column: &str) -> PipelineResult<usize> {
        headers
            .iter()
            .position(|h| h == column)
            .ok_or_else(|| PipelineError::MissingColumn {
                path:   self.path.clone(),
                column: column.to_string(),
            })
    }
}

impl SampleSource for CsvSplitLoader {
    fn load_samples(&self) -> PipelineResult<Vec<Sample>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.csv_error(e))?;

        let headers   = reader.headers().map_err(|e| self.csv_error(e))?.clone();
        let file_idx  = self.column_index(&headers, &self.input_col)?;
        let label_idx = self.column_index(&headers, &self.label_col)?;

        let mut samples = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|e| self.csv_error(e))?;

            let (Some(file), Some(label)) = (record.get(file_idx), record.get(label_idx)) else {
                return Err(PipelineError::Csv {
                    path:   self.path.clone(),
                    reason: format!(
                        "row {row} has {} fields, expected at least {}",
                        record.len(),
                        file_idx.max(label_idx) + 1
                    ),
                });
            };

            samples.push(Sample::new(file, label));
        }

        tracing::info!(
            "Loaded {} rows from '{}'",
            samples.len(),
            self.path.display()
        );
        Ok(samples)
    }
}
