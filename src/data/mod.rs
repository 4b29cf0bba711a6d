// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// This layer handles everything from the CSV splits all the
// way to device-ready tensor batches.
//
// The pipeline flows in this order:
//
//   train.csv / validation.csv
//       │
//       ▼
//   CsvSplitLoader     → reads (file, label) rows
//       │
//       ▼
//   BatchPreprocessor  → encodes labels, runs the Resampler
//       │                 on every file (in parallel)
//       ▼
//   SpeechDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   SpeechBatcher      → PaddingCollator pads each batch,
//       │                 then uploads tensors
//       ▼
//   DataLoader         → feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads train/validation rows from CSV files
pub mod loader;

/// Decodes audio files and resamples to the target rate
pub mod resampler;

/// Applies the Resampler and label encoding across rows
pub mod preprocessor;

/// Pads variable-length batches and builds attention masks
pub mod collator;

/// Implements Burn's Dataset trait for preprocessed samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
