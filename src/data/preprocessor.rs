// ============================================================
// Layer 4 — Batch Preprocessor
// ============================================================
// Turns the rows of a split into model inputs:
//
//   Sample { file_path, raw_label }
//       │  LabelVocabulary::encode   (all rows, up front)
//       │  AudioSource::load         (rayon, one file per task)
//       │  normalize_utterance       (optional, same task)
//       ▼
//   PreparedSample { features, label }
//
// Normalisation rescales each recording to zero mean and unit
// variance before the model sees it. It runs before collation,
// so padding is still exact 0.0.
//
// Why encode every label before touching any audio?
//   An unknown label means the splits disagree. Failing before
//   the expensive decode step means no partial output is ever
//   produced for a bad split.
//
// Why collect per-row results before checking them?
//   rayon finishes rows in any order. Collecting into an
//   index-ordered Vec first keeps the output order equal to the
//   input order, and makes the reported error always the FIRST
//   failing row, regardless of thread scheduling.
//
// A failure on any row aborts the whole chunk: dropping one
// sample would misalign the parallel feature / label sequences.
//
// Reference: rayon documentation
//            Rust Book §13 (Iterators and Closures)

use rayon::prelude::*;

use crate::domain::error::PipelineResult;
use crate::domain::label::LabelVocabulary;
use crate::domain::sample::{PreparedSample, Sample};
use crate::domain::traits::AudioSource;

/// Rows handled per preprocessing chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Added to the variance so silent recordings do not divide by zero
const VARIANCE_EPSILON: f64 = 1e-7;

/// Rescale one recording in place to zero mean and unit variance.
pub fn normalize_utterance(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }
    let n    = samples.len() as f64;
    let mean = samples.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var  = samples.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let std  = (var + VARIANCE_EPSILON).sqrt();
    for v in samples.iter_mut() {
        *v = ((*v as f64 - mean) / std) as f32;
    }
}

pub struct BatchPreprocessor<'a, A: AudioSource> {
    audio:       &'a A,
    vocabulary:  &'a LabelVocabulary,
    target_rate: u32,
    normalize:   bool,
}

impl<'a, A: AudioSource> BatchPreprocessor<'a, A> {
    pub fn new(audio: &'a A, vocabulary: &'a LabelVocabulary, target_rate: u32) -> Self {
        Self { audio, vocabulary, target_rate, normalize: false }
    }

    /// Normalise every recording after loading it
    pub fn with_normalization(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Preprocess one batch of rows. `row_offset` is the index of
    /// `samples[0]` in its split, used only for error context.
    pub fn process(
        &self,
        samples:    &[Sample],
        row_offset: usize,
    ) -> PipelineResult<Vec<PreparedSample>> {
        let labels = samples
            .iter()
            .enumerate()
            .map(|(i, s)| {
                self.vocabulary
                    .encode(&s.raw_label)
                    .map_err(|e| e.at_row(row_offset + i, &s.file_path))
            })
            .collect::<PipelineResult<Vec<usize>>>()?;

        let features: Vec<PipelineResult<Vec<f32>>> = samples
            .par_iter()
            .enumerate()
            .map(|(i, s)| -> PipelineResult<Vec<f32>> {
                let mut features = self
                    .audio
                    .load(&s.file_path, self.target_rate)
                    .map_err(|e| e.at_row(row_offset + i, &s.file_path))?;
                if self.normalize {
                    normalize_utterance(&mut features);
                }
                Ok(features)
            })
            .collect();

        features
            .into_iter()
            .zip(labels)
            .map(|(features, label)| -> PipelineResult<PreparedSample> {
                Ok(PreparedSample { features: features?, label })
            })
            .collect()
    }

    /// Preprocess a whole split in chunks of `chunk_size` rows.
    pub fn process_split(
        &self,
        samples:    &[Sample],
        chunk_size: usize,
    ) -> PipelineResult<Vec<PreparedSample>> {
        let chunk_size = chunk_size.max(1);
        let mut out    = Vec::with_capacity(samples.len());

        for (i, chunk) in samples.chunks(chunk_size).enumerate() {
            let prepared = self
                .process(chunk, i * chunk_size)
                .inspect_err(|e| tracing::error!("Preprocessing stopped: {}", e.root()))?;
            out.extend(prepared);
            tracing::debug!("Preprocessed {}/{} rows", out.len(), samples.len());
        }

        Ok(out)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::PipelineError;
    use std::path::Path;

    /// Feature length is derived from the file name: "n.wav" → n samples.
    /// "missing*" paths fail like an absent file.
    struct FakeAudio;

    impl AudioSource for FakeAudio {
        fn load(&self, path: &Path, _target_rate: u32) -> PipelineResult<Vec<f32>> {
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if stem.starts_with("missing") {
                return Err(PipelineError::Io {
                    path:   path.to_path_buf(),
                    source: std::io::Error::from(std::io::ErrorKind::NotFound),
                });
            }
            let n: usize = stem.parse().unwrap();
            Ok(vec![n as f32; n])
        }
    }

    fn vocab() -> LabelVocabulary {
        LabelVocabulary::fit(["ASD", "TD"])
    }

    #[test]
    fn test_preserves_order_and_alignment() {
        let vocab = vocab();
        let pre   = BatchPreprocessor::new(&FakeAudio, &vocab, 16_000);
        let samples: Vec<Sample> = (1..=40)
            .map(|n| Sample::new(format!("{n}.wav"), if n % 2 == 0 { "TD" } else { "ASD" }))
            .collect();

        let out = pre.process_split(&samples, 7).unwrap();
        assert_eq!(out.len(), 40);
        for (i, item) in out.iter().enumerate() {
            assert_eq!(item.features.len(), i + 1);
            assert_eq!(item.label, if (i + 1) % 2 == 0 { 1 } else { 0 });
        }
    }

    #[test]
    fn test_unknown_label_aborts_before_audio() {
        let vocab   = vocab();
        let pre     = BatchPreprocessor::new(&FakeAudio, &vocab, 16_000);
        let samples = vec![
            Sample::new("missing.wav", "ASD"),
            Sample::new("3.wav", "N/A"),
        ];
        let err = pre.process(&samples, 10).unwrap_err();
        assert_eq!(
            err.to_string(),
            "row 11 ('3.wav'): unknown label 'N/A' is not in the training vocabulary"
        );
        match err {
            PipelineError::Row { row, source, .. } => {
                assert_eq!(row, 11);
                assert!(matches!(*source, PipelineError::UnknownLabel { ref label } if label == "N/A"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_normalize_utterance_zero_mean_unit_variance() {
        let mut x: Vec<f32> = (0..4000).map(|i| (i as f32 * 0.01).sin() * 0.3 + 0.1).collect();
        normalize_utterance(&mut x);

        let n    = x.len() as f64;
        let mean = x.iter().map(|&v| v as f64).sum::<f64>() / n;
        let std  = (x.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n).sqrt();
        assert!(mean.abs() < 1e-4, "mean {mean}");
        assert!((std - 1.0).abs() < 1e-3, "std {std}");
    }

    #[test]
    fn test_silence_normalizes_to_zero() {
        let mut x = vec![0.25f32; 16];
        normalize_utterance(&mut x);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_normalization_is_applied_per_recording() {
        let vocab   = vocab();
        let samples = vec![Sample::new("5.wav", "ASD"), Sample::new("8.wav", "TD")];

        let raw = BatchPreprocessor::new(&FakeAudio, &vocab, 16_000)
            .process(&samples, 0)
            .unwrap();
        assert_eq!(raw[0].features, vec![5.0; 5]);

        let normed = BatchPreprocessor::new(&FakeAudio, &vocab, 16_000)
            .with_normalization(true)
            .process(&samples, 0)
            .unwrap();
        assert_eq!(normed[0].features, vec![0.0; 5]);
        assert_eq!(normed[1].features.len(), 8);
    }

    #[test]
    fn test_first_failing_row_is_reported() {
        let vocab   = vocab();
        let pre     = BatchPreprocessor::new(&FakeAudio, &vocab, 16_000);
        let samples = vec![
            Sample::new("2.wav", "TD"),
            Sample::new("missing_a.wav", "TD"),
            Sample::new("missing_b.wav", "ASD"),
        ];
        let err = pre.process_split(&samples, 2).unwrap_err();
        match err {
            PipelineError::Row { row, path, .. } => {
                assert_eq!(row, 1);
                assert_eq!(path, Path::new("missing_a.wav"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
