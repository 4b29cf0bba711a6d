// ============================================================
// Layer 4 — Padding Collator
// ============================================================
// Turns a variable-length Batch into a uniform-shape PaddedBatch.
//
// How padding works:
//   lengths  [100, 250, 80]
//   max_len  = 250          ← longest in THIS batch only
//
//   features                          attention_mask
//   [ x0 .. x99  | 0.0 × 150 ]        [ 1 × 100 | 0 × 150 ]
//   [ x0 .. x249             ]        [ 1 × 250           ]
//   [ x0 .. x79  | 0.0 × 170 ]        [ 1 × 80  | 0 × 170 ]
//
// max_len is recomputed per batch rather than fixed globally:
// less padding per batch, at the cost of batch shapes varying
// from step to step.
//
// Padding is right-sided with exactly 0.0 (silence), the mask
// only ever holds 0 or 1, and nothing is truncated. A batch of
// one sample, or one where all lengths match, still gets a full
// mask of ones; no fast path changes the output shape.
//
// Two strategies share this one interface:
//   FeatureOnly — pad the audio; class labels pass through
//   Joint       — also pad label sequences (sequence labelling
//                 variants) with LABEL_PAD_ID; class labels
//                 pass through exactly as in FeatureOnly
//
// The collator never does I/O; all files were read earlier by
// the Resampler. It works on the whole batch at once because
// max_len depends on every row.

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::{Batch, BatchLabels, PaddedBatch, PaddedLabels, LABEL_PAD_ID};

/// Which parts of a batch get padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaddingStrategy {
    #[default]
    FeatureOnly,
    Joint,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PaddingCollator {
    strategy: PaddingStrategy,
}

impl PaddingCollator {
    pub fn new(strategy: PaddingStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> PaddingStrategy {
        self.strategy
    }

    /// Pad one batch. Either the whole batch succeeds or nothing is returned.
    pub fn collate(&self, batch: Batch) -> PipelineResult<PaddedBatch> {
        if batch.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        if batch.labels.len() != batch.features.len() {
            return Err(PipelineError::ShapeMismatch {
                context:  "features vs labels entering the collator",
                expected: batch.features.len(),
                actual:   batch.labels.len(),
            });
        }

        let batch_size = batch.len();
        let lengths    = batch.lengths();
        let max_len    = lengths.iter().copied().max().unwrap_or(0);

        let Batch { features: rows, labels } = batch;
        let labels = match (self.strategy, labels) {
            (_, BatchLabels::Classes(classes)) => PaddedLabels::Classes(classes),
            (PaddingStrategy::Joint, BatchLabels::Sequences(seqs)) => pad_label_sequences(seqs)?,
            (PaddingStrategy::FeatureOnly, BatchLabels::Sequences(_)) => {
                return Err(PipelineError::SequenceLabels)
            }
        };

        let mut features       = vec![0.0f32; batch_size * max_len];
        let mut attention_mask = vec![0u8; batch_size * max_len];

        for (i, row) in rows.iter().enumerate() {
            let start = i * max_len;
            features[start..start + row.len()].copy_from_slice(row);
            attention_mask[start..start + row.len()].fill(1);
        }

        Ok(PaddedBatch {
            features,
            attention_mask,
            lengths,
            labels,
            batch_size,
            max_len,
        })
    }
}

fn pad_label_sequences(seqs: Vec<Vec<usize>>) -> PipelineResult<PaddedLabels> {
    if let Some(index) = seqs.iter().position(Vec::is_empty) {
        return Err(PipelineError::EmptyLabelSequence { index });
    }

    let lengths: Vec<usize> = seqs.iter().map(Vec::len).collect();
    let max_len = lengths.iter().copied().max().unwrap_or(0);

    let mut values = vec![LABEL_PAD_ID; seqs.len() * max_len];
    for (i, seq) in seqs.iter().enumerate() {
        for (j, &id) in seq.iter().enumerate() {
            values[i * max_len + j] = id as i64;
        }
    }

    Ok(PaddedLabels::Sequences { values, max_len, lengths })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn row(padded: &PaddedBatch, i: usize) -> &[f32] {
        &padded.features[i * padded.max_len..(i + 1) * padded.max_len]
    }

    fn mask_row(padded: &PaddedBatch, i: usize) -> &[u8] {
        &padded.attention_mask[i * padded.max_len..(i + 1) * padded.max_len]
    }

    fn ramp(n: usize) -> Vec<f32> {
        (0..n).map(|i| i as f32 * 0.001 + 0.5).collect()
    }

    fn classes(features: Vec<Vec<f32>>, labels: Vec<usize>) -> Batch {
        Batch { features, labels: BatchLabels::Classes(labels) }
    }

    #[test]
    fn test_three_row_scenario() {
        let batch  = classes(vec![ramp(100), ramp(250), ramp(80)], vec![0, 1, 0]);
        let padded = PaddingCollator::default().collate(batch).unwrap();

        assert_eq!(padded.shape(), [3, 250]);
        let mask_sums: Vec<usize> = (0..3)
            .map(|i| mask_row(&padded, i).iter().map(|&m| m as usize).sum())
            .collect();
        assert_eq!(mask_sums, vec![100, 250, 80]);

        assert!(mask_row(&padded, 0)[..100].iter().all(|&m| m == 1));
        assert!(mask_row(&padded, 0)[100..].iter().all(|&m| m == 0));
        assert!(mask_row(&padded, 2)[80..].iter().all(|&m| m == 0));
        assert_eq!(padded.labels, PaddedLabels::Classes(vec![0, 1, 0]));
    }

    #[test]
    fn test_padding_is_lossless() {
        let rows   = vec![ramp(5), ramp(9), ramp(1)];
        let batch  = classes(rows.clone(), vec![1, 1, 0]);
        let padded = PaddingCollator::new(PaddingStrategy::Joint).collate(batch).unwrap();

        for (i, original) in rows.iter().enumerate() {
            let row = row(&padded, i);
            assert_eq!(&row[..original.len()], original.as_slice());
            assert!(row[original.len()..].iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn test_single_sample_gets_full_mask() {
        let padded = PaddingCollator::default()
            .collate(classes(vec![ramp(7)], vec![1]))
            .unwrap();
        assert_eq!(padded.shape(), [1, 7]);
        assert_eq!(padded.attention_mask, vec![1u8; 7]);
    }

    #[test]
    fn test_equal_lengths_still_allocate_mask() {
        let padded = PaddingCollator::default()
            .collate(classes(vec![ramp(4), ramp(4)], vec![0, 1]))
            .unwrap();
        assert_eq!(padded.attention_mask.len(), 8);
        assert!(padded.attention_mask.iter().all(|&m| m == 1));
    }

    #[test]
    fn test_count_mismatch_is_rejected() {
        let err = PaddingCollator::default()
            .collate(classes(vec![ramp(3), ramp(4)], vec![0]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        let err = PaddingCollator::default()
            .collate(classes(vec![], vec![]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyBatch));
    }

    #[test]
    fn test_joint_pads_label_sequences() {
        let batch = Batch {
            features: vec![ramp(3), ramp(6)],
            labels:   BatchLabels::Sequences(vec![vec![2, 0, 1], vec![1]]),
        };
        let padded = PaddingCollator::new(PaddingStrategy::Joint).collate(batch).unwrap();
        assert_eq!(padded.shape(), [2, 6]);
        assert_eq!(padded.lengths, vec![3, 6]);
        assert_eq!(
            padded.labels,
            PaddedLabels::Sequences {
                values:  vec![2, 0, 1, 1, LABEL_PAD_ID, LABEL_PAD_ID],
                max_len: 3,
                lengths: vec![3, 1],
            }
        );
    }

    #[test]
    fn test_feature_only_rejects_label_sequences() {
        let batch = Batch {
            features: vec![ramp(3)],
            labels:   BatchLabels::Sequences(vec![vec![1, 2]]),
        };
        let err = PaddingCollator::default().collate(batch).unwrap_err();
        assert!(matches!(err, PipelineError::SequenceLabels));
    }

    #[test]
    fn test_joint_rejects_empty_label_sequence() {
        let batch = Batch {
            features: vec![ramp(3), ramp(2)],
            labels:   BatchLabels::Sequences(vec![vec![1], vec![]]),
        };
        let err = PaddingCollator::new(PaddingStrategy::Joint).collate(batch).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyLabelSequence { index: 1 }));
    }

    #[test]
    fn test_strategy_serialises_kebab_case() {
        let json = serde_json::to_string(&PaddingStrategy::FeatureOnly).unwrap();
        assert_eq!(json, "\"feature-only\"");
    }
}
