// ============================================================
// Layer 4 — Speech Batcher
// ============================================================
// Implements Burn's Batcher trait to convert a Vec<PreparedSample>
// into device tensors.
//
// How batching works here:
//   Input:  N PreparedSamples with feature lengths L1..LN
//   Collate: PaddingCollator pads every row to max(L1..LN)
//   Output: SpeechBatch with tensors of shape [N, max_len]
//
//   The collator returns flat row-major buffers, so each tensor
//   is a 1-D tensor reshaped to [batch, max_len]:
//   [s1_t1, ..., s1_tM, s2_t1, ..., sN_tM] → [N, M]
//
// The Batcher trait cannot return a Result. Items reach it as
// whole PreparedSamples, so features and labels are aligned by
// construction; a collation failure here is an invariant
// violation and panics with the underlying error.
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::collator::PaddingCollator;
use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::sample::{Batch, PaddedBatch, PaddedLabels, PreparedSample};

// ─── SpeechBatch ──────────────────────────────────────────────────────────────
/// A padded batch of recordings ready for the model forward pass.
#[derive(Debug, Clone)]
pub struct SpeechBatch<B: Backend> {
    /// Padded audio — shape: [batch_size, max_len]
    pub input_values: Tensor<B, 2>,

    /// 1 = real sample, 0 = padding — shape: [batch_size, max_len]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Class ids — shape: [batch_size]
    pub labels: Tensor<B, 1, Int>,

    /// Unpadded length of each row, in batch order
    pub lengths: Vec<usize>,

    /// Class ids kept on the host for metric computation
    pub targets: Vec<usize>,
}

impl<B: Backend> SpeechBatch<B> {
    /// Upload a collated batch to `device`.
    pub fn from_padded(padded: PaddedBatch, device: &B::Device) -> PipelineResult<Self> {
        let [batch_size, max_len] = padded.shape();
        let PaddedLabels::Classes(targets) = padded.labels else {
            return Err(PipelineError::SequenceLabels);
        };

        let mask_flat: Vec<i32> = padded.attention_mask.iter().map(|&m| m as i32).collect();
        let label_ids: Vec<i32> = targets.iter().map(|&t| t as i32).collect();

        let input_values = Tensor::<B, 1>::from_floats(
            padded.features.as_slice(), device
        ).reshape([batch_size, max_len]);

        let attention_mask = Tensor::<B, 1, Int>::from_ints(
            mask_flat.as_slice(), device
        ).reshape([batch_size, max_len]);

        let labels = Tensor::<B, 1, Int>::from_ints(label_ids.as_slice(), device);

        Ok(Self {
            input_values,
            attention_mask,
            labels,
            lengths: padded.lengths,
            targets,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.targets.len()
    }
}

// ─── SpeechBatcher ────────────────────────────────────────────────────────────
/// Holds the target device and the padding strategy.
#[derive(Clone, Debug)]
pub struct SpeechBatcher<B: Backend> {
    pub device:   B::Device,
    pub collator: PaddingCollator,
}

impl<B: Backend> SpeechBatcher<B> {
    pub fn new(device: B::Device, collator: PaddingCollator) -> Self {
        Self { device, collator }
    }
}

impl<B: Backend> Batcher<PreparedSample, SpeechBatch<B>> for SpeechBatcher<B> {
    fn batch(&self, items: Vec<PreparedSample>) -> SpeechBatch<B> {
        self.collator
            .collate(Batch::from_prepared(items))
            .and_then(|padded| SpeechBatch::from_padded(padded, &self.device))
            .unwrap_or_else(|e| panic!("collation invariant violated: {e}"))
    }
}
