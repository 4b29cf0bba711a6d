// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Runs a trained classifier over a whole split (evaluation) or
// a single recording (prediction).
//
// Evaluation keeps the host-side targets of every batch and the
// raw logits, then hands both to the pure metrics evaluator in
// Layer 3; no metric is computed on the device.
use std::{path::Path, sync::Arc};

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    prelude::*,
};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{SpeechBatch, SpeechBatcher},
    collator::PaddingCollator,
    dataset::SpeechDataset,
    preprocessor::normalize_utterance,
    resampler::Resampler,
};
use crate::domain::{
    evaluation::{argmax, evaluate_logits, EvaluationReport},
    label::LabelVocabulary,
    traits::AudioSource,
};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::SpeechClassifier;

type InferBackend = burn::backend::Wgpu;

/// Logits and targets collected over one split, in loader order.
#[derive(Debug, Default)]
pub struct SplitOutputs {
    pub logits:    Vec<Vec<f32>>,
    pub targets:   Vec<usize>,
    /// Mean cross-entropy per recording; NaN for an empty split
    pub mean_loss: f64,
}

/// Forward every batch of `loader` through `model`.
pub fn collect_outputs<B: Backend>(
    model:  &SpeechClassifier<B>,
    loader: &Arc<dyn DataLoader<SpeechBatch<B>>>,
) -> SplitOutputs {
    let mut out      = SplitOutputs::default();
    let mut loss_sum = 0.0f64;

    for batch in loader.iter() {
        let n = batch.batch_size();
        let (loss, logits) = model.forward_loss(
            batch.input_values,
            batch.attention_mask,
            batch.labels,
        );
        loss_sum += loss.into_scalar().elem::<f64>() * n as f64;

        let [_, num_labels] = logits.dims();
        let flat: Vec<f32> = logits.into_data().iter::<f32>().collect();
        out.logits.extend(flat.chunks(num_labels).map(<[f32]>::to_vec));
        out.targets.extend(batch.targets);
    }

    out.mean_loss = if out.targets.is_empty() {
        f64::NAN
    } else {
        loss_sum / out.targets.len() as f64
    };
    out
}

/// Evaluate `model` on a split: (report, mean eval loss).
pub fn evaluate_split<B: Backend>(
    model:      &SpeechClassifier<B>,
    loader:     &Arc<dyn DataLoader<SpeechBatch<B>>>,
    vocabulary: &LabelVocabulary,
) -> Result<(EvaluationReport, f64)> {
    let outputs = collect_outputs(model, loader);
    let report  = evaluate_logits(&outputs.logits, &outputs.targets, vocabulary)?;
    Ok((report, outputs.mean_loss))
}

/// Class probabilities for one recording.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub label:         String,
    pub class_id:      usize,
    /// (label, softmax probability) in class-id order
    pub probabilities: Vec<(String, f32)>,
}

pub struct Inferencer {
    model:      SpeechClassifier<InferBackend>,
    vocabulary: LabelVocabulary,
    config:     TrainConfig,
    device:     burn::backend::wgpu::WgpuDevice,
}

impl Inferencer {
    /// Rebuild the model from the saved config + vocabulary and load
    /// the latest checkpoint.
    pub fn from_checkpoint(ckpt_manager: &CheckpointManager) -> Result<Self> {
        let device     = burn::backend::wgpu::WgpuDevice::default();
        let config     = ckpt_manager.load_config()?;
        let vocabulary = ckpt_manager.load_vocabulary()?;

        let model: SpeechClassifier<InferBackend> =
            config.model_config(vocabulary.len(), false).init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!(
            "Model loaded from '{}': {} classes {:?}",
            ckpt_manager.dir().display(),
            vocabulary.len(),
            vocabulary.labels(),
        );

        Ok(Self { model, vocabulary, config, device })
    }

    pub fn vocabulary(&self) -> &LabelVocabulary {
        &self.vocabulary
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Evaluate on a preprocessed split.
    pub fn evaluate(&self, dataset: SpeechDataset) -> Result<(EvaluationReport, f64)> {
        let batcher = SpeechBatcher::<InferBackend>::new(
            self.device.clone(),
            PaddingCollator::new(self.config.padding),
        );
        let loader = DataLoaderBuilder::new(batcher)
            .batch_size(self.config.batch_size)
            .num_workers(self.config.num_workers)
            .build(dataset);
        evaluate_split(&self.model, &loader, &self.vocabulary)
    }

    /// Classify a single audio file.
    pub fn predict(&self, path: &Path) -> Result<Prediction> {
        let mut features = Resampler::new()
            .load(path, self.config.target_sample_rate)
            .with_context(|| format!("Cannot prepare '{}'", path.display()))?;
        anyhow::ensure!(!features.is_empty(), "'{}' contains no audio", path.display());
        if self.config.normalize {
            normalize_utterance(&mut features);
        }

        let len    = features.len();
        let input  = Tensor::<InferBackend, 1>::from_floats(features.as_slice(), &self.device)
            .reshape([1, len]);
        let mask   = Tensor::<InferBackend, 2, Int>::ones([1, len], &self.device);
        let logits = self.model.forward(input, mask);

        let probs: Vec<f32> = burn::tensor::activation::softmax(logits, 1)
            .into_data()
            .iter::<f32>()
            .collect();

        let class_id = argmax(&probs);
        let label    = self.vocabulary.decode(class_id)?.to_string();
        let probabilities = self
            .vocabulary
            .labels()
            .iter()
            .cloned()
            .zip(probs)
            .collect();

        tracing::debug!("'{}' → {} (id {})", path.display(), label, class_id);
        Ok(Prediction { label, class_id, probabilities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sample::PreparedSample;
    use crate::ml::model::SpeechClassifierConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn loader(samples: Vec<PreparedSample>) -> Arc<dyn DataLoader<SpeechBatch<TestBackend>>> {
        let batcher = SpeechBatcher::<TestBackend>::new(Default::default(), PaddingCollator::default());
        DataLoaderBuilder::new(batcher)
            .batch_size(2)
            .build(SpeechDataset::new(samples))
    }

    fn tiny_model() -> SpeechClassifier<TestBackend> {
        SpeechClassifierConfig::new(2)
            .with_conv_dim(4)
            .with_hidden_size(4)
            .with_classifier_proj_size(4)
            .init(&Default::default())
    }

    #[test]
    fn test_collect_outputs_keeps_every_row() {
        let samples = vec![
            PreparedSample { features: vec![0.1; 120], label: 0 },
            PreparedSample { features: vec![0.2; 90],  label: 1 },
            PreparedSample { features: vec![0.3; 200], label: 1 },
        ];
        let out = collect_outputs(&tiny_model(), &loader(samples));

        assert_eq!(out.targets, vec![0, 1, 1]);
        assert_eq!(out.logits.len(), 3);
        assert!(out.logits.iter().all(|row| row.len() == 2));
        assert!(out.mean_loss.is_finite() && out.mean_loss > 0.0);
    }

    #[test]
    fn test_evaluate_split_report_covers_split() {
        let vocab   = LabelVocabulary::fit(["ASD", "TD"]);
        let samples = vec![
            PreparedSample { features: vec![0.5; 64], label: 0 },
            PreparedSample { features: vec![0.5; 64], label: 1 },
        ];
        let (report, _) = evaluate_split(&tiny_model(), &loader(samples), &vocab).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.confusion.total(), 2);
        // Identical inputs → identical predictions → exactly one correct
        assert_eq!(report.accuracy, 0.5);
    }

    #[test]
    fn test_empty_split() {
        let vocab = LabelVocabulary::fit(["ASD", "TD"]);
        let (report, loss) = evaluate_split(&tiny_model(), &loader(Vec::new()), &vocab).unwrap();
        assert_eq!(report.accuracy, 0.0);
        assert!(loss.is_nan());
    }
}
