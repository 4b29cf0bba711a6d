// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full fine-tuning pipeline in order:
//
//   Step 1: Read train/validation CSV splits  (Layer 4 - data)
//   Step 2: Fit the label vocabulary          (Layer 3 - domain)
//   Step 3: Decode, resample, normalise       (Layer 4 - data)
//   Step 4: Build datasets                    (Layer 4 - data)
//   Step 5: Save config + vocabulary          (Layer 6 - infra)
//   Step 6: Run training loop                 (Layer 5 - ml)
//
// The vocabulary is fitted on the training split only. Every
// validation label must already be in it, otherwise the run stops
// before any audio is decoded.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::data::{
    collator::PaddingStrategy,
    dataset::SpeechDataset,
    loader::CsvSplitLoader,
    preprocessor::{BatchPreprocessor, DEFAULT_CHUNK_SIZE},
    resampler::Resampler,
};
use crate::domain::{
    evaluation::EvaluationReport,
    label::LabelVocabulary,
    sample::Sample,
    traits::SampleSource,
};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::model::SpeechClassifierConfig;
use crate::ml::trainer::run_training;

// ─── Training Configuration ──────────────────────────────────────────────────
// All settings for a run. Saved next to the checkpoints so that
// `evaluate` and `predict` can rebuild the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub train_csv:                   String,
    pub validation_csv:              String,
    pub input_col:                   String,
    pub label_col:                   String,
    pub output_dir:                  String,
    pub target_sample_rate:          u32,
    /// Zero-mean / unit-variance rescaling of every recording
    #[serde(default = "default_normalize")]
    pub normalize:                   bool,
    pub batch_size:                  usize,
    pub gradient_accumulation_steps: usize,
    pub epochs:                      usize,
    pub learning_rate:               f64,
    pub logging_steps:               usize,
    pub eval_steps:                  usize,
    pub save_steps:                  usize,
    pub save_total_limit:            usize,
    pub freeze_encoder:              bool,
    pub freeze_base_model:           bool,
    pub padding:                     PaddingStrategy,
    pub hidden_dropout:              f64,
    pub feat_proj_dropout:           f64,
    pub seed:                        u64,
    pub num_workers:                 usize,
    pub init_weights:                Option<String>,
    pub conv_dim:                    usize,
    pub hidden_size:                 usize,
    pub classifier_proj_size:        usize,
}

fn default_normalize() -> bool {
    true
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            train_csv:                   "data/splits/stories_train_data_gender_False.csv".to_string(),
            validation_csv:              "data/splits/stories_test_data_gender_False.csv".to_string(),
            input_col:                   "file".to_string(),
            label_col:                   "Diagnosis".to_string(),
            output_dir:                  "model/xlsr_autism_stories".to_string(),
            target_sample_rate:          16_000,
            normalize:                   true,
            batch_size:                  2,
            gradient_accumulation_steps: 2,
            epochs:                      100,
            learning_rate:               3e-3,
            logging_steps:               10,
            eval_steps:                  10,
            save_steps:                  10,
            save_total_limit:            2,
            freeze_encoder:              true,
            freeze_base_model:           false,
            padding:                     PaddingStrategy::FeatureOnly,
            hidden_dropout:              0.01,
            feat_proj_dropout:           0.0,
            seed:                        42,
            num_workers:                 1,
            init_weights:                None,
            conv_dim:                    128,
            hidden_size:                 256,
            classifier_proj_size:        256,
        }
    }
}

impl TrainConfig {
    /// Model architecture for `num_labels` classes.
    /// `dropout = false` builds the inference variant.
    pub fn model_config(&self, num_labels: usize, dropout: bool) -> SpeechClassifierConfig {
        let (hidden, feat_proj) = if dropout {
            (self.hidden_dropout, self.feat_proj_dropout)
        } else {
            (0.0, 0.0)
        };
        SpeechClassifierConfig::new(num_labels)
            .with_conv_dim(self.conv_dim)
            .with_hidden_size(self.hidden_size)
            .with_classifier_proj_size(self.classifier_proj_size)
            .with_hidden_dropout(hidden)
            .with_feat_proj_dropout(feat_proj)
    }

    /// Optimizer steps in one epoch of `num_samples` rows
    pub fn steps_per_epoch(&self, num_samples: usize) -> usize {
        let batches = num_samples.div_ceil(self.batch_size.max(1));
        batches.div_ceil(self.gradient_accumulation_steps.max(1))
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be at least 1");
        anyhow::ensure!(self.epochs > 0, "epochs must be at least 1");
        anyhow::ensure!(
            self.gradient_accumulation_steps > 0,
            "gradient_accumulation_steps must be at least 1"
        );
        anyhow::ensure!(
            self.logging_steps > 0 && self.eval_steps > 0 && self.save_steps > 0,
            "logging_steps, eval_steps and save_steps must be at least 1"
        );
        anyhow::ensure!(self.target_sample_rate > 0, "target_sample_rate must be positive");
        anyhow::ensure!(
            (0.0..1.0).contains(&self.hidden_dropout) && (0.0..1.0).contains(&self.feat_proj_dropout),
            "dropout probabilities must be in [0, 1)"
        );
        Ok(())
    }
}

// ─── Split preparation ───────────────────────────────────────────────────────
/// Read the raw (file, label) rows of one CSV split.
pub fn read_split(path: &str, cfg: &TrainConfig) -> Result<Vec<Sample>> {
    let loader = CsvSplitLoader::new(path, &cfg.input_col, &cfg.label_col);
    loader
        .load_samples()
        .with_context(|| format!("Failed to read split '{path}'"))
}

/// Decode, resample and label-encode a split into a dataset.
pub fn prepare_split(
    name:       &str,
    samples:    &[Sample],
    vocabulary: &LabelVocabulary,
    cfg:        &TrainConfig,
) -> Result<SpeechDataset> {
    let audio        = Resampler::new();
    let preprocessor = BatchPreprocessor::new(&audio, vocabulary, cfg.target_sample_rate)
        .with_normalization(cfg.normalize);
    let prepared     = preprocessor
        .process_split(samples, DEFAULT_CHUNK_SIZE)
        .with_context(|| format!("Failed to preprocess {name} split"))?;

    let dataset = SpeechDataset::new(prepared);
    let mut per_class = vec![0usize; vocabulary.len()];
    for label in dataset.labels() {
        per_class[label] += 1;
    }
    tracing::info!(
        "{} split: {} recordings {:?}, {:.1}s of audio at {} Hz",
        name,
        dataset.sample_count(),
        per_class,
        dataset.total_seconds(cfg.target_sample_rate),
        cfg.target_sample_rate,
    );
    Ok(dataset)
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline and return the final evaluation.
    pub fn execute(&self) -> Result<EvaluationReport> {
        let cfg = &self.config;
        cfg.validate()?;

        // ── Step 1: Read splits ──────────────────────────────────────────────
        let train_rows = read_split(&cfg.train_csv, cfg)?;
        let val_rows   = read_split(&cfg.validation_csv, cfg)?;
        anyhow::ensure!(!train_rows.is_empty(), "Training split '{}' has no rows", cfg.train_csv);

        // ── Step 2: Label vocabulary (train split only) ──────────────────────
        let vocabulary = LabelVocabulary::fit(train_rows.iter().map(|s| s.raw_label.as_str()));
        tracing::info!("A classification problem with {} classes: {:?}", vocabulary.len(), vocabulary.labels());
        if vocabulary.len() < 2 {
            tracing::warn!("Only one class in the training split; every prediction will be the same");
        }

        for (row, sample) in val_rows.iter().enumerate() {
            vocabulary
                .encode(&sample.raw_label)
                .map_err(|e| e.at_row(row, &sample.file_path))
                .with_context(|| format!("Validation split '{}' has a label unseen in training", cfg.validation_csv))?;
        }

        // ── Step 3 + 4: Audio preprocessing → datasets ───────────────────────
        let train_dataset = prepare_split("train", &train_rows, &vocabulary, cfg)?;
        let val_dataset   = prepare_split("validation", &val_rows, &vocabulary, cfg)?;

        // ── Step 5: Persist what evaluate/predict need ───────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.output_dir)?;
        ckpt_manager.save_config(cfg)?;
        ckpt_manager.save_vocabulary(&vocabulary)?;
        let metrics_logger = MetricsLogger::new(&cfg.output_dir)?;
        tracing::info!("Evaluation metrics → '{}'", metrics_logger.csv_path().display());

        // ── Step 6: Training loop (Layer 5) ──────────────────────────────────
        run_training(cfg, &vocabulary, train_dataset, val_dataset, ckpt_manager, metrics_logger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let cfg = TrainConfig::default();
        assert_eq!(cfg.input_col, "file");
        assert_eq!(cfg.label_col, "Diagnosis");
        assert_eq!(cfg.target_sample_rate, 16_000);
        assert!(cfg.normalize);
        assert_eq!(cfg.batch_size, 2);
        assert_eq!(cfg.gradient_accumulation_steps, 2);
        assert!(cfg.freeze_encoder && !cfg.freeze_base_model);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_steps_per_epoch_rounds_up() {
        let cfg = TrainConfig::default();
        // 9 rows → 5 batches of 2 → 3 optimizer steps
        assert_eq!(cfg.steps_per_epoch(9), 3);
        assert_eq!(cfg.steps_per_epoch(8), 2);
        assert_eq!(cfg.steps_per_epoch(0), 0);
    }

    #[test]
    fn test_model_config_without_dropout() {
        let cfg   = TrainConfig::default();
        let model = cfg.model_config(3, false);
        assert_eq!(model.num_labels, 3);
        assert_eq!(model.hidden_dropout, 0.0);
        assert_eq!(cfg.model_config(3, true).hidden_dropout, 0.01);
    }

    #[test]
    fn test_config_json_roundtrip() {
        let cfg  = TrainConfig { init_weights: Some("weights/base".into()), ..Default::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"padding\":\"feature-only\""));
        let back: TrainConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.init_weights.as_deref(), Some("weights/base"));
        assert!(back.normalize);
    }

    #[test]
    fn test_config_without_normalize_field_defaults_on() {
        let mut value = serde_json::to_value(TrainConfig::default()).unwrap();
        value.as_object_mut().unwrap().remove("normalize");
        let back: TrainConfig = serde_json::from_value(value).unwrap();
        assert!(back.normalize);
    }

    #[test]
    fn test_unseen_validation_label_fails_before_decoding() {
        let tmp   = tempfile::tempdir().unwrap();
        let train = tmp.path().join("train.csv");
        let val   = tmp.path().join("val.csv");
        std::fs::write(&train, "file,Diagnosis\na.wav,ASD\nb.wav,TD\n").unwrap();
        std::fs::write(&val, "file,Diagnosis\nc.wav,OTHER\n").unwrap();

        let cfg = TrainConfig {
            train_csv:      train.to_string_lossy().into_owned(),
            validation_csv: val.to_string_lossy().into_owned(),
            output_dir:     tmp.path().join("out").to_string_lossy().into_owned(),
            ..Default::default()
        };
        let err = TrainUseCase::new(cfg).execute().unwrap_err();
        assert!(format!("{err:#}").contains("OTHER"));
        assert!(!tmp.path().join("out").exists());
    }
}
