// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `train`, `evaluate`, `predict`
// and all their configurable flags.
//
// Defaults reproduce the reference fine-tuning run: 16 kHz audio,
// batch size 2 with 2 accumulation steps, lr 3e-3 for 100 epochs,
// evaluate and save every 10 steps, feature encoder frozen.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{ArgAction, Args, Subcommand, ValueEnum};

use crate::application::train_use_case::TrainConfig;
use crate::data::collator::PaddingStrategy;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fine-tune the classifier on a train/validation CSV pair
    Train(TrainArgs),

    /// Score a trained run on a CSV split
    Evaluate(EvaluateArgs),

    /// Classify a single audio file
    Predict(PredictArgs),
}

/// Padding strategy as accepted on the command line
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PaddingArg {
    /// Pad audio only; class labels pass through
    FeatureOnly,
    /// Pad audio and label sequences
    Joint,
}

impl From<PaddingArg> for PaddingStrategy {
    fn from(p: PaddingArg) -> Self {
        match p {
            PaddingArg::FeatureOnly => PaddingStrategy::FeatureOnly,
            PaddingArg::Joint       => PaddingStrategy::Joint,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// CSV with the training rows
    #[arg(long, default_value = "data/splits/stories_train_data_gender_False.csv")]
    pub train_csv: String,

    /// CSV with the validation rows
    #[arg(long, default_value = "data/splits/stories_test_data_gender_False.csv")]
    pub validation_csv: String,

    /// Column holding the audio file path
    #[arg(long, default_value = "file")]
    pub input_col: String,

    /// Column holding the class label
    #[arg(long, default_value = "Diagnosis")]
    pub label_col: String,

    /// Where checkpoints, config, vocabulary and metrics.csv go
    #[arg(long, default_value = "model/xlsr_autism_stories")]
    pub output_dir: String,

    /// Sample rate every recording is resampled to
    #[arg(long, default_value_t = 16_000)]
    pub target_sample_rate: u32,

    /// Rescale each recording to zero mean and unit variance
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub normalize: bool,

    #[arg(long, default_value_t = 2)]
    pub batch_size: usize,

    /// Batches whose gradients are summed per optimizer step
    #[arg(long, default_value_t = 2)]
    pub gradient_accumulation_steps: usize,

    #[arg(long, default_value_t = 100)]
    pub epochs: usize,

    /// Peak learning rate; decays linearly to zero
    #[arg(long, default_value_t = 3e-3)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 10)]
    pub logging_steps: usize,

    #[arg(long, default_value_t = 10)]
    pub eval_steps: usize,

    #[arg(long, default_value_t = 10)]
    pub save_steps: usize,

    /// Checkpoints kept on disk; older ones are deleted
    #[arg(long, default_value_t = 2)]
    pub save_total_limit: usize,

    /// Freeze the convolutional feature encoder
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub freeze_encoder: bool,

    /// Freeze everything except the classification head.
    /// Takes precedence over --freeze-encoder.
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub freeze_base_model: bool,

    #[arg(long, value_enum, default_value_t = PaddingArg::FeatureOnly)]
    pub padding: PaddingArg,

    #[arg(long, default_value_t = 0.01)]
    pub hidden_dropout: f64,

    #[arg(long, default_value_t = 0.0)]
    pub feat_proj_dropout: f64,

    /// Shuffle seed for the training loader
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Data loader worker threads
    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,

    /// Burn record to start from instead of random weights
    #[arg(long)]
    pub init_weights: Option<String>,

    /// Channels of the convolutional feature encoder
    #[arg(long, default_value_t = 128)]
    pub conv_dim: usize,

    #[arg(long, default_value_t = 256)]
    pub hidden_size: usize,

    #[arg(long, default_value_t = 256)]
    pub classifier_proj_size: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            train_csv:                   a.train_csv,
            validation_csv:              a.validation_csv,
            input_col:                   a.input_col,
            label_col:                   a.label_col,
            output_dir:                  a.output_dir,
            target_sample_rate:          a.target_sample_rate,
            normalize:                   a.normalize,
            batch_size:                  a.batch_size,
            gradient_accumulation_steps: a.gradient_accumulation_steps,
            epochs:                      a.epochs,
            learning_rate:               a.learning_rate,
            logging_steps:               a.logging_steps,
            eval_steps:                  a.eval_steps,
            save_steps:                  a.save_steps,
            save_total_limit:            a.save_total_limit,
            freeze_encoder:              a.freeze_encoder,
            freeze_base_model:           a.freeze_base_model,
            padding:                     a.padding.into(),
            hidden_dropout:              a.hidden_dropout,
            feat_proj_dropout:           a.feat_proj_dropout,
            seed:                        a.seed,
            num_workers:                 a.num_workers,
            init_weights:                a.init_weights,
            conv_dim:                    a.conv_dim,
            hidden_size:                 a.hidden_size,
            classifier_proj_size:        a.classifier_proj_size,
        }
    }
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// Output directory of a finished `train` run
    #[arg(long, default_value = "model/xlsr_autism_stories")]
    pub output_dir: String,

    /// CSV split to score; defaults to the run's validation split
    #[arg(long)]
    pub split: Option<String>,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Audio file(s) to classify
    #[arg(long, required = true, num_args = 1..)]
    pub file: Vec<String>,

    /// Output directory of a finished `train` run
    #[arg(long, default_value = "model/xlsr_autism_stories")]
    pub output_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use clap::Parser;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(args).unwrap().command
    }

    #[test]
    fn test_train_defaults_match_config_defaults() {
        let Commands::Train(args) = parse(&["speech-diagnosis", "train"]) else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        let def = TrainConfig::default();
        assert_eq!(cfg.train_csv, def.train_csv);
        assert_eq!(cfg.batch_size, def.batch_size);
        assert_eq!(cfg.learning_rate, def.learning_rate);
        assert_eq!(cfg.padding, def.padding);
        assert_eq!(cfg.freeze_encoder, def.freeze_encoder);
        assert_eq!(cfg.hidden_dropout, def.hidden_dropout);
        assert_eq!(cfg.normalize, def.normalize);
    }

    #[test]
    fn test_bool_flags_take_values() {
        let Commands::Train(args) = parse(&[
            "speech-diagnosis", "train",
            "--freeze-encoder", "false",
            "--freeze-base-model", "true",
            "--padding", "joint",
            "--normalize", "false",
        ]) else {
            panic!("expected train");
        };
        assert!(!args.normalize);
        assert!(!args.freeze_encoder);
        assert!(args.freeze_base_model);
        assert_eq!(PaddingStrategy::from(args.padding), PaddingStrategy::Joint);
    }

    #[test]
    fn test_predict_requires_file() {
        assert!(Cli::try_parse_from(["speech-diagnosis", "predict"]).is_err());
        let Commands::Predict(args) = parse(&["speech-diagnosis", "predict", "--file", "a.wav", "b.flac"]) else {
            panic!("expected predict");
        };
        assert_eq!(args.file, vec!["a.wav", "b.flac"]);
    }
}
