// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`    — fine-tune on a train/validation CSV pair
//   2. `evaluate` — reload a run and score it on a CSV split
//   3. `predict`  — classify individual audio files
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use std::path::Path;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, TrainArgs};

use crate::ml::inferencer::Prediction;

#[derive(Parser, Debug)]
#[command(
    name = "speech-diagnosis",
    version = "0.1.0",
    about = "Fine-tune an audio classifier on labelled recordings, then evaluate or predict."
)]
pub struct Cli {
    /// The subcommand to run (train, evaluate or predict)
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Predict(args)  => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on '{}'", args.train_csv);
    let output_dir = args.output_dir.clone();

    let report = TrainUseCase::new(args.into()).execute()?;

    println!("\nTraining complete. Final accuracy: {:.4}", report.accuracy);
    println!("Checkpoints and metrics saved to '{}'", output_dir);
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let use_case = EvaluateUseCase::new(&args.output_dir)?;
    let (report, eval_loss) = use_case.execute(args.split.as_deref())?;

    println!("\neval_loss: {:.4}", eval_loss);
    println!("accuracy:  {:.4}", report.accuracy);
    println!("\nConfusion matrix (rows = true, columns = predicted):");
    println!("{}", report.confusion);
    println!("\n{report}");
    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let use_case = PredictUseCase::new(&args.output_dir)?;
    for file in &args.file {
        let prediction = use_case.predict(Path::new(file))?;
        println!("{}", format_prediction(file, &prediction));
    }
    Ok(())
}

/// One output line per file: `path: label [id] (label=p, ...)`
fn format_prediction(file: &str, prediction: &Prediction) -> String {
    let probs: Vec<String> = prediction
        .probabilities
        .iter()
        .map(|(label, p)| format!("{label}={p:.4}"))
        .collect();
    format!("{}: {} [{}] ({})", file, prediction.label, prediction.class_id, probs.join(", "))
}
