// ============================================================
// Layer 2 — Evaluate Use Case
// ============================================================
// Re-scores a trained run on any CSV split:
//   1. Rebuild model + vocabulary from the output directory
//   2. Read and preprocess the split exactly as in training
//   3. Collect logits and score them with the metrics evaluator
//
// Labels in the split must be part of the saved vocabulary.

use anyhow::Result;

use crate::application::train_use_case::{prepare_split, read_split};
use crate::domain::evaluation::EvaluationReport;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Inferencer;

pub struct EvaluateUseCase {
    inferencer: Inferencer,
}

impl EvaluateUseCase {
    pub fn new(output_dir: &str) -> Result<Self> {
        let ckpt       = CheckpointManager::open(output_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt)?;
        Ok(Self { inferencer })
    }

    /// Evaluate on `split_csv`, or on the run's validation split if `None`.
    /// Returns the report and the mean eval loss.
    pub fn execute(&self, split_csv: Option<&str>) -> Result<(EvaluationReport, f64)> {
        let cfg   = self.inferencer.config();
        let split = split_csv.unwrap_or(&cfg.validation_csv);
        tracing::info!("Evaluating on '{}'", split);

        let rows    = read_split(split, cfg)?;
        let dataset = prepare_split("evaluation", &rows, self.inferencer.vocabulary(), cfg)?;

        let (report, eval_loss) = self.inferencer.evaluate(dataset)?;
        tracing::info!("eval_loss={:.4} accuracy={:.4}", eval_loss, report.accuracy);
        Ok((report, eval_loss))
    }
}
