// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records one row to a CSV file after every evaluation.
//
// Columns:
//   - step:       optimizer step the evaluation ran at
//   - epoch:      epoch in progress (1-based)
//   - train_loss: mean training loss since the previous log row
//   - eval_loss:  mean cross-entropy over the validation split
//   - accuracy:   fraction of validation recordings classified correctly
//   - macro_f1:   unweighted mean of per-class F1
//
// Output file: <output_dir>/metrics.csv
//
//   step,epoch,train_loss,eval_loss,accuracy,macro_f1
//   10,1,0.693100,0.690200,0.500000,0.333333
//   20,2,0.671200,0.680500,0.625000,0.615385

use anyhow::Result;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

use crate::domain::evaluation::EvaluationReport;

/// One row of the evaluation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalMetrics {
    pub step:       usize,
    pub epoch:      usize,
    pub train_loss: f64,
    pub eval_loss:  f64,
    pub accuracy:   f64,
    pub macro_f1:   f64,
}

impl EvalMetrics {
    pub fn new(
        step:       usize,
        epoch:      usize,
        train_loss: f64,
        eval_loss:  f64,
        report:     &EvaluationReport,
    ) -> Self {
        Self {
            step,
            epoch,
            train_loss,
            eval_loss,
            accuracy: report.accuracy,
            macro_f1: report.macro_f1(),
        }
    }

    /// Returns true if accuracy beat the previous best
    pub fn is_improvement(&self, best_accuracy: f64) -> bool {
        self.accuracy > best_accuracy
    }
}

/// Appends evaluation rows to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Writes the CSV header if the file doesn't exist yet,
    /// so repeated runs append to the same log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "step,epoch,train_loss,eval_loss,accuracy,macro_f1")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn log(&self, m: &EvalMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)?;

        writeln!(
            f,
            "{},{},{:.6},{:.6},{:.6},{:.6}",
            m.step, m.epoch, m.train_loss, m.eval_loss, m.accuracy, m.macro_f1,
        )?;

        tracing::debug!(
            "Logged step {} metrics: eval_loss={:.4}, accuracy={:.4}",
            m.step,
            m.eval_loss,
            m.accuracy,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::evaluation::evaluate_predictions;
    use crate::domain::label::LabelVocabulary;

    fn sample_metrics(step: usize) -> EvalMetrics {
        let vocab  = LabelVocabulary::fit(["ASD", "TD"]);
        let report = evaluate_predictions(&[0, 1, 1, 1], &[0, 0, 1, 1], &vocab).unwrap();
        EvalMetrics::new(step, 1, 0.7, 0.65, &report)
    }

    #[test]
    fn test_is_improvement() {
        let m = sample_metrics(10);
        assert!(m.is_improvement(0.5));
        assert!(!m.is_improvement(0.75));
    }

    #[test]
    fn test_appends_rows_under_one_header() {
        let tmp = tempfile::tempdir().unwrap();
        MetricsLogger::new(tmp.path()).unwrap().log(&sample_metrics(10)).unwrap();
        MetricsLogger::new(tmp.path()).unwrap().log(&sample_metrics(20)).unwrap();

        let text = fs::read_to_string(tmp.path().join("metrics.csv")).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("step,"));
        assert!(lines[1].starts_with("10,1,0.700000,0.650000,0.750000"));
        assert!(lines[2].starts_with("20,"));
    }
}
