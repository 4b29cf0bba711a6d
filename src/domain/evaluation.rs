// ============================================================
// Layer 3 — Metrics Evaluator
// ============================================================
// Maps model outputs to diagnostic decisions and scores them.
//
//   logits [N, C] ──argmax──► predicted ids [N]
//                                   │
//   true ids [N] ───────────────────┤
//                                   ▼
//                  accuracy, confusion matrix, per-class
//                  precision / recall / F1 / support
//
// This is a pure function of (logits, labels, vocabulary):
// no captured state, no printing. The caller decides what to
// do with the report (print it, log it to CSV, ...).
//
// Conventions:
//   - confusion[i][j] counts samples of true class i predicted as j
//   - argmax ties go to the lowest class id, matching the sorted
//     vocabulary order
//   - a class with no true and/or no predicted samples reports
//     0.0 for the undefined ratios instead of dividing by zero

use std::fmt;

use serde::Serialize;

use crate::domain::error::{PipelineError, PipelineResult};
use crate::domain::label::LabelVocabulary;

/// Index of the largest score. NaN scores are skipped and ties
/// keep the lowest id; a row with no number at all maps to 0.
pub fn argmax(row: &[f32]) -> usize {
    let mut best: Option<usize> = None;
    for (i, &v) in row.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        if best.map_or(true, |b| v > row[b]) {
            best = Some(i);
        }
    }
    best.unwrap_or(0)
}

/// NxN confusion matrix over class ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    matrix: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn from_predictions(
        predictions: &[usize],
        targets:     &[usize],
        num_classes: usize,
    ) -> PipelineResult<Self> {
        if predictions.len() != targets.len() {
            return Err(PipelineError::ShapeMismatch {
                context:  "predictions vs labels",
                expected: targets.len(),
                actual:   predictions.len(),
            });
        }

        let mut matrix = vec![vec![0u64; num_classes]; num_classes];
        for (&pred, &target) in predictions.iter().zip(targets) {
            for id in [pred, target] {
                if id >= num_classes {
                    return Err(PipelineError::ClassIdOutOfRange { id, num_classes });
                }
            }
            matrix[target][pred] += 1;
        }
        Ok(Self { matrix })
    }

    pub fn num_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn rows(&self) -> &[Vec<u64>] {
        &self.matrix
    }

    pub fn true_positives(&self, c: usize) -> u64 {
        self.matrix[c][c]
    }

    /// Number of samples predicted as class c
    pub fn predicted_count(&self, c: usize) -> u64 {
        self.matrix.iter().map(|row| row[c]).sum()
    }

    /// Number of samples whose true class is c
    pub fn support(&self, c: usize) -> u64 {
        self.matrix[c].iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.matrix.iter().flatten().sum()
    }

    pub fn trace(&self) -> u64 {
        (0..self.num_classes()).map(|c| self.true_positives(c)).sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, row) in self.rows().iter().enumerate() {
            if i > 0 {
                write!(f, "\n ")?;
            }
            let cells: Vec<String> = row.iter().map(|v| format!("{v:>4}")).collect();
            write!(f, "[{}]", cells.join(" "))?;
        }
        write!(f, "]")
    }
}

/// Precision / recall / F1 for one class.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub label:     String,
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
    pub support:   u64,
}

/// Averaged precision / recall / F1.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall:    f64,
    pub f1:        f64,
}

/// Everything computed for one evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluationReport {
    pub accuracy:     f64,
    pub confusion:    ConfusionMatrix,
    pub per_class:    Vec<ClassMetrics>,
    pub macro_avg:    AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub total:        u64,
}

impl EvaluationReport {
    pub fn macro_f1(&self) -> f64 {
        self.macro_avg.f1
    }
}

fn ratio(num: u64, denom: u64) -> f64 {
    if denom == 0 { 0.0 } else { num as f64 / denom as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Score already-decided predictions against the true ids.
pub fn evaluate_predictions(
    predictions: &[usize],
    targets:     &[usize],
    vocabulary:  &LabelVocabulary,
) -> PipelineResult<EvaluationReport> {
    let num_classes = vocabulary.len();
    let confusion   = ConfusionMatrix::from_predictions(predictions, targets, num_classes)?;
    let total       = confusion.total();

    let per_class = vocabulary
        .labels()
        .iter()
        .enumerate()
        .map(|(c, label)| {
            let tp        = confusion.true_positives(c);
            let precision = ratio(tp, confusion.predicted_count(c));
            let recall    = ratio(tp, confusion.support(c));
            ClassMetrics {
                label: label.clone(),
                precision,
                recall,
                f1: f1(precision, recall),
                support: confusion.support(c),
            }
        })
        .collect::<Vec<_>>();

    let n = per_class.len().max(1) as f64;
    let macro_avg = AveragedMetrics {
        precision: per_class.iter().map(|m| m.precision).sum::<f64>() / n,
        recall:    per_class.iter().map(|m| m.recall).sum::<f64>() / n,
        f1:        per_class.iter().map(|m| m.f1).sum::<f64>() / n,
    };

    let weight = |m: &ClassMetrics| ratio(m.support, total);
    let weighted_avg = AveragedMetrics {
        precision: per_class.iter().map(|m| m.precision * weight(m)).sum(),
        recall:    per_class.iter().map(|m| m.recall * weight(m)).sum(),
        f1:        per_class.iter().map(|m| m.f1 * weight(m)).sum(),
    };

    Ok(EvaluationReport {
        accuracy: ratio(confusion.trace(), total),
        confusion,
        per_class,
        macro_avg,
        weighted_avg,
        total,
    })
}

/// Score raw logits (one row of class scores per sample).
pub fn evaluate_logits(
    logits:     &[Vec<f32>],
    targets:    &[usize],
    vocabulary: &LabelVocabulary,
) -> PipelineResult<EvaluationReport> {
    if logits.len() != targets.len() {
        return Err(PipelineError::ShapeMismatch {
            context:  "logit rows vs labels",
            expected: targets.len(),
            actual:   logits.len(),
        });
    }
    if let Some(row) = logits.iter().find(|r| r.len() != vocabulary.len()) {
        return Err(PipelineError::ShapeMismatch {
            context:  "logit row width vs vocabulary",
            expected: vocabulary.len(),
            actual:   row.len(),
        });
    }

    let predictions: Vec<usize> = logits.iter().map(|r| argmax(r)).collect();
    evaluate_predictions(&predictions, targets, vocabulary)
}

impl fmt::Display for EvaluationReport {
    /// Text classification report in the usual column layout.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .per_class
            .iter()
            .map(|m| m.label.len())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(12);

        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                m.label, m.precision, m.recall, m.f1, m.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        Ok(())
    }
}
