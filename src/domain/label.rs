// ============================================================
// Layer 3 — Label Vocabulary
// ============================================================
// Deterministic bijection between diagnosis label strings and
// integer class ids.
//
//   fit(["TD", "ASD", "TD"]) → ["ASD", "TD"]
//   encode("ASD") → 0, encode("TD") → 1
//   decode(1)     → "TD"
//
// The vocabulary is fitted once, on the training split only,
// and never changes afterwards. Validation labels must already
// be in it: an unknown label is an error, never a default id,
// because a silent fallback would corrupt the loss.
//
// Serialised next to the checkpoints as label2id / id2label so
// evaluation and prediction rebuild the same mapping.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VocabularyFile", into = "VocabularyFile")]
pub struct LabelVocabulary {
    /// Sorted distinct labels; position = class id
    labels: Vec<String>,
}

impl LabelVocabulary {
    /// Fit a vocabulary from the training labels.
    /// Duplicates collapse; order is lexicographic.
    pub fn fit<I, S>(training_labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let distinct: BTreeSet<String> = training_labels
            .into_iter()
            .map(|l| l.as_ref().to_string())
            .collect();
        Self { labels: distinct.into_iter().collect() }
    }

    /// Map a label string to its class id
    pub fn encode(&self, label: &str) -> PipelineResult<usize> {
        self.labels
            .binary_search_by(|probe| probe.as_str().cmp(label))
            .map_err(|_| PipelineError::UnknownLabel { label: label.to_string() })
    }

    /// Map a class id back to its label string
    pub fn decode(&self, id: usize) -> PipelineResult<&str> {
        self.labels
            .get(id)
            .map(String::as_str)
            .ok_or(PipelineError::ClassIdOutOfRange {
                id,
                num_classes: self.labels.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

// On-disk form mirrors the label2id / id2label pair of a model config.
#[derive(Serialize, Deserialize)]
struct VocabularyFile {
    label2id: BTreeMap<String, usize>,
    id2label: BTreeMap<usize, String>,
}

impl From<LabelVocabulary> for VocabularyFile {
    fn from(v: LabelVocabulary) -> Self {
        let label2id = v.labels.iter().cloned().zip(0..).collect();
        let id2label = (0..).zip(v.labels).collect();
        Self { label2id, id2label }
    }
}

impl TryFrom<VocabularyFile> for LabelVocabulary {
    type Error = String;

    fn try_from(f: VocabularyFile) -> Result<Self, Self::Error> {
        let labels: Vec<String> = f.id2label.into_values().collect();
        let vocab = LabelVocabulary::fit(&labels);
        if vocab.labels != labels {
            return Err("id2label must list distinct labels in sorted order".into());
        }
        for (label, id) in &f.label2id {
            if vocab.labels.get(*id) != Some(label) {
                return Err(format!("label2id entry '{label}' -> {id} disagrees with id2label"));
            }
        }
        Ok(vocab)
    }
}
