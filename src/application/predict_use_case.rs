// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Classifies single recordings with the latest checkpoint of a
// training run. The model is loaded once; `predict` can be called
// for as many files as needed.

use std::path::Path;

use anyhow::Result;

use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::{Inferencer, Prediction};

pub struct PredictUseCase {
    inferencer: Inferencer,
}

impl PredictUseCase {
    pub fn new(output_dir: &str) -> Result<Self> {
        let ckpt       = CheckpointManager::open(output_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt)?;
        Ok(Self { inferencer })
    }

    pub fn predict(&self, file: &Path) -> Result<Prediction> {
        self.inferencer.predict(file)
    }
}
