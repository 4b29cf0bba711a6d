// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's CompactRecorder,
// plus the JSON side files needed to rebuild the model later.
//
// File layout of an output directory:
//   model/xlsr_autism_stories/
//     checkpoint-10.mpk.gz     ← weights after optimizer step 10
//     checkpoint-20.mpk.gz     ← weights after optimizer step 20
//     latest_checkpoint.json   ← step of the newest checkpoint
//     train_config.json        ← run configuration (model sizes etc.)
//     label_vocabulary.json    ← label2id / id2label
//     metrics.csv              ← evaluation log (see metrics.rs)
//
// Only the newest `save_total_limit` checkpoints are kept; older
// ones are deleted after each save.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::domain::label::LabelVocabulary;
use crate::ml::model::SpeechClassifier;

const CHECKPOINT_PREFIX: &str = "checkpoint-";
const CHECKPOINT_EXT:    &str = ".mpk.gz";
const LATEST_FILE:       &str = "latest_checkpoint.json";
const CONFIG_FILE:       &str = "train_config.json";
const VOCABULARY_FILE:   &str = "label_vocabulary.json";

/// Manages saving and loading of model checkpoints.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create the manager, creating the directory like `mkdir -p`.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create output directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing output directory without creating anything.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        anyhow::ensure!(
            dir.is_dir(),
            "Output directory '{}' does not exist. Have you run 'train' first?",
            dir.display()
        );
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn checkpoint_path(&self, step: usize) -> PathBuf {
        // The recorder appends the extension itself
        self.dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Save model weights for an optimizer step and make it the latest.
    pub fn save_model<B: Backend>(&self, model: &SpeechClassifier<B>, step: usize) -> Result<()> {
        let path = self.checkpoint_path(step);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        fs::write(self.dir.join(LATEST_FILE), serde_json::to_string(&step)?)
            .with_context(|| format!("Failed to write {LATEST_FILE}"))?;

        tracing::debug!("Saved checkpoint: step {}", step);
        Ok(())
    }

    /// Steps of all checkpoints on disk, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<usize>> {
        let mut steps: Vec<usize> = fs::read_dir(&self.dir)
            .with_context(|| format!("Cannot read directory '{}'", self.dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                name.strip_prefix(CHECKPOINT_PREFIX)?
                    .strip_suffix(CHECKPOINT_EXT)?
                    .parse()
                    .ok()
            })
            .collect();
        steps.sort_unstable();
        Ok(steps)
    }

    /// Delete the oldest checkpoints so at most `keep` remain.
    /// Returns the deleted steps.
    pub fn rotate(&self, keep: usize) -> Result<Vec<usize>> {
        let steps  = self.list_checkpoints()?;
        let excess = steps.len().saturating_sub(keep.max(1));
        let removed: Vec<usize> = steps.into_iter().take(excess).collect();

        for step in &removed {
            let path = self.dir.join(format!("{CHECKPOINT_PREFIX}{step}{CHECKPOINT_EXT}"));
            fs::remove_file(&path)
                .with_context(|| format!("Cannot delete old checkpoint '{}'", path.display()))?;
            tracing::debug!("Deleted checkpoint: step {}", step);
        }
        Ok(removed)
    }

    /// Load weights from the latest checkpoint into `model`.
    pub fn load_model<B: Backend>(
        &self,
        model:  SpeechClassifier<B>,
        device: &B::Device,
    ) -> Result<SpeechClassifier<B>> {
        let step = self.latest_step()?;
        tracing::info!("Loading checkpoint from step {}", step);
        load_weights(self.checkpoint_path(step), model, device)
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.write_json(CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        self.read_json(CONFIG_FILE)
    }

    pub fn save_vocabulary(&self, vocabulary: &LabelVocabulary) -> Result<()> {
        self.write_json(VOCABULARY_FILE, vocabulary)
    }

    pub fn load_vocabulary(&self) -> Result<LabelVocabulary> {
        self.read_json(VOCABULARY_FILE)
    }

    fn latest_step(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }

    fn write_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(name);
        fs::write(&path, serde_json::to_string_pretty(value)?)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = self.dir.join(name);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read '{}'. Have you run 'train' first?", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Invalid JSON in '{}'", path.display()))
    }
}

/// Load a weight record from `path` (without extension) into `model`.
/// Also used for the initial weights of a run.
pub fn load_weights<B: Backend>(
    path:   impl Into<PathBuf>,
    model:  SpeechClassifier<B>,
    device: &B::Device,
) -> Result<SpeechClassifier<B>> {
    let path = path.into();
    let record = CompactRecorder::new()
        .load(path.clone(), device)
        .with_context(|| {
            format!("Cannot load weights '{}'. Does the architecture match?", path.display())
        })?;
    Ok(model.load_record(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, step: usize) {
        fs::write(dir.join(format!("checkpoint-{step}.mpk.gz")), b"").unwrap();
    }

    #[test]
    fn test_rotation_keeps_newest() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(tmp.path()).unwrap();
        for step in [10, 20, 30, 40] {
            touch(tmp.path(), step);
        }
        fs::write(tmp.path().join("metrics.csv"), b"").unwrap();

        let removed = mgr.rotate(2).unwrap();
        assert_eq!(removed, vec![10, 20]);
        assert_eq!(mgr.list_checkpoints().unwrap(), vec![30, 40]);
    }

    #[test]
    fn test_steps_sort_numerically() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(tmp.path()).unwrap();
        for step in [100, 9, 20] {
            touch(tmp.path(), step);
        }
        assert_eq!(mgr.list_checkpoints().unwrap(), vec![9, 20, 100]);
    }

    #[test]
    fn test_vocabulary_roundtrip() {
        let tmp   = tempfile::tempdir().unwrap();
        let mgr   = CheckpointManager::new(tmp.path()).unwrap();
        let vocab = LabelVocabulary::fit(["TD", "ASD"]);
        mgr.save_vocabulary(&vocab).unwrap();
        assert_eq!(mgr.load_vocabulary().unwrap(), vocab);
    }

    #[test]
    fn test_open_requires_existing_dir() {
        assert!(CheckpointManager::open("/nonexistent/run").is_err());
    }

    #[test]
    fn test_missing_latest_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        let mgr = CheckpointManager::new(tmp.path()).unwrap();
        assert!(mgr.latest_step().is_err());
    }
}
