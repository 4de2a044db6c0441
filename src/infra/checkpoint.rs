// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores encoder weights using Burn's CompactRecorder.
//
// File layout:
//   checkpoints/
//     encoder_epoch_1.mpk      ← weights after epoch 1
//     encoder_epoch_2.mpk
//     ...
//     latest_epoch.json        ← number of the latest epoch
//     model_config.json        ← MvrConfig (rebuilds the encoder shape)
//     train_config.json        ← the run's TrainConfig
//     tokenizer.json           ← written by TokenizerStore
//
// The record is type-checked on load, so the model config must be
// read first to rebuild an encoder of the same shape.

use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::config::MvrConfig;
use crate::ml::model::MvrModel;

const LATEST_EPOCH: &str = "latest_epoch.json";
const MODEL_CONFIG: &str = "model_config.json";
const TRAIN_CONFIG: &str = "train_config.json";

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory when missing.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Save encoder weights for `epoch` and point latest_epoch.json at them.
    pub fn save_model<B: Backend>(&self, model: &MvrModel<B>, epoch: usize) -> Result<()> {
        let path = self.dir.join(format!("encoder_epoch_{epoch}"));
        CompactRecorder::new()
            .record(model.encoder.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_EPOCH);
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write '{}'", latest_path.display()))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Rebuild the model from model_config.json and the latest weights.
    pub fn load_model<B: Backend>(&self, device: &B::Device) -> Result<MvrModel<B>> {
        let config = self.load_model_config()?;
        let epoch = self.latest_epoch()?;
        let path = self.dir.join(format!("encoder_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;

        let encoder = config.init_encoder::<B>(device).load_record(record);
        Ok(MvrModel::new(config, encoder)?)
    }

    pub fn save_model_config(&self, config: &MvrConfig) -> Result<()> {
        let path = self.dir.join(MODEL_CONFIG);
        config
            .save(&path)
            .with_context(|| format!("Cannot write model config to '{}'", path.display()))?;
        tracing::debug!("Saved model config to '{}'", path.display());
        Ok(())
    }

    pub fn load_model_config(&self) -> Result<MvrConfig> {
        let path = self.dir.join(MODEL_CONFIG);
        MvrConfig::load(&path).map_err(|e| {
            anyhow::anyhow!("Cannot read model config from '{}': {e}", path.display())
        })
    }

    pub fn save_train_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join(TRAIN_CONFIG);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_train_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(TRAIN_CONFIG);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'rerank'.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_EPOCH);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{}'. Have you run 'train' first?", path.display()))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    fn config() -> MvrConfig {
        MvrConfig::new()
            .with_vocab_size(16)
            .with_hidden_size(4)
            .with_embedding_dim(4)
            .with_max_position_embeddings(8)
    }

    #[test]
    fn test_model_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path().join("ckpt")).unwrap();
        let device = Default::default();

        let model = MvrModel::<TestBackend>::init(config(), &device).unwrap();
        manager.save_model_config(model.config()).unwrap();
        manager.save_model(&model, 1).unwrap();
        manager.save_model(&model, 2).unwrap();

        let loaded = manager.load_model::<TestBackend>(&device).unwrap();
        assert_eq!(loaded.config().vocab_size, 16);

        let before = model.encoder.projection.weight.val().into_data().to_vec::<f32>().unwrap();
        let after = loaded.encoder.projection.weight.val().into_data().to_vec::<f32>().unwrap();
        // CompactRecorder stores half precision
        assert_eq!(before.len(), after.len());
        assert!(before.iter().zip(&after).all(|(b, a)| (b - a).abs() < 1e-2));
    }

    #[test]
    fn test_loading_without_training_fails() {
        let dir = TempDir::new().unwrap();
        let manager = CheckpointManager::new(dir.path()).unwrap();
        manager.save_model_config(&config()).unwrap();
        assert!(manager.load_model::<TestBackend>(&Default::default()).is_err());
    }
}
