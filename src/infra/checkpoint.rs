// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights using Burn's named MessagePack
// recorder at full precision, so restored weights are bit-exact.
//
// What gets saved:
//   1. Model weights (.mpk.gz) — one file per epoch
//   2. latest_epoch.json       — which epoch was last saved
//   3. run_config.json         — the RunConfig of the training run
//
// The run config carries the Seq2SeqConfig, which is all the
// inferencer needs to rebuild a model with the same shapes
// before the weights are loaded into it. It also fixes the
// batch_size / seq_len a predict request has to match.
//
// File layout:
//   checkpoints/
//     model_epoch_1.mpk.gz
//     model_epoch_2.mpk.gz
//     latest_epoch.json
//     run_config.json
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkGzFileRecorder, Recorder},
};

use crate::application::train_use_case::RunConfig;
use crate::ml::model::Seq2SeqModel;

const LATEST_EPOCH_FILE: &str = "latest_epoch.json";
const RUN_CONFIG_FILE: &str = "run_config.json";

type WeightRecorder = NamedMpkGzFileRecorder<FullPrecisionSettings>;

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory (like `mkdir -p`) if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Writes {dir}/model_epoch_{epoch}.mpk.gz and moves the
    /// latest-epoch pointer to it.
    pub fn save_model<B: Backend>(&self, model: &Seq2SeqModel<B>, epoch: usize) -> Result<()> {
        // Recorder appends the extension itself
        let path = self.dir.join(format!("model_epoch_{epoch}"));
        WeightRecorder::default()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_EPOCH_FILE);
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| format!("Failed to write {LATEST_EPOCH_FILE}"))?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Restore the latest weights into `model`.
    ///
    /// `model` must have been built from the saved config or the
    /// record will not fit.
    pub fn load_model<B: Backend>(
        &self,
        model:  Seq2SeqModel<B>,
        device: &B::Device,
    ) -> Result<Seq2SeqModel<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));
        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = WeightRecorder::default()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Have you trained the model first?", path.display())
            })?;
        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &RunConfig) -> Result<()> {
        let path = self.dir.join(RUN_CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved run config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<RunConfig> {
        let path = self.dir.join(RUN_CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' before 'predict'.",
                path.display()
            )
        })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed run config '{}'", path.display()))
    }

    /// Errors if nothing has been saved yet.
    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join(LATEST_EPOCH_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("Cannot find '{LATEST_EPOCH_FILE}'. Have you run 'train' first?"))?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::Seq2SeqConfig;
    use crate::ml::params::flat_values;
    use burn::backend::NdArray;

    type B = NdArray;

    fn run_config(dir: &std::path::Path) -> RunConfig {
        RunConfig {
            data_path:      dir.join("pairs.tsv"),
            checkpoint_dir: dir.to_path_buf(),
            log_dir:        dir.join("logs"),
            model:          Seq2SeqConfig::new(6, 1, 2, 4, 10, 3, 0.5),
            ..RunConfig::default()
        }
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.load_config().is_err());
    }

    #[test]
    fn test_config_survives_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        let cfg = run_config(tmp.path());
        ckpt.save_config(&cfg).unwrap();
        let loaded = ckpt.load_config().unwrap();
        assert_eq!(loaded.model.cell_size, 6);
        assert_eq!(loaded.model.seq_len, 4);
        assert_eq!(loaded.epochs, cfg.epochs);
    }

    #[test]
    fn test_weights_restore_into_fresh_model() {
        let tmp = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        let device = Default::default();
        let cfg = Seq2SeqConfig::new(6, 1, 2, 4, 10, 3, 0.5);

        let trained = cfg.init::<B>(&device).unwrap();
        ckpt.save_model(&trained, 1).unwrap();
        ckpt.save_model(&trained, 2).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), 2);

        let fresh = cfg.init::<B>(&device).unwrap();
        assert_ne!(flat_values(&fresh), flat_values(&trained));
        let restored = ckpt.load_model(fresh, &device).unwrap();
        assert_eq!(flat_values(&restored), flat_values(&trained));
    }
}
