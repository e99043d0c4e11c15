// ============================================================
// Layer 2 — PredictUseCase
// ============================================================
// Loads the latest checkpoint and greedily decodes a list of
// source sequences:
//
//   1. Rebuild the model from run_config.json + weights
//   2. Pad sources into [batch_size, seq_len] batches
//      (the last batch is topped up with filler rows)
//   3. Decode every batch, keep only the real rows
//   4. Cut each prediction at its first PAD id
//
// The decoder matrix only needs its BOS column; the batcher
// fills the rest with PAD.

use anyhow::{Context, Result};
use burn::prelude::Backend;
use std::{fs, path::{Path, PathBuf}};

use crate::application::train_use_case::BackendKind;
use crate::data::batcher::PairBatcher;
use crate::data::loader::parse_ids;
use crate::domain::pair::TokenPair;
use crate::domain::tokens::PAD_ID;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::inferencer::Seq2SeqInferencer;
use crate::ml::{CpuBackend, GpuBackend};

pub struct PredictUseCase {
    checkpoint_dir: PathBuf,
    backend:        BackendKind,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: impl Into<PathBuf>, backend: BackendKind) -> Self {
        Self { checkpoint_dir: checkpoint_dir.into(), backend }
    }

    /// One prediction per source, in input order.
    pub fn execute(&self, sources: &[Vec<u32>]) -> Result<Vec<Vec<u32>>> {
        let ckpt = CheckpointManager::new(&self.checkpoint_dir)?;
        match self.backend {
            BackendKind::Cpu => predict_with::<CpuBackend>(&ckpt, &Default::default(), sources),
            BackendKind::Gpu => {
                let device = burn::backend::wgpu::WgpuDevice::default();
                predict_with::<GpuBackend>(&ckpt, &device, sources)
            }
        }
    }
}

fn predict_with<B: Backend>(
    ckpt:    &CheckpointManager,
    device:  &B::Device,
    sources: &[Vec<u32>],
) -> Result<Vec<Vec<u32>>> {
    let inferencer = Seq2SeqInferencer::<B>::from_checkpoint(ckpt, device)?;
    let model = inferencer.model();
    let batcher = PairBatcher::new(model.batch_size(), model.seq_len());

    let pairs: Vec<TokenPair> = sources
        .iter()
        .map(|s| TokenPair::new(s.clone(), Vec::new()))
        .collect();

    let mut predictions = Vec::with_capacity(sources.len());
    for batch in batcher.batches(&pairs, true)? {
        let decoded = inferencer.predict(&batch.encoder, &batch.decoder)?;
        predictions.extend(decoded.rows().take(batch.real_rows).map(until_pad));
    }
    tracing::info!("Predicted {} sequences", predictions.len());
    Ok(predictions)
}

fn until_pad(row: &[u32]) -> Vec<u32> {
    row.iter().copied().take_while(|&id| id != PAD_ID).collect()
}

/// One source per non-blank, non-comment line. Anything after a
/// tab is ignored, so a training pair file also works as input.
pub fn read_sources(path: &Path) -> Result<Vec<Vec<u32>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Cannot read '{}'", path.display()))?;
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .map(|(idx, line)| {
            let source = line.split('\t').next().unwrap_or_default();
            parse_ids(source).with_context(|| format!("line {} of '{}'", idx + 1, path.display()))
        })
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::model::Seq2SeqConfig;
    use crate::application::train_use_case::RunConfig;

    #[test]
    fn test_until_pad_cuts_at_first_pad() {
        assert_eq!(until_pad(&[4, 5, PAD_ID, 6]), vec![4, 5]);
        assert!(until_pad(&[PAD_ID, 3]).is_empty());
    }

    #[test]
    fn test_read_sources_ignores_targets_and_comments() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("in.tsv");
        fs::write(&path, "# sources\n3 4 5\t9 9\n\n7\n").unwrap();
        assert_eq!(read_sources(&path).unwrap(), vec![vec![3, 4, 5], vec![7]]);
    }

    #[test]
    fn test_predict_without_checkpoint_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let use_case = PredictUseCase::new(tmp.path(), BackendKind::Cpu);
        assert!(use_case.execute(&[vec![2, 3]]).is_err());
    }

    #[test]
    fn test_predicts_one_row_per_source() {
        let tmp = tempfile::tempdir().unwrap();
        let model_cfg = Seq2SeqConfig::new(6, 1, 2, 4, 10, 3, 0.5);
        let ckpt = CheckpointManager::new(tmp.path()).unwrap();
        ckpt.save_config(&RunConfig { model: model_cfg.clone(), ..RunConfig::default() }).unwrap();
        let model = model_cfg.init::<CpuBackend>(&Default::default()).unwrap();
        ckpt.save_model(&model, 1).unwrap();

        let sources = vec![vec![2, 3], vec![4], vec![5, 6, 7, 8, 9]];
        let out = PredictUseCase::new(tmp.path(), BackendKind::Cpu).execute(&sources).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|row| row.len() <= 3 && row.iter().all(|&id| id < 10)));
    }
}
