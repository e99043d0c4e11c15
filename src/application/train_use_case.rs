// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load token pairs           (Layer 4 - data)
//   Step 2: Check ids against vocab    (Layer 3 - domain)
//   Step 3: Split train/validation     (Layer 4 - data)
//   Step 4: Pad into fixed batches     (Layer 4 - data)
//   Step 5: Save run config            (Layer 6 - infra)
//   Step 6: Open metric sink           (Layer 6 - infra)
//   Step 7: Run training loop          (Layer 5 - ml)
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::data::{batcher::PairBatcher, loader::PairLoader, splitter::split_train_val};
use crate::domain::pair::TokenPair;
use crate::domain::traits::PairSource;
use crate::infra::{checkpoint::CheckpointManager, metrics::CsvMetricSink};
use crate::ml::model::Seq2SeqConfig;
use crate::ml::trainer::{run_training, TrainSummary};

/// Which Burn backend runs the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// NdArray on the CPU
    #[default]
    Cpu,
    /// WGPU on the default adapter
    Gpu,
}

// ─── Run Configuration ────────────────────────────────────────────────────────
// Everything a training run needs. Saved next to the checkpoints
// so `predict` can rebuild exactly the same model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub data_path:      PathBuf,
    pub checkpoint_dir: PathBuf,
    pub log_dir:        PathBuf,
    pub epochs:         usize,
    /// Share of pairs held out for validation
    pub val_fraction:   f64,
    pub backend:        BackendKind,
    pub model:          Seq2SeqConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data_path:      PathBuf::from("data/pairs.tsv"),
            checkpoint_dir: PathBuf::from("checkpoints"),
            log_dir:        PathBuf::from("logs"),
            epochs:         10,
            val_fraction:   0.1,
            backend:        BackendKind::Cpu,
            model:          Seq2SeqConfig::new(256, 2, 32, 20, 10_000, 128, 0.5),
        }
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: RunConfig,
}

impl TrainUseCase {
    pub fn new(config: RunConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;
        let model = &cfg.model;
        model.validate()?;

        // ── Step 1: Load pairs ────────────────────────────────────────────────
        tracing::info!("Loading pairs from '{}'", cfg.data_path.display());
        let pairs = PairLoader::new(&cfg.data_path).load_all()?;
        if pairs.is_empty() {
            bail!("No training pairs found in '{}'", cfg.data_path.display());
        }

        // ── Step 2: Vocabulary check ──────────────────────────────────────────
        check_vocabulary(&pairs, model.vocab_size)?;

        // ── Step 3: Train / validation split ──────────────────────────────────
        let (train_pairs, val_pairs) = split_train_val(pairs, 1.0 - cfg.val_fraction, model.seed);
        tracing::info!("Split: {} train, {} validation", train_pairs.len(), val_pairs.len());

        // ── Step 4: Fixed-shape batches ───────────────────────────────────────
        // Validation filler rows only carry PAD labels, so they add no loss
        let batcher = PairBatcher::new(model.batch_size, model.seq_len);
        let train = batcher.batches(&train_pairs, false)?;
        let val   = batcher.batches(&val_pairs, true)?;
        if train.is_empty() {
            bail!(
                "Need at least batch_size ({}) training pairs, got {}",
                model.batch_size,
                train_pairs.len()
            );
        }
        tracing::info!("{} training batches, {} validation batches", train.len(), val.len());

        // ── Step 5: Save config for inference ─────────────────────────────────
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(cfg)?;

        // ── Step 6: Metric sink ───────────────────────────────────────────────
        let sink = CsvMetricSink::create(&cfg.log_dir)?;

        // ── Step 7: Training loop (Layer 5) ───────────────────────────────────
        let summary = run_training(cfg, train, val, ckpt_manager, Box::new(sink))?;
        tracing::info!(
            "Finished {} epochs, {} steps, final lr {:.6}",
            summary.epochs, summary.global_steps, summary.final_learning_rate
        );
        Ok(summary)
    }
}

fn check_vocabulary(pairs: &[TokenPair], vocab_size: usize) -> Result<()> {
    if let Some((idx, id)) = pairs
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.max_id().map(|id| (i, id)))
        .find(|&(_, id)| id as usize >= vocab_size)
    {
        bail!("Pair {} contains id {} outside vocabulary of size {}", idx + 1, id, vocab_size);
    }
    Ok(())
}
