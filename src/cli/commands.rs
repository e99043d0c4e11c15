// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands, `train` and `predict`, and
// their flags. Model hyperparameters map one-to-one onto
// Seq2SeqConfig; the defaults here are the defaults a fresh
// run starts from.
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::application::train_use_case::{BackendKind, RunConfig};
use crate::ml::model::Seq2SeqConfig;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a seq2seq model on a file of token id pairs
    Train(TrainArgs),

    /// Greedily decode source sequences with a trained checkpoint
    Predict(PredictArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum BackendArg {
    /// NdArray (CPU)
    Cpu,
    /// WGPU (GPU)
    Gpu,
}

impl From<BackendArg> for BackendKind {
    fn from(a: BackendArg) -> Self {
        match a {
            BackendArg::Cpu => BackendKind::Cpu,
            BackendArg::Gpu => BackendKind::Gpu,
        }
    }
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Pair file: "<source ids>\t<target ids>" per line
    #[arg(long, default_value = "data/pairs.tsv")]
    pub data: PathBuf,

    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    /// Metric CSVs go to <log_dir>/train and <log_dir>/test
    #[arg(long, default_value = "logs")]
    pub log_dir: PathBuf,

    #[arg(long, default_value_t = 10)]
    pub epochs: usize,

    /// Share of pairs held out for validation
    #[arg(long, default_value_t = 0.1)]
    pub val_fraction: f64,

    #[arg(long, value_enum, default_value_t = BackendArg::Cpu)]
    pub backend: BackendArg,

    /// Width of each LSTM layer
    #[arg(long, default_value_t = 256)]
    pub cell_size: usize,

    /// Number of stacked LSTM layers
    #[arg(long, default_value_t = 2)]
    pub stack_size: usize,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    /// Fixed encoder / decoder length (longer pairs are truncated)
    #[arg(long, default_value_t = 20)]
    pub seq_len: usize,

    #[arg(long, default_value_t = 10_000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 128)]
    pub embedding_size: usize,

    #[arg(long, default_value_t = 0.5)]
    pub learning_rate: f64,

    /// Multiplier applied when validation loss stops improving
    #[arg(long, default_value_t = 0.9)]
    pub learning_rate_decaying_factor: f64,

    /// Global gradient norm clipping threshold
    #[arg(long, default_value_t = 5.0)]
    pub max_gradient_norm: f64,

    /// Negative samples for the sampled softmax
    #[arg(long, default_value_t = 512)]
    pub num_sampled: usize,

    /// Record loss / perplexity every N steps
    #[arg(long, default_value_t = 100)]
    pub summary_every: u64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

/// The application layer never sees clap types.
impl From<TrainArgs> for RunConfig {
    fn from(a: TrainArgs) -> Self {
        let model = Seq2SeqConfig::new(
            a.cell_size,
            a.stack_size,
            a.batch_size,
            a.seq_len,
            a.vocab_size,
            a.embedding_size,
            a.learning_rate,
        )
        .with_learning_rate_decaying_factor(a.learning_rate_decaying_factor)
        .with_max_gradient_norm(a.max_gradient_norm)
        .with_num_sampled(a.num_sampled)
        .with_summary_every(a.summary_every)
        .with_seed(a.seed);

        RunConfig {
            data_path:      a.data,
            checkpoint_dir: a.checkpoint_dir,
            log_dir:        a.log_dir,
            epochs:         a.epochs,
            val_fraction:   a.val_fraction,
            backend:        a.backend.into(),
            model,
        }
    }
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Source ids, one sequence per line (text after a tab is ignored)
    #[arg(long)]
    pub input: PathBuf,

    /// Directory where checkpoints were saved during training
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = BackendArg::Cpu)]
    pub backend: BackendArg,
}
