// ============================================================
// Layer 3 — Domain Errors
// ============================================================
// Every failure the model core can report to its caller.
// Framework failures (Burn panics on device errors, OOM) are
// not wrapped here — they propagate unchanged.
//
// The application layers convert these into anyhow errors
// automatically through `?`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Seq2SeqError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{name} batch has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        name: &'static str,
        expected: [usize; 2],
        actual: [usize; 2],
    },

    #[error("Token matrix row {row} has {len} ids, expected {expected}")]
    RaggedRows { row: usize, len: usize, expected: usize },

    #[error("{name} batch contains token id {id} outside a vocabulary of {vocab_size}")]
    TokenOutOfRange {
        name: &'static str,
        id: u32,
        vocab_size: usize,
    },

    #[error("Loss became non-finite ({value}) at step {step}; training must stop")]
    NonFiniteLoss { step: u64, value: f64 },

    #[error("Gradient norm became non-finite ({norm}) at step {step}; update skipped")]
    NonFiniteGradient { step: u64, norm: f64 },

    #[error("Metric sink failed: {0}")]
    Sink(#[from] std::io::Error),
}

/// Result type for the model core
pub type Result<T> = std::result::Result<T, Seq2SeqError>;
