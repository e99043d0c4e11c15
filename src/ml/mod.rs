// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All Burn-specific code lives here. Data loading and the use
// cases only ever hand this layer plain TokenMatrix batches.
//
// Bottom-up:
//
//   params.rs     — parameter walk, global gradient norm, clip scale
//   cell.rs       — LSTM cell, stacked cell, embedding wrapper
//   sampler.rs    — log-uniform candidate sampler
//   projection.rs — output projection, full and sampled softmax
//   loss.rs       — padding-masked sequence loss, perplexity
//   encoder.rs    — unrolled RNN encoder
//   decoder.rs    — teacher-forced / autoregressive RNN decoder
//   model.rs      — Seq2SeqConfig + Seq2SeqModel (graph builder)
//   trainer.rs    — training step controller and epoch loop
//   inferencer.rs — greedy decoding from a checkpoint
//
// Reference: Burn Book §3 (Building Blocks), §5 (Training)
//            Sutskever et al. (2014) Sequence to Sequence Learning
//            Jean et al. (2015) On Using Very Large Target Vocabulary

pub mod params;
pub mod cell;
pub mod sampler;
pub mod projection;
pub mod loss;
pub mod encoder;
pub mod decoder;
pub mod model;

/// Training step controller, LR decay and the epoch loop
pub mod trainer;

/// Inference controller: checkpoint in, token ids out
pub mod inferencer;

use burn::backend::{Autodiff, NdArray, Wgpu};

pub type CpuBackend = NdArray;
pub type GpuBackend = Wgpu;
pub type CpuTrainBackend = Autodiff<CpuBackend>;
pub type GpuTrainBackend = Autodiff<GpuBackend>;
