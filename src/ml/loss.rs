// ============================================================
// Layer 5 — Masked Sequence Loss
// ============================================================
// Combines per-token cross-entropies into one scalar:
//
//   w_i  = 0 if label_i == PAD_ID else 1
//   loss = Σ loss_i * w_i / Σ w_i
//
// Padding contributes neither loss nor normalisation mass.
// A batch with no real labels has loss exactly 0.

use burn::prelude::*;

use crate::domain::tokens::PAD_ID;

/// 1.0 for real labels, 0.0 for padding.
pub fn label_weights(labels: &[u32]) -> Vec<f32> {
    labels
        .iter()
        .map(|&y| if y == PAD_ID { 0.0 } else { 1.0 })
        .collect()
}

/// per_token: [N] losses aligned with `labels` → [1] mean over non-padding.
pub fn sequence_loss<B: Backend>(per_token: Tensor<B, 1>, labels: &[u32]) -> Tensor<B, 1> {
    let weights = label_weights(labels);
    let mass: f32 = weights.iter().sum();
    let weights = Tensor::<B, 1>::from_floats(weights.as_slice(), &per_token.device());
    // With zero mass every weighted term is already zero
    (per_token * weights).sum().div_scalar(mass.max(1.0))
}

pub fn perplexity(loss: f64) -> f64 {
    loss.exp()
}
