// ============================================================
// Layer 5 — Output Projection and Softmax Losses
// ============================================================
// One weight/bias pair maps a decoder hidden vector to
// vocabulary logits:
//
//   logits = hidden · Wᵀ + b        W: [vocab, cell]  b: [vocab]
//
// The same pair is used for
//   - greedy feedback during autoregressive decoding
//   - final argmax at inference
//   - the training loss
//
// Training never builds the full [N, vocab] logit matrix when
// the vocabulary is larger than the sample: the true class is
// scored against a shared set of sampled negatives.
//
//   true logit    = h · W[y] + b[y] - ln E[y]
//   sampled logit = h · W[s] + b[s] - ln E[s]   (masked if s == y)
//   loss          = -log_softmax([true, sampled...])[0]
//
// Everything on the loss path is f32.
//
// Reference: Jean et al. (2015), Bengio & Senécal (2008)

use burn::{
    module::Param,
    nn::Initializer,
    prelude::*,
    tensor::{activation::log_softmax, TensorData},
};

use crate::ml::sampler::{CandidateSample, CandidateSampler};

/// Logit given to a sampled id that happens to be the label,
/// so it cannot compete with itself.
const ACCIDENTAL_HIT_LOGIT: f32 = -1.0e9;

#[derive(Config, Debug)]
pub struct OutputProjectionConfig {
    pub vocab_size: usize,
    pub cell_size:  usize,
}

impl OutputProjectionConfig {
    /// Glorot-uniform weight, zero bias.
    pub fn init<B: Backend>(&self, device: &B::Device) -> OutputProjection<B> {
        let bound = (6.0 / (self.vocab_size + self.cell_size) as f64).sqrt();
        let weight = Initializer::Uniform { min: -bound, max: bound }
            .init([self.vocab_size, self.cell_size], device);
        let bias = Initializer::Zeros.init([self.vocab_size], device);
        OutputProjection { weight, bias }
    }
}

#[derive(Module, Debug)]
pub struct OutputProjection<B: Backend> {
    /// [vocab_size, cell_size]
    weight: Param<Tensor<B, 2>>,
    /// [vocab_size]
    bias:   Param<Tensor<B, 1>>,
}

impl<B: Backend> OutputProjection<B> {
    pub fn device(&self) -> B::Device {
        self.weight.device()
    }

    /// hidden: [N, cell] → logits [N, vocab]
    pub fn logits(&self, hidden: Tensor<B, 2>) -> Tensor<B, 2> {
        hidden.matmul(self.weight.val().transpose()) + self.bias.val().unsqueeze::<2>()
    }

    /// Greedy next token: hidden [N, cell] → ids [N]
    pub fn greedy(&self, hidden: Tensor<B, 2>) -> Tensor<B, 1, Int> {
        let [n, _] = hidden.dims();
        self.logits(hidden).argmax(1).reshape([n])
    }

    /// Per-example cross-entropy. Uses the sampled estimator unless the
    /// sample would cover the vocabulary.
    pub fn loss(&self, hidden: Tensor<B, 2>, labels: &[u32], sampler: &mut CandidateSampler) -> Tensor<B, 1> {
        if sampler.covers_vocabulary() {
            self.full_softmax_loss(hidden, labels)
        } else {
            let sample = sampler.sample();
            self.sampled_softmax_loss(hidden, labels, &sample)
        }
    }

    /// Exact per-example cross-entropy over the whole vocabulary.
    pub fn full_softmax_loss(&self, hidden: Tensor<B, 2>, labels: &[u32]) -> Tensor<B, 1> {
        let device = hidden.device();
        let n = labels.len();
        let targets = ids_tensor::<B>(labels, &device).reshape([n, 1]);
        log_softmax(self.logits(hidden), 1)
            .gather(1, targets)
            .reshape([n])
            .neg()
    }

    /// Sampled-softmax per-example cross-entropy, hidden [N, cell], N labels.
    pub fn sampled_softmax_loss(
        &self,
        hidden: Tensor<B, 2>,
        labels: &[u32],
        sample: &CandidateSample,
    ) -> Tensor<B, 1> {
        let device = hidden.device();
        let n = labels.len();
        let s = sample.ids().len();
        let weight = self.weight.val();
        let bias = self.bias.val();

        // ── True class ────────────────────────────────────────────────────────
        let label_ids = ids_tensor::<B>(labels, &device);
        let true_w = weight.clone().select(0, label_ids.clone()); // [N, cell]
        let true_b = bias.clone().select(0, label_ids);          // [N]
        let true_log_q: Vec<f32> = labels.iter().map(|&y| sample.log_expected_count(y)).collect();
        let true_log_q = Tensor::<B, 1>::from_floats(true_log_q.as_slice(), &device);
        let true_logits = (hidden.clone() * true_w).sum_dim(1) // [N, 1]
            + (true_b - true_log_q).unsqueeze_dim::<2>(1);

        // ── Sampled negatives ─────────────────────────────────────────────────
        let sampled_ids = ids_tensor::<B>(sample.ids(), &device);
        let sampled_w = weight.select(0, sampled_ids.clone()); // [S, cell]
        let sampled_b = bias.select(0, sampled_ids);          // [S]
        let sampled_log_q = Tensor::<B, 1>::from_floats(sample.log_expected_counts().as_slice(), &device);
        let sampled_logits = hidden.matmul(sampled_w.transpose()) // [N, S]
            + (sampled_b - sampled_log_q).unsqueeze::<2>();

        let hits: Vec<bool> = labels
            .iter()
            .flat_map(|&y| sample.ids().iter().map(move |&c| c == y))
            .collect();
        let hit_mask = Tensor::<B, 2, Bool>::from_data(TensorData::new(hits, [n, s]), &device);
        let sampled_logits = sampled_logits.mask_fill(hit_mask, ACCIDENTAL_HIT_LOGIT);

        // The true class sits at column 0
        let logits = Tensor::cat(vec![true_logits, sampled_logits], 1);
        log_softmax(logits, 1).narrow(1, 0, 1).reshape([n]).neg()
    }
}

/// Host ids → [len] Int tensor.
pub(crate) fn ids_tensor<B: Backend>(ids: &[u32], device: &B::Device) -> Tensor<B, 1, Int> {
    let ids: Vec<i32> = ids.iter().map(|&x| x as i32).collect();
    Tensor::<B, 1, Int>::from_ints(ids.as_slice(), device)
}
