// ============================================================
// Layer 5 — RNN Encoder
// ============================================================
// Unrolls the embedding cell over exactly `seq_len` steps:
//
//   state_0 = zeros
//   (out_t, state_t+1) = cell(ids_t, state_t)
//
// The same weights serve every step. The final state is the
// only thing the decoder receives; per-step outputs are kept
// for callers that want them.

use burn::prelude::*;

use crate::ml::cell::{EmbeddingCell, EmbeddingCellConfig, StackedState};

pub struct EncoderOutput<B: Backend> {
    /// One [batch, cell_size] output per step
    pub outputs: Vec<Tensor<B, 2>>,
    pub state:   StackedState<B>,
}

#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    cell: EmbeddingCell<B>,
}

impl<B: Backend> Encoder<B> {
    pub fn new(config: &EmbeddingCellConfig, device: &B::Device) -> Self {
        Self { cell: config.init(device) }
    }

    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> StackedState<B> {
        self.cell.zero_state(batch_size, device)
    }

    /// steps: one [batch] id vector per time step
    pub fn forward(&self, steps: Vec<Tensor<B, 1, Int>>, initial: StackedState<B>) -> EncoderOutput<B> {
        let mut state = initial;
        let mut outputs = Vec::with_capacity(steps.len());
        for ids in steps {
            let (output, next) = self.cell.forward(ids, state);
            outputs.push(output);
            state = next;
        }
        EncoderOutput { outputs, state }
    }
}
