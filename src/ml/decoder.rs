// ============================================================
// Layer 5 — RNN Decoder
// ============================================================
// Starts from the encoder's final state and unrolls its own
// embedding cell for `seq_len` steps. What each step reads is
// chosen ONCE per call by `DecoderFeed`:
//
//   TeacherForcing — step t reads the ground-truth id t
//   Autoregressive — step 0 reads the BOS column, step t > 0
//                    reads argmax(projection(out_{t-1}))
//
// Only the chosen branch is computed. In autoregressive mode
// the greedy ids are returned as well so inference does not
// project every output twice.

use burn::prelude::*;

use crate::ml::cell::{EmbeddingCell, EmbeddingCellConfig, StackedState};
use crate::ml::projection::OutputProjection;

/// How decoder inputs are chosen for a whole unroll.
pub enum DecoderFeed<B: Backend> {
    /// One [batch] ground-truth id vector per step
    TeacherForcing { inputs: Vec<Tensor<B, 1, Int>> },
    /// BOS-led first column, then the model's own greedy ids
    Autoregressive { bos: Tensor<B, 1, Int>, steps: usize },
}

pub struct DecoderOutput<B: Backend> {
    /// One [batch, cell_size] output per step
    pub outputs:     Vec<Tensor<B, 2>>,
    pub state:       StackedState<B>,
    /// Greedy id after each step (autoregressive only)
    pub predictions: Vec<Tensor<B, 1, Int>>,
}

impl<B: Backend> DecoderOutput<B> {
    /// Step outputs followed by every state tensor.
    pub fn flatten(self) -> Vec<Tensor<B, 2>> {
        let mut flat = self.outputs;
        flat.extend(self.state.flatten());
        flat
    }
}

#[derive(Module, Debug)]
pub struct Decoder<B: Backend> {
    cell: EmbeddingCell<B>,
}

impl<B: Backend> Decoder<B> {
    pub fn new(config: &EmbeddingCellConfig, device: &B::Device) -> Self {
        Self { cell: config.init(device) }
    }

    pub fn forward(
        &self,
        encoder_state: StackedState<B>,
        feed:          DecoderFeed<B>,
        projection:    &OutputProjection<B>,
    ) -> DecoderOutput<B> {
        match feed {
            DecoderFeed::TeacherForcing { inputs } => self.teacher_forced(encoder_state, inputs),
            DecoderFeed::Autoregressive { bos, steps } => {
                self.autoregressive(encoder_state, bos, steps, projection)
            }
        }
    }

    fn teacher_forced(&self, initial: StackedState<B>, inputs: Vec<Tensor<B, 1, Int>>) -> DecoderOutput<B> {
        let mut state = initial;
        let mut outputs = Vec::with_capacity(inputs.len());
        for ids in inputs {
            let (output, next) = self.cell.forward(ids, state);
            outputs.push(output);
            state = next;
        }
        DecoderOutput { outputs, state, predictions: Vec::new() }
    }

    fn autoregressive(
        &self,
        initial:    StackedState<B>,
        bos:        Tensor<B, 1, Int>,
        steps:      usize,
        projection: &OutputProjection<B>,
    ) -> DecoderOutput<B> {
        let mut state = initial;
        let mut input = bos;
        let mut outputs = Vec::with_capacity(steps);
        let mut predictions = Vec::with_capacity(steps);
        for _ in 0..steps {
            let (output, next) = self.cell.forward(input, state);
            state = next;
            input = projection.greedy(output.clone());
            predictions.push(input.clone());
            outputs.push(output);
        }
        tracing::trace!("Autoregressive decode ran {} steps", steps);
        DecoderOutput { outputs, state, predictions }
    }
}
