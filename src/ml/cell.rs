// ============================================================
// Layer 5 — Recurrent Cells
// ============================================================
// Three nested building blocks, innermost first:
//
//   LstmCell      — one long short-term memory layer
//   StackedCell   — `stack_size` LstmCells, output of layer k
//                   feeding the input of layer k+1
//   EmbeddingCell — token ids → embedding lookup → StackedCell
//
// One LSTM step (gates from a single affine map of the input
// concatenated with the previous hidden vector):
//
//   [i, j, f, o] = W · [x, h_prev] + b
//   c = c_prev * σ(f + forget_bias) + σ(i) * tanh(j)
//   h = tanh(c) * σ(o)
//
// Every layer of a StackedCell owns its own weights. Layers
// are never aliased to one shared cell.
//
// Reference: Hochreiter & Schmidhuber (1997) LSTM
//            Zaremba et al. (2014) Recurrent Neural Network Regularization

use burn::{
    nn::{Embedding, EmbeddingConfig, Linear, LinearConfig},
    prelude::*,
    tensor::activation::sigmoid,
};


/// Added to the forget gate pre-activation so fresh cells
/// start out remembering.
const FORGET_BIAS: f64 = 1.0;

// ─── State ────────────────────────────────────────────────────────────────────
/// (hidden, memory) pair of one layer, each [batch, cell_size].
#[derive(Debug, Clone)]
pub struct LstmState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub memory: Tensor<B, 2>,
}

impl<B: Backend> LstmState<B> {
    pub fn zeros(batch_size: usize, cell_size: usize, device: &B::Device) -> Self {
        Self {
            hidden: Tensor::zeros([batch_size, cell_size], device),
            memory: Tensor::zeros([batch_size, cell_size], device),
        }
    }
}

/// Per-layer states of a StackedCell, bottom layer first.
#[derive(Debug, Clone)]
pub struct StackedState<B: Backend> {
    pub layers: Vec<LstmState<B>>,
}

impl<B: Backend> StackedState<B> {
    pub fn zeros(stack_size: usize, batch_size: usize, cell_size: usize, device: &B::Device) -> Self {
        let layers = (0..stack_size)
            .map(|_| LstmState::zeros(batch_size, cell_size, device))
            .collect();
        Self { layers }
    }

    /// Flat list [memory_0, hidden_0, memory_1, hidden_1, ...].
    pub fn flatten(self) -> Vec<Tensor<B, 2>> {
        self.layers
            .into_iter()
            .flat_map(|s| [s.memory, s.hidden])
            .collect()
    }
}

// ─── LstmCell ─────────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct LstmCell<B: Backend> {
    /// [input_size + cell_size] → [4 * cell_size]
    gates:     Linear<B>,
    cell_size: usize,
}

impl<B: Backend> LstmCell<B> {
    pub fn new(input_size: usize, cell_size: usize, device: &B::Device) -> Self {
        let gates = LinearConfig::new(input_size + cell_size, 4 * cell_size).init(device);
        Self { gates, cell_size }
    }

    /// input: [batch, input_size] → new state; the output is `state.hidden`.
    pub fn forward(&self, input: Tensor<B, 2>, state: LstmState<B>) -> LstmState<B> {
        let h = self.cell_size;
        let gates = self.gates.forward(Tensor::cat(vec![input, state.hidden], 1));

        let input_gate  = sigmoid(gates.clone().narrow(1, 0, h));
        let candidate   = gates.clone().narrow(1, h, h).tanh();
        let forget_gate = sigmoid(gates.clone().narrow(1, 2 * h, h).add_scalar(FORGET_BIAS));
        let output_gate = sigmoid(gates.narrow(1, 3 * h, h));

        let memory = state.memory * forget_gate + input_gate * candidate;
        let hidden = memory.clone().tanh() * output_gate;
        LstmState { hidden, memory }
    }
}

// ─── StackedCell ──────────────────────────────────────────────────────────────
#[derive(Module, Debug)]
pub struct StackedCell<B: Backend> {
    layers:    Vec<LstmCell<B>>,
    cell_size: usize,
}

impl<B: Backend> StackedCell<B> {
    /// `stack_size` independently initialised layers; the first reads
    /// `input_size` features, the rest read the layer below.
    pub fn new(input_size: usize, cell_size: usize, stack_size: usize, device: &B::Device) -> Self {
        let layers = (0..stack_size)
            .map(|k| {
                let width = if k == 0 { input_size } else { cell_size };
                LstmCell::new(width, cell_size, device)
            })
            .collect();
        Self { layers, cell_size }
    }

    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> StackedState<B> {
        StackedState::zeros(self.layers.len(), batch_size, self.cell_size, device)
    }

    /// One time step through every layer. Returns (top hidden, new state).
    pub fn forward(&self, input: Tensor<B, 2>, state: StackedState<B>) -> (Tensor<B, 2>, StackedState<B>) {
        let mut x = input;
        let mut next = Vec::with_capacity(self.layers.len());
        for (layer, layer_state) in self.layers.iter().zip(state.layers) {
            let s = layer.forward(x, layer_state);
            x = s.hidden.clone();
            next.push(s);
        }
        (x, StackedState { layers: next })
    }
}

// ─── EmbeddingCell ────────────────────────────────────────────────────────────
#[derive(Config, Debug)]
pub struct EmbeddingCellConfig {
    pub vocab_size:     usize,
    pub embedding_size: usize,
    pub cell_size:      usize,
    pub stack_size:     usize,
}

impl EmbeddingCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> EmbeddingCell<B> {
        EmbeddingCell {
            embedding: EmbeddingConfig::new(self.vocab_size, self.embedding_size).init(device),
            cell: StackedCell::new(self.embedding_size, self.cell_size, self.stack_size, device),
        }
    }
}

#[derive(Module, Debug)]
pub struct EmbeddingCell<B: Backend> {
    /// [vocab_size, embedding_size]
    embedding: Embedding<B>,
    cell:      StackedCell<B>,
}

impl<B: Backend> EmbeddingCell<B> {
    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> StackedState<B> {
        self.cell.zero_state(batch_size, device)
    }

    /// ids: [batch] → (output [batch, cell_size], new state)
    pub fn forward(&self, ids: Tensor<B, 1, Int>, state: StackedState<B>) -> (Tensor<B, 2>, StackedState<B>) {
        let embedded = self.embedding.weight.val().select(0, ids);
        self.cell.forward(embedded, state)
    }
}
