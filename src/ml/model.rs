// ============================================================
// Layer 5 — Seq2Seq Model
// ============================================================
// Wires the pieces together:
//
//   encoder ids ─► Encoder ─► final state ─► Decoder ─► outputs
//                                               │
//                         OutputProjection ◄────┘
//
// Training (teacher forcing):
//   outputs[0..seq_len-1] are paired with labels
//   dec[:, 1..seq_len] and scored with the sampled softmax,
//   then masked and averaged by `sequence_loss`.
//
// Inference (autoregressive):
//   the greedy ids after steps 0..seq_len-1 form a
//   [batch, seq_len - 1] prediction matrix.
//
// Every batch is checked against [batch_size, seq_len] and
// the vocabulary BEFORE any tensor is built.

use burn::prelude::*;

use crate::domain::error::{Result as CoreResult, Seq2SeqError};
use crate::domain::tokens::TokenMatrix;
use crate::ml::cell::EmbeddingCellConfig;
use crate::ml::decoder::{Decoder, DecoderFeed};
use crate::ml::encoder::{Encoder, EncoderOutput};
use crate::ml::loss::sequence_loss;
use crate::ml::projection::{ids_tensor, OutputProjection, OutputProjectionConfig};
use crate::ml::sampler::CandidateSampler;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    /// Width of every LSTM hidden and memory vector
    pub cell_size:      usize,
    /// Number of stacked LSTM layers (≥ 1)
    pub stack_size:     usize,
    pub batch_size:     usize,
    /// Fixed length of both encoder and decoder sequences
    pub seq_len:        usize,
    pub vocab_size:     usize,
    pub embedding_size: usize,
    /// Initial learning rate for gradient descent
    pub learning_rate:  f64,
    #[config(default = 0.9)]
    pub learning_rate_decaying_factor: f64,
    #[config(default = 5.0)]
    pub max_gradient_norm: f64,
    /// Negative classes per sampled-softmax step
    #[config(default = 512)]
    pub num_sampled: usize,
    /// Write loss/PPL summaries every this many global steps
    #[config(default = 100)]
    pub summary_every: u64,
    /// Seed of the candidate sampler
    #[config(default = 42)]
    pub seed: u64,
}

impl Seq2SeqConfig {
    /// Reject configurations that could only fail later.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |msg: String| -> CoreResult<()> { Err(Seq2SeqError::InvalidConfig(msg)) };
        if self.stack_size < 1 {
            return invalid(format!("stack_size must be at least 1, got {}", self.stack_size));
        }
        if self.seq_len < 1 {
            return invalid(format!("seq_len must be at least 1, got {}", self.seq_len));
        }
        if self.vocab_size == 0 {
            return invalid("vocab_size must be positive".to_string());
        }
        if self.embedding_size == 0 {
            return invalid("embedding_size must be positive".to_string());
        }
        if self.cell_size == 0 {
            return invalid("cell_size must be positive".to_string());
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be positive".to_string());
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid(format!("learning_rate must be positive, got {}", self.learning_rate));
        }
        let factor = self.learning_rate_decaying_factor;
        if !(factor > 0.0 && factor <= 1.0) {
            return invalid(format!("learning_rate_decaying_factor must be in (0, 1], got {factor}"));
        }
        if !(self.max_gradient_norm.is_finite() && self.max_gradient_norm > 0.0) {
            return invalid(format!("max_gradient_norm must be positive, got {}", self.max_gradient_norm));
        }
        if self.num_sampled == 0 {
            return invalid("num_sampled must be positive".to_string());
        }
        if self.summary_every == 0 {
            return invalid("summary_every must be positive".to_string());
        }
        Ok(())
    }

    fn cell_config(&self) -> EmbeddingCellConfig {
        EmbeddingCellConfig::new(self.vocab_size, self.embedding_size, self.cell_size, self.stack_size)
    }

    /// Validate, then build a freshly initialised model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> CoreResult<Seq2SeqModel<B>> {
        self.validate()?;
        let cell_cfg = self.cell_config();
        Ok(Seq2SeqModel {
            encoder:    Encoder::new(&cell_cfg, device),
            decoder:    Decoder::new(&cell_cfg, device),
            projection: OutputProjectionConfig::new(self.vocab_size, self.cell_size).init(device),
            batch_size: self.batch_size,
            seq_len:    self.seq_len,
            vocab_size: self.vocab_size,
        })
    }
}

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    encoder:    Encoder<B>,
    decoder:    Decoder<B>,
    projection: OutputProjection<B>,
    batch_size: usize,
    seq_len:    usize,
    vocab_size: usize,
}

impl<B: Backend> Seq2SeqModel<B> {
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Number of (output, label) pairs a batch row contributes.
    pub fn label_positions(&self) -> usize {
        self.seq_len.saturating_sub(1)
    }

    /// Shape and vocabulary check of one input matrix.
    pub fn check_batch(&self, name: &'static str, batch: &TokenMatrix) -> CoreResult<()> {
        self.check_shape(name, batch)?;
        self.check_ids(name, batch.max_id())
    }

    fn check_shape(&self, name: &'static str, batch: &TokenMatrix) -> CoreResult<()> {
        let expected = [self.batch_size, self.seq_len];
        if batch.dims() != expected {
            return Err(Seq2SeqError::ShapeMismatch { name, expected, actual: batch.dims() });
        }
        Ok(())
    }

    fn check_ids(&self, name: &'static str, max_id: Option<u32>) -> CoreResult<()> {
        match max_id {
            Some(id) if id as usize >= self.vocab_size => {
                Err(Seq2SeqError::TokenOutOfRange { name, id, vocab_size: self.vocab_size })
            }
            _ => Ok(()),
        }
    }

    fn check_pair(&self, enc: &TokenMatrix, dec: &TokenMatrix) -> CoreResult<()> {
        self.check_batch("encoder", enc)?;
        self.check_batch("decoder", dec)
    }

    fn time_major(&self, batch: &TokenMatrix, device: &B::Device) -> Vec<Tensor<B, 1, Int>> {
        (0..self.seq_len)
            .map(|t| ids_tensor::<B>(&batch.column(t), device))
            .collect()
    }

    /// Run the encoder from a zero state.
    pub fn encode(&self, enc: &TokenMatrix) -> CoreResult<EncoderOutput<B>> {
        self.check_batch("encoder", enc)?;
        let device = self.projection.device();
        let initial = self.encoder.zero_state(self.batch_size, &device);
        let encoded = self.encoder.forward(self.time_major(enc, &device), initial);
        tracing::trace!("Encoded {} steps", encoded.outputs.len());
        Ok(encoded)
    }

    /// Masked mean cross-entropy of a teacher-forced pass, shape [1].
    pub fn forward_loss(
        &self,
        enc:     &TokenMatrix,
        dec:     &TokenMatrix,
        sampler: &mut CandidateSampler,
    ) -> CoreResult<Tensor<B, 1>> {
        self.check_pair(enc, dec)?;
        let device = self.projection.device();
        if self.label_positions() == 0 {
            return Ok(Tensor::zeros([1], &device));
        }

        let encoded = self.encode(enc)?;
        let feed = DecoderFeed::TeacherForcing { inputs: self.time_major(dec, &device) };
        let decoded = self.decoder.forward(encoded.state, feed, &self.projection);

        // Output t predicts decoder input t + 1; the state tensors
        // after the seq_len outputs are never scored
        let mut step_losses = Vec::with_capacity(self.label_positions());
        let mut all_labels = Vec::with_capacity(self.label_positions() * self.batch_size);
        for (t, output) in decoded.flatten().into_iter().take(self.label_positions()).enumerate() {
            let labels = dec.column(t + 1);
            step_losses.push(self.projection.loss(output, &labels, sampler));
            all_labels.extend(labels);
        }
        Ok(sequence_loss(Tensor::cat(step_losses, 0), &all_labels))
    }

    /// Greedy autoregressive decode → [batch_size, seq_len - 1].
    ///
    /// Only column 0 of `dec` is read, so only its shape and
    /// that column are checked.
    pub fn greedy_decode(&self, enc: &TokenMatrix, dec: &TokenMatrix) -> CoreResult<TokenMatrix> {
        self.check_batch("encoder", enc)?;
        self.check_shape("decoder", dec)?;
        let bos = dec.column(0);
        self.check_ids("decoder", bos.iter().copied().max())?;
        let device = self.projection.device();
        let encoded = self.encode(enc)?;
        let feed = DecoderFeed::Autoregressive {
            bos:   ids_tensor::<B>(&bos, &device),
            steps: self.seq_len,
        };
        let decoded = self.decoder.forward(encoded.state, feed, &self.projection);

        let columns: Vec<Vec<u32>> = decoded
            .predictions
            .into_iter()
            .take(self.label_positions())
            .map(|ids| ids.into_data().iter::<i64>().map(|id| id as u32).collect())
            .collect();
        TokenMatrix::from_columns(columns, self.batch_size)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tokens::{BOS_ID, PAD_ID};
    use burn::backend::NdArray;

    type B = NdArray;

    fn config() -> Seq2SeqConfig {
        Seq2SeqConfig::new(8, 2, 3, 5, 20, 6, 0.5)
    }

    fn batch(rows: usize, cols: usize, seed: u32) -> TokenMatrix {
        let data = (0..rows)
            .map(|r| (0..cols).map(|c| 2 + (seed + r as u32 * 3 + c as u32) % 17).collect())
            .collect();
        TokenMatrix::from_rows(data).unwrap()
    }

    fn decoder_batch(rows: usize, cols: usize, seed: u32) -> TokenMatrix {
        let mut m = batch(rows, cols, seed);
        for r in 0..rows {
            m.set(r, 0, BOS_ID);
        }
        m
    }

    #[test]
    fn test_defaults() {
        let cfg = config();
        assert_eq!(cfg.learning_rate_decaying_factor, 0.9);
        assert_eq!(cfg.max_gradient_norm, 5.0);
        assert_eq!(cfg.num_sampled, 512);
        assert_eq!(cfg.summary_every, 100);
    }

    #[test]
    fn test_config_file_keeps_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("model.json");
        let mut cfg = config();
        cfg.num_sampled = 64;
        cfg.save(&path).unwrap();
        let loaded = Seq2SeqConfig::load(&path).unwrap();
        assert_eq!(loaded.num_sampled, 64);
        assert_eq!(loaded.max_gradient_norm, 5.0);
        assert_eq!(loaded.seed, 42);
    }

    #[test]
    fn test_invalid_configs_fail_at_construction() {
        let device = Default::default();
        let edits: [fn(&mut Seq2SeqConfig); 8] = [
            |c| c.stack_size = 0,
            |c| c.seq_len = 0,
            |c| c.vocab_size = 0,
            |c| c.embedding_size = 0,
            |c| c.learning_rate = 0.0,
            |c| c.learning_rate_decaying_factor = 1.5,
            |c| c.max_gradient_norm = -1.0,
            |c| c.num_sampled = 0,
        ];
        for edit in edits {
            let mut cfg = config();
            edit(&mut cfg);
            let err = cfg.init::<B>(&device).unwrap_err();
            assert!(matches!(err, Seq2SeqError::InvalidConfig(_)), "{err}");
        }
    }

    #[test]
    fn test_shape_mismatch_is_reported_before_compute() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let mut sampler = CandidateSampler::new(20, 512, 0);
        let err = model
            .forward_loss(&batch(2, 5, 0), &decoder_batch(3, 5, 0), &mut sampler)
            .unwrap_err();
        match err {
            Seq2SeqError::ShapeMismatch { name, expected, actual } => {
                assert_eq!(name, "encoder");
                assert_eq!(expected, [3, 5]);
                assert_eq!(actual, [2, 5]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_token_outside_vocabulary_is_rejected() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let mut sampler = CandidateSampler::new(20, 512, 0);
        let mut dec = decoder_batch(3, 5, 1);
        dec.set(1, 3, 20);
        let err = model.forward_loss(&batch(3, 5, 1), &dec, &mut sampler).unwrap_err();
        assert!(matches!(err, Seq2SeqError::TokenOutOfRange { name: "decoder", id: 20, .. }));
    }

    #[test]
    fn test_out_of_vocabulary_bos_column_is_rejected() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let mut dec = decoder_batch(3, 5, 1);
        dec.set(2, 0, 21);
        let err = model.greedy_decode(&batch(3, 5, 1), &dec).unwrap_err();
        assert!(matches!(err, Seq2SeqError::TokenOutOfRange { name: "decoder", id: 21, .. }));

        let mut enc = batch(3, 5, 1);
        enc.set(0, 4, 20);
        let err = model.greedy_decode(&enc, &decoder_batch(3, 5, 1)).unwrap_err();
        assert!(matches!(err, Seq2SeqError::TokenOutOfRange { name: "encoder", id: 20, .. }));
    }

    #[test]
    fn test_greedy_decode_ignores_out_of_vocabulary_ids_after_bos() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let enc = batch(3, 5, 1);
        let clean = decoder_batch(3, 5, 1);
        let mut noisy = clean.clone();
        noisy.set(1, 3, 20);
        noisy.set(0, 4, u32::MAX);
        let expected = model.greedy_decode(&enc, &clean).unwrap();
        assert_eq!(model.greedy_decode(&enc, &noisy).unwrap(), expected);
    }

    #[test]
    fn test_loss_is_finite_scalar() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let mut sampler = CandidateSampler::new(20, 512, 0);
        let loss = model
            .forward_loss(&batch(3, 5, 2), &decoder_batch(3, 5, 4), &mut sampler)
            .unwrap();
        assert_eq!(loss.dims(), [1]);
        let value: f32 = loss.into_scalar();
        assert!(value.is_finite() && value > 0.0);
    }

    #[test]
    fn test_all_padding_labels_give_zero_loss() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let mut sampler = CandidateSampler::new(20, 512, 0);
        let mut dec = TokenMatrix::filled(3, 5, PAD_ID);
        for r in 0..3 {
            dec.set(r, 0, BOS_ID);
        }
        let value: f32 = model
            .forward_loss(&batch(3, 5, 2), &dec, &mut sampler)
            .unwrap()
            .into_scalar();
        assert_eq!(value, 0.0);
    }

    #[test]
    fn test_greedy_decode_shape_drops_bos_column() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let out = model.greedy_decode(&batch(3, 5, 0), &decoder_batch(3, 5, 0)).unwrap();
        assert_eq!(out.dims(), [3, 4]);
        assert!(out.max_id().map_or(true, |id| id < 20));
    }

    #[test]
    fn test_greedy_decode_ignores_decoder_inputs_after_bos() {
        let model = config().init::<B>(&Default::default()).unwrap();
        let enc = batch(3, 5, 7);
        let a = model.greedy_decode(&enc, &decoder_batch(3, 5, 1)).unwrap();
        let b = model.greedy_decode(&enc, &decoder_batch(3, 5, 9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_single_step_sequences_have_no_labels() {
        let mut cfg = config();
        cfg.seq_len = 1;
        let model = cfg.init::<B>(&Default::default()).unwrap();
        let mut sampler = CandidateSampler::new(20, 512, 0);
        let value: f32 = model
            .forward_loss(&batch(3, 1, 0), &decoder_batch(3, 1, 0), &mut sampler)
            .unwrap()
            .into_scalar();
        assert_eq!(value, 0.0);
        let out = model.greedy_decode(&batch(3, 1, 0), &decoder_batch(3, 1, 0)).unwrap();
        assert_eq!(out.dims(), [3, 0]);
    }
}
