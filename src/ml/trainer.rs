// ============================================================
// Layer 5 — Training Step Controller and Training Loop
// ============================================================
// Seq2SeqTrainer owns the model, the optimiser, the learning
// rate, the candidate sampler and the metric sink. One call to
// `step` is one blocking optimisation step:
//
//   1. check both batches against [batch_size, seq_len]
//   2. teacher-forced forward pass → masked sampled loss
//   3. refuse non-finite losses before touching parameters
//   4. backward, global gradient norm, scale every gradient
//      down to max_gradient_norm when it is above
//   5. optimiser update with the current learning rate
//   6. every `summary_every` steps record loss and PPL
//
// `step` takes &mut self, so one trainer can never run two
// steps at once.
//
// `run_training` below is the epoch loop used by the CLI:
// train on every batch, evaluate validation loss, decay the
// learning rate when validation stops improving, checkpoint.
//
// Reference: Burn Book §5, Pascanu et al. (2013) On the
//            difficulty of training recurrent neural networks

use anyhow::Result as AnyResult;
use burn::{
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer, SgdConfig},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::train_use_case::{BackendKind, RunConfig};
use crate::domain::error::{Result, Seq2SeqError};
use crate::domain::pair::Batch;
use crate::domain::tokens::TokenMatrix;
use crate::domain::traits::{MetricSink, Stream};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::loss::perplexity;
use crate::ml::model::{Seq2SeqConfig, Seq2SeqModel};
use crate::ml::params::{clip_scale, global_grad_norm, scale_gradients};
use crate::ml::sampler::CandidateSampler;
use crate::ml::{CpuTrainBackend, GpuTrainBackend};

pub struct Seq2SeqTrainer<B: AutodiffBackend, O> {
    model:              Seq2SeqModel<B>,
    optim:              O,
    config:             Seq2SeqConfig,
    learning_rate:      f64,
    sampler:            CandidateSampler,
    sink:               Box<dyn MetricSink>,
    last_gradient_norm: Option<f64>,
}

/// Fresh model + plain gradient descent.
pub fn sgd_trainer<B: AutodiffBackend>(
    config: Seq2SeqConfig,
    device: &B::Device,
    sink:   Box<dyn MetricSink>,
) -> Result<Seq2SeqTrainer<B, impl Optimizer<Seq2SeqModel<B>, B>>> {
    let model = config.init::<B>(device)?;
    let optim = SgdConfig::new().init::<B, Seq2SeqModel<B>>();
    Seq2SeqTrainer::new(model, optim, config, sink)
}

impl<B, O> Seq2SeqTrainer<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<Seq2SeqModel<B>, B>,
{
    pub fn new(
        model:  Seq2SeqModel<B>,
        optim:  O,
        config: Seq2SeqConfig,
        sink:   Box<dyn MetricSink>,
    ) -> Result<Self> {
        config.validate()?;
        let sampler = CandidateSampler::new(config.vocab_size, config.num_sampled, config.seed);
        if sampler.covers_vocabulary() {
            tracing::info!(
                "num_sampled ({}) >= vocab_size ({}): using exact softmax loss",
                config.num_sampled, config.vocab_size
            );
        }
        Ok(Self {
            model,
            optim,
            learning_rate: config.learning_rate,
            config,
            sampler,
            sink,
            last_gradient_norm: None,
        })
    }

    pub fn model(&self) -> &Seq2SeqModel<B> {
        &self.model
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Global gradient norm (before clipping) of the last update.
    pub fn last_gradient_norm(&self) -> Option<f64> {
        self.last_gradient_norm
    }

    /// One optimisation step (or a loss-only evaluation when
    /// `trainable` is false). Returns the pre-update loss.
    pub fn step(
        &mut self,
        enc:         &TokenMatrix,
        dec:         &TokenMatrix,
        global_step: u64,
        trainable:   bool,
    ) -> Result<f64> {
        let loss = self.model.forward_loss(enc, dec, &mut self.sampler)?;
        let loss_value = loss.clone().into_scalar().elem::<f64>();
        ensure_finite_loss(loss_value, global_step)?;

        if trainable && self.model.label_positions() > 0 {
            self.apply_gradients(loss, global_step)?;
        }

        if global_step % self.config.summary_every == 0 {
            self.record_summary(Stream::for_step(trainable), global_step, loss_value)?;
        }
        Ok(loss_value)
    }

    /// Loss only: no update, no summary.
    pub fn evaluate(&mut self, enc: &TokenMatrix, dec: &TokenMatrix) -> Result<f64> {
        let loss = self.model.forward_loss(enc, dec, &mut self.sampler)?;
        Ok(loss.into_scalar().elem::<f64>())
    }

    fn apply_gradients(&mut self, loss: Tensor<B, 1>, global_step: u64) -> Result<()> {
        let grads = loss.backward();
        let mut grads = GradientsParams::from_grads(grads, &self.model);
        let norm = global_grad_norm::<B, _>(&self.model, &grads);
        if !norm.is_finite() {
            return Err(Seq2SeqError::NonFiniteGradient { step: global_step, norm });
        }
        let scale = clip_scale(norm, self.config.max_gradient_norm);
        if scale < 1.0 {
            scale_gradients::<B, _>(&self.model, &mut grads, scale);
            tracing::debug!(
                "Step {}: clipped gradient norm {:.4} to {}",
                global_step, norm, self.config.max_gradient_norm
            );
        }
        self.last_gradient_norm = Some(norm);

        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);
        Ok(())
    }

    /// learning_rate *= learning_rate_decaying_factor
    pub fn decay_learning_rate(&mut self) -> f64 {
        self.learning_rate *= self.config.learning_rate_decaying_factor;
        tracing::info!("Learning rate decayed to {:.6}", self.learning_rate);
        self.learning_rate
    }

    /// Greedy decode with the current parameters.
    pub fn predict(&self, enc: &TokenMatrix, dec: &TokenMatrix) -> Result<TokenMatrix> {
        self.model.valid().greedy_decode(enc, dec)
    }

    /// Write `loss` and `PPL` for one step.
    pub fn record_summary(&mut self, stream: Stream, global_step: u64, loss: f64) -> Result<()> {
        self.sink.record(stream, global_step, "loss", loss)?;
        self.sink.record(stream, global_step, "PPL", perplexity(loss))?;
        tracing::debug!(
            "[{}] step {} loss={:.4} ppl={:.2}",
            stream.as_str(), global_step, loss, perplexity(loss)
        );
        Ok(())
    }

    /// Flush the metric sink; call once training is over.
    pub fn close(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

fn ensure_finite_loss(value: f64, step: u64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Seq2SeqError::NonFiniteLoss { step, value })
    }
}

// ─── Training Loop ────────────────────────────────────────────────────────────

/// What a finished run reports back to the use case.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub epochs:              usize,
    pub global_steps:        u64,
    pub final_train_loss:    f64,
    pub best_val_loss:       Option<f64>,
    pub final_learning_rate: f64,
}

pub fn run_training(
    cfg:          &RunConfig,
    train:        Vec<Batch>,
    val:          Vec<Batch>,
    ckpt_manager: CheckpointManager,
    sink:         Box<dyn MetricSink>,
) -> AnyResult<TrainSummary> {
    match cfg.backend {
        BackendKind::Cpu => {
            tracing::info!("Using NdArray CPU backend");
            train_loop::<CpuTrainBackend>(cfg, train, val, ckpt_manager, sink, Default::default())
        }
        BackendKind::Gpu => {
            let device = burn::backend::wgpu::WgpuDevice::default();
            tracing::info!("Using WGPU device: {:?}", device);
            train_loop::<GpuTrainBackend>(cfg, train, val, ckpt_manager, sink, device)
        }
    }
}

fn train_loop<B: AutodiffBackend>(
    cfg:          &RunConfig,
    train:        Vec<Batch>,
    val:          Vec<Batch>,
    ckpt_manager: CheckpointManager,
    sink:         Box<dyn MetricSink>,
    device:       B::Device,
) -> AnyResult<TrainSummary> {
    let mut trainer = sgd_trainer::<B>(cfg.model.clone(), &device, sink)?;
    tracing::info!(
        "Model ready: {} layer(s), cell_size={}, vocab={}",
        cfg.model.stack_size, cfg.model.cell_size, cfg.model.vocab_size
    );

    let mut global_step = 0u64;
    let mut best_val: Option<f64> = None;
    let mut final_train_loss = f64::NAN;

    for epoch in 1..=cfg.epochs {
        // ── Training phase ────────────────────────────────────────────────────
        let mut loss_sum = 0.0f64;
        for batch in &train {
            global_step += 1;
            loss_sum += trainer.step(&batch.encoder, &batch.decoder, global_step, true)?;
        }
        let avg_train = if train.is_empty() { f64::NAN } else { loss_sum / train.len() as f64 };
        final_train_loss = avg_train;

        // ── Validation phase ──────────────────────────────────────────────────
        let avg_val = if val.is_empty() {
            None
        } else {
            let mut sum = 0.0f64;
            for batch in &val {
                sum += trainer.evaluate(&batch.encoder, &batch.decoder)?;
            }
            Some(sum / val.len() as f64)
        };

        if let Some(v) = avg_val {
            trainer.record_summary(Stream::Test, global_step, v)?;
            // Plateau: no improvement on the best validation loss so far
            match best_val {
                Some(best) if v >= best => {
                    trainer.decay_learning_rate();
                }
                _ => best_val = Some(v),
            }
        }

        println!(
            "Epoch {:>3}/{} | step {:>6} | train_loss={:.4} | train_ppl={:.2} | val_loss={} | lr={:.5}",
            epoch,
            cfg.epochs,
            global_step,
            avg_train,
            perplexity(avg_train),
            avg_val.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}")),
            trainer.learning_rate(),
        );
        tracing::debug!("Last gradient norm: {:?}", trainer.last_gradient_norm());

        ckpt_manager.save_model(trainer.model(), epoch)?;
        tracing::info!("Checkpoint saved for epoch {}", epoch);
    }

    trainer.close()?;
    tracing::info!("Training complete after {} steps", global_step);

    Ok(TrainSummary {
        epochs: cfg.epochs,
        global_steps: global_step,
        final_train_loss,
        best_val_loss: best_val,
        final_learning_rate: trainer.learning_rate(),
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::tokens::{BOS_ID, PAD_ID};
    use crate::infra::metrics::MemorySink;
    use crate::ml::params::flat_values;
    use burn::optim::momentum::MomentumConfig;

    type B = CpuTrainBackend;

    fn config() -> Seq2SeqConfig {
        Seq2SeqConfig::new(16, 1, 4, 5, 12, 8, 0.7)
    }

    /// Copy task: the decoder must reproduce the encoder ids.
    fn copy_batch() -> (TokenMatrix, TokenMatrix) {
        let sources = [[2, 3, 4, 5], [6, 7, 8, 9], [10, 11, 2, 3], [4, 6, 8, 10]];
        let enc = sources.iter().map(|s| {
            let mut row = s.to_vec();
            row.push(PAD_ID);
            row
        });
        let dec = sources.iter().map(|s| {
            let mut row = vec![BOS_ID];
            row.extend_from_slice(s);
            row
        });
        (
            TokenMatrix::from_rows(enc.collect()).unwrap(),
            TokenMatrix::from_rows(dec.collect()).unwrap(),
        )
    }

    fn trainer_with(
        cfg: Seq2SeqConfig,
        sink: MemorySink,
    ) -> Seq2SeqTrainer<B, impl Optimizer<Seq2SeqModel<B>, B>> {
        sgd_trainer::<B>(cfg, &Default::default(), Box::new(sink)).unwrap()
    }

    fn distance(a: &[f32], b: &[f32]) -> f64 {
        a.iter()
            .zip(b)
            .map(|(x, y)| ((x - y) as f64).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    #[test]
    fn test_repeated_steps_reduce_loss_on_fixed_batch() {
        let mut trainer = trainer_with(config(), MemorySink::default());
        let (enc, dec) = copy_batch();
        let first = trainer.step(&enc, &dec, 1, true).unwrap();
        let mut last = first;
        for step in 2..=120 {
            last = trainer.step(&enc, &dec, step, true).unwrap();
        }
        assert!(last < 0.75 * first, "loss went from {first} to {last}");
    }

    #[test]
    fn test_update_norm_never_exceeds_clip_threshold() {
        let mut cfg = config();
        cfg.learning_rate = 1.0;
        cfg.max_gradient_norm = 1e-3;
        let mut trainer = trainer_with(cfg, MemorySink::default());
        let (enc, dec) = copy_batch();

        let before = flat_values(trainer.model());
        trainer.step(&enc, &dec, 1, true).unwrap();
        let after = flat_values(trainer.model());

        let grad_norm = trainer.last_gradient_norm().unwrap();
        assert!(grad_norm > 1e-3, "gradient norm {grad_norm} too small to exercise clipping");
        let moved = distance(&before, &after);
        assert!(moved <= 1.0 * 1e-3 * 1.05, "update norm {moved}");
        assert!(moved > 0.0);
    }

    #[test]
    fn test_momentum_accumulates_clipped_gradients() {
        let mut cfg = config();
        cfg.learning_rate = 1.0;
        cfg.max_gradient_norm = 1e-3;
        let device = Default::default();
        let model = cfg.init::<B>(&device).unwrap();
        let optim = SgdConfig::new()
            .with_momentum(Some(MomentumConfig::new()))
            .init::<B, Seq2SeqModel<B>>();
        let sink = Box::new(MemorySink::default());
        let mut trainer = Seq2SeqTrainer::new(model, optim, cfg, sink).unwrap();
        let (enc, dec) = copy_batch();

        let start = flat_values(trainer.model());
        trainer.step(&enc, &dec, 1, true).unwrap();
        assert!(trainer.last_gradient_norm().unwrap() > 1e-3);
        let after_first = flat_values(trainer.model());
        assert!(distance(&start, &after_first) <= 1e-3 * 1.05);

        // All-PAD labels give zero gradients, so this update is the
        // stored velocity alone
        let mut pad = TokenMatrix::filled(4, 5, PAD_ID);
        for r in 0..4 {
            pad.set(r, 0, BOS_ID);
        }
        trainer.step(&enc, &pad, 2, true).unwrap();
        assert_eq!(trainer.last_gradient_norm(), Some(0.0));
        let moved = distance(&after_first, &flat_values(trainer.model()));
        assert!(moved > 0.0);
        assert!(moved <= 0.9 * 1e-3 * 1.05, "velocity step {moved}");
    }

    #[test]
    fn test_small_gradients_are_applied_unscaled() {
        let mut cfg = config();
        cfg.learning_rate = 0.01;
        cfg.max_gradient_norm = 1e6;
        let mut trainer = trainer_with(cfg, MemorySink::default());
        let (enc, dec) = copy_batch();

        let before = flat_values(trainer.model());
        trainer.step(&enc, &dec, 1, true).unwrap();
        let after = flat_values(trainer.model());

        let expected = 0.01 * trainer.last_gradient_norm().unwrap();
        let moved = distance(&before, &after);
        assert!((moved - expected).abs() <= 0.05 * expected, "{moved} vs {expected}");
    }

    #[test]
    fn test_loss_only_step_leaves_parameters_untouched() {
        let mut trainer = trainer_with(config(), MemorySink::default());
        let (enc, dec) = copy_batch();
        let before = flat_values(trainer.model());
        let loss = trainer.step(&enc, &dec, 1, false).unwrap();
        assert!(loss > 0.0);
        assert_eq!(before, flat_values(trainer.model()));
        assert!(trainer.last_gradient_norm().is_none());
    }

    #[test]
    fn test_decay_multiplies_by_factor_each_time() {
        let mut trainer = trainer_with(config(), MemorySink::default());
        let mut expected = 0.7f64;
        for _ in 0..5 {
            expected *= 0.9;
            assert_eq!(trainer.decay_learning_rate(), expected);
        }
        assert!((trainer.learning_rate() - 0.7 * 0.9f64.powi(5)).abs() < 1e-15);
    }

    #[test]
    fn test_summaries_follow_cadence_and_stream() {
        let sink = MemorySink::default();
        let mut cfg = config();
        cfg.summary_every = 2;
        let mut trainer = trainer_with(cfg, sink.clone());
        let (enc, dec) = copy_batch();
        for step in 1..=4 {
            trainer.step(&enc, &dec, step, true).unwrap();
        }
        trainer.step(&enc, &dec, 6, false).unwrap();
        trainer.close().unwrap();

        let records = sink.records();
        let steps: Vec<u64> = records.iter().map(|r| r.step).collect();
        assert_eq!(steps, vec![2, 2, 4, 4, 6, 6]);
        assert_eq!(records[0].name, "loss");
        assert_eq!(records[1].name, "PPL");
        assert!((records[1].value - records[0].value.exp()).abs() < 1e-9);
        assert_eq!(records[3].stream, Stream::Train);
        assert_eq!(records[4].stream, Stream::Test);
    }

    #[test]
    fn test_shape_mismatch_fails_before_update() {
        let mut trainer = trainer_with(config(), MemorySink::default());
        let (enc, _) = copy_batch();
        let short = TokenMatrix::filled(4, 3, BOS_ID);
        let before = flat_values(trainer.model());
        let err = trainer.step(&enc, &short, 1, true).unwrap_err();
        assert!(matches!(err, Seq2SeqError::ShapeMismatch { name: "decoder", .. }));
        assert_eq!(before, flat_values(trainer.model()));
    }

    #[test]
    fn test_all_padding_labels_report_zero_loss() {
        let mut trainer = trainer_with(config(), MemorySink::default());
        let (enc, _) = copy_batch();
        let mut dec = TokenMatrix::filled(4, 5, PAD_ID);
        for r in 0..4 {
            dec.set(r, 0, BOS_ID);
        }
        assert_eq!(trainer.step(&enc, &dec, 1, false).unwrap(), 0.0);
    }

    #[test]
    fn test_non_finite_loss_is_a_distinct_error() {
        assert!(ensure_finite_loss(1.25, 3).is_ok());
        let err = ensure_finite_loss(f64::NAN, 7).unwrap_err();
        assert!(matches!(err, Seq2SeqError::NonFiniteLoss { step: 7, .. }));
        assert!(ensure_finite_loss(f64::INFINITY, 8).is_err());
    }

    #[test]
    fn test_predict_shape_and_bos_independence() {
        let trainer = trainer_with(config(), MemorySink::default());
        let (enc, dec) = copy_batch();
        let mut other = TokenMatrix::filled(4, 5, 7);
        for r in 0..4 {
            other.set(r, 0, BOS_ID);
        }
        let a = trainer.predict(&enc, &dec).unwrap();
        let b = trainer.predict(&enc, &other).unwrap();
        assert_eq!(a.dims(), [4, 4]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_sampled_softmax_training_step_runs() {
        let mut cfg = Seq2SeqConfig::new(8, 2, 4, 5, 40, 6, 0.5);
        cfg.num_sampled = 6;
        let mut trainer = trainer_with(cfg, MemorySink::default());
        let (enc, dec) = copy_batch();
        let loss = trainer.step(&enc, &dec, 1, true).unwrap();
        assert!(loss.is_finite() && loss > 0.0);
        assert!(trainer.last_gradient_norm().unwrap() > 0.0);
    }
}
