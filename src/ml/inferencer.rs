// ============================================================
// Layer 5 — Inference Controller
// ============================================================
// Rebuilds the model from the saved run config, restores the
// latest weights, and answers predict requests with greedy
// autoregressive decoding. Only column 0 of the decoder batch
// (the BOS column) is ever read, so callers may pass anything
// in the remaining columns.
use anyhow::Result as AnyResult;
use burn::prelude::*;

use crate::domain::error::Result;
use crate::domain::tokens::TokenMatrix;
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::model::Seq2SeqModel;

pub struct Seq2SeqInferencer<B: Backend> {
    model: Seq2SeqModel<B>,
}

impl<B: Backend> Seq2SeqInferencer<B> {
    pub fn new(model: Seq2SeqModel<B>) -> Self {
        Self { model }
    }

    pub fn from_checkpoint(ckpt_manager: &CheckpointManager, device: &B::Device) -> AnyResult<Self> {
        let cfg   = ckpt_manager.load_config()?;
        let model = cfg.model.init::<B>(device)?;
        let model = ckpt_manager.load_model(model, device)?;
        tracing::info!(
            "Model loaded from checkpoint (batch_size={}, seq_len={})",
            model.batch_size(), model.seq_len()
        );
        Ok(Self::new(model))
    }

    pub fn model(&self) -> &Seq2SeqModel<B> {
        &self.model
    }

    /// [batch_size, seq_len] in → [batch_size, seq_len - 1] greedy ids out.
    pub fn predict(&self, enc: &TokenMatrix, dec: &TokenMatrix) -> Result<TokenMatrix> {
        let out = self.model.greedy_decode(enc, dec)?;
        tracing::debug!("Decoded {} rows × {} steps", out.dims()[0], out.dims()[1]);
        Ok(out)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::Seq2SeqError;
    use crate::domain::tokens::BOS_ID;
    use crate::ml::model::Seq2SeqConfig;
    use burn::backend::NdArray;

    type B = NdArray;

    fn inferencer() -> Seq2SeqInferencer<B> {
        let cfg = Seq2SeqConfig::new(8, 2, 2, 4, 10, 5, 0.5);
        Seq2SeqInferencer::new(cfg.init::<B>(&Default::default()).unwrap())
    }

    fn enc() -> TokenMatrix {
        TokenMatrix::from_rows(vec![vec![2, 3, 4, 5], vec![9, 8, 7, 0]]).unwrap()
    }

    #[test]
    fn test_prediction_ids_are_in_vocabulary() {
        let dec = TokenMatrix::filled(2, 4, BOS_ID);
        let out = inferencer().predict(&enc(), &dec).unwrap();
        assert_eq!(out.dims(), [2, 3]);
        assert!(out.max_id().unwrap() < 10);
    }

    #[test]
    fn test_only_bos_column_is_read() {
        let inf = inferencer();
        let mut noisy = TokenMatrix::filled(2, 4, 6);
        noisy.set(0, 0, BOS_ID);
        noisy.set(1, 0, BOS_ID);
        let clean = TokenMatrix::filled(2, 4, BOS_ID);
        assert_eq!(inf.predict(&enc(), &clean).unwrap(), inf.predict(&enc(), &noisy).unwrap());
    }

    #[test]
    fn test_repeated_predictions_are_identical() {
        let inf = inferencer();
        let dec = TokenMatrix::filled(2, 4, BOS_ID);
        assert_eq!(inf.predict(&enc(), &dec).unwrap(), inf.predict(&enc(), &dec).unwrap());
    }

    #[test]
    fn test_wrong_batch_size_is_rejected() {
        let dec = TokenMatrix::filled(3, 4, BOS_ID);
        let err = inferencer().predict(&enc(), &dec).unwrap_err();
        assert!(matches!(err, Seq2SeqError::ShapeMismatch { expected: [2, 4], actual: [3, 4], .. }));
    }
}
