// ============================================================
// Layer 4 — Pair Batcher
// ============================================================
// Turns variable-length TokenPairs into fixed-shape Batches:
//
//   encoder row : source ids, truncated / PAD-filled to seq_len
//   decoder row : BOS, then target ids, truncated / PAD-filled
//
// The model only accepts exactly [batch_size, seq_len], so a
// trailing group smaller than batch_size is either dropped
// (training) or topped up with filler rows (prediction).
// Filler rows are an all-PAD encoder row and a BOS + PAD
// decoder row; `Batch::real_rows` says how many rows are real.

use crate::domain::error::Result;
use crate::domain::pair::{Batch, TokenPair};
use crate::domain::tokens::{TokenMatrix, BOS_ID, PAD_ID};

#[derive(Debug, Clone, Copy)]
pub struct PairBatcher {
    batch_size: usize,
    seq_len:    usize,
}

impl PairBatcher {
    pub fn new(batch_size: usize, seq_len: usize) -> Self {
        Self { batch_size, seq_len }
    }

    pub fn encoder_row(&self, source: &[u32]) -> Vec<u32> {
        fit(source.iter().copied(), self.seq_len)
    }

    pub fn decoder_row(&self, target: &[u32]) -> Vec<u32> {
        fit(std::iter::once(BOS_ID).chain(target.iter().copied()), self.seq_len)
    }

    /// Up to `batch_size` pairs → one batch, filler rows appended.
    pub fn batch(&self, pairs: &[TokenPair]) -> Result<Batch> {
        let real_rows = pairs.len().min(self.batch_size);
        let (encoder, decoder): (Vec<_>, Vec<_>) = (0..self.batch_size)
            .map(|r| match pairs.get(r) {
                Some(pair) => (self.encoder_row(&pair.source), self.decoder_row(&pair.target)),
                None => (self.encoder_row(&[]), self.decoder_row(&[])),
            })
            .unzip();
        Ok(Batch {
            encoder: TokenMatrix::from_rows(encoder)?,
            decoder: TokenMatrix::from_rows(decoder)?,
            real_rows,
        })
    }

    pub fn batches(&self, pairs: &[TokenPair], keep_partial: bool) -> Result<Vec<Batch>> {
        if self.batch_size == 0 {
            return Ok(Vec::new());
        }
        let batches = pairs
            .chunks(self.batch_size)
            .filter(|group| keep_partial || group.len() == self.batch_size)
            .map(|group| self.batch(group))
            .collect::<Result<Vec<Batch>>>()?;

        let dropped = if keep_partial { 0 } else { pairs.len() % self.batch_size };
        if dropped > 0 {
            tracing::debug!("Dropped {} pairs that did not fill a batch", dropped);
        }
        Ok(batches)
    }
}

fn fit(ids: impl Iterator<Item = u32>, len: usize) -> Vec<u32> {
    let mut row: Vec<u32> = ids.take(len).collect();
    row.resize(len, PAD_ID);
    row
}
