// ============================================================
// Layer 3 — Token Pair and Batch Domain Types
// ============================================================
// A TokenPair is one training example before padding:
//   source — ids the encoder reads
//   target — ids the decoder should produce (no BOS yet)
//
// A Batch is what the model actually consumes: two parallel
// [batch_size, seq_len] matrices. The decoder matrix starts
// with BOS so that labels are the decoder inputs shifted
// left by one position:
//
//   decoder inputs : BOS  t1  t2  t3  PAD
//   labels         : t1   t2  t3  PAD
//
// Reference: Sutskever et al. (2014) Sequence to Sequence Learning

use serde::{Deserialize, Serialize};

use crate::domain::tokens::TokenMatrix;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub source: Vec<u32>,
    pub target: Vec<u32>,
}

impl TokenPair {
    pub fn new(source: Vec<u32>, target: Vec<u32>) -> Self {
        Self { source, target }
    }

    /// Largest id on either side, used for vocabulary checks
    pub fn max_id(&self) -> Option<u32> {
        self.source.iter().chain(self.target.iter()).copied().max()
    }
}

/// One fixed-shape batch ready for `step` or `predict`.
#[derive(Debug, Clone)]
pub struct Batch {
    pub encoder: TokenMatrix,
    pub decoder: TokenMatrix,
    /// Rows that hold real examples; the rest are filler
    /// added to reach the fixed batch size.
    pub real_rows: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_id_spans_both_sides() {
        let pair = TokenPair::new(vec![3, 9], vec![12, 4]);
        assert_eq!(pair.max_id(), Some(12));
        assert_eq!(TokenPair::new(vec![], vec![]).max_id(), None);
    }
}
