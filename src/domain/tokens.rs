// ============================================================
// Layer 3 — Token Matrix Domain Type
// ============================================================
// A rectangular [rows, cols] matrix of token ids, stored
// row-major. It is the only shape in which token data crosses
// the boundary into the model:
//
//   encoder inputs : [batch_size, seq_len]
//   decoder inputs : [batch_size, seq_len]   (BOS-led)
//   predictions    : [batch_size, seq_len - 1]
//
// The model consumes it column by column (time-major), one
// [batch_size] vector per recurrent step.

use serde::{Deserialize, Serialize};

use crate::domain::error::{Result, Seq2SeqError};

/// Padding id. Positions whose label is PAD_ID carry no loss.
pub const PAD_ID: u32 = 0;

/// Sequence-start id leading every decoder input row.
pub const BOS_ID: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMatrix {
    rows: usize,
    cols: usize,
    ids:  Vec<u32>,
}

impl TokenMatrix {
    /// Build from rows; every row must have the same length.
    pub fn from_rows(rows: Vec<Vec<u32>>) -> Result<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        for (row, ids) in rows.iter().enumerate() {
            if ids.len() != cols {
                return Err(Seq2SeqError::RaggedRows { row, len: ids.len(), expected: cols });
            }
        }
        let n = rows.len();
        let ids = rows.into_iter().flatten().collect();
        Ok(Self { rows: n, cols, ids })
    }

    /// Build from time-major columns, each holding `rows` ids.
    pub fn from_columns(columns: Vec<Vec<u32>>, rows: usize) -> Result<Self> {
        for (col, ids) in columns.iter().enumerate() {
            if ids.len() != rows {
                return Err(Seq2SeqError::RaggedRows { row: col, len: ids.len(), expected: rows });
            }
        }
        let cols = columns.len();
        let mut ids = vec![PAD_ID; rows * cols];
        for (c, column) in columns.iter().enumerate() {
            for (r, &id) in column.iter().enumerate() {
                ids[r * cols + c] = id;
            }
        }
        Ok(Self { rows, cols, ids })
    }

    /// [rows, cols]
    pub fn dims(&self) -> [usize; 2] {
        [self.rows, self.cols]
    }

    pub fn row(&self, row: usize) -> &[u32] {
        &self.ids[row * self.cols..(row + 1) * self.cols]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        (0..self.rows).map(move |r| self.row(r))
    }

    /// All ids of one time step, one per row.
    pub fn column(&self, col: usize) -> Vec<u32> {
        (0..self.rows).map(|r| self.ids[r * self.cols + col]).collect()
    }

    /// Largest id in the matrix, if any.
    pub fn max_id(&self) -> Option<u32> {
        self.ids.iter().copied().max()
    }
}

#[cfg(test)]
impl TokenMatrix {
    /// A matrix with every entry set to `id`.
    pub fn filled(rows: usize, cols: usize, id: u32) -> Self {
        Self { rows, cols, ids: vec![id; rows * cols] }
    }

    /// Out-of-bounds writes are ignored.
    pub fn set(&mut self, row: usize, col: usize, id: u32) {
        if row < self.rows && col < self.cols {
            self.ids[row * self.cols + col] = id;
        }
    }
}
