// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From a pair file on disk to fixed-shape token batches:
//
//   pairs.tsv
//       │
//       ▼
//   PairLoader        → parses "<source ids>\t<target ids>" lines
//       │
//       ▼
//   split_train_val   → seeded shuffle + train/validation split
//       │
//       ▼
//   PairBatcher       → pads, truncates, adds BOS, groups rows
//       │
//       ▼
//   Vec<Batch>        → fed to the training loop one at a time
//
// Reference: Rust Book §13 (Iterators and Closures)

/// Reads tab-separated token id pairs
pub mod loader;

/// Pads pairs into [batch_size, seq_len] batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
