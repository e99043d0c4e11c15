// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust types shared by every other layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//
// Think of this layer as the "dictionary" of the system —
// token matrices, examples, errors and the collaborator
// traits the model core depends on.

// Token id matrices and the special PAD / BOS ids
pub mod tokens;

// Unpadded examples and fixed-shape batches
pub mod pair;

// Errors reported by the model core
pub mod error;

// Core abstractions (traits) that other layers implement
pub mod traits;
