// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Everything that touches the filesystem on behalf of the
// model core:
//
//   checkpoint.rs — full-precision model weights via Burn's
//                   named MessagePack recorder, plus the run config as JSON so inference
//                   can rebuild the same model
//
//   metrics.rs    — MetricSink implementations: CSV files per
//                   stream, or an in-memory sink for tests
//
// Reference: Burn Book §5 (Checkpointing)
//            Rust Book §9 (Error Handling with anyhow)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Metric sinks (CSV and in-memory)
pub mod metrics;
