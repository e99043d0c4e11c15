// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The model core never writes files itself. It talks to two
// collaborators through these traits:
//
//   PairSource — anything that yields training examples
//                (PairLoader reads a tab-separated id file)
//   MetricSink — anything that accepts scalar metrics tagged
//                with a step and a stream
//                (CsvMetricSink writes CSV, MemorySink keeps
//                 records in memory for tests)
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;

use crate::domain::pair::TokenPair;

// ─── PairSource ───────────────────────────────────────────────────────────────
/// Any component that can load token pairs.
pub trait PairSource {
    fn load_all(&self) -> Result<Vec<TokenPair>>;
}

// ─── Stream ───────────────────────────────────────────────────────────────────
/// Monitoring stream a metric belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Metrics from steps that updated parameters
    Train,
    /// Metrics from loss-only evaluation
    Test,
}

impl Stream {
    pub fn for_step(trainable: bool) -> Self {
        if trainable { Stream::Train } else { Stream::Test }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Train => "train",
            Stream::Test  => "test",
        }
    }
}

// ─── MetricSink ───────────────────────────────────────────────────────────────
/// Append-only sink for named scalar metrics.
///
/// Implementations own their handles: they are opened when
/// constructed and released by `flush` + drop.
pub trait MetricSink {
    fn record(&mut self, stream: Stream, step: u64, name: &str, value: f64) -> std::io::Result<()>;

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
