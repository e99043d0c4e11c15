// ============================================================
// Layer 6 — Metric Sinks
// ============================================================
// Two MetricSink implementations:
//
//   CsvMetricSink — one CSV per stream under the log dir
//                     {log_dir}/train/metrics.csv
//                     {log_dir}/test/metrics.csv
//                   Both files are opened when the sink is built,
//                   buffered, and flushed on `flush` or drop.
//   MemorySink    — test-only; keeps records in a shared Vec.
//                   Clones see the same records, so a test can
//                   keep one handle while the trainer owns another.
//
// Example CSV output:
//   step,name,value
//   100,loss,4.210937
//   100,PPL,67.404135
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};
#[cfg(test)]
use std::{cell::RefCell, rc::Rc};

use crate::domain::traits::{MetricSink, Stream};

const CSV_HEADER: &str = "step,name,value";

// ─── CsvMetricSink ────────────────────────────────────────────────────────────
pub struct CsvMetricSink {
    log_dir: PathBuf,
    train:   BufWriter<File>,
    test:    BufWriter<File>,
}

impl CsvMetricSink {
    /// Opens (appending) both stream files, writing the header
    /// only into files that are new.
    pub fn create(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        let train = open_stream(&log_dir, Stream::Train)?;
        let test  = open_stream(&log_dir, Stream::Test)?;
        tracing::debug!("Metric sink writing under '{}'", log_dir.display());
        Ok(Self { log_dir, train, test })
    }

}

fn stream_path(log_dir: &Path, stream: Stream) -> PathBuf {
    log_dir.join(stream.as_str()).join("metrics.csv")
}

fn open_stream(log_dir: &Path, stream: Stream) -> Result<BufWriter<File>> {
    let path = stream_path(log_dir, stream);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Cannot create log dir '{}'", parent.display()))?;
    }
    let is_new = !path.exists();
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Cannot open metrics file '{}'", path.display()))?;
    let mut writer = BufWriter::new(file);
    if is_new {
        writeln!(writer, "{CSV_HEADER}")?;
    }
    Ok(writer)
}

impl MetricSink for CsvMetricSink {
    fn record(&mut self, stream: Stream, step: u64, name: &str, value: f64) -> io::Result<()> {
        let writer = match stream {
            Stream::Train => &mut self.train,
            Stream::Test  => &mut self.test,
        };
        writeln!(writer, "{step},{name},{value:.6}")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.train.flush()?;
        self.test.flush()
    }
}

impl Drop for CsvMetricSink {
    fn drop(&mut self) {
        if let Err(e) = MetricSink::flush(self) {
            tracing::warn!("Failed to flush metrics under '{}': {e}", self.log_dir.display());
        }
    }
}

// ─── MemorySink ───────────────────────────────────────────────────────────────
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricRecord {
    pub stream: Stream,
    pub step:   u64,
    pub name:   String,
    pub value:  f64,
}

#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Rc<RefCell<Vec<MetricRecord>>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn records(&self) -> Vec<MetricRecord> {
        self.records.borrow().clone()
    }
}

#[cfg(test)]
impl MetricSink for MemorySink {
    fn record(&mut self, stream: Stream, step: u64, name: &str, value: f64) -> io::Result<()> {
        self.records.borrow_mut().push(MetricRecord {
            stream,
            step,
            name: name.to_string(),
            value,
        });
        Ok(())
    }
}
